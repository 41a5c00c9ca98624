// src/fetch/pacer.rs

use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Keeps a fixed minimum gap between page requests. Not a backoff: the
/// floor never grows.
#[derive(Debug)]
pub struct Pacer {
    min_interval: Duration,
    last: Option<Instant>,
}

impl Pacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
        }
    }

    /// Record a request made right now.
    pub fn mark(&mut self) {
        self.last = Some(Instant::now());
    }

    /// Sleep until `min_interval` has passed since the previous request, then mark.
    pub async fn wait(&mut self) {
        if let Some(last) = self.last {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let remaining = self.min_interval - elapsed;
                debug!(?remaining, "pacing next request");
                sleep(remaining).await;
            }
        }
        self.mark();
    }
}
