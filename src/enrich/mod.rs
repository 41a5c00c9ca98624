// src/enrich/mod.rs

pub mod api;
pub mod cache;

use anyhow::{Context, Result};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument};

use crate::process::table::Table;

pub use api::{FinanceApi, Lookup, LookupError, LookupSource, Metric};
pub use cache::EnrichmentCache;

/// Column whose value is used as the lookup key.
pub const SYMBOL_COLUMN: &str = "Symbol";

/// Which rows of a table get a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    All,
    /// The first `n` rows; meaningful on a table that is already sorted.
    First(usize),
}

/// Counters for one `enrich` call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EnrichSummary {
    pub targeted: usize,
    pub lookups: usize,
    pub cache_hits: usize,
    pub failures: usize,
}

/// Adds one looked-up value per target row, asking the source at most once per symbol.
pub struct Enricher<S> {
    source: S,
    cache: EnrichmentCache,
    delay: Duration,
}

impl<S: LookupSource> Enricher<S> {
    /// `delay` is slept after every call that reaches the provider; cache hits are free.
    pub fn new(source: S, delay: Duration) -> Self {
        Self {
            source,
            cache: EnrichmentCache::new(),
            delay,
        }
    }

    /// Name of the value column this enricher fills.
    pub fn column(&self) -> &str {
        self.source.column()
    }

    /// Name of the diagnostics column that accompanies `column`.
    pub fn status_column(&self) -> String {
        format!("{}_Status", self.source.column())
    }

    /// Append the value and status columns to `table`.
    ///
    /// Rows outside `target` get empty cells in both columns.
    #[instrument(level = "info", skip(self, table), fields(rows = table.len()))]
    pub async fn enrich(&mut self, table: &mut Table, target: Target) -> Result<EnrichSummary> {
        let symbols: Vec<String> = table
            .column(SYMBOL_COLUMN)
            .context("table cannot be enriched")?
            .into_iter()
            .map(|s| s.trim().to_string())
            .collect();

        let targeted = match target {
            Target::All => symbols.len(),
            Target::First(n) => n.min(symbols.len()),
        };

        let mut summary = EnrichSummary {
            targeted,
            ..EnrichSummary::default()
        };
        let mut values = vec![String::new(); symbols.len()];
        let mut statuses = vec![String::new(); symbols.len()];

        for (i, symbol) in symbols.iter().take(targeted).enumerate() {
            let outcome = match self.cache.get(symbol) {
                Some(hit) => {
                    summary.cache_hits += 1;
                    debug!(symbol = %symbol, "cache hit");
                    hit.clone()
                }
                None => {
                    let fetched = self.source.lookup(symbol).await;
                    summary.lookups += 1;
                    let reached = fetched.reached_provider();
                    let outcome = self.cache.insert_on_miss(symbol, fetched).clone();
                    if reached && !self.delay.is_zero() {
                        sleep(self.delay).await;
                    }
                    outcome
                }
            };
            if matches!(outcome, Lookup::Failed(_)) {
                summary.failures += 1;
            }
            values[i] = outcome.value().to_string();
            statuses[i] = outcome.status();
        }

        let status_column = self.status_column();
        table.set_column(self.source.column(), values)?;
        table.set_column(&status_column, statuses)?;

        info!(
            targeted = summary.targeted,
            lookups = summary.lookups,
            cache_hits = summary.cache_hits,
            failures = summary.failures,
            "enrichment finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
        time::Instant,
    };

    /// In-memory source that counts how often each symbol is asked for.
    #[derive(Clone, Default)]
    pub(crate) struct CountingSource {
        pub answers: HashMap<String, Lookup>,
        pub calls: Arc<Mutex<HashMap<String, usize>>>,
    }

    impl CountingSource {
        pub(crate) fn with(answers: &[(&str, Lookup)]) -> Self {
            Self {
                answers: answers
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
                calls: Arc::default(),
            }
        }

        pub(crate) fn calls_for(&self, symbol: &str) -> usize {
            self.calls.lock().unwrap().get(symbol).copied().unwrap_or(0)
        }

        pub(crate) fn total_calls(&self) -> usize {
            self.calls.lock().unwrap().values().sum()
        }
    }

    #[async_trait]
    impl LookupSource for CountingSource {
        fn column(&self) -> &str {
            "API_Previous_Close"
        }

        async fn lookup(&self, symbol: &str) -> Lookup {
            *self
                .calls
                .lock()
                .unwrap()
                .entry(symbol.to_string())
                .or_default() += 1;
            self.answers.get(symbol).cloned().unwrap_or(Lookup::NoData)
        }
    }

    fn table(symbols: &[&str]) -> Table {
        Table::from_rows(
            vec!["Symbol".into(), "Price".into()],
            symbols
                .iter()
                .map(|s| vec![s.to_string(), "1".to_string()])
                .collect(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn repeated_symbol_is_looked_up_once() {
        let source = CountingSource::with(&[("AAA", Lookup::Found("10.5".into()))]);
        let mut enricher = Enricher::new(source.clone(), Duration::ZERO);
        let mut t = table(&["AAA", "BBB", "AAA"]);

        let summary = enricher.enrich(&mut t, Target::All).await.unwrap();

        assert_eq!(source.calls_for("AAA"), 1);
        assert_eq!(summary.lookups, 2);
        assert_eq!(summary.cache_hits, 1);
        assert_eq!(t.get(0, "API_Previous_Close"), Some("10.5"));
        assert_eq!(t.get(2, "API_Previous_Close"), Some("10.5"));
        assert_eq!(t.get(1, "API_Previous_Close"), Some(""));
        assert_eq!(t.get(1, "API_Previous_Close_Status"), Some("no data"));
    }

    #[tokio::test]
    async fn only_the_first_rows_are_targeted() {
        let source = CountingSource::default();
        let mut enricher = Enricher::new(source.clone(), Duration::ZERO);
        let mut t = table(&["AAA", "BBB", "CCC"]);

        let summary = enricher.enrich(&mut t, Target::First(2)).await.unwrap();

        assert_eq!(summary.targeted, 2);
        assert_eq!(source.calls_for("CCC"), 0);
        assert_eq!(t.get(2, "API_Previous_Close_Status"), Some(""));
        assert_eq!(t.columns().len(), 4);
    }

    #[tokio::test]
    async fn failures_stay_out_of_the_value_column() {
        let source = CountingSource::with(&[(
            "AAA",
            Lookup::Failed(LookupError::Transport("refused".into())),
        )]);
        let mut enricher = Enricher::new(source, Duration::ZERO);
        let mut t = table(&["AAA"]);

        let summary = enricher.enrich(&mut t, Target::All).await.unwrap();

        assert_eq!(summary.failures, 1);
        assert_eq!(t.get(0, "API_Previous_Close"), Some(""));
        assert_eq!(
            t.get(0, "API_Previous_Close_Status"),
            Some("connection error: refused")
        );
    }

    #[tokio::test]
    async fn delay_follows_external_calls_not_cache_hits() {
        let source = CountingSource::default();
        let mut enricher = Enricher::new(source.clone(), Duration::from_millis(100));
        let mut t = table(&["AAA", "AAA", "AAA"]);

        let start = Instant::now();
        enricher.enrich(&mut t, Target::All).await.unwrap();
        let elapsed = start.elapsed();

        assert_eq!(source.total_calls(), 1);
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(200), "{elapsed:?}");
    }

    #[tokio::test]
    async fn missing_symbol_column_is_an_error() {
        let mut enricher = Enricher::new(CountingSource::default(), Duration::ZERO);
        let mut t = Table::from_rows(vec!["Ticker".into()], vec![vec!["AAA".into()]]).unwrap();
        assert!(enricher.enrich(&mut t, Target::All).await.is_err());
    }
}
