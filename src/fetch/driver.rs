//! Browser seam for the collector.
//!
//! The collector only needs a handful of capabilities from a browser:
//! navigate, snapshot the rendered DOM, inspect and click a control, and shut
//! down. `ChromiumDriver` provides them on top of chromiumoxide; tests use an
//! in-memory page sequence.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::Deserialize;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// What the page reports about a button.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ControlState {
    pub present: bool,
    pub visible: bool,
    pub enabled: bool,
}

impl ControlState {
    /// Present, visible and enabled.
    pub fn actionable(&self) -> bool {
        self.present && self.visible && self.enabled
    }
}

#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Load `url` in the session's page.
    async fn goto(&mut self, url: &str) -> Result<()>;
    /// Serialized DOM as currently rendered.
    async fn html(&self) -> Result<String>;
    async fn control(&self, selector: &str) -> Result<ControlState>;
    async fn click(&mut self, selector: &str) -> Result<()>;
    /// Tear the session down. Called exactly once, on every exit path.
    async fn close(&mut self) -> Result<()>;
}

/// A single headless (or headed) Chromium tab.
pub struct ChromiumDriver {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    nav_timeout: Duration,
}

impl ChromiumDriver {
    /// Launch Chromium and open a blank tab with a desktop user agent.
    pub async fn launch(headless: bool, nav_timeout: Duration) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg(format!("--user-agent={USER_AGENT}"));
        if !headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        info!(headless, "browser session started");
        Ok(Self {
            browser,
            page,
            handler,
            nav_timeout,
        })
    }

    async fn eval<T: serde::de::DeserializeOwned>(&self, script: &str) -> Result<T> {
        self.page
            .evaluate(script)
            .await
            .context("JS execution failed")?
            .into_value()
            .map_err(|e| anyhow!("failed to convert JS result: {e:?}"))
    }
}

/// Selector as a JS string literal.
fn js_literal(selector: &str) -> Result<String> {
    serde_json::to_string(selector).context("encoding selector")
}

#[async_trait]
impl PageDriver for ChromiumDriver {
    async fn goto(&mut self, url: &str) -> Result<()> {
        match tokio::time::timeout(self.nav_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => {
                debug!(url, "navigated");
                Ok(())
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {:?}", self.nav_timeout),
        }
    }

    async fn html(&self) -> Result<String> {
        self.eval("document.documentElement.outerHTML").await
    }

    async fn control(&self, selector: &str) -> Result<ControlState> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return {{ present: false, visible: false, enabled: false }};
                const style = window.getComputedStyle(el);
                const rect = el.getBoundingClientRect();
                const visible = style.display !== 'none' && style.visibility !== 'hidden'
                    && rect.width > 0 && rect.height > 0;
                const enabled = !el.disabled && el.getAttribute('aria-disabled') !== 'true';
                return {{ present: true, visible, enabled }};
            }})()"#,
            sel = js_literal(selector)?
        );
        self.eval(&script).await
    }

    async fn click(&mut self, selector: &str) -> Result<()> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.click();
                return true;
            }})()"#,
            sel = js_literal(selector)?
        );
        if !self.eval::<bool>(&script).await? {
            bail!("nothing to click at {selector}");
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let closed = self.browser.close().await.context("closing browser");
        let _ = self.browser.wait().await;
        self.handler.abort();
        info!("browser session closed");
        closed.map(|_| ())
    }
}
