// src/fetch/mod.rs

pub mod driver;
pub mod extract;
pub mod pacer;

use anyhow::{bail, Context, Result};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{error, info, instrument, warn};

use crate::process::table::Table;
pub use driver::{ChromiumDriver, ControlState, PageDriver};
pub use extract::HeaderLayout;
use pacer::Pacer;

/// Pagination control on the listing page.
pub const NEXT_BUTTON: &str = r#"button[data-testid="next-page-button"]"#;
/// Cookie-consent "reject all" button.
pub const COOKIE_REJECT: &str = "button.reject-all";

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Floor between successive page requests.
    pub page_interval: Duration,
    /// How long to wait for the listing table to render.
    pub load_timeout: Duration,
    /// How long to wait for the first cell to change after "next".
    pub change_timeout: Duration,
    /// Re-check interval while waiting on the page.
    pub poll_interval: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            page_interval: Duration::from_secs(2),
            load_timeout: Duration::from_secs(30),
            change_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Rows gathered so far plus the header layout captured from page one.
#[derive(Debug, Default)]
struct Accumulator {
    layout: HeaderLayout,
    table: Option<Table>,
}

/// Walks a paginated listing and accumulates its rows.
pub struct Collector {
    config: CollectorConfig,
    pacer: Pacer,
}

impl Collector {
    pub fn new(config: CollectorConfig) -> Self {
        let pacer = Pacer::new(config.page_interval);
        Self { config, pacer }
    }

    /// Scrape every page reachable from `url`.
    ///
    /// Never fails: an error mid-walk ends collection and whatever was
    /// gathered so far is returned. The driver is closed on every path.
    #[instrument(level = "info", skip(self, driver))]
    pub async fn collect<D: PageDriver + ?Sized>(&mut self, driver: &mut D, url: &str) -> Table {
        let mut acc = Accumulator::default();

        if let Err(e) = self.walk(driver, url, &mut acc).await {
            error!(
                error = %format!("{e:#}"),
                rows = acc.table.as_ref().map_or(0, Table::len),
                "scraping error encountered; keeping rows collected so far"
            );
        }
        if let Err(e) = driver.close().await {
            warn!(error = %e, "browser did not close cleanly");
        }

        let table = acc.table.filter(|t| !t.is_empty()).unwrap_or_default();
        info!(rows = table.len(), columns = table.columns().len(), "extracted rows");
        table
    }

    async fn walk<D: PageDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        url: &str,
        acc: &mut Accumulator,
    ) -> Result<()> {
        driver
            .goto(url)
            .await
            .with_context(|| format!("loading {url}"))?;
        self.pacer.mark();

        let mut page = 1usize;
        loop {
            info!(page, "scraping page");
            self.dismiss_cookies(driver).await?;
            let html = self.wait_for_table(&*driver).await?;

            if acc.table.is_none() {
                let layout = extract::read_headers(&html)?;
                if layout.columns.is_empty() {
                    warn!("header row has no usable columns; nothing to collect");
                    return Ok(());
                }
                acc.table = Some(Table::new(layout.columns.clone()));
                acc.layout = layout;
            }

            let rows = extract::read_rows(&html, &acc.layout)?;
            if page == 1 && rows.is_empty() {
                info!("first page has no rows");
                return Ok(());
            }
            let Some(table) = acc.table.as_mut() else {
                bail!("no header captured before reading rows");
            };
            let found = rows.len();
            for row in rows {
                if let Err(e) = table.push_row(row) {
                    warn!(page, error = %e, "dropping malformed row");
                }
            }
            info!(page, found, total = table.len(), "page read");

            let next = driver.control(NEXT_BUTTON).await?;
            if !next.actionable() {
                info!(?next, "next button disabled or missing; reached end of data");
                return Ok(());
            }

            let before = extract::first_cell_text(&html).unwrap_or_default();
            self.pacer.wait().await;
            driver.click(NEXT_BUTTON).await.context("clicking next")?;

            if !self.wait_for_change(&*driver, &before).await? {
                warn!(page, "wait timeout: page did not change or last page reached");
                return Ok(());
            }
            page += 1;
        }
    }

    async fn dismiss_cookies<D: PageDriver + ?Sized>(&self, driver: &mut D) -> Result<()> {
        if driver.control(COOKIE_REJECT).await?.actionable() {
            info!("rejecting cookies");
            driver.click(COOKIE_REJECT).await?;
        }
        Ok(())
    }

    async fn wait_for_table<D: PageDriver + ?Sized>(&self, driver: &D) -> Result<String> {
        let deadline = Instant::now() + self.config.load_timeout;
        loop {
            let html = driver.html().await?;
            if extract::has_table(&html) {
                return Ok(html);
            }
            if Instant::now() >= deadline {
                bail!(
                    "listing table {:?} did not appear within {:?}",
                    extract::TABLE_SELECTOR,
                    self.config.load_timeout
                );
            }
            sleep(self.config.poll_interval).await;
        }
    }

    /// True once the first body cell holds text other than `before`.
    async fn wait_for_change<D: PageDriver + ?Sized>(&self, driver: &D, before: &str) -> Result<bool> {
        let deadline = Instant::now() + self.config.change_timeout;
        loop {
            let html = driver.html().await?;
            if matches!(extract::first_cell_text(&html), Some(now) if now != before) {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            sleep(self.config.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Serves a fixed sequence of rendered pages; "next" advances through them.
    #[derive(Default)]
    struct ScriptedPages {
        pages: Vec<String>,
        current: usize,
        visited: Option<String>,
        clicks: usize,
        fail_on_click: Option<usize>,
        stuck: bool,
        cookie_banner: bool,
        fail_goto: bool,
        closed: usize,
    }

    impl ScriptedPages {
        fn new(pages: Vec<String>) -> Self {
            Self {
                pages,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl PageDriver for ScriptedPages {
        async fn goto(&mut self, url: &str) -> Result<()> {
            if self.fail_goto {
                bail!("net::ERR_NAME_NOT_RESOLVED");
            }
            self.visited = Some(url.to_string());
            Ok(())
        }

        async fn html(&self) -> Result<String> {
            Ok(self.pages[self.current].clone())
        }

        async fn control(&self, selector: &str) -> Result<ControlState> {
            let state = match selector {
                NEXT_BUTTON => ControlState {
                    present: true,
                    visible: true,
                    enabled: self.current + 1 < self.pages.len(),
                },
                COOKIE_REJECT if self.cookie_banner => ControlState {
                    present: true,
                    visible: true,
                    enabled: true,
                },
                _ => ControlState::default(),
            };
            Ok(state)
        }

        async fn click(&mut self, selector: &str) -> Result<()> {
            match selector {
                COOKIE_REJECT => self.cookie_banner = false,
                NEXT_BUTTON => {
                    if self.fail_on_click == Some(self.clicks) {
                        bail!("element detached");
                    }
                    self.clicks += 1;
                    if !self.stuck {
                        self.current += 1;
                    }
                }
                other => bail!("unexpected click on {other}"),
            }
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            self.closed += 1;
            Ok(())
        }
    }

    fn page(symbols: &[&str]) -> String {
        let rows: String = symbols
            .iter()
            .map(|s| {
                format!("<tr><td>{s}</td><td><svg/></td><td>{s} Inc</td><td>$1.00</td><td>1 - 2</td></tr>")
            })
            .collect();
        format!(
            r#"<div class="table-container"><table>
                <thead><tr>
                  <th data-testid-header="ticker">Symbol</th>
                  <th data-testid-header="sparkline"></th>
                  <th data-testid-header="name">Name</th>
                  <th data-testid-header="price">Price</th>
                  <th data-testid-header="fiftyTwoWeekRange">52 Wk Range</th>
                </tr></thead>
                <tbody>{rows}</tbody>
            </table></div>"#
        )
    }

    fn quick() -> CollectorConfig {
        CollectorConfig {
            page_interval: Duration::from_millis(1),
            load_timeout: Duration::from_millis(30),
            change_timeout: Duration::from_millis(30),
            poll_interval: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn walks_every_page_until_next_is_disabled() {
        let mut driver = ScriptedPages::new(vec![
            page(&["AAA", "BBB"]),
            page(&["CCC", "DDD"]),
            page(&["EEE"]),
        ]);
        let mut collector = Collector::new(quick());

        let table = collector.collect(&mut driver, "https://listing/?count=2").await;

        assert_eq!(table.columns(), &["Symbol", "Name", "Price"]);
        assert_eq!(
            table.column("Symbol").unwrap(),
            vec!["AAA", "BBB", "CCC", "DDD", "EEE"]
        );
        assert_eq!(table.get(4, "Name"), Some("EEE Inc"));
        assert_eq!(driver.visited.as_deref(), Some("https://listing/?count=2"));
        assert_eq!(driver.clicks, 2);
        assert_eq!(driver.closed, 1);
    }

    #[tokio::test]
    async fn stalled_pagination_stops_with_what_was_read() {
        let mut driver = ScriptedPages::new(vec![page(&["AAA"]), page(&["BBB"])]);
        driver.stuck = true;
        let mut collector = Collector::new(quick());

        let table = collector.collect(&mut driver, "u").await;

        assert_eq!(table.column("Symbol").unwrap(), vec!["AAA"]);
        assert_eq!(driver.closed, 1);
    }

    #[tokio::test]
    async fn error_mid_walk_keeps_partial_rows() {
        let mut driver = ScriptedPages::new(vec![
            page(&["AAA"]),
            page(&["BBB"]),
            page(&["CCC"]),
        ]);
        driver.fail_on_click = Some(1);
        let mut collector = Collector::new(quick());

        let table = collector.collect(&mut driver, "u").await;

        assert_eq!(table.column("Symbol").unwrap(), vec!["AAA", "BBB"]);
        assert_eq!(driver.closed, 1);
    }

    #[tokio::test]
    async fn failed_navigation_yields_empty_table_and_closes() {
        let mut driver = ScriptedPages::new(vec![page(&["AAA"])]);
        driver.fail_goto = true;
        let mut collector = Collector::new(quick());

        let table = collector.collect(&mut driver, "u").await;

        assert!(table.is_empty());
        assert_eq!(driver.closed, 1);
    }

    #[tokio::test]
    async fn empty_first_page_is_an_empty_table() {
        let mut driver = ScriptedPages::new(vec![page(&[]), page(&["BBB"])]);
        let mut collector = Collector::new(quick());

        let table = collector.collect(&mut driver, "u").await;

        assert!(table.is_empty());
        assert_eq!(driver.clicks, 0);
    }

    #[tokio::test]
    async fn headerless_table_is_an_empty_table() {
        let html = r#"<div class="table-container"><table><tbody>
            <tr><td>AAA</td></tr></tbody></table></div>"#;
        let mut driver = ScriptedPages::new(vec![html.to_string()]);
        let mut collector = Collector::new(quick());

        let table = collector.collect(&mut driver, "u").await;

        assert!(table.is_empty());
        assert!(table.columns().is_empty());
    }

    #[tokio::test]
    async fn missing_table_times_out_into_empty_result() {
        let mut driver = ScriptedPages::new(vec!["<p>blocked</p>".to_string()]);
        let mut collector = Collector::new(quick());

        let table = collector.collect(&mut driver, "u").await;

        assert!(table.is_empty());
        assert_eq!(driver.closed, 1);
    }

    #[tokio::test]
    async fn cookie_banner_is_dismissed() {
        let mut driver = ScriptedPages::new(vec![page(&["AAA"])]);
        driver.cookie_banner = true;
        let mut collector = Collector::new(quick());

        let table = collector.collect(&mut driver, "u").await;

        assert!(!driver.cookie_banner);
        assert_eq!(table.len(), 1);
    }
}
