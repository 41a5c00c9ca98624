use anyhow::{Context, Result};
use chrono::Local;
use std::time::Duration;
use stockscraper::{
    config::Config,
    enrich::{Enricher, FinanceApi, SYMBOL_COLUMN},
    fetch::{ChromiumDriver, Collector, CollectorConfig},
    process::{Persister, Table, PRICE_COLUMN},
    secure::Vault,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

const NAV_TIMEOUT: Duration = Duration::from_secs(60);
const PREVIEW_ROWS: usize = 5;

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) configuration ────────────────────────────────────────────
    let cfg = Config::load()?;
    let stamp = Local::now();

    // resolve the key before any plaintext is written
    let vault = if cfg.encrypt_output {
        let (vault, source) = Vault::from_config(cfg.encryption_key.as_ref(), &cfg.env_path)?;
        info!(?source, "encryption key ready");
        Some(vault)
    } else {
        None
    };

    // ─── 3) scrape every listing page ────────────────────────────────
    let mut driver = ChromiumDriver::launch(cfg.headless, NAV_TIMEOUT)
        .await
        .context("starting browser")?;
    let mut collector = Collector::new(CollectorConfig {
        page_interval: cfg.page_interval,
        ..CollectorConfig::default()
    });
    let raw = collector.collect(&mut driver, &cfg.listing_url()).await;

    if raw.is_empty() {
        warn!("no data scraped; check connection");
        return Ok(());
    }

    // ─── 4) rank, split, enrich the top rows, write CSVs ─────────────
    let mut enricher = if cfg.enrich {
        let api = FinanceApi::new(&cfg.api_url, &cfg.api_key, cfg.metric)?;
        Some(Enricher::new(api, cfg.api_delay))
    } else {
        None
    };
    let persister = Persister::new(&cfg.output_dir, cfg.top_n);
    let Some(persisted) = persister
        .process_and_save(raw, enricher.as_mut(), stamp)
        .await?
    else {
        return Ok(());
    };

    let enriched_column = enricher.as_ref().map(|e| e.column().to_string());
    preview(&persisted.top, enriched_column.as_deref());

    // ─── 5) lock the files ───────────────────────────────────────────
    if let Some(vault) = &vault {
        for file in persisted.files() {
            if vault.secure(&file.path)?.is_none() {
                warn!(role = %file.role, "output file was not encrypted");
            }
        }
    }

    info!("all done");
    Ok(())
}

/// Log the first few ranked rows.
fn preview(top: &Table, enriched: Option<&str>) {
    info!("results preview (top {PREVIEW_ROWS})");
    for i in 0..top.len().min(PREVIEW_ROWS) {
        info!(
            symbol = top.get(i, SYMBOL_COLUMN).unwrap_or(""),
            price = top.get(i, PRICE_COLUMN).unwrap_or(""),
            value = enriched.and_then(|c| top.get(i, c)).unwrap_or(""),
            "#{}",
            i + 1
        );
    }
}
