// src/config/mod.rs

pub mod env_file;

use anyhow::{bail, Context, Result};
use std::{
    collections::HashMap,
    env,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::info;
use url::Url;

use crate::enrich::Metric;
use crate::secure::SecretKey;

/// Entry under which the file-encryption key is stored.
pub const ENCRYPTION_KEY_VAR: &str = "ENCRYPTION_KEY";

/// Points at an alternative `.env` file.
pub const ENV_PATH_VAR: &str = "STOCKSCRAPER_ENV";

const DEFAULT_BASE_URL: &str = "https://finance.yahoo.com/markets/stocks/most-active/?start=0&count=";
const DEFAULT_API_URL: &str = "https://www.alphavantage.co/query";

/// Everything one pipeline run needs to know.
#[derive(Debug, Clone)]
pub struct Config {
    /// The `.env` file the run was configured from; the key is persisted here.
    pub env_path: PathBuf,
    pub base_url: String,
    pub page_size: String,
    pub api_url: String,
    pub api_key: String,
    pub metric: Metric,
    pub enrich: bool,
    pub top_n: usize,
    pub output_dir: PathBuf,
    pub encrypt_output: bool,
    pub encryption_key: Option<SecretKey>,
    pub headless: bool,
    pub page_interval: Duration,
    pub api_delay: Duration,
}

impl Config {
    /// Load from the process environment, falling back to the `.env` file.
    ///
    /// The file location is `$STOCKSCRAPER_ENV`, or `.env` in the working directory.
    pub fn load() -> Result<Self> {
        let env_path = env::var(ENV_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".env"));
        let file = env_file::load(&env_path)?;
        let process: HashMap<String, String> = env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        let cfg = Self::from_sources(&env_path, &process, &file)?;
        info!(env = %env_path.display(), top_n = cfg.top_n, metric = ?cfg.metric, "configuration loaded");
        Ok(cfg)
    }

    /// Build a config from explicit sources; `process` wins over `file`.
    pub fn from_sources(
        env_path: &Path,
        process: &HashMap<String, String>,
        file: &HashMap<String, String>,
    ) -> Result<Self> {
        let set = |v: &&String| !v.trim().is_empty();
        let get = |key: &str| -> Option<String> {
            process
                .get(key)
                .filter(set)
                .or_else(|| file.get(key).filter(set))
                .map(|v| v.trim().to_string())
        };
        let get_or = |key: &str, default: &str| -> String {
            get(key).unwrap_or_else(|| default.to_string())
        };

        let metric = get_or("ENRICH_METRIC", "previous_close");
        let metric = metric
            .parse::<Metric>()
            .with_context(|| format!("ENRICH_METRIC={metric}"))?;

        let base_url = get_or("BASE_URL", DEFAULT_BASE_URL);
        let page_size = get_or("PAGE_SIZE", "100");
        Url::parse(&format!("{base_url}{page_size}"))
            .with_context(|| format!("BASE_URL/PAGE_SIZE do not form a valid URL: {base_url}{page_size}"))?;
        let encryption_key = get(ENCRYPTION_KEY_VAR)
            .map(|text| SecretKey::from_encoded(&text))
            .transpose()
            .context(ENCRYPTION_KEY_VAR)?;

        Ok(Self {
            env_path: env_path.to_path_buf(),
            base_url,
            page_size,
            api_url: get_or("ALPHA_VANTAGE_URL", DEFAULT_API_URL),
            api_key: get("ALPHA_VANTAGE_API_KEY").unwrap_or_default(),
            metric,
            enrich: parse_bool("ENRICH", &get_or("ENRICH", "true"))?,
            top_n: parse_number("TOP_N", &get_or("TOP_N", "20"))?,
            output_dir: PathBuf::from(get_or("OUTPUT_DIR", "output")),
            encrypt_output: parse_bool("ENCRYPT_OUTPUT", &get_or("ENCRYPT_OUTPUT", "false"))?,
            encryption_key,
            headless: parse_bool("HEADLESS", &get_or("HEADLESS", "true"))?,
            page_interval: Duration::from_secs(parse_number(
                "PAGE_INTERVAL_SECS",
                &get_or("PAGE_INTERVAL_SECS", "2"),
            )? as u64),
            api_delay: Duration::from_secs(parse_number(
                "API_DELAY_SECS",
                &get_or("API_DELAY_SECS", "12"),
            )? as u64),
        })
    }

    /// The listing URL with the page size appended.
    pub fn listing_url(&self) -> String {
        format!("{}{}", self.base_url, self.page_size)
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => bail!("{key}: expected a boolean, got {other:?}"),
    }
}

fn parse_number(key: &str, raw: &str) -> Result<usize> {
    raw.parse::<usize>()
        .with_context(|| format!("{key}: expected a non-negative integer, got {raw:?}"))
}
