// src/enrich/api.rs

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::{fmt, str::FromStr, time::Duration};
use tracing::{debug, instrument, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Which figure to pull from the provider for each symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// `GLOBAL_QUOTE` → `"Global Quote"."08. previous close"`.
    PreviousClose,
    /// `BALANCE_SHEET` → latest quarterly (else annual) `totalLiabilities`.
    TotalLiabilities,
}

impl Metric {
    pub fn function(&self) -> &'static str {
        match self {
            Metric::PreviousClose => "GLOBAL_QUOTE",
            Metric::TotalLiabilities => "BALANCE_SHEET",
        }
    }

    /// Name of the table column the values land in.
    pub fn column(&self) -> &'static str {
        match self {
            Metric::PreviousClose => "API_Previous_Close",
            Metric::TotalLiabilities => "Total_Liabilities",
        }
    }

    fn extract(&self, body: &Value) -> Option<String> {
        match self {
            Metric::PreviousClose => {
                reported(body.get("Global Quote")?.get("08. previous close")?)
            }
            Metric::TotalLiabilities => ["quarterlyReports", "annualReports"]
                .iter()
                .find_map(|reports| reported(body.get(*reports)?.get(0)?.get("totalLiabilities")?)),
        }
    }
}

/// A provider field as text; `"None"` and blanks mean not reported.
fn reported(raw: &Value) -> Option<String> {
    let text = match raw {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty() && text != "None").then_some(text)
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Metric::PreviousClose => "previous_close",
            Metric::TotalLiabilities => "total_liabilities",
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown metric {0:?} (expected previous_close or total_liabilities)")]
pub struct UnknownMetric(String);

impl FromStr for Metric {
    type Err = UnknownMetric;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "previous_close" => Ok(Metric::PreviousClose),
            "total_liabilities" => Ok(Metric::TotalLiabilities),
            other => Err(UnknownMetric(other.to_string())),
        }
    }
}

/// Why a lookup produced no value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("missing API key")]
    MissingApiKey,
    #[error("HTTP {0}")]
    Status(u16),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("connection error: {0}")]
    Transport(String),
    #[error("unreadable response: {0}")]
    Decode(String),
}

impl LookupError {
    /// False when the lookup was refused locally without contacting the provider.
    pub fn reached_provider(&self) -> bool {
        !matches!(self, LookupError::MissingApiKey)
    }
}

/// Outcome of one external lookup, kept apart from the data it produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(String),
    NoData,
    Failed(LookupError),
}

impl Lookup {
    /// The cell value: the found figure, otherwise empty.
    pub fn value(&self) -> &str {
        match self {
            Lookup::Found(v) => v,
            _ => "",
        }
    }

    /// The diagnostic cell that accompanies `value`.
    pub fn status(&self) -> String {
        match self {
            Lookup::Found(_) => "ok".to_string(),
            Lookup::NoData => "no data".to_string(),
            Lookup::Failed(e) => e.to_string(),
        }
    }

    /// Whether the provider was actually contacted to produce this outcome.
    pub fn reached_provider(&self) -> bool {
        match self {
            Lookup::Failed(e) => e.reached_provider(),
            _ => true,
        }
    }
}

/// Anything that can answer "what is this figure for symbol X".
#[async_trait]
pub trait LookupSource: Send + Sync {
    /// Column the looked-up values are stored under.
    fn column(&self) -> &str;

    async fn lookup(&self, symbol: &str) -> Lookup;
}

/// Alpha Vantage style query endpoint: `?function=..&symbol=..&apikey=..`.
pub struct FinanceApi {
    client: Client,
    base_url: String,
    api_key: String,
    metric: Metric,
}

impl FinanceApi {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, metric: Metric) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            metric,
        })
    }

    async fn fetch(&self, symbol: &str) -> Result<Lookup, LookupError> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[
                ("function", self.metric.function()),
                ("symbol", symbol),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| LookupError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(LookupError::Status(status.as_u16()));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| LookupError::Decode(e.to_string()))?;

        if let Some(value) = self.metric.extract(&body) {
            return Ok(Lookup::Found(value));
        }
        for notice in ["Note", "Information"] {
            if let Some(msg) = body.get(notice).and_then(Value::as_str) {
                return Err(LookupError::RateLimited(msg.to_string()));
            }
        }
        if let Some(msg) = body.get("Error Message").and_then(Value::as_str) {
            return Err(LookupError::Provider(msg.to_string()));
        }
        Ok(Lookup::NoData)
    }
}

#[async_trait]
impl LookupSource for FinanceApi {
    fn column(&self) -> &str {
        self.metric.column()
    }

    #[instrument(level = "debug", skip(self), fields(metric = %self.metric))]
    async fn lookup(&self, symbol: &str) -> Lookup {
        if self.api_key.trim().is_empty() {
            return Lookup::Failed(LookupError::MissingApiKey);
        }
        match self.fetch(symbol).await {
            Ok(outcome) => {
                debug!(symbol, ?outcome, "lookup finished");
                outcome
            }
            Err(e) => {
                warn!(symbol, error = %e, "lookup failed");
                Lookup::Failed(e)
            }
        }
    }
}
