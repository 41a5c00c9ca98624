// src/process/persist.rs

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::{fmt, fs, path::PathBuf};
use tracing::{info, instrument};

use super::price::normalize_price;
use super::table::Table;
use crate::enrich::{Enricher, LookupSource, Target};

/// Display-formatted price column the ranking is based on.
pub const PRICE_COLUMN: &str = "Price";
/// Numeric shadow of `PRICE_COLUMN`; never written to disk.
pub const HELPER_COLUMN: &str = "Price_Numeric";

/// Which partition a file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Top,
    Remainder,
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Top => "top",
            Role::Remainder => "remainder",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A CSV written by the persister.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputFile {
    pub path: PathBuf,
    pub role: Role,
    pub created: DateTime<Local>,
}

/// Result of one `process_and_save` run.
#[derive(Debug)]
pub struct Persisted {
    /// The top partition as written (enriched when an enricher was given).
    pub top: Table,
    pub remainder_rows: usize,
    pub top_file: OutputFile,
    pub remainder_file: OutputFile,
}

impl Persisted {
    pub fn files(&self) -> [&OutputFile; 2] {
        [&self.top_file, &self.remainder_file]
    }
}

/// `<role>_<YYYYMMDD_HHMMSS>.csv`
pub fn output_file_name(role: Role, stamp: &DateTime<Local>) -> String {
    format!("{}_{}.csv", role, stamp.format("%Y%m%d_%H%M%S"))
}

/// Add the numeric helper column and sort descending by it.
///
/// The sort is stable, so equal prices keep their scraped order.
pub fn rank_by_price(table: &mut Table) -> Result<()> {
    let numeric: Vec<String> = table
        .column(PRICE_COLUMN)
        .context("ranking by price")?
        .into_iter()
        .map(|raw| normalize_price(raw).to_string())
        .collect();
    table.set_column(HELPER_COLUMN, numeric)?;

    let col = table
        .column_index(HELPER_COLUMN)
        .context("helper column vanished")?;
    let key = |cells: &[String]| cells[col].parse::<f64>().unwrap_or(0.0);
    table.sort_rows_by(|a, b| key(b.cells()).total_cmp(&key(a.cells())));
    Ok(())
}

/// Sorts, splits, optionally enriches and writes a scraped table.
pub struct Persister {
    output_dir: PathBuf,
    top_n: usize,
}

impl Persister {
    pub fn new(output_dir: impl Into<PathBuf>, top_n: usize) -> Self {
        Self {
            output_dir: output_dir.into(),
            top_n,
        }
    }

    /// Rank `table` by price, split at `top_n`, enrich the top rows if asked,
    /// and write both partitions stamped with `stamp`.
    ///
    /// An empty table is a no-op and yields `Ok(None)`.
    #[instrument(level = "info", skip_all, fields(rows = table.len(), top_n = self.top_n))]
    pub async fn process_and_save<S: LookupSource>(
        &self,
        mut table: Table,
        enricher: Option<&mut Enricher<S>>,
        stamp: DateTime<Local>,
    ) -> Result<Option<Persisted>> {
        if table.is_empty() {
            info!("nothing to persist");
            return Ok(None);
        }

        rank_by_price(&mut table)?;
        let (mut top, mut remainder) = table.split_at(self.top_n);

        if let Some(enricher) = enricher {
            enricher.enrich(&mut top, Target::All).await?;
        }

        top.drop_column(HELPER_COLUMN);
        remainder.drop_column(HELPER_COLUMN);

        fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("creating output directory {:?}", self.output_dir))?;
        let top_file = self.write(&top, Role::Top, stamp)?;
        let remainder_file = self.write(&remainder, Role::Remainder, stamp)?;

        Ok(Some(Persisted {
            remainder_rows: remainder.len(),
            top,
            top_file,
            remainder_file,
        }))
    }

    fn write(&self, table: &Table, role: Role, stamp: DateTime<Local>) -> Result<OutputFile> {
        let path = self.output_dir.join(output_file_name(role, &stamp));
        table.write_csv(&path)?;
        info!(role = %role, rows = table.len(), path = %path.display(), "wrote partition");
        Ok(OutputFile {
            path,
            role,
            created: stamp,
        })
    }
}
