// src/process/table.rs

use anyhow::{bail, Context, Result};
use std::{fs::File, path::Path};

/// One record; cells line up with the owning table's columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    cells: Vec<String>,
}

impl Row {
    pub fn cells(&self) -> &[String] {
        &self.cells
    }
}

/// Rows sharing one fixed, ordered column set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from raw cell rows, rejecting any row of the wrong width.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        let mut table = Self::new(columns);
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when there is nothing to process: no columns or no rows.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() || self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn push_row(&mut self, cells: Vec<String>) -> Result<()> {
        if cells.len() != self.columns.len() {
            bail!(
                "row has {} cells but table has {} columns",
                cells.len(),
                self.columns.len()
            );
        }
        self.rows.push(Row { cells });
        Ok(())
    }

    /// Cell at `row` in column `name`.
    pub fn get(&self, row: usize, name: &str) -> Option<&str> {
        let col = self.column_index(name)?;
        self.rows.get(row).map(|r| r.cells[col].as_str())
    }

    /// Values of one column, top to bottom.
    pub fn column(&self, name: &str) -> Result<Vec<&str>> {
        let col = self
            .column_index(name)
            .with_context(|| format!("no column named {name:?}"))?;
        Ok(self.rows.iter().map(|r| r.cells[col].as_str()).collect())
    }

    /// Set a column's values, appending the column if it does not exist yet.
    pub fn set_column(&mut self, name: &str, values: Vec<String>) -> Result<()> {
        if values.len() != self.rows.len() {
            bail!(
                "column {name:?} has {} values but table has {} rows",
                values.len(),
                self.rows.len()
            );
        }
        match self.column_index(name) {
            Some(col) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.cells[col] = value;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.cells.push(value);
                }
            }
        }
        Ok(())
    }

    /// Remove a column if present.
    pub fn drop_column(&mut self, name: &str) {
        if let Some(col) = self.column_index(name) {
            self.columns.remove(col);
            for row in &mut self.rows {
                row.cells.remove(col);
            }
        }
    }

    /// Stable sort: ties keep their current relative order.
    pub fn sort_rows_by<F>(&mut self, compare: F)
    where
        F: FnMut(&Row, &Row) -> std::cmp::Ordering,
    {
        self.rows.sort_by(compare);
    }

    /// Split into `[0, at)` and `[at, len)`; `at` is clamped to the row count.
    pub fn split_at(mut self, at: usize) -> (Table, Table) {
        let at = at.min(self.rows.len());
        let tail = self.rows.split_off(at);
        let remainder = Table {
            columns: self.columns.clone(),
            rows: tail,
        };
        (self, remainder)
    }

    /// Write as comma-separated text: header row, then one line per row.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("creating {:?}", path))?;
        let mut wtr = csv::Writer::from_writer(file);
        wtr.write_record(&self.columns)
            .with_context(|| format!("writing header to {:?}", path))?;
        for row in &self.rows {
            wtr.write_record(&row.cells)
                .with_context(|| format!("writing row to {:?}", path))?;
        }
        wtr.flush().with_context(|| format!("flushing {:?}", path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn rejects_rows_of_the_wrong_width() {
        let mut t = Table::new(strings(&["Symbol", "Price"]));
        assert!(t.push_row(strings(&["AAA"])).is_err());
        assert!(t.push_row(strings(&["AAA", "1", "x"])).is_err());
        assert!(t.push_row(strings(&["AAA", "1"])).is_ok());
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn set_and_drop_column_keep_rows_aligned() {
        let mut t = Table::from_rows(
            strings(&["Symbol", "Price"]),
            vec![strings(&["AAA", "1"]), strings(&["BBB", "2"])],
        )
        .unwrap();

        t.set_column("Extra", strings(&["x", "y"])).unwrap();
        assert_eq!(t.get(1, "Extra"), Some("y"));

        t.drop_column("Price");
        assert_eq!(t.columns(), &strings(&["Symbol", "Extra"])[..]);
        assert_eq!(t.rows()[0].cells(), &strings(&["AAA", "x"])[..]);

        assert!(t.set_column("Short", strings(&["only one"])).is_err());
    }

    #[test]
    fn split_clamps_to_length() {
        let t = Table::from_rows(strings(&["A"]), vec![strings(&["1"]), strings(&["2"])]).unwrap();
        let (head, tail) = t.split_at(20);
        assert_eq!(head.len(), 2);
        assert_eq!(tail.len(), 0);
        assert_eq!(tail.columns(), head.columns());
    }

    #[test]
    fn csv_quotes_only_when_needed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        let t = Table::from_rows(
            strings(&["Name", "Market Cap"]),
            vec![strings(&["Acme, Inc.", "1.2B"])],
        )
        .unwrap();
        t.write_csv(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "Name,Market Cap\n\"Acme, Inc.\",1.2B\n");
    }
}
