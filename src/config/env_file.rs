// src/config/env_file.rs

use anyhow::{Context, Result};
use std::{collections::HashMap, fs, path::Path};
use tracing::debug;

/// Name of the entry on this line, if the line is a `KEY=VALUE` assignment.
fn entry_name(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') {
        return None;
    }
    let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
    let (name, _) = trimmed.split_once('=')?;
    let name = name.trim();
    (!name.is_empty()).then_some(name)
}

/// Value part of an assignment line, trimmed and unquoted.
fn entry_value(line: &str) -> &str {
    let value = line.split_once('=').map(|(_, v)| v).unwrap_or("").trim();
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Parse `.env` text into ordered `(key, value)` pairs.
pub fn parse(text: &str) -> Vec<(String, String)> {
    text.lines()
        .filter_map(|line| {
            entry_name(line).map(|name| (name.to_string(), entry_value(line).to_string()))
        })
        .collect()
}

/// Load a `.env` file. A missing file is an empty map; later duplicates win.
pub fn load(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        debug!(path = %path.display(), "no env file");
        return Ok(HashMap::new());
    }
    let text =
        fs::read_to_string(path).with_context(|| format!("reading env file {:?}", path))?;
    Ok(parse(&text).into_iter().collect())
}

/// Write `key=value` into the env file unless a non-empty value is already there.
///
/// An empty entry is filled in place, a missing one is appended and a missing
/// file is created. Every other line is preserved verbatim and in order.
/// Returns `false` when a populated value was left untouched.
pub fn persist_if_unset(path: &Path, key: &str, value: &str) -> Result<bool> {
    if !path.exists() {
        fs::write(path, format!("{key}={value}\n"))
            .with_context(|| format!("creating env file {:?}", path))?;
        return Ok(true);
    }

    let text =
        fs::read_to_string(path).with_context(|| format!("reading env file {:?}", path))?;

    let mut found = false;
    let mut out = String::with_capacity(text.len() + key.len() + value.len() + 2);
    for line in text.split_inclusive('\n') {
        if entry_name(line) == Some(key) && !found {
            found = true;
            if entry_value(line).is_empty() {
                let ending = if line.ends_with("\r\n") {
                    "\r\n"
                } else if line.ends_with('\n') {
                    "\n"
                } else {
                    ""
                };
                out.push_str(&format!("{key}={value}{ending}"));
            } else {
                return Ok(false);
            }
        } else {
            out.push_str(line);
        }
    }

    if !found {
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&format!("{key}={value}\n"));
    }

    fs::write(path, out).with_context(|| format!("writing env file {:?}", path))?;
    Ok(true)
}
