// src/enrich/cache.rs

use std::collections::HashMap;

use super::api::Lookup;

/// Lookup outcomes by symbol for the lifetime of one run. Never persisted.
#[derive(Debug, Default)]
pub struct EnrichmentCache {
    entries: HashMap<String, Lookup>,
}

impl EnrichmentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Lookup> {
        self.entries.get(key)
    }

    /// Store the outcome for a key that missed. An existing entry is kept
    /// and returned, so the first fetched outcome for a key is the one used.
    pub fn insert_on_miss(&mut self, key: &str, outcome: Lookup) -> &Lookup {
        self.entries.entry(key.to_string()).or_insert(outcome)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
