//! Content-addressed caching of per-entity results.
//!
//! Keys combine the entity, a fingerprint of its input table, and a
//! fingerprint of the run configuration, so stale results can never be
//! served after either the data or the parameters change. Invalidation is
//! entirely caller-controlled; nothing expires implicitly.

use crate::core::ProfileTable;
use chrono::Datelike;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Cache key: (entity, input-data fingerprint, configuration fingerprint).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub entity: String,
    pub data_fingerprint: u64,
    pub config_fingerprint: u64,
}

/// Fingerprint of a profile table's full content: dimensions, dates, and
/// cell bit patterns. Bit-identical tables fingerprint identically.
pub fn table_fingerprint(table: &ProfileTable) -> u64 {
    let mut hasher = DefaultHasher::new();
    table.bucket_count().hash(&mut hasher);
    for date in table.dates() {
        date.num_days_from_ce().hash(&mut hasher);
    }
    for col in 0..table.date_count() {
        for cell in table.column(col) {
            match cell {
                Some(v) => {
                    1u8.hash(&mut hasher);
                    v.to_bits().hash(&mut hasher);
                }
                None => 0u8.hash(&mut hasher),
            }
        }
    }
    hasher.finish()
}

/// An explicit, caller-owned result cache.
#[derive(Debug, Clone, Default)]
pub struct ResultCache<T> {
    entries: HashMap<CacheKey, T>,
}

impl<T> ResultCache<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<&T> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: CacheKey, value: T) {
        self.entries.insert(key, value);
    }

    /// Drop every cached result for one entity, across all data and
    /// config fingerprints. Returns how many entries were removed.
    pub fn invalidate_entity(&mut self, entity: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.entity != entity);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
