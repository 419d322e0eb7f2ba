//! Mock engine state
//!
//! Everything a test can observe about the mock engine after driving a
//! deployment: applied statements, uploaded resources, registered
//! procedures, call counters, and the result cache.

use std::collections::{BTreeMap, BTreeSet};

use crate::scoring::FlightRecord;

/// One cached scoring result
#[derive(Debug, Clone)]
pub struct CacheRow {
    /// Predicted label
    pub delayed: String,
    /// How many times the entry has been served
    pub usage_count: u64,
}

/// Mutable state behind the mock engine
#[derive(Debug, Default)]
pub struct EngineState {
    /// Created schema object keys (lowercased, kind-qualified for
    /// partitions)
    pub objects: BTreeSet<String>,

    /// Callable procedure names, exact case
    pub procedures: BTreeSet<String>,

    /// Applied statement texts in order
    pub statements: Vec<String>,

    /// Union of uploaded bundle entries, path → bytes
    pub resources: BTreeMap<String, Vec<u8>>,

    /// Number of bundles accepted
    pub bundle_count: usize,

    /// Operation counters
    pub call_count: usize,
    pub upload_count: usize,
    pub ad_hoc_count: usize,

    /// Result cache keyed by the full request tuple
    pub cache: BTreeMap<FlightRecord, CacheRow>,
}

impl EngineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache statistics in `cache_effectiveness` view shape:
    /// usage_count → number of entries at that count.
    pub fn cache_stats(&self) -> BTreeMap<u64, u64> {
        let mut stats = BTreeMap::new();
        for row in self.cache.values() {
            *stats.entry(row.usage_count).or_insert(0) += 1;
        }
        stats
    }
}
