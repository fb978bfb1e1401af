//! Discovery result types.

use std::collections::BTreeMap;
use std::time::Duration;

/// Summary of one discovery run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryReport {
    pub min_zoom: u8,
    pub max_zoom: u8,
    /// Records stored at each zoom level after the run.
    pub per_zoom: BTreeMap<u8, u64>,
    /// Rows this run actually inserted. Zero on an idempotent re-run.
    pub inserted: u64,
    /// Authoritative row count across all levels.
    pub total_tiles: u64,
    pub elapsed: Duration,
}

impl DiscoveryReport {
    pub fn tiles_at(&self, z: u8) -> u64 {
        self.per_zoom.get(&z).copied().unwrap_or(0)
    }
}
