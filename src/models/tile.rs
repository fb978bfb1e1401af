//! Tile records and refresh work items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::coord::TileCoord;

/// Bonus added to tiles that have never been fetched.
pub const NEVER_FETCHED_BONUS: f64 = 10_000.0;

/// Weight applied to a tile's age in hours.
pub const AGE_WEIGHT: f64 = 100.0;

/// A tile known to intersect the target region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileRecord {
    /// Insertion order; used for keyset pagination during discovery.
    pub id: i64,
    pub coord: TileCoord,
    /// The tile at `z - 1` this one was derived from. `None` at the minimum zoom.
    pub parent: Option<TileCoord>,
    pub created_at: DateTime<Utc>,
}

/// Current stored content for a tile.
#[derive(Debug, Clone, PartialEq)]
pub struct TileContent {
    pub coord: TileCoord,
    pub data: Vec<u8>,
    pub hash: String,
    pub last_modified: DateTime<Utc>,
}

impl TileContent {
    /// Compute SHA-256 hash of content.
    pub fn compute_hash(content: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content);
        hex::encode(hasher.finalize())
    }
}

/// One archived version of a tile.
#[derive(Debug, Clone, PartialEq)]
pub struct TileVersion {
    pub id: i64,
    pub coord: TileCoord,
    pub data: Vec<u8>,
    pub hash: String,
    pub created_at: DateTime<Utc>,
}

/// What a committed fetch did to the stored content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// First content ever stored for the tile.
    Created,
    /// Content replaced with bytes whose hash differs.
    Changed,
    /// Same hash as before; freshness timestamp refreshed.
    Unchanged,
}

impl FetchOutcome {
    /// Whether stored bytes were written or replaced.
    pub fn is_update(&self) -> bool {
        matches!(self, FetchOutcome::Created | FetchOutcome::Changed)
    }
}

/// A stale tile waiting in the refresh queue.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub coord: TileCoord,
    pub hash: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub priority: f64,
}

impl WorkItem {
    pub fn new(
        coord: TileCoord,
        hash: Option<String>,
        last_modified: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        let priority = refresh_priority(last_modified, now);
        Self {
            coord,
            hash,
            last_modified,
            priority,
        }
    }

    pub fn is_never_fetched(&self) -> bool {
        self.last_modified.is_none()
    }
}

/// `age_hours * 100 + (never_fetched ? 10000 : 0)`, with an infinite age for
/// tiles that have never been fetched.
pub fn refresh_priority(last_modified: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    match last_modified {
        None => f64::INFINITY * AGE_WEIGHT + NEVER_FETCHED_BONUS,
        Some(ts) => {
            let age_hours = (now - ts).num_milliseconds() as f64 / 3_600_000.0;
            age_hours * AGE_WEIGHT
        }
    }
}
