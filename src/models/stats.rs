//! Progress statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The singleton progress record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressStats {
    pub total_tiles: u64,
    pub processed_tiles: u64,
    pub updated_tiles: u64,
    pub current_zoom: Option<u8>,
    pub last_update: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub initialization_start_time: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub initialization_end_time: Option<DateTime<Utc>>,
}

/// How counters in a [`StatsUpdate`] combine with the stored values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    Replace,
    Increment,
}

/// A partial change to [`ProgressStats`].
///
/// In increment mode counters are added; every other field is replaced
/// whenever it is set.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsUpdate {
    pub mode: UpdateMode,
    pub total_tiles: Option<u64>,
    pub processed_tiles: Option<u64>,
    pub updated_tiles: Option<u64>,
    pub current_zoom: Option<u8>,
    pub last_update: Option<DateTime<Utc>>,
    pub initialization_start_time: Option<DateTime<Utc>>,
    /// `Some(None)` clears the stored end time.
    pub initialization_end_time: Option<Option<DateTime<Utc>>>,
}

impl StatsUpdate {
    fn with_mode(mode: UpdateMode) -> Self {
        Self {
            mode,
            total_tiles: None,
            processed_tiles: None,
            updated_tiles: None,
            current_zoom: None,
            last_update: None,
            initialization_start_time: None,
            initialization_end_time: None,
        }
    }

    pub fn replace() -> Self {
        Self::with_mode(UpdateMode::Replace)
    }

    pub fn increment() -> Self {
        Self::with_mode(UpdateMode::Increment)
    }

    pub fn total_tiles(mut self, value: u64) -> Self {
        self.total_tiles = Some(value);
        self
    }

    pub fn processed_tiles(mut self, value: u64) -> Self {
        self.processed_tiles = Some(value);
        self
    }

    pub fn updated_tiles(mut self, value: u64) -> Self {
        self.updated_tiles = Some(value);
        self
    }

    pub fn current_zoom(mut self, z: u8) -> Self {
        self.current_zoom = Some(z);
        self
    }

    pub fn last_update(mut self, at: DateTime<Utc>) -> Self {
        self.last_update = Some(at);
        self
    }

    /// Stamp the start of discovery and clear any previous end time.
    pub fn initialization_started(mut self, at: DateTime<Utc>) -> Self {
        self.initialization_start_time = Some(at);
        self.initialization_end_time = Some(None);
        self
    }

    pub fn initialization_finished(mut self, at: DateTime<Utc>) -> Self {
        self.initialization_end_time = Some(Some(at));
        self
    }

    /// Apply this update to `current`, returning the new record.
    pub fn apply_to(&self, current: &ProgressStats) -> ProgressStats {
        let combine = |stored: u64, given: Option<u64>| match (self.mode, given) {
            (_, None) => stored,
            (UpdateMode::Replace, Some(v)) => v,
            (UpdateMode::Increment, Some(v)) => stored.saturating_add(v),
        };

        ProgressStats {
            total_tiles: combine(current.total_tiles, self.total_tiles),
            processed_tiles: combine(current.processed_tiles, self.processed_tiles),
            updated_tiles: combine(current.updated_tiles, self.updated_tiles),
            current_zoom: self.current_zoom.or(current.current_zoom),
            last_update: self.last_update.or(current.last_update),
            initialization_start_time: self
                .initialization_start_time
                .or(current.initialization_start_time),
            initialization_end_time: match self.initialization_end_time {
                Some(end) => end,
                None => current.initialization_end_time,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored() -> ProgressStats {
        ProgressStats {
            total_tiles: 10,
            processed_tiles: 4,
            updated_tiles: 2,
            current_zoom: Some(14),
            ..Default::default()
        }
    }

    #[test]
    fn test_increment_adds_counters() {
        let next = StatsUpdate::increment()
            .processed_tiles(3)
            .updated_tiles(1)
            .current_zoom(15)
            .apply_to(&stored());
        assert_eq!(next.total_tiles, 10);
        assert_eq!(next.processed_tiles, 7);
        assert_eq!(next.updated_tiles, 3);
        assert_eq!(next.current_zoom, Some(15));
    }

    #[test]
    fn test_replace_sets_given_fields_only() {
        let next = StatsUpdate::replace().total_tiles(99).apply_to(&stored());
        assert_eq!(next.total_tiles, 99);
        assert_eq!(next.processed_tiles, 4);
        assert_eq!(next.current_zoom, Some(14));
    }

    #[test]
    fn test_initialization_start_clears_end() {
        let mut current = stored();
        current.initialization_end_time = Some(Utc::now());
        let next = StatsUpdate::replace()
            .initialization_started(Utc::now())
            .apply_to(&current);
        assert!(next.initialization_start_time.is_some());
        assert!(next.initialization_end_time.is_none());
    }
}
