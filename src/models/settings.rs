//! Refresh scheduler settings.
//!
//! Settings are stored as a key/value table whose values are JSON text. In
//! memory they are always a fully populated [`RefreshSettings`], with the
//! compiled defaults filling any key the store does not have.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::coord::MAX_ZOOM;
use crate::error::TileError;

/// Longest accepted `updateInterval`: one hundred years of hours.
pub const MAX_UPDATE_INTERVAL_HOURS: u32 = 100 * 366 * 24;

/// When fetched content is appended to the history table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryMode {
    /// Archive new bytes only when the hash changed.
    #[default]
    Changes,
    /// Archive every re-fetch of a known tile, unchanged or not.
    Confirmations,
}

/// Typed scheduler settings with their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RefreshSettings {
    /// Max tiles pulled into the work queue per load.
    pub batch_size: u32,
    /// Refill threshold; also the stats flush period.
    pub min_queue_size: u32,
    /// Cap per scheduler run, 0 for unbounded.
    pub max_tiles_to_process: u64,
    /// Hours a tile's content counts as fresh.
    pub update_interval: u32,
    pub min_zoom: u8,
    pub max_zoom: u8,
    /// Explicit zoom subset for scheduling. Overrides the range when non-empty.
    pub zoom_levels: Vec<u8>,
    /// Milliseconds between successive fetches.
    pub request_delay: u64,
    pub history_mode: HistoryMode,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            min_queue_size: 100,
            max_tiles_to_process: 0,
            update_interval: 24,
            min_zoom: 14,
            max_zoom: 16,
            zoom_levels: Vec::new(),
            request_delay: 100,
            history_mode: HistoryMode::Changes,
        }
    }
}

impl RefreshSettings {
    /// Build settings from stored `(key, json_text)` pairs, merged over the defaults.
    ///
    /// Unknown keys and values of the wrong type are skipped with a warning.
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut merged = match serde_json::to_value(Self::default()) {
            Ok(Value::Object(map)) => map,
            _ => return Self::default(),
        };

        for (key, raw) in entries {
            let key = key.as_ref();
            if !merged.contains_key(key) {
                tracing::warn!("Ignoring unknown stored setting '{}'", key);
                continue;
            }
            let mut candidate = merged.clone();
            candidate.insert(key.to_string(), parse_value(raw.as_ref()));
            if serde_json::from_value::<Self>(Value::Object(candidate.clone())).is_ok() {
                merged = candidate;
            } else {
                tracing::warn!(
                    "Ignoring stored setting '{}' with invalid value {}",
                    key,
                    raw.as_ref()
                );
            }
        }

        serde_json::from_value(Value::Object(merged)).unwrap_or_default()
    }

    /// Every setting as a `(key, json_text)` pair.
    pub fn to_entries(&self) -> Vec<(String, String)> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map.into_iter().map(|(k, v)| (k, v.to_string())).collect(),
            _ => Vec::new(),
        }
    }

    /// Apply a partial update and validate the result as a whole.
    pub fn merge(&self, update: &SettingsUpdate) -> Result<Self, TileError> {
        let mut next = self.clone();
        if let Some(v) = update.batch_size {
            next.batch_size = v;
        }
        if let Some(v) = update.min_queue_size {
            next.min_queue_size = v;
        }
        if let Some(v) = update.max_tiles_to_process {
            next.max_tiles_to_process = v;
        }
        if let Some(v) = update.update_interval {
            next.update_interval = v;
        }
        if let Some(v) = update.min_zoom {
            next.min_zoom = v;
        }
        if let Some(v) = update.max_zoom {
            next.max_zoom = v;
        }
        if let Some(ref v) = update.zoom_levels {
            next.zoom_levels = v.clone();
        }
        if let Some(v) = update.request_delay {
            next.request_delay = v;
        }
        if let Some(v) = update.history_mode {
            next.history_mode = v;
        }
        next.validate()?;
        Ok(next)
    }

    pub fn validate(&self) -> Result<(), TileError> {
        if self.batch_size < 1 {
            return Err(TileError::Validation("batchSize must be at least 1".into()));
        }
        if self.min_queue_size < 1 {
            return Err(TileError::Validation(
                "minQueueSize must be at least 1".into(),
            ));
        }
        if self.update_interval > MAX_UPDATE_INTERVAL_HOURS {
            return Err(TileError::Validation(format!(
                "updateInterval must not exceed {} hours",
                MAX_UPDATE_INTERVAL_HOURS
            )));
        }
        validate_zoom_bounds(self.min_zoom, self.max_zoom).map_err(TileError::Validation)?;
        if let Some(z) = self.zoom_levels.iter().find(|&&z| z > MAX_ZOOM) {
            return Err(TileError::Validation(format!(
                "zoomLevels entry {} exceeds maximum zoom {}",
                z, MAX_ZOOM
            )));
        }
        Ok(())
    }

    /// Zoom levels the scheduler refreshes, ascending and deduplicated.
    pub fn zoom_scope(&self) -> Vec<u8> {
        if self.zoom_levels.is_empty() {
            return (self.min_zoom..=self.max_zoom).collect();
        }
        let mut levels = self.zoom_levels.clone();
        levels.sort_unstable();
        levels.dedup();
        levels
    }

    /// Content last modified before this instant is stale.
    ///
    /// Saturates at the earliest representable instant.
    pub fn stale_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::try_hours(i64::from(self.update_interval))
            .and_then(|interval| now.checked_sub_signed(interval))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay)
    }
}

/// Checks `min_zoom <= max_zoom <= MAX_ZOOM`.
pub fn validate_zoom_bounds(min_zoom: u8, max_zoom: u8) -> Result<(), String> {
    if min_zoom > max_zoom {
        return Err(format!(
            "minZoom ({}) must not exceed maxZoom ({})",
            min_zoom, max_zoom
        ));
    }
    if max_zoom > MAX_ZOOM {
        return Err(format!(
            "maxZoom ({}) exceeds maximum zoom {}",
            max_zoom, MAX_ZOOM
        ));
    }
    Ok(())
}

/// A partial settings update. Unknown keys are rejected at deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SettingsUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_queue_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tiles_to_process: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_interval: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_zoom: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_zoom: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoom_levels: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_delay: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_mode: Option<HistoryMode>,
}

impl SettingsUpdate {
    /// Parse `key=value` style pairs. Values are read as JSON, falling back to
    /// a plain string.
    pub fn from_pairs<K, V>(pairs: &[(K, V)]) -> Result<Self, TileError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut map = Map::new();
        for (key, raw) in pairs {
            map.insert(key.as_ref().to_string(), parse_value(raw.as_ref()));
        }
        Self::from_json(Value::Object(map))
    }

    pub fn from_json(value: Value) -> Result<Self, TileError> {
        serde_json::from_value(value).map_err(|e| TileError::Validation(e.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// The keys this update sets, as `(key, json_text)` pairs.
    pub fn to_entries(&self) -> Vec<(String, String)> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map.into_iter().map(|(k, v)| (k, v.to_string())).collect(),
            _ => Vec::new(),
        }
    }
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
