//! Data models for tilekeeper.

mod settings;
mod stats;
mod tile;

pub use settings::{
    validate_zoom_bounds, HistoryMode, RefreshSettings, SettingsUpdate, MAX_UPDATE_INTERVAL_HOURS,
};
pub use stats::{ProgressStats, StatsUpdate, UpdateMode};
pub use tile::{
    refresh_priority, FetchOutcome, TileContent, TileRecord, TileVersion, WorkItem,
    AGE_WEIGHT, NEVER_FETCHED_BONUS,
};
