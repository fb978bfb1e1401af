//! Tile store: SQLite persistence through diesel-async.

mod content;
mod context;
mod pool;
mod records;
mod settings;
mod stats;
mod tiles;
mod util;

pub use content::ContentRepository;
pub use context::DbContext;
pub use pool::{DbError, SqliteConn, SqlitePool};
pub use settings::SettingsRepository;
pub use stats::StatsRepository;
pub use tiles::TileRepository;
pub use util::{format_datetime, parse_datetime, parse_datetime_opt};
