//! SQLite connection factory.
//!
//! Uses diesel-async's SyncConnectionWrapper to provide an async interface
//! for SQLite. Connections are cheap, so one is opened per operation instead
//! of pooling.

use std::path::Path;

use diesel::sqlite::SqliteConnection;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::{AsyncConnection, SimpleAsyncConnection};

/// Diesel error type alias.
pub type DbError = diesel::result::Error;

/// Async SQLite connection.
pub type SqliteConn = SyncConnectionWrapper<SqliteConnection>;

/// Milliseconds a connection waits on a locked database before failing.
const BUSY_TIMEOUT_MS: u32 = 5_000;

#[derive(Clone, Debug)]
pub struct SqlitePool {
    database_url: String,
}

impl SqlitePool {
    /// Accepts plain paths as well as `sqlite:` / `sqlite://` URLs.
    pub fn new(database_url: &str) -> Self {
        let url = database_url
            .strip_prefix("sqlite://")
            .or_else(|| database_url.strip_prefix("sqlite:"))
            .unwrap_or(database_url);
        Self {
            database_url: url.to_string(),
        }
    }

    pub fn from_path(db_path: &Path) -> Self {
        Self::new(&db_path.display().to_string())
    }

    /// Open a new connection with the busy timeout applied.
    pub async fn get(&self) -> Result<SqliteConn, DbError> {
        let mut conn = SqliteConn::establish(&self.database_url)
            .await
            .map_err(super::util::to_diesel_error)?;
        conn.batch_execute(&format!("PRAGMA busy_timeout = {};", BUSY_TIMEOUT_MS))
            .await?;
        Ok(conn)
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }
}
