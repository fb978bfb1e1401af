//! Database context: connection setup, schema creation and repository access.

use std::path::Path;
use std::time::Duration;

use diesel_async::SimpleAsyncConnection;

use super::content::ContentRepository;
use super::pool::{DbError, SqliteConn, SqlitePool};
use super::settings::SettingsRepository;
use super::stats::StatsRepository;
use super::tiles::TileRepository;
use crate::error::TileError;

/// Entry point for all tile database operations.
///
/// # Example
/// ```ignore
/// let ctx = DbContext::connect_with_retry("tiles.db", 5, Duration::from_millis(200)).await?;
/// ctx.init_schema().await?;
/// let known = ctx.tiles().count().await?;
/// ```
#[derive(Clone, Debug)]
pub struct DbContext {
    pool: SqlitePool,
}

impl DbContext {
    pub fn new(database_url: &str) -> Self {
        Self {
            pool: SqlitePool::new(database_url),
        }
    }

    pub fn from_path(db_path: &Path) -> Self {
        Self {
            pool: SqlitePool::from_path(db_path),
        }
    }

    /// Open the database, retrying with exponential backoff.
    ///
    /// Waits `base_delay`, `2 * base_delay`, ... between attempts and fails
    /// with [`TileError::Connectivity`] once `attempts` are used up.
    pub async fn connect_with_retry(
        database_url: &str,
        attempts: u32,
        base_delay: Duration,
    ) -> Result<Self, TileError> {
        let ctx = Self::new(database_url);
        let attempts = attempts.max(1);
        let mut delay = base_delay;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match ctx.ping().await {
                Ok(()) => {
                    if attempt > 1 {
                        tracing::info!("Connected to database after {} attempts", attempt);
                    }
                    return Ok(ctx);
                }
                Err(e) => {
                    last_error = e.to_string();
                    if attempt < attempts {
                        tracing::warn!(
                            "Database connection attempt {}/{} failed: {}; retrying in {:?}",
                            attempt,
                            attempts,
                            e,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                        delay = delay.saturating_mul(2);
                    }
                }
            }
        }

        tracing::error!(
            "Database unreachable after {} attempts: {}",
            attempts,
            last_error
        );
        Err(TileError::Connectivity {
            attempts,
            message: last_error,
        })
    }

    async fn ping(&self) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        conn.batch_execute("SELECT 1;").await
    }

    pub fn tiles(&self) -> TileRepository {
        TileRepository::new(self.pool.clone())
    }

    pub fn content(&self) -> ContentRepository {
        ContentRepository::new(self.pool.clone())
    }

    pub fn settings(&self) -> SettingsRepository {
        SettingsRepository::new(self.pool.clone())
    }

    pub fn stats(&self) -> StatsRepository {
        StatsRepository::new(self.pool.clone())
    }

    /// Create tables and indexes if they don't exist.
    pub async fn init_schema(&self) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        Self::init_sqlite_schema(&mut conn).await
    }

    async fn init_sqlite_schema(conn: &mut SqliteConn) -> Result<(), DbError> {
        conn.batch_execute(
            r#"
            PRAGMA journal_mode = WAL;

            -- Tiles known to intersect the target region
            CREATE TABLE IF NOT EXISTS tiles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                x INTEGER NOT NULL,
                y INTEGER NOT NULL,
                z INTEGER NOT NULL,
                parent_x INTEGER,
                parent_y INTEGER,
                parent_z INTEGER,
                created_at TEXT NOT NULL,
                UNIQUE(x, y, z)
            );

            -- Latest fetched bytes per tile
            CREATE TABLE IF NOT EXISTS tile_content (
                x INTEGER NOT NULL,
                y INTEGER NOT NULL,
                z INTEGER NOT NULL,
                data BLOB NOT NULL,
                hash TEXT NOT NULL,
                last_modified TEXT NOT NULL,
                PRIMARY KEY (x, y, z)
            );

            -- Append-only content history
            CREATE TABLE IF NOT EXISTS tile_content_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                x INTEGER NOT NULL,
                y INTEGER NOT NULL,
                z INTEGER NOT NULL,
                data BLOB NOT NULL,
                hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Singleton progress record
            CREATE TABLE IF NOT EXISTS stats (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                total_tiles INTEGER NOT NULL DEFAULT 0,
                processed_tiles INTEGER NOT NULL DEFAULT 0,
                updated_tiles INTEGER NOT NULL DEFAULT 0,
                current_zoom INTEGER,
                last_update TEXT,
                initialization_start_time TEXT,
                initialization_end_time TEXT
            );
            INSERT OR IGNORE INTO stats (id) VALUES (1);

            CREATE INDEX IF NOT EXISTS idx_tiles_z_id ON tiles(z, id);
            CREATE INDEX IF NOT EXISTS idx_tile_content_last_modified ON tile_content(last_modified);
            CREATE INDEX IF NOT EXISTS idx_tile_content_history_tile ON tile_content_history(x, y, z);
            "#,
        )
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_init_schema_is_repeatable() {
        let dir = tempdir().unwrap();
        let ctx = DbContext::from_path(&dir.path().join("ctx.db"));
        ctx.init_schema().await.unwrap();
        ctx.init_schema().await.unwrap();

        assert_eq!(ctx.tiles().count().await.unwrap(), 0);
        assert_eq!(ctx.content().count().await.unwrap(), 0);
        assert_eq!(ctx.stats().get().await.unwrap().total_tiles, 0);
    }

    #[tokio::test]
    async fn test_connect_with_retry_succeeds() {
        let dir = tempdir().unwrap();
        let url = dir.path().join("retry.db").display().to_string();
        let ctx = DbContext::connect_with_retry(&url, 3, Duration::from_millis(1))
            .await
            .unwrap();
        ctx.init_schema().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_with_retry_gives_up() {
        let dir = tempdir().unwrap();
        let url = dir
            .path()
            .join("missing")
            .join("nested")
            .join("db.sqlite")
            .display()
            .to_string();
        let err = DbContext::connect_with_retry(&url, 3, Duration::from_millis(1))
            .await
            .unwrap_err();
        assert!(matches!(err, TileError::Connectivity { attempts: 3, .. }));
    }
}
