//! Current tile content and its version history.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl};

use super::pool::{DbError, SqlitePool};
use super::records::{ContentRow, HistoryRow, NewContent, NewHistory};
use super::util::format_datetime;
use crate::coord::TileCoord;
use crate::models::{FetchOutcome, HistoryMode, TileContent, TileVersion};
use crate::schema::{tile_content, tile_content_history};

/// Repository for `tile_content` and `tile_content_history`.
#[derive(Clone)]
pub struct ContentRepository {
    pool: SqlitePool,
}

impl ContentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Commit a fetched tile.
    ///
    /// Runs in one transaction: read the stored hash, append history when
    /// `mode` asks for it, then upsert the current content (or only refresh
    /// `last_modified` when the hash is unchanged). Nothing is written if any
    /// step fails.
    pub async fn record_fetch(
        &self,
        coord: TileCoord,
        data: &[u8],
        hash: &str,
        mode: HistoryMode,
        fetched_at: DateTime<Utc>,
    ) -> Result<FetchOutcome, DbError> {
        let mut conn = self.pool.get().await?;
        let stamp = format_datetime(fetched_at);
        let now = stamp.as_str();
        let (x, y, z) = (coord.x as i32, coord.y as i32, i32::from(coord.z));

        conn.transaction(|conn| {
            Box::pin(async move {
                let stored: Option<String> = tile_content::table
                    .find((x, y, z))
                    .select(tile_content::hash)
                    .first(conn)
                    .await
                    .optional()?;

                let outcome = match stored {
                    None => FetchOutcome::Created,
                    Some(ref previous) if previous == hash => FetchOutcome::Unchanged,
                    Some(_) => FetchOutcome::Changed,
                };

                let append_history = match outcome {
                    FetchOutcome::Created => false,
                    FetchOutcome::Changed => true,
                    FetchOutcome::Unchanged => mode == HistoryMode::Confirmations,
                };
                if append_history {
                    diesel::insert_into(tile_content_history::table)
                        .values(&NewHistory {
                            x,
                            y,
                            z,
                            data,
                            hash,
                            created_at: now,
                        })
                        .execute(conn)
                        .await?;
                }

                if outcome == FetchOutcome::Unchanged {
                    diesel::update(tile_content::table.find((x, y, z)))
                        .set(tile_content::last_modified.eq(now))
                        .execute(conn)
                        .await?;
                } else {
                    diesel::replace_into(tile_content::table)
                        .values(&NewContent {
                            x,
                            y,
                            z,
                            data,
                            hash,
                            last_modified: now,
                        })
                        .execute(conn)
                        .await?;
                }

                Ok::<_, DbError>(outcome)
            })
        })
        .await
    }

    pub async fn get(&self, coord: TileCoord) -> Result<Option<TileContent>, DbError> {
        let mut conn = self.pool.get().await?;

        tile_content::table
            .find((coord.x as i32, coord.y as i32, i32::from(coord.z)))
            .select(ContentRow::as_select())
            .first::<ContentRow>(&mut conn)
            .await
            .optional()
            .map(|row| row.map(TileContent::from))
    }

    /// Number of tiles that have stored content.
    pub async fn count(&self) -> Result<u64, DbError> {
        let mut conn = self.pool.get().await?;

        let count: i64 = tile_content::table.count().get_result(&mut conn).await?;
        Ok(count.max(0) as u64)
    }

    /// Archived versions of one tile, oldest first.
    pub async fn history(&self, coord: TileCoord) -> Result<Vec<TileVersion>, DbError> {
        let mut conn = self.pool.get().await?;

        tile_content_history::table
            .filter(tile_content_history::x.eq(coord.x as i32))
            .filter(tile_content_history::y.eq(coord.y as i32))
            .filter(tile_content_history::z.eq(i32::from(coord.z)))
            .order(tile_content_history::id.asc())
            .select(HistoryRow::as_select())
            .load::<HistoryRow>(&mut conn)
            .await
            .map(|rows| rows.into_iter().map(TileVersion::from).collect())
    }

    pub async fn history_count(&self) -> Result<u64, DbError> {
        let mut conn = self.pool.get().await?;

        let count: i64 = tile_content_history::table
            .count()
            .get_result(&mut conn)
            .await?;
        Ok(count.max(0) as u64)
    }
}
