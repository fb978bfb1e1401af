//! Tile existence records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Integer, Nullable, Text};
use diesel_async::{AsyncConnection, RunQueryDsl};

use super::pool::{DbError, SqlitePool};
use super::records::{coord_from_row, NewTile, TileRow};
use super::util::{format_datetime, parse_datetime_opt};
use crate::coord::TileCoord;
use crate::models::{TileRecord, WorkItem};
use crate::schema::tiles;

#[derive(diesel::QueryableByName)]
struct CountRow {
    #[diesel(sql_type = BigInt)]
    count: i64,
}

#[derive(diesel::QueryableByName)]
struct ZoomCount {
    #[diesel(sql_type = Integer)]
    z: i32,
    #[diesel(sql_type = BigInt)]
    count: i64,
}

#[derive(diesel::QueryableByName)]
struct StaleRow {
    #[diesel(sql_type = Integer)]
    x: i32,
    #[diesel(sql_type = Integer)]
    y: i32,
    #[diesel(sql_type = Integer)]
    z: i32,
    #[diesel(sql_type = Nullable<Text>)]
    hash: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    last_modified: Option<String>,
}

/// Repository for the `tiles` table.
#[derive(Clone)]
pub struct TileRepository {
    pool: SqlitePool,
}

impl TileRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert `(tile, parent)` pairs in one transaction, skipping tiles that
    /// already exist. Returns the number of rows actually inserted.
    pub async fn insert_batch(
        &self,
        batch: &[(TileCoord, Option<TileCoord>)],
    ) -> Result<u64, DbError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let mut conn = self.pool.get().await?;
        let now = format_datetime(Utc::now());
        let rows: Vec<NewTile<'_>> = batch
            .iter()
            .map(|(coord, parent)| NewTile::new(*coord, *parent, &now))
            .collect();
        let rows = &rows;

        conn.transaction(|conn| {
            Box::pin(async move {
                let mut inserted = 0u64;
                for row in rows {
                    inserted += diesel::insert_or_ignore_into(tiles::table)
                        .values(row)
                        .execute(conn)
                        .await? as u64;
                }
                Ok::<_, DbError>(inserted)
            })
        })
        .await
    }

    /// Up to `limit` records at zoom `z` with `id > after_id`, in id order.
    pub async fn page_at_zoom(
        &self,
        z: u8,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<TileRecord>, DbError> {
        let mut conn = self.pool.get().await?;

        tiles::table
            .filter(tiles::z.eq(i32::from(z)))
            .filter(tiles::id.gt(after_id))
            .order(tiles::id.asc())
            .limit(limit)
            .select(TileRow::as_select())
            .load::<TileRow>(&mut conn)
            .await
            .map(|rows| rows.into_iter().map(TileRecord::from).collect())
    }

    pub async fn get(&self, coord: TileCoord) -> Result<Option<TileRecord>, DbError> {
        let mut conn = self.pool.get().await?;

        tiles::table
            .filter(tiles::x.eq(coord.x as i32))
            .filter(tiles::y.eq(coord.y as i32))
            .filter(tiles::z.eq(i32::from(coord.z)))
            .select(TileRow::as_select())
            .first::<TileRow>(&mut conn)
            .await
            .optional()
            .map(|row| row.map(TileRecord::from))
    }

    pub async fn count(&self) -> Result<u64, DbError> {
        let mut conn = self.pool.get().await?;

        let count: i64 = tiles::table.count().get_result(&mut conn).await?;
        Ok(count.max(0) as u64)
    }

    /// Record counts keyed by zoom level.
    pub async fn count_by_zoom(&self) -> Result<BTreeMap<u8, u64>, DbError> {
        let mut conn = self.pool.get().await?;

        let rows: Vec<ZoomCount> =
            diesel::sql_query("SELECT z, COUNT(*) AS count FROM tiles GROUP BY z ORDER BY z")
                .load(&mut conn)
                .await?;

        Ok(rows
            .into_iter()
            .map(|r| (r.z.clamp(0, u8::MAX as i32) as u8, r.count.max(0) as u64))
            .collect())
    }

    /// Records above `min_zoom` whose parent record is missing.
    pub async fn count_orphans(&self, min_zoom: u8) -> Result<u64, DbError> {
        let mut conn = self.pool.get().await?;

        let row: CountRow = diesel::sql_query(
            r#"SELECT COUNT(*) AS count FROM tiles t
               WHERE t.z > ?
                 AND NOT EXISTS (
                   SELECT 1 FROM tiles p
                   WHERE p.x = t.parent_x AND p.y = t.parent_y AND p.z = t.parent_z
                 )"#,
        )
        .bind::<Integer, _>(i32::from(min_zoom))
        .get_result(&mut conn)
        .await?;
        Ok(row.count.max(0) as u64)
    }

    /// Tiles in `zooms` that were never fetched or were last modified before
    /// `cutoff`. Never-fetched tiles come first, then oldest content first.
    pub async fn stale(
        &self,
        zooms: &[u8],
        cutoff: DateTime<Utc>,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<WorkItem>, DbError> {
        if zooms.is_empty() || limit <= 0 {
            return Ok(Vec::new());
        }

        let zoom_list = zooms
            .iter()
            .map(|z| z.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let query = format!(
            r#"SELECT t.x AS x, t.y AS y, t.z AS z, c.hash AS hash, c.last_modified AS last_modified
               FROM tiles t
               LEFT JOIN tile_content c ON c.x = t.x AND c.y = t.y AND c.z = t.z
               WHERE t.z IN ({})
                 AND (c.last_modified IS NULL OR c.last_modified < ?)
               ORDER BY c.last_modified IS NOT NULL, c.last_modified ASC
               LIMIT ?"#,
            zoom_list
        );

        let mut conn = self.pool.get().await?;
        let rows: Vec<StaleRow> = diesel::sql_query(query)
            .bind::<Text, _>(format_datetime(cutoff))
            .bind::<BigInt, _>(limit)
            .load(&mut conn)
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| {
                WorkItem::new(
                    coord_from_row(r.x, r.y, r.z),
                    r.hash,
                    parse_datetime_opt(r.last_modified),
                    now,
                )
            })
            .collect())
    }

    /// Delete every tile record. Returns the number removed.
    pub async fn delete_all(&self) -> Result<u64, DbError> {
        let mut conn = self.pool.get().await?;

        let deleted = diesel::delete(tiles::table).execute(&mut conn).await?;
        Ok(deleted as u64)
    }
}
