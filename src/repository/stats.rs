//! Singleton progress statistics row.

use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl};

use super::pool::{DbError, SqlitePool};
use super::records::StatsRow;
use crate::models::{ProgressStats, StatsUpdate};
use crate::schema::stats;

const STATS_ID: i32 = 1;

#[derive(Clone)]
pub struct StatsRepository {
    pool: SqlitePool,
}

impl StatsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Current stats, or zeroes if the row has not been created.
    pub async fn get(&self) -> Result<ProgressStats, DbError> {
        let mut conn = self.pool.get().await?;

        stats::table
            .find(STATS_ID)
            .select(StatsRow::as_select())
            .first::<StatsRow>(&mut conn)
            .await
            .optional()
            .map(|row| row.map(ProgressStats::from).unwrap_or_default())
    }

    /// Apply `update` atomically and return the stored result.
    pub async fn apply(&self, update: &StatsUpdate) -> Result<ProgressStats, DbError> {
        let mut conn = self.pool.get().await?;

        conn.transaction(|conn| {
            Box::pin(async move {
                let current = stats::table
                    .find(STATS_ID)
                    .select(StatsRow::as_select())
                    .first::<StatsRow>(conn)
                    .await
                    .optional()?
                    .map(ProgressStats::from)
                    .unwrap_or_default();

                let next = update.apply_to(&current);
                diesel::replace_into(stats::table)
                    .values(&StatsRow::from_stats(&next))
                    .execute(conn)
                    .await?;
                Ok::<_, DbError>(next)
            })
        })
        .await
    }
}
