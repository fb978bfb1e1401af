//! Scheduler settings persistence.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl};

use super::pool::{DbError, SqlitePool};
use super::records::{NewSetting, SettingRow};
use super::util::format_datetime;
use crate::models::RefreshSettings;
use crate::schema::settings;

#[derive(Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Raw stored `(key, value)` pairs.
    pub async fn entries(&self) -> Result<Vec<(String, String)>, DbError> {
        let mut conn = self.pool.get().await?;

        settings::table
            .order(settings::key.asc())
            .select(SettingRow::as_select())
            .load::<SettingRow>(&mut conn)
            .await
            .map(|rows| rows.into_iter().map(|r| (r.key, r.value)).collect())
    }

    /// Stored settings merged over the defaults.
    pub async fn current(&self) -> Result<RefreshSettings, DbError> {
        Ok(RefreshSettings::from_entries(self.entries().await?))
    }

    /// Write the given keys, replacing existing values.
    pub async fn upsert(&self, entries: &[(String, String)]) -> Result<(), DbError> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut conn = self.pool.get().await?;
        let stamp = format_datetime(Utc::now());
        let now = stamp.as_str();

        conn.transaction(|conn| {
            Box::pin(async move {
                for (key, value) in entries {
                    diesel::replace_into(settings::table)
                        .values(&NewSetting {
                            key,
                            value,
                            updated_at: now,
                        })
                        .execute(conn)
                        .await?;
                }
                Ok::<_, DbError>(())
            })
        })
        .await
    }

    /// Store every default that has no row yet.
    pub async fn seed_defaults(&self, defaults: &RefreshSettings) -> Result<u64, DbError> {
        let mut conn = self.pool.get().await?;
        let now = format_datetime(Utc::now());
        let entries = defaults.to_entries();

        let mut inserted = 0u64;
        for (key, value) in &entries {
            inserted += diesel::insert_or_ignore_into(settings::table)
                .values(&NewSetting {
                    key,
                    value,
                    updated_at: &now,
                })
                .execute(&mut conn)
                .await? as u64;
        }
        Ok(inserted)
    }
}
