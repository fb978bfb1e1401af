//! Diesel row types for the tile database.

use diesel::prelude::*;

use super::util::{parse_datetime, parse_datetime_opt};
use crate::coord::TileCoord;
use crate::models::{ProgressStats, TileContent, TileRecord, TileVersion};
use crate::schema;

pub(crate) fn coord_from_row(x: i32, y: i32, z: i32) -> TileCoord {
    TileCoord::new(x.max(0) as u32, y.max(0) as u32, z.clamp(0, u8::MAX as i32) as u8)
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::tiles)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TileRow {
    pub id: i64,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub parent_x: Option<i32>,
    pub parent_y: Option<i32>,
    pub parent_z: Option<i32>,
    pub created_at: String,
}

impl From<TileRow> for TileRecord {
    fn from(row: TileRow) -> Self {
        let parent = match (row.parent_x, row.parent_y, row.parent_z) {
            (Some(x), Some(y), Some(z)) => Some(coord_from_row(x, y, z)),
            _ => None,
        };
        TileRecord {
            id: row.id,
            coord: coord_from_row(row.x, row.y, row.z),
            parent,
            created_at: parse_datetime(&row.created_at),
        }
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::tiles)]
pub struct NewTile<'a> {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub parent_x: Option<i32>,
    pub parent_y: Option<i32>,
    pub parent_z: Option<i32>,
    pub created_at: &'a str,
}

impl<'a> NewTile<'a> {
    pub fn new(coord: TileCoord, parent: Option<TileCoord>, created_at: &'a str) -> Self {
        Self {
            x: coord.x as i32,
            y: coord.y as i32,
            z: i32::from(coord.z),
            parent_x: parent.map(|p| p.x as i32),
            parent_y: parent.map(|p| p.y as i32),
            parent_z: parent.map(|p| i32::from(p.z)),
            created_at,
        }
    }
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = schema::tile_content)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ContentRow {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub data: Vec<u8>,
    pub hash: String,
    pub last_modified: String,
}

impl From<ContentRow> for TileContent {
    fn from(row: ContentRow) -> Self {
        TileContent {
            coord: coord_from_row(row.x, row.y, row.z),
            data: row.data,
            hash: row.hash,
            last_modified: parse_datetime(&row.last_modified),
        }
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::tile_content)]
pub struct NewContent<'a> {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub data: &'a [u8],
    pub hash: &'a str,
    pub last_modified: &'a str,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::tile_content_history)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct HistoryRow {
    pub id: i64,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub data: Vec<u8>,
    pub hash: String,
    pub created_at: String,
}

impl From<HistoryRow> for TileVersion {
    fn from(row: HistoryRow) -> Self {
        TileVersion {
            id: row.id,
            coord: coord_from_row(row.x, row.y, row.z),
            data: row.data,
            hash: row.hash,
            created_at: parse_datetime(&row.created_at),
        }
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::tile_content_history)]
pub struct NewHistory<'a> {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub data: &'a [u8],
    pub hash: &'a str,
    pub created_at: &'a str,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = schema::settings)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SettingRow {
    pub key: String,
    pub value: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::settings)]
pub struct NewSetting<'a> {
    pub key: &'a str,
    pub value: &'a str,
    pub updated_at: &'a str,
}

/// The singleton stats row. Also used for writes via `replace_into`.
#[derive(Queryable, Selectable, Insertable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::stats)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct StatsRow {
    pub id: i32,
    pub total_tiles: i64,
    pub processed_tiles: i64,
    pub updated_tiles: i64,
    pub current_zoom: Option<i32>,
    pub last_update: Option<String>,
    pub initialization_start_time: Option<String>,
    pub initialization_end_time: Option<String>,
}

impl From<StatsRow> for ProgressStats {
    fn from(row: StatsRow) -> Self {
        ProgressStats {
            total_tiles: row.total_tiles.max(0) as u64,
            processed_tiles: row.processed_tiles.max(0) as u64,
            updated_tiles: row.updated_tiles.max(0) as u64,
            current_zoom: row.current_zoom.map(|z| z.clamp(0, u8::MAX as i32) as u8),
            last_update: parse_datetime_opt(row.last_update),
            initialization_start_time: parse_datetime_opt(row.initialization_start_time),
            initialization_end_time: parse_datetime_opt(row.initialization_end_time),
        }
    }
}

impl StatsRow {
    pub fn from_stats(stats: &ProgressStats) -> Self {
        use super::util::format_datetime;
        StatsRow {
            id: 1,
            total_tiles: stats.total_tiles as i64,
            processed_tiles: stats.processed_tiles as i64,
            updated_tiles: stats.updated_tiles as i64,
            current_zoom: stats.current_zoom.map(i32::from),
            last_update: stats.last_update.map(format_datetime),
            initialization_start_time: stats.initialization_start_time.map(format_datetime),
            initialization_end_time: stats.initialization_end_time.map(format_datetime),
        }
    }
}
