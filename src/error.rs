//! Error types shared across the library.

use thiserror::Error;

/// Failure fetching a tile from the remote source.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{0}")]
    Other(String),
}

/// Failure loading or parsing region geometry.
#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("Failed to read region file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid GeoJSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid GeoJSON: {0}")]
    Malformed(String),
    #[error("Region contains no polygons")]
    Empty,
}

/// Top-level error for tile operations.
#[derive(Debug, Error)]
pub enum TileError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Failed to load region geometry: {0}")]
    DataLoad(#[from] GeometryError),
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("Database error: {0}")]
    Persistence(#[from] diesel::result::Error),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Database unreachable after {attempts} attempts: {message}")]
    Connectivity { attempts: u32, message: String },
    #[error("Background task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, TileError>;
