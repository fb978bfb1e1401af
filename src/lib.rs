//! tilekeeper - map tile discovery and refresh.
//!
//! Discovers every tile of a zoom range that intersects a target region,
//! then keeps a local SQLite copy of their content fresh, recording how it
//! changes over time.

pub mod cli;
pub mod config;
pub mod controller;
pub mod coord;
pub mod discovery;
pub mod error;
pub mod geometry;
pub mod models;
pub mod repository;
pub mod scheduler;
pub mod schema;

pub use controller::{Controller, InitializeOutcome, RunState, Status};
pub use coord::TileCoord;
pub use error::{FetchError, GeometryError, Result, TileError};
