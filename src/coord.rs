//! Spherical-Mercator tile coordinates.
//!
//! Conversions between geographic coordinates (longitude/latitude) and the
//! power-of-two `(x, y, z)` tile grid used by slippy-map tile servers.

use std::f64::consts::PI;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Web Mercator valid latitude range.
pub const MIN_LAT: f64 = -85.051_128_78;
pub const MAX_LAT: f64 = 85.051_128_78;

/// Deepest zoom level accepted anywhere in the system.
pub const MAX_ZOOM: u8 = 22;

/// A tile address at zoom level `z`. `x` grows eastwards, `y` southwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl TileCoord {
    pub fn new(x: u32, y: u32, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Number of tiles along one axis at this tile's zoom level.
    pub fn axis_len(&self) -> u64 {
        axis_len(self.z)
    }

    /// Whether `x` and `y` fall inside the `2^z` grid.
    pub fn is_within_grid(&self) -> bool {
        let n = self.axis_len();
        u64::from(self.x) < n && u64::from(self.y) < n
    }

    /// The four tiles one zoom level deeper that subdivide this tile.
    pub fn children(&self) -> [TileCoord; 4] {
        let (x, y, z) = (self.x * 2, self.y * 2, self.z + 1);
        [
            TileCoord::new(x, y, z),
            TileCoord::new(x + 1, y, z),
            TileCoord::new(x, y + 1, z),
            TileCoord::new(x + 1, y + 1, z),
        ]
    }

    /// The tile one zoom level shallower that contains this tile.
    pub fn parent(&self) -> Option<TileCoord> {
        if self.z == 0 {
            return None;
        }
        Some(TileCoord::new(self.x / 2, self.y / 2, self.z - 1))
    }

    /// Geographic bounding box of this tile.
    pub fn bounds(&self) -> BoundingBox {
        let (north, west) = tile_corner_to_lat_lon(self.x, self.y, self.z);
        let (south, east) = tile_corner_to_lat_lon(self.x + 1, self.y + 1, self.z);
        BoundingBox {
            west,
            south,
            east,
            north,
        }
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Axis-aligned rectangle in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    /// An empty box that any `extend` call will replace.
    pub fn empty() -> Self {
        Self {
            west: f64::INFINITY,
            south: f64::INFINITY,
            east: f64::NEG_INFINITY,
            north: f64::NEG_INFINITY,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.west > self.east || self.south > self.north
    }

    /// Grow the box to include a point.
    pub fn extend(&mut self, lon: f64, lat: f64) {
        self.west = self.west.min(lon);
        self.east = self.east.max(lon);
        self.south = self.south.min(lat);
        self.north = self.north.max(lat);
    }

    /// Grow the box to include another box.
    pub fn merge(&mut self, other: &BoundingBox) {
        if other.is_empty() {
            return;
        }
        self.extend(other.west, other.south);
        self.extend(other.east, other.north);
    }

    pub fn overlaps(&self, other: &BoundingBox) -> bool {
        self.west <= other.east
            && other.west <= self.east
            && self.south <= other.north
            && other.south <= self.north
    }

    /// Closed containment test (points on the border count as inside).
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.west && lon <= self.east && lat >= self.south && lat <= self.north
    }

    /// Corners in ring order: SW, SE, NE, NW.
    pub fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.west, self.south),
            (self.east, self.south),
            (self.east, self.north),
            (self.west, self.north),
        ]
    }
}

/// Number of tiles along one axis at zoom `z`.
pub fn axis_len(z: u8) -> u64 {
    1u64 << z
}

/// Tile containing the given point at zoom `z`.
///
/// Latitudes beyond the Mercator limit are clamped, and points on the far
/// east or south edge map to the last tile of the grid.
pub fn lon_lat_to_tile(lon: f64, lat: f64, z: u8) -> TileCoord {
    let n = axis_len(z) as f64;
    let lat = lat.clamp(MIN_LAT, MAX_LAT);
    let lon = lon.clamp(-180.0, 180.0);

    let x = ((lon + 180.0) / 360.0 * n).floor();
    let lat_rad = lat.to_radians();
    let y = ((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n).floor();

    let max = n - 1.0;
    TileCoord::new(x.clamp(0.0, max) as u32, y.clamp(0.0, max) as u32, z)
}

/// Latitude/longitude of the north-west corner of grid cell `(x, y)`.
fn tile_corner_to_lat_lon(x: u32, y: u32, z: u8) -> (f64, f64) {
    let n = axis_len(z) as f64;
    let lon = f64::from(x) / n * 360.0 - 180.0;
    let lat_rad = (PI * (1.0 - 2.0 * f64::from(y) / n)).sinh().atan();
    (lat_rad.to_degrees(), lon)
}
