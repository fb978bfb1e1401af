//! Target-region geometry index.
//!
//! Loads the region polygons once and answers tile intersection queries.
//! Nothing here performs I/O after [`GeometryIndex::load`] returns.

mod polygon;
mod region;

pub use polygon::{Polygon, Ring};
pub use region::parse_polygons;

use std::path::Path;

use crate::coord::{lon_lat_to_tile, BoundingBox, TileCoord};
use crate::error::GeometryError;

/// Region polygons plus their combined bounding box.
#[derive(Debug, Clone)]
pub struct GeometryIndex {
    polygons: Vec<Polygon>,
    bbox: BoundingBox,
}

impl GeometryIndex {
    /// Build an index from already-parsed polygons.
    pub fn new(polygons: Vec<Polygon>) -> Result<Self, GeometryError> {
        if polygons.is_empty() {
            return Err(GeometryError::Empty);
        }
        let mut bbox = BoundingBox::empty();
        for polygon in &polygons {
            bbox.merge(polygon.bbox());
        }
        Ok(Self { polygons, bbox })
    }

    /// Parse a GeoJSON document.
    pub fn from_geojson_str(geojson: &str) -> Result<Self, GeometryError> {
        let value: serde_json::Value = serde_json::from_str(geojson)?;
        Self::new(parse_polygons(&value)?)
    }

    /// Read and parse a GeoJSON file.
    pub async fn load(path: &Path) -> Result<Self, GeometryError> {
        let contents =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| GeometryError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
        let index = Self::from_geojson_str(&contents)?;
        tracing::info!(
            "Loaded region {} ({} polygons)",
            path.display(),
            index.polygons.len()
        );
        Ok(index)
    }

    pub fn polygon_count(&self) -> usize {
        self.polygons.len()
    }

    /// Bounding box of the whole region.
    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    /// Whether the tile's footprint intersects any region polygon.
    pub fn intersects(&self, tile: TileCoord) -> bool {
        let rect = tile.bounds();
        if !self.bbox.overlaps(&rect) {
            return false;
        }
        self.polygons.iter().any(|p| p.intersects_rect(&rect))
    }

    /// Inclusive tile ranges `(min, max)` covering the region's bounding box at zoom `z`.
    pub fn tile_range(&self, z: u8) -> (TileCoord, TileCoord) {
        let min = lon_lat_to_tile(self.bbox.west, self.bbox.north, z);
        let max = lon_lat_to_tile(self.bbox.east, self.bbox.south, z);
        (min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: &str = r#"{
        "type": "Feature",
        "properties": {},
        "geometry": {
            "type": "Polygon",
            "coordinates": [[[10.0, 45.0], [11.0, 45.0], [11.0, 46.0], [10.0, 46.0], [10.0, 45.0]]]
        }
    }"#;

    #[test]
    fn test_intersects_inside_and_outside() {
        let index = GeometryIndex::from_geojson_str(SQUARE).unwrap();
        let inside = lon_lat_to_tile(10.5, 45.5, 12);
        let outside = lon_lat_to_tile(20.0, 45.5, 12);
        assert!(index.intersects(inside));
        assert!(!index.intersects(outside));
    }

    #[test]
    fn test_tile_range_covers_bbox() {
        let index = GeometryIndex::from_geojson_str(SQUARE).unwrap();
        let (min, max) = index.tile_range(8);
        assert!(min.x <= max.x && min.y <= max.y);
        for x in min.x..=max.x {
            for y in min.y..=max.y {
                assert!(index.intersects(TileCoord::new(x, y, 8)));
            }
        }
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            GeometryIndex::from_geojson_str("{not json"),
            Err(GeometryError::Json(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = GeometryIndex::load(Path::new("/nonexistent/region.geojson"))
            .await
            .unwrap_err();
        assert!(matches!(err, GeometryError::Io { .. }));
    }
}
