//! GeoJSON region parsing.

use serde_json::Value;

use super::polygon::{Polygon, Ring};
use crate::error::GeometryError;

/// Extract every polygon from a GeoJSON document.
///
/// Accepts a `FeatureCollection`, a single `Feature`, a bare `Polygon` or
/// `MultiPolygon`, or a `GeometryCollection`. Features with other geometry
/// types are skipped.
pub fn parse_polygons(geojson: &Value) -> Result<Vec<Polygon>, GeometryError> {
    let mut polygons = Vec::new();
    collect(geojson, &mut polygons)?;
    if polygons.is_empty() {
        return Err(GeometryError::Empty);
    }
    Ok(polygons)
}

fn collect(value: &Value, out: &mut Vec<Polygon>) -> Result<(), GeometryError> {
    let kind = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| GeometryError::Malformed("missing \"type\"".to_string()))?;

    match kind {
        "FeatureCollection" => {
            let features = value
                .get("features")
                .and_then(|f| f.as_array())
                .ok_or_else(|| GeometryError::Malformed("missing features array".to_string()))?;
            for feature in features {
                collect(feature, out)?;
            }
        }
        "Feature" => match value.get("geometry") {
            Some(Value::Null) | None => {}
            Some(geometry) => collect(geometry, out)?,
        },
        "GeometryCollection" => {
            if let Some(geometries) = value.get("geometries").and_then(|g| g.as_array()) {
                for geometry in geometries {
                    collect(geometry, out)?;
                }
            }
        }
        "Polygon" => {
            let coords = coordinates(value)?;
            if let Some(polygon) = parse_polygon(coords)? {
                out.push(polygon);
            }
        }
        "MultiPolygon" => {
            let coords = coordinates(value)?
                .as_array()
                .ok_or_else(|| GeometryError::Malformed("MultiPolygon coordinates".to_string()))?;
            for polygon in coords {
                if let Some(polygon) = parse_polygon(polygon)? {
                    out.push(polygon);
                }
            }
        }
        other => {
            tracing::debug!("Skipping unsupported geometry type {}", other);
        }
    }
    Ok(())
}

fn coordinates(geometry: &Value) -> Result<&Value, GeometryError> {
    geometry
        .get("coordinates")
        .ok_or_else(|| GeometryError::Malformed("geometry without coordinates".to_string()))
}

fn parse_polygon(value: &Value) -> Result<Option<Polygon>, GeometryError> {
    let rings = value
        .as_array()
        .ok_or_else(|| GeometryError::Malformed("polygon must be an array of rings".to_string()))?;

    let mut parsed = rings.iter().map(parse_ring);
    let exterior = match parsed.next() {
        Some(ring) => ring?,
        None => return Ok(None),
    };
    let holes = parsed.collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, holes))
}

fn parse_ring(value: &Value) -> Result<Ring, GeometryError> {
    let positions = value
        .as_array()
        .ok_or_else(|| GeometryError::Malformed("ring must be an array of positions".to_string()))?;

    let mut points = Vec::with_capacity(positions.len());
    for position in positions {
        let pair = position.as_array().filter(|p| p.len() >= 2);
        let (lon, lat) = match pair.and_then(|p| Some((p[0].as_f64()?, p[1].as_f64()?))) {
            Some(point) => point,
            None => {
                return Err(GeometryError::Malformed(format!(
                    "invalid position {}",
                    position
                )))
            }
        };
        points.push((lon, lat));
    }
    Ok(Ring::new(points))
}
