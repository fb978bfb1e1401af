//! Planar polygon primitives in lon/lat degrees.

use crate::coord::BoundingBox;

/// A closed ring of `(lon, lat)` points. The closing point may be repeated.
#[derive(Debug, Clone)]
pub struct Ring {
    points: Vec<(f64, f64)>,
}

impl Ring {
    pub fn new(mut points: Vec<(f64, f64)>) -> Self {
        if points.len() > 1 && points.first() == points.last() {
            points.pop();
        }
        Self { points }
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Iterate over the ring's edges, including the closing edge.
    pub fn edges(&self) -> impl Iterator<Item = ((f64, f64), (f64, f64))> + '_ {
        let n = self.points.len();
        (0..n).map(move |i| (self.points[i], self.points[(i + 1) % n]))
    }

    /// Even-odd ray casting.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        let mut inside = false;
        for ((x1, y1), (x2, y2)) in self.edges() {
            if (y1 > lat) != (y2 > lat) {
                let x_cross = x1 + (lat - y1) / (y2 - y1) * (x2 - x1);
                if lon < x_cross {
                    inside = !inside;
                }
            }
        }
        inside
    }
}

/// A polygon with one exterior ring and any number of holes.
#[derive(Debug, Clone)]
pub struct Polygon {
    exterior: Ring,
    holes: Vec<Ring>,
    bbox: BoundingBox,
}

impl Polygon {
    /// Returns `None` for degenerate exteriors with fewer than three points.
    pub fn new(exterior: Ring, holes: Vec<Ring>) -> Option<Self> {
        if exterior.len() < 3 {
            return None;
        }
        let mut bbox = BoundingBox::empty();
        for &(lon, lat) in exterior.points() {
            bbox.extend(lon, lat);
        }
        let holes = holes.into_iter().filter(|h| h.len() >= 3).collect();
        Some(Self {
            exterior,
            holes,
            bbox,
        })
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    /// Point-in-polygon honouring holes.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        self.exterior.contains(lon, lat) && !self.holes.iter().any(|h| h.contains(lon, lat))
    }

    fn rings(&self) -> impl Iterator<Item = &Ring> {
        std::iter::once(&self.exterior).chain(self.holes.iter())
    }

    /// Whether this polygon and the rectangle share any point.
    pub fn intersects_rect(&self, rect: &BoundingBox) -> bool {
        if !self.bbox.overlaps(rect) {
            return false;
        }

        let corners = rect.corners();
        if corners.iter().any(|&(lon, lat)| self.contains(lon, lat)) {
            return true;
        }

        if self
            .exterior
            .points()
            .iter()
            .any(|&(lon, lat)| rect.contains(lon, lat))
        {
            return true;
        }

        let rect_edges = [
            (corners[0], corners[1]),
            (corners[1], corners[2]),
            (corners[2], corners[3]),
            (corners[3], corners[0]),
        ];
        self.rings().any(|ring| {
            ring.edges().any(|(a, b)| {
                rect_edges
                    .iter()
                    .any(|&(c, d)| segments_intersect(a, b, c, d))
            })
        })
    }
}

fn orientation(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> f64 {
    (b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0)
}

fn on_segment(a: (f64, f64), b: (f64, f64), p: (f64, f64)) -> bool {
    p.0 >= a.0.min(b.0) && p.0 <= a.0.max(b.0) && p.1 >= a.1.min(b.1) && p.1 <= a.1.max(b.1)
}

/// Closed segment intersection, collinear overlaps included.
pub fn segments_intersect(p1: (f64, f64), p2: (f64, f64), q1: (f64, f64), q2: (f64, f64)) -> bool {
    let d1 = orientation(q1, q2, p1);
    let d2 = orientation(q1, q2, p2);
    let d3 = orientation(p1, p2, q1);
    let d4 = orientation(p1, p2, q2);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    (d1 == 0.0 && on_segment(q1, q2, p1))
        || (d2 == 0.0 && on_segment(q1, q2, p2))
        || (d3 == 0.0 && on_segment(p1, p2, q1))
        || (d4 == 0.0 && on_segment(p1, p2, q2))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(west: f64, south: f64, east: f64, north: f64) -> Ring {
        Ring::new(vec![
            (west, south),
            (east, south),
            (east, north),
            (west, north),
            (west, south),
        ])
    }

    fn rect(west: f64, south: f64, east: f64, north: f64) -> BoundingBox {
        BoundingBox {
            west,
            south,
            east,
            north,
        }
    }

    #[test]
    fn test_ring_drops_closing_point() {
        assert_eq!(square(0.0, 0.0, 1.0, 1.0).len(), 4);
    }

    #[test]
    fn test_rect_inside_polygon() {
        let poly = Polygon::new(square(0.0, 0.0, 10.0, 10.0), vec![]).unwrap();
        assert!(poly.intersects_rect(&rect(2.0, 2.0, 3.0, 3.0)));
    }

    #[test]
    fn test_polygon_inside_rect() {
        let poly = Polygon::new(square(2.0, 2.0, 3.0, 3.0), vec![]).unwrap();
        assert!(poly.intersects_rect(&rect(0.0, 0.0, 10.0, 10.0)));
    }

    #[test]
    fn test_edges_crossing_without_contained_vertices() {
        // A thin horizontal bar crossing a square with no vertex inside it.
        let poly = Polygon::new(square(-5.0, 4.0, 15.0, 6.0), vec![]).unwrap();
        assert!(poly.intersects_rect(&rect(0.0, 0.0, 10.0, 10.0)));
    }

    #[test]
    fn test_disjoint() {
        let poly = Polygon::new(square(0.0, 0.0, 1.0, 1.0), vec![]).unwrap();
        assert!(!poly.intersects_rect(&rect(2.0, 2.0, 3.0, 3.0)));
    }

    #[test]
    fn test_rect_inside_hole() {
        let poly = Polygon::new(
            square(0.0, 0.0, 10.0, 10.0),
            vec![square(2.0, 2.0, 8.0, 8.0)],
        )
        .unwrap();
        assert!(!poly.intersects_rect(&rect(4.0, 4.0, 5.0, 5.0)));
        assert!(poly.intersects_rect(&rect(7.0, 7.0, 9.0, 9.0)));
    }

    #[test]
    fn test_degenerate_polygon_rejected() {
        assert!(Polygon::new(Ring::new(vec![(0.0, 0.0), (1.0, 1.0)]), vec![]).is_none());
    }

    #[test]
    fn test_touching_edges_count() {
        assert!(segments_intersect((0.0, 0.0), (1.0, 0.0), (1.0, 0.0), (1.0, 1.0)));
        assert!(!segments_intersect((0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)));
    }
}
