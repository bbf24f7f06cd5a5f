//! Incident operating-region containment.
//!
//! An incident's region is one or more polygons. Containment tests run a
//! cheap bounding-box rejection first and only fall through to the exact
//! point-in-polygon test for candidates inside a box.

use serde::{Deserialize, Serialize};

use super::coords::LatLng;

/// Axis-aligned lat/lng box.
///
/// Edges are raw degrees, deliberately not funneled through [`LatLng`]
/// normalization: tile query boxes legitimately pad past the +-180 seam and
/// must keep `west <= east` ordering for range comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLngBounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl LatLngBounds {
    #[must_use]
    pub const fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self {
            south,
            west,
            north,
            east,
        }
    }

    #[must_use]
    pub fn contains(&self, c: LatLng) -> bool {
        c.latitude() >= self.south
            && c.latitude() <= self.north
            && c.longitude() >= self.west
            && c.longitude() <= self.east
    }

    /// Smallest box containing both `self` and `other`.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            south: self.south.min(other.south),
            west: self.west.min(other.west),
            north: self.north.max(other.north),
            east: self.east.max(other.east),
        }
    }
}

/// One polygon of an incident region plus its precomputed bounding box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationBounds {
    pub polygon: Vec<LatLng>,
    pub bounds: LatLngBounds,
}

impl LocationBounds {
    /// Builds the bounding box from the polygon. Returns `None` for polygons
    /// with fewer than three vertices, which cannot contain anything.
    #[must_use]
    pub fn from_polygon(polygon: Vec<LatLng>) -> Option<Self> {
        if polygon.len() < 3 {
            return None;
        }
        let mut bounds = LatLngBounds::new(f64::MAX, f64::MAX, f64::MIN, f64::MIN);
        for p in &polygon {
            bounds.south = bounds.south.min(p.latitude());
            bounds.west = bounds.west.min(p.longitude());
            bounds.north = bounds.north.max(p.latitude());
            bounds.east = bounds.east.max(p.longitude());
        }
        Some(Self { polygon, bounds })
    }

    #[must_use]
    pub fn contains(&self, c: LatLng) -> bool {
        self.bounds.contains(c) && point_in_polygon(c, &self.polygon)
    }
}

/// The full operating region of an incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentBounds {
    pub locations: Vec<LocationBounds>,
    pub bounds: LatLngBounds,
}

impl IncidentBounds {
    /// Aggregates location polygons; the outer box is the union of the
    /// per-location boxes. Returns `None` when no polygon survives.
    #[must_use]
    pub fn from_locations(locations: Vec<LocationBounds>) -> Option<Self> {
        let mut iter = locations.iter();
        let mut bounds = iter.next()?.bounds;
        for loc in iter {
            bounds = bounds.union(&loc.bounds);
        }
        Some(Self { locations, bounds })
    }

    #[must_use]
    pub fn contains_location(&self, c: LatLng) -> bool {
        self.bounds.contains(c) && self.locations.iter().any(|loc| loc.contains(c))
    }
}

/// Even-odd ray casting. A point exactly on an edge may land on either side;
/// incident regions are coarse enough that this does not matter in practice.
fn point_in_polygon(c: LatLng, polygon: &[LatLng]) -> bool {
    let (px, py) = (c.longitude(), c.latitude());
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (xi, yi) = (polygon[i].longitude(), polygon[i].latitude());
        let (xj, yj) = (polygon[j].longitude(), polygon[j].latitude());
        let crosses = (yi > py) != (yj > py);
        if crosses && px < (xj - xi) * (py - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(south: f64, west: f64, size: f64) -> LocationBounds {
        LocationBounds::from_polygon(vec![
            LatLng::new(south, west),
            LatLng::new(south, west + size),
            LatLng::new(south + size, west + size),
            LatLng::new(south + size, west),
        ])
        .expect("square polygon")
    }

    #[test]
    fn square_contains_interior_point() {
        let sq = square(30.0, -100.0, 2.0);
        assert!(sq.contains(LatLng::new(31.0, -99.0)));
        assert!(!sq.contains(LatLng::new(29.0, -99.0)));
        assert!(!sq.contains(LatLng::new(31.0, -103.0)));
    }

    #[test]
    fn bbox_rejects_before_polygon_test() {
        // A triangle whose bbox covers more than the triangle itself: points
        // inside the box but outside the triangle must be excluded.
        let tri = LocationBounds::from_polygon(vec![
            LatLng::new(0.0, 0.0),
            LatLng::new(0.0, 10.0),
            LatLng::new(10.0, 10.0),
        ])
        .expect("triangle");
        assert!(tri.bounds.contains(LatLng::new(8.0, 1.0)));
        assert!(!tri.contains(LatLng::new(8.0, 1.0)));
        assert!(tri.contains(LatLng::new(2.0, 8.0)));
    }

    #[test]
    fn degenerate_polygon_is_rejected() {
        assert!(LocationBounds::from_polygon(vec![]).is_none());
        assert!(
            LocationBounds::from_polygon(vec![LatLng::new(0.0, 0.0), LatLng::new(1.0, 1.0)])
                .is_none()
        );
    }

    #[test]
    fn incident_bounds_spans_multiple_locations() {
        let a = square(30.0, -100.0, 1.0);
        let b = square(35.0, -95.0, 1.0);
        let incident = IncidentBounds::from_locations(vec![a, b]).expect("two squares");

        assert!(incident.contains_location(LatLng::new(30.5, -99.5)));
        assert!(incident.contains_location(LatLng::new(35.5, -94.5)));
        // Inside the union box but between the squares.
        assert!(!incident.contains_location(LatLng::new(33.0, -97.0)));
    }

    #[test]
    fn empty_incident_bounds_is_none() {
        assert!(IncidentBounds::from_locations(vec![]).is_none());
    }
}
