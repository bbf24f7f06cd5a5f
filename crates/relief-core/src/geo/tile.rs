//! Slippy-map tile math for the dot-overlay renderer.
//!
//! Tiles address the standard Web Mercator grid: `x` grows east, `y` grows
//! south, `2^zoom` tiles per axis. Queries use a padded bounding box so dots
//! whose center sits just outside a tile still render their overhanging edge.

use super::bounds::LatLngBounds;
use super::coords::LatLng;

/// Latitude limit of the Web Mercator projection.
pub const MAX_MERCATOR_LATITUDE: f64 = 85.05112878;

/// Query padding as a fraction of tile span: dot radius (8 px) over tile
/// size (256 px). Tile span halves per zoom level, so the absolute padding
/// shrinks with zoom.
const QUERY_PADDING_SCALE: f64 = 8.0 / 256.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoordinates {
    pub x: u32,
    pub y: u32,
    pub zoom: u32,
}

impl TileCoordinates {
    #[must_use]
    pub const fn new(x: u32, y: u32, zoom: u32) -> Self {
        Self { x, y, zoom }
    }

    /// Strict lat/lng bounds of the tile.
    #[must_use]
    pub fn bounds(&self) -> LatLngBounds {
        let n = f64::from(1u32 << self.zoom.min(31));
        let west = f64::from(self.x) / n * 360.0 - 180.0;
        let east = f64::from(self.x + 1) / n * 360.0 - 180.0;
        let north = inverse_mercator_latitude(f64::from(self.y) / n);
        let south = inverse_mercator_latitude(f64::from(self.y + 1) / n);
        LatLngBounds::new(south, west, north, east)
    }

    /// Tile bounds padded by [`QUERY_PADDING_SCALE`] of the tile span on each
    /// side. Worksite queries for a tile use these bounds. Latitude padding
    /// stays inside the Mercator extent; longitude may pad past the +-180
    /// seam, which only costs overdraw on the seam tiles.
    #[must_use]
    pub fn query_bounds(&self) -> LatLngBounds {
        let b = self.bounds();
        let lng_pad = (b.east - b.west) * QUERY_PADDING_SCALE;
        let lat_pad = (b.north - b.south) * QUERY_PADDING_SCALE;
        LatLngBounds::new(
            (b.south - lat_pad).max(-MAX_MERCATOR_LATITUDE),
            b.west - lng_pad,
            (b.north + lat_pad).min(MAX_MERCATOR_LATITUDE),
            b.east + lng_pad,
        )
    }

    /// Maps a coordinate to normalized `(x, y)` in `[0, 1)` over the padded
    /// query bounds, `y` growing south. `None` when the coordinate falls
    /// outside the query bounds.
    #[must_use]
    pub fn from_lat_lng(&self, c: LatLng) -> Option<(f64, f64)> {
        let q = self.query_bounds();
        if c.longitude() < q.west || c.longitude() >= q.east {
            return None;
        }
        if c.latitude() <= q.south || c.latitude() > q.north {
            return None;
        }

        let x = (c.longitude() - q.west) / (q.east - q.west);
        let m_north = mercator_y(q.north);
        let m_south = mercator_y(q.south);
        let y = (m_north - mercator_y(c.latitude())) / (m_north - m_south);
        Some((x, y))
    }
}

/// Projected y for a latitude in degrees; grows north.
fn mercator_y(latitude: f64) -> f64 {
    let phi = latitude
        .clamp(-MAX_MERCATOR_LATITUDE, MAX_MERCATOR_LATITUDE)
        .to_radians();
    (std::f64::consts::FRAC_PI_4 + phi / 2.0).tan().ln()
}

/// Latitude in degrees for a fractional tile row `y / 2^zoom`.
fn inverse_mercator_latitude(y_fraction: f64) -> f64 {
    let n = std::f64::consts::PI * (1.0 - 2.0 * y_fraction);
    n.sinh().atan().to_degrees()
}
