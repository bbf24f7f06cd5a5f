//! Coordinate value types.
//!
//! Every `LatLng` is normalized at construction: longitude wrapped into
//! (-180, 180], latitude clamped into [-90, 90]. Code downstream (tile math,
//! bounds checks, SQL range queries) relies on never seeing a raw coordinate.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometers, used to scale haversine results.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A normalized geographic coordinate.
///
/// Fields are private so the only way to obtain one is [`LatLng::new`], which
/// applies the wrap/clamp invariant. Deserialization funnels through the same
/// constructor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawLatLng")]
pub struct LatLng {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct RawLatLng {
    latitude: f64,
    longitude: f64,
}

impl From<RawLatLng> for LatLng {
    fn from(raw: RawLatLng) -> Self {
        Self::new(raw.latitude, raw.longitude)
    }
}

impl LatLng {
    #[must_use]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: latitude.clamp(-90.0, 90.0),
            longitude: wrap_longitude(longitude),
        }
    }

    #[must_use]
    pub const fn latitude(&self) -> f64 {
        self.latitude
    }

    #[must_use]
    pub const fn longitude(&self) -> f64 {
        self.longitude
    }
}

/// Wraps a longitude into (-180, 180].
fn wrap_longitude(longitude: f64) -> f64 {
    let mut lng = longitude % 360.0;
    if lng <= -180.0 {
        lng += 360.0;
    } else if lng > 180.0 {
        lng -= 360.0;
    }
    lng
}

/// Central angle between two coordinates, in radians.
///
/// Multiply by [`EARTH_RADIUS_KM`] for kilometers. Callers that only need a
/// relative ordering can compare the raw radians.
#[must_use]
pub fn haversine_radians(a: LatLng, b: LatLng) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lng = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * h.sqrt().asin()
}

/// Great-circle distance in kilometers.
#[must_use]
pub fn haversine_km(a: LatLng, b: LatLng) -> f64 {
    haversine_radians(a, b) * EARTH_RADIUS_KM
}
