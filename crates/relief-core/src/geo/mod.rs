//! Spatial layer: coordinates, incident bounds, tile math, tile cache.

pub mod bounds;
pub mod coords;
pub mod tile;
pub mod tile_cache;

pub use bounds::{IncidentBounds, LatLngBounds, LocationBounds};
pub use coords::{EARTH_RADIUS_KM, LatLng, haversine_km, haversine_radians};
pub use tile::{MAX_MERCATOR_LATITUDE, TileCoordinates};
pub use tile_cache::{RenderedTile, TileCache, TileCacheStats, TileDataState};
