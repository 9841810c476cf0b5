//! Geodetic value types and coordinate conversions.
//!
//! Everything here is stateless: WGS84 lat/lon value types, haversine
//! distances, UTM projection, and the pixel to WGS84 raster affine. The
//! operating assumption throughout is a small flight area that does not
//! cross a UTM zone boundary or approach the poles.

mod bbox;
mod transform;
mod utm;

pub use bbox::BoundingBox;
pub use transform::RasterTransform;
pub use utm::{utm_from_wgs84, utm_zone, wgs84_from_utm, UtmCoord};

/// Mean earth radius in meters, used for haversine distances.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS84 geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// A WGS84 coordinate with altitude above mean sea level in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLonAlt {
    pub lat: f64,
    pub lon: f64,
    pub altitude_amsl: f64,
}

/// Great-circle distance between two coordinates in meters.
pub fn haversine_distance_m(a: LatLon, b: LatLon) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Offsets a coordinate by east/north meters in the local tangent
/// frame: `dlat = north / M(φ)`, `dlon = east / (N(φ) cos φ)` with the
/// ellipsoidal radii of curvature at the origin.
///
/// Adding the offset in UTM grid coordinates instead would tilt it by
/// the grid convergence, about 2.6 degrees at 3 degrees from the
/// central meridian at latitude 60.
pub fn wgs84_offset_by_enu(origin: LatLon, east_m: f64, north_m: f64) -> LatLon {
    let lat = origin.lat.to_radians();
    let dlat = north_m / utm::meridional_radius(lat);
    let dlon = east_m / (utm::prime_vertical_radius(lat) * lat.cos());
    LatLon::new(
        origin.lat + dlat.to_degrees(),
        origin.lon + dlon.to_degrees(),
    )
}
