//! Transverse Mercator (UTM) projection on the WGS84 ellipsoid.
//!
//! Standard series expansion (Snyder, "Map Projections: A Working
//! Manual"). Accuracy is well under a meter within a zone, which is far
//! below the raster resolution this crate works at.

use super::LatLon;

const WGS84_A: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257_223_563;
const K0: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// A projected UTM coordinate in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UtmCoord {
    pub easting: f64,
    pub northing: f64,
    pub zone: u8,
    pub northern: bool,
}

/// UTM zone number for a longitude in degrees.
pub fn utm_zone(lon: f64) -> u8 {
    (((lon + 180.0) / 6.0).floor() as i32 + 1).clamp(1, 60) as u8
}

fn central_meridian(zone: u8) -> f64 {
    (zone as f64 - 1.0) * 6.0 - 180.0 + 3.0
}

/// Projects a WGS84 coordinate into its UTM zone.
pub fn utm_from_wgs84(p: LatLon) -> UtmCoord {
    let zone = utm_zone(p.lon);
    let lat = p.lat.to_radians();
    let lon = p.lon.to_radians();
    let lon0 = central_meridian(zone).to_radians();

    let e2 = WGS84_F * (2.0 - WGS84_F);
    let ep2 = e2 / (1.0 - e2);

    let sin_lat = lat.sin();
    let cos_lat = lat.cos();
    let tan_lat = lat.tan();

    let n = WGS84_A / (1.0 - e2 * sin_lat * sin_lat).sqrt();
    let t = tan_lat * tan_lat;
    let c = ep2 * cos_lat * cos_lat;
    let a = cos_lat * (lon - lon0);

    let m = meridian_arc(lat, e2);

    let a2 = a * a;
    let a3 = a2 * a;
    let a4 = a3 * a;
    let a5 = a4 * a;
    let a6 = a5 * a;

    let easting = K0
        * n
        * (a + (1.0 - t + c) * a3 / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a5 / 120.0)
        + FALSE_EASTING;

    let mut northing = K0
        * (m + n
            * tan_lat
            * (a2 / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a6 / 720.0));

    let northern = p.lat >= 0.0;
    if !northern {
        northing += FALSE_NORTHING_SOUTH;
    }

    UtmCoord {
        easting,
        northing,
        zone,
        northern,
    }
}

/// Inverse projection from UTM back to WGS84 degrees.
pub fn wgs84_from_utm(p: UtmCoord) -> LatLon {
    let e2 = WGS84_F * (2.0 - WGS84_F);
    let ep2 = e2 / (1.0 - e2);
    let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());

    let x = p.easting - FALSE_EASTING;
    let y = if p.northern {
        p.northing
    } else {
        p.northing - FALSE_NORTHING_SOUTH
    };

    let m = y / K0;
    let mu = m / (WGS84_A * (1.0 - e2 / 4.0 - 3.0 * e2 * e2 / 64.0 - 5.0 * e2 * e2 * e2 / 256.0));

    // Footpoint latitude.
    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let sin1 = phi1.sin();
    let cos1 = phi1.cos();
    let tan1 = phi1.tan();

    let c1 = ep2 * cos1 * cos1;
    let t1 = tan1 * tan1;
    let n1 = WGS84_A / (1.0 - e2 * sin1 * sin1).sqrt();
    let r1 = WGS84_A * (1.0 - e2) / (1.0 - e2 * sin1 * sin1).powf(1.5);
    let d = x / (n1 * K0);

    let d2 = d * d;
    let d3 = d2 * d;
    let d4 = d3 * d;
    let d5 = d4 * d;
    let d6 = d5 * d;

    let lat = phi1
        - (n1 * tan1 / r1)
            * (d2 / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d4 / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * ep2 - 3.0 * c1 * c1)
                    * d6
                    / 720.0);

    let lon = central_meridian(p.zone).to_radians()
        + (d - (1.0 + 2.0 * t1 + c1) * d3 / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1) * d5
                / 120.0)
            / cos1;

    LatLon {
        lat: lat.to_degrees(),
        lon: lon.to_degrees(),
    }
}

/// Meridional radius of curvature M(φ) in meters, `lat` in radians.
pub(crate) fn meridional_radius(lat: f64) -> f64 {
    let e2 = WGS84_F * (2.0 - WGS84_F);
    let sin_lat = lat.sin();
    WGS84_A * (1.0 - e2) / (1.0 - e2 * sin_lat * sin_lat).powf(1.5)
}

/// Prime vertical radius of curvature N(φ) in meters, `lat` in radians.
pub(crate) fn prime_vertical_radius(lat: f64) -> f64 {
    let e2 = WGS84_F * (2.0 - WGS84_F);
    let sin_lat = lat.sin();
    WGS84_A / (1.0 - e2 * sin_lat * sin_lat).sqrt()
}

/// Meridian arc length from the equator to latitude `lat` (radians).
fn meridian_arc(lat: f64, e2: f64) -> f64 {
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    WGS84_A
        * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * lat
            - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * lat).sin()
            + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * lat).sin()
            - (35.0 * e6 / 3072.0) * (6.0 * lat).sin())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_zone_selection() {
        assert_eq!(utm_zone(24.0), 35);
        assert_eq!(utm_zone(-180.0), 1);
        assert_eq!(utm_zone(179.9), 60);
    }

    #[test]
    fn test_round_trip() {
        let p = LatLon::new(60.0, 24.0);
        let utm = utm_from_wgs84(p);
        let back = wgs84_from_utm(utm);
        assert_relative_eq!(back.lat, p.lat, epsilon = 1e-8);
        assert_relative_eq!(back.lon, p.lon, epsilon = 1e-8);
    }

    #[test]
    fn test_round_trip_southern_hemisphere() {
        let p = LatLon::new(-33.9, 18.4);
        let utm = utm_from_wgs84(p);
        assert!(!utm.northern);
        let back = wgs84_from_utm(utm);
        assert_relative_eq!(back.lat, p.lat, epsilon = 1e-8);
        assert_relative_eq!(back.lon, p.lon, epsilon = 1e-8);
    }

    #[test]
    fn test_known_point() {
        // Helsinki area, zone 35N. Reference values from proj.
        let utm = utm_from_wgs84(LatLon::new(60.0, 24.0));
        assert_eq!(utm.zone, 35);
        assert!(utm.northern);
        assert_relative_eq!(utm.easting, 332_705.18, epsilon = 1.0);
        assert_relative_eq!(utm.northing, 6_655_205.47, epsilon = 1.0);
    }

    #[test]
    fn test_northing_increases_with_latitude() {
        let a = utm_from_wgs84(LatLon::new(60.0, 24.0));
        let b = utm_from_wgs84(LatLon::new(60.1, 24.0));
        assert!(b.northing > a.northing);
    }
}
