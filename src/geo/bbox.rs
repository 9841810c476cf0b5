//! Axis-aligned WGS84 bounding boxes.

use anyhow::Result;

use super::{haversine_distance_m, wgs84_offset_by_enu, LatLon};

/// An axis-aligned bounding box in WGS84 degrees, `min <= max`
/// componentwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: LatLon,
    pub max: LatLon,
}

impl BoundingBox {
    /// Creates a bounding box, rejecting inverted corners.
    pub fn new(min: LatLon, max: LatLon) -> Result<Self> {
        if min.lat > max.lat || min.lon > max.lon {
            anyhow::bail!(
                "inverted bounding box: min ({}, {}) exceeds max ({}, {})",
                min.lat,
                min.lon,
                max.lat,
                max.lon
            );
        }
        Ok(Self { min, max })
    }

    /// Square box centered on `center` reaching `radius_m` meters in
    /// each cardinal direction.
    pub fn from_center_and_radius(center: LatLon, radius_m: f64) -> Result<Self> {
        let ne = wgs84_offset_by_enu(center, radius_m, radius_m);
        let sw = wgs84_offset_by_enu(center, -radius_m, -radius_m);
        Self::new(sw, ne)
    }

    pub fn center(&self) -> LatLon {
        LatLon::new(
            (self.min.lat + self.max.lat) / 2.0,
            (self.min.lon + self.max.lon) / 2.0,
        )
    }

    /// Area in squared degrees. Only meaningful as a ratio against
    /// another box at the same latitude.
    pub fn area_deg2(&self) -> f64 {
        (self.max.lat - self.min.lat) * (self.max.lon - self.min.lon)
    }

    /// Intersection with another box, or `None` when disjoint.
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let min = LatLon::new(
            self.min.lat.max(other.min.lat),
            self.min.lon.max(other.min.lon),
        );
        let max = LatLon::new(
            self.max.lat.min(other.max.lat),
            self.max.lon.min(other.max.lon),
        );
        if min.lat >= max.lat || min.lon >= max.lon {
            return None;
        }
        Some(BoundingBox { min, max })
    }

    /// Minimum of the two directional containment ratios:
    /// intersection area over each box's own area. Zero when disjoint.
    pub fn overlap_ratio(&self, other: &BoundingBox) -> f64 {
        let Some(inter) = self.intersection(other) else {
            return 0.0;
        };
        let inter_area = inter.area_deg2();
        let r1 = inter_area / self.area_deg2();
        let r2 = inter_area / other.area_deg2();
        r1.min(r2)
    }

    /// Perimeter length in meters along the four great-circle edges.
    pub fn perimeter_meters(&self) -> f64 {
        let tl = LatLon::new(self.max.lat, self.min.lon);
        let tr = LatLon::new(self.max.lat, self.max.lon);
        let br = LatLon::new(self.min.lat, self.max.lon);
        let bl = LatLon::new(self.min.lat, self.min.lon);
        haversine_distance_m(tl, tr)
            + haversine_distance_m(tr, br)
            + haversine_distance_m(br, bl)
            + haversine_distance_m(bl, tl)
    }
}
