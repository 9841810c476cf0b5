//! Pixel to WGS84 raster affine.
//!
//! A fetched raster covers its bounding box edge to edge, so the
//! mapping from pixel coordinates to geographic coordinates is a pure
//! scale plus translation, with the latitude axis inverted: pixel rows
//! grow downward while latitude grows upward.

use nalgebra::{Matrix3, Vector2, Vector3};

use super::BoundingBox;

/// Homogeneous affine mapping raster pixel (x, y) to (lon, lat).
#[derive(Debug, Clone, Copy)]
pub struct RasterTransform {
    matrix: Matrix3<f64>,
}

impl RasterTransform {
    /// Builds the pixel to WGS84 mapping for a raster of `(width,
    /// height)` pixels covering `bbox`. Pixel (0, 0) is the north-west
    /// corner.
    pub fn new(bbox: &BoundingBox, size: (u32, u32)) -> Self {
        let (width, height) = size;
        let dlon = bbox.max.lon - bbox.min.lon;
        let dlat = bbox.max.lat - bbox.min.lat;
        let matrix = Matrix3::new(
            dlon / width as f64, 0.0, bbox.min.lon,
            0.0, -dlat / height as f64, bbox.max.lat,
            0.0, 0.0, 1.0,
        );
        Self { matrix }
    }

    /// Wraps an arbitrary homogeneous 3x3 transform.
    pub fn from_matrix(matrix: Matrix3<f64>) -> Self {
        Self { matrix }
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    /// Applies the transform to a point. Output is (lon, lat) for the
    /// forward raster transform.
    pub fn apply(&self, p: Vector2<f64>) -> Vector2<f64> {
        let out = self.matrix * Vector3::new(p.x, p.y, 1.0);
        Vector2::new(out.x / out.z, out.y / out.z)
    }

    /// Inverse transform, or `None` when singular.
    pub fn inverse(&self) -> Option<RasterTransform> {
        self.matrix.try_inverse().map(|matrix| Self { matrix })
    }

    /// Composition `self ∘ other`: applies `other` first.
    pub fn compose(&self, other: &RasterTransform) -> RasterTransform {
        Self {
            matrix: self.matrix * other.matrix,
        }
    }
}
