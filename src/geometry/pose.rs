//! Rigid transform between the reference-raster frame and the query
//! camera frame.

use nalgebra::{Matrix3, Vector3};

use super::so3::log_so3;

/// Tolerance for the orthonormality and determinant checks.
const ROTATION_TOLERANCE: f64 = 1e-6;

/// A rigid transform `p_cam = R p_world + t` from the solver world
/// frame (aligned raster pixels, row axis flipped to point up) into
/// the query camera frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
}

impl Pose {
    pub fn new(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn identity() -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Transforms a world point into the camera frame.
    pub fn transform_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * p + self.translation
    }

    /// Camera center expressed in the world frame: `C = -Rᵀ t`.
    pub fn camera_position(&self) -> Vector3<f64> {
        -(self.rotation.transpose() * self.translation)
    }

    /// Checks that the rotation is a proper rotation: orthonormal
    /// columns and determinant +1. Finite translation is checked too,
    /// since a solver failure can leak NaN through either part.
    pub fn is_valid(&self) -> bool {
        if !self.translation.iter().all(|v| v.is_finite()) {
            return false;
        }
        if !self.rotation.iter().all(|v| v.is_finite()) {
            return false;
        }
        let should_be_identity = self.rotation * self.rotation.transpose();
        let ortho_err = (should_be_identity - Matrix3::identity()).norm();
        ortho_err < ROTATION_TOLERANCE && (self.rotation.determinant() - 1.0).abs() < ROTATION_TOLERANCE
    }

    /// Angular deviation in radians between this pose's rotation and
    /// another rotation: `|log(R_self R_otherᵀ)|`.
    pub fn rotation_deviation_rad(&self, other: &Matrix3<f64>) -> f64 {
        log_so3(&(self.rotation * other.transpose())).norm()
    }
}
