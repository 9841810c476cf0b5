//! SO(3) utilities: skew-symmetric construction and the exponential
//! and logarithm maps.
//!
//! The exponential map drives the Gauss-Newton pose refinement and the
//! logarithm gives the angular deviation magnitude used by the
//! estimate validity gate.

use nalgebra::{Matrix3, Vector3};

/// Small angle threshold for numerical stability.
const SMALL_ANGLE_THRESHOLD: f64 = 1e-6;

/// Constructs the skew-symmetric matrix [v]× such that [v]× u = v × u.
///
/// ```text
/// [v]× = |  0   -v_z   v_y |
///        |  v_z   0   -v_x |
///        | -v_y  v_x    0  |
/// ```
#[inline]
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        0.0, -v.z, v.y,
        v.z, 0.0, -v.x,
        -v.y, v.x, 0.0,
    )
}

/// Exponential map from a rotation vector to a rotation matrix
/// (Rodrigues formula).
///
/// ```text
/// exp(φ) = I + sin|φ|/|φ| [φ]× + (1 - cos|φ|)/|φ|² [φ]×²
/// ```
pub fn exp_so3(phi: &Vector3<f64>) -> Matrix3<f64> {
    let theta = phi.norm();

    if theta < SMALL_ANGLE_THRESHOLD {
        // First-order approximation for small angles
        return Matrix3::identity() + skew(phi);
    }

    let skew_phi = skew(phi);
    let skew_phi_sq = skew_phi * skew_phi;

    Matrix3::identity()
        + (theta.sin() / theta) * skew_phi
        + ((1.0 - theta.cos()) / (theta * theta)) * skew_phi_sq
}

/// Logarithm map from a rotation matrix to a rotation vector.
///
/// The angle is recovered from the trace and the axis from the
/// antisymmetric part. Rotations near π need the axis recovered from
/// the symmetric part instead, since the antisymmetric part vanishes.
pub fn log_so3(r: &Matrix3<f64>) -> Vector3<f64> {
    let cos_theta = ((r.trace() - 1.0) * 0.5).clamp(-1.0, 1.0);
    let theta = cos_theta.acos();

    let v = Vector3::new(
        r[(2, 1)] - r[(1, 2)],
        r[(0, 2)] - r[(2, 0)],
        r[(1, 0)] - r[(0, 1)],
    );

    if theta < SMALL_ANGLE_THRESHOLD {
        return 0.5 * v;
    }

    if std::f64::consts::PI - theta < SMALL_ANGLE_THRESHOLD {
        // Near π: R ≈ 2aaᵀ - I, so (R + I)/2 ≈ aaᵀ. Pick the column
        // with the largest diagonal entry as the axis. The sign is
        // irrelevant at exactly π.
        let b = (r + Matrix3::identity()) * 0.5;
        let mut axis_idx = 0;
        for i in 1..3 {
            if b[(i, i)] > b[(axis_idx, axis_idx)] {
                axis_idx = i;
            }
        }
        let col = b.column(axis_idx);
        let axis = Vector3::new(col[0], col[1], col[2]) / b[(axis_idx, axis_idx)].sqrt();
        return theta * axis.normalize();
    }

    (theta / (2.0 * theta.sin())) * v
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_skew_cross_product() {
        let v = Vector3::new(1.0, 2.0, 3.0);
        let u = Vector3::new(4.0, 5.0, 6.0);

        let cross_direct = v.cross(&u);
        let cross_skew = skew(&v) * u;

        assert_relative_eq!(cross_direct, cross_skew, epsilon = 1e-12);
    }

    #[test]
    fn test_exp_identity_at_zero() {
        let r = exp_so3(&Vector3::zeros());
        assert_relative_eq!(r, Matrix3::identity(), epsilon = 1e-12);
    }

    #[test]
    fn test_exp_is_rotation() {
        let phi = Vector3::new(0.3, -0.2, 0.7);
        let r = exp_so3(&phi);

        assert_relative_eq!(r * r.transpose(), Matrix3::identity(), epsilon = 1e-10);
        assert_relative_eq!(r.determinant(), 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_exp_log_round_trip() {
        let phi = Vector3::new(0.5, -1.0, 0.25);
        let back = log_so3(&exp_so3(&phi));
        assert_relative_eq!(back, phi, epsilon = 1e-9);
    }

    #[test]
    fn test_log_exp_small_angle() {
        let phi = Vector3::new(1e-8, -2e-8, 1e-8);
        let back = log_so3(&exp_so3(&phi));
        assert_relative_eq!(back, phi, epsilon = 1e-12);
    }

    #[test]
    fn test_log_near_pi() {
        let axis = Vector3::new(1.0, 0.0, 0.0);
        let phi = axis * (std::f64::consts::PI - 1e-9);
        let back = log_so3(&exp_so3(&phi));
        assert_relative_eq!(back.norm(), phi.norm(), epsilon = 1e-6);
    }

    #[test]
    fn test_exp_about_z_matches_rotation_matrix() {
        let angle = 0.4_f64;
        let r = exp_so3(&Vector3::new(0.0, 0.0, angle));
        let expected = Matrix3::new(
            angle.cos(), -angle.sin(), 0.0,
            angle.sin(), angle.cos(), 0.0,
            0.0, 0.0, 1.0,
        );
        assert_relative_eq!(r, expected, epsilon = 1e-12);
    }
}
