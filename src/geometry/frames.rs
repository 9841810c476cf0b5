//! Coordinate frame conventions and conversions.
//!
//! Frames used by the pipeline:
//!
//! ```text
//! ENU (world):        x = East, y = North, z = Up
//! NED (output):       x = North, y = East, z = Down
//! Camera (physical):  x = Right, y = Down, z = Forward (RDF)
//! Solver world:       aligned raster pixels with the row axis
//!                     flipped, so x = right/east, y = up/north,
//!                     z = up in raster-pixel units
//! Solver camera:      physical camera with y and z negated, the
//!                     frame the PnP solution is expressed in once
//!                     both match point sets have had their row axis
//!                     flipped
//! ```
//!
//! Sign gotcha carried through the whole pipeline: vehicle yaw is
//! positive clockwise from north (looking down), which is a negative
//! rotation about the ENU up axis, and the raster is rotated by the
//! negated yaw so its content lines up with the camera view.

use nalgebra::{Matrix3, UnitQuaternion};

/// Relabeling from ENU axes to NED axes.
pub fn enu_to_ned() -> Matrix3<f64> {
    Matrix3::new(
        0.0, 1.0, 0.0,
        1.0, 0.0, 0.0,
        0.0, 0.0, -1.0,
    )
}

/// Flip between the physical RDF camera frame and the y-up solver
/// camera frame (180 degree rotation about the camera x axis).
pub fn camera_axis_flip() -> Matrix3<f64> {
    Matrix3::new(
        1.0, 0.0, 0.0,
        0.0, -1.0, 0.0,
        0.0, 0.0, -1.0,
    )
}

/// Orientation of a nadir-facing, north-up camera expressed in ENU
/// (camera right = east, camera down-in-image = south, camera
/// forward = down).
pub fn nadir_camera_in_enu() -> Matrix3<f64> {
    Matrix3::new(
        1.0, 0.0, 0.0,
        0.0, -1.0, 0.0,
        0.0, 0.0, -1.0,
    )
}

/// Right-handed rotation about the up axis by `angle_rad`.
pub fn rotation_about_up(angle_rad: f64) -> Matrix3<f64> {
    let (s, c) = angle_rad.sin_cos();
    Matrix3::new(
        c, -s, 0.0,
        s, c, 0.0,
        0.0, 0.0, 1.0,
    )
}

/// Expected solver-frame pose rotation for a camera with ENU
/// orientation `q_cam_enu`, matched against a raster that was aligned
/// by rotating it `alignment_rotation_deg` counter-clockwise.
///
/// Used by the validity gate as the independent attitude reference the
/// solved rotation is compared against.
pub fn expected_solver_rotation(
    q_cam_enu: &UnitQuaternion<f64>,
    alignment_rotation_deg: f64,
) -> Matrix3<f64> {
    let r_enu_solver_cam = q_cam_enu.to_rotation_matrix().matrix() * camera_axis_flip();
    let r_enu_solver_world = rotation_about_up(-alignment_rotation_deg.to_radians());
    r_enu_solver_cam.transpose() * r_enu_solver_world
}

/// Camera pitch away from straight down, in degrees: the angle between
/// the camera forward axis and the down direction.
pub fn pitch_from_nadir_deg(q_cam_enu: &UnitQuaternion<f64>) -> f64 {
    let forward_enu = q_cam_enu * nalgebra::Vector3::new(0.0, 0.0, 1.0);
    (-forward_enu.z).clamp(-1.0, 1.0).acos().to_degrees()
}

/// Heading of the camera image-up direction, degrees clockwise from
/// north. This is the yaw the raster aligner has to undo.
pub fn camera_yaw_deg(q_cam_enu: &UnitQuaternion<f64>) -> f64 {
    let up_enu = q_cam_enu * nalgebra::Vector3::new(0.0, -1.0, 0.0);
    up_enu.x.atan2(up_enu.y).to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Rotation3, Vector3};

    #[test]
    fn test_enu_to_ned_swaps_horizontal_axes() {
        let east = Vector3::new(1.0, 0.0, 0.0);
        let ned = enu_to_ned() * east;
        // East is the second NED axis.
        assert_relative_eq!(ned, Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-12);

        let up = Vector3::new(0.0, 0.0, 1.0);
        assert_relative_eq!(enu_to_ned() * up, Vector3::new(0.0, 0.0, -1.0), epsilon = 1e-12);
    }

    #[test]
    fn test_relabelings_are_involutions() {
        assert_relative_eq!(
            enu_to_ned() * enu_to_ned(),
            Matrix3::identity(),
            epsilon = 1e-12
        );
        assert_relative_eq!(
            camera_axis_flip() * camera_axis_flip(),
            Matrix3::identity(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_nadir_camera_forward_points_down() {
        let forward_cam = Vector3::new(0.0, 0.0, 1.0);
        let forward_enu = nadir_camera_in_enu() * forward_cam;
        assert_relative_eq!(forward_enu, Vector3::new(0.0, 0.0, -1.0), epsilon = 1e-12);
    }

    #[test]
    fn test_expected_rotation_identity_for_nadir_north_up() {
        let q = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(
            nadir_camera_in_enu(),
        ));
        let expected = expected_solver_rotation(&q, 0.0);
        assert_relative_eq!(expected, Matrix3::identity(), epsilon = 1e-12);
    }

    #[test]
    fn test_pitch_and_yaw_of_nadir_camera() {
        let q = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(
            nadir_camera_in_enu(),
        ));
        assert_relative_eq!(pitch_from_nadir_deg(&q), 0.0, epsilon = 1e-9);
        assert_relative_eq!(camera_yaw_deg(&q), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_pitch_of_tilted_camera() {
        let nadir = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(
            nadir_camera_in_enu(),
        ));
        // Tilt 20 degrees about the ENU east axis.
        let tilted = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 20.0_f64.to_radians())
            * nadir;
        assert_relative_eq!(pitch_from_nadir_deg(&tilted), 20.0, epsilon = 1e-9);
    }

    #[test]
    fn test_yaw_of_east_facing_camera() {
        let nadir = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(
            nadir_camera_in_enu(),
        ));
        // Rotate the camera 90 degrees clockwise (viewed from above),
        // a negative rotation about the ENU up axis.
        let yawed =
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), -90.0_f64.to_radians()) * nadir;
        assert_relative_eq!(camera_yaw_deg(&yawed), 90.0, epsilon = 1e-9);
    }

    #[test]
    fn test_expected_rotation_is_proper() {
        let q = UnitQuaternion::from_euler_angles(0.1, -0.2, 1.0);
        let r = expected_solver_rotation(&q, 37.0);
        assert_relative_eq!(r * r.transpose(), Matrix3::identity(), epsilon = 1e-10);
        assert_relative_eq!(r.determinant(), 1.0, epsilon = 1e-10);
    }
}
