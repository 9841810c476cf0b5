//! Field-of-view projection onto the ground plane.
//!
//! Projects the four image corners plus the principal point through
//! the camera model onto the local ground plane, giving the footprint
//! the reference map request is derived from. The footprint is then
//! padded into a square large enough that the fetched raster can be
//! rotated by any angle without exposing unfilled corners.

use nalgebra::{Matrix3, UnitQuaternion, Vector2, Vector3};

use crate::geo::{wgs84_offset_by_enu, BoundingBox, LatLon};

/// A ray is treated as parallel to the ground below this |d.z|.
const RAY_PARALLEL_EPS: f64 = 1e-9;

/// Calibrated pinhole intrinsics, distortion assumed negligible.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx,
            0.0, self.fy, self.cy,
            0.0, 0.0, 1.0,
        )
    }

    /// Inverted intrinsics, or `None` when the matrix is singular
    /// (degenerate focal lengths).
    pub fn inverse_matrix(&self) -> Option<Matrix3<f64>> {
        self.matrix().try_inverse()
    }

    /// Horizontal field of view in radians for an image `width` pixels
    /// wide.
    pub fn horizontal_fov(&self, width: u32) -> f64 {
        2.0 * (width as f64 / (2.0 * self.fx)).atan()
    }
}

/// Ground footprint of the camera view in local ENU meters, relative
/// to the point directly below the camera.
///
/// Corner order is top-left, top-right, bottom-right, bottom-left in
/// image terms and must be preserved by all consumers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldOfView {
    pub corners: [Vector2<f64>; 4],
    pub principal: Vector2<f64>,
}

/// Projects the image corners and principal point onto the ground
/// plane at `z = 0`, with the camera at height `altitude_agl`.
///
/// `orientation` rotates camera-frame directions into ENU. Returns
/// `None` when the intrinsics are singular or any ray runs parallel to
/// the ground; points behind or above the horizon are not clamped here
/// and are bounded later by the map radius policy.
pub fn project_fov(
    orientation: &UnitQuaternion<f64>,
    altitude_agl: f64,
    intrinsics: &CameraIntrinsics,
    image_dim: (u32, u32),
) -> Option<FieldOfView> {
    let (width, height) = image_dim;
    let k_inv = intrinsics.inverse_matrix()?;
    let r = orientation.to_rotation_matrix();
    let camera = Vector3::new(0.0, 0.0, altitude_agl);

    let w = width as f64 - 1.0;
    let h = height as f64 - 1.0;
    let pixels = [
        Vector2::new(0.0, 0.0),
        Vector2::new(w, 0.0),
        Vector2::new(w, h),
        Vector2::new(0.0, h),
        Vector2::new(width as f64 / 2.0, height as f64 / 2.0),
    ];

    let mut ground = [Vector2::zeros(); 5];
    for (out, px) in ground.iter_mut().zip(pixels.iter()) {
        let d_cam = k_inv * Vector3::new(px.x, px.y, 1.0);
        let d_enu = r * d_cam;
        if d_enu.z.abs() < RAY_PARALLEL_EPS {
            tracing::debug!("fov ray parallel to ground, skipping frame");
            return None;
        }
        let t = -camera.z / d_enu.z;
        let hit = camera + t * d_enu;
        *out = Vector2::new(hit.x, hit.y);
    }

    Some(FieldOfView {
        corners: [ground[0], ground[1], ground[2], ground[3]],
        principal: ground[4],
    })
}

/// Pads four ground corners into an enclosing square.
///
/// The shorter of the easting/northing extents is grown symmetrically
/// to match the longer one, then every side is padded by one full side
/// length, tripling the extent. A square this large can be rotated and
/// center-cropped to the camera frame without clipping.
pub fn square_bounding_box(corners: &[Vector2<f64>; 4]) -> [Vector2<f64>; 4] {
    let mut min_e = f64::INFINITY;
    let mut max_e = f64::NEG_INFINITY;
    let mut min_n = f64::INFINITY;
    let mut max_n = f64::NEG_INFINITY;
    for c in corners {
        min_e = min_e.min(c.x);
        max_e = max_e.max(c.x);
        min_n = min_n.min(c.y);
        max_n = max_n.max(c.y);
    }

    let d_e = max_e - min_e;
    let d_n = max_n - min_n;
    if d_e > d_n {
        let grow = (d_e - d_n) / 2.0;
        min_n -= grow;
        max_n += grow;
    } else {
        let grow = (d_n - d_e) / 2.0;
        min_e -= grow;
        max_e += grow;
    }

    let padding = max_n - min_n;
    min_e -= padding;
    max_e += padding;
    min_n -= padding;
    max_n += padding;

    [
        Vector2::new(min_e, max_n),
        Vector2::new(max_e, max_n),
        Vector2::new(max_e, min_n),
        Vector2::new(min_e, min_n),
    ]
}

/// Converts an ENU square around `origin` into a WGS84 bounding box.
pub fn square_to_bounding_box(
    origin: LatLon,
    square: &[Vector2<f64>; 4],
) -> anyhow::Result<BoundingBox> {
    // Bottom-left and top-right carry the extrema by construction.
    let sw = wgs84_offset_by_enu(origin, square[3].x, square[3].y);
    let ne = wgs84_offset_by_enu(origin, square[1].x, square[1].y);
    BoundingBox::new(sw, ne)
}
