//! Conversion of a solved raster-frame pose into a WGS84 global pose.
//!
//! The PnP solution lives in aligned-raster pixel units. Position is
//! recovered by walking the camera center back through the alignment
//! inverse and the raster geotransform; altitude by scaling the pixel
//! z with the known metric size of the raster footprint; orientation
//! by relabeling the solved rotation into NED.

use nalgebra::{Rotation3, UnitQuaternion, Vector2};

use crate::geo::{LatLonAlt, RasterTransform};
use crate::geometry::frames::{camera_axis_flip, enu_to_ned, rotation_about_up};
use crate::geometry::Pose;
use crate::raster::{AlignedRaster, ReferenceRaster};

/// Terminal output of the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct GlobalPoseEstimate {
    pub position: LatLonAlt,
    /// Camera orientation in the NED frame.
    pub orientation: UnitQuaternion<f64>,
    /// Timestamp of the query frame, seconds.
    pub timestamp: f64,
}

/// Resolves a solver pose against the raster it was matched to.
///
/// `None` on geometric degeneracies: invalid rotation, singular
/// alignment affine, camera at or below the ground plane, or
/// non-finite outputs.
pub fn resolve(
    pose: &Pose,
    raster: &ReferenceRaster,
    aligned: &AlignedRaster,
    timestamp: f64,
) -> Option<GlobalPoseEstimate> {
    if !pose.is_valid() {
        tracing::warn!("resolver got an invalid pose");
        return None;
    }

    let camera = pose.camera_position();

    // Undo the row-axis flip the solver frames were built with, then
    // map back into the north-up raster.
    let crop_height = aligned.elevation.height() as f64;
    let aligned_px = Vector2::new(camera.x, crop_height - camera.y);
    let to_raster = RasterTransform::from_matrix(aligned.inverse);
    let raster_px = to_raster.apply(aligned_px);

    let (full_w, full_h) = raster.size();
    let geo = RasterTransform::new(&raster.bbox, (full_w, full_h)).apply(raster_px);
    let (lon, lat) = (geo.x, geo.y);

    // Pixel to meter scale from the known footprint size.
    let perimeter_px = 2.0 * (full_w as f64 + full_h as f64);
    let scale = raster.bbox.perimeter_meters() / perimeter_px;

    // The solver camera frame puts the ground at positive depth, which
    // lands the camera center at negative z in pixel units.
    let altitude_agl = -scale * camera.z;
    if !altitude_agl.is_finite() || altitude_agl <= 0.0 {
        tracing::warn!("resolved camera at or below ground, discarding");
        return None;
    }

    let terrain = raster
        .elevation
        .get(raster_px.x.round() as i64, raster_px.y.round() as i64)
        .unwrap_or(0.0) as f64;
    let altitude_amsl = altitude_agl + terrain;

    if !lat.is_finite() || !lon.is_finite() {
        tracing::warn!("non-finite geographic position, discarding");
        return None;
    }

    // Re-express the solved rotation as a physical camera orientation:
    // undo the alignment rotation, the solver transpose and the axis
    // flip, then relabel ENU to NED.
    let r_enu_world = rotation_about_up(-aligned.rotation_deg.to_radians());
    let r_enu_cam = r_enu_world * pose.rotation.transpose() * camera_axis_flip();
    let r_ned_cam = enu_to_ned() * r_enu_cam;
    let orientation =
        UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r_ned_cam));

    Some(GlobalPoseEstimate {
        position: LatLonAlt {
            lat,
            lon,
            altitude_amsl,
        },
        orientation,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{BoundingBox, LatLon};
    use crate::geometry::frames::nadir_camera_in_enu;
    use crate::raster::{align, ElevationGrid};
    use approx::assert_relative_eq;
    use image::GrayImage;
    use nalgebra::{Matrix3, Vector3};

    fn raster_at(center: LatLon, radius_m: f64, size: u32) -> ReferenceRaster {
        let bbox = BoundingBox::from_center_and_radius(center, radius_m).unwrap();
        ReferenceRaster::new(
            GrayImage::new(size, size),
            ElevationGrid::flat(size, size),
            bbox,
        )
        .unwrap()
    }

    #[test]
    fn test_nadir_camera_at_crop_center_resolves_to_bbox_center() {
        let center = LatLon::new(60.0, 24.0);
        let raster = raster_at(center, 200.0, 100);
        let aligned = align(&raster, 0.0, (50, 50)).unwrap();

        // Camera center at (25, 25, -100) in the flipped crop frame:
        // the crop center, 100 pixel units above ground.
        let pose = Pose::new(Matrix3::identity(), Vector3::new(-25.0, -25.0, 100.0));
        let estimate = resolve(&pose, &raster, &aligned, 1.5).unwrap();

        assert_relative_eq!(estimate.position.lat, center.lat, epsilon = 1e-4);
        assert_relative_eq!(estimate.position.lon, center.lon, epsilon = 1e-4);

        // 100x100 raster over a 400x400 m footprint: 4 m per pixel.
        assert_relative_eq!(estimate.position.altitude_amsl, 400.0, epsilon = 4.0);
        assert_relative_eq!(estimate.timestamp, 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_nadir_orientation_is_nadir_in_ned() {
        let raster = raster_at(LatLon::new(60.0, 24.0), 200.0, 100);
        let aligned = align(&raster, 0.0, (50, 50)).unwrap();
        let pose = Pose::new(Matrix3::identity(), Vector3::new(-25.0, -25.0, 100.0));
        let estimate = resolve(&pose, &raster, &aligned, 0.0).unwrap();

        let expected = enu_to_ned() * nadir_camera_in_enu();
        let got = estimate.orientation.to_rotation_matrix();
        assert_relative_eq!(*got.matrix(), expected, epsilon = 1e-9);
    }

    #[test]
    fn test_camera_below_ground_rejected() {
        let raster = raster_at(LatLon::new(60.0, 24.0), 200.0, 100);
        let aligned = align(&raster, 0.0, (50, 50)).unwrap();
        // Positive camera z in the flipped frame means the solver put
        // the camera under the ground plane.
        let pose = Pose::new(Matrix3::identity(), Vector3::new(-25.0, -25.0, -100.0));
        assert!(resolve(&pose, &raster, &aligned, 0.0).is_none());
    }

    #[test]
    fn test_invalid_rotation_rejected() {
        let raster = raster_at(LatLon::new(60.0, 24.0), 200.0, 100);
        let aligned = align(&raster, 0.0, (50, 50)).unwrap();
        let pose = Pose::new(Matrix3::identity() * 2.0, Vector3::new(0.0, 0.0, 100.0));
        assert!(resolve(&pose, &raster, &aligned, 0.0).is_none());
    }

    #[test]
    fn test_terrain_elevation_added_to_amsl() {
        let center = LatLon::new(60.0, 24.0);
        let bbox = BoundingBox::from_center_and_radius(center, 200.0).unwrap();
        let elevation =
            ElevationGrid::new(vec![120.0; 100 * 100], 100, 100).unwrap();
        let raster =
            ReferenceRaster::new(GrayImage::new(100, 100), elevation, bbox).unwrap();
        let aligned = align(&raster, 0.0, (50, 50)).unwrap();

        let pose = Pose::new(Matrix3::identity(), Vector3::new(-25.0, -25.0, 100.0));
        let estimate = resolve(&pose, &raster, &aligned, 0.0).unwrap();
        assert_relative_eq!(estimate.position.altitude_amsl, 520.0, epsilon = 4.0);
    }
}
