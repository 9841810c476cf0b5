//! Rotate-and-crop alignment of the reference raster to the camera
//! heading.
//!
//! The cached raster is north-up. Before matching it against a camera
//! frame the raster is rotated about its center by the negated camera
//! yaw (positive yaw clockwise from north becomes a counter-clockwise
//! pixel rotation) and center-cropped to the camera frame shape. The
//! affine that undoes the crop and rotation is recorded so matched
//! reference pixels can be mapped back into the north-up raster and
//! from there to WGS84.

use image::GrayImage;
use nalgebra::{Matrix3, Vector3};

use super::{ElevationGrid, ReferenceRaster};

/// The rotated, cropped raster stack handed to the matcher.
#[derive(Debug, Clone)]
pub struct AlignedRaster {
    pub image: GrayImage,
    pub elevation: ElevationGrid,
    /// Maps aligned/cropped pixel coordinates back to pixel
    /// coordinates in the original north-up raster.
    pub inverse: Matrix3<f64>,
    /// The counter-clockwise rotation that was applied, in degrees.
    pub rotation_deg: f64,
}

/// Rotation about a pixel center, matching the classic 2x3 image
/// rotation matrix (positive angle counter-clockwise).
fn rotation_about_center(cx: f64, cy: f64, angle_deg: f64) -> Matrix3<f64> {
    let (s, c) = angle_deg.to_radians().sin_cos();
    Matrix3::new(
        c, s, (1.0 - c) * cx - s * cy,
        -s, c, s * cx + (1.0 - c) * cy,
        0.0, 0.0, 1.0,
    )
}

/// Rotates `raster` by `rotation_deg` counter-clockwise about its
/// center and center-crops to `crop` (width, height).
///
/// Returns `None` when the crop exceeds the raster or the rotation
/// matrix fails to invert. Neither happens with a correctly sized
/// raster, both are guarded so a sizing bug degrades to a skipped
/// frame instead of a panic downstream.
pub fn align(
    raster: &ReferenceRaster,
    rotation_deg: f64,
    crop: (u32, u32),
) -> Option<AlignedRaster> {
    let (full_w, full_h) = raster.size();
    let (crop_w, crop_h) = crop;
    if crop_w > full_w || crop_h > full_h {
        tracing::warn!(
            "crop {}x{} exceeds raster {}x{}, skipping alignment",
            crop_w,
            crop_h,
            full_w,
            full_h
        );
        return None;
    }

    let cx = (full_w / 2) as f64;
    let cy = (full_h / 2) as f64;
    let rotation = rotation_about_center(cx, cy, rotation_deg);
    let rotation_inv = rotation.try_inverse()?;

    let dx = (full_w / 2 - crop_w / 2) as f64;
    let dy = (full_h / 2 - crop_h / 2) as f64;

    // Inverse mapping: for each output pixel, sample the source at the
    // un-rotated, un-cropped location.
    let mut image = GrayImage::new(crop_w, crop_h);
    let mut elevation = vec![0.0f32; (crop_w as usize) * (crop_h as usize)];
    for y in 0..crop_h {
        for x in 0..crop_w {
            let src = rotation_inv * Vector3::new(x as f64 + dx, y as f64 + dy, 1.0);
            image.put_pixel(x, y, image::Luma([sample_bilinear(&raster.image, src.x, src.y)]));
            let sx = src.x.round() as i64;
            let sy = src.y.round() as i64;
            if let Some(e) = raster.elevation.get(sx, sy) {
                elevation[y as usize * crop_w as usize + x as usize] = e;
            }
        }
    }

    let crop_translation = Matrix3::new(
        1.0, 0.0, dx,
        0.0, 1.0, dy,
        0.0, 0.0, 1.0,
    );
    let inverse = rotation_inv * crop_translation;

    let elevation = ElevationGrid::new(elevation, crop_w, crop_h).ok()?;
    Some(AlignedRaster {
        image,
        elevation,
        inverse,
        rotation_deg,
    })
}

/// Bilinear sample with zero fill outside the source.
fn sample_bilinear(image: &GrayImage, x: f64, y: f64) -> u8 {
    let (w, h) = image.dimensions();
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let fetch = |px: f64, py: f64| -> f64 {
        if px < 0.0 || py < 0.0 || px >= w as f64 || py >= h as f64 {
            return 0.0;
        }
        image.get_pixel(px as u32, py as u32).0[0] as f64
    };

    let v = fetch(x0, y0) * (1.0 - fx) * (1.0 - fy)
        + fetch(x0 + 1.0, y0) * fx * (1.0 - fy)
        + fetch(x0, y0 + 1.0) * (1.0 - fx) * fy
        + fetch(x0 + 1.0, y0 + 1.0) * fx * fy;
    v.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{BoundingBox, LatLon};
    use approx::assert_relative_eq;
    use nalgebra::Vector2;

    fn gradient_raster(size: u32) -> ReferenceRaster {
        let image = GrayImage::from_fn(size, size, |x, y| image::Luma([((x * 7 + y * 13) % 251) as u8]));
        let elevation_data: Vec<f32> = (0..size * size).map(|i| i as f32).collect();
        let elevation = ElevationGrid::new(elevation_data, size, size).unwrap();
        let bbox =
            BoundingBox::new(LatLon::new(60.0, 24.0), LatLon::new(60.01, 24.01)).unwrap();
        ReferenceRaster::new(image, elevation, bbox).unwrap()
    }

    fn apply(m: &Matrix3<f64>, p: Vector2<f64>) -> Vector2<f64> {
        let out = m * Vector3::new(p.x, p.y, 1.0);
        Vector2::new(out.x, out.y)
    }

    #[test]
    fn test_zero_rotation_is_pure_crop() {
        let raster = gradient_raster(16);
        let aligned = align(&raster, 0.0, (6, 6)).unwrap();

        // dx = dy = 8 - 3 = 5: output (0,0) is source (5,5).
        assert_eq!(
            aligned.image.get_pixel(0, 0),
            raster.image.get_pixel(5, 5)
        );
        assert_eq!(aligned.elevation.get(0, 0), raster.elevation.get(5, 5));

        let back = apply(&aligned.inverse, Vector2::new(0.0, 0.0));
        assert_relative_eq!(back.x, 5.0, epsilon = 1e-9);
        assert_relative_eq!(back.y, 5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_inverse_fixes_raster_center() {
        let raster = gradient_raster(16);
        let aligned = align(&raster, 33.0, (6, 6)).unwrap();

        // The crop center sits on the rotation center, which the
        // inverse must map to itself.
        let back = apply(&aligned.inverse, Vector2::new(3.0, 3.0));
        assert_relative_eq!(back.x, 8.0, epsilon = 1e-9);
        assert_relative_eq!(back.y, 8.0, epsilon = 1e-9);
    }

    #[test]
    fn test_quarter_turn_moves_east_to_north() {
        let size = 17u32;
        let mut image = GrayImage::new(size, size);
        // Mark a pixel 5 east of the center.
        image.put_pixel(8 + 5, 8, image::Luma([200]));
        let raster = ReferenceRaster::new(
            image,
            ElevationGrid::flat(size, size),
            BoundingBox::new(LatLon::new(60.0, 24.0), LatLon::new(60.01, 24.01)).unwrap(),
        )
        .unwrap();

        let aligned = align(&raster, 90.0, (17, 17)).unwrap();
        // Counter-clockwise quarter turn: east of center ends up above
        // the center in image coordinates.
        assert_eq!(aligned.image.get_pixel(8, 8 - 5).0[0], 200);
    }

    #[test]
    fn test_inverse_round_trips_sampled_pixel() {
        // Smooth ramp so bilinear and nearest sampling agree closely.
        let size = 32u32;
        let image = GrayImage::from_fn(size, size, |x, y| image::Luma([(x * 3 + y * 4) as u8]));
        let raster = ReferenceRaster::new(
            image,
            ElevationGrid::flat(size, size),
            BoundingBox::new(LatLon::new(60.0, 24.0), LatLon::new(60.01, 24.01)).unwrap(),
        )
        .unwrap();
        let aligned = align(&raster, 45.0, (12, 12)).unwrap();

        // An aligned pixel mapped through the inverse and resampled
        // from the source must give back the aligned value.
        let p = apply(&aligned.inverse, Vector2::new(6.0, 6.0));
        let src = raster
            .image
            .get_pixel(p.x.round() as u32, p.y.round() as u32)
            .0[0] as i32;
        let out = aligned.image.get_pixel(6, 6).0[0] as i32;
        assert!((src - out).abs() <= 8, "src {} vs aligned {}", src, out);
    }

    #[test]
    fn test_oversized_crop_fails() {
        let raster = gradient_raster(8);
        assert!(align(&raster, 0.0, (16, 16)).is_none());
    }
}
