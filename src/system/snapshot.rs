//! Immutable input bundle for one estimation attempt.

use std::sync::Arc;

use image::GrayImage;
use nalgebra::UnitQuaternion;

use crate::fov::CameraIntrinsics;
use crate::geometry::Pose;
use crate::raster::{AlignedRaster, ReferenceRaster};

/// Everything the estimation worker and the completion handling need,
/// captured at dispatch time.
///
/// The match can take long enough that live state (cached raster,
/// attitude, alignment rotation) moves on before it completes;
/// post-processing must see the state that was true at dispatch, so it
/// is frozen here instead of re-read later.
pub struct InputSnapshot {
    /// Query camera frame.
    pub query: GrayImage,
    /// Reference raster rotated and cropped to the query heading.
    pub aligned: AlignedRaster,
    /// The unrotated raster the alignment came from.
    pub raster: Arc<ReferenceRaster>,
    pub intrinsics: CameraIntrinsics,
    /// Previous accepted pose, if any, seeding the solver.
    pub extrinsic_guess: Option<Pose>,
    /// Attitude at dispatch, for the post-hoc validity gate.
    pub attitude: UnitQuaternion<f64>,
    /// Rotation applied by the aligner, degrees counter-clockwise.
    pub rotation_deg: f64,
    /// Query frame timestamp, seconds.
    pub timestamp: f64,
}
