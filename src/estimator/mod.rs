//! RANSAC pose estimation from keypoint matches.
//!
//! Reference keypoints are lifted to 3D using the elevation grid and
//! the pose of the query camera relative to the aligned raster is
//! solved from a ground-plane homography inside a small RANSAC loop,
//! then refined on the inliers.
//!
//! Axis convention: the row axis of both point sets is flipped
//! (`y' = h - y`) before solving, so the solver world frame is
//! right-handed with z up. Flipping only one side is the classic
//! silent-correctness bug this module guards against by doing both
//! flips in one place.

pub mod homography;
pub mod refine;

use nalgebra::{Vector2, Vector3};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::config::PipelineConfig;
use crate::fov::CameraIntrinsics;
use crate::geometry::Pose;
use crate::matching::Match;
use crate::raster::ElevationGrid;

use homography::{fit_homography, pose_from_homography};
use refine::refine_pose;

/// Deterministic sampling seed; estimation runs are repeatable.
const RANSAC_SEED: u64 = 0x6e61_7653;

/// A solved pose with its supporting evidence.
#[derive(Debug, Clone, Copy)]
pub struct PoseEstimate {
    pub pose: Pose,
    pub inlier_count: usize,
    pub reproj_rms_px: f64,
}

/// Keypoint-match PnP solver.
pub struct PoseEstimator {
    min_matches: usize,
    confidence_threshold: f64,
    ransac_iterations: usize,
    reprojection_threshold_px: f64,
    refine_iterations: usize,
}

impl PoseEstimator {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            min_matches: config.min_matches,
            confidence_threshold: config.match_confidence_threshold,
            ransac_iterations: config.ransac_iterations,
            reprojection_threshold_px: config.reprojection_threshold_px,
            refine_iterations: config.refine_iterations,
        }
    }

    /// Solves the query camera pose relative to the aligned reference
    /// raster. `None` is the routine "no usable estimate this cycle"
    /// outcome, never an error.
    ///
    /// `elevation` is the aligned raster's grid and shares its shape
    /// with the query frame; the shared height drives the row-axis
    /// flip on both point sets.
    pub fn estimate(
        &self,
        matches: &[Match],
        elevation: &ElevationGrid,
        intrinsics: &CameraIntrinsics,
        extrinsic_guess: Option<&Pose>,
    ) -> Option<PoseEstimate> {
        let confident: Vec<&Match> = matches
            .iter()
            .filter(|m| m.confidence >= self.confidence_threshold)
            .collect();
        if confident.len() < self.min_matches {
            tracing::debug!(
                "{} confident matches below minimum {}",
                confident.len(),
                self.min_matches
            );
            return None;
        }

        let k_inv = intrinsics.inverse_matrix()?;
        let height = elevation.height() as f64;

        // Lift reference points to 3D and flip the row axis on both
        // sides.
        let mut world = Vec::with_capacity(confident.len());
        let mut observed = Vec::with_capacity(confident.len());
        for m in &confident {
            let px = m.reference.x.floor() as i64;
            let py = m.reference.y.floor() as i64;
            let Some(z) = elevation.get(px, py) else {
                tracing::warn!(
                    "matched reference point ({:.1}, {:.1}) outside raster",
                    m.reference.x,
                    m.reference.y
                );
                return None;
            };
            world.push(Vector3::new(
                m.reference.x,
                height - m.reference.y,
                z as f64,
            ));
            let q = k_inv * Vector3::new(m.query.x, height - m.query.y, 1.0);
            observed.push(Vector2::new(q.x / q.z, q.y / q.z));
        }

        let focal = (intrinsics.fx + intrinsics.fy) / 2.0;
        let threshold_norm = self.reprojection_threshold_px / focal;
        let centroid = world
            .iter()
            .map(|p| Vector2::new(p.x, p.y))
            .sum::<Vector2<f64>>()
            / world.len() as f64;

        let mut best: Option<(Pose, Vec<usize>)> = None;
        let consider = |pose: Pose, best: &mut Option<(Pose, Vec<usize>)>| {
            let inliers = inlier_set(&pose, &world, &observed, threshold_norm);
            if best.as_ref().map_or(true, |(_, b)| inliers.len() > b.len()) {
                *best = Some((pose, inliers));
            }
        };

        // The previous accepted pose seeds the search; it does not
        // change correctness, only convergence with a small budget.
        if let Some(guess) = extrinsic_guess {
            if guess.is_valid() {
                consider(*guess, &mut best);
            }
        }

        let mut rng = StdRng::seed_from_u64(RANSAC_SEED);
        let mut indices: Vec<usize> = (0..world.len()).collect();
        for _ in 0..self.ransac_iterations {
            indices.shuffle(&mut rng);
            let sample = &indices[..4];

            let src: Vec<Vector2<f64>> =
                sample.iter().map(|&i| Vector2::new(world[i].x, world[i].y)).collect();
            let dst: Vec<Vector2<f64>> = sample.iter().map(|&i| observed[i]).collect();

            let Some(h) = fit_homography(&src, &dst) else {
                continue;
            };
            let Some(pose) = pose_from_homography(&h, &centroid) else {
                continue;
            };
            consider(pose, &mut best);
        }

        let (pose, inliers) = best?;
        let min_inliers = (self.min_matches / 2).max(4);
        if inliers.len() < min_inliers {
            tracing::warn!(
                "best consensus has {} inliers, need {}",
                inliers.len(),
                min_inliers
            );
            return None;
        }

        let inlier_world: Vec<Vector3<f64>> = inliers.iter().map(|&i| world[i]).collect();
        let inlier_obs: Vec<Vector2<f64>> = inliers.iter().map(|&i| observed[i]).collect();
        let refined = refine_pose(&pose, &inlier_world, &inlier_obs, self.refine_iterations);

        if !refined.is_valid() {
            tracing::warn!("refined rotation failed orthonormality check");
            return None;
        }

        let final_inliers = inlier_set(&refined, &world, &observed, threshold_norm);
        let rms_norm = reprojection_rms(&refined, &inlier_world, &inlier_obs)?;
        Some(PoseEstimate {
            pose: refined,
            inlier_count: final_inliers.len(),
            reproj_rms_px: rms_norm * focal,
        })
    }
}

/// Indices whose full-3D reprojection error is under the threshold.
fn inlier_set(
    pose: &Pose,
    world: &[Vector3<f64>],
    observed: &[Vector2<f64>],
    threshold_norm: f64,
) -> Vec<usize> {
    let mut inliers = Vec::new();
    for (i, (pw, obs)) in world.iter().zip(observed.iter()).enumerate() {
        if let Some(err) = reprojection_error(pose, pw, obs) {
            if err < threshold_norm {
                inliers.push(i);
            }
        }
    }
    inliers
}

fn reprojection_error(pose: &Pose, pw: &Vector3<f64>, obs: &Vector2<f64>) -> Option<f64> {
    let pc = pose.transform_point(pw);
    if pc.z <= 1e-9 {
        return None;
    }
    let u = pc.x / pc.z;
    let v = pc.y / pc.z;
    Some((u - obs.x).hypot(v - obs.y))
}

fn reprojection_rms(
    pose: &Pose,
    world: &[Vector3<f64>],
    observed: &[Vector2<f64>],
) -> Option<f64> {
    if world.is_empty() {
        return None;
    }
    let mut sum_sq = 0.0;
    for (pw, obs) in world.iter().zip(observed.iter()) {
        let err = reprojection_error(pose, pw, obs)?;
        sum_sq += err * err;
    }
    Some((sum_sq / world.len() as f64).sqrt())
}
