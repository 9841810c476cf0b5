//! Pipeline orchestration.
//!
//! `NavSystem` is the top-level struct embedding applications interact
//! with. It runs entirely on the caller's event thread: external
//! callbacks write sensor state, `update_map` keeps the reference
//! raster current, and `process_frame` launches and harvests
//! estimation attempts. The heavy work (map fetch, matching + solve)
//! runs on single-slot background workers.

pub mod sensors;
pub mod snapshot;

use std::sync::Arc;

use anyhow::Result;
use image::GrayImage;

use crate::cache::{dynamic_map_radius, raster_diagonal, MapClient, ReferenceMapCache};
use crate::config::PipelineConfig;
use crate::estimator::{PoseEstimate, PoseEstimator};
use crate::fov::{project_fov, square_bounding_box, square_to_bounding_box};
use crate::geo::{wgs84_offset_by_enu, BoundingBox};
use crate::geometry::frames::{camera_yaw_deg, pitch_from_nadir_deg};
use crate::matching::KeypointMatcher;
use crate::raster::align;
use crate::resolver::{resolve, GlobalPoseEstimate};
use crate::scheduler::{EstimationScheduler, GateContext};
use crate::worker::Worker;

pub use sensors::{SensorSnapshot, SensorState};
pub use snapshot::InputSnapshot;

/// One camera frame as delivered by the transport layer.
pub struct CameraFrame {
    pub image: GrayImage,
    /// Seconds, in the clock of the image source.
    pub timestamp: f64,
}

type EstimationOutcome = (InputSnapshot, Option<PoseEstimate>);

/// Top-level pipeline: map cache, estimation worker, scheduler.
pub struct NavSystem {
    config: PipelineConfig,
    sensors: Arc<SensorState>,
    cache: ReferenceMapCache,
    scheduler: EstimationScheduler,
    estimation: Worker<InputSnapshot, EstimationOutcome>,
}

impl NavSystem {
    /// Builds the pipeline around the two external collaborators.
    pub fn new(
        config: PipelineConfig,
        map_client: Box<dyn MapClient>,
        matcher: Box<dyn KeypointMatcher>,
    ) -> Result<Self> {
        config.validate()?;

        let cache = ReferenceMapCache::new(map_client, config.map_overlap_update_threshold);

        let estimator = PoseEstimator::from_config(&config);
        let estimation = Worker::spawn(move |snapshot: InputSnapshot| {
            let matches = matcher.match_images(&snapshot.query, &snapshot.aligned.image);
            let estimate = estimator.estimate(
                &matches,
                &snapshot.aligned.elevation,
                &snapshot.intrinsics,
                snapshot.extrinsic_guess.as_ref(),
            );
            (snapshot, estimate)
        });

        Ok(Self {
            scheduler: EstimationScheduler::new(&config),
            sensors: Arc::new(SensorState::new()),
            config,
            cache,
            estimation,
        })
    }

    /// Sensor state handle for the external attitude/position/camera
    /// callbacks.
    pub fn sensors(&self) -> Arc<SensorState> {
        self.sensors.clone()
    }

    pub fn has_reference(&self) -> bool {
        self.cache.current().is_some()
    }

    pub fn estimation_pending(&self) -> bool {
        self.estimation.is_busy()
    }

    /// One map maintenance cycle: drain a completed fetch, project the
    /// current field of view, and request a new map when coverage has
    /// drifted too far. Returns the bounding box the view implies,
    /// which is also what external fetch collaborators are given.
    pub fn update_map(&mut self) -> Option<BoundingBox> {
        self.cache.poll();

        let sensors = self.sensors.snapshot();
        let attitude = sensors.attitude?;
        let position = sensors.position?;
        let altitude = sensors.altitude_agl_m?;
        let intrinsics = sensors.intrinsics?;
        let image_dim = sensors.image_dim?;

        let fov = project_fov(&attitude, altitude, &intrinsics, image_dim)?;
        let square = square_bounding_box(&fov.corners);

        // Cap a runaway footprint (horizon-grazing rays) at the radius
        // the altitude justifies.
        let max_radius = dynamic_map_radius(
            altitude,
            Some(&intrinsics),
            image_dim.0,
            self.config.max_map_radius_m,
        );
        let half_side = (square[1].x - square[0].x) / 2.0;
        let candidate = if half_side > max_radius {
            let center_e = (square[0].x + square[1].x) / 2.0;
            let center_n = (square[0].y + square[3].y) / 2.0;
            let center = wgs84_offset_by_enu(position, center_e, center_n);
            BoundingBox::from_center_and_radius(center, max_radius).ok()?
        } else {
            square_to_bounding_box(position, &square).ok()?
        };

        if self.cache.should_refetch(&candidate) {
            let diagonal = raster_diagonal(image_dim);
            self.cache.request_fetch(candidate, (diagonal, diagonal));
        }

        Some(candidate)
    }

    /// One frame cycle: harvest a finished estimation attempt, then
    /// decide whether this frame launches a new one.
    ///
    /// The returned estimate, when present, belongs to the attempt
    /// that just completed, which was launched on an earlier frame.
    pub fn process_frame(&mut self, frame: CameraFrame) -> Option<GlobalPoseEstimate> {
        let output = self.harvest_completed();

        let sensors = self.sensors.snapshot();
        let ctx = GateContext {
            have_reference: self.cache.current().is_some(),
            estimation_pending: self.estimation.is_busy(),
            pitch_from_nadir_deg: sensors.attitude.as_ref().map(pitch_from_nadir_deg),
            altitude_agl_m: sensors.altitude_agl_m,
        };
        if self.scheduler.should_estimate(&ctx) {
            self.launch_attempt(frame, &sensors);
        }

        output
    }

    fn harvest_completed(&mut self) -> Option<GlobalPoseEstimate> {
        let was_pending = self.estimation.is_busy();
        let Some((snapshot, result)) = self.estimation.poll() else {
            // A pending attempt that cleared without a result means the
            // worker died mid-job.
            if was_pending && !self.estimation.is_busy() {
                self.scheduler.mark_failed();
            }
            return None;
        };

        let Some(estimate) = result else {
            tracing::debug!("estimation attempt produced no pose");
            self.scheduler.mark_failed();
            return None;
        };

        tracing::debug!(
            "solver pose with {} inliers, rms {:.2} px",
            estimate.inlier_count,
            estimate.reproj_rms_px
        );

        if !self
            .scheduler
            .validate(&estimate.pose, &snapshot.attitude, snapshot.rotation_deg)
        {
            return None;
        }

        let resolved = resolve(
            &estimate.pose,
            &snapshot.raster,
            &snapshot.aligned,
            snapshot.timestamp,
        );
        if let Some(global) = &resolved {
            tracing::info!(
                "global pose ({:.6}, {:.6}) at {:.0} m AMSL",
                global.position.lat,
                global.position.lon,
                global.position.altitude_amsl
            );
        }
        resolved
    }

    fn launch_attempt(&mut self, frame: CameraFrame, sensors: &SensorSnapshot) {
        // The gate verified attitude and altitude; intrinsics may
        // still be missing independently.
        let (Some(attitude), Some(intrinsics)) = (sensors.attitude, sensors.intrinsics) else {
            tracing::debug!("skipping frame: camera info not yet available");
            return;
        };
        let Some(raster) = self.cache.current() else {
            return;
        };

        // Positive yaw clockwise from north becomes a counter-clockwise
        // raster rotation.
        let rotation_deg = -camera_yaw_deg(&attitude);
        let Some(aligned) = align(&raster, rotation_deg, frame.image.dimensions()) else {
            return;
        };

        let snapshot = InputSnapshot {
            query: frame.image,
            aligned,
            raster,
            intrinsics,
            extrinsic_guess: self.scheduler.extrinsic_guess().copied(),
            attitude,
            rotation_deg,
            timestamp: frame.timestamp,
        };
        if self.estimation.dispatch(snapshot).is_ok() {
            self.scheduler.mark_estimating();
        }
    }
}
