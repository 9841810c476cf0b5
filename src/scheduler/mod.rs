//! Per-frame estimation scheduling and the estimate validity gate.
//!
//! The scheduler decides whether an estimation attempt is worth
//! launching for an incoming frame and whether a completed estimate is
//! geometrically plausible. The validity gate is the main defense
//! against matches that reproject cleanly but are rotated or aliased
//! against repetitive ground texture.

use nalgebra::UnitQuaternion;

use crate::config::PipelineConfig;
use crate::geometry::frames::expected_solver_rotation;
use crate::geometry::Pose;

/// Lifecycle of one estimation attempt. Validation runs synchronously
/// on the event thread, so there is no observable state between a
/// result arriving and the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerState {
    #[default]
    Idle,
    Estimating,
}

/// Inputs to the launch gate, captured from live sensor state.
#[derive(Debug, Clone, Copy)]
pub struct GateContext {
    pub have_reference: bool,
    pub estimation_pending: bool,
    /// Camera pitch away from straight down, degrees. `None` until
    /// attitude is available.
    pub pitch_from_nadir_deg: Option<f64>,
    /// Altitude above ground, meters. `None` until position is
    /// available.
    pub altitude_agl_m: Option<f64>,
}

/// Gate state machine plus extrinsic-guess bookkeeping.
pub struct EstimationScheduler {
    state: SchedulerState,
    previous_pose: Option<Pose>,
    max_pitch_from_nadir_deg: f64,
    min_match_altitude_m: f64,
    attitude_deviation_threshold_deg: f64,
}

impl EstimationScheduler {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            state: SchedulerState::default(),
            previous_pose: None,
            max_pitch_from_nadir_deg: config.max_pitch_from_nadir_deg,
            min_match_altitude_m: config.min_match_altitude_m,
            attitude_deviation_threshold_deg: config.attitude_deviation_threshold_deg,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// The previously accepted pose, used to seed the next solve.
    pub fn extrinsic_guess(&self) -> Option<&Pose> {
        self.previous_pose.as_ref()
    }

    /// Whether an estimation attempt should be launched for this
    /// frame. A false here is routine, not an error.
    pub fn should_estimate(&self, ctx: &GateContext) -> bool {
        if !ctx.have_reference {
            tracing::debug!("skipping frame: no reference raster yet");
            return false;
        }
        if ctx.estimation_pending {
            tracing::debug!("skipping frame: estimation already in flight");
            return false;
        }
        match ctx.pitch_from_nadir_deg {
            None => {
                tracing::debug!("skipping frame: attitude not yet available");
                return false;
            }
            Some(pitch) if pitch > self.max_pitch_from_nadir_deg => {
                tracing::debug!(
                    "skipping frame: pitch {:.1} deg exceeds {:.1} deg from nadir",
                    pitch,
                    self.max_pitch_from_nadir_deg
                );
                return false;
            }
            Some(_) => {}
        }
        match ctx.altitude_agl_m {
            None => {
                tracing::debug!("skipping frame: altitude not yet available");
                return false;
            }
            Some(alt) if alt < self.min_match_altitude_m => {
                tracing::debug!(
                    "skipping frame: altitude {:.0} m below minimum {:.0} m",
                    alt,
                    self.min_match_altitude_m
                );
                return false;
            }
            Some(_) => {}
        }
        true
    }

    /// Marks an attempt launched. Dispatching while one is outstanding
    /// is a scheduling bug, not an environmental condition.
    pub fn mark_estimating(&mut self) {
        debug_assert_eq!(self.state, SchedulerState::Idle);
        self.state = SchedulerState::Estimating;
    }

    /// Cross-checks a completed estimate against the independent
    /// attitude. On acceptance the pose becomes the next extrinsic
    /// guess; on rejection the guess is cleared so a bad seed does not
    /// carry into the next cycle.
    pub fn validate(
        &mut self,
        pose: &Pose,
        attitude: &UnitQuaternion<f64>,
        alignment_rotation_deg: f64,
    ) -> bool {
        self.state = SchedulerState::Idle;

        let expected = expected_solver_rotation(attitude, alignment_rotation_deg);
        let deviation_deg = pose.rotation_deviation_rad(&expected).to_degrees();

        if deviation_deg > self.attitude_deviation_threshold_deg {
            tracing::warn!(
                "estimate rejected: rotation deviates {:.1} deg from attitude (limit {:.1})",
                deviation_deg,
                self.attitude_deviation_threshold_deg
            );
            self.previous_pose = None;
            return false;
        }

        tracing::debug!("estimate accepted, deviation {:.2} deg", deviation_deg);
        self.previous_pose = Some(*pose);
        true
    }

    /// Records a solve that produced no pose at all.
    pub fn mark_failed(&mut self) {
        self.state = SchedulerState::Idle;
        self.previous_pose = None;
    }
}
