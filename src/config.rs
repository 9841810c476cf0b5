//! Pipeline configuration.

use anyhow::Result;
use serde::Deserialize;

/// Tuning knobs for the whole pipeline. Deserializable so embedding
/// applications can load it from their own config format; `Default`
/// carries the values the pipeline was tuned with.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Minimum directional overlap ratio between the candidate and the
    /// cached map bounding box below which a new map is fetched.
    pub map_overlap_update_threshold: f64,

    /// Upper bound on the requested map radius in meters.
    pub max_map_radius_m: f64,

    /// Maximum camera pitch away from nadir, in degrees, for which an
    /// estimation attempt is made.
    pub max_pitch_from_nadir_deg: f64,

    /// Minimum altitude above ground, in meters, for which an
    /// estimation attempt is made.
    pub min_match_altitude_m: f64,

    /// Maximum angular deviation, in degrees, between the solved
    /// rotation and the independent attitude expectation before an
    /// estimate is rejected.
    pub attitude_deviation_threshold_deg: f64,

    /// Minimum number of confident keypoint matches required to run
    /// the solver.
    pub min_matches: usize,

    /// Matches with confidence below this are dropped before counting.
    pub match_confidence_threshold: f64,

    /// RANSAC iteration budget for the PnP solve.
    pub ransac_iterations: usize,

    /// Inlier threshold in query pixels.
    pub reprojection_threshold_px: f64,

    /// Gauss-Newton iterations when refining the best RANSAC model on
    /// its inliers.
    pub refine_iterations: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            map_overlap_update_threshold: 0.85,
            max_map_radius_m: 400.0,
            max_pitch_from_nadir_deg: 30.0,
            min_match_altitude_m: 80.0,
            attitude_deviation_threshold_deg: 10.0,
            min_matches: 20,
            match_confidence_threshold: 0.7,
            ransac_iterations: 10,
            reprojection_threshold_px: 8.0,
            refine_iterations: 10,
        }
    }
}

impl PipelineConfig {
    /// Rejects values outside their meaningful ranges.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.map_overlap_update_threshold) {
            anyhow::bail!(
                "map_overlap_update_threshold must be in [0, 1], got {}",
                self.map_overlap_update_threshold
            );
        }
        if !(0.0..=1.0).contains(&self.match_confidence_threshold) {
            anyhow::bail!(
                "match_confidence_threshold must be in [0, 1], got {}",
                self.match_confidence_threshold
            );
        }
        if self.max_map_radius_m <= 0.0 {
            anyhow::bail!("max_map_radius_m must be positive, got {}", self.max_map_radius_m);
        }
        if !(0.0..90.0).contains(&self.max_pitch_from_nadir_deg) {
            anyhow::bail!(
                "max_pitch_from_nadir_deg must be in [0, 90), got {}",
                self.max_pitch_from_nadir_deg
            );
        }
        if self.min_match_altitude_m < 0.0 {
            anyhow::bail!(
                "min_match_altitude_m must be non-negative, got {}",
                self.min_match_altitude_m
            );
        }
        if self.attitude_deviation_threshold_deg <= 0.0 {
            anyhow::bail!(
                "attitude_deviation_threshold_deg must be positive, got {}",
                self.attitude_deviation_threshold_deg
            );
        }
        if self.min_matches < 4 {
            anyhow::bail!("min_matches must be at least 4, got {}", self.min_matches);
        }
        if self.ransac_iterations == 0 {
            anyhow::bail!("ransac_iterations must be positive");
        }
        if self.reprojection_threshold_px <= 0.0 {
            anyhow::bail!(
                "reprojection_threshold_px must be positive, got {}",
                self.reprojection_threshold_px
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_threshold() {
        let cfg = PipelineConfig {
            map_overlap_update_threshold: 1.5,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_too_few_matches() {
        let cfg = PipelineConfig {
            min_matches: 3,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
