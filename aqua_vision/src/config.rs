// THEORY:
// Every tunable number in the engine lives here. The heuristics were tuned
// empirically, so nothing downstream hard-codes a threshold, a weight, or the
// pixel-to-centimetre constant; each stage reads its slice of `DetectorConfig`.
//
// Two groups:
// 1.  `DetectorConfig`: what a single detection pass does (edge threshold rule,
//     prefilter bounds, score weights, acceptance, de-duplication, NMS, measurement).
// 2.  `LoopConfig`: how often passes run and how frames are acquired (frame skip,
//     throttle interval, downscale factor, capture constraints and timeout).
//
// Both derive serde with `#[serde(default)]`, so a TOML file only needs to name the
// values it overrides.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Relative weight of each sub-score in the final confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub shape: f64,
    pub color: f64,
    pub aspect: f64,
    pub size: f64,
    pub edge: f64,
    pub motion: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            shape: 0.15,
            color: 0.20,
            aspect: 0.20,
            size: 0.12,
            edge: 0.08,
            motion: 0.35,
        }
    }
}

impl ScoreWeights {
    pub fn total(&self) -> f64 {
        self.shape + self.color + self.aspect + self.size + self.edge + self.motion
    }
}

/// Colour signature bounds for the target species (tilapia).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeciesConfig {
    /// Sampling density: step is `max(2, min(w, h) / sample_divisor)`.
    pub sample_divisor: u32,
    /// Fraction of samples that must fall in the species band.
    pub min_color_ratio: f64,
    pub max_average_saturation: f64,
    pub min_average_brightness: f64,
    pub max_average_brightness: f64,
}

impl Default for SpeciesConfig {
    fn default() -> Self {
        Self {
            sample_divisor: 15,
            min_color_ratio: 0.70,
            max_average_saturation: 0.25,
            min_average_brightness: 50.0,
            max_average_brightness: 170.0,
        }
    }
}

/// Configuration for a single detection pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    // --- Edge detection ---
    /// Lower bound of the adaptive edge threshold.
    pub edge_threshold_floor: f64,
    pub edge_median_factor: f64,
    pub edge_mean_factor: f64,

    // --- Component extraction ---
    /// Seed stride is `max(min_seed_stride, min(w, h) / seed_stride_divisor)`.
    pub seed_stride_divisor: u32,
    pub min_seed_stride: u32,
    pub placeholder_confidence: f64,

    // --- Prefilter ---
    pub min_area: u32,
    /// Upper area bound as a fraction of the frame area.
    pub max_area_fraction: f64,
    pub min_aspect_ratio: f64,
    pub max_aspect_ratio: f64,

    // --- Scoring ---
    pub weights: ScoreWeights,
    /// Feature sampling step is `max(2, min(w, h) / sample_divisor)`.
    pub sample_divisor: u32,
    /// Grayscale change that counts a sample as "moving".
    pub motion_delta: u8,
    /// Motion sub-score used when no comparable previous frame exists.
    pub no_motion_history_score: f64,
    pub acceptance_threshold: f64,
    pub max_confidence: f64,

    // --- Temporal de-duplication ---
    pub history_capacity: usize,
    /// Half-width of the neighbourhood, in processing pixels, on each axis.
    pub history_radius: u32,
    pub history_window_ms: u64,
    /// A candidate is suppressed once this many recent hits share its neighbourhood.
    pub max_recent_hits: usize,

    // --- Non-max suppression ---
    pub nms_min_area_overlap: f64,
    pub nms_max_area_overlap: f64,
    pub max_detections: usize,

    // --- Measurement ---
    pub pixel_to_cm_ratio: f64,

    pub species: SpeciesConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            edge_threshold_floor: 40.0,
            edge_median_factor: 1.2,
            edge_mean_factor: 0.8,
            seed_stride_divisor: 180,
            min_seed_stride: 2,
            placeholder_confidence: 0.8,
            min_area: 2000,
            max_area_fraction: 0.25,
            min_aspect_ratio: 1.5,
            max_aspect_ratio: 5.0,
            weights: ScoreWeights::default(),
            sample_divisor: 25,
            motion_delta: 20,
            no_motion_history_score: 0.3,
            acceptance_threshold: 0.82,
            max_confidence: 0.98,
            history_capacity: 20,
            history_radius: 40,
            history_window_ms: 3000,
            max_recent_hits: 3,
            nms_min_area_overlap: 0.30,
            nms_max_area_overlap: 0.20,
            max_detections: 8,
            pixel_to_cm_ratio: 0.08,
            species: SpeciesConfig::default(),
        }
    }
}

impl DetectorConfig {
    pub fn history_window(&self) -> Duration {
        Duration::from_millis(self.history_window_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = &self.weights;
        let all_weights = [
            weights.shape,
            weights.color,
            weights.aspect,
            weights.size,
            weights.edge,
            weights.motion,
        ];
        if all_weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ConfigError::Invalid(
                "score weights must be finite and non-negative".to_string(),
            ));
        }
        if weights.total() <= 0.0 {
            return Err(ConfigError::Invalid(
                "score weights must not all be zero".to_string(),
            ));
        }
        if !(self.min_aspect_ratio >= 1.0 && self.min_aspect_ratio < self.max_aspect_ratio) {
            return Err(ConfigError::Invalid(format!(
                "aspect ratio bounds [{}, {}] are not a valid range",
                self.min_aspect_ratio, self.max_aspect_ratio
            )));
        }
        if !(self.max_area_fraction > 0.0 && self.max_area_fraction <= 1.0) {
            return Err(ConfigError::Invalid(
                "max_area_fraction must be in (0, 1]".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.acceptance_threshold)
            || !(0.0..=1.0).contains(&self.max_confidence)
        {
            return Err(ConfigError::Invalid(
                "acceptance_threshold and max_confidence must be in [0, 1]".to_string(),
            ));
        }
        if self.seed_stride_divisor == 0 || self.sample_divisor == 0 || self.species.sample_divisor == 0 {
            return Err(ConfigError::Invalid(
                "sampling divisors must be non-zero".to_string(),
            ));
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::Invalid(
                "history_capacity must be at least 1".to_string(),
            ));
        }
        if self.max_detections == 0 {
            return Err(ConfigError::Invalid(
                "max_detections must be at least 1".to_string(),
            ));
        }
        if !(self.pixel_to_cm_ratio.is_finite() && self.pixel_to_cm_ratio > 0.0) {
            return Err(ConfigError::Invalid(
                "pixel_to_cm_ratio must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Which way a requested camera should face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    Environment,
    User,
}

/// One capture request. `None` fields mean "any".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConstraints {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub facing: Option<FacingMode>,
}

impl CaptureConstraints {
    /// The fallback ladder tried in order: small resolutions first for speed,
    /// then progressively looser requests.
    pub fn default_ladder() -> Vec<CaptureConstraints> {
        vec![
            CaptureConstraints {
                width: Some(640),
                height: Some(480),
                facing: Some(FacingMode::Environment),
            },
            CaptureConstraints {
                width: Some(480),
                height: Some(360),
                facing: Some(FacingMode::Environment),
            },
            CaptureConstraints {
                width: None,
                height: None,
                facing: Some(FacingMode::Environment),
            },
            CaptureConstraints::default(),
        ]
    }
}

/// Which accepted records are handed to the persistence collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistPolicy {
    /// Every accepted, de-duplicated detection.
    All,
    /// Only the highest-confidence detection of each pass.
    BestOnly,
}

/// Configuration for the loop orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Run a detection pass every Nth cycle.
    pub frame_skip: u32,
    pub min_detection_interval_ms: u64,
    /// Linear scale of the copy that detection runs on.
    pub process_scale: f64,
    pub acquire_timeout_ms: u64,
    pub constraints: Vec<CaptureConstraints>,
    /// Run each pass on the blocking pool instead of the loop task.
    pub offload_detection: bool,
    pub persist_policy: PersistPolicy,
    /// Pause before asking again when the source had no new frame.
    pub not_ready_backoff_ms: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            frame_skip: 3,
            min_detection_interval_ms: 100,
            process_scale: 0.6,
            acquire_timeout_ms: 10_000,
            constraints: CaptureConstraints::default_ladder(),
            offload_detection: false,
            persist_policy: PersistPolicy::All,
            not_ready_backoff_ms: 5,
        }
    }
}

impl LoopConfig {
    pub fn min_detection_interval(&self) -> Duration {
        Duration::from_millis(self.min_detection_interval_ms)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn not_ready_backoff(&self) -> Duration {
        Duration::from_millis(self.not_ready_backoff_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_skip == 0 {
            return Err(ConfigError::Invalid(
                "frame_skip must be at least 1".to_string(),
            ));
        }
        if !(self.process_scale > 0.0 && self.process_scale <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "process_scale {} must be in (0, 1]",
                self.process_scale
            )));
        }
        if self.constraints.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one capture constraint is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Top-level configuration, as loaded from a TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AquaConfig {
    pub detector: DetectorConfig,
    pub runtime: LoopConfig,
}

impl AquaConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: AquaConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detector.validate()?;
        self.runtime.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(AquaConfig::default().validate().is_ok());
    }

    #[test]
    fn default_weights_sum_to_one_point_one() {
        // Motion dominates; the sum exceeds 1 and the final score is clamped instead.
        let total = ScoreWeights::default().total();
        assert!((total - 1.10).abs() < 1e-9);
    }

    #[test]
    fn partial_toml_overrides_only_named_values() {
        let text = r#"
            [detector]
            acceptance_threshold = 0.9
            pixel_to_cm_ratio = 0.1

            [detector.weights]
            motion = 0.25

            [runtime]
            frame_skip = 2
            persist_policy = "best_only"
        "#;
        let config = AquaConfig::from_toml_str(text).unwrap();
        assert_eq!(config.detector.acceptance_threshold, 0.9);
        assert_eq!(config.detector.pixel_to_cm_ratio, 0.1);
        assert_eq!(config.detector.weights.motion, 0.25);
        assert_eq!(config.detector.weights.shape, 0.15);
        assert_eq!(config.detector.min_area, 2000);
        assert_eq!(config.runtime.frame_skip, 2);
        assert_eq!(config.runtime.persist_policy, PersistPolicy::BestOnly);
        assert_eq!(config.runtime.constraints.len(), 4);
    }

    #[test]
    fn rejects_bad_process_scale() {
        let text = "[runtime]\nprocess_scale = 1.5\n";
        match AquaConfig::from_toml_str(text) {
            Err(ConfigError::Invalid(msg)) => assert!(msg.contains("process_scale")),
            other => panic!("Expected Invalid error, got {:?}", other),
        }
    }

    #[test]
    fn rejects_inverted_aspect_bounds() {
        let config = DetectorConfig {
            min_aspect_ratio: 5.0,
            max_aspect_ratio: 1.5,
            ..DetectorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            AquaConfig::from_toml_str("[detector\nmin_area = "),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn constraint_ladder_ends_with_unconstrained_request() {
        let ladder = CaptureConstraints::default_ladder();
        assert_eq!(ladder.first().and_then(|c| c.width), Some(640));
        assert_eq!(ladder.last(), Some(&CaptureConstraints::default()));
    }
}
