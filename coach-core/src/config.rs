//! Engine configuration: every tunable in the coaching pipeline, immutable
//! once built and threaded through constructors. No global mutable state.

use serde::{Deserialize, Serialize};

/// Which severity/correction policy the engine runs. Represented as a
/// tagged variant selected at construction rather than runtime polymorphism
/// — both policies share the same alignment/divergence pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityPolicy {
    /// Fires a correction whenever `|δ| > coach_threshold`, ordered by
    /// divergence magnitude.
    Simple,
    /// Per-landmark tolerance ratios with activate/clear hysteresis.
    Tolerance,
}

impl Default for SeverityPolicy {
    fn default() -> Self {
        SeverityPolicy::Tolerance
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub policy: SeverityPolicy,

    /// Simple-policy divergence threshold, body-frame units.
    pub coach_threshold: f32,

    /// Tolerance-policy hysteresis ratios.
    pub activate_ratio: f32,
    pub clear_ratio: f32,
    pub activate_abs_dx: f32,
    pub activate_abs_dy: f32,
    pub clear_abs_dx: f32,
    pub clear_abs_dy: f32,

    /// Severity band boundaries on `err_ratio` (tolerance policy).
    pub severity_low_max: f32,
    pub severity_medium_max: f32,

    /// EMA smoothing for correction-arrow overlay points.
    pub overlay_alpha_cur: f32,
    pub overlay_alpha_tgt: f32,

    pub rms_history_capacity: usize,
    pub quality_history_capacity: usize,
    pub quality_history_window: usize,

    /// Visibility floor for alignment/correction/confidence landmarks.
    pub visibility_floor: f32,
    /// Minimum number of alignment landmarks required to run Procrustes.
    pub min_alignment_landmarks: usize,

    /// Rep counter.
    pub rep_angle_window: usize,
    pub rep_angle_moving_average: usize,
    pub rep_down_threshold_deg: f32,
    pub rep_standing_threshold_deg: f32,
    pub use_calibrated_rep_thresholds: bool,

    /// Simple-policy direction/magnitude phrasing bands.
    pub simple_magnitude_slight_max: f32,
    pub simple_magnitude_more_max: f32,
    pub direction_axis_ratio: f32,

    pub speech_cooldown_ms: u64,

    pub ingest_max_fps: f32,
    pub reconnect_delay_sec: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            policy: SeverityPolicy::default(),
            coach_threshold: 0.04,
            activate_ratio: 2.5,
            clear_ratio: 1.35,
            activate_abs_dx: 0.06,
            activate_abs_dy: 0.06,
            clear_abs_dx: 0.022,
            clear_abs_dy: 0.03,
            severity_low_max: 1.35,
            severity_medium_max: 2.0,
            overlay_alpha_cur: 0.72,
            overlay_alpha_tgt: 0.82,
            rms_history_capacity: 300,
            quality_history_capacity: 12,
            quality_history_window: 8,
            visibility_floor: 0.5,
            min_alignment_landmarks: 4,
            rep_angle_window: 10,
            rep_angle_moving_average: 5,
            rep_down_threshold_deg: 125.0,
            rep_standing_threshold_deg: 160.0,
            use_calibrated_rep_thresholds: true,
            simple_magnitude_slight_max: 0.20,
            simple_magnitude_more_max: 0.35,
            direction_axis_ratio: 1.1,
            speech_cooldown_ms: 5000,
            ingest_max_fps: 15.0,
            reconnect_delay_sec: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_configuration_surface() {
        let c = EngineConfig::default();
        assert_eq!(c.coach_threshold, 0.04);
        assert_eq!(c.activate_ratio, 2.5);
        assert_eq!(c.clear_ratio, 1.35);
        assert_eq!(c.speech_cooldown_ms, 5000);
    }

    #[test]
    fn deserializes_with_partial_overrides() {
        let json = r#"{"coach_threshold": 0.1}"#;
        let c: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(c.coach_threshold, 0.1);
        assert_eq!(c.activate_ratio, 2.5);
    }
}
