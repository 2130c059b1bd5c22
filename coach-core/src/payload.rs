//! Outgoing coaching payload types.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Setup,
    Descending,
    Bottom,
    Ascending,
    Top,
}

impl Phase {
    pub fn from_progress(t: f32) -> Phase {
        if t < 0.2 {
            Phase::Setup
        } else if t < 0.45 {
            Phase::Descending
        } else if t < 0.6 {
            Phase::Bottom
        } else if t < 0.85 {
            Phase::Ascending
        } else {
            Phase::Top
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExerciseInfo {
    pub name: String,
    pub phase: Phase,
    pub rep: u32,
    pub reference_frame: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct QualityInfo {
    pub score: f32,
    pub confidence: f32,
    pub distance: f32,
    pub rms_divergence: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Measurements {
    pub left_knee_angle_deg: f32,
    pub right_knee_angle_deg: f32,
    pub avg_knee_angle_deg: f32,
    pub left_foot_x_body: f32,
    pub right_foot_x_body: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetDelta {
    pub delta_x_body: f32,
    pub delta_y_body: f32,
    pub target_xy_image: (f32, f32),
    pub current_xy_image: (f32, f32),
}

/// Machine-readable rationale behind a tolerance-policy correction, mirroring
/// the human-readable `text` without requiring the reader to re-parse it.
#[derive(Debug, Clone, Serialize)]
pub struct CorrectionWhy {
    pub current_x: f32,
    pub target_x: f32,
    pub delta_x: f32,
    pub tol_x: f32,
    pub ratio_x: f32,
    pub current_y: f32,
    pub target_y: f32,
    pub delta_y: f32,
    pub tol_y: f32,
    pub ratio_y: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CorrectionUi {
    pub current_xy: (f32, f32),
    pub target_xy: (f32, f32),
}

#[derive(Debug, Clone, Serialize)]
pub struct Correction {
    pub id: String,
    pub severity: Severity,
    pub side: String,
    pub part: String,
    pub target: TargetDelta,
    pub why: Option<CorrectionWhy>,
    pub why_text: Option<String>,
    pub ui: Option<CorrectionUi>,
    pub text: String,
    pub error_ratio: f32,
}

impl Correction {
    /// The `NO_POSE` marker emitted when no landmarks arrive at all.
    pub fn no_pose() -> Correction {
        Correction {
            id: "NO_POSE".into(),
            severity: Severity::Low,
            side: "center".into(),
            part: "pose".into(),
            target: TargetDelta {
                delta_x_body: 0.0,
                delta_y_body: 0.0,
                target_xy_image: (0.0, 0.0),
                current_xy_image: (0.0, 0.0),
            },
            why: None,
            why_text: None,
            ui: None,
            text: "No pose detected.".into(),
            error_ratio: 0.0,
        }
    }

    /// The `POSE_NOT_CLEAR` marker emitted when the pelvis or both shoulders
    /// are missing.
    pub fn pose_not_clear() -> Correction {
        Correction {
            id: "POSE_NOT_CLEAR".into(),
            severity: Severity::Low,
            side: "center".into(),
            part: "pose".into(),
            target: TargetDelta {
                delta_x_body: 0.0,
                delta_y_body: 0.0,
                target_xy_image: (0.0, 0.0),
                current_xy_image: (0.0, 0.0),
            },
            why: None,
            why_text: None,
            ui: None,
            text: "Pose not clear, step back into frame.".into(),
            error_ratio: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcrustesInfo {
    pub scale: f32,
    pub rotation_deg: f32,
    pub alignment_landmarks_used: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Divergence {
    pub landmark_index: usize,
    pub side: String,
    pub part: String,
    pub magnitude: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoachingLine {
    pub side: String,
    pub part: String,
    pub text: String,
    pub magnitude: f32,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RefSkeletonPoint {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoachingPayload {
    pub ts_ms: u64,
    pub exercise: ExerciseInfo,
    pub quality: QualityInfo,
    pub measurements: Measurements,
    pub corrections: Vec<Correction>,
    pub procrustes: Option<ProcrustesInfo>,
    pub divergences: Vec<Divergence>,
    pub coaching: Vec<CoachingLine>,
    pub ref_skeleton_img: Option<[RefSkeletonPoint; crate::landmark::LANDMARK_COUNT]>,
    pub should_speak: bool,
}
