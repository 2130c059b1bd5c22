//! Error types for the coaching engine and trainer.

use thiserror::Error;

/// Result type for coach-core operations.
pub type Result<T> = std::result::Result<T, CoachError>;

/// Error kinds produced by the normalizer, trainer, and engine.
///
/// `InvalidFrame` and `DegeneratePose` are local and recoverable: callers
/// skip the offending frame. `InsufficientReferenceFrames` and
/// `DegenerateReference` abort training. `ModelLoadFailure` is fatal at
/// startup.
#[derive(Error, Debug)]
pub enum CoachError {
    #[error("invalid frame: expected 33 landmarks, got {got}")]
    InvalidFrame { got: usize },

    #[error("invalid frame: non-finite coordinate at landmark {index}")]
    NonFiniteLandmark { index: usize },

    #[error("invalid frame: visibility {value} at landmark {index} is out of [0,1]")]
    VisibilityOutOfRange { index: usize, value: f32 },

    #[error("degenerate pose: hip width {hip_width} too small to normalize")]
    DegeneratePose { hip_width: f32 },

    #[error("insufficient reference frames: got {got}, need at least {min}")]
    InsufficientReferenceFrames { got: usize, min: usize },

    #[error("degenerate reference: every feature dimension has near-zero variance")]
    DegenerateReference,

    #[error("unknown exercise: {0}")]
    UnknownExercise(String),

    #[error("failed to load model artifact at {path}: {reason}")]
    ModelLoadFailure { path: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("messagepack decode error: {0}")]
    MsgpackDecode(#[from] rmp_serde::decode::Error),

    #[error("messagepack encode error: {0}")]
    MsgpackEncode(#[from] rmp_serde::encode::Error),

    #[error("session sink error: {0}")]
    SinkFailure(String),
}
