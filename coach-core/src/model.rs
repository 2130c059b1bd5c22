//! Reference model artifact: load/save and accessors.
//!
//! Persisted as two files sharing a base name: a MessagePack blob holding
//! the dense numeric tensors (`ref_norm`, `ref_features_scaled`,
//! `feat_mean`, `feat_std`), and a JSON metadata file holding everything
//! else. Mirrors the trainer's own two-file `.npz`/`.meta.json` split.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoachError, Result};
use crate::landmark::{LANDMARK_COUNT, LANDMARK_NAMES};
use crate::registry::ExerciseKey;

const EPS: f32 = 1e-6;

/// Dense numeric tensors, persisted as a MessagePack blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelTensors {
    /// `N x 33 x 3`, flattened row-major.
    pub ref_norm: Vec<f32>,
    /// `N x D`, flattened row-major.
    pub ref_features_scaled: Vec<f32>,
    pub feat_mean: Vec<f32>,
    pub feat_std: Vec<f32>,
    pub n_frames: usize,
    pub feature_dim: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DistanceCalibration {
    pub p50: f32,
    pub p90: f32,
    pub p99: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KneeAngleCalibration {
    pub p10: f32,
    pub p50: f32,
    pub p90: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionTolerance {
    pub x: f32,
    pub y: f32,
    pub side: String,
    pub part: String,
}

/// Human-readable metadata, persisted as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub exercise_name: String,
    pub exercise_display_name: String,
    pub reference_frames: usize,
    pub feature_landmarks: Vec<usize>,
    pub correction_landmarks: Vec<usize>,
    pub distance_calibration: DistanceCalibration,
    pub knee_angle_calibration: KneeAngleCalibration,
    pub correction_tolerance: std::collections::BTreeMap<usize, CorrectionTolerance>,
    pub landmark_names: Vec<String>,
    pub reference_quality_score: Option<f32>,
}

/// Immutable, loaded reference model. Read-only after load; the engine
/// never mutates it.
#[derive(Debug, Clone)]
pub struct ReferenceModel {
    pub tensors: ModelTensors,
    pub metadata: ModelMetadata,
}

impl ReferenceModel {
    pub fn exercise_key(&self) -> Result<ExerciseKey> {
        crate::registry::resolve(&self.metadata.exercise_name).map(|s| s.key)
    }

    pub fn n_frames(&self) -> usize {
        self.tensors.n_frames
    }

    pub fn feature_dim(&self) -> usize {
        self.tensors.feature_dim
    }

    /// `(x_body, y_body, z_scaled)` of landmark `landmark_idx` at reference
    /// frame `frame_idx`.
    pub fn ref_point(&self, frame_idx: usize, landmark_idx: usize) -> (f32, f32, f32) {
        let base = (frame_idx * LANDMARK_COUNT + landmark_idx) * 3;
        (
            self.tensors.ref_norm[base],
            self.tensors.ref_norm[base + 1],
            self.tensors.ref_norm[base + 2],
        )
    }

    pub fn scaled_feature_row(&self, frame_idx: usize) -> &[f32] {
        let d = self.tensors.feature_dim;
        &self.tensors.ref_features_scaled[frame_idx * d..(frame_idx + 1) * d]
    }

    /// Validates the dense/metadata pair: presence of all keys, positive
    /// `feat_std` after the degeneracy guard, and weakly monotonic
    /// calibration percentiles.
    pub fn validate(&self) -> Result<()> {
        let n = self.tensors.n_frames;
        let d = self.tensors.feature_dim;
        if n == 0 || d == 0 {
            return Err(CoachError::ModelLoadFailure {
                path: String::new(),
                reason: "empty tensor dimensions".into(),
            });
        }
        if self.tensors.ref_norm.len() != n * LANDMARK_COUNT * 3 {
            return Err(CoachError::ModelLoadFailure {
                path: String::new(),
                reason: "ref_norm shape mismatch".into(),
            });
        }
        if self.tensors.ref_features_scaled.len() != n * d {
            return Err(CoachError::ModelLoadFailure {
                path: String::new(),
                reason: "ref_features_scaled shape mismatch".into(),
            });
        }
        if self.tensors.feat_std.iter().any(|&s| s <= EPS || !s.is_finite()) {
            return Err(CoachError::ModelLoadFailure {
                path: String::new(),
                reason: "feat_std must be positive and finite after degeneracy guard".into(),
            });
        }
        let dc = &self.metadata.distance_calibration;
        if !(dc.p50 <= dc.p90 && dc.p90 <= dc.p99) {
            return Err(CoachError::ModelLoadFailure {
                path: String::new(),
                reason: "distance_calibration percentiles are not weakly monotonic".into(),
            });
        }
        let kc = &self.metadata.knee_angle_calibration;
        if !(kc.p10 <= kc.p50 && kc.p50 <= kc.p90) {
            return Err(CoachError::ModelLoadFailure {
                path: String::new(),
                reason: "knee_angle_calibration percentiles are not weakly monotonic".into(),
            });
        }
        Ok(())
    }

    /// Loads `<base>.model.msgpack` + `<base>.meta.json`.
    pub fn load(base_path: &Path) -> Result<Self> {
        let tensor_path = tensor_path(base_path);
        let meta_path = meta_path(base_path);

        let tensor_bytes = std::fs::read(&tensor_path).map_err(|e| CoachError::ModelLoadFailure {
            path: tensor_path.display().to_string(),
            reason: e.to_string(),
        })?;
        let tensors: ModelTensors = rmp_serde::from_slice(&tensor_bytes).map_err(|e| {
            CoachError::ModelLoadFailure {
                path: tensor_path.display().to_string(),
                reason: e.to_string(),
            }
        })?;

        let meta_bytes = std::fs::read_to_string(&meta_path).map_err(|e| CoachError::ModelLoadFailure {
            path: meta_path.display().to_string(),
            reason: e.to_string(),
        })?;
        let metadata: ModelMetadata = serde_json::from_str(&meta_bytes).map_err(|e| {
            CoachError::ModelLoadFailure {
                path: meta_path.display().to_string(),
                reason: e.to_string(),
            }
        })?;

        let model = ReferenceModel { tensors, metadata };
        model.validate().map_err(|e| match e {
            CoachError::ModelLoadFailure { reason, .. } => CoachError::ModelLoadFailure {
                path: base_path.display().to_string(),
                reason,
            },
            other => other,
        })?;
        Ok(model)
    }

    /// Saves `<base>.model.msgpack` + `<base>.meta.json`.
    pub fn save(&self, base_path: &Path) -> Result<()> {
        if let Some(parent) = base_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tensor_bytes = rmp_serde::to_vec(&self.tensors)?;
        std::fs::write(tensor_path(base_path), tensor_bytes)?;
        let meta_json = serde_json::to_string_pretty(&self.metadata)?;
        std::fs::write(meta_path(base_path), meta_json)?;
        Ok(())
    }
}

fn tensor_path(base: &Path) -> std::path::PathBuf {
    base.with_extension("model.msgpack")
}

fn meta_path(base: &Path) -> std::path::PathBuf {
    base.with_extension("meta.json")
}

pub fn landmark_names_vec() -> Vec<String> {
    LANDMARK_NAMES.iter().map(|s| s.to_string()).collect()
}
