//! Reference trainer: builds a calibrated `ReferenceModel` from a sequence
//! of reference pose frames.

use std::collections::BTreeMap;

use crate::error::{CoachError, Result};
use crate::features::feature_vector;
use crate::geometry::knee_angles;
use crate::landmark::{normalize_to_body_frame, part_for_landmark, side_for_landmark, RawFrame, LANDMARK_COUNT};
use crate::model::{
    landmark_names_vec, CorrectionTolerance, DistanceCalibration, KneeAngleCalibration, ModelMetadata,
    ModelTensors, ReferenceModel,
};
use crate::registry::{ExerciseSpec, ALIGNMENT_LANDMARKS, FEATURE_LANDMARKS};

const MIN_REFERENCE_FRAMES: usize = 10;
const STD_EPS: f32 = 1e-6;

/// `numpy.percentile`-compatible linear-interpolation percentile over a
/// (not necessarily sorted) slice.
fn percentile(data: &[f32], p: f64) -> f32 {
    let mut sorted: Vec<f32> = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = (p / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = (rank - lo as f64) as f32;
    sorted[lo] + frac * (sorted[hi] - sorted[lo])
}

/// Centered moving-average smoothing matching `np.convolve(data,
/// ones(window)/window, mode="same")`: samples outside the series are
/// treated as zero (not dropped), and every output sample is always divided
/// by the fixed `window` width, not by however many in-bounds samples
/// contributed to the sum.
fn smooth_same(data: &[f64], window: usize) -> Vec<f64> {
    let n = data.len();
    let w = window.max(1);
    let half = (w - 1) / 2;
    (0..n)
        .map(|i| {
            let center = i + half;
            let lo = center.saturating_sub(w - 1);
            let hi = center.min(n.saturating_sub(1));
            let sum: f64 = if lo <= hi { data[lo..=hi].iter().sum() } else { 0.0 };
            sum / w as f64
        })
        .collect()
}

fn robust_std(rows: &[Vec<f32>], dim: usize) -> Vec<f32> {
    let n = rows.len() as f32;
    let mean: Vec<f32> = (0..dim)
        .map(|d| rows.iter().map(|r| r[d]).sum::<f32>() / n)
        .collect();
    (0..dim)
        .map(|d| {
            let var = rows.iter().map(|r| (r[d] - mean[d]).powi(2)).sum::<f32>() / n;
            let std = var.sqrt();
            if std < STD_EPS { 1.0 } else { std }
        })
        .collect()
}

fn feature_mean(rows: &[Vec<f32>], dim: usize) -> Vec<f32> {
    let n = rows.len() as f32;
    (0..dim).map(|d| rows.iter().map(|r| r[d]).sum::<f32>() / n).collect()
}

/// Leave-one-out nearest-neighbor distance for each row in a scaled feature
/// matrix: pairwise Euclidean distance with the diagonal masked to `+inf`,
/// then the per-row minimum.
fn leave_one_out_nearest(rows: &[Vec<f32>]) -> Vec<f32> {
    let n = rows.len();
    (0..n)
        .map(|i| {
            (0..n)
                .filter(|&j| j != i)
                .map(|j| {
                    rows[i]
                        .iter()
                        .zip(rows[j].iter())
                        .map(|(&a, &b)| (a - b) * (a - b))
                        .sum::<f32>()
                        .sqrt()
                })
                .fold(f32::INFINITY, f32::min)
        })
        .collect()
}

/// Builds a reference model from an ordered sequence of reference frames
/// for the given exercise. Fails with `InsufficientReferenceFrames` below
/// 10 frames, `DegenerateReference` when every feature dimension has
/// near-zero raw variance.
pub fn train(frames: &[RawFrame], spec: &ExerciseSpec) -> Result<ReferenceModel> {
    let n = frames.len();
    if n < MIN_REFERENCE_FRAMES {
        return Err(CoachError::InsufficientReferenceFrames {
            got: n,
            min: MIN_REFERENCE_FRAMES,
        });
    }

    let mut ref_norm = Vec::with_capacity(n * LANDMARK_COUNT * 3);
    let mut feature_rows: Vec<Vec<f32>> = Vec::with_capacity(n);
    let mut knee_means: Vec<f32> = Vec::with_capacity(n);
    // Per-correction-landmark (x, y) trajectories, for tolerance smoothing.
    let mut traj_x: BTreeMap<usize, Vec<f64>> = BTreeMap::new();
    let mut traj_y: BTreeMap<usize, Vec<f64>> = BTreeMap::new();
    for &idx in spec.correction_landmarks {
        traj_x.insert(idx, Vec::with_capacity(n));
        traj_y.insert(idx, Vec::with_capacity(n));
    }

    for frame in frames {
        let (normalized, _info) = normalize_to_body_frame(frame)?;
        for p in normalized.points.iter() {
            ref_norm.push(p.x);
            ref_norm.push(p.y);
            ref_norm.push(p.z);
        }
        feature_rows.push(feature_vector(&normalized, &FEATURE_LANDMARKS));
        let (_, _, mean_knee) = knee_angles(&normalized);
        knee_means.push(mean_knee);
        for &idx in spec.correction_landmarks {
            let p = normalized.get(idx);
            traj_x.get_mut(&idx).unwrap().push(p.x as f64);
            traj_y.get_mut(&idx).unwrap().push(p.y as f64);
        }
    }

    let dim = feature_rows[0].len();
    let feat_mean = feature_mean(&feature_rows, dim);
    let feat_std_raw = raw_std(&feature_rows, dim, &feat_mean);
    if feat_std_raw.iter().all(|&s| s < STD_EPS) {
        return Err(CoachError::DegenerateReference);
    }
    let feat_std = robust_std(&feature_rows, dim);

    let ref_features_scaled: Vec<f32> = feature_rows
        .iter()
        .flat_map(|row| {
            row.iter()
                .zip(feat_mean.iter())
                .zip(feat_std.iter())
                .map(|((&f, &m), &s)| (f - m) / s)
        })
        .collect();

    let scaled_rows: Vec<Vec<f32>> = (0..n)
        .map(|i| ref_features_scaled[i * dim..(i + 1) * dim].to_vec())
        .collect();
    let loo = leave_one_out_nearest(&scaled_rows);
    let distance_calibration = DistanceCalibration {
        p50: percentile(&loo, 50.0),
        p90: percentile(&loo, 90.0),
        p99: percentile(&loo, 99.0),
    };

    let knee_angle_calibration = KneeAngleCalibration {
        p10: percentile(&knee_means, 10.0),
        p50: percentile(&knee_means, 50.0),
        p90: percentile(&knee_means, 90.0),
    };

    let smooth_window = (n / 30).clamp(3, 7);
    let mut correction_tolerance = BTreeMap::new();
    for &idx in spec.correction_landmarks {
        let raw_x = &traj_x[&idx];
        let raw_y = &traj_y[&idx];
        let smooth_x = smooth_same(raw_x, smooth_window);
        let smooth_y = smooth_same(raw_y, smooth_window);
        let residual_x: Vec<f32> = raw_x
            .iter()
            .zip(smooth_x.iter())
            .map(|(&a, &b)| (a - b).abs() as f32)
            .collect();
        let residual_y: Vec<f32> = raw_y
            .iter()
            .zip(smooth_y.iter())
            .map(|(&a, &b)| (a - b).abs() as f32)
            .collect();
        let tol_x = (percentile(&residual_x, 90.0) * 3.0 + 0.03).max(0.05);
        let tol_y = (percentile(&residual_y, 90.0) * 3.0 + 0.04).max(0.06);
        correction_tolerance.insert(
            idx,
            CorrectionTolerance {
                x: tol_x,
                y: tol_y,
                side: side_for_landmark(idx).to_string(),
                part: part_for_landmark(idx).to_string(),
            },
        );
    }

    let metadata = ModelMetadata {
        exercise_name: spec.key.as_str().to_string(),
        exercise_display_name: spec.display_name.to_string(),
        reference_frames: n,
        feature_landmarks: FEATURE_LANDMARKS.to_vec(),
        correction_landmarks: spec.correction_landmarks.to_vec(),
        distance_calibration,
        knee_angle_calibration,
        correction_tolerance,
        landmark_names: landmark_names_vec(),
        reference_quality_score: None,
    };

    let model = ReferenceModel {
        tensors: ModelTensors {
            ref_norm,
            ref_features_scaled,
            feat_mean,
            feat_std,
            n_frames: n,
            feature_dim: dim,
        },
        metadata,
    };
    model.validate()?;
    Ok(model)
}

fn raw_std(rows: &[Vec<f32>], dim: usize, mean: &[f32]) -> Vec<f32> {
    let n = rows.len() as f32;
    (0..dim)
        .map(|d| (rows.iter().map(|r| (r[d] - mean[d]).powi(2)).sum::<f32>() / n).sqrt())
        .collect()
}

/// Alignment landmarks shared by every exercise's Procrustes step.
pub fn alignment_landmarks() -> &'static [usize] {
    &ALIGNMENT_LANDMARKS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmark::Landmark;
    use crate::registry;
    use rand::prelude::*;
    use rand::rngs::StdRng;

    fn synthetic_squat_frames(n: usize, seed: u64) -> Vec<RawFrame> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|i| {
                let t = i as f32 / n as f32;
                let squat_depth = (t * std::f32::consts::PI * 4.0).sin() * 0.1;
                let mut landmarks = [Landmark { x: 0.5, y: 0.5, z: 0.0, visibility: 1.0 }; LANDMARK_COUNT];
                let jitter = || rng.gen_range(-0.001..0.001);
                landmarks[crate::landmark::LEFT_HIP] = Landmark { x: 0.55, y: 0.5 + squat_depth, z: 0.0, visibility: 1.0 };
                landmarks[crate::landmark::RIGHT_HIP] = Landmark { x: 0.45, y: 0.5 + squat_depth, z: 0.0, visibility: 1.0 };
                landmarks[crate::landmark::LEFT_SHOULDER] = Landmark { x: 0.55, y: 0.2 + squat_depth, z: 0.0, visibility: 1.0 };
                landmarks[crate::landmark::RIGHT_SHOULDER] = Landmark { x: 0.45, y: 0.2 + squat_depth, z: 0.0, visibility: 1.0 };
                landmarks[crate::landmark::LEFT_KNEE] = Landmark { x: 0.55 + jitter(), y: 0.7 - squat_depth, z: 0.0, visibility: 1.0 };
                landmarks[crate::landmark::RIGHT_KNEE] = Landmark { x: 0.45 + jitter(), y: 0.7 - squat_depth, z: 0.0, visibility: 1.0 };
                landmarks[crate::landmark::LEFT_ANKLE] = Landmark { x: 0.55, y: 0.9, z: 0.0, visibility: 1.0 };
                landmarks[crate::landmark::RIGHT_ANKLE] = Landmark { x: 0.45, y: 0.9, z: 0.0, visibility: 1.0 };
                landmarks[crate::landmark::LEFT_FOOT_INDEX] = Landmark { x: 0.55, y: 0.95, z: 0.0, visibility: 1.0 };
                landmarks[crate::landmark::RIGHT_FOOT_INDEX] = Landmark { x: 0.45, y: 0.95, z: 0.0, visibility: 1.0 };
                RawFrame { landmarks, timestamp_ms: (i as u64) * 66 }
            })
            .collect()
    }

    #[test]
    fn too_few_frames_is_rejected() {
        let frames = synthetic_squat_frames(5, 1);
        let spec = registry::spec_for(registry::ExerciseKey::Squat);
        assert!(matches!(
            train(&frames, spec),
            Err(CoachError::InsufficientReferenceFrames { .. })
        ));
    }

    #[test]
    fn trains_a_valid_model_from_synthetic_corpus() {
        let frames = synthetic_squat_frames(60, 7);
        let spec = registry::spec_for(registry::ExerciseKey::Squat);
        let model = train(&frames, spec).unwrap();
        assert_eq!(model.n_frames(), 60);
        assert!(model.validate().is_ok());
        assert!(model.tensors.feat_std.iter().all(|&s| s > 0.0));
    }

    #[test]
    fn feature_standardization_is_centered_and_scaled() {
        let frames = synthetic_squat_frames(60, 11);
        let spec = registry::spec_for(registry::ExerciseKey::Squat);
        let model = train(&frames, spec).unwrap();
        let d = model.feature_dim();
        let n = model.n_frames();
        for dim in 0..d {
            let mean: f32 = (0..n)
                .map(|i| model.tensors.ref_features_scaled[i * d + dim])
                .sum::<f32>()
                / n as f32;
            assert!(mean.abs() < 0.05, "dim {dim} mean {mean}");
        }
    }
}
