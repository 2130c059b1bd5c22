//! Coaching engine: per-frame normalize → feature → match → align →
//! divergence → severity → corrections → rep count.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::config::{EngineConfig, SeverityPolicy};
use crate::features::{feature_vector, standardize};
use crate::geometry::{knee_angles, procrustes_2d};
use crate::landmark::{
    normalize_to_body_frame, part_for_landmark, side_for_landmark, FrameInfo, NormalizedFrame, RawFrame,
    LEFT_ANKLE, LEFT_FOOT_INDEX, LEFT_HIP, LEFT_KNEE, LEFT_SHOULDER, RIGHT_ANKLE, RIGHT_FOOT_INDEX,
    RIGHT_HIP, RIGHT_KNEE, RIGHT_SHOULDER,
};
use crate::model::ReferenceModel;
use crate::payload::{
    Correction, CorrectionUi, CorrectionWhy, CoachingLine, CoachingPayload, Divergence, ExerciseInfo,
    Measurements, Phase, ProcrustesInfo, QualityInfo, RefSkeletonPoint, Severity, TargetDelta,
};
use crate::registry::FEATURE_LANDMARKS;

/// Runtime state for one currently-active correction landmark: smoothed
/// `(current, target)` image-space arrow endpoints. Created on first
/// activation, discarded when no longer active.
#[derive(Debug, Clone, Copy)]
struct ArrowState {
    current: (f32, f32),
    target: (f32, f32),
}

#[derive(Debug, Clone, Copy, Default)]
struct HysteresisState {
    active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RepState {
    Standing,
    Down,
}

struct RepCounter {
    state: RepState,
    angle_history: VecDeque<f32>,
    rep_count: u32,
}

impl RepCounter {
    fn new() -> Self {
        Self {
            state: RepState::Standing,
            angle_history: VecDeque::new(),
            rep_count: 0,
        }
    }

    fn update(&mut self, mean_knee_angle: f32, config: &EngineConfig, down_thr: f32, standing_thr: f32) {
        self.angle_history.push_back(mean_knee_angle);
        while self.angle_history.len() > config.rep_angle_window {
            self.angle_history.pop_front();
        }
        let window = config.rep_angle_moving_average.min(self.angle_history.len()).max(1);
        let k: f32 = self.angle_history.iter().rev().take(window).sum::<f32>() / window as f32;

        match self.state {
            RepState::Standing => {
                if k < down_thr {
                    self.state = RepState::Down;
                }
            }
            RepState::Down => {
                if k > standing_thr {
                    self.state = RepState::Standing;
                    self.rep_count += 1;
                }
            }
        }
    }
}

/// Per-frame inference state for the active coaching session. Single
/// threaded and stateful by design (§5): every mutation happens on one
/// logical task, `infer` runs to completion before the next frame starts.
pub struct CoachingEngine {
    model: Arc<ReferenceModel>,
    config: EngineConfig,
    hysteresis: HashMap<usize, HysteresisState>,
    arrows: HashMap<usize, ArrowState>,
    quality_history: VecDeque<f32>,
    rms_history: VecDeque<(f64, f32)>,
    rep_counter: RepCounter,
    last_spoken: Option<(String, u64)>,
}

impl CoachingEngine {
    pub fn new(model: Arc<ReferenceModel>, config: EngineConfig) -> Self {
        Self {
            model,
            config,
            hysteresis: HashMap::new(),
            arrows: HashMap::new(),
            quality_history: VecDeque::new(),
            rms_history: VecDeque::new(),
            rep_counter: RepCounter::new(),
            last_spoken: None,
        }
    }

    pub fn rep_count(&self) -> u32 {
        self.rep_counter.rep_count
    }

    /// Runs the full pipeline for one frame. Never returns an error in
    /// steady state: degenerate or unclear poses become a skeleton-only
    /// payload with a marker correction, per §7.
    pub fn infer(&mut self, frame: &RawFrame, timestamp_ms: u64) -> CoachingPayload {
        if frame.is_empty_pose() {
            return self.marker_payload(timestamp_ms, Correction::no_pose());
        }
        if frame.is_pose_unclear() {
            return self.marker_payload(timestamp_ms, Correction::pose_not_clear());
        }

        let (normalized, frame_info) = match normalize_to_body_frame(frame) {
            Ok(v) => v,
            Err(_) => return self.marker_payload(timestamp_ms, Correction::pose_not_clear()),
        };

        let feature = feature_vector(&normalized, &FEATURE_LANDMARKS);
        let scaled = standardize(&feature, &self.model.tensors.feat_mean, &self.model.tensors.feat_std);

        let (best_idx, best_dist) = self.nearest_neighbor(&scaled);

        let quality_score = self.push_quality(best_dist);
        let confidence = confidence_score(frame, &self.config);

        let alignment = self.align(&normalized, best_idx);

        let (corrections, divergences, coaching, sum_sq, n_visible) =
            self.compute_corrections(frame, &normalized, &frame_info, best_idx, &alignment);

        let rms_divergence = (sum_sq / (n_visible.max(1) as f32)).sqrt();
        self.rms_history.push_back((timestamp_ms as f64 / 1000.0, rms_divergence));
        while self.rms_history.len() > self.config.rms_history_capacity {
            self.rms_history.pop_front();
        }

        let (left_knee, right_knee, mean_knee) = knee_angles(&normalized);
        let (down_thr, standing_thr) = self.rep_thresholds();
        self.rep_counter.update(mean_knee, &self.config, down_thr, standing_thr);

        let t = best_idx as f32 / (self.model.n_frames().max(2) - 1) as f32;
        let phase = Phase::from_progress(t.clamp(0.0, 1.0));

        let should_speak = self.update_speech_gate(&corrections, timestamp_ms);

        let ref_skeleton_img = alignment.as_ref().map(|a| project_reference_skeleton(&self.model, a, &frame_info));

        CoachingPayload {
            ts_ms: timestamp_ms,
            exercise: ExerciseInfo {
                name: self.model.metadata.exercise_name.clone(),
                phase,
                rep: self.rep_counter.rep_count,
                reference_frame: best_idx,
            },
            quality: QualityInfo {
                score: quality_score,
                confidence,
                distance: best_dist,
                rms_divergence,
            },
            measurements: Measurements {
                left_knee_angle_deg: left_knee,
                right_knee_angle_deg: right_knee,
                avg_knee_angle_deg: mean_knee,
                left_foot_x_body: normalized.get(LEFT_FOOT_INDEX).x,
                right_foot_x_body: normalized.get(RIGHT_FOOT_INDEX).x,
            },
            corrections,
            procrustes: alignment.as_ref().map(|a| ProcrustesInfo {
                scale: a.procrustes.scale as f32,
                rotation_deg: a.procrustes.rotation_deg() as f32,
                alignment_landmarks_used: a.landmarks_used,
            }),
            divergences,
            coaching,
            ref_skeleton_img,
            should_speak,
        }
    }

    fn marker_payload(&mut self, timestamp_ms: u64, correction: Correction) -> CoachingPayload {
        CoachingPayload {
            ts_ms: timestamp_ms,
            exercise: ExerciseInfo {
                name: self.model.metadata.exercise_name.clone(),
                phase: Phase::Setup,
                rep: self.rep_counter.rep_count,
                reference_frame: 0,
            },
            quality: QualityInfo {
                score: 0.0,
                confidence: 0.0,
                distance: 0.0,
                rms_divergence: 0.0,
            },
            measurements: Measurements {
                left_knee_angle_deg: 180.0,
                right_knee_angle_deg: 180.0,
                avg_knee_angle_deg: 180.0,
                left_foot_x_body: 0.0,
                right_foot_x_body: 0.0,
            },
            corrections: vec![correction],
            procrustes: None,
            divergences: Vec::new(),
            coaching: Vec::new(),
            ref_skeleton_img: None,
            should_speak: false,
        }
    }

    fn nearest_neighbor(&self, scaled: &[f32]) -> (usize, f32) {
        let n = self.model.n_frames();
        let mut best_idx = 0;
        let mut best_dist = f32::INFINITY;
        for i in 0..n {
            let row = self.model.scaled_feature_row(i);
            let d: f32 = row
                .iter()
                .zip(scaled.iter())
                .map(|(&a, &b)| (a - b) * (a - b))
                .sum::<f32>()
                .sqrt();
            if d < best_dist {
                best_dist = d;
                best_idx = i;
            }
        }
        (best_idx, best_dist)
    }

    fn push_quality(&mut self, distance: f32) -> f32 {
        let dc = &self.model.metadata.distance_calibration;
        let denom = (dc.p99 - dc.p50).max(1e-6);
        let q_raw = (1.0 - (distance - dc.p50) / denom).clamp(0.0, 1.0);
        self.quality_history.push_back(q_raw);
        while self.quality_history.len() > self.config.quality_history_capacity {
            self.quality_history.pop_front();
        }
        let window = self.config.quality_history_window.min(self.quality_history.len()).max(1);
        self.quality_history.iter().rev().take(window).sum::<f32>() / window as f32
    }

    fn rep_thresholds(&self) -> (f32, f32) {
        if self.config.use_calibrated_rep_thresholds {
            let kc = &self.model.metadata.knee_angle_calibration;
            (kc.p10, kc.p90)
        } else {
            (self.config.rep_down_threshold_deg, self.config.rep_standing_threshold_deg)
        }
    }

    fn align(&self, user: &NormalizedFrame, ref_idx: usize) -> Option<Alignment> {
        let landmarks = crate::registry::ALIGNMENT_LANDMARKS;
        let mut user_pts = Vec::new();
        let mut ref_pts = Vec::new();
        for &idx in landmarks.iter() {
            // Alignment landmark visibility is approximated from the raw
            // frame by the caller; here we only have normalized points, so
            // visibility gating happens before calling align via the raw
            // frame passed to compute_corrections. This helper assumes the
            // caller has already filtered to visible landmarks by passing a
            // full set; degeneracy (fewer than min_alignment_landmarks) is
            // handled by the caller.
            let up = user.get(idx);
            user_pts.push((up.x, up.y));
            let (rx, ry, _) = self.model.ref_point(ref_idx, idx);
            ref_pts.push((rx, ry));
        }
        if user_pts.len() < self.config.min_alignment_landmarks {
            return None;
        }
        let procrustes = procrustes_2d(&user_pts, &ref_pts, false);
        Some(Alignment {
            procrustes,
            landmarks_used: user_pts.len(),
            ref_idx,
        })
    }

    fn compute_corrections(
        &mut self,
        frame: &RawFrame,
        user: &NormalizedFrame,
        frame_info: &FrameInfo,
        ref_idx: usize,
        alignment: &Option<Alignment>,
    ) -> (Vec<Correction>, Vec<Divergence>, Vec<CoachingLine>, f32, u32) {
        let correction_landmarks = &self.model.metadata.correction_landmarks;
        let mut sum_sq = 0.0_f32;
        let mut n_visible = 0_u32;
        let mut candidates: Vec<CorrectionCandidate> = Vec::new();
        let mut divergences = Vec::new();
        let mut coaching = Vec::new();

        // Visible alignment landmarks, re-derived here because `align` does
        // not have access to raw visibility.
        let visible_alignment = crate::registry::ALIGNMENT_LANDMARKS
            .iter()
            .filter(|&&idx| frame.landmarks[idx].visibility >= self.config.visibility_floor)
            .count();
        let use_alignment = visible_alignment >= self.config.min_alignment_landmarks;

        for &idx in correction_landmarks {
            if frame.landmarks[idx].visibility < self.config.visibility_floor {
                self.hysteresis.remove(&idx);
                self.arrows.remove(&idx);
                continue;
            }
            let up = user.get(idx);
            let (raw_x, raw_y, _) = self.model.ref_point(ref_idx, idx);
            let (rx, ry) = match (use_alignment, alignment) {
                (true, Some(a)) => a.transform((raw_x, raw_y)),
                _ => (raw_x, raw_y),
            };

            let dx = up.x - rx;
            let dy = up.y - ry;
            let magnitude = (dx * dx + dy * dy).sqrt();
            sum_sq += dx * dx + dy * dy;
            n_visible += 1;

            divergences.push(Divergence {
                landmark_index: idx,
                side: side_for_landmark(idx).to_string(),
                part: part_for_landmark(idx).to_string(),
                magnitude,
            });

            candidates.push(CorrectionCandidate {
                landmark_index: idx,
                dx,
                dy,
                magnitude,
                user_image: frame_info.to_image(up.x, up.y),
                target_image: frame_info.to_image(rx, ry),
            });
        }

        match self.config.policy {
            SeverityPolicy::Simple => {
                let mut out = Vec::new();
                candidates.sort_by(|a, b| b.magnitude.partial_cmp(&a.magnitude).unwrap());
                for c in &candidates {
                    if c.magnitude <= self.config.coach_threshold {
                        continue;
                    }
                    let (direction, _) = direction_text(c.dx, c.dy, self.config.direction_axis_ratio);
                    let magnitude_word = if c.magnitude < self.config.simple_magnitude_slight_max {
                        " slightly"
                    } else if c.magnitude < self.config.simple_magnitude_more_max {
                        ""
                    } else {
                        " more"
                    };
                    let side = side_for_landmark(c.landmark_index);
                    let part = part_for_landmark(c.landmark_index);
                    let text = format!("Move your {side} {part} {direction}{magnitude_word}.");
                    coaching.push(CoachingLine {
                        side: side.to_string(),
                        part: part.to_string(),
                        text: text.clone(),
                        magnitude: c.magnitude,
                    });
                    let ui = self.update_arrow(c.landmark_index, c.user_image, c.target_image);
                    out.push(Correction {
                        id: format!("{}_{}", side.to_uppercase(), part.to_uppercase()),
                        severity: Severity::Low,
                        side: side.to_string(),
                        part: part.to_string(),
                        target: TargetDelta {
                            delta_x_body: c.dx,
                            delta_y_body: c.dy,
                            target_xy_image: c.target_image,
                            current_xy_image: c.user_image,
                        },
                        why: None,
                        why_text: None,
                        ui: Some(ui),
                        text,
                        error_ratio: c.magnitude / self.config.coach_threshold.max(1e-6),
                    });
                }
                (out, divergences, coaching, sum_sq, n_visible)
            }
            SeverityPolicy::Tolerance => {
                let mut out = Vec::new();
                for c in &candidates {
                    let tol = self.model.metadata.correction_tolerance.get(&c.landmark_index);
                    let (tol_x, tol_y) = match tol {
                        Some(t) => (t.x, t.y),
                        None => (self.config.coach_threshold, self.config.coach_threshold),
                    };
                    let ratio_x = c.dx.abs() / tol_x.max(1e-6);
                    let ratio_y = c.dy.abs() / tol_y.max(1e-6);
                    let err_ratio = ratio_x.max(ratio_y);

                    let state = self.hysteresis.entry(c.landmark_index).or_default();
                    let should_activate = err_ratio >= self.config.activate_ratio
                        && (c.dx.abs() >= self.config.activate_abs_dx || c.dy.abs() >= self.config.activate_abs_dy);
                    let should_clear = err_ratio <= self.config.clear_ratio
                        || (c.dx.abs() <= self.config.clear_abs_dx && c.dy.abs() <= self.config.clear_abs_dy);

                    if should_activate {
                        state.active = true;
                    } else if should_clear {
                        state.active = false;
                    }
                    let active = state.active;

                    if !active {
                        self.arrows.remove(&c.landmark_index);
                        continue;
                    }

                    let severity = if err_ratio < self.config.severity_low_max {
                        Severity::Low
                    } else if err_ratio < self.config.severity_medium_max {
                        Severity::Medium
                    } else {
                        Severity::High
                    };

                    let (direction, _) = direction_text(c.dx, c.dy, self.config.direction_axis_ratio);
                    let magnitude_word = if err_ratio < 1.8 { " slightly" } else { " more" };
                    let side = side_for_landmark(c.landmark_index);
                    let part = part_for_landmark(c.landmark_index);
                    let text = format!("Move your {side} {part} {direction}{magnitude_word}.");

                    let ui = self.update_arrow(c.landmark_index, c.user_image, c.target_image);
                    let why = CorrectionWhy {
                        current_x: c.user_image.0,
                        target_x: c.target_image.0,
                        delta_x: c.dx,
                        tol_x,
                        ratio_x,
                        current_y: c.user_image.1,
                        target_y: c.target_image.1,
                        delta_y: c.dy,
                        tol_y,
                        ratio_y,
                    };
                    let why_text = format!(
                        "x: {:.3} vs {:.3} (tol {:.3}, ratio {:.2}); y: {:.3} vs {:.3} (tol {:.3}, ratio {:.2})",
                        why.current_x, why.target_x, why.tol_x, why.ratio_x,
                        why.current_y, why.target_y, why.tol_y, why.ratio_y
                    );

                    out.push(Correction {
                        id: format!("{}_{}", side.to_uppercase(), part.to_uppercase()),
                        severity,
                        side: side.to_string(),
                        part: part.to_string(),
                        target: TargetDelta {
                            delta_x_body: c.dx,
                            delta_y_body: c.dy,
                            target_xy_image: c.target_image,
                            current_xy_image: c.user_image,
                        },
                        why: Some(why),
                        why_text: Some(why_text),
                        ui: Some(ui),
                        text,
                        error_ratio: err_ratio,
                    });
                }
                out.sort_by(|a, b| b.error_ratio.partial_cmp(&a.error_ratio).unwrap());
                (out, divergences, coaching, sum_sq, n_visible)
            }
        }
    }

    fn update_arrow(&mut self, landmark_index: usize, measured_current: (f32, f32), measured_target: (f32, f32)) -> CorrectionUi {
        let alpha_c = self.config.overlay_alpha_cur;
        let alpha_t = self.config.overlay_alpha_tgt;
        let entry = self.arrows.entry(landmark_index).or_insert(ArrowState {
            current: measured_current,
            target: measured_target,
        });
        entry.current = ema(entry.current, measured_current, alpha_c);
        entry.target = ema(entry.target, measured_target, alpha_t);
        CorrectionUi {
            current_xy: entry.current,
            target_xy: entry.target,
        }
    }

    fn update_speech_gate(&mut self, corrections: &[Correction], timestamp_ms: u64) -> bool {
        let top = corrections
            .iter()
            .filter(|c| c.severity != Severity::Low)
            .max_by(|a, b| a.error_ratio.partial_cmp(&b.error_ratio).unwrap());
        let top = match top {
            Some(c) => c,
            None => return false,
        };
        let should_speak = match &self.last_spoken {
            None => true,
            Some((text, ts)) => text != &top.text || timestamp_ms.saturating_sub(*ts) > self.config.speech_cooldown_ms,
        };
        if should_speak {
            self.last_spoken = Some((top.text.clone(), timestamp_ms));
        }
        should_speak
    }
}

struct Alignment {
    procrustes: crate::geometry::Procrustes,
    landmarks_used: usize,
    ref_idx: usize,
}

impl Alignment {
    /// Maps any reference-frame point through the fitted `(rotation, scale,
    /// translation)`, not just the alignment-landmark subset the fit was
    /// computed from.
    fn transform(&self, ref_point: (f32, f32)) -> (f32, f32) {
        self.procrustes.transform(ref_point)
    }
}

struct CorrectionCandidate {
    landmark_index: usize,
    dx: f32,
    dy: f32,
    magnitude: f32,
    user_image: (f32, f32),
    target_image: (f32, f32),
}

fn ema(prev: (f32, f32), measured: (f32, f32), alpha: f32) -> (f32, f32) {
    (
        alpha * prev.0 + (1.0 - alpha) * measured.0,
        alpha * prev.1 + (1.0 - alpha) * measured.1,
    )
}

/// Dominant correction direction from `(dx, dy)`: ratio-based tie-break,
/// axes with `ratio >= axis_ratio` both included, else the larger-magnitude
/// axis wins.
fn direction_text(dx: f32, dy: f32, axis_ratio: f32) -> (String, (bool, bool)) {
    let ax = dx.abs();
    let ay = dy.abs();
    let (include_x, include_y) = if ax < 1e-6 && ay < 1e-6 {
        (false, false)
    } else if ay < 1e-6 {
        (true, false)
    } else if ax < 1e-6 {
        (false, true)
    } else if ax / ay >= axis_ratio {
        (true, false)
    } else if ay / ax >= axis_ratio {
        (false, true)
    } else {
        (true, true)
    };

    let mut parts = Vec::new();
    if include_x {
        parts.push(if dx > 0.0 { "right" } else { "left" });
    }
    if include_y {
        parts.push(if dy > 0.0 { "down" } else { "up" });
    }
    if parts.is_empty() {
        parts.push("back");
    }
    (parts.join(" and "), (include_x, include_y))
}

fn confidence_score(frame: &RawFrame, config: &EngineConfig) -> f32 {
    let idxs = [
        LEFT_SHOULDER, RIGHT_SHOULDER, LEFT_HIP, RIGHT_HIP, LEFT_KNEE, RIGHT_KNEE, LEFT_ANKLE, RIGHT_ANKLE,
    ];
    let _ = config;
    let sum: f32 = idxs.iter().map(|&i| frame.landmarks[i].visibility).sum();
    sum / idxs.len() as f32
}

/// Projects all 33 Procrustes-aligned reference landmarks into image space,
/// for UI overlay independent of which landmarks are this exercise's
/// correction landmarks.
fn project_reference_skeleton(
    model: &ReferenceModel,
    alignment: &Alignment,
    frame_info: &FrameInfo,
) -> [RefSkeletonPoint; crate::landmark::LANDMARK_COUNT] {
    let mut out = [RefSkeletonPoint { x: 0.0, y: 0.0 }; crate::landmark::LANDMARK_COUNT];
    for (idx, slot) in out.iter_mut().enumerate() {
        let (rx, ry, _) = model.ref_point(alignment.ref_idx, idx);
        let (bx, by) = alignment.transform((rx, ry));
        let (ix, iy) = frame_info.to_image(bx, by);
        *slot = RefSkeletonPoint { x: ix, y: iy };
    }
    out
}

#[cfg(test)]
mod scenario_tests {
    use super::*;
    use crate::landmark::{Landmark, LANDMARK_COUNT};
    use crate::registry;

    fn squat_frame(t: f32) -> [Landmark; LANDMARK_COUNT] {
        let squat_depth = (t * std::f32::consts::PI * 4.0).sin() * 0.1;
        let mut landmarks = [Landmark { x: 0.5, y: 0.5, z: 0.0, visibility: 1.0 }; LANDMARK_COUNT];
        landmarks[LEFT_HIP] = Landmark { x: 0.55, y: 0.5 + squat_depth, z: 0.0, visibility: 1.0 };
        landmarks[RIGHT_HIP] = Landmark { x: 0.45, y: 0.5 + squat_depth, z: 0.0, visibility: 1.0 };
        landmarks[LEFT_SHOULDER] = Landmark { x: 0.55, y: 0.2 + squat_depth, z: 0.0, visibility: 1.0 };
        landmarks[RIGHT_SHOULDER] = Landmark { x: 0.45, y: 0.2 + squat_depth, z: 0.0, visibility: 1.0 };
        landmarks[LEFT_KNEE] = Landmark { x: 0.55, y: 0.7 - squat_depth, z: 0.0, visibility: 1.0 };
        landmarks[RIGHT_KNEE] = Landmark { x: 0.45, y: 0.7 - squat_depth, z: 0.0, visibility: 1.0 };
        landmarks[LEFT_ANKLE] = Landmark { x: 0.55, y: 0.9, z: 0.0, visibility: 1.0 };
        landmarks[RIGHT_ANKLE] = Landmark { x: 0.45, y: 0.9, z: 0.0, visibility: 1.0 };
        landmarks[LEFT_FOOT_INDEX] = Landmark { x: 0.55, y: 0.95, z: 0.0, visibility: 1.0 };
        landmarks[RIGHT_FOOT_INDEX] = Landmark { x: 0.45, y: 0.95, z: 0.0, visibility: 1.0 };
        landmarks
    }

    fn reference_corpus(n: usize) -> Vec<RawFrame> {
        (0..n)
            .map(|i| RawFrame {
                landmarks: squat_frame(i as f32 / n as f32),
                timestamp_ms: (i as u64) * 66,
            })
            .collect()
    }

    fn trained_engine(n: usize) -> CoachingEngine {
        let frames = reference_corpus(n);
        let spec = registry::spec_for(registry::ExerciseKey::Squat);
        let model = crate::trainer::train(&frames, spec).unwrap();
        CoachingEngine::new(Arc::new(model), EngineConfig::default())
    }

    /// Scenario 1: clean replay of the training corpus should track the
    /// reference frame closely, emit no non-marker corrections, and score
    /// a high mean quality.
    #[test]
    fn clean_replay_tracks_reference_and_stays_quiet() {
        let frames = reference_corpus(60);
        let mut engine = trained_engine(60);

        let mut diffs = Vec::new();
        let mut qualities = Vec::new();
        let mut non_marker_corrections = 0;
        for (i, frame) in frames.iter().enumerate() {
            let payload = engine.infer(frame, (i as u64) * 66);
            if i >= 15 {
                diffs.push((payload.exercise.reference_frame as i64 - i as i64).unsigned_abs());
                qualities.push(payload.quality.score);
                non_marker_corrections += payload
                    .corrections
                    .iter()
                    .filter(|c| c.id != "NO_POSE" && c.id != "POSE_NOT_CLEAR")
                    .count();
            }
        }
        let mean_diff = diffs.iter().sum::<u64>() as f64 / diffs.len() as f64;
        let max_diff = *diffs.iter().max().unwrap();
        let mean_quality = qualities.iter().sum::<f32>() / qualities.len() as f32;

        assert!(mean_diff <= 2.0, "mean diff {mean_diff}");
        assert!(max_diff < 8, "max diff {max_diff}");
        assert_eq!(non_marker_corrections, 0);
        assert!(mean_quality > 0.90, "mean quality {mean_quality}");
    }

    /// Scenario 2: a sustained knee-valgus perturbation should fire a
    /// `part = knee` correction within the perturbation window.
    #[test]
    fn knee_valgus_perturbation_triggers_knee_correction() {
        let frames = reference_corpus(60);
        let mut engine = trained_engine(60);

        for (i, frame) in frames.iter().enumerate().take(30) {
            engine.infer(frame, (i as u64) * 66);
        }

        let mut fired = false;
        for i in 30..60 {
            let mut landmarks = frames[i % 60].landmarks;
            landmarks[LEFT_KNEE].x += 0.08;
            landmarks[RIGHT_KNEE].x -= 0.08;
            let frame = RawFrame { landmarks, timestamp_ms: (i as u64) * 66 };
            let payload = engine.infer(&frame, (i as u64) * 66);
            if payload.corrections.iter().any(|c| c.part == "knee") {
                fired = true;
                break;
            }
        }
        assert!(fired, "expected a knee correction within the perturbation window");
    }

    /// Scenario 3: a sustained ankle-down perturbation on the left ankle
    /// should surface as the top correction with a downward target delta.
    #[test]
    fn ankle_down_perturbation_surfaces_as_top_correction() {
        let frames = reference_corpus(60);
        let mut engine = trained_engine(60);

        for (i, frame) in frames.iter().enumerate().take(40) {
            engine.infer(frame, (i as u64) * 66);
        }

        let mut top_correction_id = String::new();
        let mut top_delta_y = 0.0_f32;
        for i in 40..80 {
            let mut landmarks = frames[i % 60].landmarks;
            landmarks[LEFT_ANKLE].y += 0.12;
            let frame = RawFrame { landmarks, timestamp_ms: (i as u64) * 66 };
            let payload = engine.infer(&frame, (i as u64) * 66);
            if let Some(top) = payload
                .corrections
                .iter()
                .max_by(|a, b| a.error_ratio.partial_cmp(&b.error_ratio).unwrap())
            {
                top_correction_id = top.id.clone();
                top_delta_y = top.target.delta_y_body;
            }
        }
        assert!(top_correction_id.starts_with("LEFT_ANKLE"), "got {top_correction_id}");
        assert!(top_delta_y > 0.0, "expected downward delta, got {top_delta_y}");
    }

    /// Scenario 4: a persistent (non-transient) perturbation should settle
    /// into a stable smoothed arrow rather than chase every raw sample —
    /// the active correction's smoothed `target_xy` should barely move
    /// across the 40-frame perturbation window.
    #[test]
    fn persistent_perturbation_keeps_arrow_target_stable() {
        let frames = reference_corpus(60);
        let mut engine = trained_engine(60);

        for (i, frame) in frames.iter().enumerate().take(30) {
            engine.infer(frame, (i as u64) * 66);
        }

        let mut targets_x = Vec::new();
        let mut targets_y = Vec::new();
        for i in 30..70 {
            let mut landmarks = frames[i % 60].landmarks;
            landmarks[LEFT_KNEE].x += 0.10;
            let frame = RawFrame { landmarks, timestamp_ms: (i as u64) * 66 };
            let payload = engine.infer(&frame, (i as u64) * 66);
            if let Some(c) = payload.corrections.iter().find(|c| c.part == "knee" && c.side == "left") {
                if let Some(ui) = &c.ui {
                    targets_x.push(ui.target_xy.0);
                    targets_y.push(ui.target_xy.1);
                }
            }
        }

        assert!(!targets_x.is_empty(), "expected the perturbation to trigger an active knee correction");
        let range = |v: &[f32]| v.iter().cloned().fold(f32::MIN, f32::max) - v.iter().cloned().fold(f32::MAX, f32::min);
        let range_x = range(&targets_x);
        let range_y = range(&targets_y);
        assert!(range_x < 0.15, "target_xy x range {range_x}");
        assert!(range_y < 0.15, "target_xy y range {range_y}");
    }

    /// Scenario 5 (divergence mode, rotation invariance): rotating every
    /// landmark of a clean frame rigidly about the image center leaves
    /// body-frame normalization (and therefore the Procrustes-aligned
    /// divergence) unchanged, since hip-line-relative normalization cancels
    /// any global rigid rotation. This exercises every correction landmark,
    /// including ones (feet, for squat) outside the 8-point alignment set.
    #[test]
    fn rotation_invariance_keeps_divergence_stable() {
        let frames = reference_corpus(60);
        let base_landmarks = frames[30].landmarks;

        let mut baseline_engine = trained_engine(60);
        let baseline = baseline_engine.infer(&RawFrame { landmarks: base_landmarks, timestamp_ms: 0 }, 0);

        let rotated_landmarks = rotate_landmarks(&base_landmarks, 15.0_f32.to_radians(), (0.5, 0.5));
        let mut rotated_engine = trained_engine(60);
        let rotated = rotated_engine.infer(&RawFrame { landmarks: rotated_landmarks, timestamp_ms: 0 }, 0);

        let delta = (rotated.quality.rms_divergence - baseline.quality.rms_divergence).abs();
        assert!(
            delta <= 0.15,
            "baseline {} rotated {} delta {delta}",
            baseline.quality.rms_divergence,
            rotated.quality.rms_divergence
        );
    }

    fn rotate_landmarks(landmarks: &[Landmark; LANDMARK_COUNT], theta: f32, center: (f32, f32)) -> [Landmark; LANDMARK_COUNT] {
        let (s, c) = theta.sin_cos();
        let mut out = *landmarks;
        for lm in out.iter_mut() {
            let dx = lm.x - center.0;
            let dy = lm.y - center.1;
            lm.x = center.0 + c * dx - s * dy;
            lm.y = center.1 + s * dx + c * dy;
        }
        out
    }

    /// Scenario 6: a synthetic knee-angle trajectory oscillating between
    /// 170 and 110 degrees across 5 cycles should be counted as 5 reps.
    #[test]
    fn rep_counter_counts_five_cycles() {
        let mut counter = RepCounter::new();
        let config = EngineConfig::default();
        let (down_thr, standing_thr) = (config.rep_down_threshold_deg, config.rep_standing_threshold_deg);

        for _cycle in 0..5 {
            for _ in 0..8 {
                counter.update(110.0, &config, down_thr, standing_thr);
            }
            for _ in 0..8 {
                counter.update(170.0, &config, down_thr, standing_thr);
            }
        }
        assert_eq!(counter.rep_count, 5, "expected 5 reps, got {}", counter.rep_count);
    }
}
