//! Landmark frame container and body-frame normalization.

use serde::{Deserialize, Serialize};

use crate::error::{CoachError, Result};

/// Exactly 33 landmarks per frame, MediaPipe Pose ordering. Indices are part
/// of the wire contract: do not reorder.
pub const LANDMARK_COUNT: usize = 33;

pub const NOSE: usize = 0;
pub const LEFT_SHOULDER: usize = 11;
pub const RIGHT_SHOULDER: usize = 12;
pub const LEFT_ELBOW: usize = 13;
pub const RIGHT_ELBOW: usize = 14;
pub const LEFT_WRIST: usize = 15;
pub const RIGHT_WRIST: usize = 16;
pub const LEFT_HIP: usize = 23;
pub const RIGHT_HIP: usize = 24;
pub const LEFT_KNEE: usize = 25;
pub const RIGHT_KNEE: usize = 26;
pub const LEFT_ANKLE: usize = 27;
pub const RIGHT_ANKLE: usize = 28;
pub const LEFT_FOOT_INDEX: usize = 31;
pub const RIGHT_FOOT_INDEX: usize = 32;

/// Symbolic name for each of the 33 landmark indices, in order.
pub const LANDMARK_NAMES: [&str; LANDMARK_COUNT] = [
    "nose",
    "left_eye_inner",
    "left_eye",
    "left_eye_outer",
    "right_eye_inner",
    "right_eye",
    "right_eye_outer",
    "left_ear",
    "right_ear",
    "mouth_left",
    "mouth_right",
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "left_wrist",
    "right_wrist",
    "left_pinky",
    "right_pinky",
    "left_index",
    "right_index",
    "left_thumb",
    "right_thumb",
    "left_hip",
    "right_hip",
    "left_knee",
    "right_knee",
    "left_ankle",
    "right_ankle",
    "left_heel",
    "right_heel",
    "left_foot_index",
    "right_foot_index",
];

/// Looks up a landmark index by its symbolic name.
pub fn landmark_index_by_name(name: &str) -> Option<usize> {
    LANDMARK_NAMES.iter().position(|&n| n == name)
}

/// Side label used in corrections, derived from a landmark's name.
pub fn side_for_landmark(index: usize) -> &'static str {
    let name = LANDMARK_NAMES[index];
    if name.starts_with("left_") {
        "left"
    } else if name.starts_with("right_") {
        "right"
    } else {
        "center"
    }
}

/// Body-part label used in corrections, derived from a landmark's name.
pub fn part_for_landmark(index: usize) -> &'static str {
    match index {
        LEFT_SHOULDER | RIGHT_SHOULDER => "shoulder",
        LEFT_ELBOW | RIGHT_ELBOW => "elbow",
        LEFT_WRIST | RIGHT_WRIST => "wrist",
        LEFT_HIP | RIGHT_HIP => "hip",
        LEFT_KNEE | RIGHT_KNEE => "knee",
        LEFT_ANKLE | RIGHT_ANKLE => "ankle",
        LEFT_FOOT_INDEX | RIGHT_FOOT_INDEX => "foot",
        _ => "joint",
    }
}

const EPS: f32 = 1e-4;

/// One landmark observation: image-normalized `x, y` in `[0,1]`, signed
/// depth-like `z` on the same scale, and per-landmark `visibility`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub visibility: f32,
}

impl Landmark {
    pub const MISSING: Landmark = Landmark {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        visibility: 0.0,
    };

    fn validate(&self, index: usize) -> Result<()> {
        if !self.x.is_finite() || !self.y.is_finite() || !self.z.is_finite() {
            return Err(CoachError::NonFiniteLandmark { index });
        }
        if !(0.0..=1.0).contains(&self.visibility) || !self.visibility.is_finite() {
            return Err(CoachError::VisibilityOutOfRange {
                index,
                value: self.visibility,
            });
        }
        Ok(())
    }
}

/// A raw pose frame as received from the upstream pose source: exactly 33
/// landmarks plus a millisecond timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFrame {
    pub landmarks: [Landmark; LANDMARK_COUNT],
    pub timestamp_ms: u64,
}

impl RawFrame {
    pub fn from_landmarks(landmarks: Vec<Landmark>, timestamp_ms: u64) -> Result<Self> {
        if landmarks.len() != LANDMARK_COUNT {
            return Err(CoachError::InvalidFrame {
                got: landmarks.len(),
            });
        }
        let mut arr = [Landmark::MISSING; LANDMARK_COUNT];
        arr.copy_from_slice(&landmarks);
        Self::validate(&arr)?;
        Ok(Self {
            landmarks: arr,
            timestamp_ms,
        })
    }

    fn validate(landmarks: &[Landmark; LANDMARK_COUNT]) -> Result<()> {
        for (i, lm) in landmarks.iter().enumerate() {
            lm.validate(i)?;
        }
        Ok(())
    }

    /// True when every landmark has zero visibility (no pose detected at all).
    pub fn is_empty_pose(&self) -> bool {
        self.landmarks.iter().all(|lm| lm.visibility <= 0.0)
    }

    /// True when the pelvis (both hips) or both shoulders are entirely
    /// missing, so a body frame cannot be constructed meaningfully.
    pub fn is_pose_unclear(&self) -> bool {
        let hips_missing =
            self.landmarks[LEFT_HIP].visibility <= 0.0 && self.landmarks[RIGHT_HIP].visibility <= 0.0;
        let shoulders_missing = self.landmarks[LEFT_SHOULDER].visibility <= 0.0
            && self.landmarks[RIGHT_SHOULDER].visibility <= 0.0;
        hips_missing || shoulders_missing
    }
}

/// A landmark position expressed in body-frame coordinates:
/// `(x_body, y_body, z_scaled)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BodyPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl BodyPoint {
    pub fn xy(self) -> (f32, f32) {
        (self.x, self.y)
    }
}

/// 33 landmarks expressed in the body-centric frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedFrame {
    pub points: [BodyPoint; LANDMARK_COUNT],
}

impl NormalizedFrame {
    pub fn get(&self, index: usize) -> BodyPoint {
        self.points[index]
    }
}

/// Pelvis origin, orthonormal axes, and hip-width scale used to normalize a
/// frame — kept so a body-frame point can be projected back to image space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameInfo {
    pub pelvis: (f32, f32),
    pub x_axis: (f32, f32),
    pub y_axis: (f32, f32),
    pub scale: f32,
}

impl FrameInfo {
    /// Projects a body-frame point back to image-space `(x, y)`.
    pub fn to_image(&self, body_x: f32, body_y: f32) -> (f32, f32) {
        let x = self.pelvis.0 + self.scale * (body_x * self.x_axis.0 + body_y * self.y_axis.0);
        let y = self.pelvis.1 + self.scale * (body_x * self.x_axis.1 + body_y * self.y_axis.1);
        (x, y)
    }
}

fn unit((x, y): (f32, f32)) -> (f32, f32) {
    let n = (x * x + y * y).sqrt();
    if n < 1e-6 {
        (1.0, 0.0)
    } else {
        (x / n, y / n)
    }
}

fn sub(a: (f32, f32), b: (f32, f32)) -> (f32, f32) {
    (a.0 - b.0, a.1 - b.1)
}

fn dot(a: (f32, f32), b: (f32, f32)) -> f32 {
    a.0 * b.0 + a.1 * b.1
}

fn norm(a: (f32, f32)) -> f32 {
    (a.0 * a.0 + a.1 * a.1).sqrt()
}

/// Projects a raw frame into the pelvis-centered, hip-width-scaled body
/// frame. See the body-frame normalizer design: pelvis at the hip midpoint,
/// x-axis along the hip line (right hip to left hip), y-axis orthogonal
/// toward the shoulders.
pub fn normalize_to_body_frame(frame: &RawFrame) -> Result<(NormalizedFrame, FrameInfo)> {
    let lhip = (frame.landmarks[LEFT_HIP].x, frame.landmarks[LEFT_HIP].y);
    let rhip = (frame.landmarks[RIGHT_HIP].x, frame.landmarks[RIGHT_HIP].y);
    let lsh = (
        frame.landmarks[LEFT_SHOULDER].x,
        frame.landmarks[LEFT_SHOULDER].y,
    );
    let rsh = (
        frame.landmarks[RIGHT_SHOULDER].x,
        frame.landmarks[RIGHT_SHOULDER].y,
    );

    let pelvis = ((lhip.0 + rhip.0) * 0.5, (lhip.1 + rhip.1) * 0.5);
    let hip_vec = sub(lhip, rhip);
    let hip_width_raw = norm(hip_vec);
    let hip_width = hip_width_raw.max(EPS);
    if !hip_width.is_finite() {
        return Err(CoachError::DegeneratePose {
            hip_width: hip_width_raw,
        });
    }
    let x_axis = unit(hip_vec);

    let shoulder_center = ((lsh.0 + rsh.0) * 0.5, (lsh.1 + rsh.1) * 0.5);
    let up_guess = sub(shoulder_center, pelvis);
    let proj = dot(up_guess, x_axis);
    let mut up_proj = (up_guess.0 - proj * x_axis.0, up_guess.1 - proj * x_axis.1);
    if norm(up_proj) < 1e-6 {
        up_proj = (-x_axis.1, x_axis.0);
    }
    let y_axis = unit(up_proj);

    let mut points = [BodyPoint::default(); LANDMARK_COUNT];
    for (i, lm) in frame.landmarks.iter().enumerate() {
        let rel = sub((lm.x, lm.y), pelvis);
        points[i] = BodyPoint {
            x: dot(rel, x_axis) / hip_width,
            y: dot(rel, y_axis) / hip_width,
            z: lm.z / hip_width,
        };
    }

    Ok((
        NormalizedFrame { points },
        FrameInfo {
            pelvis,
            x_axis,
            y_axis,
            scale: hip_width,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with(mut set: impl FnMut(&mut [Landmark; LANDMARK_COUNT])) -> RawFrame {
        let mut landmarks = [Landmark {
            x: 0.5,
            y: 0.5,
            z: 0.0,
            visibility: 1.0,
        }; LANDMARK_COUNT];
        set(&mut landmarks);
        RawFrame {
            landmarks,
            timestamp_ms: 0,
        }
    }

    fn standing_pose() -> RawFrame {
        frame_with(|lm| {
            lm[LEFT_HIP] = Landmark { x: 0.55, y: 0.5, z: 0.0, visibility: 1.0 };
            lm[RIGHT_HIP] = Landmark { x: 0.45, y: 0.5, z: 0.0, visibility: 1.0 };
            lm[LEFT_SHOULDER] = Landmark { x: 0.55, y: 0.2, z: 0.0, visibility: 1.0 };
            lm[RIGHT_SHOULDER] = Landmark { x: 0.45, y: 0.2, z: 0.0, visibility: 1.0 };
            lm[LEFT_KNEE] = Landmark { x: 0.55, y: 0.7, z: 0.0, visibility: 1.0 };
            lm[RIGHT_KNEE] = Landmark { x: 0.45, y: 0.7, z: 0.0, visibility: 1.0 };
            lm[LEFT_ANKLE] = Landmark { x: 0.55, y: 0.9, z: 0.0, visibility: 1.0 };
            lm[RIGHT_ANKLE] = Landmark { x: 0.45, y: 0.9, z: 0.0, visibility: 1.0 };
        })
    }

    #[test]
    fn pelvis_at_origin_and_hip_width_unit() {
        let frame = standing_pose();
        let (norm_frame, _info) = normalize_to_body_frame(&frame).unwrap();
        let l = norm_frame.get(LEFT_HIP);
        let r = norm_frame.get(RIGHT_HIP);
        let mid = ((l.x + r.x) * 0.5, (l.y + r.y) * 0.5);
        assert!(mid.0.abs() < 0.01 && mid.1.abs() < 0.01);
        let width = ((l.x - r.x).powi(2) + (l.y - r.y).powi(2)).sqrt();
        assert!((width - 1.0).abs() < 0.15);
    }

    #[test]
    fn shoulder_center_has_positive_y() {
        let frame = standing_pose();
        let (norm_frame, _info) = normalize_to_body_frame(&frame).unwrap();
        let l = norm_frame.get(LEFT_SHOULDER);
        let r = norm_frame.get(RIGHT_SHOULDER);
        assert!((l.y + r.y) * 0.5 > 0.0);
    }

    #[test]
    fn denormalize_round_trips() {
        let frame = standing_pose();
        let (norm_frame, info) = normalize_to_body_frame(&frame).unwrap();
        let p = norm_frame.get(LEFT_KNEE);
        let (x, y) = info.to_image(p.x, p.y);
        assert!((x - frame.landmarks[LEFT_KNEE].x).abs() < 1e-5);
        assert!((y - frame.landmarks[LEFT_KNEE].y).abs() < 1e-5);
    }

    #[test]
    fn degenerate_hips_reports_error() {
        let frame = frame_with(|lm| {
            lm[LEFT_HIP] = Landmark { x: 0.5, y: 0.5, z: 0.0, visibility: 1.0 };
            lm[RIGHT_HIP] = Landmark { x: 0.5, y: 0.5, z: 0.0, visibility: 1.0 };
        });
        // hip_width floors at EPS, so this does not error, but scale stays tiny.
        let (norm_frame, info) = normalize_to_body_frame(&frame).unwrap();
        assert!(info.scale >= EPS);
        assert!(norm_frame.get(LEFT_HIP).x.is_finite());
    }
}
