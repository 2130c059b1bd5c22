//! Incoming pose frame wire format (§6): JSON over the ingest WebSocket.

use coach_core::error::{CoachError, Result};
use coach_core::landmark::{Landmark, RawFrame, LANDMARK_COUNT};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct WireLandmark {
    x: f32,
    y: f32,
    #[serde(default)]
    z: f32,
    #[serde(default)]
    visibility: f32,
}

#[derive(Debug, Deserialize)]
pub struct WireFrame {
    #[serde(default)]
    pub device: String,
    pub timestamp: f64,
    pub exercise: String,
    landmarks: Vec<WireLandmark>,
}

impl WireFrame {
    pub fn into_raw_frame(self) -> Result<RawFrame> {
        if self.landmarks.len() != LANDMARK_COUNT {
            return Err(CoachError::InvalidFrame {
                got: self.landmarks.len(),
            });
        }
        let landmarks: Vec<Landmark> = self
            .landmarks
            .into_iter()
            .map(|lm| Landmark {
                x: lm.x,
                y: lm.y,
                z: lm.z,
                visibility: lm.visibility,
            })
            .collect();
        let timestamp_ms = (self.timestamp * 1000.0) as u64;
        RawFrame::from_landmarks(landmarks, timestamp_ms)
    }
}

pub fn parse_frame(json: &str) -> Result<(String, RawFrame)> {
    let wire: WireFrame = serde_json::from_str(json).map_err(CoachError::Json)?;
    let exercise = wire.exercise.clone();
    let frame = wire.into_raw_frame()?;
    Ok((exercise, frame))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(visibility: f32) -> String {
        let landmark = format!(r#"{{"x":0.5,"y":0.5,"z":0.0,"visibility":{visibility}}}"#);
        let landmarks = format!("[{}]", vec![landmark; LANDMARK_COUNT].join(","));
        format!(
            r#"{{"device":"webcam","timestamp":1.5,"exercise":"squat","landmarks":{landmarks}}}"#
        )
    }

    #[test]
    fn parses_valid_frame() {
        let (exercise, frame) = parse_frame(&sample(1.0)).unwrap();
        assert_eq!(exercise, "squat");
        assert_eq!(frame.timestamp_ms, 1500);
    }

    #[test]
    fn rejects_out_of_range_visibility() {
        assert!(parse_frame(&sample(1.5)).is_err());
    }
}
