//! Reference corpus payload parsing (trainer input, §6).

use serde::Deserialize;

use crate::error::{CoachError, Result};
use crate::landmark::{Landmark, RawFrame, LANDMARK_COUNT};

#[derive(Debug, Deserialize)]
struct WireLandmark {
    x: f32,
    y: f32,
    #[serde(default)]
    z: f32,
    #[serde(default = "default_visibility")]
    visibility: f32,
}

fn default_visibility() -> f32 {
    1.0
}

#[derive(Debug, Deserialize)]
struct WireCorpusFrame {
    #[serde(default)]
    timestamp: f64,
    landmarks: Vec<WireLandmark>,
}

#[derive(Debug, Deserialize)]
struct WireCorpus {
    exercise: String,
    #[serde(default)]
    landmark_names: Vec<String>,
    #[serde(default)]
    fps: Option<f32>,
    frames: Vec<WireCorpusFrame>,
}

/// A parsed reference corpus: validated frames plus the exercise key the
/// filename/payload declared.
pub struct ReferenceCorpus {
    pub exercise: String,
    pub frames: Vec<RawFrame>,
    pub landmark_names: Vec<String>,
    pub fps: Option<f32>,
}

/// Parses and validates a reference corpus JSON document (§6 "Reference
/// corpus payload"). Required keys: `exercise`, `landmark_names`, `frames`;
/// `frames` nonempty; each frame has exactly 33 landmarks.
pub fn parse_corpus(json: &str) -> Result<ReferenceCorpus> {
    let wire: WireCorpus = serde_json::from_str(json)?;
    if wire.frames.is_empty() {
        return Err(CoachError::InsufficientReferenceFrames { got: 0, min: 1 });
    }

    let mut frames = Vec::with_capacity(wire.frames.len());
    for (i, f) in wire.frames.iter().enumerate() {
        if f.landmarks.len() != LANDMARK_COUNT {
            return Err(CoachError::InvalidFrame {
                got: f.landmarks.len(),
            });
        }
        let landmarks: Vec<Landmark> = f
            .landmarks
            .iter()
            .map(|lm| Landmark {
                x: lm.x,
                y: lm.y,
                z: lm.z,
                visibility: lm.visibility,
            })
            .collect();
        let timestamp_ms = (f.timestamp * 1000.0) as u64;
        frames.push(RawFrame::from_landmarks(landmarks, timestamp_ms).map_err(|e| {
            tracing::warn!(frame_index = i, error = %e, "skipping malformed reference frame");
            e
        })?);
    }

    Ok(ReferenceCorpus {
        exercise: wire.exercise,
        frames,
        landmark_names: wire.landmark_names,
        fps: wire.fps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json(n: usize) -> String {
        let landmark = r#"{"x":0.5,"y":0.5,"z":0.0,"visibility":1.0}"#;
        let landmarks = format!("[{}]", vec![landmark; LANDMARK_COUNT].join(","));
        let frames: Vec<String> = (0..n)
            .map(|i| format!(r#"{{"frame":{i},"timestamp":{:.3},"landmarks":{landmarks}}}"#, i as f32 / 15.0))
            .collect();
        format!(
            r#"{{"exercise":"squat","landmark_names":[],"fps":15.0,"frames":[{}]}}"#,
            frames.join(",")
        )
    }

    #[test]
    fn parses_valid_corpus() {
        let corpus = parse_corpus(&sample_json(12)).unwrap();
        assert_eq!(corpus.exercise, "squat");
        assert_eq!(corpus.frames.len(), 12);
    }

    #[test]
    fn rejects_empty_frames() {
        let json = r#"{"exercise":"squat","landmark_names":[],"frames":[]}"#;
        assert!(parse_corpus(json).is_err());
    }

    #[test]
    fn rejects_wrong_landmark_count() {
        let json = r#"{"exercise":"squat","landmark_names":[],"frames":[{"frame":0,"timestamp":0.0,"landmarks":[{"x":0.5,"y":0.5}]}]}"#;
        assert!(parse_corpus(json).is_err());
    }
}
