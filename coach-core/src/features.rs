//! Feature extraction and standardization.

use crate::landmark::NormalizedFrame;

/// Flattens the selected landmarks' `(x_body, y_body, z_scaled)` into a
/// single feature vector, in row-major order over `indices`.
pub fn feature_vector(frame: &NormalizedFrame, indices: &[usize]) -> Vec<f32> {
    let mut out = Vec::with_capacity(indices.len() * 3);
    for &idx in indices {
        let p = frame.get(idx);
        out.push(p.x);
        out.push(p.y);
        out.push(p.z);
    }
    out
}

/// Standardizes a feature vector in place: `(features - mean) / std`.
pub fn standardize(features: &[f32], mean: &[f32], std: &[f32]) -> Vec<f32> {
    debug_assert_eq!(features.len(), mean.len());
    debug_assert_eq!(features.len(), std.len());
    features
        .iter()
        .zip(mean.iter())
        .zip(std.iter())
        .map(|((&f, &m), &s)| (f - m) / s)
        .collect()
}

/// Squared Euclidean distance between two equal-length vectors.
pub fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(&x, &y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmark::{BodyPoint, LANDMARK_COUNT};

    fn frame_of(value: f32) -> NormalizedFrame {
        NormalizedFrame {
            points: [BodyPoint { x: value, y: value, z: value }; LANDMARK_COUNT],
        }
    }

    #[test]
    fn feature_vector_flattens_selected_landmarks() {
        let frame = frame_of(1.0);
        let v = feature_vector(&frame, &[0, 5]);
        assert_eq!(v.len(), 6);
        assert!(v.iter().all(|&x| x == 1.0));
    }

    #[test]
    fn standardize_recovers_zero_for_mean_input() {
        let mean = vec![1.0, 2.0, 3.0];
        let std = vec![1.0, 1.0, 1.0];
        let scaled = standardize(&mean, &mean, &std);
        assert!(scaled.iter().all(|&x| x.abs() < 1e-6));
    }
}
