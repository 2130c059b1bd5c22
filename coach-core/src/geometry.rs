//! Geometry kernel: joint angles, Euclidean distance, 2D Procrustes alignment.
//!
//! All kernels here operate on `f32` for I/O but use `f64` internally for
//! the Procrustes SVD, then cast back, per the numeric-portability design
//! note (keep the SVD accurate, keep the rest of the pipeline in the unit
//! the model was trained in).

use nalgebra::{Matrix2, Vector2};

use crate::landmark::{BodyPoint, LEFT_ANKLE, LEFT_HIP, LEFT_KNEE, RIGHT_ANKLE, RIGHT_HIP, RIGHT_KNEE};
use crate::landmark::NormalizedFrame;

const EPS: f32 = 1e-6;

/// Angle `∠ABC` in degrees. Returns 180° (a straight joint) if either arm is
/// shorter than `EPS`, since direction is undefined at that point.
pub fn angle_2d(a: (f32, f32), b: (f32, f32), c: (f32, f32)) -> f32 {
    let u = (a.0 - b.0, a.1 - b.1);
    let v = (c.0 - b.0, c.1 - b.1);
    let un = (u.0 * u.0 + u.1 * u.1).sqrt();
    let vn = (v.0 * v.0 + v.1 * v.1).sqrt();
    if un < EPS || vn < EPS {
        return 180.0;
    }
    let cos = (u.0 * v.0 + u.1 * v.1) / (un * vn);
    cos.clamp(-1.0, 1.0).acos().to_degrees()
}

/// Left, right, and mean knee angle (hip-knee-ankle) for a normalized frame.
pub fn knee_angles(frame: &NormalizedFrame) -> (f32, f32, f32) {
    let left = angle_2d(
        frame.get(LEFT_HIP).xy(),
        frame.get(LEFT_KNEE).xy(),
        frame.get(LEFT_ANKLE).xy(),
    );
    let right = angle_2d(
        frame.get(RIGHT_HIP).xy(),
        frame.get(RIGHT_KNEE).xy(),
        frame.get(RIGHT_ANKLE).xy(),
    );
    (left, right, (left + right) * 0.5)
}

/// Euclidean distance between two body points, ignoring `z`.
pub fn euclidean_xy(a: BodyPoint, b: BodyPoint) -> f32 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    (dx * dx + dy * dy).sqrt()
}

/// Result of a 2D Procrustes alignment: the aligned reference points, plus
/// the recovered rotation matrix, scale, and translation.
#[derive(Debug, Clone)]
pub struct Procrustes {
    pub aligned: Vec<(f32, f32)>,
    pub rotation: Matrix2<f64>,
    pub scale: f64,
    pub translation: Vector2<f64>,
}

impl Procrustes {
    /// Rotation angle in degrees, `atan2` of the rotation matrix.
    pub fn rotation_deg(&self) -> f64 {
        self.rotation[(1, 0)].atan2(self.rotation[(0, 0)]).to_degrees()
    }

    /// Applies the fitted similarity transform `scale * (rotation * p) +
    /// translation` to an arbitrary reference-frame point, not just one of
    /// the points the fit was computed from. The fit itself only ever sees
    /// the alignment-landmark subset; this is how any other reference
    /// landmark gets carried into the user's frame.
    pub fn transform(&self, point: (f32, f32)) -> (f32, f32) {
        let p = Vector2::new(point.0 as f64, point.1 as f64);
        let out = self.scale * (self.rotation * p) + self.translation;
        (out.x as f32, out.y as f32)
    }
}

fn centroid(points: &[(f32, f32)]) -> Vector2<f64> {
    let n = points.len().max(1) as f64;
    let sum = points
        .iter()
        .fold(Vector2::new(0.0, 0.0), |acc, &(x, y)| acc + Vector2::new(x as f64, y as f64));
    sum / n
}

/// Similarity transform (rotation + uniform scale + translation, reflection
/// disallowed by default) minimizing squared distance between `ref_pts`
/// mapped onto `user_pts`. Both slices must be the same length and order.
pub fn procrustes_2d(user_pts: &[(f32, f32)], ref_pts: &[(f32, f32)], allow_reflection: bool) -> Procrustes {
    assert_eq!(user_pts.len(), ref_pts.len());
    let n = user_pts.len();

    let user_mean = centroid(user_pts);
    let ref_mean = centroid(ref_pts);

    let user_c: Vec<Vector2<f64>> = user_pts
        .iter()
        .map(|&(x, y)| Vector2::new(x as f64, y as f64) - user_mean)
        .collect();
    let ref_c: Vec<Vector2<f64>> = ref_pts
        .iter()
        .map(|&(x, y)| Vector2::new(x as f64, y as f64) - ref_mean)
        .collect();

    let user_norm: f64 = user_c.iter().map(|v| v.norm_squared()).sum::<f64>().sqrt();
    let ref_norm: f64 = ref_c.iter().map(|v| v.norm_squared()).sum::<f64>().sqrt();

    if user_norm < 1e-9 || ref_norm < 1e-9 {
        let aligned = ref_pts.to_vec();
        return Procrustes {
            aligned,
            rotation: Matrix2::identity(),
            scale: 1.0,
            translation: Vector2::new(0.0, 0.0),
        };
    }

    let scale = user_norm / ref_norm;

    // Cross-covariance M = user_cᵀ · ref_c, accumulated over all points.
    let mut m = Matrix2::<f64>::zeros();
    for i in 0..n {
        m += user_c[i] * ref_c[i].transpose();
    }

    let svd = m.svd(true, true);
    let u = svd.u.unwrap();
    let v_t = svd.v_t.unwrap();
    let d = (u * v_t).determinant();

    let rotation = if allow_reflection {
        u * v_t
    } else {
        let correction = Matrix2::new(1.0, 0.0, 0.0, if d < 0.0 { -1.0 } else { 1.0 });
        u * correction * v_t
    };

    let translation = user_mean - scale * rotation * ref_mean;

    let aligned = ref_c
        .iter()
        .map(|c| {
            let p = scale * (rotation * c) + user_mean;
            (p.x as f32, p.y as f32)
        })
        .collect();

    Procrustes {
        aligned,
        rotation,
        scale,
        translation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn self_procrustes_is_identity() {
        let pts = vec![(0.0, 0.0), (1.0, 0.2), (0.3, 1.5), (-0.4, 0.7)];
        let result = procrustes_2d(&pts, &pts, false);
        for (a, b) in result.aligned.iter().zip(pts.iter()) {
            assert_relative_eq!(a.0, b.0, epsilon = 1e-4);
            assert_relative_eq!(a.1, b.1, epsilon = 1e-4);
        }
        assert_relative_eq!(result.scale, 1.0, epsilon = 1e-4);
        assert_relative_eq!(result.rotation[(0, 0)], 1.0, epsilon = 1e-4);
        assert_relative_eq!(result.rotation[(1, 1)], 1.0, epsilon = 1e-4);
    }

    #[test]
    fn pure_rotation_is_recovered() {
        let x = vec![(1.0, 0.0), (0.0, 1.0), (-1.0, 0.2), (0.3, -0.8)];
        let theta = 0.3_f64;
        let (c, s) = (theta.cos(), theta.sin());
        let y: Vec<(f32, f32)> = x
            .iter()
            .map(|&(px, py)| {
                let px = px as f64;
                let py = py as f64;
                ((c * px - s * py) as f32, (s * px + c * py) as f32)
            })
            .collect();

        let result = procrustes_2d(&x, &y, false);
        let mut residual = 0.0_f32;
        for (a, b) in result.aligned.iter().zip(x.iter()) {
            residual += ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt();
        }
        assert!(residual / x.len() as f32 < 1e-2);
    }

    #[test]
    fn angle_straight_leg_is_near_180() {
        let a = angle_2d((0.0, -1.0), (0.0, 0.0), (0.0, 1.0));
        assert_relative_eq!(a, 180.0, epsilon = 1e-3);
    }

    #[test]
    fn angle_right_angle_is_90() {
        let a = angle_2d((1.0, 0.0), (0.0, 0.0), (0.0, 1.0));
        assert_relative_eq!(a, 90.0, epsilon = 1e-3);
    }
}
