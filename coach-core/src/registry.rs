//! Static exercise registry: the single source of truth for which landmarks
//! participate in feature matching and which generate corrections.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::error::{CoachError, Result};
use crate::landmark::{
    LEFT_ANKLE, LEFT_ELBOW, LEFT_FOOT_INDEX, LEFT_HIP, LEFT_KNEE, LEFT_SHOULDER, LEFT_WRIST,
    RIGHT_ANKLE, RIGHT_ELBOW, RIGHT_FOOT_INDEX, RIGHT_HIP, RIGHT_KNEE, RIGHT_SHOULDER, RIGHT_WRIST,
};

/// Landmarks used by every exercise's matching feature — shoulders, hips,
/// knees, ankles, feet.
pub const FEATURE_LANDMARKS: [usize; 10] = [
    LEFT_SHOULDER,
    RIGHT_SHOULDER,
    LEFT_HIP,
    RIGHT_HIP,
    LEFT_KNEE,
    RIGHT_KNEE,
    LEFT_ANKLE,
    RIGHT_ANKLE,
    LEFT_FOOT_INDEX,
    RIGHT_FOOT_INDEX,
];

/// Landmarks used for the shared Procrustes alignment step (§4.F): the
/// subset with enough spread to constrain a similarity transform robustly.
pub const ALIGNMENT_LANDMARKS: [usize; 8] = [
    LEFT_SHOULDER,
    RIGHT_SHOULDER,
    LEFT_HIP,
    RIGHT_HIP,
    LEFT_KNEE,
    RIGHT_KNEE,
    LEFT_ANKLE,
    RIGHT_ANKLE,
];

/// Known exercise key, stable across model artifacts and the wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExerciseKey {
    ArmAbduction,
    ArmVw,
    LegAbduction,
    Squat,
}

impl ExerciseKey {
    pub fn as_str(self) -> &'static str {
        match self {
            ExerciseKey::ArmAbduction => "arm_abduction",
            ExerciseKey::ArmVw => "arm_vw",
            ExerciseKey::LegAbduction => "leg_abduction",
            ExerciseKey::Squat => "squat",
        }
    }
}

impl std::fmt::Display for ExerciseKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Static metadata for one exercise: display name and correction landmarks.
#[derive(Debug, Clone)]
pub struct ExerciseSpec {
    pub key: ExerciseKey,
    pub code: &'static str,
    pub display_name: &'static str,
    pub correction_landmarks: &'static [usize],
}

static ARM_ABDUCTION_CORRECTIONS: [usize; 6] = [
    LEFT_SHOULDER, RIGHT_SHOULDER, LEFT_ELBOW, RIGHT_ELBOW, LEFT_WRIST, RIGHT_WRIST,
];
static ARM_VW_CORRECTIONS: [usize; 6] = [
    LEFT_SHOULDER, RIGHT_SHOULDER, LEFT_ELBOW, RIGHT_ELBOW, LEFT_WRIST, RIGHT_WRIST,
];
static LEG_ABDUCTION_CORRECTIONS: [usize; 8] = [
    LEFT_HIP, RIGHT_HIP, LEFT_KNEE, RIGHT_KNEE, LEFT_ANKLE, RIGHT_ANKLE, LEFT_FOOT_INDEX, RIGHT_FOOT_INDEX,
];
static SQUAT_CORRECTIONS: [usize; 6] = [
    LEFT_KNEE, RIGHT_KNEE, LEFT_ANKLE, RIGHT_ANKLE, LEFT_FOOT_INDEX, RIGHT_FOOT_INDEX,
];

static SPECS: Lazy<HashMap<ExerciseKey, ExerciseSpec>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert(
        ExerciseKey::ArmAbduction,
        ExerciseSpec {
            key: ExerciseKey::ArmAbduction,
            code: "ex1",
            display_name: "Arm Abduction",
            correction_landmarks: &ARM_ABDUCTION_CORRECTIONS,
        },
    );
    m.insert(
        ExerciseKey::ArmVw,
        ExerciseSpec {
            key: ExerciseKey::ArmVw,
            code: "ex2",
            display_name: "Arm VW",
            correction_landmarks: &ARM_VW_CORRECTIONS,
        },
    );
    m.insert(
        ExerciseKey::LegAbduction,
        ExerciseSpec {
            key: ExerciseKey::LegAbduction,
            code: "ex4",
            display_name: "Leg Abduction",
            correction_landmarks: &LEG_ABDUCTION_CORRECTIONS,
        },
    );
    m.insert(
        ExerciseKey::Squat,
        ExerciseSpec {
            key: ExerciseKey::Squat,
            code: "ex6",
            display_name: "Squat",
            correction_landmarks: &SQUAT_CORRECTIONS,
        },
    );
    m
});

/// Resolves a canonical key, short code (`ex1`), or case/separator-insensitive
/// alias to its `ExerciseSpec`.
pub fn resolve(name: &str) -> Result<&'static ExerciseSpec> {
    let normalized = name.trim().to_lowercase().replace('-', "_").replace(' ', "_");
    let key = match normalized.as_str() {
        "arm_abduction" | "ex1" => ExerciseKey::ArmAbduction,
        "arm_vw" | "ex2" => ExerciseKey::ArmVw,
        "leg_abduction" | "ex4" => ExerciseKey::LegAbduction,
        "squat" | "ex6" => ExerciseKey::Squat,
        _ => return Err(CoachError::UnknownExercise(name.to_string())),
    };
    Ok(&SPECS[&key])
}

pub fn spec_for(key: ExerciseKey) -> &'static ExerciseSpec {
    &SPECS[&key]
}

pub fn all_keys() -> Vec<ExerciseKey> {
    vec![
        ExerciseKey::ArmAbduction,
        ExerciseKey::ArmVw,
        ExerciseKey::LegAbduction,
        ExerciseKey::Squat,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_canonical_and_aliases() {
        assert_eq!(resolve("squat").unwrap().key, ExerciseKey::Squat);
        assert_eq!(resolve("ex6").unwrap().key, ExerciseKey::Squat);
        assert_eq!(resolve("Leg-Abduction").unwrap().key, ExerciseKey::LegAbduction);
        assert_eq!(resolve("EX4").unwrap().key, ExerciseKey::LegAbduction);
    }

    #[test]
    fn unknown_exercise_errors() {
        assert!(resolve("jumping_jack").is_err());
    }
}
