//! Landmark to feature conversion.
//!
//! The classifier was trained on exactly this transform; changing it without
//! retraining the model silently breaks predictions.

use crate::types::{FEATURE_LEN, FeatureVector, LandmarkSet, NUM_LANDMARKS};

/// Divisor floor for hands whose points all sit on the wrist.
pub const MIN_HAND_SIZE: f32 = 1e-6;

/// Wrist-relative, scale-invariant flattening of a hand.
pub fn normalize(hand: &LandmarkSet) -> FeatureVector {
    let wrist = hand.wrist();

    let mut out = [0.0f32; FEATURE_LEN];
    for (i, lm) in hand.iter().enumerate() {
        out[i * 3] = lm.x - wrist.x;
        out[i * 3 + 1] = lm.y - wrist.y;
        out[i * 3 + 2] = lm.z - wrist.z;
    }

    let hand_size = out
        .chunks_exact(3)
        .take(NUM_LANDMARKS)
        .map(|p| (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt())
        .fold(0.0f32, f32::max)
        .max(MIN_HAND_SIZE);

    for v in out.iter_mut() {
        *v /= hand_size;
    }

    FeatureVector::from_raw(out)
}
