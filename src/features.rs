//! Feature encoding.
//!
//! A landmark set is turned into a flat vector of `(x - x_min, y - y_min)` pairs, where
//! `x_min`/`y_min` are the minimum coordinates over the whole set. This makes the feature
//! independent of where the hand sits in the frame, but NOT of its scale or rotation: the same
//! sign made closer to the camera, or with a tilted hand, produces a different vector.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::landmarks::{LandmarkSet, LANDMARK_COUNT};

/// Number of scalars in a feature vector (21 landmarks, x and y each).
pub const FEATURE_LEN: usize = LANDMARK_COUNT * 2;

/// A normalized, fixed-length hand feature vector.
///
/// Layout is `[x0, y0, x1, y1, ..., x20, y20]`, relative to the set's minimum corner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    /// Wraps raw values, rejecting anything that is not exactly [`FEATURE_LEN`] long.
    pub fn from_values(values: Vec<f32>) -> Result<Self> {
        if values.len() != FEATURE_LEN {
            return Err(Error::InvalidFeatureLength {
                expected: FEATURE_LEN,
                actual: values.len(),
            });
        }
        Ok(Self(values))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

impl TryFrom<Vec<f32>> for FeatureVector {
    type Error = Error;

    fn try_from(values: Vec<f32>) -> Result<Self> {
        Self::from_values(values)
    }
}

impl From<FeatureVector> for Vec<f32> {
    fn from(v: FeatureVector) -> Self {
        v.0
    }
}

/// Encodes one hand's landmarks into a translation-invariant feature vector.
///
/// Fails with [`Error::InvalidLandmarkSet`] if the set does not hold exactly
/// [`LANDMARK_COUNT`] points; callers discard such hands.
pub fn encode(landmarks: &LandmarkSet) -> Result<FeatureVector> {
    if landmarks.len() != LANDMARK_COUNT {
        return Err(Error::InvalidLandmarkSet(landmarks.len()));
    }
    let bounds = landmarks.bounds().ok_or(Error::InvalidLandmarkSet(0))?;

    let mut values = Vec::with_capacity(FEATURE_LEN);
    for lm in landmarks.points() {
        values.push(lm.x - bounds.x_min);
        values.push(lm.y - bounds.y_min);
    }

    FeatureVector::from_values(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::Landmark;

    fn hand(offset_x: f32, offset_y: f32) -> LandmarkSet {
        LandmarkSet::new(
            (0..LANDMARK_COUNT)
                .map(|i| {
                    let t = i as f32 / LANDMARK_COUNT as f32;
                    Landmark::new(offset_x + 0.2 * t, offset_y + 0.3 * (1.0 - t) * t)
                })
                .collect(),
        )
    }

    #[test]
    fn test_encode_length_and_minimum() {
        for (ox, oy) in [(0.0, 0.0), (0.25, 0.6), (0.7, 0.1)] {
            let features = encode(&hand(ox, oy)).unwrap();
            let values = features.as_slice();
            assert_eq!(values.len(), FEATURE_LEN);

            let min_x = values.iter().step_by(2).copied().fold(f32::INFINITY, f32::min);
            let min_y = values.iter().skip(1).step_by(2).copied().fold(f32::INFINITY, f32::min);
            assert_eq!(min_x, 0.0);
            assert_eq!(min_y, 0.0);
        }
    }

    #[test]
    fn test_encode_is_translation_invariant() {
        let a = encode(&hand(0.1, 0.1)).unwrap();
        let b = encode(&hand(0.5, 0.4)).unwrap();
        for (x, y) in a.as_slice().iter().zip(b.as_slice()) {
            assert!((x - y).abs() < 1e-5);
        }
    }

    #[test]
    fn test_encode_rejects_wrong_landmark_count() {
        for len in [0, 1, 20, 22, 42] {
            let set = LandmarkSet::new(vec![Landmark::new(0.5, 0.5); len]);
            match encode(&set) {
                Err(Error::InvalidLandmarkSet(n)) => assert_eq!(n, len),
                other => panic!("expected InvalidLandmarkSet, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_feature_vector_length_is_enforced() {
        assert!(FeatureVector::from_values(vec![0.0; FEATURE_LEN]).is_ok());
        assert!(matches!(
            FeatureVector::from_values(vec![0.0; 41]),
            Err(Error::InvalidFeatureLength { expected: 42, actual: 41 })
        ));
        let parsed: std::result::Result<FeatureVector, _> = serde_json::from_str("[0.0, 1.0]");
        assert!(parsed.is_err());
    }
}
