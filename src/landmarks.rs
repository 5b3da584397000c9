//! Hand landmark geometry.

/// Number of landmarks the hand-pose detector produces per hand.
pub const LANDMARK_COUNT: usize = 21;

/// A single 2D hand landmark in normalized image coordinates (`0.0..=1.0`).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Names for the hand landmarks, in detector output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkIdx {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexFingerMcp,
    IndexFingerPip,
    IndexFingerDip,
    IndexFingerTip,
    MiddleFingerMcp,
    MiddleFingerPip,
    MiddleFingerDip,
    MiddleFingerTip,
    RingFingerMcp,
    RingFingerPip,
    RingFingerDip,
    RingFingerTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

/// Bones of the hand skeleton, as pairs of landmark indices.
pub const HAND_CONNECTIONS: &[(LandmarkIdx, LandmarkIdx)] = {
    use LandmarkIdx::*;
    &[
        (Wrist, ThumbCmc),
        (ThumbCmc, ThumbMcp),
        (ThumbMcp, ThumbIp),
        (ThumbIp, ThumbTip),
        (Wrist, IndexFingerMcp),
        (IndexFingerMcp, IndexFingerPip),
        (IndexFingerPip, IndexFingerDip),
        (IndexFingerDip, IndexFingerTip),
        (IndexFingerMcp, MiddleFingerMcp),
        (MiddleFingerMcp, MiddleFingerPip),
        (MiddleFingerPip, MiddleFingerDip),
        (MiddleFingerDip, MiddleFingerTip),
        (MiddleFingerMcp, RingFingerMcp),
        (RingFingerMcp, RingFingerPip),
        (RingFingerPip, RingFingerDip),
        (RingFingerDip, RingFingerTip),
        (RingFingerMcp, PinkyMcp),
        (Wrist, PinkyMcp),
        (PinkyMcp, PinkyPip),
        (PinkyPip, PinkyDip),
        (PinkyDip, PinkyTip),
    ]
};

/// Axis-aligned bounds of a landmark set, in normalized coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

/// The landmarks of one detected hand.
///
/// Produced fresh for every processed image or frame. The detector always yields
/// [`LANDMARK_COUNT`] points, but the set itself does not enforce that; the feature encoder
/// rejects sets of any other size.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LandmarkSet {
    points: Vec<Landmark>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Landmark>) -> Self {
        Self { points }
    }

    pub fn from_xy(coords: &[(f32, f32)]) -> Self {
        Self::new(coords.iter().map(|&(x, y)| Landmark::new(x, y)).collect())
    }

    pub fn points(&self) -> &[Landmark] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, idx: LandmarkIdx) -> Option<Landmark> {
        self.points.get(idx as usize).copied()
    }

    /// Computes the bounding box of all points, or `None` for an empty set.
    pub fn bounds(&self) -> Option<Bounds> {
        let first = self.points.first()?;
        let init = Bounds {
            x_min: first.x,
            y_min: first.y,
            x_max: first.x,
            y_max: first.y,
        };

        Some(self.points.iter().fold(init, |b, p| Bounds {
            x_min: b.x_min.min(p.x),
            y_min: b.y_min.min(p.y),
            x_max: b.x_max.max(p.x),
            y_max: b.y_max.max(p.y),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds() {
        let set = LandmarkSet::from_xy(&[(0.5, 0.2), (0.1, 0.9), (0.3, 0.4)]);
        let b = set.bounds().unwrap();
        assert_eq!(b.x_min, 0.1);
        assert_eq!(b.y_min, 0.2);
        assert_eq!(b.x_max, 0.5);
        assert_eq!(b.y_max, 0.9);
        assert!(LandmarkSet::default().bounds().is_none());
    }

    #[test]
    fn test_connections_reference_valid_landmarks() {
        assert_eq!(HAND_CONNECTIONS.len(), 21);
        for (a, b) in HAND_CONNECTIONS {
            assert!((*a as usize) < LANDMARK_COUNT);
            assert!((*b as usize) < LANDMARK_COUNT);
        }
    }
}
