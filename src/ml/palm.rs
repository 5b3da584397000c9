//! Palm detection output decoding.
//!
//! The palm detector is a single-shot multibox detector with 2016 fixed anchors on a 192x192
//! input. Each anchor regresses a box and 7 palm keypoints; scores are logits.

/// Input resolution of the palm detection network.
pub const PALM_INPUT_SIZE: u32 = 192;

/// Values regressed per anchor: box (4) + 7 keypoints (14).
pub const VALUES_PER_ANCHOR: usize = 18;

const IOU_THRESH: f32 = 0.3;

/// Keypoint indices within a palm detection.
pub const KEYPOINT_WRIST: usize = 0;
pub const KEYPOINT_MIDDLE_MCP: usize = 2;

/// Anchor center, normalized to the network input.
#[derive(Debug, Clone, Copy)]
pub struct Anchor {
    pub x_center: f32,
    pub y_center: f32,
}

/// Computes the anchors: a 24x24 grid with 2 anchors per cell (stride 8) followed by a 12x12
/// grid with 6 anchors per cell (three merged stride-16 layers).
pub fn anchors() -> Vec<Anchor> {
    let mut anchors = Vec::with_capacity(2016);
    for (grid, per_cell) in [(24u32, 2usize), (12, 6)] {
        for y in 0..grid {
            for x in 0..grid {
                let anchor = Anchor {
                    x_center: (x as f32 + 0.5) / grid as f32,
                    y_center: (y as f32 + 0.5) / grid as f32,
                };
                anchors.extend(std::iter::repeat(anchor).take(per_cell));
            }
        }
    }
    anchors
}

/// A decoded palm, normalized to the network input square.
#[derive(Debug, Clone, PartialEq)]
pub struct PalmDetection {
    pub score: f32,
    pub x_center: f32,
    pub y_center: f32,
    pub width: f32,
    pub height: f32,
    pub keypoints: [(f32, f32); 7],
}

impl PalmDetection {
    fn iou(&self, other: &PalmDetection) -> f32 {
        let (ax0, ay0, ax1, ay1) = self.corners();
        let (bx0, by0, bx1, by1) = other.corners();
        let iw = (ax1.min(bx1) - ax0.max(bx0)).max(0.0);
        let ih = (ay1.min(by1) - ay0.max(by0)).max(0.0);
        let inter = iw * ih;
        let union = self.width * self.height + other.width * other.height - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    fn corners(&self) -> (f32, f32, f32, f32) {
        (
            self.x_center - self.width / 2.0,
            self.y_center - self.height / 2.0,
            self.x_center + self.width / 2.0,
            self.y_center + self.height / 2.0,
        )
    }
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x.clamp(-100.0, 100.0)).exp())
}

/// Decodes raw network outputs into detections scoring at least `min_score`.
pub fn decode(
    boxes: &[f32],
    scores: &[f32],
    anchors: &[Anchor],
    min_score: f32,
) -> Vec<PalmDetection> {
    let scale = PALM_INPUT_SIZE as f32;
    let mut out = Vec::new();

    for (i, anchor) in anchors.iter().enumerate() {
        let Some(&logit) = scores.get(i) else { break };
        let score = sigmoid(logit);
        if score < min_score {
            continue;
        }
        let Some(raw) = boxes.get(i * VALUES_PER_ANCHOR..(i + 1) * VALUES_PER_ANCHOR) else {
            break;
        };

        let mut keypoints = [(0.0, 0.0); 7];
        for (k, kp) in keypoints.iter_mut().enumerate() {
            *kp = (
                raw[4 + 2 * k] / scale + anchor.x_center,
                raw[5 + 2 * k] / scale + anchor.y_center,
            );
        }

        out.push(PalmDetection {
            score,
            x_center: raw[0] / scale + anchor.x_center,
            y_center: raw[1] / scale + anchor.y_center,
            width: raw[2] / scale,
            height: raw[3] / scale,
            keypoints,
        });
    }

    out
}

/// Weighted non-maximum suppression: overlapping detections are merged into a score-weighted
/// average seeded by the most confident one. Output is sorted by descending score.
pub fn weighted_nms(mut detections: Vec<PalmDetection>) -> Vec<PalmDetection> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut out = Vec::new();

    while !detections.is_empty() {
        let seed = detections[0].clone();
        let (overlapping, rest): (Vec<_>, Vec<_>) = detections
            .into_iter()
            .partition(|d| d.iou(&seed) > IOU_THRESH);
        detections = rest;

        let total: f32 = overlapping.iter().map(|d| d.score).sum();
        if total <= 0.0 {
            out.push(seed);
            continue;
        }
        let mut merged = seed.clone();
        merged.x_center = 0.0;
        merged.y_center = 0.0;
        merged.width = 0.0;
        merged.height = 0.0;
        merged.keypoints = [(0.0, 0.0); 7];
        for d in &overlapping {
            let w = d.score / total;
            merged.x_center += d.x_center * w;
            merged.y_center += d.y_center * w;
            merged.width += d.width * w;
            merged.height += d.height * w;
            for (m, k) in merged.keypoints.iter_mut().zip(d.keypoints.iter()) {
                m.0 += k.0 * w;
                m.1 += k.1 * w;
            }
        }
        out.push(merged);
    }

    out
}
