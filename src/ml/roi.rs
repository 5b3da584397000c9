//! Rotated square regions of interest and the crops fed to the networks.

use std::f32::consts::PI;

use image::RgbImage;

use crate::landmarks::{Landmark, LandmarkIdx, LandmarkSet};

/// A rotated square in pixel coordinates of the source image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Roi {
    pub center_x: f32,
    pub center_y: f32,
    /// Side length in pixels.
    pub size: f32,
    /// Clockwise rotation in radians.
    pub rotation: f32,
}

impl Roi {
    /// The whole image, letterboxed into a square.
    pub fn full_image(width: u32, height: u32) -> Self {
        Self {
            center_x: width as f32 / 2.0,
            center_y: height as f32 / 2.0,
            size: width.max(height) as f32,
            rotation: 0.0,
        }
    }

    /// Maps a point given in ROI-relative units (`0.0..=1.0` across the square) to source pixels.
    pub fn to_image(&self, u: f32, v: f32) -> (f32, f32) {
        let (sin, cos) = self.rotation.sin_cos();
        let du = (u - 0.5) * self.size;
        let dv = (v - 0.5) * self.size;
        (
            self.center_x + du * cos - dv * sin,
            self.center_y + du * sin + dv * cos,
        )
    }

    /// Builds a hand ROI from a rotated box: shift along the hand axis, scale, make square.
    fn from_box(
        center_x: f32,
        center_y: f32,
        width: f32,
        height: f32,
        rotation: f32,
        shift_y: f32,
        scale: f32,
    ) -> Self {
        let (sin, cos) = rotation.sin_cos();
        Self {
            center_x: center_x - height * shift_y * sin,
            center_y: center_y + height * shift_y * cos,
            size: width.max(height) * scale,
            rotation,
        }
    }

    /// ROI covering a whole hand, given a palm box and the wrist and middle-finger keypoints
    /// (all in pixels).
    pub fn from_palm(
        center_x: f32,
        center_y: f32,
        width: f32,
        height: f32,
        wrist: (f32, f32),
        middle_mcp: (f32, f32),
    ) -> Self {
        let rotation = hand_rotation(wrist, middle_mcp);
        Self::from_box(center_x, center_y, width, height, rotation, -0.5, 2.6)
    }

    /// ROI for the next frame while tracking, derived from this frame's landmarks.
    pub fn from_landmarks(
        landmarks: &LandmarkSet,
        image_width: u32,
        image_height: u32,
    ) -> Option<Self> {
        let (w, h) = (image_width as f32, image_height as f32);
        let px = |lm: Landmark| (lm.x * w, lm.y * h);

        let wrist = px(landmarks.get(LandmarkIdx::Wrist)?);
        let index = px(landmarks.get(LandmarkIdx::IndexFingerMcp)?);
        let middle = px(landmarks.get(LandmarkIdx::MiddleFingerMcp)?);
        let ring = px(landmarks.get(LandmarkIdx::RingFingerMcp)?);
        let target = (
            ((index.0 + ring.0) / 2.0 + middle.0) / 2.0,
            ((index.1 + ring.1) / 2.0 + middle.1) / 2.0,
        );
        let rotation = hand_rotation(wrist, target);

        // Bounding box in the hand-aligned frame.
        let (sin, cos) = rotation.sin_cos();
        let mut min = (f32::INFINITY, f32::INFINITY);
        let mut max = (f32::NEG_INFINITY, f32::NEG_INFINITY);
        for lm in landmarks.points() {
            let (x, y) = px(*lm);
            let rx = x * cos + y * sin;
            let ry = -x * sin + y * cos;
            min = (min.0.min(rx), min.1.min(ry));
            max = (max.0.max(rx), max.1.max(ry));
        }
        let (rcx, rcy) = ((min.0 + max.0) / 2.0, (min.1 + max.1) / 2.0);
        let center_x = rcx * cos - rcy * sin;
        let center_y = rcx * sin + rcy * cos;

        Some(Self::from_box(
            center_x,
            center_y,
            max.0 - min.0,
            max.1 - min.1,
            rotation,
            -0.1,
            2.0,
        ))
    }
}

/// Rotation that makes the wrist -> fingers axis point straight up.
fn hand_rotation(wrist: (f32, f32), fingers: (f32, f32)) -> f32 {
    let angle = PI / 2.0 - (-(fingers.1 - wrist.1)).atan2(fingers.0 - wrist.0);
    normalize_radians(angle)
}

fn normalize_radians(angle: f32) -> f32 {
    angle - 2.0 * PI * ((angle + PI) / (2.0 * PI)).floor()
}

/// Samples `roi` out of `image` into a `side`x`side` RGB tensor in HWC order, values in
/// `0.0..=1.0`. Pixels outside the image are black.
pub fn crop_hwc(image: &RgbImage, roi: &Roi, side: u32) -> Vec<f32> {
    let mut output = vec![0.0f32; (side * side * 3) as usize];
    let (width, height) = (image.width() as f32, image.height() as f32);

    for y in 0..side {
        for x in 0..side {
            let u = (x as f32 + 0.5) / side as f32;
            let v = (y as f32 + 0.5) / side as f32;
            let (sx, sy) = roi.to_image(u, v);
            if sx < 0.0 || sy < 0.0 || sx >= width || sy >= height {
                continue;
            }
            let rgb = bilinear(image, sx - 0.5, sy - 0.5);
            let out_idx = ((y * side + x) * 3) as usize;
            output[out_idx..out_idx + 3].copy_from_slice(&rgb);
        }
    }

    output
}

fn bilinear(image: &RgbImage, x: f32, y: f32) -> [f32; 3] {
    let max_x = image.width() as i64 - 1;
    let max_y = image.height() as i64 - 1;
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let at = |xi: i64, yi: i64| {
        let p = image.get_pixel(xi.clamp(0, max_x) as u32, yi.clamp(0, max_y) as u32);
        [p.0[0] as f32, p.0[1] as f32, p.0[2] as f32]
    };
    let (x0, y0) = (x0 as i64, y0 as i64);
    let (a, b, c, d) = (at(x0, y0), at(x0 + 1, y0), at(x0, y0 + 1), at(x0 + 1, y0 + 1));

    let mut out = [0.0; 3];
    for i in 0..3 {
        let top = a[i] + (b[i] - a[i]) * fx;
        let bottom = c[i] + (d[i] - c[i]) * fx;
        out[i] = (top + (bottom - top) * fy) / 255.0;
    }
    out
}
