//! Hand-landmark primitives and the normalization / similarity core.
//!
//! Everything downstream (capture, recognition, practice) compares frames
//! in the centroid-relative, max-radius-scaled space produced here.

use serde::{Deserialize, Serialize};

/// Points per tracked hand (standard 21-point topology).
pub const LANDMARKS_PER_HAND: usize = 21;

pub const WRIST: usize = 0;
pub const THUMB_TIP: usize = 4;
pub const MIDDLE_TIP: usize = 12;
pub const PINKY_TIP: usize = 20;

/// One tracked point in image-normalized coordinates plus relative depth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Landmark {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn dist(&self, other: &Landmark) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Handedness {
    Left,
    Right,
    #[default]
    Unknown,
}

/// One tracker tick for the hand used in matching (hand index 0 when the
/// tracker reports several). Frames carry their own clock: all debouncing
/// and interval analysis runs on `timestamp_ms`, never on wall-clock reads
/// inside the engines.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub landmarks: Vec<Landmark>,
    pub handedness: Handedness,
    pub timestamp_ms: i64,
}

/// Mean of x and y over all points. z does not participate.
pub fn centroid(landmarks: &[Landmark]) -> (f64, f64) {
    let mut cx = 0.0;
    let mut cy = 0.0;
    for lm in landmarks {
        cx += lm.x;
        cy += lm.y;
    }
    let n = landmarks.len() as f64;
    (cx / n, cy / n)
}

/// Centroid-center and max-radius-scale a landmark set.
///
/// The result is invariant to where the hand sits in the image and to its
/// distance from the camera; absolute scale is deliberately lost. Depth is
/// passed through untouched. An empty input has nothing to normalize and is
/// returned unchanged; a hand collapsed onto a single point (max radius 0)
/// is returned translated but unscaled.
pub fn normalize(landmarks: &[Landmark]) -> Vec<Landmark> {
    if landmarks.is_empty() {
        return landmarks.to_vec();
    }

    let (cx, cy) = centroid(landmarks);
    let translated: Vec<Landmark> = landmarks
        .iter()
        .map(|lm| Landmark::new(lm.x - cx, lm.y - cy, lm.z))
        .collect();

    let mut max_dist = 0.0_f64;
    for lm in &translated {
        let d = (lm.x * lm.x + lm.y * lm.y).sqrt();
        if d > max_dist {
            max_dist = d;
        }
    }
    if max_dist == 0.0 {
        return translated;
    }

    translated
        .iter()
        .map(|lm| Landmark::new(lm.x / max_dist, lm.y / max_dist, lm.z))
        .collect()
}

/// Score two normalized landmark sets in [0,1].
///
/// Mean per-point Euclidean distance in (x,y,z), mapped through
/// `max(0, 1 - avg * scale)`. Monotonically decreasing in distance but not
/// a metric. Returns 0 when either side is empty or the point counts
/// differ.
pub fn frame_similarity(a: &[Landmark], b: &[Landmark], scale: f64) -> f64 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut total = 0.0;
    let mut valid = 0usize;
    for (p, q) in a.iter().zip(b) {
        total += p.dist(q);
        valid += 1;
    }
    if valid == 0 {
        return 0.0;
    }

    let avg = total / valid as f64;
    (1.0 - avg * scale).max(0.0)
}

/// Well-centered synthetic hand used across the engine tests: 21 distinct
/// points spanning x in [0.30, 0.70], y in [0.35, 0.65].
#[cfg(test)]
pub(crate) fn sample_hand() -> Vec<Landmark> {
    (0..LANDMARKS_PER_HAND)
        .map(|i| {
            let t = i as f64;
            Landmark::new(0.30 + 0.02 * t, 0.35 + 0.015 * t, 0.01 * t)
        })
        .collect()
}

/// A second pose clearly distinct from [`sample_hand`].
#[cfg(test)]
pub(crate) fn sample_fist() -> Vec<Landmark> {
    (0..LANDMARKS_PER_HAND)
        .map(|i| {
            let t = i as f64;
            Landmark::new(0.60 - 0.015 * t, 0.40 + 0.012 * (t * 1.7).sin().abs() + 0.01 * t, 0.0)
        })
        .collect()
}

#[cfg(test)]
pub(crate) fn raw_frame(landmarks: Vec<Landmark>, timestamp_ms: i64) -> RawFrame {
    RawFrame {
        landmarks,
        handedness: Handedness::Right,
        timestamp_ms,
    }
}
