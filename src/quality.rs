//! Frame-quality scoring and the hard validity gate applied before a frame
//! may enter a sequence.

use serde::{Deserialize, Serialize};

use crate::landmarks::{LANDMARKS_PER_HAND, Landmark, MIDDLE_TIP, PINKY_TIP, THUMB_TIP, WRIST};

const EDGE_MARGIN: f64 = 0.10;
const EDGE_PENALTY: f64 = 20.0;
const MIN_EXTENT: f64 = 0.15;
const MAX_EXTENT: f64 = 0.70;
const EXTENT_PENALTY: f64 = 25.0;
const STRAY_POINT_PENALTY: f64 = 5.0;

/// Normalized coordinates beyond this magnitude mean the tracker produced
/// garbage, not a real hand.
pub const MAX_NORMALIZED_MAGNITUDE: f64 = 2.0;

/// Axis-aligned extent of the raw (pre-normalization) landmarks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub center_x: f64,
    pub center_y: f64,
}

impl BoundingBox {
    pub fn from_landmarks(landmarks: &[Landmark]) -> Self {
        let mut min_x = f64::MAX;
        let mut min_y = f64::MAX;
        let mut max_x = f64::MIN;
        let mut max_y = f64::MIN;
        for lm in landmarks {
            min_x = min_x.min(lm.x);
            min_y = min_y.min(lm.y);
            max_x = max_x.max(lm.x);
            max_y = max_y.max(lm.y);
        }
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
            center_x: (min_x + max_x) / 2.0,
            center_y: (min_y + max_y) / 2.0,
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    fn touches_edge(&self, margin: f64) -> bool {
        self.min_x < margin
            || self.min_y < margin
            || self.max_x > 1.0 - margin
            || self.max_y > 1.0 - margin
    }
}

/// Physical hand measurements taken at the fixed topology indices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HandSize {
    pub length: f64,
    pub width: f64,
    pub area: f64,
}

impl HandSize {
    /// wrist-to-middle-tip length, thumb-tip-to-pinky-tip width. Zero for
    /// short landmark sets (those never pass [`validate`] anyway).
    pub fn measure(landmarks: &[Landmark]) -> Self {
        if landmarks.len() <= PINKY_TIP {
            return Self {
                length: 0.0,
                width: 0.0,
                area: 0.0,
            };
        }
        let length = landmarks[WRIST].dist(&landmarks[MIDDLE_TIP]);
        let width = landmarks[THUMB_TIP].dist(&landmarks[PINKY_TIP]);
        Self {
            length,
            width,
            area: length * width,
        }
    }
}

/// Usability score in [0,100]: independent additive penalties, floored at 0.
pub fn assess(landmarks: &[Landmark], bounds: &BoundingBox) -> f64 {
    let mut score = 100.0;

    if bounds.touches_edge(EDGE_MARGIN) {
        score -= EDGE_PENALTY;
    }
    if bounds.width() < MIN_EXTENT || bounds.height() < MIN_EXTENT {
        score -= EXTENT_PENALTY;
    }
    if bounds.width() > MAX_EXTENT || bounds.height() > MAX_EXTENT {
        score -= EXTENT_PENALTY;
    }
    for lm in landmarks {
        if !(0.0..=1.0).contains(&lm.x) || !(0.0..=1.0).contains(&lm.y) {
            score -= STRAY_POINT_PENALTY;
        }
    }

    score.max(0.0)
}

/// A frame refused outright by [`validate`], as opposed to merely scoring
/// low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FrameRejection {
    #[error("tracker returned {0} landmarks, need 21")]
    TooFewLandmarks(usize),
    #[error("normalized landmarks contain non-finite values")]
    NonFinite,
    #[error("normalized landmark magnitude exceeds 2.0")]
    OutOfRange,
}

/// Degenerate-tracker gate. These indicate a broken detection, not a
/// low-quality one, so they fail capture before any scoring happens.
pub fn validate(raw: &[Landmark], normalized: &[Landmark]) -> Result<(), FrameRejection> {
    if raw.len() < LANDMARKS_PER_HAND {
        return Err(FrameRejection::TooFewLandmarks(raw.len()));
    }
    for lm in normalized {
        if !lm.x.is_finite() || !lm.y.is_finite() || !lm.z.is_finite() {
            return Err(FrameRejection::NonFinite);
        }
        if lm.x.abs() > MAX_NORMALIZED_MAGNITUDE
            || lm.y.abs() > MAX_NORMALIZED_MAGNITUDE
            || lm.z.abs() > MAX_NORMALIZED_MAGNITUDE
        {
            return Err(FrameRejection::OutOfRange);
        }
    }
    Ok(())
}
