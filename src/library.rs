//! The gesture library: captured frames, named gestures, and the
//! import/export dataset document.
//!
//! Serialized field names stay camelCase to remain readable by dataset
//! files produced by earlier exports.

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capture::ConsistencyReport;
use crate::error::EngineError;
use crate::landmarks::{self, Handedness, Landmark};
use crate::quality::{BoundingBox, HandSize};

pub const DATASET_VERSION: &str = "1.0";

/// One frame of a recorded gesture. Immutable once captured; owned by the
/// gesture it was saved into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedFrame {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub raw_landmarks: Vec<Landmark>,
    #[serde(default)]
    pub normalized_landmarks: Vec<Landmark>,
    #[serde(default)]
    pub handedness: Handedness,
    pub sequence_index: usize,
    pub quality: f64,
    pub bounding_box: BoundingBox,
    pub hand_size: HandSize,
}

impl CapturedFrame {
    /// Normalized landmarks, computing them on the fly for frames from
    /// dataset files that only carry raw points.
    pub fn normalized(&self) -> Cow<'_, [Landmark]> {
        if self.normalized_landmarks.is_empty() {
            Cow::Owned(landmarks::normalize(&self.raw_landmarks))
        } else {
            Cow::Borrowed(&self.normalized_landmarks)
        }
    }
}

/// A named, ordered sequence of captured frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gesture {
    pub id: i64,
    pub name: String,
    pub frames: Vec<CapturedFrame>,
    pub frame_count: usize,
    pub created_at: DateTime<Utc>,
    pub is_sequential: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consistency: Option<ConsistencyReport>,
}

impl Gesture {
    /// Library invariants: non-empty trimmed name, non-empty frame list,
    /// declared count matching, sequence indices 0,1,2,…
    pub fn check(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("gesture has an empty name".into());
        }
        if self.frames.is_empty() {
            return Err(format!("gesture '{}' has no frames", self.name));
        }
        if self.frame_count != self.frames.len() {
            return Err(format!(
                "gesture '{}' declares {} frames but holds {}",
                self.name,
                self.frame_count,
                self.frames.len()
            ));
        }
        for (i, frame) in self.frames.iter().enumerate() {
            if frame.sequence_index != i {
                return Err(format!(
                    "gesture '{}' frame {} carries sequence index {}",
                    self.name, i, frame.sequence_index
                ));
            }
        }
        Ok(())
    }
}

/// What to do with the existing library when importing a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportPolicy {
    /// Discard the current library and take the imported gestures.
    Replace,
    /// Overwrite same-name gestures in place, append the rest.
    Merge,
}

/// The exported dataset document. Field layout is fixed for compatibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub total_gestures: usize,
    pub total_frames: usize,
    pub gestures: Vec<Gesture>,
}

/// Ordered collection of gestures, unique by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GestureLibrary {
    gestures: Vec<Gesture>,
}

impl GestureLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.gestures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gestures.is_empty()
    }

    pub fn total_frames(&self) -> usize {
        self.gestures.iter().map(|g| g.frame_count).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Gesture> {
        self.gestures.iter()
    }

    pub fn add(&mut self, gesture: Gesture) {
        self.gestures.push(gesture);
    }

    pub fn get(&self, id: i64) -> Option<&Gesture> {
        self.gestures.iter().find(|g| g.id == id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Gesture> {
        self.gestures.iter().find(|g| g.name == name)
    }

    /// Look a gesture up by numeric id or, failing that, by exact name.
    pub fn resolve(&self, target: &str) -> Option<&Gesture> {
        if let Ok(id) = target.parse::<i64>() {
            if let Some(g) = self.get(id) {
                return Some(g);
            }
        }
        self.find_by_name(target)
    }

    pub fn remove(&mut self, id: i64) -> Option<Gesture> {
        let at = self.gestures.iter().position(|g| g.id == id)?;
        Some(self.gestures.remove(at))
    }

    pub fn clear(&mut self) {
        self.gestures.clear();
    }

    pub fn export_dataset(&self, now: DateTime<Utc>) -> Dataset {
        Dataset {
            version: DATASET_VERSION.to_string(),
            created_at: now,
            total_gestures: self.len(),
            total_frames: self.total_frames(),
            gestures: self.gestures.clone(),
        }
    }

    /// Bring a dataset's gestures in under the chosen conflict policy.
    /// The library is untouched if any imported gesture fails validation.
    pub fn import_dataset(
        &mut self,
        dataset: Dataset,
        policy: ImportPolicy,
    ) -> Result<usize, EngineError> {
        if dataset.gestures.is_empty() {
            return Err(EngineError::InvalidDataset(
                "document contains no gestures".into(),
            ));
        }
        for gesture in &dataset.gestures {
            gesture.check().map_err(EngineError::InvalidDataset)?;
        }

        let count = dataset.gestures.len();
        match policy {
            ImportPolicy::Replace => {
                self.gestures = dataset.gestures;
            }
            ImportPolicy::Merge => {
                for incoming in dataset.gestures {
                    match self.gestures.iter_mut().find(|g| g.name == incoming.name) {
                        Some(existing) => *existing = incoming,
                        None => self.gestures.push(incoming),
                    }
                }
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::landmarks::{normalize, sample_hand};
    use crate::quality::{BoundingBox, HandSize};

    pub fn frame_at(index: usize, timestamp_ms: i64, hand: &[Landmark]) -> CapturedFrame {
        CapturedFrame {
            id: timestamp_ms,
            timestamp: DateTime::from_timestamp_millis(timestamp_ms).unwrap(),
            raw_landmarks: hand.to_vec(),
            normalized_landmarks: normalize(hand),
            handedness: Handedness::Right,
            sequence_index: index,
            quality: 100.0,
            bounding_box: BoundingBox::from_landmarks(hand),
            hand_size: HandSize::measure(hand),
        }
    }

    pub fn gesture(id: i64, name: &str, hands: &[Vec<Landmark>]) -> Gesture {
        let frames: Vec<CapturedFrame> = hands
            .iter()
            .enumerate()
            .map(|(i, h)| frame_at(i, 1_000 + 200 * i as i64, h))
            .collect();
        Gesture {
            id,
            name: name.to_string(),
            frame_count: frames.len(),
            frames,
            created_at: DateTime::from_timestamp_millis(10_000).unwrap(),
            is_sequential: true,
            consistency: None,
        }
    }

    pub fn single_frame_gesture(id: i64, name: &str) -> Gesture {
        gesture(id, name, &[sample_hand()])
    }
}
