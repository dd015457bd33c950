//! Sequential capture: Idle ⇄ Recording, one quality-gated frame at a time,
//! finished into a named gesture with a consistency report.

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::Tunables;
use crate::error::EngineError;
use crate::landmarks::{self, LANDMARKS_PER_HAND, RawFrame};
use crate::library::{CapturedFrame, Gesture};
use crate::quality::{self, BoundingBox, HandSize};

const LOW_QUALITY_MEAN: f64 = 70.0;
const SIZE_VARIATION_FACTOR: f64 = 0.5;
const IRREGULAR_INTERVAL_FACTOR: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureProgress {
    pub captured: usize,
    pub at_capacity: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyStats {
    pub avg_quality: f64,
    pub avg_hand_size_area: f64,
    pub size_variation: f64,
    pub avg_interval_ms: f64,
}

/// Advisory findings over a finished sequence. Never blocks saving; the
/// caller decides what to do with the issues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport {
    pub is_consistent: bool,
    pub issues: Vec<String>,
    pub stats: ConsistencyStats,
}

#[derive(Debug, Default)]
enum RecorderState {
    #[default]
    Idle,
    Recording {
        name: String,
        frames: Vec<CapturedFrame>,
    },
}

/// The sequence-capture state machine. Failed operations never mutate the
/// working frame list.
#[derive(Debug)]
pub struct SequenceRecorder {
    tunables: Tunables,
    state: RecorderState,
}

impl SequenceRecorder {
    pub fn new(tunables: Tunables) -> Self {
        Self {
            tunables,
            state: RecorderState::Idle,
        }
    }

    pub fn set_tunables(&mut self, tunables: Tunables) {
        self.tunables = tunables;
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, RecorderState::Recording { .. })
    }

    pub fn recording_name(&self) -> Option<&str> {
        match &self.state {
            RecorderState::Recording { name, .. } => Some(name),
            RecorderState::Idle => None,
        }
    }

    pub fn captured(&self) -> usize {
        match &self.state {
            RecorderState::Recording { frames, .. } => frames.len(),
            RecorderState::Idle => 0,
        }
    }

    pub fn start_sequence(&mut self, name: &str) -> Result<(), EngineError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::EmptyName);
        }
        if let RecorderState::Recording { name: current, .. } = &self.state {
            return Err(EngineError::AlreadyRecording(current.clone()));
        }
        self.state = RecorderState::Recording {
            name: name.to_string(),
            frames: Vec::new(),
        };
        info!("sequence started for '{name}'");
        Ok(())
    }

    /// Normalize, validate and score the current tracker frame, appending it
    /// to the working sequence when it passes every gate.
    pub fn capture_frame(&mut self, raw: &RawFrame) -> Result<CaptureProgress, EngineError> {
        let max = self.tunables.max_frames_per_gesture;
        let min_quality = self.tunables.min_capture_quality;

        let RecorderState::Recording { name, frames } = &mut self.state else {
            return Err(EngineError::NotRecording);
        };
        if frames.len() >= max {
            return Err(EngineError::SequenceFull(frames.len()));
        }
        if raw.landmarks.len() < LANDMARKS_PER_HAND {
            return Err(quality::FrameRejection::TooFewLandmarks(raw.landmarks.len()).into());
        }

        let normalized = landmarks::normalize(&raw.landmarks);
        quality::validate(&raw.landmarks, &normalized)?;

        let bounds = BoundingBox::from_landmarks(&raw.landmarks);
        let score = quality::assess(&raw.landmarks, &bounds);
        if score < min_quality {
            return Err(EngineError::LowQuality {
                score,
                min: min_quality,
            });
        }

        let sequence_index = frames.len();
        frames.push(CapturedFrame {
            id: raw.timestamp_ms,
            timestamp: DateTime::from_timestamp_millis(raw.timestamp_ms).unwrap_or_default(),
            raw_landmarks: raw.landmarks.clone(),
            normalized_landmarks: normalized,
            handedness: raw.handedness,
            sequence_index,
            quality: score,
            bounding_box: bounds,
            hand_size: HandSize::measure(&raw.landmarks),
        });

        let captured = frames.len();
        debug!("captured frame {captured}/{max} for '{name}' (quality {score:.0})");
        Ok(CaptureProgress {
            captured,
            at_capacity: captured >= max,
        })
    }

    /// Close the sequence into a gesture. Consistency issues are reported,
    /// not enforced.
    pub fn finish_sequence(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<(Gesture, ConsistencyReport), EngineError> {
        let RecorderState::Recording { name, frames } = &mut self.state else {
            return Err(EngineError::NotRecording);
        };
        if frames.is_empty() {
            return Err(EngineError::NothingCaptured);
        }

        let name = std::mem::take(name);
        let frames = std::mem::take(frames);
        self.state = RecorderState::Idle;

        let report = analyze_consistency(&frames);
        let gesture = Gesture {
            id: now.timestamp_millis(),
            name: name.clone(),
            frame_count: frames.len(),
            frames,
            created_at: now,
            is_sequential: true,
            consistency: Some(report.clone()),
        };
        info!(
            "gesture '{}' finished with {} frames (consistent: {})",
            name, gesture.frame_count, report.is_consistent
        );
        Ok((gesture, report))
    }

    /// Abandon the working sequence, discarding any uncommitted frames.
    pub fn clear(&mut self) {
        if self.is_recording() {
            debug!("sequence cleared, {} uncommitted frames discarded", self.captured());
        }
        self.state = RecorderState::Idle;
    }
}

/// Read-only sweep over a captured sequence: hand-size stability, average
/// quality, and pacing. Findings require at least two frames.
pub fn analyze_consistency(frames: &[CapturedFrame]) -> ConsistencyReport {
    let n = frames.len();
    let denom = n.max(1) as f64;

    let avg_quality = frames.iter().map(|f| f.quality).sum::<f64>() / denom;
    let areas: Vec<f64> = frames.iter().map(|f| f.hand_size.area).collect();
    let avg_area = areas.iter().sum::<f64>() / denom;
    let size_variation = match (
        areas.iter().cloned().fold(f64::INFINITY, f64::min),
        areas.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
    ) {
        (min, max) if min.is_finite() => max - min,
        _ => 0.0,
    };

    let deltas: Vec<f64> = frames
        .windows(2)
        .map(|w| (w[1].timestamp - w[0].timestamp).num_milliseconds() as f64)
        .collect();
    let avg_interval_ms = if deltas.is_empty() {
        0.0
    } else {
        deltas.iter().sum::<f64>() / deltas.len() as f64
    };

    let mut issues = Vec::new();
    if n >= 2 {
        if size_variation > SIZE_VARIATION_FACTOR * avg_area {
            issues.push("significant hand-size variation across frames".to_string());
        }
        if avg_quality < LOW_QUALITY_MEAN {
            issues.push("low average capture quality".to_string());
        }
        let max_delta = deltas.iter().cloned().fold(0.0_f64, f64::max);
        if max_delta > IRREGULAR_INTERVAL_FACTOR * avg_interval_ms {
            issues.push("irregular pauses during capture".to_string());
        }
    }

    ConsistencyReport {
        is_consistent: issues.is_empty(),
        issues,
        stats: ConsistencyStats {
            avg_quality,
            avg_hand_size_area: avg_area,
            size_variation,
            avg_interval_ms,
        },
    }
}
