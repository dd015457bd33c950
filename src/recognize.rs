//! Continuous best-match recognition over the gesture library.

use std::collections::VecDeque;

use log::debug;

use crate::config::Tunables;
use crate::error::EngineError;
use crate::landmarks::{self, Landmark, RawFrame};
use crate::library::GestureLibrary;

#[derive(Debug, Clone, PartialEq)]
pub struct MatchedGesture {
    pub id: i64,
    pub name: String,
}

/// Outcome of matching one live frame against the library. `confidence` is
/// the best score found as a percentage, reported even when no gesture
/// cleared the tolerance.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub matched: Option<MatchedGesture>,
    pub confidence: f64,
}

/// Buffers incoming frames and scans the library once enough of them have
/// arrived. The buffer is only a readiness gate against the noisy first
/// frames after motion starts; matching itself is single-frame.
#[derive(Debug)]
pub struct RecognitionEngine {
    tunables: Tunables,
    recognizing: bool,
    buffer: VecDeque<Vec<Landmark>>,
}

impl RecognitionEngine {
    pub fn new(tunables: Tunables) -> Self {
        Self {
            tunables,
            recognizing: false,
            buffer: VecDeque::new(),
        }
    }

    pub fn set_tunables(&mut self, tunables: Tunables) {
        self.tunables = tunables;
    }

    pub fn is_recognizing(&self) -> bool {
        self.recognizing
    }

    pub fn start(&mut self, library: &GestureLibrary) -> Result<(), EngineError> {
        if library.is_empty() {
            return Err(EngineError::EmptyLibrary);
        }
        self.recognizing = true;
        self.buffer.clear();
        debug!("recognition started over {} gestures", library.len());
        Ok(())
    }

    pub fn stop(&mut self) {
        self.recognizing = false;
        self.buffer.clear();
    }

    /// Buffer the frame; once the readiness gate is met, return the best
    /// match for it.
    pub fn on_frame(&mut self, raw: &RawFrame, library: &GestureLibrary) -> Option<Recognition> {
        if !self.recognizing || raw.landmarks.is_empty() {
            return None;
        }

        let normalized = landmarks::normalize(&raw.landmarks);
        self.buffer.push_back(normalized);
        while self.buffer.len() > self.tunables.recognition_buffer_capacity {
            self.buffer.pop_front();
        }
        if self.buffer.len() < self.tunables.recognition_min_buffer {
            return None;
        }

        let current = self.buffer.back()?;
        Some(self.best_match(current, library))
    }

    /// Linear scan: every frame of every gesture, tracking the strict
    /// maximum. Exact ties keep the first gesture encountered.
    fn best_match(&self, current: &[Landmark], library: &GestureLibrary) -> Recognition {
        let scale = self.tunables.similarity_scale;
        let mut best_score = 0.0_f64;
        let mut best: Option<MatchedGesture> = None;

        for gesture in library.iter() {
            let mut gesture_score = 0.0_f64;
            for frame in &gesture.frames {
                let score = landmarks::frame_similarity(current, &frame.normalized(), scale);
                if score > gesture_score {
                    gesture_score = score;
                }
            }
            if gesture_score > best_score {
                best_score = gesture_score;
                best = Some(MatchedGesture {
                    id: gesture.id,
                    name: gesture.name.clone(),
                });
            }
        }

        let matched = if best_score >= self.tunables.recognition_tolerance {
            best
        } else {
            None
        };
        Recognition {
            matched,
            confidence: best_score * 100.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{Landmark, raw_frame, sample_fist, sample_hand};
    use crate::library::testutil::gesture;

    fn engine() -> RecognitionEngine {
        RecognitionEngine::new(Tunables::default())
    }

    fn fist_library() -> GestureLibrary {
        let mut library = GestureLibrary::new();
        library.add(gesture(1, "fist", &[sample_fist()]));
        library
    }

    #[test]
    fn start_fails_on_an_empty_library() {
        let mut eng = engine();
        let err = eng.start(&GestureLibrary::new()).unwrap_err();
        assert!(matches!(err, EngineError::EmptyLibrary));
        assert!(!eng.is_recognizing());
    }

    #[test]
    fn frames_are_ignored_until_started() {
        let mut eng = engine();
        let library = fist_library();
        assert!(eng.on_frame(&raw_frame(sample_fist(), 1_000), &library).is_none());
    }

    #[test]
    fn exact_pose_is_recognized_at_full_confidence_after_the_buffer_fills() {
        let mut eng = engine();
        let library = fist_library();
        eng.start(&library).unwrap();

        assert!(eng.on_frame(&raw_frame(sample_fist(), 1_000), &library).is_none());
        assert!(eng.on_frame(&raw_frame(sample_fist(), 1_033), &library).is_none());
        let result = eng
            .on_frame(&raw_frame(sample_fist(), 1_066), &library)
            .expect("third frame crosses the readiness gate");

        let matched = result.matched.expect("similarity 1.0 clears tolerance 0.7");
        assert_eq!(matched.name, "fist");
        assert!((result.confidence - 100.0).abs() < 1e-9);
    }

    #[test]
    fn below_tolerance_reports_unrecognized_with_the_best_score() {
        let mut eng = engine();
        let library = fist_library();
        eng.start(&library).unwrap();

        // Uniform depth offset of 0.3 puts similarity at exactly 0.55.
        let off: Vec<Landmark> = sample_fist()
            .iter()
            .map(|lm| Landmark::new(lm.x, lm.y, lm.z + 0.3))
            .collect();
        for t in [1_000, 1_033] {
            assert!(eng.on_frame(&raw_frame(off.clone(), t), &library).is_none());
        }
        let result = eng.on_frame(&raw_frame(off, 1_066), &library).unwrap();
        assert!(result.matched.is_none());
        assert!((result.confidence - 55.0).abs() < 1e-9);
    }

    #[test]
    fn best_gesture_wins_across_the_library() {
        let mut library = GestureLibrary::new();
        library.add(gesture(1, "open", &[sample_hand()]));
        library.add(gesture(2, "fist", &[sample_fist()]));

        let mut eng = engine();
        eng.start(&library).unwrap();
        for t in [1_000, 1_033] {
            eng.on_frame(&raw_frame(sample_fist(), t), &library);
        }
        let result = eng.on_frame(&raw_frame(sample_fist(), 1_066), &library).unwrap();
        assert_eq!(result.matched.unwrap().name, "fist");
    }

    #[test]
    fn tie_keeps_first_encountered() {
        // Two gestures holding the identical stored pose: the scan must
        // settle on the earlier one.
        let mut library = GestureLibrary::new();
        library.add(gesture(1, "first", &[sample_fist()]));
        library.add(gesture(2, "second", &[sample_fist()]));

        let mut eng = engine();
        eng.start(&library).unwrap();
        for t in [1_000, 1_033] {
            eng.on_frame(&raw_frame(sample_fist(), t), &library);
        }
        let result = eng.on_frame(&raw_frame(sample_fist(), 1_066), &library).unwrap();
        assert_eq!(result.matched.unwrap().name, "first");
    }

    #[test]
    fn buffer_evicts_beyond_capacity() {
        let tunables = Tunables {
            recognition_buffer_capacity: 4,
            recognition_min_buffer: 3,
            ..Tunables::default()
        };
        let mut eng = RecognitionEngine::new(tunables);
        let library = fist_library();
        eng.start(&library).unwrap();

        for t in 0..10 {
            eng.on_frame(&raw_frame(sample_fist(), 1_000 + t * 33), &library);
        }
        assert_eq!(eng.buffer.len(), 4);
    }

    #[test]
    fn stop_clears_the_buffer_and_gates_again_on_restart() {
        let mut eng = engine();
        let library = fist_library();
        eng.start(&library).unwrap();
        for t in [1_000, 1_033, 1_066] {
            eng.on_frame(&raw_frame(sample_fist(), t), &library);
        }
        eng.stop();
        assert!(!eng.is_recognizing());

        eng.start(&library).unwrap();
        assert!(
            eng.on_frame(&raw_frame(sample_fist(), 2_000), &library).is_none(),
            "buffer must refill before matching resumes"
        );
    }
}
