//! Step-through practice: hold each frame of a target gesture in turn.

use log::{debug, info};

use crate::config::Tunables;
use crate::landmarks::{self, RawFrame};
use crate::library::Gesture;

#[derive(Debug)]
struct Session {
    gesture: Gesture,
    frame_index: usize,
    last_check_ms: i64,
}

#[derive(Debug, Default)]
enum SessionState {
    #[default]
    Inactive,
    Active(Session),
    Completed {
        name: String,
        frame_count: usize,
    },
}

/// Signalled once the final target frame has been matched.
#[derive(Debug, Clone, PartialEq)]
pub struct PracticeCompletion {
    pub name: String,
    pub frame_count: usize,
}

/// One evaluation of the live pose against the current target frame.
/// Similarity is reported as a percentage whatever the outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct PracticeUpdate {
    pub target_index: usize,
    pub similarity: f64,
    pub advanced: bool,
    pub completed: Option<PracticeCompletion>,
}

#[derive(Debug)]
pub struct PracticeEngine {
    tunables: Tunables,
    state: SessionState,
}

impl PracticeEngine {
    pub fn new(tunables: Tunables) -> Self {
        Self {
            tunables,
            state: SessionState::Inactive,
        }
    }

    pub fn set_tunables(&mut self, tunables: Tunables) {
        self.tunables = tunables;
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Active(_))
    }

    /// Target of the session in progress, with the frame index to perform
    /// next.
    pub fn current_target(&self) -> Option<(&str, usize)> {
        match &self.state {
            SessionState::Active(session) => Some((session.gesture.name.as_str(), session.frame_index)),
            _ => None,
        }
    }

    /// Begin a session against a snapshot of the target gesture. Looking
    /// the gesture up (and failing with NotFound) is the caller's job.
    pub fn start(&mut self, gesture: &Gesture) {
        info!(
            "practice started for '{}' ({} frames)",
            gesture.name, gesture.frame_count
        );
        self.state = SessionState::Active(Session {
            gesture: gesture.clone(),
            frame_index: 0,
            last_check_ms: 0,
        });
    }

    /// Discard the session, whatever state it is in.
    pub fn stop(&mut self) {
        self.state = SessionState::Inactive;
    }

    /// Score the live frame against the current target. Evaluations are
    /// debounced on the frame clock; every evaluation that happens is
    /// reported, and each one clearing the threshold advances the target.
    /// Holding the pose keeps advancing, deliberately.
    pub fn on_frame(&mut self, raw: &RawFrame) -> Option<PracticeUpdate> {
        let interval = self.tunables.practice_check_interval_ms as i64;
        let threshold = self.tunables.similarity_threshold;
        let scale = self.tunables.similarity_scale;

        let SessionState::Active(session) = &mut self.state else {
            return None;
        };
        if raw.landmarks.is_empty() {
            return None;
        }
        if session.frame_index >= session.gesture.frames.len() {
            return None;
        }
        if raw.timestamp_ms - session.last_check_ms < interval {
            return None;
        }
        session.last_check_ms = raw.timestamp_ms;

        let normalized = landmarks::normalize(&raw.landmarks);
        let target = &session.gesture.frames[session.frame_index];
        let similarity = landmarks::frame_similarity(&normalized, &target.normalized(), scale) * 100.0;

        let target_index = session.frame_index;
        let mut advanced = false;
        let mut completion = None;

        if similarity >= threshold {
            advanced = true;
            session.frame_index += 1;
            debug!(
                "practice frame {} matched at {:.0}%",
                target_index, similarity
            );
            if session.frame_index >= session.gesture.frames.len() {
                completion = Some(PracticeCompletion {
                    name: session.gesture.name.clone(),
                    frame_count: session.gesture.frame_count,
                });
            }
        }

        if let Some(done) = &completion {
            info!("practice completed for '{}'", done.name);
            self.state = SessionState::Completed {
                name: done.name.clone(),
                frame_count: done.frame_count,
            };
        }

        Some(PracticeUpdate {
            target_index,
            similarity,
            advanced,
            completed: completion,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{Landmark, raw_frame, sample_hand};
    use crate::library::testutil::gesture;

    fn engine() -> PracticeEngine {
        PracticeEngine::new(Tunables::default())
    }

    /// A raw hand whose normalized form sits at an exact similarity to the
    /// stored pose: depth passes through normalization untouched, so a
    /// uniform z offset of d gives similarity 1 - 1.5 * d.
    fn off_pose(offset: f64) -> Vec<Landmark> {
        sample_hand()
            .iter()
            .map(|lm| Landmark::new(lm.x, lm.y, lm.z + offset))
            .collect()
    }

    #[test]
    fn frames_are_ignored_without_a_session() {
        let mut eng = engine();
        assert!(eng.on_frame(&raw_frame(sample_hand(), 1_000)).is_none());
    }

    #[test]
    fn completes_a_two_frame_gesture() {
        let target = gesture(1, "wave", &[sample_hand(), sample_hand()]);
        let mut eng = engine();
        eng.start(&target);
        assert_eq!(eng.current_target(), Some(("wave", 0)));

        // 85% against frame 0 advances past the 80 threshold.
        let update = eng.on_frame(&raw_frame(off_pose(0.10), 1_000)).unwrap();
        assert!((update.similarity - 85.0).abs() < 1e-9);
        assert!(update.advanced);
        assert!(update.completed.is_none());
        assert_eq!(eng.current_target(), Some(("wave", 1)));

        // 90% against frame 1 completes the session.
        let update = eng.on_frame(&raw_frame(off_pose(0.2 / 3.0), 1_200)).unwrap();
        assert!((update.similarity - 90.0).abs() < 1e-6);
        let done = update.completed.unwrap();
        assert_eq!(done.name, "wave");
        assert_eq!(done.frame_count, 2);
        assert!(!eng.is_active());

        // Completed sessions ignore further frames until stop/start.
        assert!(eng.on_frame(&raw_frame(sample_hand(), 1_400)).is_none());
    }

    #[test]
    fn below_threshold_reports_similarity_without_advancing() {
        let target = gesture(1, "wave", &[sample_hand()]);
        let mut eng = engine();
        eng.start(&target);

        // z offset 0.2 puts similarity at 70%, under the 80 threshold.
        let update = eng.on_frame(&raw_frame(off_pose(0.2), 1_000)).unwrap();
        assert!((update.similarity - 70.0).abs() < 1e-9);
        assert!(!update.advanced);
        assert_eq!(eng.current_target(), Some(("wave", 0)));
    }

    #[test]
    fn evaluations_are_debounced_to_the_check_interval() {
        let target = gesture(1, "wave", &[sample_hand(), sample_hand(), sample_hand()]);
        let mut eng = engine();
        eng.start(&target);

        assert!(eng.on_frame(&raw_frame(sample_hand(), 1_000)).is_some());
        // 60 ms later: inside the 100 ms window, skipped entirely.
        assert!(eng.on_frame(&raw_frame(sample_hand(), 1_060)).is_none());
        assert_eq!(eng.current_target(), Some(("wave", 1)));
        // 100 ms after the last evaluation: evaluated again.
        assert!(eng.on_frame(&raw_frame(sample_hand(), 1_100)).is_some());
        assert_eq!(eng.current_target(), Some(("wave", 2)));
    }

    #[test]
    fn holding_the_pose_keeps_advancing() {
        let target = gesture(1, "hold", &[sample_hand(), sample_hand()]);
        let mut eng = engine();
        eng.start(&target);

        let first = eng.on_frame(&raw_frame(sample_hand(), 1_000)).unwrap();
        assert!(first.advanced);
        let second = eng.on_frame(&raw_frame(sample_hand(), 1_150)).unwrap();
        assert!(second.advanced);
        assert!(second.completed.is_some());
    }

    #[test]
    fn no_hand_is_a_no_op() {
        let target = gesture(1, "wave", &[sample_hand()]);
        let mut eng = engine();
        eng.start(&target);
        assert!(eng.on_frame(&raw_frame(Vec::new(), 1_000)).is_none());
        assert_eq!(eng.current_target(), Some(("wave", 0)));
    }

    #[test]
    fn stop_discards_the_session() {
        let target = gesture(1, "wave", &[sample_hand()]);
        let mut eng = engine();
        eng.start(&target);
        eng.stop();
        assert!(!eng.is_active());
        assert!(eng.on_frame(&raw_frame(sample_hand(), 1_000)).is_none());
    }
}
