//! The engine thread. Owns every piece of mutable gesture state and drains
//! a single channel of requests (tracker frames and client commands alike),
//! processing each to completion before the next. No other thread touches
//! the library, the recorder or the sessions.

use anyhow::Result;
use chrono::Utc;
use log::{error, info, warn};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::mpsc::{Receiver, Sender};

use super::dispatch::{self, Op};
use super::server::DaemonEvent;
use crate::capture::SequenceRecorder;
use crate::config::DaemonConfigState;
use crate::error::EngineError;
use crate::landmarks::{Handedness, Landmark, RawFrame};
use crate::library::{Dataset, GestureLibrary, ImportPolicy};
use crate::practice::PracticeEngine;
use crate::recognize::{Recognition, RecognitionEngine};
use crate::store::GestureStore;

/// One tracker tick as it arrives on the wire: zero or more hands of
/// landmark points plus handedness labels.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerUpdate {
    #[serde(default)]
    pub hands: Vec<Vec<Landmark>>,
    #[serde(default)]
    pub handedness: Vec<Handedness>,
    #[serde(default)]
    pub timestamp_ms: Option<i64>,
}

impl TrackerUpdate {
    /// Hand index 0; additional hands are ignored by design.
    fn into_first_hand(self, timestamp_ms: i64) -> Option<RawFrame> {
        let handedness = self.handedness.first().copied().unwrap_or_default();
        let landmarks = self.hands.into_iter().next()?;
        if landmarks.is_empty() {
            return None;
        }
        Some(RawFrame {
            landmarks,
            handedness,
            timestamp_ms,
        })
    }
}

/// A queued request plus the channel its answer goes back on (frames sent
/// by a tracker feed may not care about the reply).
pub struct Request {
    pub op: Op,
    pub reply: Option<Sender<Value>>,
}

impl Request {
    pub fn fire(op: Op) -> Self {
        Self { op, reply: None }
    }
}

pub struct EngineSystem<S: GestureStore> {
    cfg: DaemonConfigState,
    store: S,
    library: GestureLibrary,
    recorder: SequenceRecorder,
    recognition: RecognitionEngine,
    practice: PracticeEngine,
    last_frame: Option<RawFrame>,
    last_reported: Option<String>,
    tx_evt: Sender<DaemonEvent>,
}

impl<S: GestureStore> EngineSystem<S> {
    pub fn new(cfg: DaemonConfigState, store: S, tx_evt: Sender<DaemonEvent>) -> Result<Self> {
        let library = store.load()?;
        info!(
            "library loaded: {} gestures, {} frames",
            library.len(),
            library.total_frames()
        );
        let tunables = cfg.profile.tunables.clone();
        Ok(Self {
            cfg,
            store,
            library,
            recorder: SequenceRecorder::new(tunables.clone()),
            recognition: RecognitionEngine::new(tunables.clone()),
            practice: PracticeEngine::new(tunables),
            last_frame: None,
            last_reported: None,
            tx_evt,
        })
    }

    /// Drain requests until every sender is gone.
    pub fn run(mut self, rx: Receiver<Request>) {
        while let Ok(req) = rx.recv() {
            let resp = self.handle(req.op);
            if let Some(reply) = req.reply {
                let _ = reply.send(resp);
            }
        }
    }

    fn handle(&mut self, op: Op) -> Value {
        match op {
            Op::Status => ok(json!({
                "active_profile": self.cfg.active_name,
                "recording": self.recorder.is_recording(),
                "sequence": self.recorder.recording_name(),
                "captured": self.recorder.captured(),
                "recognizing": self.recognition.is_recognizing(),
                "practicing": self.practice.is_active(),
                "practice_target": self.practice.current_target().map(|(name, next)| {
                    json!({"name": name, "next_frame": next})
                }),
                "gestures": self.library.len(),
                "total_frames": self.library.total_frames(),
            })),

            Op::List => {
                let gestures: Vec<Value> = self
                    .library
                    .iter()
                    .map(|g| {
                        json!({
                            "id": g.id,
                            "name": g.name,
                            "frames": g.frame_count,
                            "createdAt": g.created_at,
                            "consistent": g.consistency.as_ref().map(|c| c.is_consistent),
                        })
                    })
                    .collect();
                ok(json!({"gestures": gestures}))
            }

            Op::Delete { target } => {
                let Some(id) = self.library.resolve(&target).map(|g| g.id) else {
                    return err(EngineError::NotFound(target));
                };
                let removed = self.library.remove(id);
                let persisted = self.persist();
                ok(json!({
                    "deleted": removed.map(|g| g.name),
                    "persisted": persisted,
                }))
            }

            Op::ClearAll => {
                let cleared = self.library.len();
                self.library.clear();
                let persisted = self.persist();
                ok(json!({"cleared": cleared, "persisted": persisted}))
            }

            Op::Export => {
                if self.library.is_empty() {
                    return err(EngineError::EmptyLibrary);
                }
                let dataset = self.library.export_dataset(Utc::now());
                match serde_json::to_value(&dataset) {
                    Ok(doc) => ok(doc),
                    Err(e) => err(e),
                }
            }

            Op::Import { data, replace } => {
                let dataset: Dataset = match serde_json::from_value(data) {
                    Ok(d) => d,
                    Err(e) => return err(EngineError::InvalidDataset(e.to_string())),
                };
                let policy = if replace {
                    ImportPolicy::Replace
                } else {
                    ImportPolicy::Merge
                };
                match self.library.import_dataset(dataset, policy) {
                    Ok(count) => {
                        let persisted = self.persist();
                        ok(json!({
                            "imported": count,
                            "gestures": self.library.len(),
                            "persisted": persisted,
                        }))
                    }
                    Err(e) => err(e),
                }
            }

            Op::StartSequence { name } => match self.recorder.start_sequence(&name) {
                Ok(()) => ok(json!({
                    "sequence": name,
                    "max_frames": self.cfg.profile.tunables.max_frames_per_gesture,
                })),
                Err(e) => err(e),
            },

            Op::Capture => {
                let Some(frame) = self.last_frame.clone() else {
                    return err(EngineError::NoHand);
                };
                match self.recorder.capture_frame(&frame) {
                    Ok(progress) => ok(json!({
                        "captured": progress.captured,
                        "max_frames": self.cfg.profile.tunables.max_frames_per_gesture,
                        "at_capacity": progress.at_capacity,
                    })),
                    Err(e) => err(e),
                }
            }

            Op::Finish => match self.recorder.finish_sequence(Utc::now()) {
                Ok((gesture, report)) => {
                    let name = gesture.name.clone();
                    let frames = gesture.frame_count;
                    self.library.add(gesture);
                    let persisted = self.persist();
                    for issue in &report.issues {
                        warn!("consistency: {issue}");
                    }
                    self.emit(format!("gesture '{name}' saved with {frames} frames"));
                    ok(json!({
                        "name": name,
                        "frames": frames,
                        "consistency": report,
                        "persisted": persisted,
                    }))
                }
                Err(e) => err(e),
            },

            Op::Cancel => {
                self.recorder.clear();
                ok(json!({"cleared": true}))
            }

            Op::PracticeStart { target } => {
                let Some(gesture) = self.library.resolve(&target).cloned() else {
                    return err(EngineError::NotFound(target));
                };
                self.practice.start(&gesture);
                ok(json!({"name": gesture.name, "frames": gesture.frame_count}))
            }

            Op::PracticeStop => {
                self.practice.stop();
                ok(json!({"practicing": false}))
            }

            Op::RecognizeStart => match self.recognition.start(&self.library) {
                Ok(()) => {
                    self.last_reported = None;
                    ok(json!({"recognizing": true, "gestures": self.library.len()}))
                }
                Err(e) => err(e),
            },

            Op::RecognizeStop => {
                self.recognition.stop();
                self.last_reported = None;
                ok(json!({"recognizing": false}))
            }

            Op::Frame { update } => {
                self.on_tracker_update(update);
                ok(Value::Null)
            }

            Op::Reload => match self.cfg.reload() {
                Ok(()) => {
                    self.apply_tunables();
                    info!("profile reloaded");
                    ok(json!({"active_profile": self.cfg.active_name}))
                }
                Err(e) => err(e),
            },

            Op::UseProfile { name } => match self.cfg.set_active(&name) {
                Ok(()) => {
                    self.apply_tunables();
                    info!("switched active profile to {}", self.cfg.active_name);
                    ok(json!({"active_profile": self.cfg.active_name}))
                }
                Err(e) => err(e),
            },

            Op::Profiles => ok(json!({
                "profiles": self.cfg.list_profiles(),
                "active": self.cfg.active_name,
            })),

            Op::Doctor => ok(self.cfg.doctor_report(
                &crate::store::default_store_path(),
                &super::runtime::socket_path(),
            )),

            // handled by the server before reaching the engine
            Op::Shutdown => ok(json!("shutting down")),
        }
    }

    fn on_tracker_update(&mut self, update: TrackerUpdate) {
        let timestamp = update
            .timestamp_ms
            .unwrap_or_else(|| Utc::now().timestamp_millis());
        match update.into_first_hand(timestamp) {
            Some(frame) => {
                if let Some(result) = self.recognition.on_frame(&frame, &self.library) {
                    self.report_recognition(result);
                }
                if let Some(update) = self.practice.on_frame(&frame) {
                    if update.advanced {
                        self.emit(format!(
                            "practice frame {} matched at {:.0}%",
                            update.target_index + 1,
                            update.similarity
                        ));
                    }
                    if let Some(done) = update.completed {
                        self.emit(format!(
                            "practice completed: '{}' ({} frames)",
                            done.name, done.frame_count
                        ));
                    }
                }
                self.last_frame = Some(frame);
            }
            None => {
                self.last_frame = None;
            }
        }
    }

    /// Announce recognition changes, not every frame: the tracker ticks
    /// tens of times per second against a stable result.
    fn report_recognition(&mut self, result: Recognition) {
        let label = result.matched.as_ref().map(|m| m.name.clone());
        if label == self.last_reported {
            return;
        }
        match &result.matched {
            Some(m) => {
                self.emit(format!("recognized '{}' ({:.0}%)", m.name, result.confidence));
                dispatch::on_match(&self.cfg.profile, &m.name, result.confidence);
            }
            None => self.emit(format!("no match ({:.0}%)", result.confidence)),
        }
        self.last_reported = label;
    }

    fn apply_tunables(&mut self) {
        let tunables = self.cfg.profile.tunables.clone();
        self.recorder.set_tunables(tunables.clone());
        self.recognition.set_tunables(tunables.clone());
        self.practice.set_tunables(tunables);
    }

    fn persist(&mut self) -> bool {
        match self.store.save(&self.library) {
            Ok(()) => true,
            Err(e) => {
                error!("failed to persist library: {e}");
                false
            }
        }
    }

    fn emit(&self, message: String) {
        let _ = self.tx_evt.send(DaemonEvent::Log(message));
    }
}

fn ok(data: Value) -> Value {
    json!({"ok": true, "data": data})
}

fn err(e: impl std::fmt::Display) -> Value {
    json!({"ok": false, "error": e.to_string()})
}
