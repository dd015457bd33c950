//! Request parsing and the gesture-to-action binding dispatch.

use anyhow::{Result, anyhow};
use log::{error, info, warn};
use serde_json::Value;

use super::pipeline::TrackerUpdate;
use crate::config::Profile;

/// Everything a client (CLI or tracker feed) can ask of the engine.
#[derive(Debug)]
pub enum Op {
    Status,
    List,
    Delete { target: String },
    ClearAll,
    Export,
    Import { data: Value, replace: bool },
    StartSequence { name: String },
    Capture,
    Finish,
    Cancel,
    PracticeStart { target: String },
    PracticeStop,
    RecognizeStart,
    RecognizeStop,
    Frame { update: TrackerUpdate },
    Reload,
    UseProfile { name: String },
    Profiles,
    Doctor,
    Shutdown,
}

pub fn parse_request(req: &Value) -> Result<Op> {
    let op = req.get("op").and_then(Value::as_str).unwrap_or("");
    let parsed = match op {
        "status" => Op::Status,
        "list" => Op::List,
        "delete" => Op::Delete {
            target: required_str(req, "target")?,
        },
        "clear-all" => Op::ClearAll,
        "export" => Op::Export,
        "import" => Op::Import {
            data: req
                .get("data")
                .cloned()
                .ok_or_else(|| anyhow!("import needs a 'data' document"))?,
            replace: req.get("replace").and_then(Value::as_bool).unwrap_or(false),
        },
        "start-sequence" => Op::StartSequence {
            name: required_str(req, "name")?,
        },
        "capture" => Op::Capture,
        "finish" => Op::Finish,
        "cancel" => Op::Cancel,
        "practice-start" => Op::PracticeStart {
            target: required_str(req, "target")?,
        },
        "practice-stop" => Op::PracticeStop,
        "recognize-start" => Op::RecognizeStart,
        "recognize-stop" => Op::RecognizeStop,
        "frame" => Op::Frame {
            update: serde_json::from_value(req.clone())
                .map_err(|e| anyhow!("bad frame payload: {e}"))?,
        },
        "reload" => Op::Reload,
        "use" => Op::UseProfile {
            name: required_str(req, "profile")?,
        },
        "profiles" => Op::Profiles,
        "doctor" => Op::Doctor,
        "shutdown" => Op::Shutdown,
        other => return Err(anyhow!("unknown op: {other}")),
    };
    Ok(parsed)
}

fn required_str(req: &Value, key: &str) -> Result<String> {
    req.get(key)
        .and_then(Value::as_str)
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow!("missing '{key}'"))
}

/// Fire the profile binding for a recognized gesture, if one is mapped.
pub fn on_match(profile: &Profile, name: &str, confidence: f64) {
    let Some(action) = profile.bindings.get(name) else {
        return;
    };
    if action == "none" {
        return;
    }

    if let Some(msg) = action.strip_prefix("log:") {
        info!("match '{name}' ({confidence:.0}%): {}", msg.trim());
        return;
    }
    if let Some(cmdline) = action.strip_prefix("cmd:") {
        // validated at profile load; re-checked in case of a stale profile
        if !profile.meta.allow_commands {
            warn!("binding for '{name}' uses cmd: but allow_commands=false");
            return;
        }
        match std::process::Command::new("sh").arg("-c").arg(cmdline.trim()).spawn() {
            Ok(child) => info!("match '{name}': spawned command (pid={})", child.id()),
            Err(e) => error!("match '{name}': failed to spawn command: {e}"),
        }
        return;
    }
    warn!("unknown action mapping for '{name}' -> '{action}'");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_simple_ops() {
        assert!(matches!(parse_request(&json!({"op":"status"})).unwrap(), Op::Status));
        assert!(matches!(parse_request(&json!({"op":"capture"})).unwrap(), Op::Capture));
        assert!(matches!(parse_request(&json!({"op":"shutdown"})).unwrap(), Op::Shutdown));
    }

    #[test]
    fn parses_parameterized_ops() {
        let op = parse_request(&json!({"op":"start-sequence","name":"wave"})).unwrap();
        assert!(matches!(op, Op::StartSequence { name } if name == "wave"));

        let op = parse_request(&json!({"op":"delete","target":"fist"})).unwrap();
        assert!(matches!(op, Op::Delete { target } if target == "fist"));

        let op = parse_request(&json!({"op":"import","data":{"gestures":[]},"replace":true})).unwrap();
        assert!(matches!(op, Op::Import { replace: true, .. }));
    }

    #[test]
    fn frame_payload_rides_on_the_request_object() {
        let op = parse_request(&json!({
            "op": "frame",
            "hands": [[{"x": 0.5, "y": 0.5, "z": 0.0}]],
            "handedness": ["Right"],
            "timestamp_ms": 1234
        }))
        .unwrap();
        let Op::Frame { update } = op else {
            panic!("expected frame op")
        };
        assert_eq!(update.hands.len(), 1);
        assert_eq!(update.hands[0].len(), 1);
        assert_eq!(update.timestamp_ms, Some(1234));
    }

    #[test]
    fn empty_frame_means_no_hands() {
        let op = parse_request(&json!({"op":"frame"})).unwrap();
        let Op::Frame { update } = op else {
            panic!("expected frame op")
        };
        assert!(update.hands.is_empty());
    }

    #[test]
    fn missing_fields_and_unknown_ops_are_refused() {
        assert!(parse_request(&json!({"op":"start-sequence"})).is_err());
        assert!(parse_request(&json!({"op":"use"})).is_err());
        assert!(parse_request(&json!({"op":"frobnicate"})).is_err());
        assert!(parse_request(&json!({})).is_err());
    }
}
