use anyhow::{Result, anyhow};
use pico_args::Arguments;
use std::{
    env, fs,
    io::{BufRead, BufReader, Write},
    os::unix::net::UnixStream,
    process::Command,
};

use crate::ipc;

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    // Hidden daemon mode (spawned by `start`)
    if pargs.contains("--daemon") {
        return ipc::server::run_daemon();
    }

    // No args -> general help
    if env::args().len() == 1 {
        print_help();
        return Ok(());
    }

    // Flags-based help (-h/--help)
    if pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

    let replace = pargs.contains("--replace");

    // First free arg is the subcommand
    let subcmd: Option<String> = pargs.free_from_str().ok();

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            if let Some(t) = topic {
                print_subcmd_help(&t);
            } else {
                print_help();
            }
            Ok(())
        }

        Some("start") => {
            let exe = std::env::current_exe()?;
            let child = Command::new(exe).arg("--daemon").spawn()?;
            println!("gesturectl: started daemon (pid={})", child.id());
            Ok(())
        }

        Some("stop") => {
            let r = ipc::client_request(serde_json::json!({"op":"shutdown"}))?;
            print_response(&r);
            Ok(())
        }

        Some("status") => {
            let r = ipc::client_request(serde_json::json!({"op":"status"}))?;
            print_response(&r);
            Ok(())
        }

        Some("list") => {
            let r = ipc::client_request(serde_json::json!({"op":"list"}))?;
            print_response(&r);
            Ok(())
        }

        Some("delete") => {
            let target: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: gesturectl delete <id|name>"))?;
            let r = ipc::client_request(serde_json::json!({"op":"delete","target":target}))?;
            print_response(&r);
            Ok(())
        }

        Some("clear-all") => {
            let r = ipc::client_request(serde_json::json!({"op":"clear-all"}))?;
            print_response(&r);
            Ok(())
        }

        Some("export") => {
            let path: String = pargs.free_from_str().unwrap_or_else(|_| {
                format!(
                    "gestures_dataset_{}.json",
                    chrono::Local::now().format("%Y-%m-%d")
                )
            });
            let r = ipc::client_request(serde_json::json!({"op":"export"}))?;
            if r.get("ok").and_then(serde_json::Value::as_bool) == Some(true) {
                let doc = serde_json::to_string_pretty(&r["data"])?;
                fs::write(&path, doc)?;
                println!("exported dataset to {path}");
            } else {
                print_response(&r);
            }
            Ok(())
        }

        Some("import") => {
            let path: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: gesturectl import <file.json> [--replace]"))?;
            let txt = fs::read_to_string(&path)
                .map_err(|e| anyhow!("failed to read {path}: {e}"))?;
            let data: serde_json::Value = serde_json::from_str(&txt)
                .map_err(|e| anyhow!("{path} is not valid JSON: {e}"))?;
            let r = ipc::client_request(
                serde_json::json!({"op":"import","data":data,"replace":replace}),
            )?;
            print_response(&r);
            Ok(())
        }

        Some("record") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: gesturectl record <gesture_name>"))?;
            let r =
                ipc::client_request(serde_json::json!({"op":"start-sequence","name":name}))?;
            print_response(&r);
            Ok(())
        }

        Some("capture") => {
            let r = ipc::client_request(serde_json::json!({"op":"capture"}))?;
            print_response(&r);
            Ok(())
        }

        Some("finish") => {
            let r = ipc::client_request(serde_json::json!({"op":"finish"}))?;
            print_response(&r);
            Ok(())
        }

        Some("cancel") => {
            let r = ipc::client_request(serde_json::json!({"op":"cancel"}))?;
            print_response(&r);
            Ok(())
        }

        Some("practice") => {
            let target: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: gesturectl practice <id|name>"))?;
            let r =
                ipc::client_request(serde_json::json!({"op":"practice-start","target":target}))?;
            print_response(&r);
            Ok(())
        }

        Some("practice-stop") => {
            let r = ipc::client_request(serde_json::json!({"op":"practice-stop"}))?;
            print_response(&r);
            Ok(())
        }

        Some("recognize") => {
            let r = ipc::client_request(serde_json::json!({"op":"recognize-start"}))?;
            print_response(&r);
            Ok(())
        }

        Some("recognize-stop") => {
            let r = ipc::client_request(serde_json::json!({"op":"recognize-stop"}))?;
            print_response(&r);
            Ok(())
        }

        Some("feed") => run_feed(),

        Some("use") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: gesturectl use <profile_name>"))?;
            let r = ipc::client_request(serde_json::json!({"op":"use","profile":name}))?;
            print_response(&r);
            Ok(())
        }

        Some("profiles") => {
            let r = ipc::client_request(serde_json::json!({"op":"profiles"}))?;
            print_response(&r);
            Ok(())
        }

        Some("reload") => {
            let r = ipc::client_request(serde_json::json!({"op":"reload"}))?;
            print_response(&r);
            Ok(())
        }

        Some("doctor") => {
            let r = ipc::client_request(serde_json::json!({"op":"doctor"}))?;
            print_response(&r);
            Ok(())
        }

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

/// Stream tracker frames from stdin to the daemon, one JSON object per
/// line: {"hands":[[{x,y,z}...]], "handedness":["Right"], "timestamp_ms":...}
fn run_feed() -> Result<()> {
    let sock = ipc::runtime::socket_path();
    if !sock.exists() {
        return Err(anyhow!(
            "gesturectl daemon is not running (socket missing at {})",
            sock.display()
        ));
    }
    let stream = UnixStream::connect(sock)?;
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);

    let stdin = std::io::stdin();
    let mut sent = 0u64;
    let mut resp = String::new();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut frame: serde_json::Value = serde_json::from_str(&line)
            .map_err(|e| anyhow!("bad tracker line: {e}"))?;
        if !frame.is_object() {
            return Err(anyhow!("tracker line must be a JSON object"));
        }
        frame["op"] = serde_json::Value::from("frame");
        write!(writer, "{}\n", frame)?;

        resp.clear();
        reader.read_line(&mut resp)?;
        sent += 1;
    }
    println!("feed finished: {sent} frames forwarded");
    Ok(())
}

fn print_help() {
    println!(
        r#"gesturectl — hand-gesture capture, practice and recognition daemon

USAGE:
  gesturectl help [command]            Show general or command-specific help
  gesturectl start                     Start the daemon
  gesturectl stop                      Stop the daemon
  gesturectl status                    Show daemon and engine state
  gesturectl list                      List saved gestures
  gesturectl delete <id|name>          Delete one gesture
  gesturectl clear-all                 Delete every gesture
  gesturectl export [file.json]        Write the gesture dataset to a file
  gesturectl import <file> [--replace] Import a dataset (default: merge)
  gesturectl record <name>             Start recording a gesture sequence
  gesturectl capture                   Capture the current frame into it
  gesturectl finish                    Save the recorded sequence
  gesturectl cancel                    Abandon the recorded sequence
  gesturectl practice <id|name>        Start practicing a gesture
  gesturectl practice-stop             Stop practicing
  gesturectl recognize                 Start recognition mode
  gesturectl recognize-stop            Stop recognition mode
  gesturectl feed                      Stream tracker frames from stdin
  gesturectl use <name>                Switch active profile
  gesturectl profiles                  List profiles
  gesturectl reload                    Reload active profile
  gesturectl doctor                    Diagnose config, store and socket

TIPS:
  - Profiles: ~/.config/gesturectl/profiles
  - Gesture store: ~/.local/share/gesturectl/gestures.json
  - Pipe your hand tracker's JSON lines into `gesturectl feed`
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "start" => println!("usage: gesturectl start\nStarts the background daemon."),
        "stop" => println!("usage: gesturectl stop\nStops the running daemon."),
        "status" => println!(
            "usage: gesturectl status\nShows recording/practice/recognition state and library totals."
        ),
        "list" => println!("usage: gesturectl list\nLists saved gestures with frame counts."),
        "delete" => println!("usage: gesturectl delete <id|name>\nRemoves one gesture and saves."),
        "clear-all" => println!("usage: gesturectl clear-all\nRemoves every gesture and saves."),
        "export" => println!(
            "usage: gesturectl export [file.json]\nWrites the dataset document; default name is dated."
        ),
        "import" => println!(
            "usage: gesturectl import <file.json> [--replace]\nMerge overwrites same-name gestures; --replace discards the library first."
        ),
        "record" => println!(
            "usage: gesturectl record <name>\nStarts a capture sequence; follow with `capture` and `finish`."
        ),
        "capture" => println!(
            "usage: gesturectl capture\nCaptures the tracker's current frame into the open sequence."
        ),
        "finish" => println!(
            "usage: gesturectl finish\nSaves the open sequence as a gesture; reports consistency findings."
        ),
        "cancel" => println!("usage: gesturectl cancel\nDiscards the open sequence."),
        "practice" => println!(
            "usage: gesturectl practice <id|name>\nStep through the gesture's frames; watch the daemon log."
        ),
        "practice-stop" => println!("usage: gesturectl practice-stop\nDiscards the practice session."),
        "recognize" => println!(
            "usage: gesturectl recognize\nMatches incoming frames against the library; watch the daemon log."
        ),
        "recognize-stop" => println!("usage: gesturectl recognize-stop\nLeaves recognition mode."),
        "feed" => println!(
            "usage: <tracker> | gesturectl feed\nForwards JSON frame lines to the daemon until EOF."
        ),
        "use" => println!("usage: gesturectl use <name>\nSwitches active profile to <name> and reloads."),
        "profiles" => println!("usage: gesturectl profiles\nLists available profiles; shows the active one."),
        "reload" => println!("usage: gesturectl reload\nReloads the current profile."),
        "doctor" => println!("usage: gesturectl doctor\nChecks profiles, gesture store and daemon socket."),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}

fn print_response(v: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(v).unwrap_or_default());
}
