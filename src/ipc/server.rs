use anyhow::{Result, anyhow};
use log::{error, info};
use notify::{RecursiveMode, Watcher};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::{
    fs,
    io::{BufRead, BufReader, Write},
    os::unix::net::{UnixListener, UnixStream},
    sync::mpsc::{self, Sender},
    thread,
    time::Duration,
};

use super::dispatch::{self, Op};
use super::pipeline::{EngineSystem, Request};
use crate::config::DaemonConfigState;
use crate::store::JsonFileStore;

/// Engine-side happenings surfaced into the daemon log.
pub enum DaemonEvent {
    Log(String),
}

enum Ctl {
    Shutdown,
}

pub fn run_daemon() -> Result<()> {
    // socket
    let sock = super::runtime::claim_socket();
    let listener = UnixListener::bind(&sock)?;
    info!("daemon: listening on {}", sock.display());

    // config + engine state
    let cfg = DaemonConfigState::load_or_install_default()?;
    info!("daemon: active profile '{}'", cfg.active_name);
    let profiles_dir = cfg.profiles_dir.clone();

    // channels
    let (tx_cmd, rx_cmd) = mpsc::channel::<Request>();
    let (tx_evt, rx_evt) = mpsc::channel::<DaemonEvent>();
    let (tx_ctl, rx_ctl) = mpsc::channel::<Ctl>();

    // engine thread: sole owner of library, recorder and sessions
    let system = EngineSystem::new(cfg, JsonFileStore::at_default_location(), tx_evt)?;
    let _engine = thread::spawn(move || system.run(rx_cmd));

    // profile hot-reload
    let tx_reload = tx_cmd.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if let Ok(event) = res {
            if event.kind.is_modify() || event.kind.is_create() {
                let _ = tx_reload.send(Request::fire(Op::Reload));
            }
        }
    })?;
    watcher.watch(&profiles_dir, RecursiveMode::NonRecursive)?;

    // clean exit on SIGINT/SIGTERM
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    {
        let tx = tx_ctl.clone();
        thread::spawn(move || {
            if signals.forever().next().is_some() {
                let _ = tx.send(Ctl::Shutdown);
            }
        });
    }

    // accept loop
    listener.set_nonblocking(true)?;
    loop {
        match listener.accept() {
            Ok((stream, _)) => {
                let tx = tx_cmd.clone();
                let ctl = tx_ctl.clone();
                thread::spawn(move || {
                    if let Err(e) = handle_client(stream, tx, ctl) {
                        error!("ipc client error: {e}");
                    }
                });
            }
            Err(_) => {}
        }

        while let Ok(DaemonEvent::Log(s)) = rx_evt.try_recv() {
            info!("[engine] {s}");
        }

        if let Ok(Ctl::Shutdown) = rx_ctl.try_recv() {
            info!("daemon: shutting down");
            break;
        }

        thread::sleep(Duration::from_millis(5));
    }

    let _ = fs::remove_file(&sock);
    Ok(())
}

/// One connection: a line of JSON in, a line of JSON out, repeated until
/// the client hangs up (tracker feeds keep a connection open and stream
/// frame ops down it).
fn handle_client(stream: UnixStream, tx_cmd: Sender<Request>, tx_ctl: Sender<Ctl>) -> Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(()); // EOF
        }
        if line.trim().is_empty() {
            continue;
        }

        let req: serde_json::Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                write!(
                    writer,
                    "{}\n",
                    serde_json::json!({"ok": false, "error": format!("bad request: {e}")})
                )?;
                continue;
            }
        };

        let op = match dispatch::parse_request(&req) {
            Ok(op) => op,
            Err(e) => {
                write!(
                    writer,
                    "{}\n",
                    serde_json::json!({"ok": false, "error": e.to_string()})
                )?;
                continue;
            }
        };

        if matches!(op, Op::Shutdown) {
            let _ = tx_ctl.send(Ctl::Shutdown);
            write!(
                writer,
                "{}\n",
                serde_json::json!({"ok": true, "data": "shutting down"})
            )?;
            return Ok(());
        }

        let (tx_reply, rx_reply) = mpsc::channel();
        tx_cmd
            .send(Request {
                op,
                reply: Some(tx_reply),
            })
            .map_err(|_| anyhow!("engine thread is gone"))?;
        let resp = rx_reply
            .recv_timeout(Duration::from_secs(5))
            .unwrap_or_else(|_| serde_json::json!({"ok": false, "error": "engine timed out"}));

        write!(writer, "{}\n", resp)?;
    }
}
