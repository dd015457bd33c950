//! Daemon runtime paths.

use directories::UserDirs;
use std::{fs, path::PathBuf};

pub fn runtime_dir() -> PathBuf {
    let home = UserDirs::new().unwrap().home_dir().to_path_buf();
    let dir = home.join(".local").join("run");
    let _ = fs::create_dir_all(&dir);
    dir
}

pub fn socket_path() -> PathBuf {
    runtime_dir().join("gesturectl.sock")
}

/// Socket path with any stale file from a previous daemon run removed.
pub fn claim_socket() -> PathBuf {
    let sock = socket_path();
    if sock.exists() {
        let _ = fs::remove_file(&sock);
    }
    sock
}
