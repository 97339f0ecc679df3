// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration and startup.
//!
//! One daemon per user, enforced with a file lock; fixed paths under
//! `$XDG_STATE_HOME/tempo` (or `~/.local/state/tempo`), overridable with
//! `TEMPO_STATE_DIR`.

use fs2::FileExt;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;
use tokio::net::UnixListener;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("could not determine state directory")]
    NoStateDir,

    #[error("another daemon holds the lock")]
    LockFailed(#[source] std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Daemon path configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (e.g. ~/.local/state/tempo)
    pub state_dir: PathBuf,
    /// Path to Unix socket
    pub socket_path: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Path to daemon log file
    pub log_path: PathBuf,
    /// Path to per-run workspace directories
    pub workspaces_path: PathBuf,
}

impl Config {
    /// Load configuration for the user-level daemon.
    pub fn load() -> Result<Self, LifecycleError> {
        let state_dir = state_dir()?;
        Ok(Self {
            socket_path: state_dir.join("daemon.sock"),
            lock_path: state_dir.join("daemon.pid"),
            log_path: state_dir.join("daemon.log"),
            workspaces_path: state_dir.join("runs"),
            state_dir,
        })
    }
}

fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Some(dir) = crate::env::state_dir() {
        return Ok(dir);
    }
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .map(|d| d.join("tempo"))
        .ok_or(LifecycleError::NoStateDir)
}

/// Handles the daemon needs alive for its whole lifetime.
#[derive(Debug)]
pub struct StartupResult {
    /// Held for the process lifetime; dropping it releases the lock.
    pub lock_file: fs::File,
    pub listener: UnixListener,
}

/// Acquire the singleton lock and bind the control socket.
pub fn startup(config: &Config) -> Result<StartupResult, LifecycleError> {
    fs::create_dir_all(&config.state_dir)?;
    fs::create_dir_all(&config.workspaces_path)?;

    let mut lock_file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&config.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    // We hold the lock, so any existing socket is stale.
    if config.socket_path.exists() {
        fs::remove_file(&config.socket_path)?;
    }
    let listener = UnixListener::bind(&config.socket_path)?;

    Ok(StartupResult {
        lock_file,
        listener,
    })
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
