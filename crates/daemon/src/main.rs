// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! tempo daemon (tempod)
//!
//! Background process that schedules runs against the wall clock, spawns
//! their programs, and supervises the children.
//!
//! Architecture:
//! - Listener task: socket I/O, spawned per connection
//! - Supervisor loop: main task processing control messages, SIGCHLD, and
//!   the dispatch timer sequentially

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, Notify};
use tracing::{error, info};

use tempo_daemon::lifecycle::{self, Config, LifecycleError};
use tempo_daemon::listener::{ListenCtx, Listener};
use tempo_daemon::service::{Daemon, Shared};
use tempo_daemon::{env, PROTOCOL_VERSION};
use tempo_engine::DEFAULT_LOOP_TIME;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle info flags before any config/lock acquisition
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("tempod {PROTOCOL_VERSION}");
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("tempod {PROTOCOL_VERSION}");
                println!("tempo daemon - schedules runs and supervises their processes");
                println!();
                println!("USAGE:");
                println!("    tempod");
                println!();
                println!("The daemon is typically started by the `tempo` CLI and should");
                println!("not be invoked directly. It listens on a Unix socket for");
                println!("commands from `tempo`.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: tempod [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load()?;

    rotate_log_if_needed(&config.log_path);
    let log_guard = setup_logging(&config)?;

    info!("starting daemon");

    let startup = match lifecycle::startup(&config) {
        Ok(r) => r,
        Err(LifecycleError::LockFailed(_)) => {
            let pid = std::fs::read_to_string(&config.lock_path)
                .unwrap_or_default()
                .trim()
                .to_string();
            eprintln!("tempod is already running");
            if !pid.is_empty() {
                eprintln!("  pid: {pid}");
            }
            std::process::exit(1);
        }
        Err(e) => {
            error!("failed to start daemon: {e}");
            drop(log_guard);
            return Err(e.into());
        }
    };
    // Held for the process lifetime.
    let _lock_file = startup.lock_file;

    let shared = Shared::new();
    let shutdown_notify = Arc::new(Notify::new());
    let (control_tx, mut control_rx) = mpsc::channel(64);

    // Spawn listener task
    let ctx = Arc::new(ListenCtx {
        shared: Arc::clone(&shared),
        control: control_tx,
        shutdown: Arc::clone(&shutdown_notify),
    });
    tokio::spawn(Listener::new(startup.listener, ctx).run());

    // Signal handlers: child-death drives reaping, term/int drive shutdown.
    let mut sigchld = signal(SignalKind::child())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let loop_time = env::loop_time().unwrap_or(DEFAULT_LOOP_TIME);
    let mut daemon = Daemon::new(
        Arc::clone(&shared),
        config.workspaces_path.clone(),
        loop_time,
    );

    info!(socket = %config.socket_path.display(), "daemon ready");
    println!("READY");

    // Supervisor loop. The sleep is capped at loop_time so dispatch stays
    // anchored to the wall clock even if the runtime's clock drifts (e.g.
    // across a system suspend).
    loop {
        let sleep_for = daemon.sleep_for();
        tokio::select! {
            Some(msg) = control_rx.recv() => {
                daemon.handle_control(msg);
            }

            _ = sigchld.recv() => {
                daemon.drain();
            }

            _ = shutdown_notify.notified() => {
                info!("shutdown requested via command");
                break;
            }

            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down...");
                break;
            }

            _ = sigint.recv() => {
                info!("received SIGINT, shutting down...");
                break;
            }

            _ = tokio::time::sleep(sleep_for) => {
                daemon.dispatch_due();
            }
        }
    }

    daemon.shutdown().await;
    let _ = std::fs::remove_file(&config.socket_path);
    info!("daemon stopped");
    Ok(())
}

/// Maximum log file size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep (daemon.log.1, .2, .3).
const MAX_ROTATED_LOGS: u32 = 3;

/// Rotate the daemon log file if it exceeds [`MAX_LOG_SIZE`].
///
/// Shifts `daemon.log` -> `daemon.log.1` -> `daemon.log.2` -> `daemon.log.3`,
/// deleting the oldest. Best-effort: rotation failures are silently ignored
/// so the daemon still starts.
fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };

    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();

    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file_appender = tracing_appender::rolling::never(
        config.log_path.parent().ok_or(LifecycleError::NoStateDir)?,
        config
            .log_path
            .file_name()
            .ok_or(LifecycleError::NoStateDir)?,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
