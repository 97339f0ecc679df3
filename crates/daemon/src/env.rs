// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment-variable overrides for daemon settings.

use std::path::PathBuf;
use std::time::Duration;

/// `TEMPO_STATE_DIR` overrides the state directory.
pub fn state_dir() -> Option<PathBuf> {
    std::env::var_os("TEMPO_STATE_DIR").map(PathBuf::from)
}

/// `TEMPO_LOOP_MS` overrides the dispatch loop time cap, in milliseconds.
pub fn loop_time() -> Option<Duration> {
    std::env::var("TEMPO_LOOP_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
}
