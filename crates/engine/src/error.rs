// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the engine runtime

use tempo_core::{RunId, RunState};
use thiserror::Error;

/// Errors raised by the process launcher.
///
/// Exec-time failures arrive through the child's error pipe and are mapped
/// back to a typed error here, so callers can tell an absent executable from
/// an absent working directory from a plain launch bug.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Environment keys may not contain `=`; rejected before forking.
    #[error("illegal environment variable name: {key:?}")]
    IllegalEnvKey { key: String },

    /// Argument or environment string contained an interior NUL.
    #[error("argument contains NUL byte")]
    NulByte(#[from] std::ffi::NulError),

    /// ENOENT from exec or chdir. The message names the path at fault: the
    /// working directory when the `noexec` marker was present, the
    /// executable otherwise.
    #[error("No such file or directory: {path:?}")]
    FileNotFound { path: String },

    /// EACCES: the executable could not be run.
    #[error("Permission denied: {path:?}")]
    PermissionDenied { path: String },

    /// Any other errno reported by the child before exec.
    #[error("{message} (errno {errno})")]
    Os { errno: i32, message: String },

    /// pipe/fork failed in the parent.
    #[error("fork-exec failed: {0}")]
    Sys(nix::errno::Errno),

    /// The error-pipe record could not be parsed (or exceeded the size cap).
    #[error("bad exec error record from child: {raw:?}")]
    BadErrorRecord { raw: String },

    /// Reading the error pipe failed.
    #[error("error pipe read failed: {0}")]
    Pipe(#[from] std::io::Error),
}

impl LaunchError {
    /// Short machine-readable kind, recorded on runs that end in ERROR.
    pub fn kind(&self) -> &'static str {
        match self {
            LaunchError::IllegalEnvKey { .. } => "illegal_env_key",
            LaunchError::NulByte(_) => "nul_byte",
            LaunchError::FileNotFound { .. } => "file_not_found",
            LaunchError::PermissionDenied { .. } => "permission_denied",
            LaunchError::Os { .. } => "os_error",
            LaunchError::Sys(_) => "fork_exec",
            LaunchError::BadErrorRecord { .. } => "bad_error_record",
            LaunchError::Pipe(_) => "error_pipe",
        }
    }
}

/// Operator-facing errors from the supervisor: an operation was requested in
/// an incompatible state. These map to conflict responses, never to crashes.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("run not found: {0}")]
    UnknownRun(RunId),

    #[error("invalid run state for start/cancel: {state}")]
    NotScheduled { state: RunState },

    #[error("run has no process (state: {state})")]
    NotRunning { state: RunState },

    #[error("invalid run state for rerun: {state}")]
    NotRerunnable { state: RunState },

    #[error("rerun only allowed for the highest-numbered run of an instance")]
    NotHighest,

    #[error("signal delivery failed: {0}")]
    Kill(nix::errno::Errno),
}

impl SupervisorError {
    /// The observed run state, when the error is a state conflict.
    pub fn state(&self) -> Option<RunState> {
        match self {
            SupervisorError::NotScheduled { state }
            | SupervisorError::NotRunning { state }
            | SupervisorError::NotRerunnable { state } => Some(*state),
            _ => None,
        }
    }
}
