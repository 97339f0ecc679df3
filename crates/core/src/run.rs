// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The run record and its state machine.
//!
//! A run is one attempt to execute the program of one job instance at one
//! scheduled time. Reruns of the same instance share its [`InstId`] and get
//! increasing run numbers.

use crate::clock::Timestamp;
use crate::ids::{InstId, JobId, RunId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A job instance: what a run executes, and when it was meant to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub inst_id: InstId,
    pub job_id: JobId,
    #[serde(default)]
    pub args: BTreeMap<String, String>,
    /// Scheduled wall-clock time of the instance.
    pub time: Timestamp,
}

/// States a run passes through.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Waiting in the scheduled-run queue.
    Scheduled,
    /// Child process started and not yet reaped.
    Running,
    /// Reaped with a normal zero exit.
    Success,
    /// Reaped after a non-zero exit or a fatal signal.
    Failure,
    /// The start itself failed; no child is running.
    Error,
    /// Unscheduled before dispatch.
    Cancelled,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Success | RunState::Failure | RunState::Error | RunState::Cancelled
        )
    }

    /// Legal transitions out of each state.
    fn can_advance_to(&self, to: RunState) -> bool {
        matches!(
            (self, to),
            (RunState::Scheduled, RunState::Running)
                | (RunState::Scheduled, RunState::Cancelled)
                | (RunState::Scheduled, RunState::Error)
                | (RunState::Running, RunState::Success)
                | (RunState::Running, RunState::Failure)
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Scheduled => write!(f, "scheduled"),
            RunState::Running => write!(f, "running"),
            RunState::Success => write!(f, "success"),
            RunState::Failure => write!(f, "failure"),
            RunState::Error => write!(f, "error"),
            RunState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Rejected state transition. Carries the observed state so control surfaces
/// can answer with a conflict (`{error, state}`) instead of crashing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal run transition {from} -> {to}")]
pub struct TransitionError {
    pub from: RunState,
    pub to: RunState,
}

/// Error record attached to a run that entered [`RunState::Error`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    /// Short machine-readable kind, e.g. `file_not_found`.
    pub kind: String,
    pub message: String,
}

/// Resource usage captured when a run's child is reaped.
///
/// Times are in seconds, rounded to 9 decimals to avoid noise from the
/// microsecond conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ResourceUsage {
    pub ru_utime: f64,
    pub ru_stime: f64,
    pub ru_maxrss: i64,
    pub ru_minflt: i64,
    pub ru_majflt: i64,
    pub ru_inblock: i64,
    pub ru_oublock: i64,
    pub ru_nvcsw: i64,
    pub ru_nivcsw: i64,
}

/// Round a seconds value to 9 decimals.
pub fn round_seconds(v: f64) -> f64 {
    (v * 1e9).round() / 1e9
}

/// Operations a control surface may offer on a run in its current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunAction {
    Cancel,
    Start,
    Retry,
}

impl fmt::Display for RunAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunAction::Cancel => write!(f, "cancel"),
            RunAction::Start => write!(f, "start"),
            RunAction::Retry => write!(f, "retry"),
        }
    }
}

/// One attempt to execute a job instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub run_id: RunId,
    pub inst: Instance,
    /// Monotone per-instance counter; reruns increment.
    pub number: u32,
    pub state: RunState,
    /// Entry instant of every state the run has occupied.
    pub times: BTreeMap<RunState, Timestamp>,
    /// OS pid while running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<i32>,
    /// Raw wait status, set at reap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rusage: Option<ResourceUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
    /// Merged stdout+stderr bytes, available once the run leaves RUNNING.
    #[serde(skip)]
    pub output: Option<Vec<u8>>,
    /// Free-form display metadata (host, user).
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

impl Run {
    /// Create a run in SCHEDULED at `now`.
    pub fn new(run_id: RunId, inst: Instance, number: u32, now: Timestamp) -> Self {
        let mut times = BTreeMap::new();
        times.insert(RunState::Scheduled, now);
        Self {
            run_id,
            inst,
            number,
            state: RunState::Scheduled,
            times,
            pid: None,
            status: None,
            rusage: None,
            error: None,
            output: None,
            meta: BTreeMap::new(),
        }
    }

    /// Advance to `to`, stamping its entry time.
    pub fn advance(&mut self, to: RunState, now: Timestamp) -> Result<(), TransitionError> {
        if !self.state.can_advance_to(to) {
            return Err(TransitionError {
                from: self.state,
                to,
            });
        }
        self.state = to;
        self.times.insert(to, now);
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Actions available in the current state. `highest` is whether this is
    /// the highest-numbered run of its instance.
    pub fn actions(&self, highest: bool) -> Vec<RunAction> {
        match self.state {
            RunState::Scheduled => vec![RunAction::Cancel, RunAction::Start],
            RunState::Failure | RunState::Error if highest => vec![RunAction::Retry],
            _ => vec![],
        }
    }

    pub fn output_len(&self) -> Option<usize> {
        self.output.as_ref().map(Vec::len)
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
