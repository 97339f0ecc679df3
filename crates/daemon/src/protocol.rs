// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-socket protocol: requests, responses, and the run envelope.
//!
//! One request per connection, one response back — except `Watch`, where the
//! daemon keeps the connection open and streams `Runs` envelopes as run
//! state changes.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tempo_core::{
    Job, JobId, ProgramSpec, Run, RunAction, RunError, RunId, RunState, Timestamp,
};

/// Protocol version (from Cargo.toml).
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Request from a client to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// Health check ping
    Ping,

    /// Version handshake
    Hello { version: String },

    /// List the job catalogue
    Jobs,

    /// Fetch one job
    Job { job_id: JobId },

    /// Query runs; all filters are conjunctive
    Runs {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        job_id: Option<JobId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        run_id: Option<RunId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        since: Option<Timestamp>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        until: Option<Timestamp>,
    },

    /// Fetch one run as an envelope
    Run { run_id: RunId },

    /// Raw captured output bytes of a run
    Output { run_id: RunId },

    /// Just the state of a run
    State { run_id: RunId },

    /// Cancel a SCHEDULED run
    Cancel { run_id: RunId },

    /// Start a SCHEDULED run immediately
    Start { run_id: RunId },

    /// Create a new run for the instance of a terminal run
    Rerun { run_id: RunId },

    /// Materialise a run: schedule `program` under `job_id` (generated when
    /// absent) at `time` (now when absent)
    Schedule {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        job_id: Option<JobId>,
        program: ProgramSpec,
        #[serde(default)]
        args: BTreeMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time: Option<Timestamp>,
    },

    /// Subscribe to the live run feed; the connection turns into a stream
    /// of `Runs` envelopes
    Watch {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        job_id: Option<JobId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        run_id: Option<RunId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        since: Option<Timestamp>,
    },

    /// Request daemon shutdown
    Shutdown,
}

/// One run as shown to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunEntry {
    pub run_id: RunId,
    pub job_id: JobId,
    pub inst_id: String,
    #[serde(default)]
    pub args: BTreeMap<String, String>,
    pub number: u32,
    pub state: RunState,
    pub times: BTreeMap<RunState, Timestamp>,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
    /// Operations valid right now (cancel / start / retry).
    #[serde(default)]
    pub actions: Vec<RunAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_len: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
}

impl RunEntry {
    /// Project a run into its client view. `highest` is whether the run is
    /// the highest-numbered of its instance (gates the retry action).
    pub fn from_run(run: &Run, highest: bool) -> Self {
        Self {
            run_id: run.run_id.clone(),
            job_id: run.inst.job_id.clone(),
            inst_id: run.inst.inst_id.to_string(),
            args: run.inst.args.clone(),
            number: run.number,
            state: run.state,
            times: run.times.clone(),
            meta: run.meta.clone(),
            actions: run.actions(highest),
            output_len: run.output_len(),
            error: run.error.clone(),
        }
    }
}

/// `{when, runs: {run_id: …}}` — the shape every run query and every live
/// feed frame shares.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunEnvelope {
    pub when: Timestamp,
    pub runs: HashMap<String, RunEntry>,
}

impl RunEnvelope {
    pub fn new(when: Timestamp, entries: impl IntoIterator<Item = RunEntry>) -> Self {
        Self {
            when,
            runs: entries
                .into_iter()
                .map(|e| (e.run_id.to_string(), e))
                .collect(),
        }
    }
}

/// Response from the daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Response {
    /// Generic success
    Ok,

    /// Health check response
    Pong,

    /// Version handshake response
    Hello { version: String },

    /// Job catalogue
    Jobs { jobs: Vec<Job> },

    /// Single job
    Job { job: Option<Box<Job>> },

    /// Runs envelope (queries, schedule/rerun results, watch frames)
    Runs { envelope: RunEnvelope },

    /// State of one run
    State { state: RunState },

    /// Raw captured output
    Output { bytes: Vec<u8> },

    /// Operation requested in an incompatible state (409-equivalent)
    Conflict {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        state: Option<RunState>,
    },

    /// Anything else that went wrong
    Error { message: String },

    /// Daemon is shutting down
    ShuttingDown,
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
