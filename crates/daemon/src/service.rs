// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The supervisor loop's state and control handling.
//!
//! [`Daemon`] owns the scheduled-run queue and the process supervisor; the
//! main loop in `main.rs` drives it from a `select!` over control messages,
//! SIGCHLD, and the dispatch timer. Everything that mutates run state goes
//! through here, on one task.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempo_core::{
    Clock, IdMint, Job, JobId, ProgramSpec, RunId, RunState, SpecError, SystemClock, Timestamp,
    UuidMint,
};
use tempo_engine::{
    schedule::ScheduleOutcome, RunStore, ScheduledRuns, Supervisor, SupervisorError,
};
use thiserror::Error;
use tokio::sync::oneshot;

/// State shared between the supervisor loop and the listener.
///
/// The listener only ever takes these locks briefly, for snapshots; all
/// mutation happens on the supervisor loop.
pub struct Shared {
    pub store: Mutex<RunStore>,
    pub jobs: Mutex<HashMap<JobId, Job>>,
}

impl Shared {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            store: Mutex::new(RunStore::new()),
            jobs: Mutex::new(HashMap::new()),
        })
    }
}

/// Operator-facing operation failures; rendered as conflict responses.
#[derive(Debug, Error)]
pub enum OpError {
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error("invalid program spec: {0}")]
    Spec(#[from] SpecError),

    #[error("job not found: {0}")]
    UnknownJob(JobId),
}

impl OpError {
    /// The observed run state, for `{error, state}` conflict payloads.
    pub fn state(&self) -> Option<RunState> {
        match self {
            OpError::Supervisor(e) => e.state(),
            _ => None,
        }
    }
}

/// Mutations forwarded from the listener to the supervisor loop.
#[derive(Debug)]
pub enum Control {
    Schedule {
        job_id: Option<JobId>,
        program: ProgramSpec,
        args: BTreeMap<String, String>,
        /// None schedules for now (immediate dispatch).
        time: Option<Timestamp>,
        reply: oneshot::Sender<Result<RunId, OpError>>,
    },
    Cancel {
        run_id: RunId,
        reply: oneshot::Sender<Result<(), OpError>>,
    },
    Start {
        run_id: RunId,
        reply: oneshot::Sender<Result<(), OpError>>,
    },
    Rerun {
        run_id: RunId,
        reply: oneshot::Sender<Result<RunId, OpError>>,
    },
}

/// The supervisor loop's state.
pub struct Daemon {
    supervisor: Supervisor<SystemClock, UuidMint>,
    queue: ScheduledRuns,
    shared: Arc<Shared>,
    loop_time: Duration,
}

impl Daemon {
    pub fn new(shared: Arc<Shared>, workspaces_root: PathBuf, loop_time: Duration) -> Self {
        Self {
            supervisor: Supervisor::new(SystemClock, UuidMint, workspaces_root),
            queue: ScheduledRuns::new(),
            shared,
            loop_time,
        }
    }

    pub fn now(&self) -> Timestamp {
        self.supervisor.clock().now()
    }

    /// How long the main loop may sleep before the next dispatch pass.
    pub fn sleep_for(&self) -> Duration {
        self.queue.sleep_for(self.now(), self.loop_time)
    }

    pub fn pid_count(&self) -> usize {
        self.supervisor.pid_count()
    }

    pub fn handle_control(&mut self, msg: Control) {
        match msg {
            Control::Schedule {
                job_id,
                program,
                args,
                time,
                reply,
            } => {
                let _ = reply.send(self.schedule(job_id, program, args, time));
            }
            Control::Cancel { run_id, reply } => {
                let _ = reply.send(self.cancel(&run_id));
            }
            Control::Start { run_id, reply } => {
                let _ = reply.send(self.start_now(&run_id));
            }
            Control::Rerun { run_id, reply } => {
                let _ = reply.send(self.rerun(&run_id));
            }
        }
    }

    /// Start every run whose scheduled instant has arrived.
    pub fn dispatch_due(&mut self) {
        let now = self.now();
        for run_id in self.queue.pop_due(now) {
            // Never start a run that is no longer SCHEDULED: cancellation
            // racing dispatch resolves to cancellation.
            let state = self.shared.store.lock().get(&run_id).map(|r| r.state);
            if state != Some(RunState::Scheduled) {
                tracing::debug!(run_id = %run_id, ?state, "skipping dispatch");
                continue;
            }
            if let Err(e) = self.start_run(&run_id) {
                tracing::warn!(run_id = %run_id, error = %e, "dispatch failed");
            }
        }
    }

    /// Reap every child the OS has ready. Runs on SIGCHLD.
    pub fn drain(&mut self) {
        let mut store = self.shared.store.lock();
        self.supervisor.drain(&mut store);
    }

    /// SIGTERM all running children, then reap them (bounded wait).
    pub async fn shutdown(&mut self) {
        self.supervisor.shutdown();
        for _ in 0..100 {
            if self.pid_count() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            let mut store = self.shared.store.lock();
            while self.supervisor.reap(&mut store) {}
        }
        tracing::warn!(
            remaining = self.pid_count(),
            "children still running at shutdown"
        );
    }

    fn schedule(
        &mut self,
        job_id: Option<JobId>,
        program: ProgramSpec,
        args: BTreeMap<String, String>,
        time: Option<Timestamp>,
    ) -> Result<RunId, OpError> {
        // Spec errors fail here, before any run or workspace exists.
        program.resolve()?;

        let job_id = job_id.unwrap_or_else(|| UuidMint.adhoc_job_id());
        {
            let mut jobs = self.shared.jobs.lock();
            jobs.entry(job_id.clone()).or_insert_with(|| {
                let mut job = Job::new(job_id.clone(), program.clone());
                job.schedule = "adhoc".to_string();
                job
            });
        }

        let now = self.now();
        let time = time.unwrap_or(now);
        let run_id = {
            let mut store = self.shared.store.lock();
            self.supervisor
                .new_run(&mut store, job_id, args, time, run_meta())
                .run_id
        };

        match self.queue.schedule(time, &run_id, now) {
            ScheduleOutcome::Dispatch => {
                tracing::info!(run_id = %run_id, time = %time, "run immediately");
                self.start_run(&run_id)?;
            }
            ScheduleOutcome::Queued => {
                tracing::info!(run_id = %run_id, time = %time, "schedule");
            }
        }
        Ok(run_id)
    }

    /// Launch a SCHEDULED run via its job's program.
    ///
    /// A missing job or a spec that no longer resolves parks the run in
    /// ERROR; only state conflicts surface to the caller.
    fn start_run(&mut self, run_id: &RunId) -> Result<(), OpError> {
        let job_id = {
            let store = self.shared.store.lock();
            match store.get(run_id) {
                Some(run) => run.inst.job_id.clone(),
                None => return Err(SupervisorError::UnknownRun(run_id.clone()).into()),
            }
        };
        let spec = self.shared.jobs.lock().get(&job_id).map(|j| j.program.clone());
        let mut store = self.shared.store.lock();
        let program = match spec {
            Some(spec) => match spec.resolve() {
                Ok(program) => program,
                Err(e) => {
                    self.supervisor
                        .fail(&mut store, run_id, "program_spec", &e.to_string());
                    return Ok(());
                }
            },
            None => {
                let message = format!("job not found: {job_id}");
                self.supervisor.fail(&mut store, run_id, "unknown_job", &message);
                return Ok(());
            }
        };
        self.supervisor
            .start(&mut store, run_id, &program, None)
            .map_err(OpError::from)
    }

    fn start_now(&mut self, run_id: &RunId) -> Result<(), OpError> {
        // Pull it out of the queue first so the dispatch loop cannot start
        // it a second time.
        self.queue.unschedule(run_id);
        self.start_run(run_id)
    }

    fn cancel(&mut self, run_id: &RunId) -> Result<(), OpError> {
        let mut store = self.shared.store.lock();
        self.supervisor
            .cancel(&mut store, &mut self.queue, run_id)
            .map_err(OpError::from)
    }

    fn rerun(&mut self, run_id: &RunId) -> Result<RunId, OpError> {
        let new_run_id = {
            let mut store = self.shared.store.lock();
            self.supervisor.rerun(&mut store, run_id)?.run_id
        };
        // A rerun is scheduled at now: dispatch it straight away.
        self.start_run(&new_run_id)?;
        Ok(new_run_id)
    }
}

/// Display metadata stamped on new runs.
fn run_meta() -> BTreeMap<String, String> {
    let mut meta = BTreeMap::new();
    if let Ok(host) = nix::unistd::gethostname() {
        meta.insert("host".to_string(), host.to_string_lossy().into_owned());
    }
    if let Ok(user) = std::env::var("USER") {
        meta.insert("user".to_string(), user);
    }
    meta
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
