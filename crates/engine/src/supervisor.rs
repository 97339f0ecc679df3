// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Supervisor registry: run operations and child reaping.
//!
//! Owns the pid table and the per-run workspaces. All run-record mutation
//! funnels through here, on the single supervisor task; that is what keeps
//! live subscribers seeing transitions in order.

use crate::error::{LaunchError, SupervisorError};
use crate::launch;
use crate::schedule::ScheduledRuns;
use crate::status;
use crate::store::RunStore;
use crate::workspace::RunDir;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::collections::{BTreeMap, HashMap};
use std::os::fd::AsRawFd;
use std::path::PathBuf;
use tempo_core::{
    Clock, IdMint, Instance, JobId, Program, Run, RunError, RunId, RunState, Timestamp, UuidMint,
};

/// Why a start attempt never produced a running child.
#[derive(Debug)]
enum StartFailure {
    Launch(LaunchError),
    Workspace(std::io::Error),
}

impl StartFailure {
    fn kind(&self) -> &'static str {
        match self {
            StartFailure::Launch(e) => e.kind(),
            StartFailure::Workspace(_) => "workspace",
        }
    }

    fn message(&self) -> String {
        match self {
            StartFailure::Launch(e) => e.to_string(),
            StartFailure::Workspace(e) => e.to_string(),
        }
    }
}

/// Drives runs through their lifecycle and reaps their children.
pub struct Supervisor<C: Clock, M: IdMint = UuidMint> {
    clock: C,
    ids: M,
    workspaces_root: PathBuf,
    /// pid -> run, exactly while the run is RUNNING.
    pids: HashMap<i32, RunId>,
    workspaces: HashMap<RunId, RunDir>,
}

impl<C: Clock, M: IdMint> Supervisor<C, M> {
    pub fn new(clock: C, ids: M, workspaces_root: PathBuf) -> Self {
        Self {
            clock,
            ids,
            workspaces_root,
            pids: HashMap::new(),
            workspaces: HashMap::new(),
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Number of pid mappings (== number of RUNNING runs).
    pub fn pid_count(&self) -> usize {
        self.pids.len()
    }

    /// Create a new run for a fresh instance, in SCHEDULED.
    pub fn new_run(
        &self,
        store: &mut RunStore,
        job_id: JobId,
        args: BTreeMap<String, String>,
        time: Timestamp,
        meta: BTreeMap<String, String>,
    ) -> Run {
        let inst = Instance {
            inst_id: self.ids.inst_id(),
            job_id,
            args,
            time,
        };
        let mut run = Run::new(self.ids.run_id(), inst, 0, self.clock.now());
        run.meta = meta;
        store.insert(run.clone(), self.clock.now());
        run
    }

    /// Park a SCHEDULED run in ERROR for a failure that happened before any
    /// child existed (e.g. an invalid or vanished program spec).
    pub fn fail(&self, store: &mut RunStore, run_id: &RunId, kind: &str, message: &str) {
        tracing::warn!(run_id = %run_id, kind, message, "run failed before start");
        let now = self.clock.now();
        if let Some(run) = store.get_mut(run_id) {
            advance_or_log(run, RunState::Error, now);
            run.error = Some(RunError {
                kind: kind.to_string(),
                message: message.to_string(),
            });
        }
        store.publish_run(run_id, now);
    }

    /// Start a SCHEDULED run: allocate its workspace, launch the program,
    /// record the pid.
    ///
    /// Launcher and workspace failures are recovered locally: the run is
    /// parked in ERROR with the failure recorded and the workspace cleaned.
    /// Only precondition violations surface as `Err`.
    pub fn start(
        &mut self,
        store: &mut RunStore,
        run_id: &RunId,
        program: &Program,
        stdin: Option<&[u8]>,
    ) -> Result<(), SupervisorError> {
        let run = store
            .get(run_id)
            .ok_or_else(|| SupervisorError::UnknownRun(run_id.clone()))?;
        if run.state != RunState::Scheduled {
            return Err(SupervisorError::NotScheduled { state: run.state });
        }

        let now = self.clock.now();
        let mut dir = match RunDir::create(&self.workspaces_root) {
            Ok(dir) => dir,
            Err(e) => {
                self.park_error(store, run_id, StartFailure::Workspace(e), now);
                return Ok(());
            }
        };

        tracing::info!(run_id = %run_id, argv = ?program.argv, dir = %dir.path().display(), "starting run");

        match launch_in_dir(&mut dir, program, stdin) {
            Ok(pid) => {
                if let Err(e) = dir.write_pid(pid.as_raw()) {
                    tracing::warn!(run_id = %run_id, error = %e, "pid file write failed");
                }
                if let Some(run) = store.get_mut(run_id) {
                    advance_or_log(run, RunState::Running, now);
                    run.pid = Some(pid.as_raw());
                }
                self.pids.insert(pid.as_raw(), run_id.clone());
                self.workspaces.insert(run_id.clone(), dir);
                store.publish_run(run_id, now);
                tracing::info!(run_id = %run_id, pid = pid.as_raw(), "run started");
            }
            Err(failure) => {
                tracing::warn!(run_id = %run_id, error = %failure.message(), "start error");
                dir.clean();
                self.park_error(store, run_id, failure, now);
            }
        }
        Ok(())
    }

    fn park_error(
        &self,
        store: &mut RunStore,
        run_id: &RunId,
        failure: StartFailure,
        now: Timestamp,
    ) {
        if let Some(run) = store.get_mut(run_id) {
            advance_or_log(run, RunState::Error, now);
            run.error = Some(RunError {
                kind: failure.kind().to_string(),
                message: failure.message(),
            });
        }
        store.publish_run(run_id, now);
    }

    /// Cancel a SCHEDULED run: remove it from the queue and mark CANCELLED.
    pub fn cancel(
        &mut self,
        store: &mut RunStore,
        queue: &mut ScheduledRuns,
        run_id: &RunId,
    ) -> Result<(), SupervisorError> {
        let run = store
            .get(run_id)
            .ok_or_else(|| SupervisorError::UnknownRun(run_id.clone()))?;
        if run.state != RunState::Scheduled {
            return Err(SupervisorError::NotScheduled { state: run.state });
        }

        let was_queued = queue.unschedule(run_id);
        tracing::info!(run_id = %run_id, was_queued, "run cancelled");
        let now = self.clock.now();
        if let Some(run) = store.get_mut(run_id) {
            advance_or_log(run, RunState::Cancelled, now);
        }
        store.publish_run(run_id, now);
        Ok(())
    }

    /// Deliver `sig` to a run's process.
    pub fn signal(
        &self,
        store: &RunStore,
        run_id: &RunId,
        sig: Signal,
    ) -> Result<(), SupervisorError> {
        let run = store
            .get(run_id)
            .ok_or_else(|| SupervisorError::UnknownRun(run_id.clone()))?;
        let pid = run
            .pid
            .ok_or(SupervisorError::NotRunning { state: run.state })?;
        tracing::info!(run_id = %run_id, pid, signal = %sig, "signalling child");
        kill(Pid::from_raw(pid), sig).map_err(SupervisorError::Kill)
    }

    /// Reap one terminated child, if any is ready. Never blocks.
    pub fn reap(&mut self, store: &mut RunStore) -> bool {
        let mut wait_status: libc::c_int = 0;
        // SAFETY: wait4 writes into the two out-params we hand it.
        let mut rusage: libc::rusage = unsafe { std::mem::zeroed() };
        let pid = unsafe {
            libc::wait4(
                -1,
                &mut wait_status,
                libc::WNOHANG | libc::WUNTRACED | libc::WCONTINUED,
                &mut rusage,
            )
        };

        if pid == 0 {
            return false;
        }
        if pid < 0 {
            let errno = Errno::last();
            if errno != Errno::ECHILD {
                tracing::warn!(errno = %errno, "wait4 failed");
            }
            return false;
        }

        tracing::info!(pid, status = wait_status, "reaped child");

        let Some(run_id) = self.pids.get(&pid).cloned() else {
            tracing::warn!(pid, "reaped unknown child pid");
            return true;
        };
        if !status::is_terminal(wait_status) {
            // WUNTRACED/WCONTINUED also report stops; those are not deaths.
            tracing::debug!(pid, status = wait_status, "child stopped or continued");
            return true;
        }
        self.pids.remove(&pid);

        let now = self.clock.now();
        let output = self
            .workspaces
            .get(&run_id)
            .and_then(|dir| dir.read_output().ok());
        if let Some(run) = store.get_mut(&run_id) {
            let end_state = if status::is_success(wait_status) {
                RunState::Success
            } else {
                RunState::Failure
            };
            advance_or_log(run, end_state, now);
            run.pid = None;
            run.status = Some(wait_status);
            run.rusage = Some(status::convert_rusage(&rusage));
            run.output = output;
        }
        // The run is terminal: release its workspace.
        if let Some(mut dir) = self.workspaces.remove(&run_id) {
            dir.clean();
        }
        store.publish_run(&run_id, now);
        true
    }

    /// Drain every reapable child. A SIGCHLD can coalesce multiple deaths,
    /// so looping until empty is mandatory.
    pub fn drain(&mut self, store: &mut RunStore) -> usize {
        let mut count = 0;
        while self.reap(store) {
            count += 1;
        }
        if count == 0 {
            tracing::info!("SIGCHLD but no child reaped");
        }
        count
    }

    /// Create a new run for the same instance as `run_id`.
    ///
    /// Allowed only when the source run is terminal (SUCCESS, FAILURE or
    /// ERROR) and is the highest-numbered run of its instance.
    pub fn rerun(&mut self, store: &mut RunStore, run_id: &RunId) -> Result<Run, SupervisorError> {
        let source = store
            .get(run_id)
            .ok_or_else(|| SupervisorError::UnknownRun(run_id.clone()))?;
        if !matches!(
            source.state,
            RunState::Success | RunState::Failure | RunState::Error
        ) {
            return Err(SupervisorError::NotRerunnable {
                state: source.state,
            });
        }
        if !store.is_highest(run_id) {
            return Err(SupervisorError::NotHighest);
        }

        let inst = source.inst.clone();
        let number = store.max_run_number(&inst.inst_id).unwrap_or(0) + 1;
        let now = self.clock.now();
        let run = Run::new(self.ids.run_id(), inst, number, now);
        tracing::info!(source = %run_id, rerun = %run.run_id, number, "rerun created");
        store.insert(run.clone(), now);
        Ok(run)
    }

    /// Deliver SIGTERM to every running child. The caller drains reap
    /// afterwards.
    pub fn shutdown(&mut self) {
        for (pid, run_id) in &self.pids {
            tracing::info!(run_id = %run_id, pid, "SIGTERM on shutdown");
            if let Err(e) = kill(Pid::from_raw(*pid), Signal::SIGTERM) {
                tracing::warn!(pid, error = %e, "shutdown signal failed");
            }
        }
    }
}

/// Acquire the workspace fds under scope and launch. The fds close when
/// this returns, success or not; the child holds its own copies.
fn launch_in_dir(
    dir: &mut RunDir,
    program: &Program,
    stdin: Option<&[u8]>,
) -> Result<Pid, StartFailure> {
    let stdin_fd = dir.stdin_fd(stdin).map_err(StartFailure::Workspace)?;
    let out = dir.open_out().map_err(StartFailure::Workspace)?;
    let stdin_raw = stdin_fd.as_ref().map(|fd| fd.as_raw_fd()).unwrap_or(-1);
    launch::launch(
        &program.argv,
        &program.cwd,
        Some(&program.env),
        stdin_raw,
        out.as_raw_fd(),
    )
    .map_err(StartFailure::Launch)
}

fn advance_or_log(run: &mut Run, to: RunState, now: Timestamp) {
    if let Err(e) = run.advance(to, now) {
        tracing::error!(run_id = %run.run_id, error = %e, "state transition rejected");
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
