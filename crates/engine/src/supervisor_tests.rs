// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::schedule::{ScheduleOutcome, DEFAULT_LOOP_TIME};
use crate::status::{exit_code, signal_name};
use serial_test::serial;
use std::time::Duration;
use tempo_core::{CountingMint, SystemClock};

type TestSupervisor = Supervisor<SystemClock, CountingMint>;

fn supervisor(root: &std::path::Path) -> TestSupervisor {
    Supervisor::new(SystemClock, CountingMint::new(), root.join("workspaces"))
}

fn program(argv: &[&str]) -> Program {
    Program {
        argv: argv.iter().map(|s| s.to_string()).collect(),
        cwd: "/".into(),
        env: BTreeMap::new(),
        combine_stderr: false,
    }
}

fn scheduled_run(sup: &TestSupervisor, store: &mut RunStore) -> RunId {
    let run = sup.new_run(
        store,
        JobId::new("job-x"),
        BTreeMap::new(),
        sup.clock().now(),
        BTreeMap::new(),
    );
    run.run_id
}

/// Poll reap until the run leaves RUNNING (its own child only; other
/// leftovers just get logged).
fn wait_terminal(sup: &mut TestSupervisor, store: &mut RunStore, run_id: &RunId) {
    for _ in 0..1_000 {
        sup.reap(store);
        if store.get(run_id).map(|r| r.is_terminal()) == Some(true) {
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    panic!("run {run_id} did not reach a terminal state");
}

fn leftover_workspaces(root: &std::path::Path) -> usize {
    match std::fs::read_dir(root.join("workspaces")) {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    }
}

#[test]
#[serial]
fn start_and_reap_success() {
    let tmp = tempfile::tempdir().unwrap();
    let mut sup = supervisor(tmp.path());
    let mut store = RunStore::new();
    let run_id = scheduled_run(&sup, &mut store);

    sup.start(&mut store, &run_id, &program(&["/bin/true"]), None)
        .unwrap();
    {
        let run = store.get(&run_id).unwrap();
        assert_eq!(run.state, RunState::Running);
        assert!(run.pid.is_some());
    }
    assert_eq!(sup.pid_count(), 1);

    wait_terminal(&mut sup, &mut store, &run_id);
    let run = store.get(&run_id).unwrap();
    assert_eq!(run.state, RunState::Success);
    assert!(run.pid.is_none());
    assert_eq!(exit_code(run.status.unwrap()), Some(0));
    assert!(run.rusage.is_some());
    assert_eq!(sup.pid_count(), 0);

    let scheduled = run.times[&RunState::Scheduled];
    let running = run.times[&RunState::Running];
    let success = run.times[&RunState::Success];
    assert!(scheduled <= running && running <= success);

    assert_eq!(leftover_workspaces(tmp.path()), 0, "workspace released");
}

#[test]
#[serial]
fn nonzero_exit_is_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let mut sup = supervisor(tmp.path());
    let mut store = RunStore::new();
    let run_id = scheduled_run(&sup, &mut store);

    sup.start(&mut store, &run_id, &program(&["/bin/sh", "-c", "exit 7"]), None)
        .unwrap();
    wait_terminal(&mut sup, &mut store, &run_id);

    let run = store.get(&run_id).unwrap();
    assert_eq!(run.state, RunState::Failure);
    assert_eq!(exit_code(run.status.unwrap()), Some(7));
    assert_eq!(signal_name(run.status.unwrap()), None);
}

#[test]
#[serial]
fn sigterm_is_failure_with_signal() {
    let tmp = tempfile::tempdir().unwrap();
    let mut sup = supervisor(tmp.path());
    let mut store = RunStore::new();
    let run_id = scheduled_run(&sup, &mut store);

    sup.start(&mut store, &run_id, &program(&["/bin/sleep", "60"]), None)
        .unwrap();
    sup.signal(&store, &run_id, Signal::SIGTERM).unwrap();
    wait_terminal(&mut sup, &mut store, &run_id);

    let run = store.get(&run_id).unwrap();
    assert_eq!(run.state, RunState::Failure);
    assert_eq!(exit_code(run.status.unwrap()), None);
    assert_eq!(
        signal_name(run.status.unwrap()).as_deref(),
        Some("SIGTERM")
    );
}

#[test]
#[serial]
fn exec_enoent_parks_the_run_in_error() {
    let tmp = tempfile::tempdir().unwrap();
    let mut sup = supervisor(tmp.path());
    let mut store = RunStore::new();
    let run_id = scheduled_run(&sup, &mut store);

    sup.start(&mut store, &run_id, &program(&["/no/such/bin"]), None)
        .unwrap();

    let run = store.get(&run_id).unwrap();
    assert_eq!(run.state, RunState::Error);
    let error = run.error.as_ref().unwrap();
    assert_eq!(error.kind, "file_not_found");
    assert!(error.message.contains("/no/such/bin"));
    assert_eq!(sup.pid_count(), 0);
    assert_eq!(leftover_workspaces(tmp.path()), 0, "workspace cleaned");
}

#[test]
#[serial]
fn chdir_enoent_blames_the_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let mut sup = supervisor(tmp.path());
    let mut store = RunStore::new();
    let run_id = scheduled_run(&sup, &mut store);

    let mut prog = program(&["/bin/true"]);
    prog.cwd = "/no/such/dir".into();
    sup.start(&mut store, &run_id, &prog, None).unwrap();

    let run = store.get(&run_id).unwrap();
    assert_eq!(run.state, RunState::Error);
    assert!(run.error.as_ref().unwrap().message.contains("/no/such/dir"));
}

#[test]
#[serial]
fn output_is_captured_and_merged() {
    let tmp = tempfile::tempdir().unwrap();
    let mut sup = supervisor(tmp.path());
    let mut store = RunStore::new();
    let run_id = scheduled_run(&sup, &mut store);

    sup.start(
        &mut store,
        &run_id,
        &program(&["/bin/sh", "-c", "echo from-stdout; echo from-stderr >&2"]),
        None,
    )
    .unwrap();
    wait_terminal(&mut sup, &mut store, &run_id);

    let run = store.get(&run_id).unwrap();
    let output = String::from_utf8_lossy(run.output.as_deref().unwrap());
    assert!(output.contains("from-stdout"));
    assert!(output.contains("from-stderr"));
    assert_eq!(run.output_len(), Some(output.len()));
}

#[test]
#[serial]
fn stdin_blob_reaches_the_child() {
    let tmp = tempfile::tempdir().unwrap();
    let mut sup = supervisor(tmp.path());
    let mut store = RunStore::new();
    let run_id = scheduled_run(&sup, &mut store);

    sup.start(
        &mut store,
        &run_id,
        &program(&["/bin/cat"]),
        Some(b"blob on stdin"),
    )
    .unwrap();
    wait_terminal(&mut sup, &mut store, &run_id);

    let run = store.get(&run_id).unwrap();
    assert_eq!(run.state, RunState::Success);
    assert_eq!(run.output.as_deref(), Some(&b"blob on stdin"[..]));
}

#[test]
#[serial]
fn start_requires_scheduled() {
    let tmp = tempfile::tempdir().unwrap();
    let mut sup = supervisor(tmp.path());
    let mut store = RunStore::new();
    let run_id = scheduled_run(&sup, &mut store);

    sup.start(&mut store, &run_id, &program(&["/bin/sleep", "60"]), None)
        .unwrap();
    let err = sup
        .start(&mut store, &run_id, &program(&["/bin/true"]), None)
        .unwrap_err();
    assert!(matches!(
        err,
        SupervisorError::NotScheduled {
            state: RunState::Running
        }
    ));

    sup.signal(&store, &run_id, Signal::SIGKILL).unwrap();
    wait_terminal(&mut sup, &mut store, &run_id);
}

#[test]
fn cancel_then_cancel_again_conflicts() {
    let tmp = tempfile::tempdir().unwrap();
    let mut sup = supervisor(tmp.path());
    let mut store = RunStore::new();
    let mut queue = ScheduledRuns::new();
    let run_id = scheduled_run(&sup, &mut store);

    sup.cancel(&mut store, &mut queue, &run_id).unwrap();
    assert_eq!(store.get(&run_id).unwrap().state, RunState::Cancelled);

    let err = sup.cancel(&mut store, &mut queue, &run_id).unwrap_err();
    assert!(matches!(
        err,
        SupervisorError::NotScheduled {
            state: RunState::Cancelled
        }
    ));
}

#[test]
fn cancel_pulls_the_run_out_of_the_queue() {
    let tmp = tempfile::tempdir().unwrap();
    let mut sup = supervisor(tmp.path());
    let mut store = RunStore::new();
    let mut queue = ScheduledRuns::new();
    let run_id = scheduled_run(&sup, &mut store);

    let later = sup.clock().now() + Duration::from_secs(60);
    assert_eq!(
        queue.schedule(later, &run_id, sup.clock().now()),
        ScheduleOutcome::Queued
    );
    sup.cancel(&mut store, &mut queue, &run_id).unwrap();
    assert_eq!(queue.live_len(), 0);
}

#[test]
#[serial]
fn rerun_increments_the_number_for_the_same_inst() {
    let tmp = tempfile::tempdir().unwrap();
    let mut sup = supervisor(tmp.path());
    let mut store = RunStore::new();
    let run_id = scheduled_run(&sup, &mut store);

    sup.start(&mut store, &run_id, &program(&["/bin/sh", "-c", "exit 1"]), None)
        .unwrap();
    wait_terminal(&mut sup, &mut store, &run_id);

    let rerun = sup.rerun(&mut store, &run_id).unwrap();
    assert_eq!(rerun.number, 1);
    assert_eq!(
        rerun.inst.inst_id,
        store.get(&run_id).unwrap().inst.inst_id
    );
    assert_eq!(rerun.state, RunState::Scheduled);

    // The source is no longer highest-numbered.
    let err = sup.rerun(&mut store, &run_id).unwrap_err();
    assert!(matches!(err, SupervisorError::NotHighest));
}

#[test]
fn rerun_rejected_while_scheduled() {
    let tmp = tempfile::tempdir().unwrap();
    let mut sup = supervisor(tmp.path());
    let mut store = RunStore::new();
    let run_id = scheduled_run(&sup, &mut store);

    let err = sup.rerun(&mut store, &run_id).unwrap_err();
    assert!(matches!(
        err,
        SupervisorError::NotRerunnable {
            state: RunState::Scheduled
        }
    ));
}

#[test]
fn signal_requires_a_pid() {
    let tmp = tempfile::tempdir().unwrap();
    let sup = supervisor(tmp.path());
    let mut store = RunStore::new();
    let run_id = scheduled_run(&sup, &mut store);

    let err = sup.signal(&store, &run_id, Signal::SIGTERM).unwrap_err();
    assert!(matches!(err, SupervisorError::NotRunning { .. }));
}

#[test]
fn operations_on_unknown_runs_are_conflicts() {
    let tmp = tempfile::tempdir().unwrap();
    let mut sup = supervisor(tmp.path());
    let mut store = RunStore::new();
    let ghost = RunId::new("ghost");

    assert!(matches!(
        sup.start(&mut store, &ghost, &program(&["/bin/true"]), None),
        Err(SupervisorError::UnknownRun(_))
    ));
    assert!(matches!(
        sup.rerun(&mut store, &ghost),
        Err(SupervisorError::UnknownRun(_))
    ));
}

#[test]
#[serial]
fn coalesced_sigchld_drains_every_death() {
    let tmp = tempfile::tempdir().unwrap();
    let mut sup = supervisor(tmp.path());
    let mut store = RunStore::new();

    let mut run_ids = Vec::new();
    for _ in 0..3 {
        let run_id = scheduled_run(&sup, &mut store);
        sup.start(&mut store, &run_id, &program(&["/bin/true"]), None)
            .unwrap();
        run_ids.push(run_id);
    }
    assert_eq!(sup.pid_count(), 3);

    // Let all three die, then drain as a single SIGCHLD would.
    std::thread::sleep(Duration::from_millis(400));
    sup.drain(&mut store);

    for run_id in &run_ids {
        assert!(store.get(run_id).unwrap().is_terminal(), "{run_id}");
    }
    assert_eq!(sup.pid_count(), 0);
}

#[test]
#[serial]
fn reap_with_no_children_returns_false() {
    let tmp = tempfile::tempdir().unwrap();
    let mut sup = supervisor(tmp.path());
    let mut store = RunStore::new();
    assert!(!sup.reap(&mut store));
}

/// Schedule-and-dispatch end to end: a run scheduled 200ms out starts at
/// (not before) its instant and completes.
#[tokio::test]
#[serial]
async fn dispatch_starts_at_the_scheduled_instant() {
    let tmp = tempfile::tempdir().unwrap();
    let mut sup = supervisor(tmp.path());
    let mut store = RunStore::new();
    let mut queue = ScheduledRuns::new();

    let scheduled_at = sup.clock().now() + Duration::from_millis(200);
    let run_id = scheduled_run(&sup, &mut store);
    assert_eq!(
        queue.schedule(scheduled_at, &run_id, sup.clock().now()),
        ScheduleOutcome::Queued
    );

    // Mini dispatch loop, the daemon's shape in miniature.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        let now = sup.clock().now();
        let due = queue.pop_due(now);
        for id in due {
            if store.get(&id).map(|r| r.state) == Some(RunState::Scheduled) {
                sup.start(&mut store, &id, &program(&["/bin/true"]), None)
                    .unwrap();
            }
        }
        if store.get(&run_id).map(|r| r.state) != Some(RunState::Scheduled) {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "dispatch never fired");
        tokio::time::sleep(queue.sleep_for(now, DEFAULT_LOOP_TIME)).await;
    }

    wait_terminal(&mut sup, &mut store, &run_id);
    let run = store.get(&run_id).unwrap();
    assert_eq!(run.state, RunState::Success);

    // Started at or after the scheduled instant, within loop_time + slack.
    let started = run.times[&RunState::Running];
    let delta = started.since_ms(scheduled_at);
    assert!(delta >= 0, "started {delta}ms before its instant");
    assert!(delta <= 1_000, "started {delta}ms late");
}
