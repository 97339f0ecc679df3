// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::clock::{Clock, FakeClock};
use yare::parameterized;

fn inst(job: &str) -> Instance {
    Instance {
        inst_id: InstId::new("i-1"),
        job_id: JobId::new(job),
        args: BTreeMap::new(),
        time: Timestamp::from_millis(1_000),
    }
}

fn scheduled_run() -> Run {
    Run::new(
        RunId::new("r-1"),
        inst("backup"),
        0,
        Timestamp::from_millis(1_000),
    )
}

#[test]
fn new_run_is_scheduled_with_stamped_time() {
    let run = scheduled_run();
    assert_eq!(run.state, RunState::Scheduled);
    assert_eq!(
        run.times.get(&RunState::Scheduled),
        Some(&Timestamp::from_millis(1_000))
    );
    assert!(run.pid.is_none());
    assert!(run.status.is_none());
    assert!(!run.is_terminal());
}

#[parameterized(
    running = { RunState::Running },
    cancelled = { RunState::Cancelled },
    error = { RunState::Error },
)]
fn scheduled_can_advance(to: RunState) {
    let mut run = scheduled_run();
    run.advance(to, Timestamp::from_millis(2_000)).unwrap();
    assert_eq!(run.state, to);
    assert_eq!(run.times.get(&to), Some(&Timestamp::from_millis(2_000)));
}

#[parameterized(
    success = { RunState::Success },
    failure = { RunState::Failure },
)]
fn running_can_terminate(to: RunState) {
    let mut run = scheduled_run();
    run.advance(RunState::Running, Timestamp::from_millis(2_000))
        .unwrap();
    run.advance(to, Timestamp::from_millis(3_000)).unwrap();
    assert!(run.is_terminal());
}

#[parameterized(
    scheduled_to_success = { RunState::Scheduled, RunState::Success },
    scheduled_to_failure = { RunState::Scheduled, RunState::Failure },
    running_to_cancelled = { RunState::Running, RunState::Cancelled },
    running_to_error = { RunState::Running, RunState::Error },
)]
fn illegal_transitions_are_rejected(via: RunState, to: RunState) {
    let mut run = scheduled_run();
    if via == RunState::Running {
        run.advance(RunState::Running, Timestamp::from_millis(2_000))
            .unwrap();
    }
    let err = run.advance(to, Timestamp::from_millis(3_000)).unwrap_err();
    assert_eq!(err.from, via);
    assert_eq!(err.to, to);
    assert_eq!(run.state, via, "rejected transition must not change state");
}

#[parameterized(
    success = { RunState::Success },
    failure = { RunState::Failure },
    error = { RunState::Error },
    cancelled = { RunState::Cancelled },
)]
fn terminal_states_are_dead_ends(terminal: RunState) {
    let mut run = scheduled_run();
    match terminal {
        RunState::Success | RunState::Failure => {
            run.advance(RunState::Running, Timestamp::from_millis(2_000))
                .unwrap();
            run.advance(terminal, Timestamp::from_millis(3_000)).unwrap();
        }
        _ => {
            run.advance(terminal, Timestamp::from_millis(2_000)).unwrap();
        }
    }
    for to in [
        RunState::Scheduled,
        RunState::Running,
        RunState::Success,
        RunState::Failure,
        RunState::Error,
        RunState::Cancelled,
    ] {
        assert!(run.advance(to, Timestamp::from_millis(4_000)).is_err());
    }
}

#[test]
fn times_are_monotone_over_the_run() {
    let clock = FakeClock::new();
    let mut run = Run::new(RunId::new("r-1"), inst("backup"), 0, clock.now());
    clock.advance(std::time::Duration::from_millis(250));
    run.advance(RunState::Running, clock.now()).unwrap();
    clock.advance(std::time::Duration::from_millis(250));
    run.advance(RunState::Success, clock.now()).unwrap();

    let scheduled = run.times[&RunState::Scheduled];
    let running = run.times[&RunState::Running];
    let success = run.times[&RunState::Success];
    assert!(scheduled <= running && running <= success);
}

#[test]
fn scheduled_actions_are_cancel_and_start() {
    let run = scheduled_run();
    assert_eq!(run.actions(true), vec![RunAction::Cancel, RunAction::Start]);
    assert_eq!(run.actions(false), vec![RunAction::Cancel, RunAction::Start]);
}

#[test]
fn retry_only_for_highest_failed_or_errored() {
    let mut failed = scheduled_run();
    failed
        .advance(RunState::Running, Timestamp::from_millis(2_000))
        .unwrap();
    failed
        .advance(RunState::Failure, Timestamp::from_millis(3_000))
        .unwrap();
    assert_eq!(failed.actions(true), vec![RunAction::Retry]);
    assert!(failed.actions(false).is_empty());

    let mut errored = scheduled_run();
    errored
        .advance(RunState::Error, Timestamp::from_millis(2_000))
        .unwrap();
    assert_eq!(errored.actions(true), vec![RunAction::Retry]);

    let mut ok = scheduled_run();
    ok.advance(RunState::Running, Timestamp::from_millis(2_000))
        .unwrap();
    ok.advance(RunState::Success, Timestamp::from_millis(3_000))
        .unwrap();
    assert!(ok.actions(true).is_empty());
}

#[test]
fn state_serializes_snake_case() {
    assert_eq!(
        serde_json::to_string(&RunState::Scheduled).unwrap(),
        "\"scheduled\""
    );
    assert_eq!(
        serde_json::to_string(&RunState::Failure).unwrap(),
        "\"failure\""
    );
}

#[test]
fn times_serialize_as_state_keyed_map() {
    let mut run = scheduled_run();
    run.advance(RunState::Running, Timestamp::from_millis(2_000))
        .unwrap();
    let jso = serde_json::to_value(&run).unwrap();
    assert_eq!(jso["times"]["scheduled"], 1_000);
    assert_eq!(jso["times"]["running"], 2_000);
}

#[test]
fn round_seconds_truncates_microsecond_noise() {
    assert_eq!(round_seconds(0.004_999_999_888), 0.005);
    assert_eq!(round_seconds(1.0), 1.0);
}
