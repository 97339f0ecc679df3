// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tempo-engine: the runtime that makes a run happen.
//!
//! Four pieces, leaf-first: the process [`launch`]er (fork/exec with an
//! in-child error pipe), the per-run [`workspace`], the wall-clock
//! [`schedule`] queue, and the [`supervisor`] that owns the pid table and
//! drives run state transitions. The [`store`] is the query side with a
//! live-subscription fan-out.

pub mod error;
pub mod launch;
pub mod schedule;
pub mod status;
pub mod store;
pub mod supervisor;
pub mod workspace;

pub use error::{LaunchError, SupervisorError};
pub use launch::{launch, launch_split};
pub use schedule::{ScheduleOutcome, ScheduledRuns, DEFAULT_LOOP_TIME};
pub use store::{RunBatch, RunFilter, RunStore};
pub use supervisor::Supervisor;
pub use workspace::RunDir;
