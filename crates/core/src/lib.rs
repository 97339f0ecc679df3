// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tempo-core: data model for the tempo run-supervision service

pub mod clock;
pub mod ids;
pub mod job;
pub mod program;
pub mod run;
pub mod time_fmt;

pub use clock::{Clock, FakeClock, SystemClock, Timestamp};
pub use ids::{CountingMint, IdMint, InstId, JobId, RunId, UuidMint};
pub use job::Job;
pub use program::{Program, ProgramSpec, SpecError, ENV_WHITELIST};
pub use run::{
    Instance, ResourceUsage, Run, RunAction, RunError, RunState, TransitionError,
};
pub use time_fmt::{format_elapsed, parse_duration};
