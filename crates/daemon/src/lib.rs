// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tempo-daemon: the `tempod` service.
//!
//! Architecture:
//! - Listener task: accepts socket connections, answers queries from shared
//!   state, forwards mutations to the supervisor loop.
//! - Supervisor loop: the single writer of run state. Owns the scheduled-run
//!   queue and the process supervisor; reacts to control messages, SIGCHLD,
//!   and the dispatch timer.

pub mod env;
pub mod lifecycle;
pub mod listener;
pub mod protocol;
pub mod service;
pub mod wire;

pub use lifecycle::{Config, LifecycleError};
pub use protocol::{Request, Response, RunEnvelope, RunEntry, PROTOCOL_VERSION};
pub use service::{Control, Daemon, Shared};
