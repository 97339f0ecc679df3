// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job catalogue entry.
//!
//! The catalogue loader and schedule-expression evaluation live outside the
//! core; here a job is just an identifier, an opaque schedule description,
//! and the program its runs execute.

use crate::ids::JobId;
use crate::program::ProgramSpec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    /// Human-readable schedule description (e.g. "daily 09:30 US/Eastern").
    #[serde(default)]
    pub schedule: String,
    pub program: ProgramSpec,
}

impl Job {
    pub fn new(job_id: impl Into<JobId>, program: ProgramSpec) -> Self {
        Self {
            job_id: job_id.into(),
            schedule: String::new(),
            program,
        }
    }
}
