// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifiers for jobs, instances, and runs, and how new ones are minted.
//!
//! All three are opaque strings on the wire and in maps. Run and instance
//! ids only have to be unique within the process lifetime; job ids come
//! from the catalogue, except for the ad-hoc entries the daemon creates
//! when an operator schedules a bare program.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

macro_rules! declare_ids {
    ($($(#[$meta:meta])* $name:ident),+ $(,)?) => {$(
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Truncated form for fixed-width table columns.
            pub fn short(&self, width: usize) -> &str {
                &self.0[..self.0.len().min(width)]
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    )+};
}

declare_ids! {
    /// One attempt to execute a job instance. Unique for the life of the
    /// supervisor process; also the tie-breaker for equal-time heap entries.
    RunId,
    /// A job in the catalogue.
    JobId,
    /// A job bound to concrete arguments and one scheduled time. The
    /// original run and its reruns share this id.
    InstId,
}

/// Mints the identifiers the supervisor hands out.
pub trait IdMint: Clone + Send + Sync {
    /// Id for a brand-new run (first run of an instance, or a rerun).
    fn run_id(&self) -> RunId;

    /// Id for a new instance.
    fn inst_id(&self) -> InstId;

    /// Catalogue id for a schedule request that named no job.
    fn adhoc_job_id(&self) -> JobId;
}

/// Production mint: uuid-backed, prefixed by kind so ids are recognisable
/// in logs and tables.
#[derive(Clone, Copy, Default)]
pub struct UuidMint;

impl UuidMint {
    fn fresh(prefix: &str) -> String {
        format!("{prefix}-{}", uuid::Uuid::new_v4().simple())
    }
}

impl IdMint for UuidMint {
    fn run_id(&self) -> RunId {
        RunId::new(Self::fresh("r"))
    }

    fn inst_id(&self) -> InstId {
        InstId::new(Self::fresh("i"))
    }

    fn adhoc_job_id(&self) -> JobId {
        JobId::new(Self::fresh("adhoc"))
    }
}

/// Deterministic mint for tests: r0, r1, ... with one shared counter per
/// kind, so cloned handles keep numbering in step.
#[derive(Clone, Default)]
pub struct CountingMint {
    runs: Arc<AtomicU64>,
    insts: Arc<AtomicU64>,
    jobs: Arc<AtomicU64>,
}

impl CountingMint {
    pub fn new() -> Self {
        Self::default()
    }

    fn count(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::Relaxed)
    }
}

impl IdMint for CountingMint {
    fn run_id(&self) -> RunId {
        RunId::new(format!("r{}", Self::count(&self.runs)))
    }

    fn inst_id(&self) -> InstId {
        InstId::new(format!("i{}", Self::count(&self.insts)))
    }

    fn adhoc_job_id(&self) -> JobId {
        JobId::new(format!("adhoc{}", Self::count(&self.jobs)))
    }
}

#[cfg(test)]
#[path = "ids_tests.rs"]
mod tests;
