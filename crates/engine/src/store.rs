// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run store: the query side of the supervisor, plus the live feed.
//!
//! Holds every run the process knows about, answers filtered snapshot
//! queries, and fans each state transition out to live subscribers in
//! transition order. Only the supervisor loop mutates it.

use std::collections::HashMap;
use tempo_core::{InstId, JobId, Run, RunId, RunState, Timestamp};
use tokio::sync::mpsc;

/// One live-feed message: the instant of the snapshot and the runs that
/// changed at it.
pub type RunBatch = (Timestamp, Vec<Run>);

/// Conjunctive filters for run queries. The time window applies to the
/// run's scheduled instant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunFilter {
    pub run_id: Option<RunId>,
    pub job_id: Option<JobId>,
    pub since: Option<Timestamp>,
    pub until: Option<Timestamp>,
}

impl RunFilter {
    pub fn matches(&self, run: &Run) -> bool {
        if let Some(run_id) = &self.run_id {
            if &run.run_id != run_id {
                return false;
            }
        }
        if let Some(job_id) = &self.job_id {
            if &run.inst.job_id != job_id {
                return false;
            }
        }
        let scheduled = run
            .times
            .get(&RunState::Scheduled)
            .copied()
            .unwrap_or(run.inst.time);
        if let Some(since) = self.since {
            if scheduled < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if scheduled >= until {
                return false;
            }
        }
        true
    }
}

/// Handle to a live subscription. Receive batches from `rx`; hand `id` back
/// to [`RunStore::unsubscribe`] when the consumer goes away (a closed
/// receiver is also swept on the next publish).
pub struct LiveFeed {
    pub id: u64,
    pub rx: mpsc::UnboundedReceiver<RunBatch>,
}

/// In-memory index of runs with a live-subscription fan-out.
#[derive(Debug, Default)]
pub struct RunStore {
    runs: HashMap<RunId, Run>,
    subscribers: HashMap<u64, mpsc::UnboundedSender<RunBatch>>,
    next_sub: u64,
}

impl RunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new run and publish it.
    pub fn insert(&mut self, run: Run, when: Timestamp) {
        let snapshot = run.clone();
        self.runs.insert(run.run_id.clone(), run);
        self.publish(when, std::slice::from_ref(&snapshot));
    }

    pub fn get(&self, run_id: &RunId) -> Option<&Run> {
        self.runs.get(run_id)
    }

    pub fn get_mut(&mut self, run_id: &RunId) -> Option<&mut Run> {
        self.runs.get_mut(run_id)
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Snapshot query. `when` is the instant the snapshot was taken.
    pub fn query(&self, filter: &RunFilter, when: Timestamp) -> (Timestamp, Vec<Run>) {
        let mut runs: Vec<Run> = self
            .runs
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        runs.sort_by(|a, b| a.inst.time.cmp(&b.inst.time).then(a.number.cmp(&b.number)));
        (when, runs)
    }

    /// Highest run number recorded for an instance.
    pub fn max_run_number(&self, inst_id: &InstId) -> Option<u32> {
        self.runs
            .values()
            .filter(|r| &r.inst.inst_id == inst_id)
            .map(|r| r.number)
            .max()
    }

    /// Whether `run_id` is the highest-numbered run of its instance.
    pub fn is_highest(&self, run_id: &RunId) -> bool {
        let Some(run) = self.runs.get(run_id) else {
            return false;
        };
        self.max_run_number(&run.inst.inst_id) == Some(run.number)
    }

    /// Register a live subscriber. Every subsequent transition is delivered
    /// as a `(when, runs)` batch, in the order the transitions happened.
    pub fn subscribe(&mut self) -> LiveFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.next_sub += 1;
        let id = self.next_sub;
        self.subscribers.insert(id, tx);
        LiveFeed { id, rx }
    }

    pub fn unsubscribe(&mut self, id: u64) {
        self.subscribers.remove(&id);
    }

    /// Fan a batch of changed runs out to every live subscriber. Dead
    /// receivers are dropped along the way.
    pub fn publish(&mut self, when: Timestamp, runs: &[Run]) {
        if runs.is_empty() {
            return;
        }
        self.subscribers
            .retain(|_, tx| tx.send((when, runs.to_vec())).is_ok());
    }

    /// Publish the current state of a single run.
    pub fn publish_run(&mut self, run_id: &RunId, when: Timestamp) {
        if let Some(run) = self.runs.get(run_id).cloned() {
            self.publish(when, std::slice::from_ref(&run));
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
