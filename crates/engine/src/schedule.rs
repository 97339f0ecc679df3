// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduled-run queue.
//!
//! A min-heap of `(time, run)` entries anchored to the wall clock, not the
//! event loop's clock. Cancellation tombstones the entry (no heap offers
//! cheap middle removal); tombstones are skipped at pop time and the map of
//! live entries only ever holds schedulable runs. When tombstones outnumber
//! live entries the heap is rebuilt in place.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;
use tempo_core::{RunId, Timestamp};

/// Default cap on the dispatch loop's sleep. Bounds both the reaction time
/// to a newly scheduled near-future run and the drift between the
/// cooperative clock and the wall clock.
pub const DEFAULT_LOOP_TIME: Duration = Duration::from_millis(100);

/// Result of [`ScheduledRuns::schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// The time is not in the future: start the run now. Nothing was queued.
    Dispatch,
    /// Queued for the dispatch loop.
    Queued,
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Entry {
    time: Timestamp,
    seq: u64,
    run_id: RunId,
}

/// Scheduled runs waiting to start.
#[derive(Debug, Default)]
pub struct ScheduledRuns {
    heap: BinaryHeap<Reverse<Entry>>,
    /// Live entries by run: value is the seq of the entry that counts.
    live: HashMap<RunId, u64>,
    seq: u64,
    tombstones: usize,
}

impl ScheduledRuns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `run_id` to start at `time`.
    ///
    /// A time at or before `now` is dispatched immediately by the caller;
    /// no heap entry is created. Scheduling an already-queued run replaces
    /// its entry (the stale one becomes a tombstone).
    pub fn schedule(&mut self, time: Timestamp, run_id: &RunId, now: Timestamp) -> ScheduleOutcome {
        if time <= now {
            return ScheduleOutcome::Dispatch;
        }
        self.seq += 1;
        if self.live.insert(run_id.clone(), self.seq).is_some() {
            self.tombstones += 1;
        }
        self.heap.push(Reverse(Entry {
            time,
            seq: self.seq,
            run_id: run_id.clone(),
        }));
        ScheduleOutcome::Queued
    }

    /// Remove `run_id` from the schedule.
    ///
    /// True iff it was scheduled, hadn't started, and hadn't already been
    /// unscheduled. The heap entry stays behind as a tombstone.
    pub fn unschedule(&mut self, run_id: &RunId) -> bool {
        if self.live.remove(run_id).is_none() {
            return false;
        }
        self.tombstones += 1;
        self.maybe_rebuild();
        true
    }

    /// Pop every run due at `now`, skipping tombstones, in time order.
    pub fn pop_due(&mut self, now: Timestamp) -> Vec<RunId> {
        let mut due = Vec::new();
        while let Some(Reverse(top)) = self.heap.peek() {
            if top.time > now {
                break;
            }
            let Some(Reverse(entry)) = self.heap.pop() else {
                break;
            };
            match self.live.get(&entry.run_id) {
                Some(&seq) if seq == entry.seq => {
                    self.live.remove(&entry.run_id);
                    due.push(entry.run_id);
                }
                _ => {
                    self.tombstones = self.tombstones.saturating_sub(1);
                }
            }
        }
        due
    }

    /// Time of the top heap entry (which may be a tombstone; the dispatch
    /// loop just wakes up and discards it).
    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.heap.peek().map(|Reverse(e)| e.time)
    }

    /// How long the dispatch loop should sleep: until the next deadline,
    /// capped at `loop_time` to stay bound to the wall clock.
    pub fn sleep_for(&self, now: Timestamp, loop_time: Duration) -> Duration {
        match self.next_deadline() {
            None => loop_time,
            Some(deadline) => loop_time.min(now.until(deadline)),
        }
    }

    /// Heap entries, tombstones included. Diagnostics only.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Number of live (schedulable) entries.
    pub fn live_len(&self) -> usize {
        self.live.len()
    }

    /// Drop tombstones once they outnumber live entries. Keeps the heap
    /// proportional to real work between cancellation storms.
    fn maybe_rebuild(&mut self) {
        if self.heap.len() < 16 || self.tombstones <= self.heap.len() / 2 {
            return;
        }
        let live = &self.live;
        let entries: Vec<Reverse<Entry>> = self
            .heap
            .drain()
            .filter(|Reverse(e)| live.get(&e.run_id) == Some(&e.seq))
            .collect();
        self.heap = BinaryHeap::from(entries);
        self.tombstones = 0;
    }
}

#[cfg(test)]
#[path = "schedule_tests.rs"]
mod tests;
