//! Runtime Statistics - slow-path activity
//!
//! Counted by the runtime routines, never by compiled fast paths (those have the
//! per-barrier snippet counters).
//!
//! Metrics tracked:
//! - SATB enqueue calls, buffers handed over, entries dropped outside marking
//! - Load-reference barrier calls, evacuations, healed fields, cleared references
//! - Verified oops and allocations

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Live counters, updated with `Relaxed` ordering from any mutator thread
#[derive(Debug, Default)]
pub struct RuntimeStats {
    pub satb_enqueue_calls: AtomicU64,
    pub satb_buffers_completed: AtomicU64,
    pub satb_entries_dropped: AtomicU64,
    pub lrb_calls: AtomicU64,
    pub objects_evacuated: AtomicU64,
    pub fields_healed: AtomicU64,
    pub references_cleared: AtomicU64,
    pub oops_verified: AtomicU64,
    pub allocations: AtomicU64,
}

impl RuntimeStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RuntimeStatsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        RuntimeStatsSnapshot {
            satb_enqueue_calls: get(&self.satb_enqueue_calls),
            satb_buffers_completed: get(&self.satb_buffers_completed),
            satb_entries_dropped: get(&self.satb_entries_dropped),
            lrb_calls: get(&self.lrb_calls),
            objects_evacuated: get(&self.objects_evacuated),
            fields_healed: get(&self.fields_healed),
            references_cleared: get(&self.references_cleared),
            oops_verified: get(&self.oops_verified),
            allocations: get(&self.allocations),
        }
    }
}

/// Point-in-time copy of [`RuntimeStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeStatsSnapshot {
    pub satb_enqueue_calls: u64,
    pub satb_buffers_completed: u64,
    pub satb_entries_dropped: u64,
    pub lrb_calls: u64,
    pub objects_evacuated: u64,
    pub fields_healed: u64,
    pub references_cleared: u64,
    pub oops_verified: u64,
    pub allocations: u64,
}

impl RuntimeStatsSnapshot {
    /// Merge stats from another snapshot
    pub fn merge(&mut self, other: &RuntimeStatsSnapshot) {
        self.satb_enqueue_calls += other.satb_enqueue_calls;
        self.satb_buffers_completed += other.satb_buffers_completed;
        self.satb_entries_dropped += other.satb_entries_dropped;
        self.lrb_calls += other.lrb_calls;
        self.objects_evacuated += other.objects_evacuated;
        self.fields_healed += other.fields_healed;
        self.references_cleared += other.references_cleared;
        self.oops_verified += other.oops_verified;
        self.allocations += other.allocations;
    }

    /// Slow-path runtime calls of any kind
    pub fn runtime_calls(&self) -> u64 {
        self.satb_enqueue_calls + self.lrb_calls + self.oops_verified
    }
}
