//! Barrier Counters - Fragment Execution Statistics
//!
//! One bundle per compiled unit (or shared across units by the caller). Each barrier
//! kind gets three counters:
//! - attempted: the fragment was entered
//! - effective: the fast-path exit was not taken
//! - executed: the barrier did real work (logged a value, called the runtime,
//!   dirtied a card)
//!
//! Lowered code holds shared handles, so counts accumulate while the code runs.

use bsc_ir::BarrierKind;
use bsc_lir::{Counter, CounterHandle};
use indexmap::IndexMap;
use serde::Serialize;

/// Which counter of a group to bump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterEvent {
    Attempted,
    Effective,
    Executed,
}

#[derive(Debug, Clone)]
pub struct CounterGroup {
    pub attempted: CounterHandle,
    pub effective: CounterHandle,
    pub executed: CounterHandle,
}

impl CounterGroup {
    fn new(group: &'static str) -> Self {
        Self {
            attempted: Counter::new(group, "attempted"),
            effective: Counter::new(group, "effective"),
            executed: Counter::new(group, "executed"),
        }
    }

    pub fn handle(&self, event: CounterEvent) -> CounterHandle {
        match event {
            CounterEvent::Attempted => self.attempted.clone(),
            CounterEvent::Effective => self.effective.clone(),
            CounterEvent::Executed => self.executed.clone(),
        }
    }

    pub fn snapshot(&self) -> GroupSnapshot {
        GroupSnapshot {
            attempted: self.attempted.get(),
            effective: self.effective.get(),
            executed: self.executed.get(),
        }
    }
}

/// Point-in-time counter values for one barrier kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GroupSnapshot {
    pub attempted: u64,
    pub effective: u64,
    pub executed: u64,
}

#[derive(Debug, Clone)]
pub struct BarrierCounters {
    groups: IndexMap<BarrierKind, CounterGroup>,
}

impl BarrierCounters {
    pub fn new() -> Self {
        let groups = BarrierKind::ALL
            .iter()
            .map(|&kind| (kind, CounterGroup::new(kind.name())))
            .collect();
        Self { groups }
    }

    pub fn group(&self, kind: BarrierKind) -> &CounterGroup {
        // Every kind is populated in `new`
        &self.groups[&kind]
    }

    pub fn handle(&self, kind: BarrierKind, event: CounterEvent) -> CounterHandle {
        self.group(kind).handle(event)
    }

    pub fn snapshot(&self) -> IndexMap<BarrierKind, GroupSnapshot> {
        self.groups
            .iter()
            .map(|(&kind, group)| (kind, group.snapshot()))
            .collect()
    }

    /// Snapshot as a JSON object keyed by barrier kind name
    pub fn to_json(&self) -> serde_json::Value {
        let named: IndexMap<&'static str, GroupSnapshot> = self
            .groups
            .iter()
            .map(|(kind, group)| (kind.name(), group.snapshot()))
            .collect();
        serde_json::json!(named)
    }

    pub fn reset(&self) {
        for group in self.groups.values() {
            group.attempted.reset();
            group.effective.reset();
            group.executed.reset();
        }
    }
}

impl Default for BarrierCounters {
    fn default() -> Self {
        Self::new()
    }
}
