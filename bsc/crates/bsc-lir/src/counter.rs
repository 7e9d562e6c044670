//! Shared event counters referenced from lowered code

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A named monotonic counter
pub struct Counter {
    group: &'static str,
    name: &'static str,
    value: AtomicU64,
}

/// Handle embedded into `IncrementCounter` instructions
pub type CounterHandle = Arc<Counter>;

impl Counter {
    pub fn new(group: &'static str, name: &'static str) -> CounterHandle {
        Arc::new(Self {
            group,
            name,
            value: AtomicU64::new(0),
        })
    }

    pub fn group(&self) -> &'static str {
        self.group
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.value.store(0, Ordering::Relaxed);
    }
}

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}={}", self.group, self.name, self.get())
    }
}
