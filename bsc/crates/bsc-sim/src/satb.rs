//! SATB queue set
//!
//! Collects full thread buffers handed over by the enqueue slow path, and the
//! partial buffers flushed when marking ends. The marker drains it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct SatbQueueSet {
    completed: Mutex<VecDeque<Vec<u64>>>,
    /// Total entries ever handed over
    entries: AtomicU64,
}

impl SatbQueueSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand over a buffer's entries
    pub fn enqueue_completed(&self, buffer: Vec<u64>) {
        if buffer.is_empty() {
            return;
        }
        self.entries.fetch_add(buffer.len() as u64, Ordering::Relaxed);
        self.completed.lock().push_back(buffer);
    }

    pub fn completed_len(&self) -> usize {
        self.completed.lock().len()
    }

    pub fn total_entries(&self) -> u64 {
        self.entries.load(Ordering::Relaxed)
    }

    /// Take every completed buffer, oldest first
    pub fn drain(&self) -> Vec<Vec<u64>> {
        self.completed.lock().drain(..).collect()
    }
}
