//! Structured barrier trace
//!
//! Trace instructions in compiled code end up here. Each record is logged as one
//! JSON line under the `bsc::trace` target and kept in memory for inspection.

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceRecord {
    pub thread: usize,
    pub event: &'static str,
    pub fields: IndexMap<&'static str, u64>,
}

impl TraceRecord {
    pub fn field(&self, name: &str) -> Option<u64> {
        self.fields.get(name).copied()
    }
}

#[derive(Debug, Default)]
pub struct TraceSink {
    records: Mutex<Vec<TraceRecord>>,
}

impl TraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&self, record: TraceRecord) {
        match serde_json::to_string(&record) {
            Ok(line) => log::info!(target: "bsc::trace", "{}", line),
            Err(e) => log::warn!("unserializable trace record {:?}: {}", record, e),
        }
        self.records.lock().push(record);
    }

    pub fn records(&self) -> Vec<TraceRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All records as newline-separated JSON
    pub fn to_json_lines(&self) -> String {
        self.records
            .lock()
            .iter()
            .filter_map(|r| serde_json::to_string(r).ok())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}
