//! bsc-sim - Simulated Collector Runtime
//!
//! Executes compiled units against a simulated region-based concurrent collector,
//! so barrier fragments can be checked for what they do rather than how they look.
//!
//! ```text
//!   Simulator ──compile──▶ BarrierSet ──▶ LirFunction
//!       │
//!       └──execute──▶ Interpreter ──▶ Runtime (heap, phases, SATB queue set,
//!                          │                   runtime routines, trace sink)
//!                          └──▶ AArch64 stub interpreter (assembly-lowered LRBs)
//! ```
//!
//! Components:
//! - **Heap**: segmented memory holding side tables, klasses, thread blocks, SATB
//!   buffers and regions, with bump allocation and copying evacuation
//! - **Runtime**: collector phases plus the `satb_enqueue`, `load_reference_barrier_*`,
//!   `verify_oop` and `new_instance` routines
//! - **Interpreter**: executes every LIR instruction on one mutator thread

pub mod config;
pub mod error;
pub mod heap;
pub mod interp;
pub mod memory;
pub mod object;
pub mod runtime;
pub mod satb;
pub mod sim;
pub mod stats;
pub mod thread;
pub mod trace;
#[cfg(test)]
mod tests;

pub use config::HeapConfig;
pub use error::{Result, SimError};
pub use heap::{Evacuation, Heap};
pub use interp::{Execution, Interpreter};
pub use object::{ClassInfo, ReferenceType};
pub use runtime::{Phase, Runtime};
pub use satb::SatbQueueSet;
pub use sim::Simulator;
pub use stats::{RuntimeStats, RuntimeStatsSnapshot};
pub use thread::MutatorThread;
pub use trace::{TraceRecord, TraceSink};
