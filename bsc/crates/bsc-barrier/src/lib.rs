//! bsc-barrier - GC Barrier Policy, Insertion and Lowering
//!
//! Compiler support for a region-based concurrent collector that marks with
//! snapshot-at-the-beginning (SATB) and evacuates concurrently.
//!
//! ```text
//!   Graph ──▶ BarrierPolicy::classify ──▶ Inserter ──▶ Lowering ──▶ LirFunction
//!               (per access)               (BarrierOp     (inline
//!                                           nodes)         fragments)
//! ```
//!
//! Barrier kinds:
//! - **Pre-write (SATB)**: logs the value about to be overwritten while marking is
//!   active, so the marker sees the heap as it was when marking started.
//! - **Load-reference**: on reads, redirects references into the collection set to
//!   their evacuated copies and heals the field.
//! - **Referent keep-alive**: logs the referent of a reference object when it is
//!   handed out, so a concurrently cleared referent stays reachable.
//! - **Post-write**: card marking for the generational flavor.
//! - **Array range**: pre/post barriers for bulk reference copies.
//!
//! Fast paths are straight-line, call-free and branch-predictable. Every runtime
//! call is a single out-of-line call on the slow path.

pub mod config;
pub mod counters;
pub mod error;
pub mod insert;
pub mod layout;
pub mod lower;
pub mod policy;
pub mod set;
mod snippets;

pub use config::{BarrierConfig, CollectorKind, ConfigError, LrbLowering};
pub use counters::{BarrierCounters, CounterEvent, GroupSnapshot};
pub use error::{BarrierError, Result};
pub use insert::InsertionStats;
pub use layout::{BarrierLayout, GcStateFlags, CLEAN_CARD, DIRTY_CARD};
pub use policy::{BarrierPolicy, InsertionRule};
pub use set::{BarrierSet, CompiledUnit};
