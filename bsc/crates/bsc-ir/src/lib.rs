//! bsc-ir - Graph IR for GC Barrier Insertion
//!
//! The graph IR consumed and produced by the barrier pipeline. A compiled unit is a
//! [`Graph`]: floating value nodes (parameters, constants, addresses) plus one ordered
//! chain of fixed nodes (allocations, memory accesses, barriers, return).
//!
//! The chain order is the memory-dependency order of the unit. Barriers are spliced
//! into it immediately before or after the access they protect, and lowering walks it
//! front to back.
//!
//! ```text
//!   Start ─▶ NewInstance ─▶ PreWrite ─▶ Write ─▶ PostWrite ─▶ Read ─▶ LoadReference ─▶ Return
//!                              ▲          │         ▲
//!                              └──────────┴─────────┘  inserted around the access
//! ```
//!
//! Access nodes arrive from the IR producer already annotated with their
//! [`TargetMetadata`], [`InitKind`] and null-check flag. This crate never re-derives
//! them.

pub mod access;
pub mod barrier;
pub mod builder;
pub mod error;
pub mod graph;
pub mod index;
pub mod stamp;
#[cfg(test)]
mod tests;

pub use access::*;
pub use barrier::*;
pub use builder::GraphBuilder;
pub use error::{IrError, Result};
pub use graph::*;
pub use index::{Idx, IndexVec};
pub use stamp::Stamp;
