//! Error Module - Barrier Compilation Errors
//!
//! Every error aborts compilation of the current unit. There is no retry path.
//!
//! # Error Categories
//!
//! ## Policy Errors
//! - `UnsupportedAccess` - access shape the configured collector cannot barrier
//! - `OffHeapReference` - reference value claimed to live off-heap
//!
//! ## Internal Errors
//! - `UnmappedClassification` - classification with no insertion rule
//! - `MissingClassification` - access reached insertion without a verdict
//! - `Guarantee` - precondition violated by the incoming graph
//! - `AlreadyInstrumented` - graph already contains barriers
//! - `BarrierRemaining` - lowering left a barrier node behind
//!
//! ## Configuration Errors
//! - `Config` - inconsistent `BarrierConfig` / `BarrierLayout`

use bsc_ir::{AccessClass, BarrierType, IrError, LocationKind, NodeId};
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum BarrierError {
    /// Access cannot be barriered under the active configuration
    ///
    /// **When returned:** compare-and-swap on a reference while CAS barriers are
    /// disabled but the collector needs write barriers
    #[error("unsupported {class} on reference location {location:?}: CAS barriers are disabled")]
    UnsupportedAccess {
        class: AccessClass,
        location: LocationKind,
    },

    /// Off-heap memory never holds references
    #[error("{class} of a reference value in off-heap memory")]
    OffHeapReference { class: AccessClass },

    /// No insertion rule exists for this pair
    #[error("no insertion rule for {class} classified as {barrier_type}")]
    UnmappedClassification {
        class: AccessClass,
        barrier_type: BarrierType,
    },

    /// Access reached a pass that needs its classification
    #[error("access {0:?} has no barrier classification")]
    MissingClassification(NodeId),

    /// Compiler-internal precondition failed
    #[error("guarantee failed: {0}")]
    Guarantee(String),

    /// Insertion ran on a graph that already contains barriers
    #[error("graph already contains {barriers} barrier node(s)")]
    AlreadyInstrumented { barriers: usize },

    /// Barrier nodes survived lowering
    #[error("{count} barrier node(s) remain after lowering")]
    BarrierRemaining { count: usize },

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Ir(#[from] IrError),
}

impl BarrierError {
    pub(crate) fn guarantee(msg: impl Into<String>) -> Self {
        BarrierError::Guarantee(msg.into())
    }

    /// Whether the error indicates a compiler bug rather than an unsupported input
    pub fn is_bug(&self) -> bool {
        matches!(
            self,
            BarrierError::UnmappedClassification { .. }
                | BarrierError::MissingClassification(_)
                | BarrierError::Guarantee(_)
                | BarrierError::AlreadyInstrumented { .. }
                | BarrierError::BarrierRemaining { .. }
                | BarrierError::Ir(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BarrierError>;
