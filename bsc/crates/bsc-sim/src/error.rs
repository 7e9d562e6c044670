//! Error Module - Simulated Runtime Errors
//!
//! # Error Categories
//!
//! ## Traps
//! - `Trap` - fatal runtime check failed (bad oop, explicit trap)
//! - `NullPointer` - implicit null check hit a null base
//!
//! ## Memory Errors
//! - `Fault` - access outside every mapped segment
//! - `OutOfMemory` - no free region left for an allocation or evacuation
//!
//! ## Execution Errors
//! - `UndefinedRegister` - read of a virtual register never written
//! - `StepLimit` - the interpreter ran away
//!
//! ## Setup Errors
//! - `Config`, `ThreadLimit`, `UnknownClass`
//! - `InvalidPhase` - collector phase change out of order

use bsc_barrier::BarrierError;
use bsc_emit::EmitError;
use bsc_lir::VReg;
use thiserror::Error;

use crate::runtime::Phase;

#[derive(Debug, Error)]
pub enum SimError {
    /// Fatal runtime check
    ///
    /// **When returned:** `verify_oop` on a value that is not a heap object
    #[error("trap: {reason}")]
    Trap { reason: String },

    #[error("null pointer dereference at instruction {at}")]
    NullPointer { at: usize },

    /// **When returned:** load or store to an unmapped address
    #[error("memory fault at {addr:#x} ({len} bytes)")]
    Fault { addr: u64, len: usize },

    #[error("out of memory: {requested} bytes requested, no free region")]
    OutOfMemory { requested: u64 },

    #[error("no class at klass address {0:#x}")]
    UnknownClass(u64),

    #[error("register {0} read before it was written")]
    UndefinedRegister(VReg),

    #[error("step limit of {steps} exceeded")]
    StepLimit { steps: usize },

    #[error("thread limit of {max} reached")]
    ThreadLimit { max: usize },

    #[error("cannot {operation} during {phase}")]
    InvalidPhase {
        phase: Phase,
        operation: &'static str,
    },

    #[error("invalid simulator configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Emit(#[from] EmitError),

    #[error(transparent)]
    Barrier(#[from] BarrierError),
}

impl SimError {
    pub(crate) fn trap(reason: impl Into<String>) -> Self {
        SimError::Trap {
            reason: reason.into(),
        }
    }

    /// Whether the error ends the unit the way a hardware trap would
    pub fn is_trap(&self) -> bool {
        matches!(self, SimError::Trap { .. } | SimError::NullPointer { .. })
    }
}

pub type Result<T> = std::result::Result<T, SimError>;
