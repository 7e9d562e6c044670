//! Runtime routines callable from lowered code
//!
//! Each [`ForeignCall`] names one collector runtime entry point together with its
//! signature. Physical register assignment happens in the platform emitter; this
//! module only fixes argument order and kinds.

use std::fmt;

use bsc_ir::ReferenceStrength;

/// Kind of one argument or result slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Object,
    /// Raw address
    Word,
    Int,
}

/// Static signature of a runtime routine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSignature {
    pub args: &'static [ArgKind],
    pub result: Option<ArgKind>,
    /// May reach a safepoint; false for the barrier slow paths
    pub may_safepoint: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForeignCall {
    /// Log a previous value when the thread's SATB buffer is full: `(pre_val)`
    SatbEnqueue,
    /// Evacuate or fix up a loaded reference: `(obj, field_address) -> obj`
    LoadReferenceBarrier {
        strength: ReferenceStrength,
        narrow: bool,
    },
    /// Trap unless the argument is a valid object: `(obj) -> obj`
    VerifyOop,
    /// Allocate a zeroed instance: `(class, size) -> obj`
    NewInstance,
}

impl ForeignCall {
    /// The six load-reference-barrier routines, strong/weak/phantom by wide/narrow
    pub const LOAD_REFERENCE_BARRIERS: [ForeignCall; 6] = [
        ForeignCall::lrb(ReferenceStrength::Strong, false),
        ForeignCall::lrb(ReferenceStrength::Strong, true),
        ForeignCall::lrb(ReferenceStrength::Weak, false),
        ForeignCall::lrb(ReferenceStrength::Weak, true),
        ForeignCall::lrb(ReferenceStrength::Phantom, false),
        ForeignCall::lrb(ReferenceStrength::Phantom, true),
    ];

    pub const fn lrb(strength: ReferenceStrength, narrow: bool) -> Self {
        ForeignCall::LoadReferenceBarrier { strength, narrow }
    }

    pub fn name(self) -> &'static str {
        use ReferenceStrength::*;
        match self {
            ForeignCall::SatbEnqueue => "satb_enqueue",
            ForeignCall::LoadReferenceBarrier { strength, narrow } => match (strength, narrow) {
                (Strong, false) => "load_reference_barrier_strong",
                (Strong, true) => "load_reference_barrier_strong_narrow",
                (Weak, false) => "load_reference_barrier_weak",
                (Weak, true) => "load_reference_barrier_weak_narrow",
                (Phantom, false) => "load_reference_barrier_phantom",
                (Phantom, true) => "load_reference_barrier_phantom_narrow",
            },
            ForeignCall::VerifyOop => "verify_oop",
            ForeignCall::NewInstance => "new_instance",
        }
    }

    pub fn signature(self) -> CallSignature {
        use ArgKind::*;
        match self {
            ForeignCall::SatbEnqueue => CallSignature {
                args: &[Object],
                result: None,
                may_safepoint: false,
            },
            ForeignCall::LoadReferenceBarrier { .. } => CallSignature {
                args: &[Object, Word],
                result: Some(Object),
                may_safepoint: false,
            },
            ForeignCall::VerifyOop => CallSignature {
                args: &[Object],
                result: Some(Object),
                may_safepoint: false,
            },
            ForeignCall::NewInstance => CallSignature {
                args: &[Word, Int],
                result: Some(Object),
                may_safepoint: true,
            },
        }
    }
}

impl fmt::Display for ForeignCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
