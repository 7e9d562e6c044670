//! Barrier classifications and barrier operations
//!
//! [`BarrierType`] is the policy's verdict for one access. [`BarrierOp`] is what the
//! inserter splices into the fixed chain; it lives only until lowering replaces it
//! with an inline fragment.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::NodeId;

/// Synchronization an access requires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BarrierType {
    /// No barrier
    None,
    /// Instance field of reference type
    Field,
    /// Array element of reference type
    Array,
    /// Location not statically known; may turn out to be a referent field
    Unknown,
    /// Read of a reference object's referent whose result escapes
    ReferenceGet,
    /// Weak `refersTo` comparison on a referent
    WeakRefersTo,
    /// Phantom `refersTo` comparison on a referent
    PhantomRefersTo,
    /// Initializing store that may follow a safepoint
    PostInitWrite,
    /// Store that must not keep the previous value alive
    AsNoKeepaliveWrite,
}

impl BarrierType {
    pub fn is_none(self) -> bool {
        self == BarrierType::None
    }

    /// Reference strength for a load-reference barrier on a read of this type.
    ///
    /// Returns `None` for classifications that never carry a load barrier.
    pub fn read_strength(self) -> Option<ReferenceStrength> {
        match self {
            BarrierType::Field | BarrierType::Array | BarrierType::Unknown => {
                Some(ReferenceStrength::Strong)
            }
            BarrierType::ReferenceGet | BarrierType::WeakRefersTo => {
                Some(ReferenceStrength::Weak)
            }
            BarrierType::PhantomRefersTo => Some(ReferenceStrength::Phantom),
            BarrierType::None | BarrierType::PostInitWrite | BarrierType::AsNoKeepaliveWrite => {
                None
            }
        }
    }
}

impl fmt::Display for BarrierType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Reachability strength the loaded reference is observed with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceStrength {
    Strong,
    Weak,
    Phantom,
}

impl ReferenceStrength {
    pub fn is_strong(self) -> bool {
        self == ReferenceStrength::Strong
    }
}

impl fmt::Display for ReferenceStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReferenceStrength::Strong => "strong",
            ReferenceStrength::Weak => "weak",
            ReferenceStrength::Phantom => "phantom",
        };
        f.write_str(name)
    }
}

/// SATB pre-write barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreWrite {
    pub address: NodeId,
    /// Previous value known by the caller; used when `do_load` is false
    pub expected: Option<NodeId>,
    /// Load the previous value from `address`
    pub do_load: bool,
    pub null_check: bool,
    /// The slot holds a compressed reference
    pub narrow: bool,
}

/// Post-write barrier (card marking when enabled)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostWrite {
    pub address: NodeId,
    pub value: Option<NodeId>,
    pub do_load: bool,
    pub null_check: bool,
}

/// Load-reference barrier; its result replaces every use of `value`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReference {
    pub address: NodeId,
    pub value: NodeId,
    pub narrow: bool,
    pub strength: ReferenceStrength,
}

/// Keep-alive barrier on a (possible) referent read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferentFieldRead {
    pub address: NodeId,
    pub value: NodeId,
    /// Check at run time that the address really is a referent field
    pub dynamic_check: bool,
}

/// Pre- or post-barrier covering a contiguous range of reference slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayRange {
    /// Address of the first destination slot
    pub address: NodeId,
    pub length: NodeId,
    pub element_stride: u32,
    pub narrow: bool,
}

/// A barrier on the fixed chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierOp {
    PreWrite(PreWrite),
    PostWrite(PostWrite),
    LoadReference(LoadReference),
    ReferentFieldRead(ReferentFieldRead),
    ArrayRangePreWrite(ArrayRange),
    ArrayRangePostWrite(ArrayRange),
}

/// Discriminant of a [`BarrierOp`], for counting and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BarrierKind {
    PreWrite,
    PostWrite,
    LoadReference,
    ReferentFieldRead,
    ArrayRangePreWrite,
    ArrayRangePostWrite,
}

impl BarrierKind {
    pub const ALL: [BarrierKind; 6] = [
        BarrierKind::PreWrite,
        BarrierKind::PostWrite,
        BarrierKind::LoadReference,
        BarrierKind::ReferentFieldRead,
        BarrierKind::ArrayRangePreWrite,
        BarrierKind::ArrayRangePostWrite,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BarrierKind::PreWrite => "pre-write",
            BarrierKind::PostWrite => "post-write",
            BarrierKind::LoadReference => "load-reference",
            BarrierKind::ReferentFieldRead => "referent-read",
            BarrierKind::ArrayRangePreWrite => "array-range-pre-write",
            BarrierKind::ArrayRangePostWrite => "array-range-post-write",
        }
    }
}

impl fmt::Display for BarrierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl BarrierOp {
    pub fn kind(&self) -> BarrierKind {
        match self {
            BarrierOp::PreWrite(_) => BarrierKind::PreWrite,
            BarrierOp::PostWrite(_) => BarrierKind::PostWrite,
            BarrierOp::LoadReference(_) => BarrierKind::LoadReference,
            BarrierOp::ReferentFieldRead(_) => BarrierKind::ReferentFieldRead,
            BarrierOp::ArrayRangePreWrite(_) => BarrierKind::ArrayRangePreWrite,
            BarrierOp::ArrayRangePostWrite(_) => BarrierKind::ArrayRangePostWrite,
        }
    }

    /// Address operand every barrier carries
    pub fn address(&self) -> NodeId {
        match self {
            BarrierOp::PreWrite(b) => b.address,
            BarrierOp::PostWrite(b) => b.address,
            BarrierOp::LoadReference(b) => b.address,
            BarrierOp::ReferentFieldRead(b) => b.address,
            BarrierOp::ArrayRangePreWrite(b) | BarrierOp::ArrayRangePostWrite(b) => b.address,
        }
    }

    pub(crate) fn inputs_mut(&mut self) -> Vec<&mut NodeId> {
        match self {
            BarrierOp::PreWrite(b) => {
                let mut inputs = vec![&mut b.address];
                inputs.extend(b.expected.as_mut());
                inputs
            }
            BarrierOp::PostWrite(b) => {
                let mut inputs = vec![&mut b.address];
                inputs.extend(b.value.as_mut());
                inputs
            }
            BarrierOp::LoadReference(b) => vec![&mut b.address, &mut b.value],
            BarrierOp::ReferentFieldRead(b) => vec![&mut b.address, &mut b.value],
            BarrierOp::ArrayRangePreWrite(b) | BarrierOp::ArrayRangePostWrite(b) => {
                vec![&mut b.address, &mut b.length]
            }
        }
    }
}
