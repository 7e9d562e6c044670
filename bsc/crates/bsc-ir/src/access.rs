//! Memory access nodes and their target metadata
//!
//! The producer of the graph resolves what each access touches (reference or
//! primitive, field or array element, a reference object's referent, an unknown
//! raw location, off-heap memory) and whether it is an initializing store. The
//! barrier policy only ever reads these annotations.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::barrier::BarrierType;
use crate::error::{IrError, Result};
use crate::graph::NodeId;

/// Shape of an access, as seen by the barrier policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessClass {
    Read,
    Write,
    /// Atomic read-modify-write (swap)
    AtomicReadWrite,
    CompareAndSwap,
    ArrayRangeWrite,
}

impl fmt::Display for AccessClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccessClass::Read => "read",
            AccessClass::Write => "write",
            AccessClass::AtomicReadWrite => "atomic-swap",
            AccessClass::CompareAndSwap => "cas",
            AccessClass::ArrayRangeWrite => "array-range-write",
        };
        f.write_str(name)
    }
}

/// Primitive value widths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveKind {
    Byte,
    Int,
    Long,
}

impl PrimitiveKind {
    pub fn size_in_bytes(self) -> u8 {
        match self {
            PrimitiveKind::Byte => 1,
            PrimitiveKind::Int => 4,
            PrimitiveKind::Long => 8,
        }
    }
}

/// What kind of value lives at the target location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Reference,
    Primitive(PrimitiveKind),
}

/// Which reference-object accessor reaches the referent field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferentAccess {
    /// `Reference.get()`: the result escapes and must be kept alive
    Get,
    /// Weak `refersTo` comparison
    RefersTo,
    /// Phantom `refersTo` comparison
    PhantomRefersTo,
}

/// Where the target location lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocationKind {
    /// Instance field of a known class
    Field,
    /// Element of an array
    ArrayElement,
    /// The referent field of a reference object
    Referent(ReferentAccess),
    /// Raw location whose field is not statically known
    Unknown,
    /// Memory outside the heap
    OffHeap,
}

/// Static description of an access target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetMetadata {
    pub value: ValueKind,
    pub location: LocationKind,
    /// Reference stored in compressed form
    pub narrow: bool,
    /// Store that must not keep the overwritten reference alive
    pub no_keepalive: bool,
}

impl TargetMetadata {
    pub const fn reference(location: LocationKind, narrow: bool) -> Self {
        Self {
            value: ValueKind::Reference,
            location,
            narrow,
            no_keepalive: false,
        }
    }

    pub const fn reference_field() -> Self {
        Self::reference(LocationKind::Field, false)
    }

    pub const fn reference_array_element() -> Self {
        Self::reference(LocationKind::ArrayElement, false)
    }

    pub const fn referent(access: ReferentAccess) -> Self {
        Self::reference(LocationKind::Referent(access), false)
    }

    pub const fn unknown_reference() -> Self {
        Self::reference(LocationKind::Unknown, false)
    }

    pub const fn primitive(kind: PrimitiveKind, location: LocationKind) -> Self {
        Self {
            value: ValueKind::Primitive(kind),
            location,
            narrow: false,
            no_keepalive: false,
        }
    }

    /// Same target, stored in compressed form
    pub const fn narrowed(mut self) -> Self {
        self.narrow = true;
        self
    }

    /// Same target, for a store that skips SATB logging of the previous value
    pub const fn as_no_keepalive(mut self) -> Self {
        self.no_keepalive = true;
        self
    }

    pub fn is_reference(&self) -> bool {
        self.value == ValueKind::Reference
    }

    /// Bytes occupied by one value at the target
    pub fn storage_size(&self) -> u8 {
        match self.value {
            ValueKind::Reference if self.narrow => 4,
            ValueKind::Reference => 8,
            ValueKind::Primitive(kind) => kind.size_in_bytes(),
        }
    }
}

/// Initializing-store flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InitKind {
    /// Ordinary store
    #[default]
    None,
    /// Store into a freshly allocated object with no safepoint since allocation
    Init,
    /// Initializing store scheduled after a possible safepoint
    PostAllocationInit,
}

impl InitKind {
    pub fn is_initializing(self) -> bool {
        !matches!(self, InitKind::None)
    }
}

/// Operation-specific operands of an access
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessOp {
    Read,
    Write {
        value: NodeId,
    },
    /// Store `value`, produce the previous contents
    AtomicSwap {
        value: NodeId,
    },
    /// Store `new_value` if the location holds `expected`, produce success as 0/1
    CompareAndSwap {
        expected: NodeId,
        new_value: NodeId,
    },
    /// Copy `length` elements from `source` to the access address
    ArrayRangeWrite {
        source: NodeId,
        length: NodeId,
        element_stride: u32,
    },
}

impl AccessOp {
    pub fn class(&self) -> AccessClass {
        match self {
            AccessOp::Read => AccessClass::Read,
            AccessOp::Write { .. } => AccessClass::Write,
            AccessOp::AtomicSwap { .. } => AccessClass::AtomicReadWrite,
            AccessOp::CompareAndSwap { .. } => AccessClass::CompareAndSwap,
            AccessOp::ArrayRangeWrite { .. } => AccessClass::ArrayRangeWrite,
        }
    }

    /// Value being stored, if any
    pub fn stored_value(&self) -> Option<NodeId> {
        match *self {
            AccessOp::Write { value } | AccessOp::AtomicSwap { value } => Some(value),
            AccessOp::CompareAndSwap { new_value, .. } => Some(new_value),
            AccessOp::Read | AccessOp::ArrayRangeWrite { .. } => None,
        }
    }
}

/// A memory access on the fixed chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessNode {
    pub op: AccessOp,
    /// Address node of the target location
    pub address: NodeId,
    pub target: TargetMetadata,
    pub init: InitKind,
    /// Whether the access must fault on a null base
    pub null_check: bool,
    barrier_type: Option<BarrierType>,
}

impl AccessNode {
    pub fn new(op: AccessOp, address: NodeId, target: TargetMetadata) -> Self {
        Self {
            op,
            address,
            target,
            init: InitKind::None,
            null_check: false,
            barrier_type: None,
        }
    }

    pub fn with_init(mut self, init: InitKind) -> Self {
        self.init = init;
        self
    }

    pub fn with_null_check(mut self, null_check: bool) -> Self {
        self.null_check = null_check;
        self
    }

    pub fn class(&self) -> AccessClass {
        self.op.class()
    }

    /// Classification recorded by the barrier policy, if any
    pub fn barrier_type(&self) -> Option<BarrierType> {
        self.barrier_type
    }

    /// Record the classification of this access.
    ///
    /// A classification is computed exactly once; recording a second one fails.
    pub fn set_barrier_type(&mut self, barrier_type: BarrierType) -> Result<()> {
        if let Some(existing) = self.barrier_type {
            return Err(IrError::AlreadyClassified {
                existing,
                requested: barrier_type,
            });
        }
        self.barrier_type = Some(barrier_type);
        Ok(())
    }

    /// All value inputs, for use rewriting
    pub(crate) fn inputs_mut(&mut self) -> Vec<&mut NodeId> {
        let mut inputs = vec![&mut self.address];
        match &mut self.op {
            AccessOp::Read => {}
            AccessOp::Write { value } | AccessOp::AtomicSwap { value } => inputs.push(value),
            AccessOp::CompareAndSwap {
                expected,
                new_value,
            } => {
                inputs.push(expected);
                inputs.push(new_value);
            }
            AccessOp::ArrayRangeWrite { source, length, .. } => {
                inputs.push(source);
                inputs.push(length);
            }
        }
        inputs
    }
}
