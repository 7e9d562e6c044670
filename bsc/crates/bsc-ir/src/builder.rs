//! Graph builder
//!
//! Convenience layer the IR producer (and tests) use to assemble a unit in program
//! order. Every fixed node is appended to the end of the chain.

use crate::access::{AccessNode, AccessOp, InitKind, TargetMetadata, ValueKind};
use crate::graph::{ClassRef, Constant, Graph, NodeId, NodeKind, Offset};
use crate::stamp::Stamp;

pub struct GraphBuilder {
    pub graph: Graph,
    next_param: u32,
}

impl GraphBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            graph: Graph::new(name),
            next_param: 0,
        }
    }

    /// Next incoming argument
    pub fn param(&mut self, stamp: Stamp) -> NodeId {
        let index = self.next_param;
        self.next_param += 1;
        self.graph.add_floating(NodeKind::Parameter { index }, stamp)
    }

    pub fn null(&mut self) -> NodeId {
        self.graph
            .add_floating(NodeKind::Constant(Constant::Null), Stamp::object())
    }

    pub fn int(&mut self, value: i64) -> NodeId {
        self.graph
            .add_floating(NodeKind::Constant(Constant::Int(value)), Stamp::int(64))
    }

    /// `base + offset` with a constant offset
    pub fn field_address(&mut self, base: NodeId, offset: i64) -> NodeId {
        self.graph.add_floating(
            NodeKind::Address {
                base,
                offset: Offset::Const(offset),
            },
            Stamp::Word,
        )
    }

    /// `base + offset` with a computed offset
    pub fn indexed_address(&mut self, base: NodeId, offset: NodeId) -> NodeId {
        self.graph.add_floating(
            NodeKind::Address {
                base,
                offset: Offset::Value(offset),
            },
            Stamp::Word,
        )
    }

    pub fn new_instance(&mut self, class: ClassRef, size: u32) -> NodeId {
        self.graph
            .append_fixed(NodeKind::NewInstance { class, size }, Stamp::non_null_object())
    }

    /// Append an arbitrary access node with an explicit result stamp
    pub fn access(&mut self, access: AccessNode, stamp: Stamp) -> NodeId {
        self.graph.append_fixed(NodeKind::Access(access), stamp)
    }

    pub fn read(&mut self, address: NodeId, target: TargetMetadata) -> NodeId {
        let stamp = value_stamp(&target);
        self.access(AccessNode::new(AccessOp::Read, address, target), stamp)
    }

    pub fn write(&mut self, address: NodeId, value: NodeId, target: TargetMetadata) -> NodeId {
        self.write_with(address, value, target, InitKind::None, false)
    }

    pub fn write_with(
        &mut self,
        address: NodeId,
        value: NodeId,
        target: TargetMetadata,
        init: InitKind,
        null_check: bool,
    ) -> NodeId {
        let access = AccessNode::new(AccessOp::Write { value }, address, target)
            .with_init(init)
            .with_null_check(null_check);
        self.access(access, Stamp::Void)
    }

    pub fn atomic_swap(&mut self, address: NodeId, value: NodeId, target: TargetMetadata) -> NodeId {
        let stamp = value_stamp(&target);
        self.access(
            AccessNode::new(AccessOp::AtomicSwap { value }, address, target),
            stamp,
        )
    }

    pub fn compare_and_swap(
        &mut self,
        address: NodeId,
        expected: NodeId,
        new_value: NodeId,
        target: TargetMetadata,
    ) -> NodeId {
        self.access(
            AccessNode::new(
                AccessOp::CompareAndSwap {
                    expected,
                    new_value,
                },
                address,
                target,
            ),
            Stamp::int(1),
        )
    }

    /// Copy `length` elements from `source` to `destination`
    pub fn array_copy(
        &mut self,
        source: NodeId,
        destination: NodeId,
        length: NodeId,
        target: TargetMetadata,
        init: InitKind,
    ) -> NodeId {
        let element_stride = u32::from(target.storage_size());
        let access = AccessNode::new(
            AccessOp::ArrayRangeWrite {
                source,
                length,
                element_stride,
            },
            destination,
            target,
        )
        .with_init(init);
        self.access(access, Stamp::Void)
    }

    pub fn ret(&mut self, value: Option<NodeId>) -> NodeId {
        self.graph.append_fixed(NodeKind::Return { value }, Stamp::Void)
    }

    pub fn finish(self) -> Graph {
        self.graph
    }
}

/// Stamp of a value read from `target`; references are always produced decoded
fn value_stamp(target: &TargetMetadata) -> Stamp {
    match target.value {
        ValueKind::Reference => Stamp::object(),
        ValueKind::Primitive(kind) => Stamp::int(kind.size_in_bytes() * 8),
    }
}
