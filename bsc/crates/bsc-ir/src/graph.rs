//! Graph - floating value nodes and the fixed chain
//!
//! Nodes live in an arena indexed by [`NodeId`]. Fixed nodes are additionally linked
//! into one doubly-linked chain that starts at the `Start` node. Removing a fixed node
//! unlinks it from the chain; the arena slot stays so ids remain stable.

use std::fmt;

use crate::access::AccessNode;
use crate::barrier::{BarrierKind, BarrierOp};
use crate::define_idx;
use crate::error::{IrError, Result};
use crate::index::IndexVec;
use crate::stamp::Stamp;

define_idx!(
    /// Node id within one [`Graph`]
    NodeId
);

/// Compile-time constant value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constant {
    Null,
    Int(i64),
}

/// Offset part of an address computation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offset {
    Const(i64),
    Value(NodeId),
}

/// Runtime class metadata pointer, resolved by the producer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassRef(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Incoming argument
    Parameter { index: u32 },
    Constant(Constant),
    /// `base + offset`
    Address { base: NodeId, offset: Offset },

    /// Head of the fixed chain
    Start,
    /// Allocate a zeroed instance of `size` bytes
    NewInstance { class: ClassRef, size: u32 },
    Access(AccessNode),
    Barrier(BarrierOp),
    Return { value: Option<NodeId> },
}

impl NodeKind {
    /// Whether this kind belongs on the fixed chain
    pub fn is_fixed(&self) -> bool {
        !matches!(
            self,
            NodeKind::Parameter { .. } | NodeKind::Constant(_) | NodeKind::Address { .. }
        )
    }

    fn inputs_mut(&mut self) -> Vec<&mut NodeId> {
        match self {
            NodeKind::Parameter { .. }
            | NodeKind::Constant(_)
            | NodeKind::Start
            | NodeKind::NewInstance { .. } => Vec::new(),
            NodeKind::Address { base, offset } => {
                let mut inputs = vec![base];
                if let Offset::Value(v) = offset {
                    inputs.push(v);
                }
                inputs
            }
            NodeKind::Access(access) => access.inputs_mut(),
            NodeKind::Barrier(op) => op.inputs_mut(),
            NodeKind::Return { value } => value.as_mut().into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub stamp: Stamp,
    prev: Option<NodeId>,
    next: Option<NodeId>,
    on_chain: bool,
}

impl Node {
    fn new(kind: NodeKind, stamp: Stamp) -> Self {
        Self {
            kind,
            stamp,
            prev: None,
            next: None,
            on_chain: false,
        }
    }

    pub fn is_on_chain(&self) -> bool {
        self.on_chain
    }
}

/// One compiled unit
#[derive(Debug, Clone)]
pub struct Graph {
    name: String,
    nodes: IndexVec<NodeId, Node>,
    start: NodeId,
    tail: NodeId,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        let mut nodes = IndexVec::new();
        let mut start_node = Node::new(NodeKind::Start, Stamp::Void);
        start_node.on_chain = true;
        let start = nodes.push(start_node);
        Self {
            name: name.into(),
            nodes,
            start,
            tail: start,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&self) -> NodeId {
        self.start
    }

    /// Number of nodes ever created, including removed fixed nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id).ok_or(IrError::UnknownNode(id))
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(id).ok_or(IrError::UnknownNode(id))
    }

    pub fn kind(&self, id: NodeId) -> Result<&NodeKind> {
        self.node(id).map(|n| &n.kind)
    }

    pub fn stamp(&self, id: NodeId) -> Result<Stamp> {
        self.node(id).map(|n| n.stamp)
    }

    pub fn access(&self, id: NodeId) -> Result<&AccessNode> {
        match self.kind(id)? {
            NodeKind::Access(access) => Ok(access),
            _ => Err(IrError::NotAnAccess(id)),
        }
    }

    pub fn access_mut(&mut self, id: NodeId) -> Result<&mut AccessNode> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::Access(access) => Ok(access),
            _ => Err(IrError::NotAnAccess(id)),
        }
    }

    /// Add a floating value node
    pub fn add_floating(&mut self, kind: NodeKind, stamp: Stamp) -> NodeId {
        debug_assert!(!kind.is_fixed(), "fixed node added as floating: {:?}", kind);
        self.nodes.push(Node::new(kind, stamp))
    }

    /// Append a fixed node at the end of the chain
    pub fn append_fixed(&mut self, kind: NodeKind, stamp: Stamp) -> NodeId {
        let tail = self.tail;
        self.link_after(tail, kind, stamp)
    }

    /// Insert a fixed node immediately after `anchor`
    pub fn add_after_fixed(&mut self, anchor: NodeId, kind: NodeKind, stamp: Stamp) -> Result<NodeId> {
        self.check_on_chain(anchor)?;
        Ok(self.link_after(anchor, kind, stamp))
    }

    /// Insert a fixed node immediately before `anchor`
    pub fn add_before_fixed(&mut self, anchor: NodeId, kind: NodeKind, stamp: Stamp) -> Result<NodeId> {
        self.check_on_chain(anchor)?;
        match self.nodes[anchor].prev {
            Some(prev) => Ok(self.link_after(prev, kind, stamp)),
            // Nothing precedes Start
            None => Err(IrError::NotFixed(anchor)),
        }
    }

    /// Unlink a fixed node from the chain
    pub fn remove_fixed(&mut self, id: NodeId) -> Result<()> {
        self.check_on_chain(id)?;
        if id == self.start {
            return Err(IrError::NotFixed(id));
        }
        let (prev, next) = {
            let node = &self.nodes[id];
            (node.prev, node.next)
        };
        if let Some(p) = prev {
            self.nodes[p].next = next;
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev.unwrap_or(self.start),
        }
        let node = &mut self.nodes[id];
        node.prev = None;
        node.next = None;
        node.on_chain = false;
        Ok(())
    }

    /// Snapshot of the fixed chain in order, starting with `Start`
    pub fn fixed_chain(&self) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut cursor = Some(self.start);
        while let Some(id) = cursor {
            chain.push(id);
            cursor = self.nodes[id].next;
        }
        chain
    }

    pub fn next_fixed(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|n| n.next)
    }

    pub fn prev_fixed(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|n| n.prev)
    }

    /// Barrier nodes still on the chain, in order
    pub fn barrier_nodes(&self) -> Vec<NodeId> {
        self.fixed_chain()
            .into_iter()
            .filter(|&id| matches!(self.nodes[id].kind, NodeKind::Barrier(_)))
            .collect()
    }

    pub fn count_barriers(&self, kind: BarrierKind) -> usize {
        self.barrier_nodes()
            .into_iter()
            .filter(|&id| match &self.nodes[id].kind {
                NodeKind::Barrier(op) => op.kind() == kind,
                _ => false,
            })
            .count()
    }

    /// Access nodes on the chain, in order
    pub fn access_nodes(&self) -> Vec<NodeId> {
        self.fixed_chain()
            .into_iter()
            .filter(|&id| matches!(self.nodes[id].kind, NodeKind::Access(_)))
            .collect()
    }

    /// Every node ever created, in creation order
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> + '_ {
        self.nodes.iter_enumerated()
    }

    /// Number of `Parameter` nodes
    pub fn parameter_count(&self) -> usize {
        self.nodes
            .iter_enumerated()
            .filter(|(_, n)| matches!(n.kind, NodeKind::Parameter { .. }))
            .count()
    }

    /// Redirect every use of `old` to `new`, except inputs of `except`
    pub fn replace_at_usages(&mut self, old: NodeId, new: NodeId, except: NodeId) -> usize {
        let mut replaced = 0;
        for id in self.nodes.indices() {
            if id == except {
                continue;
            }
            for input in self.nodes[id].kind.inputs_mut() {
                if *input == old {
                    *input = new;
                    replaced += 1;
                }
            }
        }
        replaced
    }

    fn check_on_chain(&self, id: NodeId) -> Result<()> {
        let node = self.node(id)?;
        if !node.kind.is_fixed() {
            return Err(IrError::NotFixed(id));
        }
        if !node.on_chain {
            return Err(IrError::Removed(id));
        }
        Ok(())
    }

    fn link_after(&mut self, anchor: NodeId, kind: NodeKind, stamp: Stamp) -> NodeId {
        debug_assert!(kind.is_fixed(), "floating node linked into chain: {:?}", kind);
        let next = self.nodes[anchor].next;
        let mut node = Node::new(kind, stamp);
        node.prev = Some(anchor);
        node.next = next;
        node.on_chain = true;
        let id = self.nodes.push(node);
        self.nodes[anchor].next = Some(id);
        match next {
            Some(n) => self.nodes[n].prev = Some(id),
            None => self.tail = id,
        }
        id
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "graph {} {{", self.name)?;
        for id in self.fixed_chain() {
            let node = &self.nodes[id];
            match &node.kind {
                NodeKind::Access(access) => writeln!(
                    f,
                    "  n{}: {} {:?} @n{} [{:?}, {:?}] : {}",
                    id.0,
                    access.class(),
                    access.target.location,
                    access.address.0,
                    access.init,
                    access.barrier_type(),
                    node.stamp
                )?,
                NodeKind::Barrier(op) => {
                    writeln!(f, "  n{}: barrier {} @n{}", id.0, op.kind(), op.address().0)?
                }
                other => writeln!(f, "  n{}: {:?} : {}", id.0, other, node.stamp)?,
            }
        }
        write!(f, "}}")
    }
}
