//! Graph Barrier Inserter
//!
//! Walks the fixed chain once, classifies every access and splices barrier nodes
//! around it according to the access's [`InsertionRule`]:
//!
//! ```text
//!   write:  PreWrite ─▶ Write ─▶ PostWrite
//!   read:   Read ─▶ LoadReference [─▶ ReferentFieldRead]
//!   range:  ArrayRangePreWrite ─▶ ArrayRangeWrite ─▶ ArrayRangePostWrite
//! ```
//!
//! Load-reference barriers take over every use of the value they guard.

use bsc_ir::{
    AccessOp, ArrayRange, BarrierKind, BarrierOp, BarrierType, Graph, LoadReference, NodeId,
    NodeKind, PostWrite, PreWrite, ReferenceStrength, ReferentFieldRead, Stamp,
};
use indexmap::IndexMap;
use serde::Serialize;

use crate::error::{BarrierError, Result};
use crate::policy::{BarrierPolicy, InsertionRule};

/// Per-unit insertion summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InsertionStats {
    /// Accesses visited
    pub accesses: usize,
    /// Accesses classified `None`
    pub unbarriered: usize,
    /// Classification histogram
    pub classified: IndexMap<BarrierType, usize>,
    /// Barrier nodes created, by kind
    pub inserted: IndexMap<BarrierKind, usize>,
}

impl InsertionStats {
    pub fn inserted(&self, kind: BarrierKind) -> usize {
        self.inserted.get(&kind).copied().unwrap_or(0)
    }

    pub fn total_inserted(&self) -> usize {
        self.inserted.values().sum()
    }
}

pub struct Inserter<'a> {
    policy: &'a BarrierPolicy,
    stats: InsertionStats,
}

impl<'a> Inserter<'a> {
    pub fn new(policy: &'a BarrierPolicy) -> Self {
        Self {
            policy,
            stats: InsertionStats::default(),
        }
    }

    /// Instrument `graph` and return the summary
    pub fn run(mut self, graph: &mut Graph) -> Result<InsertionStats> {
        let existing = graph.barrier_nodes().len();
        if existing > 0 {
            return Err(BarrierError::AlreadyInstrumented { barriers: existing });
        }

        for id in graph.access_nodes() {
            self.process(graph, id)?;
        }

        log::debug!(
            "{}: {} accesses, {} unbarriered, {} barriers inserted",
            graph.name(),
            self.stats.accesses,
            self.stats.unbarriered,
            self.stats.total_inserted()
        );
        Ok(self.stats)
    }

    fn process(&mut self, graph: &mut Graph, id: NodeId) -> Result<()> {
        let access = graph.access(id)?;
        let class = access.class();
        let barrier_type = self.policy.classify(class, &access.target, access.init)?;
        graph.access_mut(id)?.set_barrier_type(barrier_type)?;

        self.stats.accesses += 1;
        *self.stats.classified.entry(barrier_type).or_insert(0) += 1;
        if barrier_type.is_none() {
            self.stats.unbarriered += 1;
            log::trace!("n{}: {} needs no barrier", id.0, class);
            return Ok(());
        }

        let rule = self.policy.insertion_rule(class, barrier_type)?;
        log::trace!("n{}: {} classified {} -> {:?}", id.0, class, barrier_type, rule);
        if rule != InsertionRule::RangePreAndPost {
            check_object_base(graph, id)?;
        }

        match rule {
            InsertionRule::LoadReference => {
                self.load_reference(graph, id, id, barrier_type)?;
            }
            InsertionRule::LoadReferenceThenKeepAlive => {
                let value = self.load_reference(graph, id, id, barrier_type)?;
                self.keep_alive(graph, id, value, false)?;
            }
            InsertionRule::LoadReferenceThenDynamicKeepAlive => {
                let value = self.load_reference(graph, id, id, barrier_type)?;
                self.keep_alive(graph, id, value, true)?;
            }
            InsertionRule::PreAndPost => {
                self.pre_write(graph, id, None)?;
                self.post_write(graph, id)?;
            }
            InsertionRule::ExpectedPreAndPost => {
                let expected = match graph.access(id)?.op {
                    AccessOp::CompareAndSwap { expected, .. } => expected,
                    _ => return Err(BarrierError::guarantee("expected-value pre-barrier on a non-CAS access")),
                };
                self.pre_write(graph, id, Some(expected))?;
                self.post_write(graph, id)?;
            }
            InsertionRule::SwapPreAndPost => {
                self.pre_write(graph, id, None)?;
                let post = self.post_write(graph, id)?;
                self.load_reference(graph, id, post, barrier_type)?;
            }
            InsertionRule::PostOnly => {
                self.post_write(graph, id)?;
            }
            InsertionRule::RangePreAndPost => {
                self.array_range(graph, id)?;
            }
        }
        Ok(())
    }

    /// Add a load-reference barrier for the value of `id` right after `anchor` when
    /// enabled; returns the node now carrying the loaded value
    fn load_reference(
        &mut self,
        graph: &mut Graph,
        id: NodeId,
        anchor: NodeId,
        barrier_type: BarrierType,
    ) -> Result<NodeId> {
        if !self.policy.load_reference {
            return Ok(id);
        }
        let stamp = graph.stamp(id)?;
        if !stamp.is_object() {
            return Err(BarrierError::guarantee(format!(
                "load-reference barrier over non-reference value n{} ({})",
                id.0, stamp
            )));
        }
        let strength = barrier_type
            .read_strength()
            .ok_or_else(|| BarrierError::guarantee(format!("no reference strength for {}", barrier_type)))?;
        let access = graph.access(id)?;
        let op = BarrierOp::LoadReference(LoadReference {
            address: access.address,
            value: id,
            narrow: access.target.narrow,
            strength,
        });

        let lrb = graph.add_after_fixed(anchor, NodeKind::Barrier(op), stamp)?;
        graph.replace_at_usages(id, lrb, lrb);
        self.count(BarrierKind::LoadReference);
        if strength != ReferenceStrength::Strong {
            log::trace!("n{}: {} load-reference barrier", lrb.0, strength);
        }
        Ok(lrb)
    }

    fn keep_alive(&mut self, graph: &mut Graph, id: NodeId, value: NodeId, dynamic_check: bool) -> Result<()> {
        if !self.policy.satb {
            return Ok(());
        }
        let address = graph.access(id)?.address;
        if dynamic_check && !matches!(graph.kind(address)?, NodeKind::Address { .. }) {
            return Err(BarrierError::guarantee(format!(
                "dynamic referent check needs a base+offset address, got n{}",
                address.0
            )));
        }
        let op = BarrierOp::ReferentFieldRead(ReferentFieldRead {
            address,
            value,
            dynamic_check,
        });
        graph.add_after_fixed(value, NodeKind::Barrier(op), Stamp::Void)?;
        self.count(BarrierKind::ReferentFieldRead);
        Ok(())
    }

    fn pre_write(&mut self, graph: &mut Graph, id: NodeId, expected: Option<NodeId>) -> Result<()> {
        if !self.policy.satb {
            return Ok(());
        }
        if let Some(expected) = expected {
            let stamp = graph.stamp(expected)?;
            if !stamp.is_object() {
                return Err(BarrierError::guarantee(format!(
                    "pre-write expected value n{} is not a reference ({})",
                    expected.0, stamp
                )));
            }
        }
        let access = graph.access_mut(id)?;
        let null_check = std::mem::replace(&mut access.null_check, false);
        let op = BarrierOp::PreWrite(PreWrite {
            address: access.address,
            expected,
            do_load: expected.is_none(),
            null_check,
            narrow: access.target.narrow,
        });
        graph.add_before_fixed(id, NodeKind::Barrier(op), Stamp::Void)?;
        self.count(BarrierKind::PreWrite);
        Ok(())
    }

    fn post_write(&mut self, graph: &mut Graph, id: NodeId) -> Result<NodeId> {
        let access = graph.access(id)?;
        let value = access.op.stored_value();
        if let Some(v) = value {
            let stamp = graph.stamp(v)?;
            if !stamp.is_object() {
                return Err(BarrierError::guarantee(format!(
                    "post-write over non-reference value n{} ({})",
                    v.0, stamp
                )));
            }
        }
        let op = BarrierOp::PostWrite(PostWrite {
            address: access.address,
            value,
            do_load: value.is_none(),
            null_check: false,
        });
        let post = graph.add_after_fixed(id, NodeKind::Barrier(op), Stamp::Void)?;
        self.count(BarrierKind::PostWrite);
        Ok(post)
    }

    fn array_range(&mut self, graph: &mut Graph, id: NodeId) -> Result<()> {
        let access = graph.access(id)?;
        let range = match access.op {
            AccessOp::ArrayRangeWrite {
                length,
                element_stride,
                ..
            } => ArrayRange {
                address: access.address,
                length,
                element_stride,
                narrow: access.target.narrow,
            },
            _ => return Err(BarrierError::guarantee("range barrier on a non-range access")),
        };
        if self.policy.satb {
            graph.add_before_fixed(id, NodeKind::Barrier(BarrierOp::ArrayRangePreWrite(range)), Stamp::Void)?;
            self.count(BarrierKind::ArrayRangePreWrite);
        }
        graph.add_after_fixed(id, NodeKind::Barrier(BarrierOp::ArrayRangePostWrite(range)), Stamp::Void)?;
        self.count(BarrierKind::ArrayRangePostWrite);
        Ok(())
    }

    fn count(&mut self, kind: BarrierKind) {
        *self.stats.inserted.entry(kind).or_insert(0) += 1;
    }
}

/// A reference access through `base + offset` needs an object base
fn check_object_base(graph: &Graph, id: NodeId) -> Result<()> {
    let address = graph.access(id)?.address;
    if let NodeKind::Address { base, .. } = *graph.kind(address)? {
        let stamp = graph.stamp(base)?;
        if !stamp.is_object() {
            return Err(BarrierError::guarantee(format!(
                "reference access n{} through non-object base n{} ({})",
                id.0, base.0, stamp
            )));
        }
    }
    Ok(())
}
