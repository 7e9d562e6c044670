//! Snippet Lowering - Graph to LIR
//!
//! Walks the fixed chain in order and emits LIR for every node. Floating values are
//! materialized on first use, always before the fragment that needs them opens any
//! branch. Barrier nodes become inline fragments at their chain position and are
//! unlinked from the graph afterwards; lowering fails if any barrier survives.

use bsc_ir::{
    AccessNode, AccessOp, BarrierKind, BarrierOp, Constant, Graph, NodeId, NodeKind, Offset,
    ValueKind,
};
use bsc_lir::{Address, BinOp, ForeignCall, LirFunction, LirInst, Operand, VReg, Width};
use rustc_hash::FxHashMap;

use crate::config::{BarrierConfig, LrbLowering};
use crate::counters::BarrierCounters;
use crate::error::{BarrierError, Result};
use crate::layout::BarrierLayout;
use crate::snippets::array_range::{self, RangeArgs};
use crate::snippets::load_reference::{self, LoadReferenceArgs};
use crate::snippets::pre_write::{self, PreWriteArgs};
use crate::snippets::referent::{self, ReferentCheck};
use crate::snippets::{post_write, SnippetEmitter};

pub struct Lowering<'a> {
    config: &'a BarrierConfig,
    layout: &'a BarrierLayout,
    counters: &'a BarrierCounters,
    func: LirFunction,
    values: FxHashMap<NodeId, VReg>,
}

impl<'a> Lowering<'a> {
    pub fn new(config: &'a BarrierConfig, layout: &'a BarrierLayout, counters: &'a BarrierCounters) -> Self {
        Self {
            config,
            layout,
            counters,
            func: LirFunction::new(""),
            values: FxHashMap::default(),
        }
    }

    /// Lower `graph`, removing its barrier nodes
    pub fn run(mut self, graph: &mut Graph) -> Result<LirFunction> {
        self.func.name = graph.name().to_string();

        let mut params: Vec<(u32, NodeId)> = graph
            .nodes()
            .filter_map(|(id, node)| match node.kind {
                NodeKind::Parameter { index } => Some((index, id)),
                _ => None,
            })
            .collect();
        params.sort_unstable();
        for (_, id) in params {
            let reg = self.func.new_vreg();
            self.func.params.push(reg);
            self.values.insert(id, reg);
        }

        let mut returned = false;
        for id in graph.fixed_chain() {
            let before = self.func.len();
            let kind = graph.kind(id)?.clone();
            match &kind {
                NodeKind::Start => {}
                NodeKind::NewInstance { class, size } => {
                    let dst = self.func.new_vreg();
                    self.func.push(LirInst::Call {
                        target: ForeignCall::NewInstance,
                        args: vec![Operand::Imm(class.0 as i64), Operand::Imm(i64::from(*size))],
                        result: Some(dst),
                    });
                    self.values.insert(id, dst);
                }
                NodeKind::Access(access) => self.lower_access(graph, id, access)?,
                NodeKind::Barrier(op) => {
                    self.lower_barrier(graph, id, op)?;
                    log::trace!(
                        "{}: {} fragment, {} instructions",
                        graph.name(),
                        op.kind(),
                        self.func.len() - before
                    );
                }
                NodeKind::Return { value } => {
                    let value = match value {
                        Some(v) => Some(Operand::Reg(self.value(graph, *v)?)),
                        None => None,
                    };
                    self.func.push(LirInst::Return { value });
                    returned = true;
                }
                NodeKind::Parameter { .. } | NodeKind::Constant(_) | NodeKind::Address { .. } => {
                    return Err(BarrierError::guarantee(format!("floating node n{} on the fixed chain", id.0)));
                }
            }
        }
        if !returned {
            self.func.push(LirInst::Return { value: None });
        }

        for id in graph.barrier_nodes() {
            graph.remove_fixed(id)?;
        }
        let remaining = graph.barrier_nodes().len();
        if remaining > 0 {
            return Err(BarrierError::BarrierRemaining { count: remaining });
        }
        if let Err(label) = self.func.label_positions() {
            return Err(BarrierError::guarantee(format!("label {} bound twice", label)));
        }

        log::debug!(
            "{}: lowered to {} instructions, {} runtime call sites",
            graph.name(),
            self.func.len(),
            self.func.count_calls()
        );
        Ok(self.func)
    }

    /// Register holding the value of `id`
    fn value(&mut self, graph: &Graph, id: NodeId) -> Result<VReg> {
        if let Some(&reg) = self.values.get(&id) {
            return Ok(reg);
        }
        let reg = match graph.kind(id)? {
            NodeKind::Constant(c) => {
                let imm = match c {
                    Constant::Null => 0,
                    Constant::Int(v) => *v,
                };
                let dst = self.func.new_vreg();
                self.func.push(LirInst::Move {
                    dst,
                    src: Operand::Imm(imm),
                });
                dst
            }
            NodeKind::Address { base, offset } => {
                let base = self.value(graph, *base)?;
                let dst = self.func.new_vreg();
                match offset {
                    Offset::Const(disp) => self.func.push(LirInst::Lea {
                        dst,
                        addr: Address::Base { base, disp: *disp },
                    }),
                    Offset::Value(v) => {
                        let offset = self.value(graph, *v)?;
                        self.func.push(LirInst::BinOp {
                            op: BinOp::Add,
                            dst,
                            lhs: base,
                            rhs: Operand::Reg(offset),
                        });
                    }
                }
                dst
            }
            _ => {
                return Err(BarrierError::guarantee(format!(
                    "n{} used before its definition",
                    id.0
                )))
            }
        };
        self.values.insert(id, reg);
        Ok(reg)
    }

    /// Object whose null-ness guards an access through `address`
    fn null_check_base(&mut self, graph: &Graph, address: NodeId) -> Result<VReg> {
        match graph.kind(address)? {
            NodeKind::Address { base, .. } => {
                let base = *base;
                self.value(graph, base)
            }
            _ => self.value(graph, address),
        }
    }

    fn lower_access(&mut self, graph: &Graph, id: NodeId, access: &AccessNode) -> Result<()> {
        if access.barrier_type().is_none() {
            return Err(BarrierError::MissingClassification(id));
        }
        let field = self.value(graph, access.address)?;
        if access.null_check {
            let base = self.null_check_base(graph, access.address)?;
            self.func.push(LirInst::NullCheck { base });
        }
        let slot = Address::Base { base: field, disp: 0 };
        let narrow = access.target.value == ValueKind::Reference && access.target.narrow;
        let width = if narrow {
            Width::W32
        } else {
            Width::from_bytes(access.target.storage_size())
                .ok_or_else(|| BarrierError::guarantee("unsupported access width"))?
        };

        match access.op {
            AccessOp::Read => {
                let raw = self.func.new_vreg();
                self.func.push(LirInst::Load {
                    dst: raw,
                    addr: slot,
                    width,
                });
                let value = self.decode(raw, narrow)?;
                self.values.insert(id, value);
            }
            AccessOp::Write { value } => {
                let value = self.value(graph, value)?;
                let src = self.encode(value, narrow)?;
                self.func.push(LirInst::Store {
                    addr: slot,
                    src: Operand::Reg(src),
                    width,
                });
            }
            AccessOp::AtomicSwap { value } => {
                let value = self.value(graph, value)?;
                let src = self.encode(value, narrow)?;
                let raw = self.func.new_vreg();
                self.func.push(LirInst::AtomicSwap {
                    dst: raw,
                    addr: slot,
                    src,
                    width,
                });
                let old = self.decode(raw, narrow)?;
                self.values.insert(id, old);
            }
            AccessOp::CompareAndSwap { expected, new_value } => {
                let expected = self.value(graph, expected)?;
                let new_value = self.value(graph, new_value)?;
                let expected = self.encode(expected, narrow)?;
                let new_value = self.encode(new_value, narrow)?;
                let result = self.func.new_vreg();
                self.func.push(LirInst::CompareAndSwap {
                    result,
                    addr: slot,
                    expected,
                    new_value,
                    width,
                });
                self.values.insert(id, result);
            }
            AccessOp::ArrayRangeWrite {
                source,
                length,
                element_stride,
            } => {
                let src = self.value(graph, source)?;
                let length = self.value(graph, length)?;
                self.func.push(LirInst::CopyMemory {
                    dst: field,
                    src,
                    length,
                    stride: element_stride,
                });
            }
        }
        Ok(())
    }

    fn lower_barrier(&mut self, graph: &Graph, id: NodeId, op: &BarrierOp) -> Result<()> {
        match *op {
            BarrierOp::PreWrite(pre) => {
                let field = self.value(graph, pre.address)?;
                let expected = match pre.expected {
                    Some(e) => Some(self.value(graph, e)?),
                    None => None,
                };
                let null_check_base = if pre.null_check {
                    Some(self.null_check_base(graph, pre.address)?)
                } else {
                    None
                };
                let args = PreWriteArgs {
                    field,
                    expected,
                    do_load: pre.do_load,
                    null_check_base,
                    narrow: pre.narrow,
                    kind: BarrierKind::PreWrite,
                };
                pre_write::emit(&mut self.emitter(), args)
            }
            BarrierOp::PostWrite(post) => {
                let field = self.value(graph, post.address)?;
                if post.null_check {
                    let base = self.null_check_base(graph, post.address)?;
                    self.func.push(LirInst::NullCheck { base });
                }
                let value = match post.value {
                    Some(v) => Some(self.value(graph, v)?),
                    None => None,
                };
                post_write::emit(&mut self.emitter(), field, value)
            }
            BarrierOp::LoadReference(lrb) => {
                let field = self.value(graph, lrb.address)?;
                let value = self.value(graph, lrb.value)?;
                let result = self.func.new_vreg();
                self.func.push(LirInst::Move {
                    dst: result,
                    src: Operand::Reg(value),
                });
                self.values.insert(id, result);
                let reload = !matches!(
                    graph.kind(lrb.value)?,
                    NodeKind::Access(AccessNode {
                        op: AccessOp::AtomicSwap { .. },
                        ..
                    })
                );
                // The platform stub always re-reads the field
                if self.config.lrb_lowering == LrbLowering::Snippet || !reload {
                    return load_reference::emit(
                        &mut self.emitter(),
                        LoadReferenceArgs {
                            field,
                            result,
                            strength: lrb.strength,
                            narrow: lrb.narrow,
                            reload,
                        },
                    );
                }
                if lrb.narrow {
                    // Fails early when no encoding is configured
                    self.emitter().encoding()?;
                }
                self.emitter().verify_oop(result);
                self.func.push(LirInst::LoadReferenceBarrier {
                    object: result,
                    field_address: field,
                    strength: lrb.strength,
                    narrow: lrb.narrow,
                });
                Ok(())
            }
            BarrierOp::ReferentFieldRead(read) => {
                let field = self.value(graph, read.address)?;
                let value = self.value(graph, read.value)?;
                let check = if !read.dynamic_check {
                    ReferentCheck::None
                } else {
                    match graph.kind(read.address)? {
                        NodeKind::Address { base, offset } => {
                            let (base, offset) = (*base, *offset);
                            let base = self.value(graph, base)?;
                            match offset {
                                Offset::Const(offset) => ReferentCheck::ConstOffset { base, offset },
                                Offset::Value(v) => ReferentCheck::Dynamic {
                                    base,
                                    offset: self.value(graph, v)?,
                                },
                            }
                        }
                        _ => {
                            return Err(BarrierError::guarantee(
                                "dynamic referent check without base+offset address",
                            ))
                        }
                    }
                };
                referent::emit(&mut self.emitter(), field, value, check)
            }
            BarrierOp::ArrayRangePreWrite(range) => {
                let args = self.range_args(graph, &range)?;
                array_range::emit_pre(&mut self.emitter(), args)
            }
            BarrierOp::ArrayRangePostWrite(range) => {
                let args = self.range_args(graph, &range)?;
                array_range::emit_post(&mut self.emitter(), args)
            }
        }
    }

    fn range_args(&mut self, graph: &Graph, range: &bsc_ir::ArrayRange) -> Result<RangeArgs> {
        Ok(RangeArgs {
            start: self.value(graph, range.address)?,
            length: self.value(graph, range.length)?,
            element_stride: range.element_stride,
            narrow: range.narrow,
        })
    }

    fn emitter(&mut self) -> SnippetEmitter<'_> {
        SnippetEmitter {
            func: &mut self.func,
            config: self.config,
            layout: self.layout,
            counters: self.counters,
        }
    }

    fn encode(&mut self, value: VReg, narrow: bool) -> Result<VReg> {
        if !narrow {
            return Ok(value);
        }
        let encoding = self.emitter().encoding()?;
        let dst = self.func.new_vreg();
        self.func.push(LirInst::Compress {
            dst,
            src: value,
            encoding,
        });
        Ok(dst)
    }

    fn decode(&mut self, raw: VReg, narrow: bool) -> Result<VReg> {
        if !narrow {
            return Ok(raw);
        }
        let encoding = self.emitter().encoding()?;
        let dst = self.func.new_vreg();
        self.func.push(LirInst::Uncompress {
            dst,
            src: raw,
            encoding,
        });
        Ok(dst)
    }
}
