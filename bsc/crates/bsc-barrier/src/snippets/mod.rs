//! Barrier fragments
//!
//! Each submodule expands one barrier kind into inline LIR. Fragments receive their
//! operands already materialized in virtual registers and only branch forward to
//! their own labels (the range loops also branch back to their loop head), so every
//! value defined before a fragment is still valid after it.
//!
//! Diagnostics (counters, pointer verification, tracing) never feed a branch or a
//! store that the barrier itself performs.

pub(crate) mod array_range;
pub(crate) mod load_reference;
pub(crate) mod post_write;
pub(crate) mod pre_write;
pub(crate) mod referent;

use bsc_ir::BarrierKind;
use bsc_lir::{
    Address, BinOp, BranchHint, CompressEncoding, Cond, ForeignCall, Label, LirFunction, LirInst,
    Operand, VReg, Width,
};

use crate::config::BarrierConfig;
use crate::counters::{BarrierCounters, CounterEvent};
use crate::error::{BarrierError, Result};
use crate::layout::BarrierLayout;

pub(crate) struct SnippetEmitter<'a> {
    pub func: &'a mut LirFunction,
    pub config: &'a BarrierConfig,
    pub layout: &'a BarrierLayout,
    pub counters: &'a BarrierCounters,
}

impl<'a> SnippetEmitter<'a> {
    pub fn reg(&mut self) -> VReg {
        self.func.new_vreg()
    }

    pub fn label(&mut self) -> Label {
        self.func.new_label()
    }

    pub fn emit(&mut self, inst: LirInst) {
        self.func.push(inst);
    }

    pub fn bind(&mut self, label: Label) {
        self.emit(LirInst::Bind(label));
    }

    pub fn jump(&mut self, target: Label) {
        self.emit(LirInst::Jump { target });
    }

    pub fn branch(&mut self, cond: Cond, lhs: VReg, rhs: Operand, target: Label, hint: BranchHint) {
        self.emit(LirInst::Branch {
            cond,
            lhs,
            rhs,
            target,
            hint,
        });
    }

    pub fn binop(&mut self, op: BinOp, lhs: VReg, rhs: Operand) -> VReg {
        let dst = self.reg();
        self.emit(LirInst::BinOp { op, dst, lhs, rhs });
        dst
    }

    pub fn load(&mut self, addr: Address, width: Width) -> VReg {
        let dst = self.reg();
        self.emit(LirInst::Load { dst, addr, width });
        dst
    }

    pub fn load_thread(&mut self, disp: i32, width: Width) -> VReg {
        self.load(Address::Thread { disp }, width)
    }

    pub fn imm(&mut self, value: i64) -> VReg {
        let dst = self.reg();
        self.emit(LirInst::Move {
            dst,
            src: Operand::Imm(value),
        });
        dst
    }

    pub fn encoding(&self) -> Result<CompressEncoding> {
        match (self.config.narrow_pointers, self.config.compress_encoding) {
            (true, Some(encoding)) => Ok(encoding),
            _ => Err(BarrierError::guarantee(
                "narrow reference access without narrow pointers configured",
            )),
        }
    }

    /// Load a reference from `[addr]`, decoding a narrow slot
    pub fn load_reference(&mut self, addr: VReg, narrow: bool) -> Result<VReg> {
        let slot = Address::Base { base: addr, disp: 0 };
        if !narrow {
            return Ok(self.load(slot, Width::W64));
        }
        let encoding = self.encoding()?;
        let raw = self.load(slot, Width::W32);
        let dst = self.reg();
        self.emit(LirInst::Uncompress {
            dst,
            src: raw,
            encoding,
        });
        Ok(dst)
    }

    pub fn count(&mut self, kind: BarrierKind, event: CounterEvent) {
        if self.config.snippet_counters {
            let handle = self.counters.handle(kind, event);
            self.emit(LirInst::IncrementCounter(handle));
        }
    }

    pub fn verify_oop(&mut self, value: VReg) {
        if self.config.verify_oops {
            let checked = self.reg();
            self.emit(LirInst::Call {
                target: ForeignCall::VerifyOop,
                args: vec![Operand::Reg(value)],
                result: Some(checked),
            });
        }
    }

    /// Emit `event` when tracing is compiled in and the collection count exceeds
    /// the start cycle
    pub fn trace(&mut self, event: &'static str, fields: Vec<(&'static str, Operand)>) {
        if !self.config.tracing_enabled() {
            return;
        }
        let skip = self.label();
        let cycle = self.load(
            Address::Absolute(self.layout.gc_total_collections_address),
            Width::W64,
        );
        let threshold = i64::from(self.config.trace_start_cycle) + 1;
        self.branch(Cond::Lt, cycle, Operand::Imm(threshold), skip, BranchHint::Likely);
        let mut all = vec![("cycle", Operand::Reg(cycle))];
        all.extend(fields);
        self.emit(LirInst::Trace { event, fields: all });
        self.bind(skip);
    }

    /// Log `prev` into the thread's SATB buffer, or hand it to the runtime when the
    /// buffer is full.
    ///
    /// Buffer and index are read fresh on every call. Control falls through after
    /// the slow call; the fast path jumps to `done`, which the caller binds next.
    pub fn satb_enqueue(&mut self, prev: VReg, done: Label) {
        let slow = self.label();
        let index = self.load_thread(self.layout.satb_index_offset, Width::W64);
        self.branch(Cond::Eq, index, Operand::Imm(0), slow, BranchHint::Unlikely);

        let buffer = self.load_thread(self.layout.satb_buffer_offset, Width::W64);
        let next = self.binop(BinOp::Sub, index, Operand::Imm(self.layout.word()));
        self.emit(LirInst::Store {
            addr: Address::Indexed {
                base: buffer,
                index: next,
                shift: 0,
                disp: 0,
            },
            src: Operand::Reg(prev),
            width: Width::W64,
        });
        self.emit(LirInst::Store {
            addr: Address::Thread {
                disp: self.layout.satb_index_offset,
            },
            src: Operand::Reg(next),
            width: Width::W64,
        });
        self.jump(done);

        self.bind(slow);
        self.emit(LirInst::Call {
            target: ForeignCall::SatbEnqueue,
            args: vec![Operand::Reg(prev)],
            result: None,
        });
    }

    /// Shift amount for a power-of-two element stride
    pub fn stride_shift(&self, stride: u32) -> Result<u8> {
        if stride == 0 || !stride.is_power_of_two() {
            return Err(BarrierError::guarantee(format!(
                "element stride {} is not a power of two",
                stride
            )));
        }
        Ok(stride.trailing_zeros() as u8)
    }
}
