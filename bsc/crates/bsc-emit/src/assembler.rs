//! Platform-neutral assembler interface
//!
//! [`BarrierAssembler`] is the set of operations barrier stubs are written
//! against. Each target implements the primitives; the slow-path call sequence is
//! shared.

use std::fmt;

use bsc_ir::define_idx;
use bsc_lir::{BitState, CompressEncoding, ForeignCall};

use crate::calling_convention::CallingConvention;
use crate::error::{EmitError, Result};

define_idx!(
    /// Branch target inside one emitted stub
    AsmLabel
);

impl fmt::Display for AsmLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ".L{}", self.0)
    }
}

/// Instruction buffer with label bookkeeping
#[derive(Debug, Clone)]
pub struct AsmBuffer<I> {
    insts: Vec<I>,
    labels: Vec<Option<usize>>,
}

impl<I> AsmBuffer<I> {
    pub fn new() -> Self {
        Self {
            insts: Vec::new(),
            labels: Vec::new(),
        }
    }

    pub fn new_label(&mut self) -> AsmLabel {
        self.labels.push(None);
        AsmLabel(self.labels.len() as u32 - 1)
    }

    /// Bind `label` to the next emitted instruction
    pub fn bind(&mut self, label: AsmLabel) -> Result<()> {
        let pos = self.insts.len();
        match self.labels.get_mut(label.0 as usize) {
            Some(slot @ None) => {
                *slot = Some(pos);
                Ok(())
            }
            Some(Some(_)) => Err(EmitError::LabelRebound(label)),
            None => Err(EmitError::UnboundLabel(label)),
        }
    }

    pub fn push(&mut self, inst: I) {
        self.insts.push(inst);
    }

    pub fn len(&self) -> usize {
        self.insts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    /// Resolve labels; every created label must be bound
    pub fn finish(self) -> Result<AsmCode<I>> {
        let mut labels = Vec::with_capacity(self.labels.len());
        for (i, pos) in self.labels.into_iter().enumerate() {
            labels.push(pos.ok_or(EmitError::UnboundLabel(AsmLabel(i as u32)))?);
        }
        Ok(AsmCode {
            insts: self.insts,
            labels,
        })
    }
}

impl<I> Default for AsmBuffer<I> {
    fn default() -> Self {
        Self::new()
    }
}

/// Finished instruction stream with resolved labels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsmCode<I> {
    pub insts: Vec<I>,
    /// Instruction index each label is bound to; may equal `insts.len()`
    pub labels: Vec<usize>,
}

impl<I> AsmCode<I> {
    pub fn target(&self, label: AsmLabel) -> Result<usize> {
        self.labels
            .get(label.0 as usize)
            .copied()
            .ok_or(EmitError::UnboundLabel(label))
    }
}

impl<I: fmt::Display> fmt::Display for AsmCode<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for pos in 0..=self.insts.len() {
            for (label, _) in self.labels.iter().enumerate().filter(|(_, &p)| p == pos) {
                writeln!(f, "{}:", AsmLabel(label as u32))?;
            }
            if let Some(inst) = self.insts.get(pos) {
                writeln!(f, "    {}", inst)?;
            }
        }
        Ok(())
    }
}

/// Target operations used by barrier stubs
pub trait BarrierAssembler {
    type Reg: Copy + Eq + fmt::Debug + fmt::Display + 'static;

    fn convention(&self) -> &CallingConvention<Self::Reg>;

    fn new_label(&mut self) -> AsmLabel;

    fn bind(&mut self, label: AsmLabel) -> Result<()>;

    /// `dst = zero_extend(byte [thread + disp])`
    fn load_thread_byte(&mut self, dst: Self::Reg, disp: i32);

    /// Branch to `target` when bit `bit` of `src` is in state `when`
    fn test_bit_and_branch(&mut self, src: Self::Reg, bit: u8, when: BitState, target: AsmLabel);

    /// `dst = byte [table + (index >> shift)]`; clobbers both scratch registers
    fn indexed_byte_load(&mut self, dst: Self::Reg, table: u64, index: Self::Reg, shift: u8);

    /// `dst = [addr]`, 32-bit zero-extending when `narrow`
    fn load_field(&mut self, dst: Self::Reg, addr: Self::Reg, narrow: bool);

    /// Decode a narrow reference in place, leaving null as null
    fn decode_narrow(&mut self, reg: Self::Reg, encoding: CompressEncoding) -> Result<()>;

    fn move_reg(&mut self, dst: Self::Reg, src: Self::Reg);

    fn swap_regs(&mut self, a: Self::Reg, b: Self::Reg);

    fn push(&mut self, reg: Self::Reg);

    fn pop(&mut self, reg: Self::Reg);

    /// Move the stack pointer by `delta` bytes; negative grows the stack
    fn adjust_stack(&mut self, delta: i32);

    fn call_routine(&mut self, routine: ForeignCall);

    /// Full slow-path call: save clobbered argument registers and the link
    /// register, align the stack, move `args` into place, call, move the return
    /// value into `result`, restore.
    fn emit_call(&mut self, routine: ForeignCall, args: &[Self::Reg], result: Self::Reg) -> Result<()> {
        let cc = self.convention().clone();
        if args.len() > cc.arg_regs.len() {
            return Err(EmitError::RegisterConflict(format!(
                "{} takes {} register arguments, convention has {}",
                routine.name(),
                args.len(),
                cc.arg_regs.len()
            )));
        }
        let mut saved: Vec<Self::Reg> = cc
            .call_clobbered(args.len())
            .into_iter()
            .filter(|&r| r != result)
            .collect();
        saved.extend(cc.link_reg);
        for &reg in &saved {
            self.push(reg);
        }
        let padding = cc.call_padding(saved.len()) as i32;
        if padding != 0 {
            self.adjust_stack(-padding);
        }

        let moves: Vec<(Self::Reg, Self::Reg)> = args
            .iter()
            .copied()
            .zip(cc.arg_regs.iter().copied())
            .collect();
        parallel_move(self, &moves)?;
        self.call_routine(routine);
        if result != cc.ret_reg {
            self.move_reg(result, cc.ret_reg);
        }
        if padding != 0 {
            self.adjust_stack(padding);
        }

        for &reg in saved.iter().rev() {
            self.pop(reg);
        }
        Ok(())
    }
}

/// Move each `(src, dst)` pair as if all reads happened first
///
/// Supports up to two moves, which covers every barrier routine.
pub fn parallel_move<A: BarrierAssembler + ?Sized>(asm: &mut A, moves: &[(A::Reg, A::Reg)]) -> Result<()> {
    match *moves {
        [] => Ok(()),
        [(src, dst)] => {
            if src != dst {
                asm.move_reg(dst, src);
            }
            Ok(())
        }
        [(s0, d0), (s1, d1)] => {
            if s0 == s1 || d0 == d1 {
                return Err(EmitError::RegisterConflict(
                    "parallel move with aliased operands".to_string(),
                ));
            }
            if s0 == d1 && s1 == d0 {
                asm.swap_regs(d0, d1);
            } else if s1 == d0 {
                // d0 still holds the second source
                asm.move_reg(d1, s1);
                if s0 != d0 {
                    asm.move_reg(d0, s0);
                }
            } else {
                if s0 != d0 {
                    asm.move_reg(d0, s0);
                }
                if s1 != d1 {
                    asm.move_reg(d1, s1);
                }
            }
            Ok(())
        }
        _ => Err(EmitError::RegisterConflict(format!(
            "parallel move of {} values",
            moves.len()
        ))),
    }
}
