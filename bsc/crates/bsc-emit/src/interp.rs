//! AArch64 interpreter for emitted barrier stubs
//!
//! Executes the instruction subset of [`A64Inst`] against a [`MachineEnv`] that
//! supplies memory and the runtime routines. Pushes go to a private stack rather
//! than memory.

use std::collections::BTreeSet;

use bsc_lir::ForeignCall;

use crate::aarch64::{A64Inst, A64Reg};
use crate::assembler::AsmCode;
use crate::error::EmitError;

/// Value left in call-clobbered argument registers after a routine returns
pub const CLOBBER_PATTERN: u64 = 0xdead_beef_dead_beef;

/// Return address `bl` leaves in the link register
pub const RETURN_ADDRESS_PATTERN: u64 = 0x0000_7fff_0000_0004;

const STACK_SLOT: i32 = 16;

/// Memory and runtime seen by the interpreted code
pub trait MachineEnv {
    type Error: From<EmitError>;

    fn read_u8(&mut self, addr: u64) -> Result<u8, Self::Error>;

    fn read_u32(&mut self, addr: u64) -> Result<u32, Self::Error>;

    fn read_u64(&mut self, addr: u64) -> Result<u64, Self::Error>;

    /// Run a two-argument routine and return its result
    fn call(&mut self, routine: ForeignCall, args: [u64; 2]) -> Result<u64, Self::Error>;
}

/// What one run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    pub steps: usize,
    pub calls: Vec<ForeignCall>,
    /// Every register written, in register order
    pub written: Vec<A64Reg>,
}

#[derive(Debug, Clone)]
pub struct Aarch64Machine {
    regs: [u64; A64Reg::COUNT],
    stack: Vec<u64>,
    pub step_limit: usize,
}

impl Aarch64Machine {
    pub fn new() -> Self {
        Self {
            regs: [0; A64Reg::COUNT],
            stack: Vec::new(),
            step_limit: 10_000,
        }
    }

    pub fn reg(&self, reg: A64Reg) -> Result<u64, EmitError> {
        self.regs
            .get(reg.0 as usize)
            .copied()
            .ok_or_else(|| EmitError::InvalidRegister(reg.to_string()))
    }

    pub fn set_reg(&mut self, reg: A64Reg, value: u64) -> Result<(), EmitError> {
        let slot = self
            .regs
            .get_mut(reg.0 as usize)
            .ok_or_else(|| EmitError::InvalidRegister(reg.to_string()))?;
        *slot = value;
        Ok(())
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Execute `code` from its first instruction until it falls off the end
    pub fn run<E: MachineEnv>(&mut self, code: &AsmCode<A64Inst>, env: &mut E) -> Result<Outcome, E::Error> {
        let mut outcome = Outcome::default();
        let mut written = BTreeSet::new();
        let mut pc = 0;

        while let Some(inst) = code.insts.get(pc) {
            outcome.steps += 1;
            if outcome.steps > self.step_limit {
                return Err(EmitError::StepLimit {
                    steps: self.step_limit,
                }
                .into());
            }
            let mut next = pc + 1;

            match *inst {
                A64Inst::LdrbImm { rt, rn, offset } => {
                    let addr = self.reg(rn)?.wrapping_add(offset as u64);
                    let value = env.read_u8(addr)?;
                    self.set_reg(rt, u64::from(value))?;
                }
                A64Inst::LdrbReg { rt, rn, rm } => {
                    let addr = self.reg(rn)?.wrapping_add(self.reg(rm)?);
                    let value = env.read_u8(addr)?;
                    self.set_reg(rt, u64::from(value))?;
                }
                A64Inst::LdrX { rt, rn, offset } => {
                    let addr = self.reg(rn)?.wrapping_add(offset as u64);
                    let value = env.read_u64(addr)?;
                    self.set_reg(rt, value)?;
                }
                A64Inst::LdrW { rt, rn, offset } => {
                    let addr = self.reg(rn)?.wrapping_add(offset as u64);
                    let value = env.read_u32(addr)?;
                    self.set_reg(rt, u64::from(value))?;
                }
                A64Inst::Tbz { rt, bit, target } => {
                    if self.reg(rt)? & (1 << bit) == 0 {
                        next = code.target(target)?;
                    }
                }
                A64Inst::Tbnz { rt, bit, target } => {
                    if self.reg(rt)? & (1 << bit) != 0 {
                        next = code.target(target)?;
                    }
                }
                A64Inst::Cbz { rt, target } => {
                    if self.reg(rt)? == 0 {
                        next = code.target(target)?;
                    }
                }
                A64Inst::LsrImm { rd, rn, shift } => {
                    let value = self.reg(rn)? >> shift;
                    self.set_reg(rd, value)?;
                }
                A64Inst::LslImm { rd, rn, shift } => {
                    let value = self.reg(rn)? << shift;
                    self.set_reg(rd, value)?;
                }
                A64Inst::AddReg { rd, rn, rm } => {
                    let value = self.reg(rn)?.wrapping_add(self.reg(rm)?);
                    self.set_reg(rd, value)?;
                }
                A64Inst::MovImm { rd, imm } => self.set_reg(rd, imm)?,
                A64Inst::MovReg { rd, rm } => {
                    let value = self.reg(rm)?;
                    self.set_reg(rd, value)?;
                }
                A64Inst::Push { rt } => {
                    let value = self.reg(rt)?;
                    self.stack.push(value);
                }
                A64Inst::Pop { rt } => {
                    let value = self
                        .stack
                        .pop()
                        .ok_or(EmitError::StackUnderflow { at: pc })?;
                    self.set_reg(rt, value)?;
                }
                A64Inst::AdjustSp { delta } => {
                    if delta % STACK_SLOT != 0 {
                        return Err(EmitError::MisalignedStack { delta, at: pc }.into());
                    }
                    let slots = (delta.unsigned_abs() / STACK_SLOT as u32) as usize;
                    if delta < 0 {
                        self.stack.extend(std::iter::repeat(0).take(slots));
                    } else {
                        if slots > self.stack.len() {
                            return Err(EmitError::StackUnderflow { at: pc }.into());
                        }
                        self.stack.truncate(self.stack.len() - slots);
                    }
                }
                A64Inst::Bl { routine } => {
                    let args = [self.reg(A64Reg::X0)?, self.reg(A64Reg(1))?];
                    self.set_reg(A64Reg::LR, RETURN_ADDRESS_PATTERN)?;
                    written.insert(A64Reg::LR);
                    log::trace!("bl {}({:#x}, {:#x})", routine.name(), args[0], args[1]);
                    let result = env.call(routine, args)?;
                    self.set_reg(A64Reg::X0, result)?;
                    self.set_reg(A64Reg(1), CLOBBER_PATTERN)?;
                    written.insert(A64Reg(1));
                    outcome.calls.push(routine);
                }
            }
            if let Some(def) = inst.def() {
                written.insert(def);
            }
            pc = next;
        }

        outcome.written = written.into_iter().collect();
        Ok(outcome)
    }
}

impl Default for Aarch64Machine {
    fn default() -> Self {
        Self::new()
    }
}
