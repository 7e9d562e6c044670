//! LIR interpreter
//!
//! Runs a lowered unit on one mutator thread against the simulated runtime.
//! `Address::Thread` resolves against the thread's block; runtime calls go to
//! [`Runtime::call`]. A `LoadReferenceBarrier` pseudo-instruction is expanded
//! with the AArch64 stub emitter and executed on the AArch64 interpreter, with the
//! object in `x19`, the field address in `x20` and the thread block in `x28`.

use std::collections::hash_map::Entry;

use bsc_emit::{A64Inst, A64Reg, Aarch64Assembler, Aarch64Machine, AsmCode, LoadReferenceBarrierOp, MachineEnv};
use bsc_ir::ReferenceStrength;
use bsc_lir::{Address, BinOp, BitState, ForeignCall, Label, LirFunction, LirInst, Operand, VReg, Width};
use rustc_hash::FxHashMap;

use crate::error::{Result, SimError};
use crate::runtime::Runtime;
use crate::thread::MutatorThread;

pub const STUB_OBJECT: A64Reg = A64Reg(19);
pub const STUB_FIELD: A64Reg = A64Reg(20);

/// What one run of a unit did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Execution {
    pub value: Option<u64>,
    pub steps: usize,
    /// Runtime calls in order, including those made by barrier stubs
    pub calls: Vec<ForeignCall>,
    /// Barrier stubs executed
    pub stub_runs: usize,
}

impl Execution {
    pub fn call_count(&self, routine: ForeignCall) -> usize {
        self.calls.iter().filter(|&&c| c == routine).count()
    }
}

pub struct Interpreter<'a> {
    runtime: &'a Runtime,
    thread: MutatorThread,
    stubs: FxHashMap<(ReferenceStrength, bool), AsmCode<A64Inst>>,
    pub step_limit: usize,
}

impl<'a> Interpreter<'a> {
    pub fn new(runtime: &'a Runtime, thread: MutatorThread) -> Self {
        Self {
            runtime,
            thread,
            stubs: FxHashMap::default(),
            step_limit: runtime.heap().config().step_limit,
        }
    }

    pub fn thread(&self) -> &MutatorThread {
        &self.thread
    }

    pub fn run(&mut self, func: &LirFunction, args: &[u64]) -> Result<Execution> {
        if args.len() != func.params.len() {
            return Err(SimError::Config(format!(
                "{} takes {} arguments, got {}",
                func.name,
                func.params.len(),
                args.len()
            )));
        }
        let labels = func
            .label_positions()
            .map_err(|label| SimError::trap(format!("{}: label {} bound twice", func.name, label)))?;
        let mut frame = Frame {
            regs: vec![None; func.vreg_count()],
        };
        for (&reg, &value) in func.params.iter().zip(args) {
            frame.set(reg, value)?;
        }

        let mut execution = Execution::default();
        let mut pc = 0;
        while let Some(inst) = func.insts.get(pc) {
            execution.steps += 1;
            if execution.steps > self.step_limit {
                return Err(SimError::StepLimit {
                    steps: self.step_limit,
                });
            }
            let mut next = pc + 1;
            let jump = |target: Label| -> Result<usize> {
                labels
                    .get(target.0 as usize)
                    .copied()
                    .flatten()
                    .ok_or_else(|| SimError::trap(format!("{}: branch to unbound {}", func.name, target)))
            };

            match inst {
                LirInst::Move { dst, src } => {
                    let value = frame.operand(*src)?;
                    frame.set(*dst, value)?;
                }
                LirInst::Load { dst, addr, width } => {
                    let addr = self.address(&frame, addr)?;
                    let value = self.runtime.heap().read(addr, *width)?;
                    frame.set(*dst, value)?;
                }
                LirInst::Store { addr, src, width } => {
                    let addr = self.address(&frame, addr)?;
                    let value = frame.operand(*src)?;
                    self.runtime.heap().write(addr, *width, value)?;
                }
                LirInst::Lea { dst, addr } => {
                    let addr = self.address(&frame, addr)?;
                    frame.set(*dst, addr)?;
                }
                LirInst::BinOp { op, dst, lhs, rhs } => {
                    let lhs = frame.get(*lhs)?;
                    let rhs = frame.operand(*rhs)?;
                    let value = match op {
                        BinOp::Add => lhs.wrapping_add(rhs),
                        BinOp::Sub => lhs.wrapping_sub(rhs),
                        BinOp::And => lhs & rhs,
                        BinOp::Or => lhs | rhs,
                        BinOp::Shl => lhs << (rhs & 63),
                        BinOp::Shr => lhs >> (rhs & 63),
                    };
                    frame.set(*dst, value)?;
                }
                LirInst::Branch {
                    cond, lhs, rhs, target, ..
                } => {
                    if cond.holds(frame.get(*lhs)?, frame.operand(*rhs)?) {
                        next = jump(*target)?;
                    }
                }
                LirInst::BranchOnBit {
                    src, bit, when, target, ..
                } => {
                    let set = (frame.get(*src)? >> bit) & 1 == 1;
                    if set == (*when == BitState::Set) {
                        next = jump(*target)?;
                    }
                }
                LirInst::Jump { target } => next = jump(*target)?,
                LirInst::Bind(_) => {}
                LirInst::Call {
                    target,
                    args,
                    result,
                } => {
                    let values = args
                        .iter()
                        .map(|&arg| frame.operand(arg))
                        .collect::<Result<Vec<_>>>()?;
                    let returned = self.runtime.call(&self.thread, *target, &values)?;
                    execution.calls.push(*target);
                    if let Some(result) = result {
                        let value = returned
                            .ok_or_else(|| SimError::trap(format!("{} returns no value", target)))?;
                        frame.set(*result, value)?;
                    }
                }
                LirInst::NullCheck { base } => {
                    if frame.get(*base)? == 0 {
                        return Err(SimError::NullPointer { at: pc });
                    }
                }
                LirInst::CompareAndSwap {
                    result,
                    addr,
                    expected,
                    new_value,
                    width,
                } => {
                    let addr = self.address(&frame, addr)?;
                    let expected = truncate(frame.get(*expected)?, *width);
                    let new_value = frame.get(*new_value)?;
                    let swapped = self
                        .runtime
                        .heap()
                        .compare_and_swap(addr, *width, expected, new_value)?;
                    frame.set(*result, u64::from(swapped))?;
                }
                LirInst::AtomicSwap {
                    dst,
                    addr,
                    src,
                    width,
                } => {
                    let addr = self.address(&frame, addr)?;
                    let value = frame.get(*src)?;
                    let old = self.runtime.heap().swap(addr, *width, value)?;
                    frame.set(*dst, old)?;
                }
                LirInst::Compress { dst, src, encoding } => {
                    let value = encoding.compress(frame.get(*src)?);
                    frame.set(*dst, u64::from(value))?;
                }
                LirInst::Uncompress { dst, src, encoding } => {
                    let value = encoding.uncompress(frame.get(*src)? as u32);
                    frame.set(*dst, value)?;
                }
                LirInst::CopyMemory {
                    dst,
                    src,
                    length,
                    stride,
                } => {
                    let bytes = frame.get(*length)?.wrapping_mul(u64::from(*stride));
                    self.runtime
                        .heap()
                        .copy(frame.get(*dst)?, frame.get(*src)?, bytes as usize)?;
                }
                LirInst::IncrementCounter(counter) => counter.increment(),
                LirInst::Trace { event, fields } => {
                    let values = fields
                        .iter()
                        .map(|&(name, op)| frame.operand(op).map(|value| (name, value)))
                        .collect::<Result<Vec<_>>>()?;
                    self.runtime.trace(&self.thread, *event, values);
                }
                LirInst::LoadReferenceBarrier {
                    object,
                    field_address,
                    strength,
                    narrow,
                } => {
                    let obj = frame.get(*object)?;
                    let field = frame.get(*field_address)?;
                    let fixed = self.run_stub(*strength, *narrow, obj, field, &mut execution)?;
                    frame.set(*object, fixed)?;
                }
                LirInst::Return { value } => {
                    execution.value = match value {
                        Some(op) => Some(frame.operand(*op)?),
                        None => None,
                    };
                    return Ok(execution);
                }
            }
            pc = next;
        }
        Ok(execution)
    }

    fn address(&self, frame: &Frame, addr: &Address) -> Result<u64> {
        Ok(match *addr {
            Address::Base { base, disp } => frame.get(base)?.wrapping_add(disp as u64),
            Address::Indexed {
                base,
                index,
                shift,
                disp,
            } => frame
                .get(base)?
                .wrapping_add(frame.get(index)? << shift)
                .wrapping_add(disp as u64),
            Address::Thread { disp } => self.thread.tls.wrapping_add(disp as u64),
            Address::Absolute(addr) => addr,
        })
    }

    /// Run the emitted AArch64 barrier stub for one site
    fn run_stub(
        &mut self,
        strength: ReferenceStrength,
        narrow: bool,
        obj: u64,
        field: u64,
        execution: &mut Execution,
    ) -> Result<u64> {
        let runtime = self.runtime;
        let code = match self.stubs.entry((strength, narrow)) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => e.insert(emit_stub(runtime, strength, narrow)?),
        };

        let mut machine = Aarch64Machine::new();
        machine.set_reg(A64Reg::RTHREAD, self.thread.tls)?;
        machine.set_reg(STUB_OBJECT, obj)?;
        machine.set_reg(STUB_FIELD, field)?;
        let mut env = StubEnv {
            runtime,
            thread: &self.thread,
        };
        let outcome = machine.run(code, &mut env)?;
        execution.calls.extend(outcome.calls);
        execution.stub_runs += 1;
        Ok(machine.reg(STUB_OBJECT)?)
    }
}

fn emit_stub(runtime: &Runtime, strength: ReferenceStrength, narrow: bool) -> Result<AsmCode<A64Inst>> {
    let op = LoadReferenceBarrierOp {
        object: STUB_OBJECT,
        field_address: STUB_FIELD,
        strength,
        narrow,
    };
    let mut asm = Aarch64Assembler::new();
    op.emit_code(&mut asm, runtime.layout(), Some(runtime.encoding()))?;
    let code = asm.finish()?;
    log::trace!("{} stub:\n{}", op.routine(), code);
    Ok(code)
}

fn truncate(value: u64, width: Width) -> u64 {
    match width {
        Width::W8 => value & 0xff,
        Width::W32 => value & 0xffff_ffff,
        Width::W64 => value,
    }
}

struct Frame {
    regs: Vec<Option<u64>>,
}

impl Frame {
    fn get(&self, reg: VReg) -> Result<u64> {
        self.regs
            .get(reg.0 as usize)
            .copied()
            .flatten()
            .ok_or(SimError::UndefinedRegister(reg))
    }

    fn set(&mut self, reg: VReg, value: u64) -> Result<()> {
        let slot = self
            .regs
            .get_mut(reg.0 as usize)
            .ok_or(SimError::UndefinedRegister(reg))?;
        *slot = Some(value);
        Ok(())
    }

    fn operand(&self, op: Operand) -> Result<u64> {
        match op {
            Operand::Reg(reg) => self.get(reg),
            Operand::Imm(imm) => Ok(imm as u64),
        }
    }
}

/// Memory and runtime routines as seen by an interpreted stub
struct StubEnv<'r> {
    runtime: &'r Runtime,
    thread: &'r MutatorThread,
}

impl MachineEnv for StubEnv<'_> {
    type Error = SimError;

    fn read_u8(&mut self, addr: u64) -> Result<u8> {
        self.runtime.heap().read_u8(addr)
    }

    fn read_u32(&mut self, addr: u64) -> Result<u32> {
        self.runtime.heap().read_u32(addr)
    }

    fn read_u64(&mut self, addr: u64) -> Result<u64> {
        self.runtime.heap().read_u64(addr)
    }

    fn call(&mut self, routine: ForeignCall, args: [u64; 2]) -> Result<u64> {
        self.runtime
            .call(self.thread, routine, &args)?
            .ok_or_else(|| SimError::trap(format!("{} returns no value", routine)))
    }
}
