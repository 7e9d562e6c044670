//! AArch64 barrier stub assembler

use std::fmt;

use bsc_lir::{BitState, CompressEncoding, ForeignCall};

use crate::assembler::{AsmBuffer, AsmCode, AsmLabel, BarrierAssembler};
use crate::calling_convention::{CallingConvention, AARCH64};
use crate::error::Result;

/// General-purpose register `x0..x30`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct A64Reg(pub u8);

impl A64Reg {
    pub const X0: A64Reg = A64Reg(0);
    pub const RSCRATCH1: A64Reg = A64Reg(8);
    pub const RSCRATCH2: A64Reg = A64Reg(9);
    pub const RTHREAD: A64Reg = A64Reg(28);
    pub const LR: A64Reg = A64Reg(30);
    pub const COUNT: usize = 31;

    /// 32-bit view for display
    pub fn w(self) -> WReg {
        WReg(self.0)
    }
}

impl fmt::Display for A64Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WReg(u8);

impl fmt::Display for WReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

/// The instruction subset barrier stubs use
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum A64Inst {
    /// `ldrb wt, [xn, #offset]`
    LdrbImm { rt: A64Reg, rn: A64Reg, offset: i64 },
    /// `ldrb wt, [xn, xm]`
    LdrbReg { rt: A64Reg, rn: A64Reg, rm: A64Reg },
    /// `ldr xt, [xn, #offset]`
    LdrX { rt: A64Reg, rn: A64Reg, offset: i64 },
    /// `ldr wt, [xn, #offset]`
    LdrW { rt: A64Reg, rn: A64Reg, offset: i64 },
    Tbz { rt: A64Reg, bit: u8, target: AsmLabel },
    Tbnz { rt: A64Reg, bit: u8, target: AsmLabel },
    Cbz { rt: A64Reg, target: AsmLabel },
    LsrImm { rd: A64Reg, rn: A64Reg, shift: u8 },
    LslImm { rd: A64Reg, rn: A64Reg, shift: u8 },
    AddReg { rd: A64Reg, rn: A64Reg, rm: A64Reg },
    /// `mov xd, #imm`, a movz/movk sequence on hardware
    MovImm { rd: A64Reg, imm: u64 },
    MovReg { rd: A64Reg, rm: A64Reg },
    /// `str xt, [sp, #-16]!`
    Push { rt: A64Reg },
    /// `ldr xt, [sp], #16`
    Pop { rt: A64Reg },
    /// `sub sp, sp, #n` or `add sp, sp, #n`
    AdjustSp { delta: i32 },
    Bl { routine: ForeignCall },
}

impl A64Inst {
    /// Register written by this instruction, if any
    pub fn def(&self) -> Option<A64Reg> {
        match *self {
            A64Inst::LdrbImm { rt, .. }
            | A64Inst::LdrbReg { rt, .. }
            | A64Inst::LdrX { rt, .. }
            | A64Inst::LdrW { rt, .. }
            | A64Inst::Pop { rt } => Some(rt),
            A64Inst::LsrImm { rd, .. }
            | A64Inst::LslImm { rd, .. }
            | A64Inst::AddReg { rd, .. }
            | A64Inst::MovImm { rd, .. }
            | A64Inst::MovReg { rd, .. } => Some(rd),
            A64Inst::Bl { .. } => Some(A64Reg::X0),
            A64Inst::AdjustSp { .. } => None,
            _ => None,
        }
    }
}

impl fmt::Display for A64Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            A64Inst::LdrbImm { rt, rn, offset } => write!(f, "ldrb {}, [{}, #{}]", rt.w(), rn, offset),
            A64Inst::LdrbReg { rt, rn, rm } => write!(f, "ldrb {}, [{}, {}]", rt.w(), rn, rm),
            A64Inst::LdrX { rt, rn, offset } => write!(f, "ldr {}, [{}, #{}]", rt, rn, offset),
            A64Inst::LdrW { rt, rn, offset } => write!(f, "ldr {}, [{}, #{}]", rt.w(), rn, offset),
            A64Inst::Tbz { rt, bit, target } => write!(f, "tbz {}, #{}, {}", rt.w(), bit, target),
            A64Inst::Tbnz { rt, bit, target } => write!(f, "tbnz {}, #{}, {}", rt.w(), bit, target),
            A64Inst::Cbz { rt, target } => write!(f, "cbz {}, {}", rt, target),
            A64Inst::LsrImm { rd, rn, shift } => write!(f, "lsr {}, {}, #{}", rd, rn, shift),
            A64Inst::LslImm { rd, rn, shift } => write!(f, "lsl {}, {}, #{}", rd, rn, shift),
            A64Inst::AddReg { rd, rn, rm } => write!(f, "add {}, {}, {}", rd, rn, rm),
            A64Inst::MovImm { rd, imm } => write!(f, "mov {}, #{:#x}", rd, imm),
            A64Inst::MovReg { rd, rm } => write!(f, "mov {}, {}", rd, rm),
            A64Inst::Push { rt } => write!(f, "str {}, [sp, #-16]!", rt),
            A64Inst::Pop { rt } => write!(f, "ldr {}, [sp], #16", rt),
            A64Inst::AdjustSp { delta } if *delta < 0 => write!(f, "sub sp, sp, #{}", -delta),
            A64Inst::AdjustSp { delta } => write!(f, "add sp, sp, #{}", delta),
            A64Inst::Bl { routine } => write!(f, "bl {}", routine.name()),
        }
    }
}

pub struct Aarch64Assembler {
    buf: AsmBuffer<A64Inst>,
    cc: CallingConvention<A64Reg>,
}

impl Aarch64Assembler {
    pub fn new() -> Self {
        Self {
            buf: AsmBuffer::new(),
            cc: AARCH64,
        }
    }

    pub fn finish(self) -> Result<AsmCode<A64Inst>> {
        self.buf.finish()
    }

    /// Scratch register other than `not`
    fn other_scratch(&self, not: A64Reg) -> A64Reg {
        if self.cc.scratch[0] == not {
            self.cc.scratch[1]
        } else {
            self.cc.scratch[0]
        }
    }
}

impl Default for Aarch64Assembler {
    fn default() -> Self {
        Self::new()
    }
}

impl BarrierAssembler for Aarch64Assembler {
    type Reg = A64Reg;

    fn convention(&self) -> &CallingConvention<A64Reg> {
        &self.cc
    }

    fn new_label(&mut self) -> AsmLabel {
        self.buf.new_label()
    }

    fn bind(&mut self, label: AsmLabel) -> Result<()> {
        self.buf.bind(label)
    }

    fn load_thread_byte(&mut self, dst: A64Reg, disp: i32) {
        self.buf.push(A64Inst::LdrbImm {
            rt: dst,
            rn: self.cc.thread_reg,
            offset: i64::from(disp),
        });
    }

    fn test_bit_and_branch(&mut self, src: A64Reg, bit: u8, when: BitState, target: AsmLabel) {
        self.buf.push(match when {
            BitState::Clear => A64Inst::Tbz { rt: src, bit, target },
            BitState::Set => A64Inst::Tbnz { rt: src, bit, target },
        });
    }

    fn indexed_byte_load(&mut self, dst: A64Reg, table: u64, index: A64Reg, shift: u8) {
        let base = self.other_scratch(dst);
        self.buf.push(A64Inst::LsrImm {
            rd: dst,
            rn: index,
            shift,
        });
        self.buf.push(A64Inst::MovImm { rd: base, imm: table });
        self.buf.push(A64Inst::LdrbReg {
            rt: dst,
            rn: base,
            rm: dst,
        });
    }

    fn load_field(&mut self, dst: A64Reg, addr: A64Reg, narrow: bool) {
        self.buf.push(if narrow {
            A64Inst::LdrW {
                rt: dst,
                rn: addr,
                offset: 0,
            }
        } else {
            A64Inst::LdrX {
                rt: dst,
                rn: addr,
                offset: 0,
            }
        });
    }

    fn decode_narrow(&mut self, reg: A64Reg, encoding: CompressEncoding) -> Result<()> {
        let skip = self.new_label();
        self.buf.push(A64Inst::Cbz { rt: reg, target: skip });
        if encoding.shift > 0 {
            self.buf.push(A64Inst::LslImm {
                rd: reg,
                rn: reg,
                shift: encoding.shift,
            });
        }
        if encoding.base != 0 {
            let base = self.other_scratch(reg);
            self.buf.push(A64Inst::MovImm {
                rd: base,
                imm: encoding.base,
            });
            self.buf.push(A64Inst::AddReg {
                rd: reg,
                rn: reg,
                rm: base,
            });
        }
        self.bind(skip)
    }

    fn move_reg(&mut self, dst: A64Reg, src: A64Reg) {
        self.buf.push(A64Inst::MovReg { rd: dst, rm: src });
    }

    fn swap_regs(&mut self, a: A64Reg, b: A64Reg) {
        let tmp = self.cc.scratch[0];
        self.move_reg(tmp, a);
        self.move_reg(a, b);
        self.move_reg(b, tmp);
    }

    fn push(&mut self, reg: A64Reg) {
        self.buf.push(A64Inst::Push { rt: reg });
    }

    fn pop(&mut self, reg: A64Reg) {
        self.buf.push(A64Inst::Pop { rt: reg });
    }

    fn adjust_stack(&mut self, delta: i32) {
        self.buf.push(A64Inst::AdjustSp { delta });
    }

    fn call_routine(&mut self, routine: ForeignCall) {
        self.buf.push(A64Inst::Bl { routine });
    }
}
