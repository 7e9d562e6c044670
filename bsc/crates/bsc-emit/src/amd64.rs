//! AMD64 barrier stub assembler
//!
//! Produces a symbolic instruction stream in Intel syntax. Byte loads use
//! `movzx` so a later `test` sees the whole register.

use std::fmt;

use bsc_lir::{BitState, CompressEncoding, ForeignCall};

use crate::assembler::{AsmBuffer, AsmCode, AsmLabel, BarrierAssembler};
use crate::calling_convention::{CallingConvention, AMD64};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum X64Reg {
    Rax,
    Rcx,
    Rdx,
    Rbx,
    Rsp,
    Rbp,
    Rsi,
    Rdi,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
}

impl X64Reg {
    pub fn name(self) -> &'static str {
        match self {
            X64Reg::Rax => "rax",
            X64Reg::Rcx => "rcx",
            X64Reg::Rdx => "rdx",
            X64Reg::Rbx => "rbx",
            X64Reg::Rsp => "rsp",
            X64Reg::Rbp => "rbp",
            X64Reg::Rsi => "rsi",
            X64Reg::Rdi => "rdi",
            X64Reg::R8 => "r8",
            X64Reg::R9 => "r9",
            X64Reg::R10 => "r10",
            X64Reg::R11 => "r11",
            X64Reg::R12 => "r12",
            X64Reg::R13 => "r13",
            X64Reg::R14 => "r14",
            X64Reg::R15 => "r15",
        }
    }

    /// 32-bit register name
    pub fn name32(self) -> &'static str {
        match self {
            X64Reg::Rax => "eax",
            X64Reg::Rcx => "ecx",
            X64Reg::Rdx => "edx",
            X64Reg::Rbx => "ebx",
            X64Reg::Rsp => "esp",
            X64Reg::Rbp => "ebp",
            X64Reg::Rsi => "esi",
            X64Reg::Rdi => "edi",
            X64Reg::R8 => "r8d",
            X64Reg::R9 => "r9d",
            X64Reg::R10 => "r10d",
            X64Reg::R11 => "r11d",
            X64Reg::R12 => "r12d",
            X64Reg::R13 => "r13d",
            X64Reg::R14 => "r14d",
            X64Reg::R15 => "r15d",
        }
    }
}

impl fmt::Display for X64Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum X64Cond {
    Zero,
    NotZero,
}

impl fmt::Display for X64Cond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            X64Cond::Zero => "jz",
            X64Cond::NotZero => "jnz",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum X64Inst {
    /// `movzx dst32, byte ptr [base + index + disp]`
    MovzxByte {
        dst: X64Reg,
        base: X64Reg,
        index: Option<X64Reg>,
        disp: i32,
    },
    /// `mov dst, qword ptr [base]`
    Load64 { dst: X64Reg, base: X64Reg },
    /// `mov dst32, dword ptr [base]`
    Load32 { dst: X64Reg, base: X64Reg },
    MovImm { dst: X64Reg, imm: u64 },
    MovReg { dst: X64Reg, src: X64Reg },
    Xchg { a: X64Reg, b: X64Reg },
    Shr { dst: X64Reg, imm: u8 },
    Shl { dst: X64Reg, imm: u8 },
    Add { dst: X64Reg, src: X64Reg },
    /// `test reg, mask`
    TestImm { reg: X64Reg, mask: u32 },
    /// `test reg, reg`
    TestReg { reg: X64Reg },
    Jcc { cond: X64Cond, target: AsmLabel },
    Push { reg: X64Reg },
    Pop { reg: X64Reg },
    /// `sub rsp, n` or `add rsp, n`
    AdjustRsp { delta: i32 },
    Call { routine: ForeignCall },
}

impl fmt::Display for X64Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            X64Inst::MovzxByte {
                dst,
                base,
                index,
                disp,
            } => {
                write!(f, "movzx {}, byte ptr [{}", dst.name32(), base)?;
                if let Some(index) = index {
                    write!(f, " + {}", index)?;
                }
                if *disp != 0 {
                    write!(f, " + {}", disp)?;
                }
                f.write_str("]")
            }
            X64Inst::Load64 { dst, base } => write!(f, "mov {}, qword ptr [{}]", dst, base),
            X64Inst::Load32 { dst, base } => write!(f, "mov {}, dword ptr [{}]", dst.name32(), base),
            X64Inst::MovImm { dst, imm } => write!(f, "mov {}, {:#x}", dst, imm),
            X64Inst::MovReg { dst, src } => write!(f, "mov {}, {}", dst, src),
            X64Inst::Xchg { a, b } => write!(f, "xchg {}, {}", a, b),
            X64Inst::Shr { dst, imm } => write!(f, "shr {}, {}", dst, imm),
            X64Inst::Shl { dst, imm } => write!(f, "shl {}, {}", dst, imm),
            X64Inst::Add { dst, src } => write!(f, "add {}, {}", dst, src),
            X64Inst::TestImm { reg, mask } => write!(f, "test {}, {:#x}", reg.name32(), mask),
            X64Inst::TestReg { reg } => write!(f, "test {}, {}", reg, reg),
            X64Inst::Jcc { cond, target } => write!(f, "{} {}", cond, target),
            X64Inst::Push { reg } => write!(f, "push {}", reg),
            X64Inst::Pop { reg } => write!(f, "pop {}", reg),
            X64Inst::AdjustRsp { delta } if *delta < 0 => write!(f, "sub rsp, {}", -delta),
            X64Inst::AdjustRsp { delta } => write!(f, "add rsp, {}", delta),
            X64Inst::Call { routine } => write!(f, "call {}", routine.name()),
        }
    }
}

pub struct Amd64Assembler {
    buf: AsmBuffer<X64Inst>,
    cc: CallingConvention<X64Reg>,
}

impl Amd64Assembler {
    pub fn new() -> Self {
        Self {
            buf: AsmBuffer::new(),
            cc: AMD64,
        }
    }

    pub fn finish(self) -> Result<AsmCode<X64Inst>> {
        self.buf.finish()
    }

    fn other_scratch(&self, not: X64Reg) -> X64Reg {
        if self.cc.scratch[0] == not {
            self.cc.scratch[1]
        } else {
            self.cc.scratch[0]
        }
    }
}

impl Default for Amd64Assembler {
    fn default() -> Self {
        Self::new()
    }
}

impl BarrierAssembler for Amd64Assembler {
    type Reg = X64Reg;

    fn convention(&self) -> &CallingConvention<X64Reg> {
        &self.cc
    }

    fn new_label(&mut self) -> AsmLabel {
        self.buf.new_label()
    }

    fn bind(&mut self, label: AsmLabel) -> Result<()> {
        self.buf.bind(label)
    }

    fn load_thread_byte(&mut self, dst: X64Reg, disp: i32) {
        self.buf.push(X64Inst::MovzxByte {
            dst,
            base: self.cc.thread_reg,
            index: None,
            disp,
        });
    }

    fn test_bit_and_branch(&mut self, src: X64Reg, bit: u8, when: BitState, target: AsmLabel) {
        self.buf.push(X64Inst::TestImm {
            reg: src,
            mask: 1 << bit,
        });
        let cond = match when {
            BitState::Clear => X64Cond::Zero,
            BitState::Set => X64Cond::NotZero,
        };
        self.buf.push(X64Inst::Jcc { cond, target });
    }

    fn indexed_byte_load(&mut self, dst: X64Reg, table: u64, index: X64Reg, shift: u8) {
        let base = self.other_scratch(dst);
        if dst != index {
            self.move_reg(dst, index);
        }
        self.buf.push(X64Inst::Shr { dst, imm: shift });
        self.buf.push(X64Inst::MovImm { dst: base, imm: table });
        self.buf.push(X64Inst::MovzxByte {
            dst,
            base,
            index: Some(dst),
            disp: 0,
        });
    }

    fn load_field(&mut self, dst: X64Reg, addr: X64Reg, narrow: bool) {
        self.buf.push(if narrow {
            X64Inst::Load32 { dst, base: addr }
        } else {
            X64Inst::Load64 { dst, base: addr }
        });
    }

    fn decode_narrow(&mut self, reg: X64Reg, encoding: CompressEncoding) -> Result<()> {
        let skip = self.new_label();
        self.buf.push(X64Inst::TestReg { reg });
        self.buf.push(X64Inst::Jcc {
            cond: X64Cond::Zero,
            target: skip,
        });
        if encoding.shift > 0 {
            self.buf.push(X64Inst::Shl {
                dst: reg,
                imm: encoding.shift,
            });
        }
        if encoding.base != 0 {
            let base = self.other_scratch(reg);
            self.buf.push(X64Inst::MovImm {
                dst: base,
                imm: encoding.base,
            });
            self.buf.push(X64Inst::Add { dst: reg, src: base });
        }
        self.bind(skip)
    }

    fn move_reg(&mut self, dst: X64Reg, src: X64Reg) {
        self.buf.push(X64Inst::MovReg { dst, src });
    }

    fn swap_regs(&mut self, a: X64Reg, b: X64Reg) {
        self.buf.push(X64Inst::Xchg { a, b });
    }

    fn push(&mut self, reg: X64Reg) {
        self.buf.push(X64Inst::Push { reg });
    }

    fn pop(&mut self, reg: X64Reg) {
        self.buf.push(X64Inst::Pop { reg });
    }

    fn adjust_stack(&mut self, delta: i32) {
        self.buf.push(X64Inst::AdjustRsp { delta });
    }

    fn call_routine(&mut self, routine: ForeignCall) {
        self.buf.push(X64Inst::Call { routine });
    }
}
