//! LIR instructions and functions

use std::fmt;

use bsc_ir::{define_idx, ReferenceStrength};

use crate::counter::CounterHandle;
use crate::foreign::ForeignCall;
use crate::narrow::CompressEncoding;

define_idx!(
    /// Virtual register
    VReg
);

define_idx!(
    /// Branch target, bound exactly once per function
    Label
);

/// Memory access width; loads zero-extend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Width {
    W8,
    W32,
    W64,
}

impl Width {
    pub fn bytes(self) -> u8 {
        match self {
            Width::W8 => 1,
            Width::W32 => 4,
            Width::W64 => 8,
        }
    }

    pub fn from_bytes(bytes: u8) -> Option<Self> {
        match bytes {
            1 => Some(Width::W8),
            4 => Some(Width::W32),
            8 => Some(Width::W64),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Reg(VReg),
    Imm(i64),
}

impl From<VReg> for Operand {
    fn from(reg: VReg) -> Self {
        Operand::Reg(reg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address {
    /// `[base + disp]`
    Base { base: VReg, disp: i64 },
    /// `[base + (index << shift) + disp]`
    Indexed {
        base: VReg,
        index: VReg,
        shift: u8,
        disp: i64,
    },
    /// `[thread + disp]`
    Thread { disp: i32 },
    Absolute(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    And,
    Or,
    Shl,
    /// Logical shift right
    Shr,
}

/// Branch conditions; `Lt`/`Ge` compare unsigned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    Ge,
}

impl Cond {
    pub fn holds(self, lhs: u64, rhs: u64) -> bool {
        match self {
            Cond::Eq => lhs == rhs,
            Cond::Ne => lhs != rhs,
            Cond::Lt => lhs < rhs,
            Cond::Ge => lhs >= rhs,
        }
    }
}

/// Probability hint for the taken edge of a branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchHint {
    Likely,
    Unlikely,
}

/// Whether a bit test branches when the bit is set or clear
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitState {
    Set,
    Clear,
}

#[derive(Debug, Clone)]
pub enum LirInst {
    Move {
        dst: VReg,
        src: Operand,
    },
    Load {
        dst: VReg,
        addr: Address,
        width: Width,
    },
    Store {
        addr: Address,
        src: Operand,
        width: Width,
    },
    /// Address computation without a memory access
    Lea {
        dst: VReg,
        addr: Address,
    },
    BinOp {
        op: BinOp,
        dst: VReg,
        lhs: VReg,
        rhs: Operand,
    },
    Branch {
        cond: Cond,
        lhs: VReg,
        rhs: Operand,
        target: Label,
        hint: BranchHint,
    },
    BranchOnBit {
        src: VReg,
        bit: u8,
        when: BitState,
        target: Label,
        hint: BranchHint,
    },
    Jump {
        target: Label,
    },
    Bind(Label),
    Call {
        target: ForeignCall,
        args: Vec<Operand>,
        result: Option<VReg>,
    },
    /// Trap if `base` is null
    NullCheck {
        base: VReg,
    },
    /// `result = 1` if the location held `expected` and now holds `new_value`, else 0
    CompareAndSwap {
        result: VReg,
        addr: Address,
        expected: VReg,
        new_value: VReg,
        width: Width,
    },
    AtomicSwap {
        dst: VReg,
        addr: Address,
        src: VReg,
        width: Width,
    },
    Compress {
        dst: VReg,
        src: VReg,
        encoding: CompressEncoding,
    },
    Uncompress {
        dst: VReg,
        src: VReg,
        encoding: CompressEncoding,
    },
    /// Copy `length * stride` bytes, ascending
    CopyMemory {
        dst: VReg,
        src: VReg,
        length: VReg,
        stride: u32,
    },
    IncrementCounter(CounterHandle),
    /// Emit a structured trace record
    Trace {
        event: &'static str,
        fields: Vec<(&'static str, Operand)>,
    },
    /// Platform-expanded load-reference barrier; `object` is updated in place
    LoadReferenceBarrier {
        object: VReg,
        field_address: VReg,
        strength: ReferenceStrength,
        narrow: bool,
    },
    Return {
        value: Option<Operand>,
    },
}

impl LirInst {
    pub fn is_call(&self) -> bool {
        matches!(self, LirInst::Call { .. })
    }

    /// Register written by this instruction, if any
    pub fn def(&self) -> Option<VReg> {
        match *self {
            LirInst::Move { dst, .. }
            | LirInst::Load { dst, .. }
            | LirInst::Lea { dst, .. }
            | LirInst::BinOp { dst, .. }
            | LirInst::AtomicSwap { dst, .. }
            | LirInst::Compress { dst, .. }
            | LirInst::Uncompress { dst, .. } => Some(dst),
            LirInst::CompareAndSwap { result, .. } => Some(result),
            LirInst::Call { result, .. } => result,
            LirInst::LoadReferenceBarrier { object, .. } => Some(object),
            _ => None,
        }
    }
}

/// A lowered unit
#[derive(Debug, Clone)]
pub struct LirFunction {
    pub name: String,
    pub params: Vec<VReg>,
    pub insts: Vec<LirInst>,
    vreg_count: u32,
    label_count: u32,
}

impl LirFunction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            insts: Vec::new(),
            vreg_count: 0,
            label_count: 0,
        }
    }

    pub fn new_vreg(&mut self) -> VReg {
        let reg = VReg(self.vreg_count);
        self.vreg_count += 1;
        reg
    }

    pub fn new_label(&mut self) -> Label {
        let label = Label(self.label_count);
        self.label_count += 1;
        label
    }

    pub fn vreg_count(&self) -> usize {
        self.vreg_count as usize
    }

    pub fn label_count(&self) -> usize {
        self.label_count as usize
    }

    pub fn push(&mut self, inst: LirInst) {
        self.insts.push(inst);
    }

    pub fn len(&self) -> usize {
        self.insts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    /// Position of every bound label, or the first label bound twice
    pub fn label_positions(&self) -> Result<Vec<Option<usize>>, Label> {
        let mut positions = vec![None; self.label_count as usize];
        for (pos, inst) in self.insts.iter().enumerate() {
            if let LirInst::Bind(label) = inst {
                let slot = positions.get_mut(label.0 as usize).ok_or(*label)?;
                if slot.is_some() {
                    return Err(*label);
                }
                *slot = Some(pos);
            }
        }
        Ok(positions)
    }

    pub fn count_calls(&self) -> usize {
        self.insts.iter().filter(|i| i.is_call()).count()
    }
}

impl fmt::Display for VReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(r) => write!(f, "{}", r),
            Operand::Imm(i) => write!(f, "#{}", i),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Base { base, disp } => write!(f, "[{} + {}]", base, disp),
            Address::Indexed {
                base,
                index,
                shift,
                disp,
            } => write!(f, "[{} + {} << {} + {}]", base, index, shift, disp),
            Address::Thread { disp } => write!(f, "[thread + {}]", disp),
            Address::Absolute(addr) => write!(f, "[{:#x}]", addr),
        }
    }
}

impl fmt::Display for LirInst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LirInst::Move { dst, src } => write!(f, "mov {}, {}", dst, src),
            LirInst::Load { dst, addr, width } => write!(f, "load.{} {}, {}", width.bytes(), dst, addr),
            LirInst::Store { addr, src, width } => write!(f, "store.{} {}, {}", width.bytes(), addr, src),
            LirInst::Lea { dst, addr } => write!(f, "lea {}, {}", dst, addr),
            LirInst::BinOp { op, dst, lhs, rhs } => {
                write!(f, "{:?} {}, {}, {}", op, dst, lhs, rhs)
            }
            LirInst::Branch {
                cond,
                lhs,
                rhs,
                target,
                hint,
            } => write!(f, "b.{:?} {}, {}, {} ({:?})", cond, lhs, rhs, target, hint),
            LirInst::BranchOnBit {
                src,
                bit,
                when,
                target,
                hint,
            } => write!(f, "tb.{:?} {}, #{}, {} ({:?})", when, src, bit, target, hint),
            LirInst::Jump { target } => write!(f, "jmp {}", target),
            LirInst::Bind(label) => write!(f, "{}:", label),
            LirInst::Call {
                target,
                args,
                result,
            } => {
                if let Some(r) = result {
                    write!(f, "{} = ", r)?;
                }
                write!(f, "call {}(", target)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            LirInst::NullCheck { base } => write!(f, "nullcheck {}", base),
            LirInst::CompareAndSwap {
                result,
                addr,
                expected,
                new_value,
                width,
            } => write!(
                f,
                "cas.{} {}, {}, {}, {}",
                width.bytes(),
                result,
                addr,
                expected,
                new_value
            ),
            LirInst::AtomicSwap {
                dst,
                addr,
                src,
                width,
            } => write!(f, "xchg.{} {}, {}, {}", width.bytes(), dst, addr, src),
            LirInst::Compress { dst, src, .. } => write!(f, "compress {}, {}", dst, src),
            LirInst::Uncompress { dst, src, .. } => write!(f, "uncompress {}, {}", dst, src),
            LirInst::CopyMemory {
                dst,
                src,
                length,
                stride,
            } => write!(f, "copy {}, {}, {} x {}", dst, src, length, stride),
            LirInst::IncrementCounter(counter) => {
                write!(f, "inc {}.{}", counter.group(), counter.name())
            }
            LirInst::Trace { event, fields } => {
                write!(f, "trace {}", event)?;
                for (name, value) in fields {
                    write!(f, " {}={}", name, value)?;
                }
                Ok(())
            }
            LirInst::LoadReferenceBarrier {
                object,
                field_address,
                strength,
                narrow,
            } => write!(
                f,
                "lrb.{}{} {}, {}",
                strength,
                if *narrow { ".narrow" } else { "" },
                object,
                field_address
            ),
            LirInst::Return { value: Some(v) } => write!(f, "ret {}", v),
            LirInst::Return { value: None } => write!(f, "ret"),
        }
    }
}

impl fmt::Display for LirFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn {}(", self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p)?;
        }
        writeln!(f, ") {{")?;
        for inst in &self.insts {
            match inst {
                LirInst::Bind(_) => writeln!(f, "{}", inst)?,
                _ => writeln!(f, "    {}", inst)?,
            }
        }
        write!(f, "}}")
    }
}
