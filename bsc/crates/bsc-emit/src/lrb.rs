//! Load-reference barrier stub
//!
//! ```text
//!   Start ──(gc-state stable)──────────────────▶ Return-Unchanged
//!     │   ──(strong, not in collection set)────▶ Return-Unchanged
//!     └──▶ Reload-Field ──▶ Call-Runtime ──────▶ Return-Fixed
//! ```
//!
//! Weak and phantom barriers skip the collection-set test and go straight to the
//! runtime while weak roots are being processed.

use std::fmt;

use bsc_barrier::{BarrierLayout, GcStateFlags};
use bsc_ir::ReferenceStrength;
use bsc_lir::{BitState, CompressEncoding, ForeignCall, LirInst, VReg};

use crate::aarch64::{A64Reg, Aarch64Assembler};
use crate::amd64::{Amd64Assembler, X64Reg};
use crate::assembler::BarrierAssembler;
use crate::error::{EmitError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LrbState {
    Start,
    ReturnUnchanged,
    ReloadField,
    CallRuntime,
    ReturnFixed,
}

/// Which way a barrier execution goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LrbPath {
    Unchanged,
    Fixed,
}

impl LrbPath {
    /// Path taken for a given thread state and collection-set membership
    pub fn predict(strength: ReferenceStrength, gc_state: GcStateFlags, in_cset: bool) -> Self {
        let forwarded = gc_state.contains(GcStateFlags::HAS_FORWARDED);
        let taken = if strength.is_strong() {
            forwarded && in_cset
        } else {
            gc_state.contains(GcStateFlags::WEAK_ROOTS) || forwarded
        };
        if taken {
            LrbPath::Fixed
        } else {
            LrbPath::Unchanged
        }
    }

    pub fn states(self) -> &'static [LrbState] {
        match self {
            LrbPath::Unchanged => &[LrbState::Start, LrbState::ReturnUnchanged],
            LrbPath::Fixed => &[
                LrbState::Start,
                LrbState::ReloadField,
                LrbState::CallRuntime,
                LrbState::ReturnFixed,
            ],
        }
    }
}

/// One load-reference barrier site with physical registers assigned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReferenceBarrierOp<R> {
    /// In: the loaded reference. Out: the reference to use.
    pub object: R,
    pub field_address: R,
    pub strength: ReferenceStrength,
    pub narrow: bool,
}

impl<R: Copy + Eq + fmt::Debug + fmt::Display + 'static> LoadReferenceBarrierOp<R> {
    /// Take the operands of a `LoadReferenceBarrier` pseudo-instruction
    pub fn from_lir(inst: &LirInst, reg: impl Fn(VReg) -> R) -> Result<Self> {
        match *inst {
            LirInst::LoadReferenceBarrier {
                object,
                field_address,
                strength,
                narrow,
            } => Ok(Self {
                object: reg(object),
                field_address: reg(field_address),
                strength,
                narrow,
            }),
            _ => Err(EmitError::NotABarrier),
        }
    }

    pub fn routine(&self) -> ForeignCall {
        ForeignCall::lrb(self.strength, self.narrow)
    }

    pub fn emit_code<A>(&self, asm: &mut A, layout: &BarrierLayout, encoding: Option<CompressEncoding>) -> Result<()>
    where
        A: BarrierAssembler<Reg = R>,
    {
        let cc = asm.convention().clone();
        if self.object == self.field_address {
            return Err(EmitError::RegisterConflict(format!(
                "object and field address share {}",
                self.object
            )));
        }
        for reg in [self.object, self.field_address] {
            if cc.is_reserved(reg) {
                return Err(EmitError::RegisterConflict(format!(
                    "{} is reserved by {}",
                    reg, cc.name
                )));
            }
        }
        let encoding = if self.narrow {
            Some(encoding.ok_or(EmitError::MissingEncoding)?)
        } else {
            None
        };

        let [state, cset] = cc.scratch;
        let done = asm.new_label();
        asm.load_thread_byte(state, layout.gc_state_offset);
        if self.strength.is_strong() {
            asm.test_bit_and_branch(state, GcStateFlags::HAS_FORWARDED_BIT, BitState::Clear, done);
            asm.indexed_byte_load(
                cset,
                layout.cset_table_address,
                self.object,
                layout.region_size_shift,
            );
            asm.test_bit_and_branch(cset, 0, BitState::Clear, done);
        } else {
            let slow = asm.new_label();
            asm.test_bit_and_branch(state, GcStateFlags::WEAK_ROOTS_BIT, BitState::Set, slow);
            asm.test_bit_and_branch(state, GcStateFlags::HAS_FORWARDED_BIT, BitState::Clear, done);
            asm.bind(slow)?;
        }

        asm.load_field(self.object, self.field_address, self.narrow);
        if let Some(encoding) = encoding {
            asm.decode_narrow(self.object, encoding)?;
        }
        asm.emit_call(self.routine(), &[self.object, self.field_address], self.object)?;
        asm.bind(done)
    }
}

/// Targets with a barrier assembler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Aarch64,
    Amd64,
}

impl Target {
    /// Assembly listing of a barrier stub with the object in the first
    /// callee-saved register and the field address in the second
    pub fn lrb_listing(
        self,
        strength: ReferenceStrength,
        narrow: bool,
        layout: &BarrierLayout,
        encoding: Option<CompressEncoding>,
    ) -> Result<String> {
        match self {
            Target::Aarch64 => {
                let op = LoadReferenceBarrierOp {
                    object: A64Reg(19),
                    field_address: A64Reg(20),
                    strength,
                    narrow,
                };
                let mut asm = Aarch64Assembler::new();
                op.emit_code(&mut asm, layout, encoding)?;
                Ok(asm.finish()?.to_string())
            }
            Target::Amd64 => {
                let op = LoadReferenceBarrierOp {
                    object: X64Reg::Rbx,
                    field_address: X64Reg::R12,
                    strength,
                    narrow,
                };
                let mut asm = Amd64Assembler::new();
                op.emit_code(&mut asm, layout, encoding)?;
                Ok(asm.finish()?.to_string())
            }
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Target::Aarch64 => "aarch64",
            Target::Amd64 => "amd64",
        })
    }
}
