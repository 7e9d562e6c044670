//! bsc-emit - Platform Code Emitter for Barrier Stubs
//!
//! Expands the load-reference-barrier pseudo-instruction left by assembly-mode
//! lowering into target instructions for AArch64 and AMD64.
//!
//! ```text
//!   LirInst::LoadReferenceBarrier ──▶ LoadReferenceBarrierOp::emit_code
//!                                          │  (BarrierAssembler)
//!                           ┌──────────────┴──────────────┐
//!                   Aarch64Assembler               Amd64Assembler
//!                           │
//!                    Aarch64Machine (interpreter for the emitted subset)
//! ```
//!
//! The fast path is straight-line, call-free and only writes the two scratch
//! registers of the target's [`CallingConvention`]. The slow path follows the
//! convention of the barrier routines: arguments in the first two argument
//! registers, result in the return register, everything else preserved by the
//! routine.

pub mod aarch64;
pub mod amd64;
pub mod assembler;
pub mod calling_convention;
pub mod error;
pub mod interp;
pub mod lrb;

pub use aarch64::{A64Inst, A64Reg, Aarch64Assembler};
pub use amd64::{Amd64Assembler, X64Cond, X64Inst, X64Reg};
pub use assembler::{AsmBuffer, AsmCode, AsmLabel, BarrierAssembler};
pub use calling_convention::CallingConvention;
pub use error::{EmitError, Result};
pub use interp::{Aarch64Machine, MachineEnv, Outcome};
pub use lrb::{LoadReferenceBarrierOp, LrbPath, Target};
