//! Load-reference barrier
//!
//! ```text
//!   state = thread[gc_state]
//!   strong:   exit if !HAS_FORWARDED              (likely)
//!             exit if cset[value >> region_shift] == 0
//!   weak/ph:  exit if !WEAK_ROOTS && !HAS_FORWARDED
//!   reloaded = [field]                            ; decoded when narrow
//!   result   = call lrb_<strength>[_narrow](reloaded, field)
//! ```
//!
//! `result` must already hold the input value; every exit leaves it unchanged.
//! The old value returned by an atomic swap is passed as is: the field already
//! holds the new value.
//! A null value reaches the cset test on the strong path and exits there, since
//! the table entry for region 0 is never set.

use bsc_ir::{BarrierKind, ReferenceStrength};
use bsc_lir::{Address, BinOp, BitState, BranchHint, Cond, ForeignCall, LirInst, Operand, VReg, Width};

use super::SnippetEmitter;
use crate::counters::CounterEvent;
use crate::error::Result;
use crate::layout::GcStateFlags;

pub(crate) struct LoadReferenceArgs {
    pub field: VReg,
    /// In: value as loaded. Out: value to use.
    pub result: VReg,
    pub strength: ReferenceStrength,
    pub narrow: bool,
    /// Re-read the field before calling the runtime
    pub reload: bool,
}

pub(crate) fn emit(cx: &mut SnippetEmitter<'_>, args: LoadReferenceArgs) -> Result<()> {
    let done = cx.label();
    cx.verify_oop(args.result);
    cx.count(BarrierKind::LoadReference, CounterEvent::Attempted);

    let state = cx.load_thread(cx.layout.gc_state_offset, Width::W8);
    if args.strength.is_strong() {
        cx.emit(LirInst::BranchOnBit {
            src: state,
            bit: GcStateFlags::HAS_FORWARDED_BIT,
            when: BitState::Clear,
            target: done,
            hint: BranchHint::Likely,
        });
        let region = cx.binop(
            BinOp::Shr,
            args.result,
            Operand::Imm(i64::from(cx.layout.region_size_shift)),
        );
        let table = cx.imm(cx.layout.cset_table_address as i64);
        let in_cset = cx.load(
            Address::Indexed {
                base: table,
                index: region,
                shift: 0,
                disp: 0,
            },
            Width::W8,
        );
        cx.branch(Cond::Eq, in_cset, Operand::Imm(0), done, BranchHint::Likely);
    } else {
        let slow = cx.label();
        cx.emit(LirInst::BranchOnBit {
            src: state,
            bit: GcStateFlags::WEAK_ROOTS_BIT,
            when: BitState::Set,
            target: slow,
            hint: BranchHint::Unlikely,
        });
        cx.emit(LirInst::BranchOnBit {
            src: state,
            bit: GcStateFlags::HAS_FORWARDED_BIT,
            when: BitState::Clear,
            target: done,
            hint: BranchHint::Likely,
        });
        cx.bind(slow);
    }

    cx.count(BarrierKind::LoadReference, CounterEvent::Effective);
    let reloaded = if args.reload {
        cx.load_reference(args.field, args.narrow)?
    } else {
        args.result
    };
    cx.count(BarrierKind::LoadReference, CounterEvent::Executed);
    cx.emit(LirInst::Call {
        target: ForeignCall::lrb(args.strength, args.narrow),
        args: vec![Operand::Reg(reloaded), Operand::Reg(args.field)],
        result: Some(args.result),
    });
    cx.bind(done);
    Ok(())
}
