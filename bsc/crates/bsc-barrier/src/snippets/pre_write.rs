//! SATB pre-write barrier
//!
//! ```text
//!   [nullcheck base]
//!   marking = thread[satb_marking_active]     ; exit if 0 (likely)
//!   prev    = do_load ? [field] : expected    ; exit if null
//!   index   = thread[satb_index]
//!   index != 0 ? buffer[index - word] = prev, thread[satb_index] = index - word
//!              : call satb_enqueue(prev)
//! ```

use bsc_ir::BarrierKind;
use bsc_lir::{BranchHint, Cond, LirInst, Operand, VReg, Width};

use super::SnippetEmitter;
use crate::counters::CounterEvent;
use crate::error::{BarrierError, Result};

pub(crate) struct PreWriteArgs {
    /// Address of the slot being overwritten
    pub field: VReg,
    pub expected: Option<VReg>,
    pub do_load: bool,
    /// Base object to null-check before anything else
    pub null_check_base: Option<VReg>,
    pub narrow: bool,
    /// Counter group the fragment reports to
    pub kind: BarrierKind,
}

pub(crate) fn emit(cx: &mut SnippetEmitter<'_>, args: PreWriteArgs) -> Result<()> {
    if let Some(base) = args.null_check_base {
        cx.emit(LirInst::NullCheck { base });
    }
    let done = cx.label();
    cx.count(args.kind, CounterEvent::Attempted);
    let marking = cx.load_thread(cx.layout.satb_marking_active_offset, Width::W8);
    cx.trace(
        "pre-write",
        vec![
            ("field", Operand::Reg(args.field)),
            ("marking", Operand::Reg(marking)),
            ("do_load", Operand::Imm(i64::from(args.do_load))),
        ],
    );
    cx.branch(Cond::Eq, marking, Operand::Imm(0), done, BranchHint::Likely);

    let previous = if args.do_load {
        let loaded = cx.load_reference(args.field, args.narrow)?;
        cx.verify_oop(loaded);
        loaded
    } else {
        args.expected
            .ok_or_else(|| BarrierError::guarantee("pre-write without load needs an expected value"))?
    };
    cx.count(args.kind, CounterEvent::Effective);
    cx.branch(Cond::Eq, previous, Operand::Imm(0), done, BranchHint::Unlikely);

    cx.count(args.kind, CounterEvent::Executed);
    cx.satb_enqueue(previous, done);
    cx.bind(done);
    Ok(())
}
