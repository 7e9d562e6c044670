//! Post-write barrier: card marking
//!
//! Empty unless post-write barriers are enabled. When enabled, a store of a
//! non-null value dirties `card_table[field >> card_shift]`.

use bsc_ir::BarrierKind;
use bsc_lir::{Address, BinOp, BranchHint, Cond, LirInst, Operand, VReg, Width};

use super::SnippetEmitter;
use crate::counters::CounterEvent;
use crate::error::{BarrierError, Result};
use crate::layout::DIRTY_CARD;

pub(crate) fn emit(cx: &mut SnippetEmitter<'_>, field: VReg, value: Option<VReg>) -> Result<()> {
    if !cx.config.post_write_barriers {
        return Ok(());
    }
    let table = card_table(cx)?;
    let done = cx.label();

    cx.count(BarrierKind::PostWrite, CounterEvent::Attempted);
    // Without a known value the card is dirtied unconditionally
    if let Some(value) = value {
        cx.branch(Cond::Eq, value, Operand::Imm(0), done, BranchHint::Unlikely);
    }
    cx.count(BarrierKind::PostWrite, CounterEvent::Effective);

    let card = cx.binop(BinOp::Shr, field, Operand::Imm(i64::from(cx.layout.card_shift)));
    let base = cx.imm(table as i64);
    cx.emit(LirInst::Store {
        addr: Address::Indexed {
            base,
            index: card,
            shift: 0,
            disp: 0,
        },
        src: Operand::Imm(i64::from(DIRTY_CARD)),
        width: Width::W8,
    });
    cx.count(BarrierKind::PostWrite, CounterEvent::Executed);
    cx.bind(done);
    Ok(())
}

pub(crate) fn card_table(cx: &SnippetEmitter<'_>) -> Result<u64> {
    cx.layout
        .card_table_address
        .ok_or_else(|| BarrierError::guarantee("post-write barrier without a card table"))
}
