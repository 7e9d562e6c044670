//! Array-range barriers around bulk reference copies

use bsc_ir::BarrierKind;
use bsc_lir::{Address, BinOp, BranchHint, Cond, LirInst, Operand, VReg, Width};

use super::post_write::card_table;
use super::SnippetEmitter;
use crate::counters::CounterEvent;
use crate::error::Result;
use crate::layout::DIRTY_CARD;

pub(crate) struct RangeArgs {
    /// First destination slot
    pub start: VReg,
    /// Element count
    pub length: VReg,
    pub element_stride: u32,
    pub narrow: bool,
}

/// Log every non-null previous value in the destination range.
///
/// Skipped entirely when marking is inactive or the range is empty.
pub(crate) fn emit_pre(cx: &mut SnippetEmitter<'_>, args: RangeArgs) -> Result<()> {
    let shift = cx.stride_shift(args.element_stride)?;
    let done = cx.label();
    let head = cx.label();
    let next = cx.label();

    cx.count(BarrierKind::ArrayRangePreWrite, CounterEvent::Attempted);
    let marking = cx.load_thread(cx.layout.satb_marking_active_offset, Width::W8);
    cx.branch(Cond::Eq, marking, Operand::Imm(0), done, BranchHint::Likely);
    cx.branch(Cond::Eq, args.length, Operand::Imm(0), done, BranchHint::Unlikely);
    cx.count(BarrierKind::ArrayRangePreWrite, CounterEvent::Effective);

    let i = cx.imm(0);
    cx.bind(head);
    cx.branch(Cond::Ge, i, Operand::Reg(args.length), done, BranchHint::Unlikely);

    let offset = cx.binop(BinOp::Shl, i, Operand::Imm(i64::from(shift)));
    let slot = cx.binop(BinOp::Add, args.start, Operand::Reg(offset));
    let previous = cx.load_reference(slot, args.narrow)?;
    cx.verify_oop(previous);
    cx.branch(Cond::Eq, previous, Operand::Imm(0), next, BranchHint::Unlikely);
    cx.count(BarrierKind::ArrayRangePreWrite, CounterEvent::Executed);
    cx.satb_enqueue(previous, next);

    cx.bind(next);
    cx.emit(LirInst::BinOp {
        op: BinOp::Add,
        dst: i,
        lhs: i,
        rhs: Operand::Imm(1),
    });
    cx.jump(head);
    cx.bind(done);
    Ok(())
}

/// Dirty every card covering the destination range. Empty without post barriers.
pub(crate) fn emit_post(cx: &mut SnippetEmitter<'_>, args: RangeArgs) -> Result<()> {
    if !cx.config.post_write_barriers {
        return Ok(());
    }
    let table = card_table(cx)?;
    let shift = cx.stride_shift(args.element_stride)?;
    let card_shift = i64::from(cx.layout.card_shift);
    let done = cx.label();
    let head = cx.label();

    cx.count(BarrierKind::ArrayRangePostWrite, CounterEvent::Attempted);
    cx.branch(Cond::Eq, args.length, Operand::Imm(0), done, BranchHint::Unlikely);
    cx.count(BarrierKind::ArrayRangePostWrite, CounterEvent::Effective);

    let bytes = cx.binop(BinOp::Shl, args.length, Operand::Imm(i64::from(shift)));
    let end = cx.binop(BinOp::Add, args.start, Operand::Reg(bytes));
    let last = cx.binop(BinOp::Sub, end, Operand::Imm(1));
    let last_card = cx.binop(BinOp::Shr, last, Operand::Imm(card_shift));
    let card = cx.binop(BinOp::Shr, args.start, Operand::Imm(card_shift));
    let base = cx.imm(table as i64);

    cx.bind(head);
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
    cx.count(BarrierKind::ArrayRangePostWrite, CounterEvent::Executed);
    cx.emit(LirInst::BinOp {
        op: BinOp::Add,
        dst: card,
        lhs: card,
        rhs: Operand::Imm(1),
    });
    cx.branch(Cond::Ge, last_card, Operand::Reg(card), head, BranchHint::Likely);
    cx.bind(done);
    Ok(())
}
