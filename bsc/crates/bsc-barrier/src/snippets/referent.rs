//! Referent keep-alive barrier
//!
//! A pre-write of the read value (no load). With a dynamic check the fragment first
//! confirms the access really hit a referent field: the offset must equal the
//! referent offset and the base object's class must be a reference class.

use bsc_ir::BarrierKind;
use bsc_lir::{Address, BranchHint, Cond, Operand, VReg, Width};

use super::pre_write::{self, PreWriteArgs};
use super::SnippetEmitter;
use crate::error::Result;

/// How the referent-ness of the access is established
pub(crate) enum ReferentCheck {
    /// Known statically
    None,
    /// Offset known at compile time; base still needs a class check
    ConstOffset { base: VReg, offset: i64 },
    /// Both offset and class checked at run time
    Dynamic { base: VReg, offset: VReg },
}

pub(crate) fn emit(cx: &mut SnippetEmitter<'_>, field: VReg, value: VReg, check: ReferentCheck) -> Result<()> {
    let skip = cx.label();
    let base = match check {
        ReferentCheck::None => None,
        ReferentCheck::ConstOffset { offset, .. } if offset != cx.layout.referent_offset => {
            log::trace!("offset {} is never a referent, keep-alive elided", offset);
            return Ok(());
        }
        ReferentCheck::ConstOffset { base, .. } => Some(base),
        ReferentCheck::Dynamic { base, offset } => {
            cx.branch(
                Cond::Ne,
                offset,
                Operand::Imm(cx.layout.referent_offset),
                skip,
                BranchHint::Likely,
            );
            Some(base)
        }
    };
    if let Some(base) = base {
        let klass = cx.load(
            Address::Base {
                base,
                disp: cx.layout.klass_offset,
            },
            Width::W64,
        );
        let reference_type = cx.load(
            Address::Base {
                base: klass,
                disp: cx.layout.klass_reference_type_offset,
            },
            Width::W8,
        );
        cx.branch(Cond::Eq, reference_type, Operand::Imm(0), skip, BranchHint::Likely);
    }

    pre_write::emit(
        cx,
        PreWriteArgs {
            field,
            expected: Some(value),
            do_load: false,
            null_check_base: None,
            narrow: false,
            kind: BarrierKind::ReferentFieldRead,
        },
    )?;
    cx.bind(skip);
    Ok(())
}
