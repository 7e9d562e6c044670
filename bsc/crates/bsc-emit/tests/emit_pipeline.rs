//! Emitter pipeline tests
//!
//! Assembly-mode lowering followed by stub expansion for every target.

mod common;

use bsc_emit::{
    A64Inst, Aarch64Assembler, Amd64Assembler, BarrierAssembler, LoadReferenceBarrierOp, Target, X64Reg,
};
use bsc_ir::ReferenceStrength;
use bsc_lir::{ForeignCall, LirInst};
use common::*;

fn lrb_sites(func: &bsc_lir::LirFunction) -> Vec<&LirInst> {
    func.insts
        .iter()
        .filter(|i| matches!(i, LirInst::LoadReferenceBarrier { .. }))
        .collect()
}

/// **Invariant verified:** every pseudo-instruction expands to exactly one call
#[test]
fn test_every_site_expands_on_aarch64() {
    for narrow in [false, true] {
        let set = assembly_set(narrow);
        let func = lower(&set, reads_unit(narrow));
        let sites = lrb_sites(&func);
        assert_eq!(sites.len(), 3);

        for site in sites {
            let op = LoadReferenceBarrierOp::from_lir(site, a64_assignment(site)).unwrap();
            let mut asm = Aarch64Assembler::new();
            op.emit_code(&mut asm, set.layout(), set.config().compress_encoding)
                .unwrap();
            let code = asm.finish().unwrap();

            let calls: Vec<_> = code
                .insts
                .iter()
                .filter_map(|i| match i {
                    A64Inst::Bl { routine } => Some(*routine),
                    _ => None,
                })
                .collect();
            assert_eq!(calls, vec![ForeignCall::lrb(op.strength, narrow)]);
            assert_eq!(
                code.insts.iter().any(|i| matches!(i, A64Inst::LdrW { .. })),
                narrow
            );
        }
    }
}

#[test]
fn test_strengths_follow_access_kind() {
    let func = lower(&assembly_set(false), reads_unit(false));
    let strengths: Vec<ReferenceStrength> = lrb_sites(&func)
        .into_iter()
        .map(|i| match i {
            LirInst::LoadReferenceBarrier { strength, .. } => *strength,
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(
        strengths,
        vec![
            ReferenceStrength::Strong,
            ReferenceStrength::Weak,
            ReferenceStrength::Phantom
        ]
    );
}

#[test]
fn test_amd64_expansion_preserves_argument_registers() {
    let set = assembly_set(false);
    let func = lower(&set, reads_unit(false));
    let site = lrb_sites(&func)[0];
    let op = LoadReferenceBarrierOp::from_lir(site, |_v| X64Reg::Rbx)
        .map(|mut op| {
            op.field_address = X64Reg::R13;
            op
        })
        .unwrap();

    let mut asm = Amd64Assembler::new();
    op.emit_code(&mut asm, set.layout(), None).unwrap();
    assert_eq!(asm.convention().name, "sysv64");
    let text = asm.finish().unwrap().to_string();

    let pushes = text.matches("push ").count();
    let pops = text.matches("pop ").count();
    assert_eq!(pushes, 3, "{}", text);
    assert_eq!(pushes, pops);
    // Three 8-byte pushes leave rsp misaligned by 8 until padded
    assert!(text.contains("sub rsp, 8"), "{}", text);
    assert!(text.contains("add rsp, 8"), "{}", text);
}

#[test]
fn test_listings_for_both_targets() {
    for target in [Target::Aarch64, Target::Amd64] {
        for strength in [
            ReferenceStrength::Strong,
            ReferenceStrength::Weak,
            ReferenceStrength::Phantom,
        ] {
            let text = target
                .lrb_listing(strength, true, &layout(), Some(bsc_lir::CompressEncoding::new(0, 3)))
                .unwrap_or_else(|e| panic!("{} {}: {}", target, strength, e));
            assert!(text.contains(ForeignCall::lrb(strength, true).name()));
        }
    }
}
