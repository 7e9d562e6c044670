//! Test Utilities for emitter pipeline tests

#![allow(dead_code)]

use bsc_barrier::{BarrierConfig, BarrierCounters, BarrierLayout, BarrierSet, LrbLowering};
use bsc_emit::A64Reg;
use bsc_ir::{Graph, GraphBuilder, ReferentAccess, Stamp, TargetMetadata};
use bsc_lir::{LirFunction, LirInst, VReg};

pub fn layout() -> BarrierLayout {
    BarrierLayout {
        gc_state_offset: 0,
        satb_marking_active_offset: 1,
        satb_buffer_offset: 8,
        satb_index_offset: 16,
        cset_table_address: 0x10_0000,
        region_size_shift: 16,
        card_table_address: None,
        card_shift: 9,
        gc_total_collections_address: 0x30_0000,
        referent_offset: 16,
        klass_offset: 8,
        klass_reference_type_offset: 0,
        word_size: 8,
    }
}

/// Assembly-mode barrier set
pub fn assembly_set(narrow: bool) -> BarrierSet {
    let config = BarrierConfig {
        lrb_lowering: LrbLowering::Assembly,
        narrow_pointers: narrow,
        compress_encoding: narrow.then(|| bsc_lir::CompressEncoding::new(0, 3)),
        ..Default::default()
    };
    BarrierSet::new(config, layout()).expect("assembly config is valid")
}

/// Loads through a field, a `Reference.get` and a phantom `refersTo`
pub fn reads_unit(narrow: bool) -> Graph {
    let wrap = |t: TargetMetadata| if narrow { t.narrowed() } else { t };
    let mut b = GraphBuilder::new("reads");
    let obj = b.param(Stamp::non_null_object());
    let field = b.field_address(obj, 24);
    let referent = b.field_address(obj, 16);
    let a = b.read(field, wrap(TargetMetadata::reference_field()));
    b.read(referent, wrap(TargetMetadata::referent(ReferentAccess::Get)));
    b.read(referent, wrap(TargetMetadata::referent(ReferentAccess::PhantomRefersTo)));
    b.ret(Some(a));
    b.finish()
}

pub fn lower(set: &BarrierSet, mut graph: Graph) -> LirFunction {
    set.compile(&mut graph, &BarrierCounters::new())
        .expect("compilation should succeed")
        .lir
}

/// Object in `x19`, field address in `x20`
pub fn a64_assignment(site: &LirInst) -> impl Fn(VReg) -> A64Reg {
    let object = match site {
        LirInst::LoadReferenceBarrier { object, .. } => Some(*object),
        _ => None,
    };
    move |v| {
        if Some(v) == object {
            A64Reg(19)
        } else {
            A64Reg(20)
        }
    }
}
