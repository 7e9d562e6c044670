//! Test Utilities for the barrier pipeline tests
//!
//! Fixtures for layouts, barrier sets and small compilation units, plus checks over
//! lowered LIR that hold for every fragment.

#![allow(dead_code)]

use bsc_barrier::{BarrierConfig, BarrierCounters, BarrierLayout, BarrierSet, CollectorKind, CompiledUnit};
use bsc_ir::{Graph, GraphBuilder, InitKind, NodeId, Stamp, TargetMetadata};
use bsc_lir::{CompressEncoding, LirFunction, LirInst};

pub const REFERENT_OFFSET: i64 = 16;

/// Layout matching the simulator's default thread and heap geometry
pub fn layout() -> BarrierLayout {
    BarrierLayout {
        gc_state_offset: 0,
        satb_marking_active_offset: 1,
        satb_buffer_offset: 8,
        satb_index_offset: 16,
        cset_table_address: 0x10_0000,
        region_size_shift: 16,
        card_table_address: Some(0x20_0000),
        card_shift: 9,
        gc_total_collections_address: 0x30_0000,
        referent_offset: REFERENT_OFFSET,
        klass_offset: 8,
        klass_reference_type_offset: 0,
        word_size: 8,
    }
}

/// ============================================================================
/// BARRIER SET FIXTURES
/// ============================================================================

pub fn satb() -> BarrierSet {
    BarrierSet::new(BarrierConfig::default(), layout()).expect("default config is valid")
}

pub fn generational() -> BarrierSet {
    BarrierSet::new(
        BarrierConfig {
            collector: CollectorKind::GenerationalSatb,
            post_write_barriers: true,
            ..Default::default()
        },
        layout(),
    )
    .expect("generational config is valid")
}

pub fn narrow() -> BarrierSet {
    BarrierSet::new(
        BarrierConfig {
            narrow_pointers: true,
            compress_encoding: Some(CompressEncoding::new(0, 3)),
            ..Default::default()
        },
        layout(),
    )
    .expect("narrow config is valid")
}

pub fn diagnostics() -> BarrierSet {
    BarrierSet::new(
        BarrierConfig {
            verify_oops: true,
            snippet_counters: true,
            trace_start_cycle: 1,
            ..Default::default()
        },
        layout(),
    )
    .expect("diagnostic config is valid")
}

/// Every configuration the pipeline tests sweep over
pub fn all_sets() -> Vec<(&'static str, BarrierSet)> {
    vec![
        ("satb", satb()),
        ("generational", generational()),
        ("narrow", narrow()),
        ("diagnostics", diagnostics()),
        (
            "epsilon",
            BarrierSet::new(BarrierConfig::epsilon(), layout()).expect("epsilon config is valid"),
        ),
    ]
}

/// ============================================================================
/// UNITS
/// ============================================================================

/// `obj.f = value` through a reference field
pub fn store_unit(target: TargetMetadata, init: InitKind) -> (Graph, NodeId) {
    let mut b = GraphBuilder::new("store");
    let obj = b.param(Stamp::non_null_object());
    let value = b.param(Stamp::object());
    let addr = b.field_address(obj, 24);
    let write = b.write_with(addr, value, target, init, false);
    b.ret(None);
    (b.finish(), write)
}

/// `return obj.f`
pub fn load_unit(target: TargetMetadata) -> (Graph, NodeId) {
    let mut b = GraphBuilder::new("load");
    let obj = b.param(Stamp::non_null_object());
    let addr = b.field_address(obj, REFERENT_OFFSET);
    let read = b.read(addr, target);
    b.ret(Some(read));
    (b.finish(), read)
}

/// Mixed unit touching every barrier kind
pub fn mixed_unit(narrow: bool) -> Graph {
    let field = if narrow {
        TargetMetadata::reference_field().narrowed()
    } else {
        TargetMetadata::reference_field()
    };
    let element = if narrow {
        TargetMetadata::reference_array_element().narrowed()
    } else {
        TargetMetadata::reference_array_element()
    };
    let mut b = GraphBuilder::new("mixed");
    let obj = b.param(Stamp::non_null_object());
    let value = b.param(Stamp::object());
    let src = b.param(Stamp::Word);
    let dst = b.param(Stamp::Word);
    let len = b.param(Stamp::int(64));
    let offset = b.param(Stamp::int(64));

    let addr = b.field_address(obj, 24);
    let loaded = b.read(addr, field);
    b.write(addr, value, field);
    b.compare_and_swap(addr, loaded, value, field);
    b.atomic_swap(addr, loaded, field);
    let raw = b.indexed_address(obj, offset);
    b.read(raw, TargetMetadata::unknown_reference());
    b.array_copy(src, dst, len, element, InitKind::None);
    b.ret(Some(loaded));
    b.finish()
}

pub fn compile(set: &BarrierSet, graph: &mut Graph) -> CompiledUnit {
    set.compile(graph, &BarrierCounters::new())
        .expect("compilation should succeed")
}

/// ============================================================================
/// LIR CHECKS
/// ============================================================================

/// Every label is bound once and every branch targets a bound label
///
/// **Bug this finds:** fragments jumping to labels they never bind
pub fn assert_well_formed(func: &LirFunction) {
    let positions = func
        .label_positions()
        .unwrap_or_else(|label| panic!("{}: label {} bound twice", func.name, label));
    for inst in &func.insts {
        let target = match inst {
            LirInst::Branch { target, .. }
            | LirInst::BranchOnBit { target, .. }
            | LirInst::Jump { target } => *target,
            _ => continue,
        };
        assert!(
            positions.get(target.0 as usize).copied().flatten().is_some(),
            "{}: branch to unbound label {}",
            func.name,
            target
        );
    }
    assert!(
        matches!(func.insts.last(), Some(LirInst::Return { .. })),
        "{}: missing return",
        func.name
    );
}

pub fn count(func: &LirFunction, pred: impl Fn(&LirInst) -> bool) -> usize {
    func.insts.iter().filter(|i| pred(i)).count()
}
