//! Test Utilities for the simulator tests
//!
//! Simulator fixtures for each barrier configuration, small compilation units and
//! helpers to seed the heap with objects and references.

#![allow(dead_code)]

use bsc_barrier::{BarrierConfig, CollectorKind, LrbLowering};
use bsc_ir::{ClassRef, Graph, GraphBuilder, InitKind, Stamp, TargetMetadata};
use bsc_lir::{CompressEncoding, LirFunction, Width};
use bsc_sim::{ClassInfo, Execution, HeapConfig, MutatorThread, ReferenceType, Simulator};

/// Offset of the field written by [`store_unit`]
pub const FIELD_OFFSET: i64 = 24;
/// Offset of the referent field, and of the field read by [`load_unit`]
pub const REFERENT_OFFSET: i64 = 16;

pub const ENCODING: CompressEncoding = CompressEncoding::new(0, 3);

/// ============================================================================
/// SIMULATORS
/// ============================================================================

pub fn simulator(config: BarrierConfig) -> Simulator {
    simulator_with(config, HeapConfig::default())
}

pub fn simulator_with(config: BarrierConfig, heap: HeapConfig) -> Simulator {
    Simulator::new(config, heap).expect("simulator config is valid")
}

pub fn satb() -> Simulator {
    simulator(BarrierConfig::default())
}

pub fn generational() -> Simulator {
    simulator(BarrierConfig {
        collector: CollectorKind::GenerationalSatb,
        post_write_barriers: true,
        ..Default::default()
    })
}

pub fn narrow() -> Simulator {
    simulator(narrow_config())
}

pub fn narrow_config() -> BarrierConfig {
    BarrierConfig {
        narrow_pointers: true,
        compress_encoding: Some(ENCODING),
        ..Default::default()
    }
}

pub fn diagnostics() -> Simulator {
    simulator(BarrierConfig {
        verify_oops: true,
        snippet_counters: true,
        trace_start_cycle: 1,
        ..Default::default()
    })
}

pub fn assembly(narrow: bool) -> Simulator {
    let base = if narrow {
        narrow_config()
    } else {
        BarrierConfig::default()
    };
    simulator(BarrierConfig {
        lrb_lowering: LrbLowering::Assembly,
        ..base
    })
}

/// SATB buffers of `words` entries
pub fn small_buffers(words: usize) -> Simulator {
    simulator_with(
        BarrierConfig::default(),
        HeapConfig {
            satb_buffer_words: words,
            ..Default::default()
        },
    )
}

/// ============================================================================
/// HEAP SEEDING
/// ============================================================================

/// Plain class with four reference fields at offsets 16..48
pub fn node_class(sim: &Simulator) -> ClassRef {
    sim.runtime()
        .heap()
        .define_class(ClassInfo::plain("Node", 4))
        .expect("class fits")
}

pub fn reference_class(sim: &Simulator, reference_type: ReferenceType) -> ClassRef {
    sim.runtime()
        .heap()
        .define_class(ClassInfo::reference("Reference", reference_type))
        .expect("class fits")
}

pub fn alloc(sim: &Simulator, class: ClassRef) -> u64 {
    sim.runtime().heap().allocate(class, 0).expect("heap has room")
}

pub fn set_field(sim: &Simulator, obj: u64, offset: i64, value: u64) {
    sim.runtime()
        .heap()
        .write_u64(obj + offset as u64, value)
        .expect("field is mapped");
}

pub fn field(sim: &Simulator, obj: u64, offset: i64) -> u64 {
    sim.runtime()
        .heap()
        .read_u64(obj + offset as u64)
        .expect("field is mapped")
}

pub fn set_narrow_field(sim: &Simulator, obj: u64, offset: i64, value: u64) {
    let encoding = sim.runtime().encoding();
    sim.runtime()
        .heap()
        .write(obj + offset as u64, Width::W32, u64::from(encoding.compress(value)))
        .expect("field is mapped");
}

pub fn narrow_field(sim: &Simulator, obj: u64, offset: i64) -> u64 {
    let raw = sim
        .runtime()
        .heap()
        .read_u32(obj + offset as u64)
        .expect("field is mapped");
    sim.runtime().encoding().uncompress(raw)
}

/// Marking cycle that logs nothing and leaves weak-root processing running
pub fn enter_weak_roots(sim: &Simulator, live: &[u64]) {
    let runtime = sim.runtime();
    runtime.start_marking().expect("idle");
    for &obj in live {
        runtime.heap().mark(obj);
    }
    runtime.finish_marking().expect("marking");
}

/// ============================================================================
/// UNITS
/// ============================================================================

/// `obj.f = value` at [`FIELD_OFFSET`]
pub fn store_unit(target: TargetMetadata) -> Graph {
    let mut b = GraphBuilder::new("store");
    let obj = b.param(Stamp::non_null_object());
    let value = b.param(Stamp::object());
    let addr = b.field_address(obj, FIELD_OFFSET);
    b.write_with(addr, value, target, InitKind::None, false);
    b.ret(None);
    b.finish()
}

/// `ref.referent = value`
pub fn referent_store_unit(target: TargetMetadata) -> Graph {
    let mut b = GraphBuilder::new("referent-store");
    let reference = b.param(Stamp::non_null_object());
    let value = b.param(Stamp::object());
    let addr = b.field_address(reference, REFERENT_OFFSET);
    b.write(addr, value, target);
    b.ret(None);
    b.finish()
}

/// `return obj.f` at [`REFERENT_OFFSET`]
pub fn load_unit(target: TargetMetadata) -> Graph {
    let mut b = GraphBuilder::new("load");
    let obj = b.param(Stamp::non_null_object());
    let addr = b.field_address(obj, REFERENT_OFFSET);
    let read = b.read(addr, target);
    b.ret(Some(read));
    b.finish()
}

/// `return *(obj + offset)` through an unknown location
pub fn unknown_load_unit() -> Graph {
    let mut b = GraphBuilder::new("unknown-load");
    let obj = b.param(Stamp::non_null_object());
    let offset = b.param(Stamp::int(64));
    let addr = b.indexed_address(obj, offset);
    let read = b.read(addr, TargetMetadata::unknown_reference());
    b.ret(Some(read));
    b.finish()
}

/// `return cas(obj.f, expected, new)`
pub fn cas_unit() -> Graph {
    let mut b = GraphBuilder::new("cas");
    let obj = b.param(Stamp::non_null_object());
    let expected = b.param(Stamp::object());
    let new_value = b.param(Stamp::object());
    let addr = b.field_address(obj, FIELD_OFFSET);
    let ok = b.compare_and_swap(addr, expected, new_value, TargetMetadata::reference_field());
    b.ret(Some(ok));
    b.finish()
}

/// `return swap(obj.f, value)`
pub fn swap_unit() -> Graph {
    let mut b = GraphBuilder::new("swap");
    let obj = b.param(Stamp::non_null_object());
    let value = b.param(Stamp::object());
    let addr = b.field_address(obj, FIELD_OFFSET);
    let old = b.atomic_swap(addr, value, TargetMetadata::reference_field());
    b.ret(Some(old));
    b.finish()
}

/// Copy `len` references from `src` to `dst`
pub fn copy_unit() -> Graph {
    let mut b = GraphBuilder::new("copy");
    let src = b.param(Stamp::Word);
    let dst = b.param(Stamp::Word);
    let len = b.param(Stamp::int(64));
    b.array_copy(src, dst, len, TargetMetadata::reference_array_element(), InitKind::None);
    b.ret(None);
    b.finish()
}

/// `x = new C; obj.f = x; return x`
pub fn allocate_and_store_unit(class: ClassRef) -> Graph {
    let mut b = GraphBuilder::new("alloc-store");
    let obj = b.param(Stamp::non_null_object());
    let fresh = b.new_instance(class, 0);
    let addr = b.field_address(obj, FIELD_OFFSET);
    b.write(addr, fresh, TargetMetadata::reference_field());
    b.ret(Some(fresh));
    b.finish()
}

pub fn compile(sim: &Simulator, mut graph: Graph) -> LirFunction {
    sim.compile(&mut graph).expect("compilation should succeed").lir
}

pub fn run(sim: &Simulator, thread: MutatorThread, func: &LirFunction, args: &[u64]) -> Execution {
    sim.execute(thread, func, args)
        .unwrap_or_else(|e| panic!("{} failed: {}", func.name, e))
}
