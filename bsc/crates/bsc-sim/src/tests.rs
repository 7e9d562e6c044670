//! Simulated runtime unit tests
//!
//! Memory, heap, phase control and runtime routines in isolation, plus the LIR
//! interpreter on hand-built functions. Compiled barrier fragments are exercised
//! by the integration tests.

use crate::config::{CSET_TABLE_BASE, HEAP_BASE, TOTAL_COLLECTIONS_ADDRESS};
use crate::memory::Memory;
use crate::object::{decode_forwarding, KLASS_OFFSET, MARK_WORD_OFFSET};
use crate::*;
use bsc_barrier::GcStateFlags;
use bsc_ir::{ClassRef, ReferenceStrength};
use bsc_lir::{BranchHint, Cond, ForeignCall, LirFunction, LirInst, Operand, Width};

fn runtime() -> Runtime {
    Runtime::new(HeapConfig::default(), None).unwrap()
}

fn runtime_with(config: HeapConfig) -> Runtime {
    Runtime::new(config, None).unwrap()
}

fn node_class(rt: &Runtime) -> ClassRef {
    rt.heap().define_class(ClassInfo::plain("Node", 2)).unwrap()
}

/// ============================================================================
/// MEMORY
/// ============================================================================

#[test]
fn test_memory_little_endian_round_trip() {
    let mut memory = Memory::new();
    memory.map("a", 0x1000, 0x100).unwrap();
    memory.write_u64(0x1008, 0x1122_3344_5566_7788).unwrap();
    assert_eq!(memory.read_u8(0x1008).unwrap(), 0x88);
    assert_eq!(memory.read_u32(0x100c).unwrap(), 0x1122_3344);
    assert_eq!(memory.read(0x1008, Width::W32).unwrap(), 0x5566_7788);
}

/// **Bug this finds:** accesses that silently straddle the end of a segment
#[test]
fn test_memory_faults_outside_segments() {
    let mut memory = Memory::new();
    memory.map("a", 0x1000, 0x10).unwrap();
    memory.map("b", 0x1010, 0x10).unwrap();

    assert!(matches!(memory.read_u8(0xfff), Err(SimError::Fault { addr: 0xfff, len: 1 })));
    assert!(matches!(memory.read_u64(0x100c), Err(SimError::Fault { .. })));
    assert!(matches!(memory.read_u8(0x1020), Err(SimError::Fault { .. })));
    assert!(memory.is_mapped(0x1018, 8));
}

#[test]
fn test_memory_rejects_overlap() {
    let mut memory = Memory::new();
    memory.map("a", 0x1000, 0x100).unwrap();
    assert!(matches!(memory.map("b", 0x10f0, 0x100), Err(SimError::Config(_))));
    assert!(memory.map("c", 0x1100, 0x100).is_ok());
}

#[test]
fn test_memory_copy_and_fill() {
    let mut memory = Memory::new();
    memory.map("a", 0, 64).unwrap();
    memory.fill(0, 8, 0xab).unwrap();
    memory.copy(8, 0, 8).unwrap();
    assert_eq!(memory.read_u64(8).unwrap(), 0xabab_abab_abab_abab);
    memory.copy(0, 0, 0).unwrap();
}

/// ============================================================================
/// CONFIGURATION
/// ============================================================================

#[test]
fn test_heap_config_validation() {
    assert!(HeapConfig::default().validate().is_ok());

    let bad = [
        HeapConfig {
            region_size_shift: 30,
            ..Default::default()
        },
        HeapConfig {
            card_shift: 16,
            ..Default::default()
        },
        HeapConfig {
            region_count: 1,
            ..Default::default()
        },
        HeapConfig {
            satb_buffer_words: 0,
            ..Default::default()
        },
        HeapConfig {
            max_threads: 0,
            ..Default::default()
        },
    ];
    for config in bad {
        assert!(config.validate().is_err(), "{:?} should be rejected", config);
        assert!(matches!(Runtime::new(config, None), Err(SimError::Config(_))));
    }
}

#[test]
fn test_heap_config_from_lookup() {
    let config = HeapConfig::from_lookup(|key| match key {
        "BSC_SIM_REGIONS" => Some("16".into()),
        "BSC_SIM_SATB_BUFFER_WORDS" => Some("4".into()),
        "BSC_SIM_THREADS" => Some("many".into()),
        _ => None,
    });
    assert_eq!(config.region_count, 16);
    assert_eq!(config.satb_buffer_words, 4);
    assert_eq!(config.max_threads, HeapConfig::default().max_threads);
}

#[test]
fn test_unencodable_heap_rejected() {
    let encoding = bsc_lir::CompressEncoding::new(0x200_0000, 3);
    assert!(matches!(
        Runtime::new(HeapConfig::default(), Some(encoding)),
        Err(SimError::Config(_))
    ));
}

/// ============================================================================
/// HEAP
/// ============================================================================

#[test]
fn test_allocation_writes_header() {
    let rt = runtime();
    let class = node_class(&rt);
    let a = rt.heap().allocate(class, 0).unwrap();
    let b = rt.heap().allocate(class, 0).unwrap();

    assert_eq!(a, HEAP_BASE);
    assert_eq!(b, HEAP_BASE + 32);
    assert_eq!(rt.heap().read_u64(a + KLASS_OFFSET).unwrap(), class.0);
    assert_eq!(rt.heap().class_of(b).unwrap().name, "Node");
    assert!(rt.heap().is_object(a));
    assert!(!rt.heap().is_object(a + 8));
}

#[test]
fn test_unknown_class_rejected() {
    let rt = runtime();
    assert!(matches!(
        rt.heap().allocate(ClassRef(0x40_0008), 32),
        Err(SimError::UnknownClass(_))
    ));
    assert!(matches!(
        rt.heap().define_class(ClassInfo {
            name: "Tiny".into(),
            instance_size: 8,
            reference_type: ReferenceType::None,
        }),
        Err(SimError::Config(_))
    ));
}

#[test]
fn test_reference_class_metadata() {
    let rt = runtime();
    let weak = rt
        .heap()
        .define_class(ClassInfo::reference("WeakReference", ReferenceType::Weak))
        .unwrap();
    assert_eq!(rt.heap().read_u8(weak.0).unwrap(), ReferenceType::Weak as u8);
    assert!(rt.heap().class_info(weak.0).unwrap().reference_type.is_reference());
}

#[test]
fn test_allocation_exhausts_regions() {
    let rt = runtime_with(HeapConfig {
        region_count: 2,
        region_size_shift: 12,
        card_shift: 9,
        ..Default::default()
    });
    let big = rt
        .heap()
        .define_class(ClassInfo {
            name: "Big".into(),
            instance_size: 4096,
            reference_type: ReferenceType::None,
        })
        .unwrap();
    rt.heap().allocate(big, 0).unwrap();
    rt.heap().allocate(big, 0).unwrap();
    assert!(matches!(
        rt.heap().allocate(big, 0),
        Err(SimError::OutOfMemory { requested: 4096 })
    ));
}

/// **Invariant verified:** evacuation copies once and forwards every later request
#[test]
fn test_evacuation_forwards() {
    let rt = runtime();
    let class = node_class(&rt);
    let obj = rt.heap().allocate(class, 0).unwrap();
    rt.heap().write_u64(obj + 16, 0x77).unwrap();
    rt.heap().add_to_collection_set(&[0]).unwrap();

    let first = rt.heap().evacuate(obj).unwrap();
    let to = match first {
        Evacuation::Copied(to) => to,
        other => panic!("expected a copy, got {:?}", other),
    };
    assert_eq!(to, rt.heap().region_base(1));
    assert_eq!(rt.heap().evacuate(obj).unwrap(), Evacuation::AlreadyForwarded(to));

    let mark = rt.heap().read_u64(obj + MARK_WORD_OFFSET).unwrap();
    assert_eq!(decode_forwarding(mark), Some(to));
    assert_eq!(rt.heap().resolve(obj).unwrap(), to);
    assert_eq!(rt.heap().read_u64(to + 16).unwrap(), 0x77);
    assert_eq!(rt.heap().forwardee(to).unwrap(), None);
}

#[test]
fn test_collection_set_table() {
    let rt = runtime();
    let table_byte = |region: usize| CSET_TABLE_BASE + (rt.heap().region_base(region) >> 16);

    rt.heap().add_to_collection_set(&[0, 3]).unwrap();
    assert_eq!(rt.heap().read_u8(table_byte(3)).unwrap(), 1);
    assert_eq!(rt.heap().read_u8(table_byte(1)).unwrap(), 0);
    assert_eq!(rt.heap().read_u8(CSET_TABLE_BASE).unwrap(), 0, "null never in cset");
    assert_eq!(rt.heap().collection_set(), vec![0, 3]);
    assert!(rt.heap().in_collection_set(rt.heap().region_base(3) + 100));

    rt.heap().clear_collection_set().unwrap();
    assert_eq!(rt.heap().read_u8(table_byte(3)).unwrap(), 0);
    assert!(rt.heap().collection_set().is_empty());
    assert!(rt.heap().add_to_collection_set(&[64]).is_err());
}

#[test]
fn test_cards_start_clean() {
    let rt = runtime();
    assert_eq!(rt.heap().dirty_card_count().unwrap(), 0);
    let card = rt.heap().card_address(HEAP_BASE + 1024);
    rt.heap().write_u8(card, bsc_barrier::DIRTY_CARD).unwrap();
    assert!(rt.heap().is_card_dirty(HEAP_BASE + 1100).unwrap());
    assert_eq!(rt.heap().dirty_card_count().unwrap(), 1);
    rt.heap().clear_cards().unwrap();
    assert_eq!(rt.heap().dirty_card_count().unwrap(), 0);
}

/// ============================================================================
/// PHASES
/// ============================================================================

#[test]
fn test_phase_cycle_publishes_state() {
    let rt = runtime();
    let thread = rt.attach_thread().unwrap();
    assert_eq!(thread.gc_state(rt.heap()).unwrap(), GcStateFlags::STABLE);

    assert_eq!(rt.start_marking().unwrap(), 1);
    assert_eq!(rt.heap().read_u64(TOTAL_COLLECTIONS_ADDRESS).unwrap(), 1);
    assert_eq!(thread.gc_state(rt.heap()).unwrap(), GcStateFlags::MARKING);
    assert!(thread.marking_active(rt.heap()).unwrap());

    rt.finish_marking().unwrap();
    assert_eq!(rt.phase(), Phase::WeakRoots);
    assert_eq!(thread.gc_state(rt.heap()).unwrap(), GcStateFlags::WEAK_ROOTS);
    assert!(!thread.marking_active(rt.heap()).unwrap());

    rt.start_evacuation(&[0]).unwrap();
    let state = thread.gc_state(rt.heap()).unwrap();
    assert!(state.contains(GcStateFlags::HAS_FORWARDED | GcStateFlags::EVACUATION));

    rt.start_update_refs().unwrap();
    assert!(thread
        .gc_state(rt.heap())
        .unwrap()
        .contains(GcStateFlags::UPDATE_REFS));

    rt.finish_cycle().unwrap();
    assert_eq!(rt.phase(), Phase::Idle);
    assert!(thread.gc_state(rt.heap()).unwrap().is_stable());
    assert!(rt.heap().collection_set().is_empty());
}

#[test]
fn test_late_thread_sees_current_state() {
    let rt = runtime();
    rt.start_marking().unwrap();
    let thread = rt.attach_thread().unwrap();
    assert!(thread.marking_active(rt.heap()).unwrap());
    assert_eq!(thread.satb_len(rt.heap()).unwrap(), 0);
}

#[test]
fn test_out_of_order_phases_rejected() {
    let rt = runtime();
    assert!(matches!(
        rt.finish_marking(),
        Err(SimError::InvalidPhase {
            phase: Phase::Idle,
            ..
        })
    ));
    rt.start_marking().unwrap();
    assert!(matches!(rt.start_marking(), Err(SimError::InvalidPhase { .. })));
    assert!(matches!(rt.start_evacuation(&[0]), Err(SimError::InvalidPhase { .. })));
    assert!(matches!(rt.finish_cycle(), Err(SimError::InvalidPhase { .. })));
}

#[test]
fn test_thread_limit() {
    let rt = runtime_with(HeapConfig {
        max_threads: 1,
        ..Default::default()
    });
    rt.attach_thread().unwrap();
    assert!(matches!(rt.attach_thread(), Err(SimError::ThreadLimit { max: 1 })));
}

/// ============================================================================
/// RUNTIME ROUTINES
/// ============================================================================

/// **Bug this finds:** a full buffer overwritten instead of handed over
#[test]
fn test_satb_enqueue_hands_over_full_buffer() {
    let rt = runtime_with(HeapConfig {
        satb_buffer_words: 2,
        ..Default::default()
    });
    let thread = rt.attach_thread().unwrap();
    rt.start_marking().unwrap();

    for value in [0xa0, 0xb0] {
        rt.satb_enqueue(&thread, value).unwrap();
    }
    assert_eq!(thread.satb_index(rt.heap()).unwrap(), 0);
    assert_eq!(rt.satb_queue().completed_len(), 0);

    rt.satb_enqueue(&thread, 0xc0).unwrap();
    assert_eq!(rt.satb_queue().completed_len(), 1);
    assert_eq!(rt.satb_queue().total_entries(), 2);
    assert_eq!(thread.satb_entries(rt.heap()).unwrap(), vec![0xc0]);
    assert_eq!(rt.satb_queue().drain(), vec![vec![0xa0, 0xb0]]);

    let stats = rt.stats().snapshot();
    assert_eq!(stats.satb_enqueue_calls, 3);
    assert_eq!(stats.satb_buffers_completed, 1);
}

#[test]
fn test_satb_enqueue_dropped_when_not_marking() {
    let rt = runtime();
    let thread = rt.attach_thread().unwrap();
    rt.satb_enqueue(&thread, 0xa0).unwrap();
    assert_eq!(thread.satb_len(rt.heap()).unwrap(), 0);
    assert_eq!(rt.stats().snapshot().satb_entries_dropped, 1);
}

#[test]
fn test_finish_marking_marks_logged_objects() {
    let rt = runtime();
    let class = node_class(&rt);
    let logged = rt.heap().allocate(class, 0).unwrap();
    let unlogged = rt.heap().allocate(class, 0).unwrap();
    let thread = rt.attach_thread().unwrap();

    rt.start_marking().unwrap();
    rt.satb_enqueue(&thread, logged).unwrap();
    assert_eq!(rt.finish_marking().unwrap(), 1);
    assert!(rt.heap().is_marked(logged));
    assert!(!rt.heap().is_marked(unlogged));
    assert_eq!(thread.satb_len(rt.heap()).unwrap(), 0);
}

#[test]
fn test_allocation_while_marking_is_marked() {
    let rt = runtime();
    let class = node_class(&rt);
    rt.start_marking().unwrap();
    let obj = rt.new_instance(class.0, 32).unwrap();
    assert!(rt.heap().is_marked(obj));
    assert_eq!(rt.stats().snapshot().allocations, 1);
}

#[test]
fn test_lrb_outside_collection_set_is_identity() {
    let rt = runtime();
    let class = node_class(&rt);
    let obj = rt.heap().allocate(class, 0).unwrap();
    rt.start_evacuation(&[5]).unwrap();
    for strength in [ReferenceStrength::Strong, ReferenceStrength::Weak, ReferenceStrength::Phantom] {
        assert_eq!(rt.load_reference_barrier(strength, false, obj, 0).unwrap(), obj);
    }
    assert_eq!(rt.load_reference_barrier(ReferenceStrength::Strong, false, 0, 0).unwrap(), 0);
}

/// **Invariant verified:** the slow path returns the copy and heals the field
#[test]
fn test_lrb_evacuates_and_heals_wide_field() {
    let rt = runtime();
    let class = node_class(&rt);
    let target = rt.heap().allocate(class, 0).unwrap();
    rt.start_evacuation(&[0]).unwrap();
    let holder = rt.heap().allocate(class, 0).unwrap();
    rt.heap().write_u64(holder + 16, target).unwrap();

    let to = rt
        .load_reference_barrier(ReferenceStrength::Strong, false, target, holder + 16)
        .unwrap();
    assert_ne!(to, target);
    assert_eq!(rt.heap().read_u64(holder + 16).unwrap(), to);

    let stats = rt.stats().snapshot();
    assert_eq!(stats.objects_evacuated, 1);
    assert_eq!(stats.fields_healed, 1);
}

#[test]
fn test_lrb_heals_narrow_field() {
    let rt = runtime();
    let encoding = rt.encoding();
    let class = node_class(&rt);
    let target = rt.heap().allocate(class, 0).unwrap();
    rt.start_evacuation(&[0]).unwrap();
    let holder = rt.heap().allocate(class, 0).unwrap();
    rt.heap()
        .write(holder + 16, Width::W32, u64::from(encoding.compress(target)))
        .unwrap();

    let to = rt
        .load_reference_barrier(ReferenceStrength::Strong, true, target, holder + 16)
        .unwrap();
    assert_eq!(rt.heap().read_u32(holder + 16).unwrap(), encoding.compress(to));
    assert_eq!(rt.heap().read_u32(holder + 20).unwrap(), 0, "neighbour untouched");
}

/// **Bug this finds:** healing over a value another thread stored meanwhile
#[test]
fn test_lrb_does_not_heal_changed_field() {
    let rt = runtime();
    let class = node_class(&rt);
    let target = rt.heap().allocate(class, 0).unwrap();
    rt.start_evacuation(&[0]).unwrap();
    let holder = rt.heap().allocate(class, 0).unwrap();
    let other = rt.heap().allocate(class, 0).unwrap();
    rt.heap().write_u64(holder + 16, other).unwrap();

    rt.load_reference_barrier(ReferenceStrength::Strong, false, target, holder + 16)
        .unwrap();
    assert_eq!(rt.heap().read_u64(holder + 16).unwrap(), other);
    assert_eq!(rt.stats().snapshot().fields_healed, 0);
}

#[test]
fn test_weak_lrb_clears_unmarked_during_weak_roots() {
    let rt = runtime();
    let class = node_class(&rt);
    let dead = rt.heap().allocate(class, 0).unwrap();
    let live = rt.heap().allocate(class, 0).unwrap();
    let thread = rt.attach_thread().unwrap();

    rt.start_marking().unwrap();
    rt.satb_enqueue(&thread, live).unwrap();
    rt.finish_marking().unwrap();

    for strength in [ReferenceStrength::Weak, ReferenceStrength::Phantom] {
        assert_eq!(rt.load_reference_barrier(strength, false, dead, 0).unwrap(), 0);
        assert_eq!(rt.load_reference_barrier(strength, false, live, 0).unwrap(), live);
    }
    assert_eq!(
        rt.load_reference_barrier(ReferenceStrength::Strong, false, dead, 0).unwrap(),
        dead
    );
    assert_eq!(rt.stats().snapshot().references_cleared, 2);
}

#[test]
fn test_verify_oop() {
    let rt = runtime();
    let class = node_class(&rt);
    let obj = rt.heap().allocate(class, 0).unwrap();
    assert_eq!(rt.verify_oop(obj).unwrap(), obj);
    assert_eq!(rt.verify_oop(0).unwrap(), 0);

    let err = rt.verify_oop(obj + 4).unwrap_err();
    assert!(err.is_trap());
    assert!(err.to_string().contains("not an object"));
}

#[test]
fn test_call_checks_arity() {
    let rt = runtime();
    let thread = rt.attach_thread().unwrap();
    let err = rt.call(&thread, ForeignCall::SatbEnqueue, &[1, 2]).unwrap_err();
    assert!(err.is_trap());
    assert_eq!(rt.call(&thread, ForeignCall::VerifyOop, &[0]).unwrap(), Some(0));
}

#[test]
fn test_trace_sink_json() {
    let rt = runtime();
    let thread = rt.attach_thread().unwrap();
    rt.trace(&thread, "pre-write", vec![("cycle", 2), ("field", 0x1000)]);

    let records = rt.trace_sink().records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].field("field"), Some(0x1000));
    let json = rt.trace_sink().to_json_lines();
    assert!(json.contains("\"event\":\"pre-write\""), "{}", json);
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["fields"]["cycle"], 2);

    rt.trace_sink().clear();
    assert!(rt.trace_sink().is_empty());
}

#[test]
fn test_stats_merge() {
    let mut a = RuntimeStatsSnapshot {
        lrb_calls: 2,
        satb_enqueue_calls: 1,
        ..Default::default()
    };
    let b = RuntimeStatsSnapshot {
        lrb_calls: 3,
        oops_verified: 4,
        ..Default::default()
    };
    a.merge(&b);
    assert_eq!(a.lrb_calls, 5);
    assert_eq!(a.runtime_calls(), 10);
}

/// ============================================================================
/// INTERPRETER
/// ============================================================================

/// `x + 5 == 7 ? 2 : 1`
fn branchy() -> LirFunction {
    let mut f = LirFunction::new("branchy");
    let x = f.new_vreg();
    f.params.push(x);
    let sum = f.new_vreg();
    let taken = f.new_label();
    f.push(LirInst::BinOp {
        op: bsc_lir::BinOp::Add,
        dst: sum,
        lhs: x,
        rhs: Operand::Imm(5),
    });
    f.push(LirInst::Branch {
        cond: Cond::Eq,
        lhs: sum,
        rhs: Operand::Imm(7),
        target: taken,
        hint: BranchHint::Unlikely,
    });
    f.push(LirInst::Return {
        value: Some(Operand::Imm(1)),
    });
    f.push(LirInst::Bind(taken));
    f.push(LirInst::Return {
        value: Some(Operand::Imm(2)),
    });
    f
}

#[test]
fn test_interpreter_branches() {
    let rt = runtime();
    let thread = rt.attach_thread().unwrap();
    let f = branchy();
    let mut interp = Interpreter::new(&rt, thread);
    assert_eq!(interp.run(&f, &[2]).unwrap().value, Some(2));
    assert_eq!(interp.run(&f, &[3]).unwrap().value, Some(1));
    assert!(matches!(interp.run(&f, &[]), Err(SimError::Config(_))));
}

#[test]
fn test_interpreter_thread_relative_access() {
    let rt = runtime();
    let thread = rt.attach_thread().unwrap();
    rt.start_marking().unwrap();

    let mut f = LirFunction::new("marking");
    let flag = f.new_vreg();
    f.push(LirInst::Load {
        dst: flag,
        addr: bsc_lir::Address::Thread { disp: 1 },
        width: Width::W8,
    });
    f.push(LirInst::Return {
        value: Some(Operand::Reg(flag)),
    });
    let result = Interpreter::new(&rt, thread).run(&f, &[]).unwrap();
    assert_eq!(result.value, Some(1));
}

#[test]
fn test_interpreter_undefined_register() {
    let rt = runtime();
    let thread = rt.attach_thread().unwrap();
    let mut f = LirFunction::new("undef");
    let v = f.new_vreg();
    f.push(LirInst::Return {
        value: Some(Operand::Reg(v)),
    });
    assert!(matches!(
        Interpreter::new(&rt, thread).run(&f, &[]),
        Err(SimError::UndefinedRegister(_))
    ));
}

#[test]
fn test_interpreter_null_check_traps() {
    let rt = runtime();
    let thread = rt.attach_thread().unwrap();
    let mut f = LirFunction::new("npe");
    let base = f.new_vreg();
    f.params.push(base);
    f.push(LirInst::NullCheck { base });
    f.push(LirInst::Return { value: None });

    let mut interp = Interpreter::new(&rt, thread);
    assert!(interp.run(&f, &[HEAP_BASE]).is_ok());
    let err = interp.run(&f, &[0]).unwrap_err();
    assert!(matches!(err, SimError::NullPointer { at: 0 }));
    assert!(err.is_trap());
}

#[test]
fn test_interpreter_step_limit() {
    let rt = runtime();
    let thread = rt.attach_thread().unwrap();
    let mut f = LirFunction::new("spin");
    let head = f.new_label();
    f.push(LirInst::Bind(head));
    f.push(LirInst::Jump { target: head });

    let mut interp = Interpreter::new(&rt, thread);
    interp.step_limit = 100;
    assert!(matches!(
        interp.run(&f, &[]),
        Err(SimError::StepLimit { steps: 100 })
    ));
}

#[test]
fn test_interpreter_stub_runs_on_aarch64() {
    let rt = runtime();
    let class = node_class(&rt);
    let target = rt.heap().allocate(class, 0).unwrap();
    rt.start_evacuation(&[0]).unwrap();
    let holder = rt.heap().allocate(class, 0).unwrap();
    rt.heap().write_u64(holder + 16, target).unwrap();
    let thread = rt.attach_thread().unwrap();

    let mut f = LirFunction::new("stub");
    let obj = f.new_vreg();
    let field = f.new_vreg();
    f.params.push(obj);
    f.params.push(field);
    f.push(LirInst::LoadReferenceBarrier {
        object: obj,
        field_address: field,
        strength: ReferenceStrength::Strong,
        narrow: false,
    });
    f.push(LirInst::Return {
        value: Some(Operand::Reg(obj)),
    });

    let mut interp = Interpreter::new(&rt, thread);
    let run = interp.run(&f, &[target, holder + 16]).unwrap();
    let to = rt.heap().resolve(target).unwrap();
    assert_ne!(to, target);
    assert_eq!(run.value, Some(to));
    assert_eq!(run.stub_runs, 1);
    assert_eq!(run.call_count(ForeignCall::lrb(ReferenceStrength::Strong, false)), 1);

    // Healed field: the second run takes the fast path
    let run = interp.run(&f, &[to, holder + 16]).unwrap();
    assert_eq!(run.value, Some(to));
    assert!(run.calls.is_empty());
}
