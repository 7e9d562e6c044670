//! Concurrent mutator tests
//!
//! Several threads run compiled barrier code against one shared runtime.

mod common;

use std::thread;

use bsc_ir::TargetMetadata;
use bsc_sim::MutatorThread;
use common::*;

const WORKERS: usize = 4;
const STORES: usize = 50;

/// **Invariant verified:** every overwritten value is logged exactly once, across
/// buffer handovers racing on the shared queue set
#[test]
fn test_concurrent_stores_log_every_previous_value() {
    let sim = small_buffers(8);
    let class = node_class(&sim);
    let func = compile(&sim, store_unit(TargetMetadata::reference_field()));

    let workers: Vec<(MutatorThread, u64, Vec<u64>)> = (0..WORKERS)
        .map(|_| {
            let thread = sim.attach_thread().unwrap();
            let obj = alloc(&sim, class);
            let values: Vec<u64> = (0..=STORES).map(|_| alloc(&sim, class)).collect();
            set_field(&sim, obj, FIELD_OFFSET, values[0]);
            (thread, obj, values)
        })
        .collect();
    sim.runtime().start_marking().unwrap();

    thread::scope(|s| {
        for (thread, obj, values) in &workers {
            let sim = &sim;
            let func = &func;
            s.spawn(move || {
                for &value in &values[1..] {
                    run(sim, *thread, func, &[*obj, value]);
                }
            });
        }
    });

    let runtime = sim.runtime();
    let pending: usize = workers
        .iter()
        .map(|(thread, _, _)| thread.satb_len(runtime.heap()).unwrap())
        .sum();
    assert_eq!(
        runtime.satb_queue().total_entries() as usize + pending,
        WORKERS * STORES
    );

    runtime.finish_marking().unwrap();
    for (_, obj, values) in &workers {
        assert_eq!(field(&sim, *obj, FIELD_OFFSET), values[STORES]);
        for &overwritten in &values[..STORES] {
            assert!(runtime.heap().is_marked(overwritten));
        }
        assert!(!runtime.heap().is_marked(values[STORES]));
    }
}

/// **Invariant verified:** racing slow paths agree on a single copy
#[test]
fn test_concurrent_loads_evacuate_once() {
    let sim = satb();
    let class = node_class(&sim);
    let target = alloc(&sim, class);
    sim.runtime().start_evacuation(&[0]).unwrap();
    let func = compile(&sim, load_unit(TargetMetadata::reference_field()));

    let readers: Vec<(MutatorThread, u64)> = (0..WORKERS)
        .map(|_| {
            let thread = sim.attach_thread().unwrap();
            let holder = alloc(&sim, class);
            set_field(&sim, holder, REFERENT_OFFSET, target);
            (thread, holder)
        })
        .collect();

    let loaded: Vec<Option<u64>> = thread::scope(|s| {
        let handles: Vec<_> = readers
            .iter()
            .map(|&(thread, holder)| {
                let sim = &sim;
                let func = &func;
                s.spawn(move || run(sim, thread, func, &[holder]).value)
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let to = sim.runtime().heap().resolve(target).unwrap();
    assert_ne!(to, target);
    assert!(loaded.iter().all(|&v| v == Some(to)), "{:?}", loaded);
    for &(_, holder) in &readers {
        assert_eq!(field(&sim, holder, REFERENT_OFFSET), to);
    }
    let stats = sim.runtime().stats().snapshot();
    assert_eq!(stats.objects_evacuated, 1);
    assert_eq!(stats.fields_healed, WORKERS as u64);
}

/// **Bug this finds:** a phase change missing threads attached earlier
#[test]
fn test_phase_change_reaches_every_thread() {
    let sim = satb();
    let threads: Vec<MutatorThread> = (0..WORKERS).map(|_| sim.attach_thread().unwrap()).collect();
    sim.runtime().start_marking().unwrap();
    let heap = sim.runtime().heap();
    assert!(threads.iter().all(|t| t.marking_active(heap).unwrap()));

    sim.runtime().finish_marking().unwrap();
    assert!(threads.iter().all(|t| !t.marking_active(heap).unwrap()));
    assert_eq!(sim.runtime().threads().len(), WORKERS);
}
