//! Graph IR unit tests
//!
//! Chain editing, use rewriting and classification bookkeeping.

use crate::*;
use proptest::prelude::*;

fn field_store_unit() -> (Graph, NodeId, NodeId, NodeId) {
    let mut b = GraphBuilder::new("store");
    let obj = b.param(Stamp::non_null_object());
    let value = b.param(Stamp::object());
    let addr = b.field_address(obj, 16);
    let write = b.write(addr, value, TargetMetadata::reference_field());
    b.ret(None);
    (b.finish(), addr, value, write)
}

#[test]
fn test_new_graph_has_start_only() {
    let graph = Graph::new("empty");
    assert_eq!(graph.fixed_chain(), vec![graph.start()]);
    assert!(graph.barrier_nodes().is_empty());
}

#[test]
fn test_builder_appends_in_program_order() {
    let (graph, _, _, write) = field_store_unit();
    let chain = graph.fixed_chain();

    assert_eq!(chain.len(), 3);
    assert_eq!(chain[1], write);
    assert!(matches!(graph.kind(chain[2]), Ok(NodeKind::Return { value: None })));
    assert_eq!(graph.parameter_count(), 2);
}

#[test]
fn test_insert_before_and_after_access() {
    let (mut graph, addr, value, write) = field_store_unit();

    let pre = graph
        .add_before_fixed(
            write,
            NodeKind::Barrier(BarrierOp::PreWrite(PreWrite {
                address: addr,
                expected: None,
                do_load: true,
                null_check: false,
                narrow: false,
            })),
            Stamp::Void,
        )
        .unwrap();
    let post = graph
        .add_after_fixed(
            write,
            NodeKind::Barrier(BarrierOp::PostWrite(PostWrite {
                address: addr,
                value: Some(value),
                do_load: false,
                null_check: false,
            })),
            Stamp::Void,
        )
        .unwrap();

    let chain = graph.fixed_chain();
    assert_eq!(&chain[1..4], &[pre, write, post]);
    assert_eq!(graph.prev_fixed(write), Some(pre));
    assert_eq!(graph.next_fixed(write), Some(post));
    assert_eq!(graph.count_barriers(BarrierKind::PreWrite), 1);
    assert_eq!(graph.count_barriers(BarrierKind::PostWrite), 1);
}

#[test]
fn test_remove_fixed_relinks_neighbours() {
    let (mut graph, _, _, write) = field_store_unit();
    let before = graph.prev_fixed(write).unwrap();
    let after = graph.next_fixed(write).unwrap();

    graph.remove_fixed(write).unwrap();

    assert_eq!(graph.next_fixed(before), Some(after));
    assert_eq!(graph.prev_fixed(after), Some(before));
    assert!(!graph.node(write).unwrap().is_on_chain());
    assert_eq!(graph.remove_fixed(write), Err(IrError::Removed(write)));
}

#[test]
fn test_remove_tail_then_append() {
    let (mut graph, _, _, _) = field_store_unit();
    let ret = *graph.fixed_chain().last().unwrap();
    graph.remove_fixed(ret).unwrap();

    let new_ret = graph.append_fixed(NodeKind::Return { value: None }, Stamp::Void);
    assert_eq!(graph.fixed_chain().last(), Some(&new_ret));
}

#[test]
fn test_cannot_insert_before_start_or_around_floating() {
    let (mut graph, addr, _, _) = field_store_unit();
    let start = graph.start();

    let before_start = graph.add_before_fixed(start, NodeKind::Return { value: None }, Stamp::Void);
    assert_eq!(before_start, Err(IrError::NotFixed(start)));

    let around_floating = graph.add_after_fixed(addr, NodeKind::Return { value: None }, Stamp::Void);
    assert_eq!(around_floating, Err(IrError::NotFixed(addr)));
}

#[test]
fn test_classification_recorded_once() {
    let (mut graph, _, _, write) = field_store_unit();
    let access = graph.access_mut(write).unwrap();

    access.set_barrier_type(BarrierType::Field).unwrap();
    let second = access.set_barrier_type(BarrierType::None);

    assert_eq!(access.barrier_type(), Some(BarrierType::Field));
    assert!(matches!(second, Err(IrError::AlreadyClassified { .. })));
}

#[test]
fn test_replace_at_usages_skips_exception() {
    let mut b = GraphBuilder::new("chain-read");
    let obj = b.param(Stamp::non_null_object());
    let addr = b.field_address(obj, 16);
    let loaded = b.read(addr, TargetMetadata::reference_field());
    let inner = b.field_address(loaded, 24);
    let second = b.read(inner, TargetMetadata::reference_field());
    b.ret(Some(second));
    let mut graph = b.finish();

    let lrb = graph
        .add_after_fixed(
            loaded,
            NodeKind::Barrier(BarrierOp::LoadReference(LoadReference {
                address: addr,
                value: loaded,
                narrow: false,
                strength: ReferenceStrength::Strong,
            })),
            Stamp::object(),
        )
        .unwrap();
    let replaced = graph.replace_at_usages(loaded, lrb, lrb);

    assert_eq!(replaced, 1);
    assert!(matches!(
        graph.kind(inner),
        Ok(NodeKind::Address { base, .. }) if *base == lrb
    ));
    assert!(matches!(
        graph.kind(lrb),
        Ok(NodeKind::Barrier(BarrierOp::LoadReference(l))) if l.value == loaded
    ));
}

#[test]
fn test_read_strength_mapping() {
    assert_eq!(BarrierType::Field.read_strength(), Some(ReferenceStrength::Strong));
    assert_eq!(BarrierType::Array.read_strength(), Some(ReferenceStrength::Strong));
    assert_eq!(BarrierType::Unknown.read_strength(), Some(ReferenceStrength::Strong));
    assert_eq!(BarrierType::ReferenceGet.read_strength(), Some(ReferenceStrength::Weak));
    assert_eq!(BarrierType::WeakRefersTo.read_strength(), Some(ReferenceStrength::Weak));
    assert_eq!(
        BarrierType::PhantomRefersTo.read_strength(),
        Some(ReferenceStrength::Phantom)
    );
    assert_eq!(BarrierType::PostInitWrite.read_strength(), None);
    assert_eq!(BarrierType::None.read_strength(), None);
}

#[test]
fn test_storage_size_follows_narrow_flag() {
    assert_eq!(TargetMetadata::reference_field().storage_size(), 8);
    assert_eq!(TargetMetadata::reference_field().narrowed().storage_size(), 4);
    let byte = TargetMetadata::primitive(PrimitiveKind::Byte, LocationKind::Field);
    assert_eq!(byte.storage_size(), 1);
}

#[test]
fn test_array_copy_stride_from_target() {
    let mut b = GraphBuilder::new("copy");
    let src = b.param(Stamp::Word);
    let dst = b.param(Stamp::Word);
    let len = b.param(Stamp::int(64));
    let copy = b.array_copy(
        src,
        dst,
        len,
        TargetMetadata::reference_array_element().narrowed(),
        InitKind::None,
    );
    let graph = b.finish();

    match &graph.access(copy).unwrap().op {
        AccessOp::ArrayRangeWrite { element_stride, .. } => assert_eq!(*element_stride, 4),
        other => panic!("unexpected op {:?}", other),
    }
}

proptest! {
    /// Any interleaving of before/after insertions keeps the chain a consistent list
    #[test]
    fn prop_chain_links_stay_consistent(ops in prop::collection::vec((any::<bool>(), 0usize..8), 1..40)) {
        let mut graph = Graph::new("fuzz");
        graph.append_fixed(NodeKind::Return { value: None }, Stamp::Void);

        for (before, pick) in ops {
            let chain = graph.fixed_chain();
            let anchor = chain[1 + pick % (chain.len() - 1)];
            let kind = NodeKind::Return { value: None };
            let inserted = if before {
                graph.add_before_fixed(anchor, kind, Stamp::Void)
            } else {
                graph.add_after_fixed(anchor, kind, Stamp::Void)
            };
            prop_assert!(inserted.is_ok());
        }

        let chain = graph.fixed_chain();
        prop_assert_eq!(chain[0], graph.start());
        for pair in chain.windows(2) {
            prop_assert_eq!(graph.next_fixed(pair[0]), Some(pair[1]));
            prop_assert_eq!(graph.prev_fixed(pair[1]), Some(pair[0]));
        }
    }
}
