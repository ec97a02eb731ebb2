//! End-to-end scenario tests: each hand-builds a small `Graph`, runs the relevant pass(es),
//! and asserts on the resulting IR shape.

use ark_codegen::coalescing;
use ark_codegen::entity::EntityRef;
use ark_codegen::ir::{
    ConstantValue, DataType, FieldRef, Graph, InstData, InstId, Opcode,
};
use ark_codegen::options::{Architecture, Builder};
use ark_codegen::regalloc::coloring::{self, ColoringResult};
use ark_codegen::regalloc::interference_graph::InterferenceGraph;
use ark_codegen::analysis::liveness::LifeInterval;
use ark_codegen::isa::{RegClass, RegisterMap};
use ark_codegen::runtime::{ClassPtr, FakeRuntime, FieldPtr, MethodRef};
use ark_codegen::scalar_replacement;
use std::collections::HashSet;

fn field_ref(field: u32, class_id: u32) -> FieldRef {
    FieldRef { field: FieldPtr(field), class_id }
}

/// S1: an allocation with no surviving reads is eliminated outright; instructions it doesn't
/// touch (here, the class-resolution opcode) are left alone.
#[test]
fn s1_unused_allocation_is_elided() {
    let flags = Builder::new().finish();
    let mut graph = Graph::new(Box::new(FakeRuntime::default()), flags);

    let entry = graph.create_block();
    graph.set_start_block(entry);
    graph.set_end_block(entry);

    let load_class = graph.make_inst(Opcode::LoadAndInitClass, DataType::Void);
    graph.append_inst(entry, load_class);

    let ss = graph.make_inst(Opcode::SaveState, DataType::Void);
    graph.append_inst(entry, ss);

    let alloc = graph.make_inst(Opcode::NewObject, DataType::Reference);
    graph.inst_mut(alloc).set_data(InstData::ClassRef(ClassPtr(1)));
    graph.append_inst(entry, alloc);
    graph.set_save_state(alloc, ss);

    let ret = graph.make_inst(Opcode::ReturnVoid, DataType::Void);
    graph.append_inst(entry, ret);

    let stats = scalar_replacement::run(&mut graph).expect("scalar replacement should succeed");

    assert_eq!(stats.eliminated_allocations, 1);
    assert!(!graph.inst(alloc).in_graph, "dead allocation should have been removed");
    assert!(graph.inst(load_class).in_graph, "unrelated opcode must survive untouched");
    let insts = graph.block(entry).insts().to_vec();
    assert!(!insts.contains(&alloc));
    assert!(insts.contains(&load_class));
}

/// S2: a field written and then read back off a virtual object resolves to the stored value
/// directly, and the whole allocation/store/load chain disappears.
#[test]
fn s2_virtual_object_field_round_trips() {
    let flags = Builder::new().finish();
    let mut graph = Graph::new(Box::new(FakeRuntime::default()), flags);

    let entry = graph.create_block();
    graph.set_start_block(entry);
    graph.set_end_block(entry);

    let param0 = graph.make_inst(Opcode::Parameter, DataType::I32);
    graph.inst_mut(param0).set_data(InstData::Param(0));
    graph.append_inst(entry, param0);

    let ss = graph.make_inst(Opcode::SaveState, DataType::Void);
    graph.append_inst(entry, ss);

    let alloc = graph.make_inst(Opcode::NewObject, DataType::Reference);
    graph.inst_mut(alloc).set_data(InstData::ClassRef(ClassPtr(1)));
    graph.append_inst(entry, alloc);
    graph.set_save_state(alloc, ss);

    let field = field_ref(10, 1);
    let store = graph.make_inst(Opcode::StoreObject, DataType::Void);
    graph.inst_mut(store).set_data(InstData::FieldAccess(field));
    graph.append_input(store, alloc, DataType::Reference);
    graph.append_input(store, param0, DataType::I32);
    graph.append_inst(entry, store);

    let load = graph.make_inst(Opcode::LoadObject, DataType::I32);
    graph.inst_mut(load).set_data(InstData::FieldAccess(field));
    graph.append_input(load, alloc, DataType::Reference);
    graph.append_inst(entry, load);

    let ret = graph.make_inst(Opcode::Return, DataType::Void);
    graph.append_input(ret, load, DataType::I32);
    graph.append_inst(entry, ret);

    let stats = scalar_replacement::run(&mut graph).expect("scalar replacement should succeed");

    assert_eq!(stats.eliminated_allocations, 1);
    assert_eq!(stats.eliminated_loads, 1);
    assert_eq!(stats.eliminated_stores, 1);
    assert!(!graph.inst(alloc).in_graph);
    assert!(!graph.inst(store).in_graph);
    assert!(!graph.inst(load).in_graph);
    assert_eq!(graph.inst(ret).inputs()[0].value, param0, "Return should now read param0 directly");
}

/// S3: an allocation written in the entry block and then passed to a call in one branch only
/// is moved into that branch -- the original `NewObject` is cloned right before the call, the
/// clone's one non-default field is restored with a `StoreObject`, and the other branch never
/// sees any allocation at all.
#[test]
fn s3_partially_escaping_allocation_is_materialized_in_its_branch() {
    let flags = Builder::new().finish();
    let mut graph = Graph::new(Box::new(FakeRuntime::default()), flags);

    let entry = graph.create_block();
    let true_blk = graph.create_block();
    let false_blk = graph.create_block();
    let join = graph.create_block();
    graph.set_start_block(entry);
    graph.set_end_block(join);

    let ss0 = graph.make_inst(Opcode::SaveState, DataType::Void);
    graph.append_inst(entry, ss0);
    let alloc = graph.make_inst(Opcode::NewObject, DataType::Reference);
    graph.inst_mut(alloc).set_data(InstData::ClassRef(ClassPtr(1)));
    graph.append_inst(entry, alloc);
    graph.set_save_state(alloc, ss0);

    let field = field_ref(5, 1);
    let c1 = graph.make_inst(Opcode::Constant, DataType::I32);
    graph.inst_mut(c1).set_data(InstData::Constant(ConstantValue::Int(42)));
    graph.append_inst(entry, c1);
    let store = graph.make_inst(Opcode::StoreObject, DataType::Void);
    graph.inst_mut(store).set_data(InstData::FieldAccess(field));
    graph.append_input(store, alloc, DataType::Reference);
    graph.append_input(store, c1, DataType::I32);
    graph.append_inst(entry, store);

    let cond = graph.make_inst(Opcode::Constant, DataType::Bool);
    graph.inst_mut(cond).set_data(InstData::Constant(ConstantValue::Bool(true)));
    graph.append_inst(entry, cond);
    let branch = graph.make_inst(Opcode::If, DataType::Void);
    graph.append_input(branch, cond, DataType::Bool);
    graph.append_inst(entry, branch);
    graph.add_edge(entry, true_blk);
    graph.add_edge(entry, false_blk);

    let ss1 = graph.make_inst(Opcode::SaveState, DataType::Void);
    graph.append_inst(true_blk, ss1);
    let call = graph.make_inst(Opcode::Call, DataType::Void);
    graph.inst_mut(call).set_data(InstData::CallTarget(MethodRef(7)));
    graph.append_input(call, alloc, DataType::Reference);
    graph.append_inst(true_blk, call);
    graph.set_save_state(call, ss1);
    let jump_true = graph.make_inst(Opcode::Jump, DataType::Void);
    graph.append_inst(true_blk, jump_true);
    graph.add_edge(true_blk, join);

    let jump_false = graph.make_inst(Opcode::Jump, DataType::Void);
    graph.append_inst(false_blk, jump_false);
    graph.add_edge(false_blk, join);

    let ret = graph.make_inst(Opcode::ReturnVoid, DataType::Void);
    graph.append_inst(join, ret);

    let stats = scalar_replacement::run(&mut graph).expect("scalar replacement should succeed");

    assert_eq!(stats.materialized_allocations, 1, "the allocation escapes through the call and is rematerialized");
    assert_eq!(stats.eliminated_allocations, 0, "an escaping allocation isn't eliminated, it's moved");
    assert!(!graph.inst(alloc).in_graph, "the original NewObject is superseded by its clone");
    assert!(!graph.inst(store).in_graph, "the original field store is superseded by the clone's own store");

    let true_insts = graph.block(true_blk).insts().to_vec();
    let clone = true_insts
        .iter()
        .copied()
        .find(|&i| graph.inst(i).opcode() == Opcode::NewObject)
        .expect("a cloned allocation should have been inserted into the escaping branch");
    assert_ne!(clone, alloc);
    assert_eq!(graph.inst(call).inputs()[0].value, clone, "the call now reads the rematerialized clone");

    let clone_store = true_insts
        .iter()
        .copied()
        .find(|&i| graph.inst(i).opcode() == Opcode::StoreObject)
        .expect("the clone's field should have been restored before the call");
    assert_eq!(graph.inst(clone_store).inputs()[0].value, clone);
    assert_eq!(graph.inst(clone_store).inputs()[1].value, c1);
    assert!(clone_idx_precedes_call(&true_insts, clone_store, call));
    assert!(clone_idx_precedes_call(&true_insts, clone, call));

    let false_insts = graph.block(false_blk).insts().to_vec();
    assert!(
        false_insts.iter().all(|&i| graph.inst(i).opcode() != Opcode::NewObject),
        "the other branch returns the original constant untouched and never sees an allocation"
    );
}

fn clone_idx_precedes_call(insts: &[InstId], earlier: InstId, later: InstId) -> bool {
    let earlier_idx = insts.iter().position(|&i| i == earlier).unwrap();
    let later_idx = insts.iter().position(|&i| i == later).unwrap();
    earlier_idx < later_idx
}

/// S4: two adjacent constant-index array loads on the same base fuse into a single
/// `LoadArrayPairI` plus two `LoadPairPart` projections, on the AArch64 target.
#[test]
fn s4_adjacent_array_loads_coalesce_on_aarch64() {
    let flags = Builder::new().architecture(Architecture::Aarch64).finish();
    let mut graph = Graph::new(Box::new(FakeRuntime::default()), flags);

    let entry = graph.create_block();
    graph.set_start_block(entry);
    graph.set_end_block(entry);

    let arr = graph.make_inst(Opcode::Parameter, DataType::Reference);
    graph.inst_mut(arr).set_data(InstData::Param(0));
    graph.append_inst(entry, arr);

    let v1 = graph.make_inst(Opcode::LoadArrayI, DataType::I32);
    graph.inst_mut(v1).set_data(InstData::ConstIndex(0));
    graph.append_input(v1, arr, DataType::Reference);
    graph.append_inst(entry, v1);

    let v2 = graph.make_inst(Opcode::LoadArrayI, DataType::I32);
    graph.inst_mut(v2).set_data(InstData::ConstIndex(1));
    graph.append_input(v2, arr, DataType::Reference);
    graph.append_inst(entry, v2);

    let add = graph.make_inst(Opcode::Add, DataType::I32);
    graph.append_input(add, v1, DataType::I32);
    graph.append_input(add, v2, DataType::I32);
    graph.append_inst(entry, add);

    let ret = graph.make_inst(Opcode::Return, DataType::Void);
    graph.append_input(ret, add, DataType::I32);
    graph.append_inst(entry, ret);

    let stats = coalescing::run(&mut graph, false).expect("coalescing should succeed");

    assert_eq!(stats.pairs_fused, 1);
    assert!(!graph.inst(v1).in_graph);
    assert!(!graph.inst(v2).in_graph);

    let insts = graph.block(entry).insts().to_vec();
    let pair = insts
        .iter()
        .copied()
        .find(|&i| graph.inst(i).opcode() == Opcode::LoadArrayPairI)
        .expect("a fused pair load should have been inserted");
    match graph.inst(pair).data() {
        InstData::PairInfo { first, second } => {
            assert_eq!(*first, v1);
            assert_eq!(*second, v2);
        }
        other => panic!("unexpected payload on fused pair: {:?}", other),
    }

    let add_inputs: Vec<InstId> = graph.inst(add).inputs().iter().map(|i| i.value).collect();
    for &input in &add_inputs {
        assert_eq!(graph.inst(input).opcode(), Opcode::LoadPairPart);
    }
}

/// S5: a five-value interference graph shaped like a triangle (K3) and an edge (K2) sharing
/// one bridge edge between them has clique number 3, so the graph-coloring allocator must
/// color it with exactly 3 colors even though five values are live across the whole picture.
#[test]
fn s5_interference_coloring_reuses_colors_across_a_k3_plus_k2() {
    let v0 = InstId::new(0);
    let v1 = InstId::new(1);
    let v2 = InstId::new(2);
    let v3 = InstId::new(3);
    let v4 = InstId::new(4);

    let mut iv0 = LifeInterval::new(v0, 0, 0);
    iv0.add_range(0, 5);
    let mut iv1 = LifeInterval::new(v1, 0, 0);
    iv1.add_range(0, 5);
    let mut iv2 = LifeInterval::new(v2, 0, 0);
    iv2.add_range(0, 9);
    let mut iv3 = LifeInterval::new(v3, 8, 0);
    iv3.add_range(8, 12);
    let mut iv4 = LifeInterval::new(v4, 10, 0);
    iv4.add_range(10, 15);

    assert!(iv0.overlaps(&iv1) && iv0.overlaps(&iv2) && iv1.overlaps(&iv2), "v0,v1,v2 form a triangle");
    assert!(iv2.overlaps(&iv3), "v2-v3 is the bridge edge");
    assert!(iv3.overlaps(&iv4), "v3,v4 form the K2");
    assert!(!iv0.overlaps(&iv3) && !iv0.overlaps(&iv4), "the two cliques don't otherwise touch");
    assert!(!iv2.overlaps(&iv4), "the bridge is a single edge, not a second triangle");

    let intervals = [iv0, iv1, iv2, iv3, iv4];
    let mut graph = InterferenceGraph::build(intervals.iter());
    assert_eq!(graph.len(), 5);

    let register_map = RegisterMap::aarch64();
    let outcome = coloring::color_class(&mut graph, RegClass::Int, |_| true, &register_map);
    let colors = match outcome {
        ColoringResult::Complete(colors) => colors,
        ColoringResult::NeedsSpill(uncolorable) => {
            panic!("expected a complete coloring, got spills: {:?}", uncolorable)
        }
    };
    assert_eq!(colors.len(), 5);

    let triangle_colors: HashSet<_> = [v0, v1, v2].iter().map(|v| colors[v]).collect();
    assert_eq!(triangle_colors.len(), 3, "three mutually-interfering values need three distinct colors");

    let distinct: HashSet<_> = colors.values().copied().collect();
    assert_eq!(distinct.len(), 3, "clique number 3 means 3 colors suffice for all five values");
}

/// S6: an object materialized in one branch is still captured by a `SaveState` at the merge
/// below it; scalar replacement rebridges that `SaveState`'s entry to the new allocation
/// instead of leaving it pointing at the deleted original.
#[test]
fn s6_merge_save_state_gets_the_rematerialized_allocation_as_a_bridge_input() {
    let flags = Builder::new().finish();
    let mut graph = Graph::new(Box::new(FakeRuntime::default()), flags);

    let entry = graph.create_block();
    let true_blk = graph.create_block();
    let false_blk = graph.create_block();
    let join = graph.create_block();
    graph.set_start_block(entry);
    graph.set_end_block(join);

    let ss0 = graph.make_inst(Opcode::SaveState, DataType::Void);
    graph.append_inst(entry, ss0);
    let alloc = graph.make_inst(Opcode::NewObject, DataType::Reference);
    graph.inst_mut(alloc).set_data(InstData::ClassRef(ClassPtr(2)));
    graph.append_inst(entry, alloc);
    graph.set_save_state(alloc, ss0);

    let cond = graph.make_inst(Opcode::Constant, DataType::Bool);
    graph.inst_mut(cond).set_data(InstData::Constant(ConstantValue::Bool(true)));
    graph.append_inst(entry, cond);
    let branch = graph.make_inst(Opcode::If, DataType::Void);
    graph.append_input(branch, cond, DataType::Bool);
    graph.append_inst(entry, branch);
    graph.add_edge(entry, true_blk);
    graph.add_edge(entry, false_blk);

    let ss_call = graph.make_inst(Opcode::SaveState, DataType::Void);
    graph.append_inst(true_blk, ss_call);
    let call = graph.make_inst(Opcode::Call, DataType::Void);
    graph.inst_mut(call).set_data(InstData::CallTarget(MethodRef(3)));
    graph.append_input(call, alloc, DataType::Reference);
    graph.append_inst(true_blk, call);
    graph.set_save_state(call, ss_call);
    let jump_true = graph.make_inst(Opcode::Jump, DataType::Void);
    graph.append_inst(true_blk, jump_true);
    graph.add_edge(true_blk, join);

    let jump_false = graph.make_inst(Opcode::Jump, DataType::Void);
    graph.append_inst(false_blk, jump_false);
    graph.add_edge(false_blk, join);

    let ss_join = graph.make_inst(Opcode::SaveState, DataType::Void);
    graph.append_inst(join, ss_join);
    graph.bind_save_state_payload(ss_join).push(alloc, 3);

    let ret = graph.make_inst(Opcode::ReturnVoid, DataType::Void);
    graph.append_inst(join, ret);

    scalar_replacement::run(&mut graph).expect("scalar replacement should succeed");

    assert!(!graph.inst(alloc).in_graph, "the original NewObject is superseded by its clone");
    let true_insts = graph.block(true_blk).insts().to_vec();
    let clone = true_insts
        .iter()
        .copied()
        .find(|&i| graph.inst(i).opcode() == Opcode::NewObject)
        .expect("a cloned allocation should have been inserted into the escaping branch");

    let payload = graph.save_state_payload(ss_join).expect("ss_join should still carry its payload");
    assert_eq!(payload.entries().len(), 1);
    assert_eq!(payload.entries()[0].value, clone, "the merge SaveState now bridges to the rematerialized allocation");
    assert!(!payload.is_virtualized(clone), "the object escaped, it wasn't decomposed into fields");
}
