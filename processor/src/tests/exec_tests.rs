//! Dispatch scenarios: flattened execution order, shadow folding, error recovery.

use std::rc::Rc;

use blockvm_core::{Block, OpKind, Value};

use super::fixtures::*;
use crate::runtime::ReportKind;
use crate::{Runtime, ThreadStatus};

#[test]
fn arithmetic_executes_children_before_parents() {
    let registry = Rc::new(TracedRegistry::new());
    let trace = registry.trace.clone();
    let mut rt = Runtime::new(registry);
    let cid = rt.register_container(Rc::new(arithmetic_blocks()), sprite());

    let thread = rt.push_thread(cid, "add");
    rt.thread_mut(thread).stack_click = true;
    run_to_completion(&mut rt);

    assert_eq!(
        *trace.borrow(),
        vec![
            "operator_multiply(NUM1:4,NUM2:5)=20".to_string(),
            "operator_add(NUM1:3,NUM2:20)=23".to_string(),
        ]
    );

    let reports = rt.drain_reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].kind, ReportKind::StackClick);
    assert_eq!(reports[0].value, Value::Num(23.0));
    assert_eq!(&*reports[0].block, "add");
}

#[test]
fn shadow_values_fold_into_bundles_at_cache_time() {
    let registry = Rc::new(TracedRegistry::new());
    let trace = registry.trace.clone();
    let mut rt = Runtime::new(registry);

    let mut blocks = blockvm_core::testing::TestBlocks::new();
    blocks.add(Block::new("move", "motion_movesteps").with_shadow_input("STEPS", "ten"));
    shadow_num(&mut blocks, "ten", "10");
    let cid = rt.register_container(Rc::new(blocks), sprite());
    rt.push_thread(cid, "move");

    // Build the cache without dispatching anything.
    let (threads, services, caches) = rt.parts_mut();
    let thread = &threads[0];
    let blocks = thread.blocks.clone();
    let registry = services.registry.clone();
    let seq = caches
        .get_or_build(
            thread.container_id,
            &thread.peek_stack().unwrap().clone(),
            blocks.as_ref(),
            registry.as_ref(),
            &mut services.interner,
        )
        .unwrap();

    let seq = seq.borrow();
    let cmd = seq.commands[0].op;
    assert_eq!(seq.op(cmd).args.get("STEPS"), Some(&Value::Num(10.0)));
    assert_eq!(seq.shadow_ops.len(), 1);
    assert!(trace.borrow().is_empty());
}

#[test]
fn shadow_ops_commute() {
    let registry = Rc::new(TracedRegistry::new());
    let mut rt = Runtime::new(registry);
    let cid = rt.register_container(Rc::new(arithmetic_blocks()), sprite());
    rt.push_thread(cid, "add");

    let (threads, services, caches) = rt.parts_mut();
    let thread = &threads[0];
    let blocks = thread.blocks.clone();
    let registry = services.registry.clone();
    let seq = caches
        .get_or_build(
            thread.container_id,
            &thread.peek_stack().unwrap().clone(),
            blocks.as_ref(),
            registry.as_ref(),
            &mut services.interner,
        )
        .unwrap();

    let mut seq = seq.borrow_mut();
    let before: Vec<Vec<(String, Value)>> = seq
        .ops
        .iter()
        .map(|op| op.args.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
        .collect();

    // Re-run the shadow pre-execution in reverse order; bundles must not change.
    let shadows: Vec<_> = seq.shadow_ops.iter().rev().copied().collect();
    for shadow in shadows {
        let value = seq.op(shadow).shadow_value.clone().unwrap();
        seq.write_parent(shadow, value);
    }
    let after: Vec<Vec<(String, Value)>> = seq
        .ops
        .iter()
        .map(|op| op.args.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
        .collect();
    assert_eq!(before, after);
}

#[test]
fn missing_chain_block_retires_the_thread() {
    let registry = Rc::new(TracedRegistry::with_extra(|p| {
        p.insert("test_cmd", |_, _| blockvm_core::PrimitiveResult::Nothing);
    }));
    let trace = registry.trace.clone();
    let mut rt = Runtime::new(registry);

    let mut blocks = blockvm_core::testing::TestBlocks::new();
    blocks.add(Block::new("cmd", "test_cmd").with_next("ghost"));
    let cid = rt.register_container(Rc::new(blocks), sprite());
    rt.push_thread(cid, "cmd");

    let done = rt.step_threads();
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].status, ThreadStatus::Done);
    assert_eq!(trace.borrow().len(), 1);
}

#[test]
fn missing_entry_block_retires_immediately() {
    let registry = Rc::new(TracedRegistry::new());
    let mut rt = Runtime::new(registry);
    let blocks = blockvm_core::testing::TestBlocks::new();
    let cid = rt.register_container(Rc::new(blocks), sprite());
    rt.push_thread(cid, "nowhere");

    let done = rt.step_threads();
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].status, ThreadStatus::Done);
}

#[test]
fn unknown_opcodes_are_recorded_but_skipped() {
    let registry = Rc::new(TracedRegistry::new());
    let mut rt = Runtime::new(registry);

    let mut blocks = counting_loop_blocks("2");
    // Splice an unknown command between the two known ones.
    blocks.add(
        Block::new("set", "data_setvariableto")
            .with_ref_field("VARIABLE", "varx", "x")
            .with_shadow_input("VALUE", "zero")
            .with_next("alien"),
    );
    blocks.add(Block::new("alien", "alien_opcode").with_next("rep"));
    let target = sprite();
    let cid = rt.register_container(Rc::new(blocks), target.clone());
    rt.push_thread(cid, "set");
    run_to_completion(&mut rt);

    assert_eq!(variable_number(&target, "varx"), 2.0);

    // The alien op is present in the plan, undefined, and skipped.
    let seq = rt.caches().sequence(cid, "set").unwrap();
    let seq = seq.borrow();
    let alien = seq.ops.iter().find(|op| &*op.opcode == "alien_opcode").unwrap();
    assert!(!alien.defined);
    assert_eq!(alien.kind, OpKind::Undefined);
}

#[test]
fn glow_reports_the_last_executed_block() {
    let registry = Rc::new(TracedRegistry::new());
    let mut rt = Runtime::new(registry);
    let target = sprite();
    let cid = rt.register_container(Rc::new(counting_loop_blocks("1")), target);
    rt.push_thread(cid, "set");

    let mut done = Vec::new();
    for _ in 0..50 {
        done.extend(rt.step_threads());
        if rt.thread_count() == 0 {
            break;
        }
    }
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].last_block.as_deref(), Some("rep"));
}

#[test]
fn force_no_glow_suppresses_glow_ids() {
    let registry = Rc::new(TracedRegistry::new());
    let mut rt = Runtime::new(registry);
    let mut blocks = counting_loop_blocks("1");
    blocks.force_no_glow = true;
    let cid = rt.register_container(Rc::new(blocks), sprite());
    rt.push_thread(cid, "set");

    let mut done = Vec::new();
    for _ in 0..50 {
        done.extend(rt.step_threads());
        if rt.thread_count() == 0 {
            break;
        }
    }
    assert_eq!(done.len(), 1);
    assert!(done[0].last_block.is_none());
}
