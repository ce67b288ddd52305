//! Control flow: loops, branches, procedures, recursion.

use std::rc::Rc;

use blockvm_core::{Block, Mutation, ProcedureParams, Value, testing::TestBlocks};

use super::fixtures::*;
use crate::{Runtime, RuntimeOptions, ThreadStatus, sequencer};

#[test]
fn repeat_runs_its_branch_the_requested_number_of_times() {
    let registry = Rc::new(TracedRegistry::new());
    let mut rt = Runtime::new(registry);
    let target = sprite();
    let cid = rt.register_container(Rc::new(counting_loop_blocks("4")), target.clone());
    rt.push_thread(cid, "set");
    run_to_completion(&mut rt);
    assert_eq!(variable_number(&target, "varx"), 4.0);
}

#[test]
fn if_else_takes_exactly_one_branch() {
    let registry = Rc::new(TracedRegistry::new());
    let mut rt = Runtime::new(registry);

    let mut blocks = TestBlocks::new();
    blocks.add(
        Block::new("if", "control_if_else")
            .with_shadow_input("CONDITION", "cond")
            .with_branch(1, "then")
            .with_branch(2, "else"),
    );
    shadow_text(&mut blocks, "cond", "false");
    blocks.add(
        Block::new("then", "data_setvariableto")
            .with_ref_field("VARIABLE", "varx", "x")
            .with_shadow_input("VALUE", "t"),
    );
    shadow_text(&mut blocks, "t", "then");
    blocks.add(
        Block::new("else", "data_setvariableto")
            .with_ref_field("VARIABLE", "varx", "x")
            .with_shadow_input("VALUE", "e"),
    );
    shadow_text(&mut blocks, "e", "else");

    let target = sprite();
    let cid = rt.register_container(Rc::new(blocks), target.clone());
    rt.push_thread(cid, "if");
    run_to_completion(&mut rt);

    let value = target.variable("varx").unwrap().get().clone();
    assert_eq!(value, Value::text("else"));
}

#[test]
fn empty_loop_branches_keep_the_thread_alive() {
    let registry = Rc::new(TracedRegistry::new());
    let mut rt = Runtime::new(registry);

    let mut blocks = TestBlocks::new();
    blocks.add(Block::new("loop", "control_forever"));
    let cid = rt.register_container(Rc::new(blocks), sprite());
    rt.push_thread(cid, "loop");

    for _ in 0..3 {
        let done = rt.step_threads();
        assert!(done.is_empty());
        assert_eq!(rt.thread_count(), 1);
    }
}

// PROCEDURES
// ------------------------------------------------------------------------------------------------

fn procedure_blocks(warp: bool) -> TestBlocks {
    let mut blocks = TestBlocks::new();
    blocks.add(
        Block::new("call", "procedures_call")
            .with_input(
                "arg0",
                blockvm_core::Input { block: Some(Rc::from("who")), shadow: Some(Rc::from("who")) },
            )
            .with_mutation(Mutation {
                proccode: Some(Rc::from("greet %s")),
                warp,
                ..Mutation::default()
            }),
    );
    shadow_text(&mut blocks, "who", "world");
    blocks.add(Block::new("def", "procedures_definition").with_next("setp"));
    blocks.add(
        Block::new("setp", "data_setvariableto")
            .with_ref_field("VARIABLE", "varg", "greeting")
            .with_block_input("VALUE", "rep"),
    );
    blocks.add(Block::new("rep", "argument_reporter_string_number").with_field("VALUE", "who"));
    blocks.add_procedure(
        "greet %s",
        "def",
        ProcedureParams {
            names: vec![Rc::from("who")],
            ids: vec![Rc::from("arg0")],
            defaults: vec![Value::text("")],
        },
    );
    blocks
}

#[test]
fn procedure_calls_bind_parameters_by_id() {
    let registry = Rc::new(TracedRegistry::new());
    let mut rt = Runtime::new(registry);
    let target = sprite();
    let cid = rt.register_container(Rc::new(procedure_blocks(false)), target.clone());
    rt.push_thread(cid, "call");
    run_to_completion(&mut rt);

    let value = target.variable("varg").unwrap().get().clone();
    assert_eq!(value, Value::text("world"));
}

fn recursive_blocks(warp: bool) -> TestBlocks {
    let mut blocks = TestBlocks::new();
    blocks.add(Block::new("start", "procedures_call").with_mutation(Mutation {
        proccode: Some(Rc::from("ping")),
        warp,
        ..Mutation::default()
    }));
    blocks.add(Block::new("def", "procedures_definition").with_next("again"));
    blocks.add(Block::new("again", "procedures_call").with_mutation(Mutation {
        proccode: Some(Rc::from("ping")),
        warp,
        ..Mutation::default()
    }));
    blocks.add_procedure("ping", "def", ProcedureParams::default());
    blocks
}

#[test]
fn recursion_yields_without_warp() {
    let registry = Rc::new(TracedRegistry::new());
    let mut rt = Runtime::new(registry);
    let cid = rt.register_container(Rc::new(recursive_blocks(false)), sprite());
    rt.push_thread(cid, "start");

    let (threads, services, caches) = rt.parts_mut();
    sequencer::step_thread(services, caches, &mut threads[0]);
    assert_eq!(threads[0].status, ThreadStatus::Yield);
    assert!(threads[0].stack_depth() >= 2);
}

#[test]
fn warp_recursion_runs_until_the_warp_budget_expires() {
    let registry = Rc::new(TracedRegistry::new());
    let options = RuntimeOptions::default().with_warp_time_ms(5.0).unwrap();
    let mut rt = Runtime::with_options(registry, options);
    let cid = rt.register_container(Rc::new(recursive_blocks(true)), sprite());
    rt.push_thread(cid, "start");

    let (threads, services, caches) = rt.parts_mut();
    sequencer::step_thread(services, caches, &mut threads[0]);
    // No per-call yields: the stack went deep before the warp budget ran out.
    assert_eq!(threads[0].status, ThreadStatus::Yield);
    assert!(threads[0].stack_depth() > 5);
}
