//! Hotness-driven compilation and compile/interpret equivalence.

use std::rc::Rc;

use blockvm_core::{Block, PrimitiveResult};

use super::fixtures::*;
use crate::{Runtime, RuntimeOptions};

#[test]
fn hot_loop_bodies_get_compiled_and_stay_correct() {
    let registry = Rc::new(TracedRegistry::new());
    let mut rt = Runtime::new(registry);
    let target = sprite();
    let cid = rt.register_container(Rc::new(counting_loop_blocks("30")), target.clone());
    rt.push_thread(cid, "set");
    run_to_completion(&mut rt);

    assert_eq!(variable_number(&target, "varx"), 30.0);

    // The loop body went hot and was replaced by a compiled program; its interpretive plan is
    // preserved for fallback.
    let seq = rt.caches().sequence(cid, "chg").expect("loop body sequence cached");
    let seq = seq.borrow();
    assert!(seq.compiled);
    assert!(!seq.plan.is_empty());

    let id: blockvm_core::BlockId = Rc::from("chg");
    let script = rt.caches().compiled_for(cid, &id).expect("compiled program stored");
    // The variable access was hoisted into a reusable data reference.
    assert_eq!(script.code.var_refs.len(), 1);
    assert_eq!(&*script.code.var_refs[0].id, "varx");
    assert!(script.source.contains("function factory_"));
}

#[test]
fn compiled_and_interpreted_runs_are_observationally_identical() {
    let run = |compiler_enabled: bool| -> (f64, Vec<String>) {
        let registry = Rc::new(TracedRegistry::with_extra(|p| {
            p.insert("test_tick", |_, _| PrimitiveResult::Nothing);
        }));
        let trace = registry.trace.clone();
        let options = RuntimeOptions::default().with_compiler_enabled(compiler_enabled);
        let mut rt = Runtime::with_options(registry, options);

        let mut blocks = counting_loop_blocks("10");
        // Extend the loop body with an opaque primitive the compiler cannot inline.
        blocks.add(
            Block::new("chg", "data_changevariableby")
                .with_ref_field("VARIABLE", "varx", "x")
                .with_shadow_input("VALUE", "one")
                .with_next("tick"),
        );
        blocks.add(Block::new("tick", "test_tick"));
        let target = sprite();
        let cid = rt.register_container(Rc::new(blocks), target.clone());
        rt.push_thread(cid, "set");
        run_to_completion(&mut rt);

        let ticks = trace
            .borrow()
            .iter()
            .filter(|line| line.starts_with("test_tick"))
            .cloned()
            .collect();
        (variable_number(&target, "varx"), ticks)
    };

    let (interpreted_x, interpreted_ticks) = run(false);
    let (compiled_x, compiled_ticks) = run(true);

    assert_eq!(interpreted_x, 10.0);
    assert_eq!(compiled_x, interpreted_x);
    assert_eq!(compiled_ticks, interpreted_ticks);
    assert_eq!(compiled_ticks.len(), 10);
}

#[test]
fn disabled_compiler_keeps_interpreting() {
    let registry = Rc::new(TracedRegistry::new());
    let options = RuntimeOptions::default().with_compiler_enabled(false);
    let mut rt = Runtime::with_options(registry, options);
    let target = sprite();
    let cid = rt.register_container(Rc::new(counting_loop_blocks("30")), target.clone());
    rt.push_thread(cid, "set");
    run_to_completion(&mut rt);

    assert_eq!(variable_number(&target, "varx"), 30.0);
    let seq = rt.caches().sequence(cid, "chg").expect("loop body sequence cached");
    assert!(!seq.borrow().compiled);
}
