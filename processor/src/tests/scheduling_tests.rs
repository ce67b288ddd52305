//! Sequencer behavior: work budget, single-tick yields, kills.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

use blockvm_core::{Block, BlockUtility, PrimitiveResult, testing::TestBlocks};

use super::fixtures::*;
use crate::{Runtime, RuntimeOptions, ThreadStatus};

fn forever_blocks() -> TestBlocks {
    let mut blocks = TestBlocks::new();
    blocks.add(Block::new("loop", "control_forever").with_branch(1, "chg"));
    blocks.add(
        Block::new("chg", "data_changevariableby")
            .with_ref_field("VARIABLE", "varx", "x")
            .with_shadow_input("VALUE", "one"),
    );
    shadow_num(&mut blocks, "one", "1");
    blocks
}

#[test]
fn step_threads_returns_within_the_work_budget() {
    let registry = Rc::new(TracedRegistry::new());
    // Turbo mode ignores the redraw requests the loop raises, so only the work budget stops the
    // frame.
    let options = RuntimeOptions::default().with_turbo_mode(true);
    let mut rt = Runtime::with_options(registry, options);
    let target = sprite();
    let cid = rt.register_container(Rc::new(forever_blocks()), target.clone());
    rt.push_thread(cid, "loop");

    let start = Instant::now();
    let done = rt.step_threads();
    let elapsed = start.elapsed().as_secs_f64() * 1e3;

    assert!(done.is_empty());
    assert_eq!(rt.thread_count(), 1);
    // WORK_TIME is 25 ms at the default 30 fps interval; allow one extra thread step of slack.
    assert!(elapsed < 200.0, "frame took {elapsed} ms");
    assert!(variable_number(&target, "varx") > 1.0);
}

#[test]
fn redraw_requests_end_the_frame_outside_turbo_mode() {
    let registry = Rc::new(TracedRegistry::new());
    let mut rt = Runtime::with_options(registry, RuntimeOptions::default());
    let target = sprite();
    let cid = rt.register_container(Rc::new(forever_blocks()), target.clone());
    rt.push_thread(cid, "loop");

    rt.step_threads();
    // One loop iteration per frame: the non-warp loop requested a redraw.
    assert_eq!(variable_number(&target, "varx"), 1.0);
    assert!(rt.redraw_requested());
    rt.step_threads();
    assert_eq!(variable_number(&target, "varx"), 2.0);
}

#[test]
fn yield_tick_parks_a_thread_until_the_next_frame() {
    let calls = Rc::new(Cell::new(0u32));
    let calls_for_prim = calls.clone();
    let registry = Rc::new(TracedRegistry::with_extra(move |p| {
        let calls = calls_for_prim.clone();
        p.insert("test_tick_yield", move |_, util| {
            calls.set(calls.get() + 1);
            if calls.get() < 2 {
                util.yield_tick();
            }
            PrimitiveResult::Nothing
        });
    }));
    let mut rt = Runtime::new(registry);

    let mut blocks = TestBlocks::new();
    blocks.add(Block::new("t", "test_tick_yield"));
    let cid = rt.register_container(Rc::new(blocks), sprite());
    let thread = rt.push_thread(cid, "t");

    let done = rt.step_threads();
    assert!(done.is_empty());
    assert_eq!(rt.thread(thread).status, ThreadStatus::YieldTick);
    assert_eq!(calls.get(), 1);

    let done = rt.step_threads();
    assert_eq!(done.len(), 1);
    assert_eq!(calls.get(), 2);
}

#[test]
fn killed_threads_are_dropped_the_same_frame() {
    let registry = Rc::new(TracedRegistry::new());
    let mut rt = Runtime::new(registry);
    let cid = rt.register_container(Rc::new(forever_blocks()), sprite());
    let a = rt.push_thread(cid, "loop");
    let _b = rt.push_thread(cid, "loop");

    rt.thread_mut(a).killed = true;
    let done = rt.step_threads();
    assert_eq!(done.len(), 1);
    assert!(done[0].killed);
    assert_eq!(rt.thread_count(), 1);
}
