//! Promise suspension, resumption, rejection, and edits during a wait.

use std::cell::RefCell;
use std::rc::Rc;
use std::thread::sleep;
use std::time::Duration;

use blockvm_core::{Block, Promise, PromiseHandle, PrimitiveResult, Value, testing::TestBlocks};

use super::fixtures::*;
use crate::{Runtime, ThreadStatus};

fn wait_then_set_blocks() -> TestBlocks {
    let mut blocks = TestBlocks::new();
    blocks.add(
        Block::new("wait", "control_wait").with_shadow_input("DURATION", "dur").with_next("set"),
    );
    shadow_num(&mut blocks, "dur", "0.01");
    blocks.add(
        Block::new("set", "data_setvariableto")
            .with_ref_field("VARIABLE", "varx", "x")
            .with_shadow_input("VALUE", "donev"),
    );
    shadow_text(&mut blocks, "donev", "done");
    blocks
}

#[test]
fn wait_suspends_then_resumes_at_the_next_op() {
    let registry = Rc::new(TracedRegistry::new());
    let trace = registry.trace.clone();
    let mut rt = Runtime::new(registry);
    let target = sprite();
    let cid = rt.register_container(Rc::new(wait_then_set_blocks()), target.clone());
    let thread = rt.push_thread(cid, "wait");

    rt.step_threads();
    assert_eq!(rt.thread(thread).status, ThreadStatus::PromiseWait);
    assert!(rt.thread(thread).reported.is_some());
    assert!(target.variable("varx").is_none());

    sleep(Duration::from_millis(20));
    for _ in 0..10 {
        rt.step_threads();
        if rt.thread_count() == 0 {
            break;
        }
    }
    assert_eq!(rt.thread_count(), 0);
    assert_eq!(target.variable("varx").unwrap().get().clone(), Value::text("done"));

    // Each primitive ran exactly once: suspension resumed past the wait op instead of
    // re-executing it.
    let trace = trace.borrow();
    assert_eq!(trace.iter().filter(|line| line.starts_with("control_wait")).count(), 1);
    assert_eq!(
        trace.iter().filter(|line| line.starts_with("data_setvariableto")).count(),
        1
    );
}

#[test]
fn just_reported_is_consumed_exactly_once() {
    let registry = Rc::new(TracedRegistry::new());
    let mut rt = Runtime::new(registry);
    let cid = rt.register_container(Rc::new(wait_then_set_blocks()), sprite());
    let thread = rt.push_thread(cid, "wait");

    rt.step_threads();
    assert_eq!(rt.thread(thread).status, ThreadStatus::PromiseWait);
    sleep(Duration::from_millis(20));
    let done = rt.step_threads();
    let finished = done.into_iter().next().expect("thread finished after resumption");
    assert!(finished.just_reported.is_none());
    assert!(finished.reporting.is_none());
    assert!(finished.reported.is_none());
}

#[test]
fn rejection_logs_pops_and_keeps_running() {
    let handle: Rc<RefCell<Option<PromiseHandle>>> = Rc::new(RefCell::new(None));
    let handle_for_prim = handle.clone();
    let registry = Rc::new(TracedRegistry::with_extra(move |p| {
        let handle = handle_for_prim.clone();
        p.insert("test_fail", move |_, _| {
            let (promise, h) = Promise::pending();
            *handle.borrow_mut() = Some(h);
            PrimitiveResult::Promise(promise)
        });
    }));
    let mut rt = Runtime::new(registry);

    let mut blocks = TestBlocks::new();
    blocks.add(Block::new("fail", "test_fail").with_next("set"));
    blocks.add(
        Block::new("set", "data_setvariableto")
            .with_ref_field("VARIABLE", "varx", "x")
            .with_shadow_input("VALUE", "v"),
    );
    shadow_text(&mut blocks, "v", "ran");
    let target = sprite();
    let cid = rt.register_container(Rc::new(blocks), target.clone());
    let thread = rt.push_thread(cid, "fail");

    rt.step_threads();
    assert_eq!(rt.thread(thread).status, ThreadStatus::PromiseWait);

    handle.borrow().as_ref().unwrap().reject("boom");
    let done = rt.step_threads();
    // The frame was popped; the emptied stack finished the thread without running the rest of
    // the chain.
    assert_eq!(done.len(), 1);
    assert!(target.variable("varx").is_none());
}

#[test]
fn edits_during_promise_wait_invalidate_and_recover() {
    let registry = Rc::new(TracedRegistry::new());
    let mut rt = Runtime::new(registry);
    let target = sprite();
    let cid = rt.register_container(Rc::new(wait_then_set_blocks()), target.clone());
    let thread = rt.push_thread(cid, "wait");

    rt.step_threads();
    assert_eq!(rt.thread(thread).status, ThreadStatus::PromiseWait);

    // The host edits the container mid-wait: every cached plan drops.
    rt.invalidate_container(cid);

    sleep(Duration::from_millis(20));
    for _ in 0..10 {
        rt.step_threads();
        if rt.thread_count() == 0 {
            break;
        }
    }
    assert_eq!(rt.thread_count(), 0);
    assert_eq!(target.variable("varx").unwrap().get().clone(), Value::text("done"));
}
