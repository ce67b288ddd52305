//! Frame-level cooperative scheduling.
//!
//! `step_threads` interleaves every runnable thread within one frame's work budget (75% of the
//! step interval by default), stopping early when a redraw is requested outside turbo mode.
//! `step_thread` drives one thread through the dispatcher, re-entering warp-mode loops until the
//! warp budget runs out.

use std::rc::Rc;
use std::time::{Duration, Instant};

use blockvm_core::Value;

use crate::cache::CacheStore;
use crate::dispatch::{self, ExecOutcome};
use crate::options::RuntimeOptions;
use crate::resume;
use crate::runtime::Services;
use crate::thread::{Thread, ThreadStatus};
use crate::utility;

// STEP THREADS
// ================================================================================================

#[tracing::instrument("step_threads", skip_all)]
pub(crate) fn step_threads(
    threads: &mut Vec<Box<Thread>>,
    services: &mut Services,
    caches: &mut CacheStore,
) -> Vec<Box<Thread>> {
    let work_time = Duration::from_secs_f64(services.options.work_time_ms() / 1e3);
    let start = Instant::now();
    let turbo = services.options.turbo_mode();
    let mut done: Vec<Box<Thread>> = Vec::new();
    let mut ran_first_tick = false;

    loop {
        settle_promises(threads, services);

        let mut active = 0usize;
        let mut i = 0usize;
        while i < threads.len() {
            if threads[i].killed {
                done.push(threads.remove(i));
                continue;
            }
            let thread = &mut threads[i];
            if thread.status == ThreadStatus::Done || thread.stack_is_empty() {
                i += 1;
                continue;
            }
            // Clear single-tick yields left over from the previous frame.
            if thread.status == ThreadStatus::YieldTick && !ran_first_tick {
                thread.set_status(ThreadStatus::Running, "new frame");
            }
            if matches!(thread.status, ThreadStatus::Running | ThreadStatus::Yield) {
                step_thread(services, caches, thread);
                thread.warp_started = None;
            }
            if matches!(threads[i].status, ThreadStatus::Running | ThreadStatus::Yield) {
                active += 1;
            }
            i += 1;
        }
        ran_first_tick = true;

        // Compact finished threads out of the list.
        let mut j = 0usize;
        while j < threads.len() {
            if threads[j].status == ThreadStatus::Done || threads[j].stack_is_empty() {
                done.push(threads.remove(j));
            } else {
                j += 1;
            }
        }

        if threads.is_empty() || active == 0 {
            break;
        }
        if start.elapsed() >= work_time {
            break;
        }
        if services.redraw_requested && !turbo {
            break;
        }
    }

    done
}

pub(crate) fn settle_promises(threads: &mut [Box<Thread>], services: &mut Services) {
    let now = utility::now_ms_since(services.epoch);
    services.timers.retain(|(deadline, handle)| {
        if now >= *deadline {
            handle.resolve(Value::Num(0.0));
            false
        } else {
            true
        }
    });
    for thread in threads.iter_mut() {
        if thread.status != ThreadStatus::PromiseWait {
            continue;
        }
        let Some(promise) = thread.pending_promise.clone() else { continue };
        match promise.settled() {
            Some(Ok(value)) => resume::fulfil(thread, value),
            Some(Err(reason)) => resume::reject(thread, reason),
            None => {},
        }
    }
}

// STEP THREAD
// ================================================================================================

pub(crate) fn step_thread(services: &mut Services, caches: &mut CacheStore, thread: &mut Thread) {
    if thread.in_warp_mode() && thread.warp_started.is_none() {
        thread.warp_started = Some(Instant::now());
    }
    if thread.status == ThreadStatus::Yield {
        thread.set_status(ThreadStatus::Running, "stepped after yield");
    }

    loop {
        match dispatch::execute(services, caches, thread) {
            ExecOutcome::Suspended
            | ExecOutcome::YieldedTick
            | ExecOutcome::Interrupted
            | ExecOutcome::Retired => return,
            ExecOutcome::Yielded => {
                if thread.in_warp_mode()
                    && thread.warp_elapsed_ms() <= services.options.warp_time_ms()
                {
                    thread.set_status(ThreadStatus::Running, "warp continues through yield");
                    continue;
                }
                return;
            },
            ExecOutcome::LoopPoint => {
                if thread.in_warp_mode() {
                    if thread.warp_started.is_none() {
                        thread.warp_started = Some(Instant::now());
                    }
                    if thread.warp_elapsed_ms() <= services.options.warp_time_ms() {
                        continue;
                    }
                }
                return;
            },
        }
    }
}

// CONTROL-FLOW PRIMITIVES
// ================================================================================================

/// Pushes a procedure definition onto the stack, promoting the frame to warp mode when the call
/// or the definition asks for it. Recursion yields unless warp still has budget.
pub(crate) fn step_to_procedure(
    options: &RuntimeOptions,
    thread: &mut Thread,
    proccode: &str,
    call_warp: bool,
) {
    let Some(definition) = thread.blocks.get_procedure_definition(proccode) else { return };
    let definition_warp = thread
        .blocks
        .get_block(&definition)
        .and_then(|block| block.mutation)
        .map(|mutation| mutation.warp)
        .unwrap_or(false);

    // Recursion looks below the call block itself, so it is detected before the push.
    let recursive = thread.is_recursive_call(proccode);
    thread.push_stack(definition);
    let warp = {
        let frame = thread.peek_frame_mut().expect("just pushed a frame");
        frame.proccode = Some(Rc::from(proccode));
        if !frame.warp_mode && (call_warp || definition_warp) {
            frame.warp_mode = true;
        }
        frame.warp_mode
    };

    if warp {
        if thread.warp_started.is_none() {
            thread.warp_started = Some(Instant::now());
        }
        if thread.warp_elapsed_ms() > options.warp_time_ms() {
            thread.set_status(ThreadStatus::Yield, "warp budget exhausted at call");
        }
    } else if recursive {
        thread.set_status(ThreadStatus::Yield, "recursive call");
    }
}
