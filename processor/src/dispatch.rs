//! The dispatcher: the interpretive inner loop and the boundary resolution shared with the
//! compiled executor.
//!
//! `execute` loads (or builds) the cached sequence for the thread's top-of-stack, walks the plan
//! calling each op, and resolves sequence boundaries: retiring emptied threads, re-entering loop
//! commands, and parking a parent's resume index after a returned branch or procedure call. In
//! continuous mode it trampolines across those boundaries without returning to the sequencer.
//! Hot sequences are handed to the compiler under the token-bucket budget.

use std::rc::Rc;
use std::time::Instant;

use blockvm_core::{
    BlockId, CachedSequence, OpIdx, OpKind, PrimitiveResult, Value, cast, opcodes,
};

use crate::cache::{CacheStore, ContainerId};
use crate::compiled;
use crate::resume;
use crate::runtime::{Report, ReportKind, Services};
use crate::thread::{Thread, ThreadStatus};
use crate::utility::Utility;

// OUTCOME
// ================================================================================================

/// Why `execute` handed control back to the sequencer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum ExecOutcome {
    Yielded,
    YieldedTick,
    Suspended,
    /// Stopped at a boundary with `continuous == false`; the thread is still runnable.
    Interrupted,
    Retired,
    /// A loop command is back on top and must re-enter; warp budget decides who continues.
    LoopPoint,
}

/// What one engine pass over a plan observed.
pub(crate) struct PlanExit {
    pub completed_pass: bool,
    pub sequence_end: bool,
    pub suspend_op: Option<OpIdx>,
    pub wants_compile: bool,
}

// EXECUTE
// ================================================================================================

pub(crate) fn execute(
    services: &mut Services,
    caches: &mut CacheStore,
    thread: &mut Thread,
) -> ExecOutcome {
    loop {
        let reenter =
            matches!(thread.peek_stack(), Some(top) if &**top == opcodes::VM_REENTER_PROMISE);
        if reenter {
            thread.pop_stack();
        }
        let Some(top) = thread.peek_stack().cloned() else {
            thread.retire();
            return ExecOutcome::Retired;
        };

        let blocks = thread.blocks.clone();
        let registry = services.registry.clone();
        let Some(seq_rc) = caches.get_or_build(
            thread.container_id,
            &top,
            blocks.as_ref(),
            registry.as_ref(),
            &mut services.interner,
        ) else {
            thread.retire();
            return ExecOutcome::Retired;
        };

        let exit = {
            let mut seq = seq_rc.borrow_mut();
            if reenter {
                resume::reenter(&mut seq, thread);
            }
            let resume_at = seq.resume_index as usize;
            seq.resume_index = 0;

            if seq.compiled && resume_at == 0 {
                match caches.compiled_for(thread.container_id, &top) {
                    Some(script) => compiled::run(&script, &mut seq, thread, services),
                    None => run_plan(&mut seq, thread, services, resume_at),
                }
            } else {
                run_plan(&mut seq, thread, services, resume_at)
            }
        };

        if exit.wants_compile && exit.completed_pass && services.options.compiler_enabled() {
            maybe_compile(services, caches, thread.container_id, &top, &seq_rc);
        }

        match thread.status {
            ThreadStatus::PromiseWait => {
                if thread.reported.is_none() {
                    if let Some(op) = exit.suspend_op {
                        resume::suspend(&mut seq_rc.borrow_mut(), thread, op);
                    }
                }
                return ExecOutcome::Suspended;
            },
            ThreadStatus::Yield => return ExecOutcome::Yielded,
            ThreadStatus::YieldTick => return ExecOutcome::YieldedTick,
            ThreadStatus::Done => return ExecOutcome::Retired,
            ThreadStatus::Interrupt | ThreadStatus::Running => {
                thread.set_status(ThreadStatus::Running, "boundary cleared");
                if thread.pending_loop_reentry {
                    thread.pending_loop_reentry = false;
                    return ExecOutcome::LoopPoint;
                }
                if thread.pending_resume_after_top {
                    thread.pending_resume_after_top = false;
                    if !park_resume_after_top(services, caches, thread) {
                        thread.retire();
                        return ExecOutcome::Retired;
                    }
                    if !thread.continuous {
                        return ExecOutcome::Interrupted;
                    }
                    continue;
                }
                if exit.sequence_end {
                    match resolve_sequence_end(services, caches, thread) {
                        BoundaryOutcome::Retired => return ExecOutcome::Retired,
                        BoundaryOutcome::LoopPoint => return ExecOutcome::LoopPoint,
                        BoundaryOutcome::Continue => {},
                    }
                }
                if !thread.continuous {
                    return ExecOutcome::Interrupted;
                }
            },
        }
    }
}

enum BoundaryOutcome {
    Retired,
    LoopPoint,
    Continue,
}

/// The `vm_end_of_*` family: what happens when a straight-line sequence runs out.
fn resolve_sequence_end(
    services: &mut Services,
    caches: &mut CacheStore,
    thread: &mut Thread,
) -> BoundaryOutcome {
    thread.pop_stack();
    if thread.peek_stack().is_none() {
        // vm_end_of_thread
        thread.retire();
        return BoundaryOutcome::Retired;
    }

    if thread.peek_frame().map(|frame| frame.is_loop).unwrap_or(false) {
        // vm_end_of_loop_branch: the loop command re-enters from its own plan start.
        return BoundaryOutcome::LoopPoint;
    }

    // vm_end_of_branch / vm_end_of_procedure: resume the parent just past the command's tail so
    // the chain advances instead of re-running the command.
    if !park_resume_after_top(services, caches, thread) {
        thread.retire();
        return BoundaryOutcome::Retired;
    }
    BoundaryOutcome::Continue
}

/// Parks the resume index of the sequence entered at the current top-of-stack just before its
/// first command's `vm_may_continue`, so the next dispatch advances past that command.
fn park_resume_after_top(
    services: &mut Services,
    caches: &mut CacheStore,
    thread: &mut Thread,
) -> bool {
    let Some(top) = thread.peek_stack().cloned() else { return false };
    let blocks = thread.blocks.clone();
    let registry = services.registry.clone();
    let Some(seq_rc) = caches.get_or_build(
        thread.container_id,
        &top,
        blocks.as_ref(),
        registry.as_ref(),
        &mut services.interner,
    ) else {
        return false;
    };
    let mut seq = seq_rc.borrow_mut();
    if let Some(span) = seq.commands.first() {
        seq.resume_index = span.plan_end.saturating_sub(1);
    }
    true
}

// INTERPRETIVE INNER LOOP
// ================================================================================================

pub(crate) fn run_plan(
    seq: &mut CachedSequence,
    thread: &mut Thread,
    services: &mut Services,
    start: usize,
) -> PlanExit {
    let plan_len = seq.plan.len();
    let mut pos = start.min(plan_len);
    let mut suspend_op = None;
    let mut sequence_end = false;

    while thread.status == ThreadStatus::Running && pos < plan_len {
        let idx = seq.plan[pos];
        match seq.op(idx).kind.clone() {
            OpKind::Shadow | OpKind::Undefined => {},
            OpKind::Null => thread.retire(),
            OpKind::Primitive => {
                if let Some(op) = call_primitive(seq, thread, services, idx) {
                    suspend_op = Some(op);
                }
            },
            OpKind::CastString => cast_string_op(seq, idx),
            OpKind::ReportHat { edge_activated } => {
                report_hat_op(seq, thread, services, idx, edge_activated)
            },
            OpKind::ReportStackClick => report_click_op(seq, thread, services, idx),
            OpKind::ReportMonitor => report_monitor_op(seq, thread, services, idx),
            OpKind::DoStack { branch_num } => do_stack_op(seq, thread, idx, branch_num),
            OpKind::MayContinue => {
                if may_continue_op(seq, thread, idx) {
                    sequence_end = true;
                }
            },
        }
        pos += 1;
    }

    if thread.status == ThreadStatus::Running && pos >= plan_len {
        sequence_end = true;
    }
    let completed_pass = pos >= plan_len;
    if completed_pass && !seq.compiled {
        seq.count = seq.count.saturating_add(1);
    }
    let wants_compile = !seq.compiled && seq.count as usize >= plan_len.max(1);
    PlanExit { completed_pass, sequence_end, suspend_op, wants_compile }
}

// SHARED OP IMPLEMENTATIONS
// ================================================================================================
// Both engines go through these, so a compiled run observes exactly the interpreter's semantics.

/// Calls the op's primitive; returns the op when it suspended on a promise.
pub(crate) fn call_primitive(
    seq: &mut CachedSequence,
    thread: &mut Thread,
    services: &mut Services,
    idx: OpIdx,
) -> Option<OpIdx> {
    let func = seq.op(idx).func.clone()?;
    let result = {
        let mut util = Utility { thread: &mut *thread, services: &mut *services };
        func.call(&seq.op(idx).args, &mut util)
    };
    match result {
        PrimitiveResult::Value(value) => {
            note_reported_value(seq, thread, idx, &value);
            seq.write_parent(idx, value);
            None
        },
        PrimitiveResult::Promise(promise) => {
            thread.pending_promise = Some(promise);
            thread.set_status(ThreadStatus::PromiseWait, "primitive returned a thenable");
            seq.op_mut(idx).uses_promise = true;
            Some(idx)
        },
        PrimitiveResult::Nothing => None,
    }
}

/// Mirrors a value reported toward a report tail op into the thread-side slot the tails read.
pub(crate) fn note_reported_value(
    seq: &CachedSequence,
    thread: &mut Thread,
    idx: OpIdx,
    value: &Value,
) {
    if let Some(parent) = seq.op(idx).parent {
        if matches!(
            seq.op(parent).kind,
            OpKind::ReportStackClick | OpKind::ReportMonitor
        ) {
            thread.report_value = Some(value.clone());
        }
    }
}

pub(crate) fn cast_string_op(seq: &mut CachedSequence, idx: OpIdx) {
    let text = seq.op(idx).args.text("VALUE");
    seq.write_parent(idx, Value::named("", text));
}

pub(crate) fn report_hat_op(
    seq: &CachedSequence,
    thread: &mut Thread,
    services: &mut Services,
    idx: OpIdx,
    edge_activated: bool,
) {
    if !edge_activated {
        return;
    }
    let value = seq.op(idx).args.get("VALUE").cloned().unwrap_or_default();
    let key = (thread.container_id, seq.op(idx).id.clone());
    let new = cast::to_boolean(&value);
    let old = services.edge_state.insert(key, new).unwrap_or(false);
    if !(new && !old) {
        // Only a false→true transition keeps the thread alive.
        thread.retire();
    }
}

pub(crate) fn report_click_op(
    seq: &CachedSequence,
    thread: &mut Thread,
    services: &mut Services,
    idx: OpIdx,
) {
    if !thread.stack_click || thread.stack_depth() != 1 {
        return;
    }
    if let Some(value) = thread.report_value.clone() {
        services.reports.push(Report {
            container: thread.container_id,
            block: seq.op(idx).id.clone(),
            value,
            kind: ReportKind::StackClick,
        });
    }
}

pub(crate) fn report_monitor_op(
    seq: &CachedSequence,
    thread: &mut Thread,
    services: &mut Services,
    idx: OpIdx,
) {
    if !thread.update_monitor || thread.stack_depth() != 1 {
        return;
    }
    if let Some(value) = thread.report_value.clone() {
        services.reports.push(Report {
            container: thread.container_id,
            block: seq.op(idx).id.clone(),
            value,
            kind: ReportKind::Monitor,
        });
    }
}

pub(crate) fn do_stack_op(
    seq: &CachedSequence,
    thread: &mut Thread,
    idx: OpIdx,
    branch_num: u8,
) {
    let Some(request) = thread.pending_branch else { return };
    if request.branch_num != branch_num {
        return;
    }
    thread.pending_branch = None;
    match seq.op(idx).branch_blocks[(branch_num - 1) as usize].clone() {
        Some(first) => {
            if let Some(frame) = thread.peek_frame_mut() {
                frame.is_loop = request.is_loop;
            }
            thread.push_stack(first);
        },
        None => {
            if request.is_loop {
                // An empty loop branch re-enters the loop command without pushing anything.
                thread.pending_loop_reentry = true;
                thread.set_status(ThreadStatus::Interrupt, "empty loop branch");
            }
        },
    }
}

/// Returns true when the sequence boundary was reached.
pub(crate) fn may_continue_op(seq: &CachedSequence, thread: &mut Thread, idx: OpIdx) -> bool {
    let op = seq.op(idx);
    if thread.peek_stack() != op.expect_stack.as_ref() {
        thread.set_status(ThreadStatus::Interrupt, "control moved");
        return false;
    }
    if !thread.blocks.force_no_glow() {
        thread.last_block = op.expect_stack.clone();
    }
    match op.next_stack.clone() {
        Some(next) => {
            thread.reuse_stack_for_next_block(next);
            false
        },
        None => {
            thread.set_status(ThreadStatus::Interrupt, "sequence boundary");
            true
        },
    }
}

// COMPILATION TRIGGER
// ================================================================================================

fn maybe_compile(
    services: &mut Services,
    caches: &mut CacheStore,
    container: ContainerId,
    top: &BlockId,
    seq_rc: &Rc<std::cell::RefCell<CachedSequence>>,
) {
    services.budget.refill(Instant::now());
    if !services.budget.available() {
        return;
    }
    let started = Instant::now();
    let compiled = {
        let seq = seq_rc.borrow();
        blockvm_compiler::compile(&seq, &**top)
    };
    services.budget.charge_ms(started.elapsed().as_secs_f64() * 1e3);
    match compiled {
        Ok(script) => {
            tracing::debug!(sequence = %top, insts = script.code.insts.len(), "sequence compiled");
            caches.set_compiled(container, top, Rc::new(script));
            seq_rc.borrow_mut().compiled = true;
        },
        Err(err) => {
            tracing::debug!(sequence = %top, %err, "compile failed; interpretation continues");
            seq_rc.borrow_mut().count = 0;
        },
    }
}
