//! Promise suspension and re-entry.
//!
//! Suspending records which sub-ops of the current command already ran and the values sitting in
//! their parent slots. Fulfilment pushes the synthetic `vm_reenter_promise` marker; the
//! dispatcher pops it and calls [`reenter`], which rehydrates surviving ops by id (the tree may
//! have shrunk under an edit) and parks the resume index just past the promise op. Rejection is
//! logged, the frame popped, and the thread keeps running.

use std::rc::Rc;

use blockvm_core::{CachedSequence, OpIdx, OpKind, Value, opcodes};

use crate::thread::{Thread, ThreadStatus};

// SUSPEND
// ================================================================================================

pub(crate) fn suspend(seq: &mut CachedSequence, thread: &mut Thread, promise_op: OpIdx) {
    let op = seq.op(promise_op);
    thread.reporting = Some(op.id.clone());
    if op.parent.is_some() {
        // The suspended op is a reporter: its frame waits for the value.
        if let Some(frame) = thread.peek_frame_mut() {
            frame.waiting_reporter = true;
        }
    }

    let span_start = seq
        .commands
        .iter()
        .find(|span| span.op == op.command)
        .map(|span| span.plan_start as usize)
        .unwrap_or(0);
    let pos = op.plan_pos as usize;

    let mut reported: Vec<(Rc<str>, Value)> = Vec::new();
    for plan_pos in span_start..pos {
        let idx = seq.plan[plan_pos];
        let sub = seq.op(idx);
        if matches!(sub.kind, OpKind::Shadow | OpKind::Undefined) {
            continue;
        }
        if let Some(value) = seq.read_parent_slot(idx) {
            reported.push((sub.id.clone(), value));
        }
    }
    thread.reported = Some(reported);
}

// SETTLEMENT
// ================================================================================================

pub(crate) fn fulfil(thread: &mut Thread, value: Value) {
    thread.pending_promise = None;
    thread.push_reported_value(value);
    thread.set_status(ThreadStatus::Running, "promise fulfilled");
    thread.push_stack(Rc::from(opcodes::VM_REENTER_PROMISE));
}

pub(crate) fn reject(thread: &mut Thread, reason: Rc<str>) {
    tracing::warn!(%reason, "promise rejected");
    thread.pending_promise = None;
    thread.reporting = None;
    thread.reported = None;
    thread.just_reported = None;
    thread.pop_stack();
    thread.set_status(ThreadStatus::Running, "promise rejected");
}

// RE-ENTRY
// ================================================================================================

/// Rehydrates reported values into the sequence and parks the resume index. Ops that vanished
/// under an edit are tolerated: rehydration matches by id and falls back to the latest survivor.
pub(crate) fn reenter(seq: &mut CachedSequence, thread: &mut Thread) {
    let reported = thread.reported.take().unwrap_or_default();
    let reporting = thread.reporting.take();
    if let Some(frame) = thread.peek_frame_mut() {
        frame.waiting_reporter = false;
    }

    let promise_site = reporting
        .as_deref()
        .and_then(|id| seq.latest_op_with_id(id, seq.plan.len()));

    match promise_site {
        Some((pos, idx)) => {
            for (id, value) in &reported {
                if let Some((_, sub)) = seq.latest_op_with_id(id, pos) {
                    seq.write_parent(sub, value.clone());
                }
            }
            // The reported value is consumed exactly once.
            if let Some(value) = thread.just_reported.take() {
                seq.write_parent(idx, value);
            }
            seq.resume_index = pos as u32 + 1;
        },
        None => {
            // The promise op is gone: restart after the latest surviving reported op, or from
            // the top of the command when nothing survived.
            let mut latest: Option<usize> = None;
            for (id, value) in &reported {
                if let Some((pos, sub)) = seq.latest_op_with_id(id, seq.plan.len()) {
                    seq.write_parent(sub, value.clone());
                    latest = Some(latest.map_or(pos, |best: usize| best.max(pos)));
                }
            }
            thread.just_reported = None;
            seq.resume_index = latest.map(|pos| pos as u32 + 1).unwrap_or(0);
        },
    }
}
