//! Factory-AST construction from a cached plan.
//!
//! Each plan op becomes one chunk: a store of the op's report into its parent bundle wrapping a
//! `callBlock`, an optional promise hand-off, then a status check. Synthetic ops become
//! `callFunction` nodes named after their opcode so later passes can rewrite them; shadow holders
//! and undefined ops contribute nothing, exactly as the dispatcher skips them.

use blockvm_core::{CachedSequence, OpKind};
use fnv::FnvHashSet;

use crate::ast::{AstArena, NodeId};

// PLAN INFO
// ================================================================================================

/// Facts about the plan the later passes need: which bundle slots are written at run time (as
/// opposed to folded constants), keyed by `(op index, slot index)`.
#[derive(Debug, Default)]
pub(crate) struct PlanInfo {
    pub dynamic_slots: FnvHashSet<(u32, u32)>,
}

impl PlanInfo {
    pub(crate) fn is_dynamic(&self, op: u32, slot: u32) -> bool {
        self.dynamic_slots.contains(&(op, slot))
    }
}

// BUILD
// ================================================================================================

pub(crate) struct BuildOutput {
    pub arena: AstArena,
    pub factory: NodeId,
    pub info: PlanInfo,
}

pub(crate) fn build(seq: &CachedSequence, name: &str) -> BuildOutput {
    let mut arena = AstArena::new();
    let mut info = PlanInfo::default();

    for idx in &seq.plan {
        let op = seq.op(*idx);
        if let Some(parent) = op.parent {
            info.dynamic_slots.insert((parent.0, op.parent_slot));
        }
    }

    let mut chunks: Vec<NodeId> = Vec::with_capacity(seq.plan.len());
    let mut bindings: Vec<NodeId> = Vec::new();
    let thread_id = arena.id("thread");
    let context_id = arena.id("cNull");
    bindings.push(thread_id);
    bindings.push(context_id);

    for idx in &seq.plan {
        let op = seq.op(*idx);
        let op_index = idx.0;
        let mut statements: Vec<NodeId> = Vec::with_capacity(3);

        match &op.kind {
            OpKind::Shadow | OpKind::Undefined => continue,
            OpKind::Primitive => {
                let context = arena.id("cNull");
                let func = arena.id(format!("f{op_index}"));
                let args = arena.id(format!("a{op_index}"));
                let func_binding = arena.id(format!("f{op_index}"));
                let args_binding = arena.id(format!("a{op_index}"));
                bindings.push(func_binding);
                bindings.push(args_binding);
                let call = arena.call_block(op_index, context, func, args);
                let store = match op.parent {
                    Some(parent) => {
                        let name = arena.id(format!("a{}", parent.0));
                        let key = {
                            let key_name = seq
                                .op(parent)
                                .args
                                .key_at(op.parent_slot as usize)
                                .to_string();
                            arena.string(key_name)
                        };
                        arena.store_arg(name, key, call)
                    },
                    None => arena.expression_statement(call),
                };
                statements.push(store);
                if op.uses_promise {
                    let handle = arena.id("vm_handlePromise");
                    let args = arena.id(format!("a{op_index}"));
                    let call = arena.call_args(handle, args);
                    let stmt = arena.expression_statement(call);
                    statements.push(stmt);
                }
                let check = arena.check_status();
                statements.push(check);
            },
            kind => {
                let name = match kind {
                    OpKind::Null => "vm_retire",
                    OpKind::CastString => "vm_castString",
                    OpKind::ReportHat { .. } => "vm_reportHat",
                    OpKind::ReportStackClick => "vm_reportStackClick",
                    OpKind::ReportMonitor => "vm_reportMonitor",
                    OpKind::DoStack { .. } => "vm_doStack",
                    OpKind::MayContinue => "vm_mayContinue",
                    _ => unreachable!(),
                };
                let func = arena.id(name);
                let args = arena.array(&[]);
                let call = arena.call_function(op_index, func, args);
                let stmt = arena.expression_statement(call);
                statements.push(stmt);
                let check = arena.check_status();
                statements.push(check);
            },
        }

        let chunk = arena.chunk(&statements);
        chunks.push(chunk);
    }

    let chunks_node = arena.chunk(&chunks);
    let debug_name = arena.id(name);
    let bindings_node = arena.array(&bindings);
    let dereferences = arena.array(&[]);
    let factory = arena.factory(debug_name, bindings_node, dereferences, chunks_node);

    BuildOutput { arena, factory, info }
}
