//! Chunk-level cleanups: status-check elision and single-use store propagation.
//!
//! Elision drops the trailing `checkStatus` of chunks whose statements cannot suspend or touch
//! thread state. Propagation fuses `storeArg` chains: a pure store whose slot is read exactly
//! once by a following inlined expression is substituted into the read site and its chunk
//! deleted, which is what turns inlined arithmetic into one nested expression. Both refuse to
//! cross anything that can suspend, because promise re-entry rehydrates from the bundles the
//! store would have written.

use std::rc::Rc;

use fnv::FnvHashMap;

use crate::ast::{AstArena, NodeId, NodeKind};
use crate::transform::{PathContext, Visitor};

// STATUS EFFECT ANALYSIS
// ================================================================================================

/// True when executing the subtree can change thread status or suspend: generic block calls,
/// every `vm_*` helper, and promise hand-offs.
fn may_affect_status(arena: &AstArena, node: NodeId) -> bool {
    match arena.kind(node) {
        NodeKind::CallBlock => true,
        NodeKind::CallFunction | NodeKind::CallArgs => {
            let func = arena.child(node, "func");
            arena.text(func).starts_with("vm_")
        },
        _ => arena.children(node).iter().any(|child| may_affect_status(arena, *child)),
    }
}

/// True when the subtree has no side effects at all (safe to move across chunks).
fn is_pure_expr(arena: &AstArena, node: NodeId) -> bool {
    match arena.kind(node) {
        NodeKind::CallBlock => false,
        NodeKind::CallFunction | NodeKind::CallArgs => {
            let func = arena.child(node, "func");
            let pure = matches!(
                arena.text(func),
                "compare" | "join" | "letterOf" | "textLength" | "textContains" | "getParam"
            );
            pure && arena.children(node).iter().all(|child| is_pure_expr(arena, *child))
        },
        _ => arena.children(node).iter().all(|child| is_pure_expr(arena, *child)),
    }
}

/// True when the chunk mutates data that pending pure expressions may read.
fn mutates_data(arena: &AstArena, node: NodeId) -> bool {
    match arena.kind(node) {
        NodeKind::CallFunction => {
            let func = arena.child(node, "func");
            matches!(
                arena.text(func),
                "setVar" | "listAdd" | "listDelete" | "listDeleteAll" | "listReplace"
            ) || arena.children(node).iter().any(|child| mutates_data(arena, *child))
        },
        _ => arena.children(node).iter().any(|child| mutates_data(arena, *child)),
    }
}

// ELIDE STATUS CHECKS PASS
// ================================================================================================

#[derive(Default)]
pub(crate) struct ElideStatusChecks;

impl Visitor for ElideStatusChecks {
    fn exit(&mut self, ctx: &mut PathContext<'_>) {
        if ctx.kind() != NodeKind::Chunk || ctx.parent_kind() != Some(NodeKind::Chunk) {
            return;
        }
        let chunk = ctx.node();
        let children = ctx.arena.children(chunk);
        let Some((last_pos, last)) = children.iter().enumerate().last() else { return };
        let last = *last;
        if ctx.arena.kind(last) != NodeKind::CheckStatus {
            return;
        }
        let body: Vec<NodeId> = children[..last_pos].to_vec();
        if body.iter().any(|stmt| may_affect_status(ctx.arena, *stmt)) {
            return;
        }
        ctx.arena.remove_child(chunk, last_pos);
    }
}

// PROPAGATE STORES PASS
// ================================================================================================

/// Runs once, at the exit of the factory's chunk list.
#[derive(Default)]
pub(crate) struct PropagateStores;

type SlotKey = (Rc<str>, Rc<str>);

struct Candidate {
    chunk_pos: usize,
    expr: NodeId,
}

impl Visitor for PropagateStores {
    fn exit(&mut self, ctx: &mut PathContext<'_>) {
        if ctx.kind() != NodeKind::Chunk || ctx.parent_kind() != Some(NodeKind::Factory) {
            return;
        }
        let outer = ctx.node();
        let mut candidates: FnvHashMap<SlotKey, Candidate> = FnvHashMap::default();
        let mut consumed: Vec<usize> = Vec::new();

        let chunk_count = ctx.arena.children(outer).len();
        for pos in 0..chunk_count {
            let chunk = ctx.arena.children(outer)[pos];

            // Substitute pending stores into this chunk's inlined reads first; the reads
            // evaluate before anything the chunk itself does.
            let statements: Vec<NodeId> = ctx.arena.children(chunk).to_vec();
            for stmt in statements {
                substitute_reads(ctx.arena, stmt, &mut candidates, &mut consumed);
            }

            let statements: Vec<NodeId> = ctx.arena.children(chunk).to_vec();
            let suspends = statements.iter().any(|stmt| may_affect_status(ctx.arena, *stmt));
            if suspends {
                candidates.clear();
                continue;
            }
            if statements.iter().any(|stmt| mutates_data(ctx.arena, *stmt)) {
                candidates.clear();
                continue;
            }

            // A chunk that is exactly one pure store becomes a propagation candidate.
            if statements.len() == 1 && ctx.arena.kind(statements[0]) == NodeKind::StoreArg {
                let store = statements[0];
                let name = ctx.arena.child(store, "name");
                let key = ctx.arena.child(store, "key");
                let expr = ctx.arena.child(store, "expr");
                if is_pure_expr(ctx.arena, expr) {
                    let slot: SlotKey =
                        (Rc::from(ctx.arena.text(name)), Rc::from(ctx.arena.text(key)));
                    candidates.insert(slot, Candidate { chunk_pos: pos, expr });
                }
            }
        }

        consumed.sort_unstable();
        consumed.dedup();
        for pos in consumed.into_iter().rev() {
            ctx.arena.remove_child(outer, pos);
        }
    }
}

/// Replaces `bundle.key` reads that match a pending candidate with the stored expression,
/// recording the donor chunk for deletion. Each candidate feeds exactly one read.
fn substitute_reads(
    arena: &mut AstArena,
    node: NodeId,
    candidates: &mut FnvHashMap<SlotKey, Candidate>,
    consumed: &mut Vec<usize>,
) {
    let children: Vec<NodeId> = arena.children(node).to_vec();
    for (pos, child) in children.into_iter().enumerate() {
        if arena.kind(child) == NodeKind::Property {
            let lhs = arena.child(child, "lhs");
            let member = arena.child(child, "member");
            if arena.kind(lhs) == NodeKind::Id && arena.kind(member) == NodeKind::StringLit {
                let slot: SlotKey = (Rc::from(arena.text(lhs)), Rc::from(arena.text(member)));
                if let Some(candidate) = candidates.remove(&slot) {
                    arena.set_child_at(node, pos, candidate.expr);
                    consumed.push(candidate.chunk_pos);
                    continue;
                }
            }
        }
        substitute_reads(arena, child, candidates, consumed);
    }
}
