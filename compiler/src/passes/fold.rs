//! Cast folding.
//!
//! `toNumber` over a numeric literal, a numeric operator, or an already-numeric cast collapses;
//! `toBoolean` collapses symmetrically over boolean-producing trees.

use crate::ast::{NodeId, NodeKind};
use crate::transform::{PathContext, Visitor};

// FOLD CASTS PASS
// ================================================================================================

#[derive(Default)]
pub(crate) struct FoldCasts;

const NUMERIC_TOKENS: &[&str] = &["+", "-", "*", "/", "%"];
const BOOLEAN_TOKENS: &[&str] = &["<", ">", "===", "&&", "||"];

impl FoldCasts {
    fn fold(&self, ctx: &mut PathContext<'_>) {
        let node = ctx.node();
        let expect = ctx.arena.child(node, "expect");
        let value = ctx.arena.child(node, "value");
        match ctx.arena.text(expect) {
            "toNumber" => {
                if ctx.arena.kind(value) == NodeKind::NumberLit {
                    ctx.replace_with(value);
                    return;
                }
                if let Some(n) = foldable_literal_number(ctx, value) {
                    let lit = ctx.arena.number(n);
                    ctx.replace_with(lit);
                    return;
                }
                if produces_number(ctx, value) {
                    ctx.replace_with(value);
                }
            },
            "toBoolean" => {
                if ctx.arena.kind(value) == NodeKind::BooleanLit || produces_boolean(ctx, value) {
                    ctx.replace_with(value);
                }
            },
            _ => {},
        }
    }
}

impl Visitor for FoldCasts {
    fn exit(&mut self, ctx: &mut PathContext<'_>) {
        if ctx.kind() == NodeKind::Cast {
            self.fold(ctx);
        }
    }
}

// FOLD PREDICATES
// ================================================================================================

/// A literal whose numeric reading is known at compile time.
fn foldable_literal_number(ctx: &PathContext<'_>, node: NodeId) -> Option<f64> {
    match ctx.arena.kind(node) {
        NodeKind::BooleanLit | NodeKind::StringLit | NodeKind::Null => {
            ctx.arena.literal_number(node)
        },
        _ => None,
    }
}

/// True when the subtree already evaluates to a number.
fn produces_number(ctx: &PathContext<'_>, node: NodeId) -> bool {
    match ctx.arena.kind(node) {
        NodeKind::BinaryOperator => {
            let token = ctx.arena.child(node, "operator");
            NUMERIC_TOKENS.contains(&ctx.arena.text(token))
        },
        NodeKind::Cast => {
            let expect = ctx.arena.child(node, "expect");
            let name = ctx.arena.text(expect);
            name == "toNumber" || name == "round" || name.starts_with("math_")
        },
        _ => false,
    }
}

/// True when the subtree already evaluates to a boolean.
fn produces_boolean(ctx: &PathContext<'_>, node: NodeId) -> bool {
    match ctx.arena.kind(node) {
        NodeKind::BinaryOperator => {
            let token = ctx.arena.child(node, "operator");
            BOOLEAN_TOKENS.contains(&ctx.arena.text(token))
        },
        NodeKind::Cast => {
            let expect = ctx.arena.child(node, "expect");
            let name = ctx.arena.text(expect);
            name == "toBoolean" || name == "not"
        },
        _ => false,
    }
}
