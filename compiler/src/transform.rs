//! A re-entrant, mutation-safe tree walker.
//!
//! The walk is an explicit state machine over a stack of [`Path`] frames; there is no recursion,
//! so visitors may restructure the tree from inside their exit hooks without invalidating any
//! call frames. Each frame moves through `AT_HEAD → IN_RANGE → AT_TAIL → OUT_OF_RANGE`; a
//! mutation rewinds the affected frame (or its parent's child index) so that every new subtree is
//! visited by every registered visitor before the walk completes.

use crate::ast::{AstArena, NodeId, NodeKind};

// WALK STAGES
// ================================================================================================

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Stage {
    AtHead,
    InRange,
    AtTail,
    OutOfRange,
}

/// One level of the walk: a node, its link to the parent frame, and the two progress indices.
/// `index` is normal progress over the children; `active_index` is the revisit pointer mutations
/// rewind.
#[derive(Debug)]
struct Path {
    node: NodeId,
    parent: Option<usize>,
    parent_child_pos: usize,
    stage: Stage,
    index: usize,
    active_index: usize,
    removed: bool,
}

impl Path {
    fn new(node: NodeId, parent: Option<usize>, parent_child_pos: usize) -> Self {
        Self {
            node,
            parent,
            parent_child_pos,
            stage: Stage::AtHead,
            index: 0,
            active_index: 0,
            removed: false,
        }
    }
}

// VISITOR
// ================================================================================================

/// A bundle of enter/exit hooks. Hooks dispatch themselves on `ctx.kind()`; kind-membership
/// queries go through the ancestor table, so a visitor interested in every `Call` sees
/// `CallBlock`, `CallArgs`, and `CallFunction` alike.
pub trait Visitor {
    fn enter(&mut self, _ctx: &mut PathContext<'_>) {}
    fn exit(&mut self, _ctx: &mut PathContext<'_>) {}
}

// PATH CONTEXT
// ================================================================================================

/// The mutable view a visitor receives: the arena plus mutation operations anchored at the
/// current node.
pub struct PathContext<'a> {
    pub arena: &'a mut AstArena,
    stack: &'a mut Vec<Path>,
    depth: usize,
}

impl PathContext<'_> {
    pub fn node(&self) -> NodeId {
        self.stack[self.depth].node
    }

    pub fn kind(&self) -> NodeKind {
        self.arena.kind(self.node())
    }

    pub fn is(&self, kind: NodeKind) -> bool {
        self.kind().is_a(kind)
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.stack[self.depth].parent.map(|p| self.stack[p].node)
    }

    pub fn parent_kind(&self) -> Option<NodeKind> {
        self.parent().map(|p| self.arena.kind(p))
    }

    /// Position of the current node within its parent's children.
    pub fn child_pos(&self) -> usize {
        self.stack[self.depth].parent_child_pos
    }

    // MUTATIONS
    // --------------------------------------------------------------------------------------------

    /// Replaces the current node. The frame rewinds to the head stage so the replacement subtree
    /// is visited by every visitor.
    pub fn replace_with(&mut self, new: NodeId) {
        let (parent, pos) = {
            let frame = &self.stack[self.depth];
            (frame.parent, frame.parent_child_pos)
        };
        if let Some(parent) = parent {
            let parent_node = self.stack[parent].node;
            self.arena.set_child_at(parent_node, pos, new);
        }
        let frame = &mut self.stack[self.depth];
        frame.node = new;
        frame.stage = Stage::AtHead;
        frame.index = 0;
        frame.active_index = 0;
    }

    /// Removes the current node from its (variadic) parent. The parent's indices rewind so the
    /// following sibling is not skipped.
    pub fn remove(&mut self) {
        let (parent, pos) = {
            let frame = &self.stack[self.depth];
            (frame.parent, frame.parent_child_pos)
        };
        let parent = parent.expect("cannot remove the root node");
        let parent_node = self.stack[parent].node;
        debug_assert!(self.arena.children(parent_node).len() > pos);
        self.arena.remove_child(parent_node, pos);
        let parent_frame = &mut self.stack[parent];
        if parent_frame.index > pos {
            parent_frame.index -= 1;
        }
        parent_frame.active_index = parent_frame.index;
        self.stack[self.depth].removed = true;
    }

    /// Inserts a sibling before the current node; the walker revisits from the inserted node.
    pub fn insert_before(&mut self, new: NodeId) {
        let (parent, pos) = {
            let frame = &self.stack[self.depth];
            (frame.parent, frame.parent_child_pos)
        };
        let parent = parent.expect("cannot insert a sibling of the root node");
        let parent_node = self.stack[parent].node;
        self.arena.insert_child(parent_node, pos, new);
        let parent_frame = &mut self.stack[parent];
        parent_frame.index = pos;
        parent_frame.active_index = pos;
        self.stack[self.depth].parent_child_pos = pos + 1;
    }

    /// Inserts a sibling after the current node; it is the next node visited at this level.
    pub fn insert_after(&mut self, new: NodeId) {
        let (parent, pos) = {
            let frame = &self.stack[self.depth];
            (frame.parent, frame.parent_child_pos)
        };
        let parent = parent.expect("cannot insert a sibling of the root node");
        let parent_node = self.stack[parent].node;
        self.arena.insert_child(parent_node, pos + 1, new);
        let parent_frame = &mut self.stack[parent];
        parent_frame.index = pos + 1;
        parent_frame.active_index = pos + 1;
    }

    /// Replaces the named key slot of the current node, rewinding this frame's child cursor so
    /// the new subtree is visited.
    pub fn set_key(&mut self, key: &str, value: NodeId) {
        let node = self.node();
        self.arena.set_child(node, key, value);
        let keys = crate::ast::child_key_position(self.arena.kind(node), key);
        let frame = &mut self.stack[self.depth];
        if let Some(pos) = keys {
            if frame.index > pos {
                frame.index = pos;
                frame.active_index = pos;
            }
        }
    }
}

// TRANSFORM
// ================================================================================================

/// Walks the tree rooted at `root`, invoking every visitor's enter hook before descending into a
/// node's children and every exit hook after. Returns the (possibly replaced) root.
pub fn transform(
    arena: &mut AstArena,
    root: NodeId,
    visitors: &mut [&mut dyn Visitor],
) -> NodeId {
    let mut stack: Vec<Path> = vec![Path::new(root, None, 0)];
    let mut final_root = root;

    while let Some(depth) = stack.len().checked_sub(1) {
        let stage = stack[depth].stage;
        match stage {
            Stage::AtHead => {
                let before = stack[depth].node;
                for visitor in visitors.iter_mut() {
                    let mut ctx = PathContext { arena: &mut *arena, stack: &mut stack, depth };
                    visitor.enter(&mut ctx);
                    if stack[depth].removed || stack[depth].node != before {
                        break;
                    }
                }
                if stack[depth].removed {
                    stack.truncate(depth);
                    continue;
                }
                // A replacement during enter rewinds to AtHead; re-run the hooks on the new node.
                if stack[depth].node == before {
                    stack[depth].stage = Stage::InRange;
                }
            },
            Stage::InRange => {
                let node = stack[depth].node;
                let index = stack[depth].index;
                let child_count = arena.children(node).len();
                if index < child_count {
                    let child = arena.children(node)[index];
                    stack[depth].index = index + 1;
                    stack[depth].active_index = index + 1;
                    stack.push(Path::new(child, Some(depth), index));
                } else {
                    stack[depth].stage = Stage::AtTail;
                }
            },
            Stage::AtTail => {
                for visitor in visitors.iter_mut() {
                    let mut ctx = PathContext { arena: &mut *arena, stack: &mut stack, depth };
                    visitor.exit(&mut ctx);
                    if stack[depth].removed || stack[depth].stage != Stage::AtTail {
                        break;
                    }
                }
                if stack[depth].removed {
                    stack.truncate(depth);
                    continue;
                }
                match stack[depth].stage {
                    // A mutation rewound this frame: re-enter the mutated subtree.
                    Stage::AtHead | Stage::InRange => {},
                    _ => stack[depth].stage = Stage::OutOfRange,
                }
            },
            Stage::OutOfRange => {
                if depth == 0 {
                    final_root = stack[0].node;
                }
                stack.truncate(depth);
            },
        }
    }

    final_root
}

// TESTS
// ================================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Payload;

    /// Counts every node it enters, by kind name.
    #[derive(Default)]
    struct Recorder {
        entered: Vec<NodeKind>,
        exited: Vec<NodeKind>,
    }

    impl Visitor for Recorder {
        fn enter(&mut self, ctx: &mut PathContext<'_>) {
            self.entered.push(ctx.kind());
        }

        fn exit(&mut self, ctx: &mut PathContext<'_>) {
            self.exited.push(ctx.kind());
        }
    }

    #[test]
    fn walks_depth_first_with_enter_before_exit() {
        let mut arena = AstArena::new();
        let one = arena.number(1.0);
        let two = arena.number(2.0);
        let expect = arena.id("toNumber");
        let cast = arena.cast(expect, one);
        let sum = arena.binary_operator("+", cast, two);
        let stmt = arena.expression_statement(sum);
        let chunk = arena.chunk(&[stmt]);

        let mut recorder = Recorder::default();
        transform(&mut arena, chunk, &mut [&mut recorder]);

        assert_eq!(recorder.entered[0], NodeKind::Chunk);
        assert_eq!(*recorder.exited.last().unwrap(), NodeKind::Chunk);
        let numbers = recorder.entered.iter().filter(|k| **k == NodeKind::NumberLit).count();
        assert_eq!(numbers, 2);
    }

    /// Replaces every `toNumber` cast of a number literal with the literal.
    struct CollapseCasts;

    impl Visitor for CollapseCasts {
        fn exit(&mut self, ctx: &mut PathContext<'_>) {
            if ctx.kind() != NodeKind::Cast {
                return;
            }
            let value = ctx.arena.child(ctx.node(), "value");
            if ctx.arena.kind(value) == NodeKind::NumberLit {
                ctx.replace_with(value);
            }
        }
    }

    #[test]
    fn exit_mutations_reenter_the_new_subtree() {
        let mut arena = AstArena::new();
        let one = arena.number(1.0);
        let expect = arena.id("toNumber");
        let inner = arena.cast(expect, one);
        let expect2 = arena.id("toNumber");
        let outer = arena.cast(expect2, inner);
        let stmt = arena.expression_statement(outer);
        let chunk = arena.chunk(&[stmt]);

        let mut collapse = CollapseCasts;
        let mut recorder = Recorder::default();
        transform(&mut arena, chunk, &mut [&mut collapse, &mut recorder]);

        // Both casts collapsed: the statement now wraps the bare literal.
        let expr = arena.child(stmt, "expr");
        assert_eq!(arena.kind(expr), NodeKind::NumberLit);
        // The recorder saw the replacement subtree, not only the original nodes.
        assert!(recorder.entered.iter().filter(|k| **k == NodeKind::NumberLit).count() >= 2);
    }

    /// Inserts a marker token after the first statement it sees, once.
    #[derive(Default)]
    struct InsertOnce {
        done: bool,
    }

    impl Visitor for InsertOnce {
        fn exit(&mut self, ctx: &mut PathContext<'_>) {
            if self.done || ctx.kind() != NodeKind::ExpressionStatement {
                return;
            }
            if ctx.parent_kind() != Some(NodeKind::Chunk) {
                return;
            }
            self.done = true;
            let marker = ctx.arena.token("marker");
            ctx.insert_after(marker);
        }
    }

    #[test]
    fn inserted_siblings_are_visited() {
        let mut arena = AstArena::new();
        let one = arena.number(1.0);
        let stmt = arena.expression_statement(one);
        let chunk = arena.chunk(&[stmt]);

        let mut insert = InsertOnce::default();
        let mut recorder = Recorder::default();
        transform(&mut arena, chunk, &mut [&mut insert, &mut recorder]);

        assert_eq!(arena.children(chunk).len(), 2);
        assert!(recorder.entered.contains(&NodeKind::Token));
    }

    /// Removes whitespace nodes from chunks.
    struct StripWhitespace;

    impl Visitor for StripWhitespace {
        fn enter(&mut self, ctx: &mut PathContext<'_>) {
            if ctx.kind() == NodeKind::Whitespace {
                ctx.remove();
            }
        }
    }

    #[test]
    fn removal_does_not_skip_the_following_sibling() {
        let mut arena = AstArena::new();
        let ws1 = arena.whitespace(" ");
        let one = arena.number(1.0);
        let stmt = arena.expression_statement(one);
        let ws2 = arena.whitespace(" ");
        let chunk = arena.chunk(&[ws1, stmt, ws2]);

        let mut strip = StripWhitespace;
        let mut recorder = Recorder::default();
        transform(&mut arena, chunk, &mut [&mut strip, &mut recorder]);

        assert_eq!(arena.children(chunk).len(), 1);
        assert_eq!(arena.children(chunk)[0], stmt);
        assert!(recorder.entered.contains(&NodeKind::ExpressionStatement));
    }

    #[test]
    fn payload_survives_clone_deep() {
        let mut arena = AstArena::new();
        let s = arena.string("hello");
        let stmt = arena.expression_statement(s);
        let copy = arena.clone_deep(stmt);
        let copied_expr = arena.child(copy, "expr");
        assert_ne!(copied_expr, s);
        assert_eq!(arena.node(copied_expr).payload, Payload::Text("hello".into()));
    }
}
