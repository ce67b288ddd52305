//! The typed intermediate representation the specializer rewrites.
//!
//! Nodes form a closed kind set with an explicit ancestor relation (e.g. `BinaryOperator` is a
//! `FixedOperator` is an `Operator`), so visitor predicates test kind membership against a
//! precomputed ancestor table instead of walking anything at call time. Nodes live in an arena
//! and reference each other by [`NodeId`]; child slots have a fixed arity and key order per kind,
//! except the variadic `Chunk` and `ArrayLit` kinds.

mod kinds;

use std::rc::Rc;

use blockvm_core::{Value, cast};
use smallvec::SmallVec;

pub use kinds::{KIND_COUNT, NodeKind};

/// Position of a named key slot within a fixed-arity kind's children.
pub(crate) fn child_key_position(kind: NodeKind, key: &str) -> Option<usize> {
    kinds::child_keys(kind).and_then(|keys| keys.iter().position(|k| *k == key))
}

// NODE
// ================================================================================================

/// Handle of a node within an [`AstArena`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline(always)]
    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

/// Inline payload of literal-ish nodes. `CallBlock`/`CallFunction` nodes reuse the numeric
/// payload to carry the cached-op index they were generated from.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    None,
    Bool(bool),
    Num(f64),
    Text(Rc<str>),
}

#[derive(Clone, Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub payload: Payload,
    pub children: SmallVec<[NodeId; 4]>,
}

// ARENA
// ================================================================================================

#[derive(Debug, Default)]
pub struct AstArena {
    nodes: Vec<Node>,
}

impl AstArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, kind: NodeKind, payload: Payload, children: &[NodeId]) -> NodeId {
        debug_assert!(
            kinds::child_keys(kind).map(|keys| keys.len() == children.len()).unwrap_or(true),
            "child arity mismatch for {kind:?}"
        );
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node { kind, payload, children: SmallVec::from_slice(children) });
        id
    }

    #[inline(always)]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.as_usize()]
    }

    #[inline(always)]
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.as_usize()]
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.node(id).kind
    }

    /// True when `id`'s kind is `kind` or a descendant of it.
    pub fn is_of(&self, kind: NodeKind, id: NodeId) -> bool {
        self.kind(id).is_a(kind)
    }

    // CHILD ACCESS
    // --------------------------------------------------------------------------------------------

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// Returns the child in the named key slot of a fixed-arity node.
    pub fn child(&self, id: NodeId, key: &str) -> NodeId {
        let node = self.node(id);
        let keys = kinds::child_keys(node.kind).expect("variadic node has no child keys");
        let pos = keys.iter().position(|k| *k == key).expect("unknown child key");
        node.children[pos]
    }

    pub fn set_child(&mut self, id: NodeId, key: &str, value: NodeId) {
        let keys = kinds::child_keys(self.kind(id)).expect("variadic node has no child keys");
        let pos = keys.iter().position(|k| *k == key).expect("unknown child key");
        self.node_mut(id).children[pos] = value;
    }

    pub fn set_child_at(&mut self, id: NodeId, pos: usize, value: NodeId) {
        self.node_mut(id).children[pos] = value;
    }

    pub fn insert_child(&mut self, id: NodeId, pos: usize, value: NodeId) {
        self.node_mut(id).children.insert(pos, value);
    }

    pub fn remove_child(&mut self, id: NodeId, pos: usize) -> NodeId {
        self.node_mut(id).children.remove(pos)
    }

    // CLONING
    // --------------------------------------------------------------------------------------------

    /// Shallow clone: a new node sharing the original's children.
    pub fn clone_node(&mut self, id: NodeId) -> NodeId {
        let node = self.node(id).clone();
        let new = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        new
    }

    /// Deep clone of the whole subtree.
    pub fn clone_deep(&mut self, id: NodeId) -> NodeId {
        let node = self.node(id).clone();
        let children: SmallVec<[NodeId; 4]> =
            node.children.iter().map(|child| *child).collect::<SmallVec<[NodeId; 4]>>();
        let mut cloned: SmallVec<[NodeId; 4]> = SmallVec::new();
        for child in children {
            cloned.push(self.clone_deep(child));
        }
        let new = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node { kind: node.kind, payload: node.payload, children: cloned });
        new
    }

    // TYPED CONSTRUCTORS
    // --------------------------------------------------------------------------------------------

    pub fn null(&mut self) -> NodeId {
        self.alloc(NodeKind::Null, Payload::None, &[])
    }

    pub fn boolean(&mut self, b: bool) -> NodeId {
        self.alloc(NodeKind::BooleanLit, Payload::Bool(b), &[])
    }

    pub fn number(&mut self, n: f64) -> NodeId {
        self.alloc(NodeKind::NumberLit, Payload::Num(n), &[])
    }

    pub fn string(&mut self, s: impl AsRef<str>) -> NodeId {
        self.alloc(NodeKind::StringLit, Payload::Text(Rc::from(s.as_ref())), &[])
    }

    pub fn array(&mut self, items: &[NodeId]) -> NodeId {
        self.alloc(NodeKind::ArrayLit, Payload::None, items)
    }

    pub fn id(&mut self, name: impl AsRef<str>) -> NodeId {
        self.alloc(NodeKind::Id, Payload::Text(Rc::from(name.as_ref())), &[])
    }

    pub fn token(&mut self, text: impl AsRef<str>) -> NodeId {
        self.alloc(NodeKind::Token, Payload::Text(Rc::from(text.as_ref())), &[])
    }

    pub fn whitespace(&mut self, text: impl AsRef<str>) -> NodeId {
        self.alloc(NodeKind::Whitespace, Payload::Text(Rc::from(text.as_ref())), &[])
    }

    pub fn chunk(&mut self, statements: &[NodeId]) -> NodeId {
        self.alloc(NodeKind::Chunk, Payload::None, statements)
    }

    pub fn expression_statement(&mut self, expr: NodeId) -> NodeId {
        self.alloc(NodeKind::ExpressionStatement, Payload::None, &[expr])
    }

    pub fn if_statement(&mut self, test: NodeId, expr: NodeId) -> NodeId {
        self.alloc(NodeKind::IfStatement, Payload::None, &[test, expr])
    }

    pub fn check_status(&mut self) -> NodeId {
        self.alloc(NodeKind::CheckStatus, Payload::None, &[])
    }

    pub fn store_arg(&mut self, name: NodeId, key: NodeId, expr: NodeId) -> NodeId {
        self.alloc(NodeKind::StoreArg, Payload::None, &[name, key, expr])
    }

    pub fn store_var(&mut self, name: NodeId, expr: NodeId) -> NodeId {
        self.alloc(NodeKind::StoreVar, Payload::None, &[name, expr])
    }

    pub fn cast(&mut self, expect: NodeId, value: NodeId) -> NodeId {
        self.alloc(NodeKind::Cast, Payload::None, &[expect, value])
    }

    pub fn cast2(&mut self, expect: NodeId, input1: NodeId, input2: NodeId) -> NodeId {
        self.alloc(NodeKind::Cast2, Payload::None, &[expect, input1, input2])
    }

    pub fn cast_args(&mut self, expect: NodeId, name: NodeId, key: NodeId) -> NodeId {
        self.alloc(NodeKind::CastArgs, Payload::None, &[expect, name, key])
    }

    pub fn property(&mut self, lhs: NodeId, member: NodeId) -> NodeId {
        self.alloc(NodeKind::Property, Payload::None, &[lhs, member])
    }

    pub fn if_else(&mut self, test: NodeId, if_true: NodeId, if_false: NodeId) -> NodeId {
        self.alloc(NodeKind::IfElse, Payload::None, &[test, if_true, if_false])
    }

    pub fn binary_operator(&mut self, operator: &str, input1: NodeId, input2: NodeId) -> NodeId {
        let token = self.token(operator);
        self.alloc(NodeKind::BinaryOperator, Payload::None, &[token, input1, input2])
    }

    pub fn call_args(&mut self, func: NodeId, args: NodeId) -> NodeId {
        self.alloc(NodeKind::CallArgs, Payload::None, &[func, args])
    }

    pub fn call_block(&mut self, op_index: u32, context: NodeId, func: NodeId, args: NodeId) -> NodeId {
        self.alloc(NodeKind::CallBlock, Payload::Num(op_index as f64), &[context, func, args])
    }

    pub fn call_function(&mut self, op_index: u32, func: NodeId, args: NodeId) -> NodeId {
        self.alloc(NodeKind::CallFunction, Payload::Num(op_index as f64), &[func, args])
    }

    pub fn factory(
        &mut self,
        debug_name: NodeId,
        bindings: NodeId,
        dereferences: NodeId,
        chunks: NodeId,
    ) -> NodeId {
        self.alloc(NodeKind::Factory, Payload::None, &[debug_name, bindings, dereferences, chunks])
    }

    // NODEIFY
    // --------------------------------------------------------------------------------------------

    /// Wraps a runtime value into the matching literal node. Named bundles nodeify as their name
    /// string; they only appear where primitives read them back symbolically.
    pub fn nodeify(&mut self, value: &Value) -> NodeId {
        match value {
            Value::Bool(b) => self.boolean(*b),
            Value::Num(n) => self.number(*n),
            Value::Str(s) => self.string(&**s),
            Value::Named(named) => self.string(&*named.name),
        }
    }

    // ACCESSOR HELPERS
    // --------------------------------------------------------------------------------------------

    pub fn text(&self, id: NodeId) -> &str {
        match &self.node(id).payload {
            Payload::Text(s) => s,
            _ => "",
        }
    }

    pub fn num(&self, id: NodeId) -> f64 {
        match &self.node(id).payload {
            Payload::Num(n) => *n,
            _ => 0.0,
        }
    }

    /// The cached-op index a `CallBlock`/`CallFunction` node was generated from.
    pub fn op_index(&self, id: NodeId) -> u32 {
        self.num(id) as u32
    }

    /// The literal value of a literal node, when it has one.
    pub fn literal_value(&self, id: NodeId) -> Option<Value> {
        let node = self.node(id);
        match (node.kind, &node.payload) {
            (NodeKind::BooleanLit, Payload::Bool(b)) => Some(Value::Bool(*b)),
            (NodeKind::NumberLit, Payload::Num(n)) => Some(Value::Num(*n)),
            (NodeKind::StringLit, Payload::Text(s)) => Some(Value::Str(s.clone())),
            (NodeKind::Null, _) => Some(Value::Num(0.0)),
            _ => None,
        }
    }

    /// Numeric reading of a literal node, for fold decisions.
    pub fn literal_number(&self, id: NodeId) -> Option<f64> {
        self.literal_value(id).map(|v| cast::to_number(&v))
    }
}
