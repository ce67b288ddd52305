//! Flattened operation plans.
//!
//! The block cache turns the recursive input/next/branch graph of one straight-line sequence of
//! commands into the linear structures defined here. A [`CachedSequence`] is an arena of
//! [`CachedOp`] records addressed by [`OpIdx`] handles; back-references (parent slots, control
//! successors) are handles and block ids, never owning pointers, so invalidation is a plain drop.

use std::rc::Rc;

use fnv::FnvHashMap;
use smallvec::SmallVec;

use crate::{BlockId, Mutation, PrimitiveFn, Value};

// OPCODE INTERNING
// ================================================================================================

/// A dense id for an interned opcode string. Assigned at cache-build time so dispatch never
/// hashes opcode strings.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct OpcodeId(u32);

impl OpcodeId {
    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

/// Interns opcode strings to [`OpcodeId`]s.
#[derive(Debug, Default)]
pub struct OpcodeInterner {
    names: Vec<Rc<str>>,
    ids: FnvHashMap<Rc<str>, OpcodeId>,
}

impl OpcodeInterner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, name: &str) -> OpcodeId {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        let interned: Rc<str> = Rc::from(name);
        let id = OpcodeId(self.names.len() as u32);
        self.names.push(interned.clone());
        self.ids.insert(interned, id);
        id
    }

    pub fn name(&self, id: OpcodeId) -> &str {
        &self.names[id.as_usize()]
    }
}

// ARGUMENT BUNDLE
// ================================================================================================

/// The mutable argument bundle of one cached op, reused across every execution of that specific
/// block. Slots are keyed by input/field name; child ops write into their parent's bundle through
/// a precomputed slot index, so steady-state dispatch performs no name lookups.
#[derive(Clone, Debug, Default)]
pub struct ArgValues {
    slots: SmallVec<[(Rc<str>, Value); 4]>,
    pub mutation: Option<Rc<Mutation>>,
}

impl ArgValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index of the slot for `key`, creating it when absent.
    pub fn ensure(&mut self, key: &str) -> usize {
        if let Some(idx) = self.slots.iter().position(|(k, _)| &**k == key) {
            return idx;
        }
        self.slots.push((Rc::from(key), Value::default()));
        self.slots.len() - 1
    }

    pub fn set(&mut self, key: &str, value: Value) {
        let idx = self.ensure(key);
        self.slots[idx].1 = value;
    }

    #[inline(always)]
    pub fn set_slot(&mut self, idx: usize, value: Value) {
        self.slots[idx].1 = value;
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.slots.iter().find(|(k, _)| &**k == key).map(|(_, v)| v)
    }

    /// Returns the slot index for `key` without creating it.
    pub fn position(&self, key: &str) -> Option<usize> {
        self.slots.iter().position(|(k, _)| &**k == key)
    }

    /// Returns the key name of a slot.
    pub fn key_at(&self, idx: usize) -> &str {
        &self.slots[idx].0
    }

    #[inline(always)]
    pub fn slot(&self, idx: usize) -> &Value {
        &self.slots[idx].1
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.slots.iter().map(|(k, v)| (&**k, v))
    }

    // CAST ACCESSORS
    // --------------------------------------------------------------------------------------------

    pub fn num(&self, key: &str) -> f64 {
        self.get(key).map(crate::cast::to_number).unwrap_or(0.0)
    }

    pub fn bool(&self, key: &str) -> bool {
        self.get(key).map(crate::cast::to_boolean).unwrap_or(false)
    }

    pub fn text(&self, key: &str) -> String {
        self.get(key).map(crate::cast::to_text).unwrap_or_default()
    }
}

// CACHED OP
// ================================================================================================

/// Handle of a [`CachedOp`] within its sequence arena.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct OpIdx(pub u32);

impl OpIdx {
    #[inline(always)]
    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

/// How the dispatcher treats an op. Synthetic ops are closed variants rather than registry
/// functions so the inner loop matches on an enum instead of comparing opcode strings.
#[derive(Clone, Debug, PartialEq)]
pub enum OpKind {
    /// Call the cached primitive function.
    Primitive,
    /// A pre-executed shadow holder; skipped at dispatch, its value already folded.
    Shadow,
    /// Unknown opcode: recorded but skipped.
    Undefined,
    /// A lookup miss stand-in: executing it retires the thread.
    Null,
    /// Cast the collected `VALUE` slot to a string and redirect it as an `{id, name}` bundle.
    CastString,
    /// Hat tail op: applies edge-activation / predicate gating.
    ReportHat { edge_activated: bool },
    /// Tail op for a lone top-level reporter clicked in the editor.
    ReportStackClick,
    /// Tail op for a monitored reporter.
    ReportMonitor,
    /// Push a pending branch request onto the thread stack.
    DoStack { branch_num: u8 },
    /// Command tail: advance along the chain or mark the sequence boundary.
    MayContinue,
}

/// The execution-ready record for one block (or one synthesized op).
#[derive(Clone, Debug)]
pub struct CachedOp {
    pub id: BlockId,
    pub opcode: Rc<str>,
    pub opcode_id: OpcodeId,
    pub kind: OpKind,
    /// The primitive, cloned out of the registry at build time so dispatch performs no lookup.
    pub func: Option<PrimitiveFn>,
    pub args: ArgValues,

    /// Arena handle of the op that receives this op's reported value, with the precomputed slot
    /// in its bundle. `None` parents discard the report (the STATEMENT sentinel).
    pub parent: Option<OpIdx>,
    pub parent_key: Option<Rc<str>>,
    pub parent_slot: u32,
    /// Distance in plan positions from this op to its logical parent; zero means the immediate
    /// parent is the owning command op.
    pub parent_offset: u32,

    pub is_hat: bool,
    pub is_shadow: bool,
    /// Set once this op has been observed returning a promise; the compiler keeps the promise
    /// bookkeeping for such ops.
    pub uses_promise: bool,
    /// False when the opcode has no registered primitive.
    pub defined: bool,
    /// The folded static value of a shadow op.
    pub shadow_value: Option<Value>,
    pub profile_opcode: Rc<str>,

    /// The owning command op and this op's position in the sequence plan.
    pub command: OpIdx,
    pub plan_pos: u32,

    /// Control-flow links of command ops.
    pub next: Option<BlockId>,
    pub branch_blocks: [Option<BlockId>; 2],
    /// `vm_may_continue` payload: the stack entry this command expects on top, and the chain
    /// successor to move to.
    pub expect_stack: Option<BlockId>,
    pub next_stack: Option<BlockId>,
}

impl CachedOp {
    /// A bare record for a synthesized op.
    pub fn synthetic(id: BlockId, opcode: &str, opcode_id: OpcodeId, kind: OpKind) -> Self {
        let opcode: Rc<str> = Rc::from(opcode);
        Self {
            id,
            opcode: opcode.clone(),
            opcode_id,
            kind,
            func: None,
            args: ArgValues::new(),
            parent: None,
            parent_key: None,
            parent_slot: 0,
            parent_offset: 0,
            is_hat: false,
            is_shadow: false,
            uses_promise: false,
            defined: true,
            shadow_value: None,
            profile_opcode: opcode,
            command: OpIdx(0),
            plan_pos: 0,
            next: None,
            branch_blocks: [None, None],
            expect_stack: None,
            next_stack: None,
        }
    }
}

// CACHED SEQUENCE
// ================================================================================================

/// The span of one command within the sequence plan. `plan_end` is exclusive; the command's
/// `vm_may_continue` tail sits at `plan_end - 1`.
#[derive(Clone, Debug)]
pub struct CommandSpan {
    pub block: BlockId,
    pub op: OpIdx,
    pub plan_start: u32,
    pub plan_end: u32,
}

/// One flattened straight-line sequence: the ops of its first command concatenated with the ops
/// of every chain successor, in execution order. The plan restricted to `[plan_start_k ..]` is
/// exactly the straight-line continuation from command `k`.
#[derive(Debug, Default)]
pub struct CachedSequence {
    pub first_block: BlockId,
    pub ops: Vec<CachedOp>,
    pub plan: Vec<OpIdx>,
    pub commands: Vec<CommandSpan>,
    /// Shadow ops, order-independent among themselves and pre-executed at build time.
    pub shadow_ops: Vec<OpIdx>,

    /// Where the next dispatch of this sequence starts (the shared command-set index). Taken and
    /// reset to zero on entry; promise resumption and branch returns park a mid-plan position
    /// here.
    pub resume_index: u32,
    /// Complete passes over the plan since the last compile attempt.
    pub count: u32,
    /// True once a compiled program has replaced the interpretive loop for this sequence.
    pub compiled: bool,
}

impl Default for OpKind {
    fn default() -> Self {
        OpKind::Undefined
    }
}

impl CachedSequence {
    #[inline(always)]
    pub fn op(&self, idx: OpIdx) -> &CachedOp {
        &self.ops[idx.as_usize()]
    }

    #[inline(always)]
    pub fn op_mut(&mut self, idx: OpIdx) -> &mut CachedOp {
        &mut self.ops[idx.as_usize()]
    }

    /// Returns the command span whose command block has the given id.
    pub fn command_for_block(&self, id: &str) -> Option<&CommandSpan> {
        self.commands.iter().find(|span| &*span.block == id)
    }

    /// Writes an op's reported value into its parent's bundle. Reports into the STATEMENT
    /// sentinel (no parent) are discarded.
    pub fn write_parent(&mut self, idx: OpIdx, value: Value) {
        let (parent, slot) = {
            let op = self.op(idx);
            (op.parent, op.parent_slot as usize)
        };
        if let Some(parent) = parent {
            self.ops[parent.as_usize()].args.set_slot(slot, value);
        }
    }

    /// Reads back the value currently sitting in this op's parent slot, if it has one.
    pub fn read_parent_slot(&self, idx: OpIdx) -> Option<Value> {
        let op = self.op(idx);
        let parent = op.parent?;
        Some(self.ops[parent.as_usize()].args.slot(op.parent_slot as usize).clone())
    }

    /// Finds the op with the given block id at or before `before` in the plan, preferring the
    /// latest occurrence. Used by promise re-entry to match survivors after a graph edit.
    pub fn latest_op_with_id(&self, id: &str, before: usize) -> Option<(usize, OpIdx)> {
        let end = before.min(self.plan.len());
        for pos in (0..end).rev() {
            let idx = self.plan[pos];
            if &*self.op(idx).id == id {
                return Some((pos, idx));
            }
        }
        None
    }
}

// DEFAULTS FOR ARENA CONSTRUCTION
// ================================================================================================

impl Default for CachedOp {
    fn default() -> Self {
        CachedOp::synthetic(Rc::from(""), crate::opcodes::VM_NULL, OpcodeId(0), OpKind::Null)
    }
}
