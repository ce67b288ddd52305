//! Opcode-aware inlining.
//!
//! Rewrites `callBlock` nodes whose opcodes the compiler understands into direct IR: math and
//! comparison operators become operator trees over numeric casts, variable and list accesses
//! become hoisted data references, argument reporters become parameter reads, and command tails
//! without control alternatives collapse into direct jumps. Everything else keeps its generic
//! call and its status check.

use blockvm_core::{CachedOp, CachedSequence, NamedRef, OpIdx, OpKind, Value, opcodes};
use fnv::FnvHashMap;
use std::rc::Rc;

use crate::ast::{AstArena, NodeId, NodeKind};
use crate::code::DataRef;
use crate::passes::build::PlanInfo;
use crate::transform::{PathContext, Visitor};

// INLINE OPERATORS PASS
// ================================================================================================

pub(crate) struct InlineOperators<'a> {
    seq: &'a CachedSequence,
    info: &'a PlanInfo,
    pub var_refs: Vec<DataRef>,
    pub list_refs: Vec<DataRef>,
    var_ids: FnvHashMap<Rc<str>, usize>,
    list_ids: FnvHashMap<Rc<str>, usize>,
}

impl<'a> InlineOperators<'a> {
    pub(crate) fn new(seq: &'a CachedSequence, info: &'a PlanInfo) -> Self {
        Self {
            seq,
            info,
            var_refs: Vec::new(),
            list_refs: Vec::new(),
            var_ids: FnvHashMap::default(),
            list_ids: FnvHashMap::default(),
        }
    }

    // BINDING TABLES
    // --------------------------------------------------------------------------------------------

    fn var_binding(&mut self, named: &NamedRef) -> usize {
        if let Some(idx) = self.var_ids.get(&named.id) {
            return *idx;
        }
        let idx = self.var_refs.len();
        self.var_refs.push(DataRef {
            id: named.id.clone(),
            name: named.name.clone(),
            cloud_check: true,
        });
        self.var_ids.insert(named.id.clone(), idx);
        idx
    }

    fn list_binding(&mut self, named: &NamedRef) -> usize {
        if let Some(idx) = self.list_ids.get(&named.id) {
            return *idx;
        }
        let idx = self.list_refs.len();
        self.list_refs.push(DataRef {
            id: named.id.clone(),
            name: named.name.clone(),
            cloud_check: false,
        });
        self.list_ids.insert(named.id.clone(), idx);
        idx
    }

    // EXPRESSION HELPERS
    // --------------------------------------------------------------------------------------------

    /// The expression for one argument of an op: a bundle read when the slot is written at run
    /// time, the folded constant otherwise.
    fn arg_expr(&self, arena: &mut AstArena, op: &CachedOp, op_index: u32, key: &str) -> NodeId {
        match op.args.position(key) {
            Some(slot) if self.info.is_dynamic(op_index, slot as u32) => {
                let bundle = arena.id(format!("a{op_index}"));
                let key = arena.string(key);
                arena.property(bundle, key)
            },
            Some(slot) => arena.nodeify(&op.args.slot(slot).clone()),
            None => arena.number(0.0),
        }
    }

    fn number_arg(&self, arena: &mut AstArena, op: &CachedOp, op_index: u32, key: &str) -> NodeId {
        let expr = self.arg_expr(arena, op, op_index, key);
        let expect = arena.id("toNumber");
        arena.cast(expect, expr)
    }

    fn boolean_arg(&self, arena: &mut AstArena, op: &CachedOp, op_index: u32, key: &str) -> NodeId {
        let expr = self.arg_expr(arena, op, op_index, key);
        let expect = arena.id("toBoolean");
        arena.cast(expect, expr)
    }

    fn compare_to_zero(
        &self,
        arena: &mut AstArena,
        op: &CachedOp,
        op_index: u32,
        operator: &str,
    ) -> NodeId {
        let lhs = self.arg_expr(arena, op, op_index, "OPERAND1");
        let rhs = self.arg_expr(arena, op, op_index, "OPERAND2");
        let func = arena.id("compare");
        let args = arena.array(&[lhs, rhs]);
        let call = arena.call_function(op_index, func, args);
        let zero = arena.number(0.0);
        arena.binary_operator(operator, call, zero)
    }

    fn named_field(op: &CachedOp, key: &str) -> Option<Rc<NamedRef>> {
        match op.args.get(key) {
            Some(Value::Named(named)) => Some(named.clone()),
            _ => None,
        }
    }

    // CALL BLOCK INLINING
    // --------------------------------------------------------------------------------------------

    fn inline_call_block(&mut self, ctx: &mut PathContext<'_>) {
        let node = ctx.node();
        let op_index = ctx.arena.op_index(node);
        let op = self.seq.op(OpIdx(op_index));
        if op.uses_promise {
            return;
        }

        let replacement = match &*op.opcode {
            "operator_add" | "operator_subtract" | "operator_multiply" | "operator_divide"
            | "operator_mod" => {
                let token = match &*op.opcode {
                    "operator_add" => "+",
                    "operator_subtract" => "-",
                    "operator_multiply" => "*",
                    "operator_divide" => "/",
                    _ => "%",
                };
                let lhs = self.number_arg(ctx.arena, op, op_index, "NUM1");
                let rhs = self.number_arg(ctx.arena, op, op_index, "NUM2");
                ctx.arena.binary_operator(token, lhs, rhs)
            },
            "operator_round" => {
                let value = self.number_arg(ctx.arena, op, op_index, "NUM");
                let expect = ctx.arena.id("round");
                ctx.arena.cast(expect, value)
            },
            "operator_mathop" => {
                let Some(expect) = mathop_name(&op.args.text("OPERATOR")) else { return };
                let value = self.number_arg(ctx.arena, op, op_index, "NUM");
                let expect = ctx.arena.id(expect);
                ctx.arena.cast(expect, value)
            },
            "operator_lt" => self.compare_to_zero(ctx.arena, op, op_index, "<"),
            "operator_gt" => self.compare_to_zero(ctx.arena, op, op_index, ">"),
            "operator_equals" => self.compare_to_zero(ctx.arena, op, op_index, "==="),
            "operator_and" | "operator_or" => {
                let token = if &*op.opcode == "operator_and" { "&&" } else { "||" };
                let lhs = self.boolean_arg(ctx.arena, op, op_index, "OPERAND1");
                let rhs = self.boolean_arg(ctx.arena, op, op_index, "OPERAND2");
                ctx.arena.binary_operator(token, lhs, rhs)
            },
            "operator_not" => {
                let value = self.boolean_arg(ctx.arena, op, op_index, "OPERAND");
                let expect = ctx.arena.id("not");
                ctx.arena.cast(expect, value)
            },
            "operator_join" => {
                let lhs = self.arg_expr(ctx.arena, op, op_index, "STRING1");
                let rhs = self.arg_expr(ctx.arena, op, op_index, "STRING2");
                let func = ctx.arena.id("join");
                let args = ctx.arena.array(&[lhs, rhs]);
                ctx.arena.call_function(op_index, func, args)
            },
            "operator_letter_of" => {
                let letter = self.number_arg(ctx.arena, op, op_index, "LETTER");
                let string = self.arg_expr(ctx.arena, op, op_index, "STRING");
                let func = ctx.arena.id("letterOf");
                let args = ctx.arena.array(&[letter, string]);
                ctx.arena.call_function(op_index, func, args)
            },
            "operator_length" => {
                let string = self.arg_expr(ctx.arena, op, op_index, "STRING");
                let func = ctx.arena.id("textLength");
                let args = ctx.arena.array(&[string]);
                ctx.arena.call_function(op_index, func, args)
            },
            "operator_contains" => {
                let lhs = self.arg_expr(ctx.arena, op, op_index, "STRING1");
                let rhs = self.arg_expr(ctx.arena, op, op_index, "STRING2");
                let func = ctx.arena.id("textContains");
                let args = ctx.arena.array(&[lhs, rhs]);
                ctx.arena.call_function(op_index, func, args)
            },
            opcodes::DATA_VARIABLE => {
                let Some(named) = Self::named_field(op, opcodes::VARIABLE_FIELD) else { return };
                let binding = self.var_binding(&named);
                let var = ctx.arena.id(format!("v{binding}"));
                let member = ctx.arena.string("value");
                ctx.arena.property(var, member)
            },
            opcodes::DATA_SET_VARIABLE_TO => {
                let Some(named) = Self::named_field(op, opcodes::VARIABLE_FIELD) else { return };
                let binding = self.var_binding(&named);
                let var = ctx.arena.id(format!("v{binding}"));
                let value = self.arg_expr(ctx.arena, op, op_index, "VALUE");
                let func = ctx.arena.id("setVar");
                let args = ctx.arena.array(&[var, value]);
                ctx.arena.call_function(op_index, func, args)
            },
            opcodes::DATA_CHANGE_VARIABLE_BY => {
                let Some(named) = Self::named_field(op, opcodes::VARIABLE_FIELD) else { return };
                let binding = self.var_binding(&named);
                let var = ctx.arena.id(format!("v{binding}"));
                let member = ctx.arena.string("value");
                let read = ctx.arena.property(var, member);
                let expect = ctx.arena.id("toNumber");
                let current = ctx.arena.cast(expect, read);
                let delta = self.number_arg(ctx.arena, op, op_index, "VALUE");
                let sum = ctx.arena.binary_operator("+", current, delta);
                let target = ctx.arena.id(format!("v{binding}"));
                let func = ctx.arena.id("setVar");
                let args = ctx.arena.array(&[target, sum]);
                ctx.arena.call_function(op_index, func, args)
            },
            opcodes::ARGUMENT_REPORTER_STRING_NUMBER | opcodes::ARGUMENT_REPORTER_BOOLEAN => {
                let name = op.args.text("VALUE");
                let name_node = ctx.arena.string(name);
                let default = if &*op.opcode == opcodes::ARGUMENT_REPORTER_BOOLEAN {
                    ctx.arena.boolean(false)
                } else {
                    ctx.arena.number(0.0)
                };
                let func = ctx.arena.id("getParam");
                let args = ctx.arena.array(&[name_node, default]);
                ctx.arena.call_function(op_index, func, args)
            },
            "data_itemoflist" => {
                let Some(named) = Self::named_field(op, opcodes::LIST_FIELD) else { return };
                let binding = self.list_binding(&named);
                let list = ctx.arena.id(format!("l{binding}"));
                let index = self.number_arg(ctx.arena, op, op_index, "INDEX");
                let func = ctx.arena.id("listItem");
                let args = ctx.arena.array(&[list, index]);
                ctx.arena.call_function(op_index, func, args)
            },
            "data_lengthoflist" => {
                let Some(named) = Self::named_field(op, opcodes::LIST_FIELD) else { return };
                let binding = self.list_binding(&named);
                let list = ctx.arena.id(format!("l{binding}"));
                let func = ctx.arena.id("listLength");
                let args = ctx.arena.array(&[list]);
                ctx.arena.call_function(op_index, func, args)
            },
            "data_listcontainsitem" => {
                let Some(named) = Self::named_field(op, opcodes::LIST_FIELD) else { return };
                let binding = self.list_binding(&named);
                let list = ctx.arena.id(format!("l{binding}"));
                let item = self.arg_expr(ctx.arena, op, op_index, "ITEM");
                let func = ctx.arena.id("listContains");
                let args = ctx.arena.array(&[list, item]);
                ctx.arena.call_function(op_index, func, args)
            },
            "data_addtolist" => {
                let Some(named) = Self::named_field(op, opcodes::LIST_FIELD) else { return };
                let binding = self.list_binding(&named);
                let list = ctx.arena.id(format!("l{binding}"));
                let item = self.arg_expr(ctx.arena, op, op_index, "ITEM");
                let func = ctx.arena.id("listAdd");
                let args = ctx.arena.array(&[list, item]);
                ctx.arena.call_function(op_index, func, args)
            },
            "data_deletealloflist" => {
                let Some(named) = Self::named_field(op, opcodes::LIST_FIELD) else { return };
                let binding = self.list_binding(&named);
                let list = ctx.arena.id(format!("l{binding}"));
                let func = ctx.arena.id("listDeleteAll");
                let args = ctx.arena.array(&[list]);
                ctx.arena.call_function(op_index, func, args)
            },
            "data_deleteoflist" => {
                let Some(named) = Self::named_field(op, opcodes::LIST_FIELD) else { return };
                let binding = self.list_binding(&named);
                let list = ctx.arena.id(format!("l{binding}"));
                let index = self.number_arg(ctx.arena, op, op_index, "INDEX");
                let func = ctx.arena.id("listDelete");
                let args = ctx.arena.array(&[list, index]);
                ctx.arena.call_function(op_index, func, args)
            },
            "data_replaceitemoflist" => {
                let Some(named) = Self::named_field(op, opcodes::LIST_FIELD) else { return };
                let binding = self.list_binding(&named);
                let list = ctx.arena.id(format!("l{binding}"));
                let index = self.number_arg(ctx.arena, op, op_index, "INDEX");
                let item = self.arg_expr(ctx.arena, op, op_index, "ITEM");
                let func = ctx.arena.id("listReplace");
                let args = ctx.arena.array(&[list, index, item]);
                ctx.arena.call_function(op_index, func, args)
            },
            _ => return,
        };
        ctx.replace_with(replacement);
    }

    // COMMAND TAIL REWRITES
    // --------------------------------------------------------------------------------------------

    /// Collapses a `vm_may_continue` into a direct jump when its command has no control
    /// alternatives: no branches, no hat report, and no procedure call that could redirect the
    /// stack between the command and its tail.
    fn rewrite_may_continue(&mut self, ctx: &mut PathContext<'_>) {
        let node = ctx.node();
        let func = ctx.arena.child(node, "func");
        if ctx.arena.text(func) != "vm_mayContinue" {
            return;
        }
        let op_index = ctx.arena.op_index(node);
        let op = self.seq.op(OpIdx(op_index));
        debug_assert!(op.kind == OpKind::MayContinue);

        let command = self.seq.op(op.command);
        let has_branches = command.branch_blocks.iter().any(|branch| branch.is_some());
        if command.is_hat || has_branches || &*command.opcode == opcodes::PROCEDURES_CALL {
            return;
        }

        let name = if op.next_stack.is_some() { "vm_advance" } else { "vm_sequenceEnd" };
        let func = ctx.arena.id(name);
        let args = ctx.arena.array(&[]);
        let replacement = ctx.arena.call_function(op_index, func, args);
        ctx.replace_with(replacement);
    }
}

impl Visitor for InlineOperators<'_> {
    fn exit(&mut self, ctx: &mut PathContext<'_>) {
        match ctx.kind() {
            NodeKind::CallBlock => self.inline_call_block(ctx),
            NodeKind::CallFunction => self.rewrite_may_continue(ctx),
            _ => {},
        }
    }
}

// MATHOP TABLE
// ================================================================================================

fn mathop_name(operator: &str) -> Option<&'static str> {
    Some(match operator {
        "abs" => "math_abs",
        "floor" => "math_floor",
        "ceiling" => "math_ceiling",
        "sqrt" => "math_sqrt",
        "sin" => "math_sin",
        "cos" => "math_cos",
        "tan" => "math_tan",
        "asin" => "math_asin",
        "acos" => "math_acos",
        "atan" => "math_atan",
        "ln" => "math_ln",
        "log" => "math_log",
        "e ^" => "math_exp",
        "10 ^" => "math_pow10",
        _ => return None,
    })
}
