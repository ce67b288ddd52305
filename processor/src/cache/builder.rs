//! Flattens one straight-line sequence of commands into a [`CachedSequence`].
//!
//! Inputs are visited post-order, so every child op lands in the plan before the op that
//! consumes its report. Shadow inputs fold into argument bundles at build time (with numeric
//! canonicalization); broadcast inputs resolve eagerly when static and go through a synthesized
//! string-cast op when dynamic. Command blocks grow their synthetic tails here: a hat report,
//! zero or more `vm_do_stack` ops, and the `vm_may_continue` that drives chain control flow.

use std::rc::Rc;

use blockvm_core::{
    ArgValues, Block, BlockContainer, BlockId, CachedOp, CachedSequence, CommandSpan, Input,
    OpIdx, OpKind, OpcodeInterner, PrimitiveRegistry, Value, cast, opcodes,
};

// ENTRY
// ================================================================================================

pub(super) fn build_sequence(
    first: BlockId,
    blocks: &dyn BlockContainer,
    registry: &dyn PrimitiveRegistry,
    interner: &mut OpcodeInterner,
) -> Option<CachedSequence> {
    blocks.get_block(&first)?;

    let mut builder = Builder { blocks, registry, interner, seq: CachedSequence::default() };
    builder.seq.first_block = first.clone();

    let lone = blocks.get_next_block(&first).is_none();
    let mut current = Some(first);
    let mut first_command = true;
    while let Some(id) = current {
        match builder.blocks.get_block(&id) {
            Some(block) => {
                current = block.next.clone();
                builder.build_command(&block, first_command && lone);
            },
            None => {
                builder.push_null(id, None, None);
                current = None;
            },
        }
        first_command = false;
    }

    builder.finalize();
    Some(builder.seq)
}

// BUILDER
// ================================================================================================

struct Builder<'a> {
    blocks: &'a dyn BlockContainer,
    registry: &'a dyn PrimitiveRegistry,
    interner: &'a mut OpcodeInterner,
    seq: CachedSequence,
}

impl Builder<'_> {
    // ARENA HELPERS
    // --------------------------------------------------------------------------------------------

    fn alloc(&mut self, op: CachedOp) -> OpIdx {
        let idx = OpIdx(self.seq.ops.len() as u32);
        self.seq.ops.push(op);
        idx
    }

    fn push_plan(&mut self, idx: OpIdx) {
        self.seq.ops[idx.as_usize()].plan_pos = self.seq.plan.len() as u32;
        self.seq.plan.push(idx);
    }

    fn synthetic(&mut self, id: BlockId, opcode: &str, kind: OpKind) -> CachedOp {
        let opcode_id = self.interner.intern(opcode);
        CachedOp::synthetic(id, opcode, opcode_id, kind)
    }

    /// Wires `child`'s report into `parent`'s bundle under `key`.
    fn wire_parent(&mut self, child: OpIdx, parent: OpIdx, key: &str) {
        let slot = self.seq.ops[parent.as_usize()].args.ensure(key) as u32;
        let child = &mut self.seq.ops[child.as_usize()];
        child.parent = Some(parent);
        child.parent_key = Some(Rc::from(key));
        child.parent_slot = slot;
    }

    // COMMANDS
    // --------------------------------------------------------------------------------------------

    fn build_command(&mut self, block: &Block, lone: bool) {
        let plan_start = self.seq.plan.len() as u32;
        let opcode_id = self.interner.intern(&block.opcode);
        let func = self.registry.get_opcode_function(&block.opcode);
        let is_hat = self.registry.get_is_hat(&block.opcode);
        let defined = func.is_some();

        let mut op = CachedOp::synthetic(
            block.id.clone(),
            &block.opcode,
            opcode_id,
            if defined { OpKind::Primitive } else { OpKind::Undefined },
        );
        op.func = func;
        op.defined = defined;
        op.is_hat = is_hat;
        op.next = block.next.clone();
        op.branch_blocks = block.branches.clone();
        let cmd = self.alloc(op);
        self.seq.ops[cmd.as_usize()].command = cmd;

        self.fill_fields(cmd, block);
        for (name, input) in &block.inputs {
            self.build_input(cmd, cmd, name, input);
        }
        self.push_plan(cmd);

        if is_hat {
            let edge_activated = self.registry.get_is_edge_activated_hat(&block.opcode);
            let mut report = self.synthetic(
                block.id.clone(),
                opcodes::VM_REPORT_HAT,
                OpKind::ReportHat { edge_activated },
            );
            report.command = cmd;
            let report = self.alloc(report);
            self.wire_parent(cmd, report, "VALUE");
            self.push_plan(report);
        } else if lone {
            // A single top-level block may be a clicked or monitored reporter; the tails gate on
            // thread flags at run time.
            let mut click = self.synthetic(
                block.id.clone(),
                opcodes::VM_REPORT_STACK_CLICK,
                OpKind::ReportStackClick,
            );
            click.command = cmd;
            let click = self.alloc(click);
            self.wire_parent(cmd, click, "VALUE");
            self.push_plan(click);

            let mut monitor = self.synthetic(
                block.id.clone(),
                opcodes::VM_REPORT_MONITOR,
                OpKind::ReportMonitor,
            );
            monitor.command = cmd;
            let monitor = self.alloc(monitor);
            self.push_plan(monitor);
        }

        for branch_num in 1..=branch_op_count(block) {
            let mut do_stack = self.synthetic(
                block.id.clone(),
                opcodes::VM_DO_STACK,
                OpKind::DoStack { branch_num },
            );
            do_stack.branch_blocks = block.branches.clone();
            do_stack.command = cmd;
            let do_stack = self.alloc(do_stack);
            self.push_plan(do_stack);
        }

        let mut tail =
            self.synthetic(block.id.clone(), opcodes::VM_MAY_CONTINUE, OpKind::MayContinue);
        tail.expect_stack = Some(block.id.clone());
        tail.next_stack = block.next.clone();
        tail.command = cmd;
        let tail = self.alloc(tail);
        self.push_plan(tail);

        self.seq.commands.push(CommandSpan {
            block: block.id.clone(),
            op: cmd,
            plan_start,
            plan_end: self.seq.plan.len() as u32,
        });
    }

    // FIELDS
    // --------------------------------------------------------------------------------------------

    fn fill_fields(&mut self, op: OpIdx, block: &Block) {
        let mut args = ArgValues::new();
        for (name, field) in &block.fields {
            let is_data_ref = matches!(
                &**name,
                opcodes::VARIABLE_FIELD | opcodes::LIST_FIELD | opcodes::BROADCAST_OPTION
            ) || field.id.is_some();
            let value = if is_data_ref {
                let id = field.id.as_deref().unwrap_or("");
                Value::named(id, cast::to_text(&field.value))
            } else {
                field.value.clone()
            };
            args.set(name, value);
        }
        args.mutation = block.mutation.clone();
        self.seq.ops[op.as_usize()].args = args;
    }

    // INPUTS
    // --------------------------------------------------------------------------------------------

    fn build_input(&mut self, cmd: OpIdx, parent: OpIdx, name: &str, input: &Input) {
        if name == opcodes::BROADCAST_INPUT {
            self.build_broadcast_input(cmd, parent, input);
            return;
        }
        let Some(child_id) = input.block.clone() else { return };
        if input.shadow.as_ref() == Some(&child_id) {
            self.build_shadow(parent, name, child_id);
        } else {
            self.build_reporter(cmd, parent, name, child_id);
        }
    }

    /// A pure shadow folds its (canonicalized) value into the parent bundle and records an
    /// order-independent shadow op; a shadow with inputs degrades to a reporter.
    fn build_shadow(&mut self, parent: OpIdx, name: &str, id: BlockId) {
        let Some(block) = self.blocks.get_block(&id) else {
            self.push_null(id, Some(parent), Some(name));
            return;
        };
        let Some(value) = shadow_static_value(&block) else {
            let cmd = self.seq.ops[parent.as_usize()].command;
            self.build_reporter(cmd, parent, name, id);
            return;
        };
        self.seq.ops[parent.as_usize()].args.set(name, value.clone());
        let mut shadow = self.synthetic(id, &block.opcode, OpKind::Shadow);
        shadow.is_shadow = true;
        shadow.shadow_value = Some(value);
        shadow.command = self.seq.ops[parent.as_usize()].command;
        let shadow = self.alloc(shadow);
        self.wire_parent(shadow, parent, name);
        self.seq.shadow_ops.push(shadow);
    }

    fn build_reporter(&mut self, cmd: OpIdx, parent: OpIdx, name: &str, id: BlockId) {
        let Some(block) = self.blocks.get_block(&id) else {
            self.push_null(id, Some(parent), Some(name));
            return;
        };
        if self.registry.get_is_hat(&block.opcode) {
            return;
        }
        let opcode_id = self.interner.intern(&block.opcode);
        let func = self.registry.get_opcode_function(&block.opcode);
        let defined = func.is_some();

        let mut op = CachedOp::synthetic(
            id.clone(),
            &block.opcode,
            opcode_id,
            if defined { OpKind::Primitive } else { OpKind::Undefined },
        );
        op.func = func;
        op.defined = defined;
        op.command = cmd;
        let op = self.alloc(op);
        self.fill_fields(op, &block);
        self.wire_parent(op, parent, name);

        if defined {
            for (input_name, input) in &block.inputs {
                self.build_input(cmd, op, input_name, input);
            }
        } else if let Some(value) = shadow_static_value(&block) {
            // An unknown opcode acts as a holder reporting its static value.
            self.seq.ops[parent.as_usize()].args.set(name, value.clone());
            self.seq.ops[op.as_usize()].shadow_value = Some(value);
        }

        self.push_plan(op);
    }

    /// A broadcast input resolves eagerly when its shadow menu is static; a plugged reporter
    /// goes through a synthesized string cast that reports an `{id, name}` bundle.
    fn build_broadcast_input(&mut self, cmd: OpIdx, parent: OpIdx, input: &Input) {
        let dynamic = match (&input.block, &input.shadow) {
            (Some(block), Some(shadow)) => block != shadow,
            (Some(_), None) => true,
            _ => false,
        };
        if !dynamic {
            let Some(menu_id) = input.block.clone().or_else(|| input.shadow.clone()) else {
                return;
            };
            let Some(menu) = self.blocks.get_block(&menu_id) else {
                self.push_null(menu_id, Some(parent), Some(opcodes::BROADCAST_INPUT));
                return;
            };
            if let Some(field) = menu.field(opcodes::BROADCAST_OPTION) {
                let id = field.id.as_deref().unwrap_or("");
                let named = Value::named(id, cast::to_text(&field.value));
                self.seq.ops[parent.as_usize()].args.set(opcodes::BROADCAST_INPUT, named);
            }
            return;
        }

        let child_id = input.block.clone().expect("dynamic broadcast input has a block");
        let mut cast_op = self.synthetic(
            child_id.clone(),
            opcodes::VM_CAST_STRING,
            OpKind::CastString,
        );
        cast_op.command = cmd;
        let cast_op = self.alloc(cast_op);
        self.wire_parent(cast_op, parent, opcodes::BROADCAST_INPUT);
        self.build_reporter(cmd, cast_op, "VALUE", child_id);
        self.push_plan(cast_op);
    }

    /// A lookup miss substitutes an op that retires the thread when executed.
    fn push_null(&mut self, id: BlockId, parent: Option<OpIdx>, key: Option<&str>) {
        let mut op = self.synthetic(id, opcodes::VM_NULL, OpKind::Null);
        op.defined = false;
        let op = self.alloc(op);
        if let (Some(parent), Some(key)) = (parent, key) {
            self.wire_parent(op, parent, key);
        }
        self.push_plan(op);
    }

    // FINALIZE
    // --------------------------------------------------------------------------------------------

    fn finalize(&mut self) {
        let positions: Vec<Option<u32>> = self
            .seq
            .ops
            .iter()
            .map(|op| {
                if op.is_shadow {
                    None
                } else {
                    Some(op.plan_pos)
                }
            })
            .collect();
        for op in self.seq.ops.iter_mut() {
            let Some(parent) = op.parent else { continue };
            if op.is_shadow {
                continue;
            }
            if let Some(parent_pos) = positions[parent.as_usize()] {
                op.parent_offset = parent_pos.saturating_sub(op.plan_pos + 1);
            }
        }
    }
}

// STATIC SHADOW VALUES
// ================================================================================================

/// The folded value of a shadow-like block: its first field, canonicalized, provided it has no
/// inputs of its own.
fn shadow_static_value(block: &Block) -> Option<Value> {
    if !block.inputs.is_empty() {
        return None;
    }
    match block.fields.first() {
        Some((_, field)) => match &field.value {
            Value::Str(s) => Some(cast::canonicalize_shadow_text(s)),
            other => Some(other.clone()),
        },
        None => Some(Value::text("")),
    }
}

/// How many `vm_do_stack` tail ops a command needs: one per authored branch, with known control
/// opcodes keeping their arity even when a branch socket is empty.
fn branch_op_count(block: &Block) -> u8 {
    let authored = block.branches.iter().filter(|branch| branch.is_some()).count() as u8;
    let known = match &*block.opcode {
        "control_forever" | "control_repeat" | "control_repeat_until" | "control_while"
        | "control_if" => 1,
        "control_if_else" => 2,
        _ => 0,
    };
    authored.max(known)
}
