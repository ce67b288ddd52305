//! Switch-dispatch executor for compiled sequences.
//!
//! Runs the bytecode the compiler lowered for one cached sequence. The program shares the
//! sequence's argument bundles and primitive handles, and every synthetic-op instruction funnels
//! into the dispatcher's shared implementations, so a compiled pass is observationally identical
//! to an interpreted one. Variable and list references are hoisted once per entry. Promise
//! suspension inside compiled code records the same resume state as the interpreter; re-entry
//! then falls back to the preserved interpretive plan.

use std::rc::Rc;

use blockvm_compiler::{BinOp, CompiledScript, Inst, UnOp};
use blockvm_core::{
    BlockUtility, CachedSequence, List, OpIdx, OpKind, PrimitiveResult, Value, Variable, cast,
    lookup_or_create_list, lookup_or_create_variable,
};

use crate::dispatch::{self, PlanExit};
use crate::runtime::Services;
use crate::thread::{Thread, ThreadStatus};
use crate::utility::Utility;

// EXECUTOR
// ================================================================================================

pub(crate) fn run(
    script: &CompiledScript,
    seq: &mut CachedSequence,
    thread: &mut Thread,
    services: &mut Services,
) -> PlanExit {
    let code = &script.code;

    // Hoisted data references: resolved against the running target once per entry, then reused.
    let vars: Vec<Rc<Variable>> = code
        .var_refs
        .iter()
        .map(|var| {
            lookup_or_create_variable(&thread.target, services.stage.as_ref(), &var.id, &var.name)
        })
        .collect();
    let lists: Vec<Rc<List>> = code
        .list_refs
        .iter()
        .map(|list| {
            lookup_or_create_list(&thread.target, services.stage.as_ref(), &list.id, &list.name)
        })
        .collect();

    let mut stack: Vec<Value> = Vec::with_capacity(8);
    let mut suspend_op: Option<OpIdx> = None;
    let mut sequence_end = false;
    let mut pc = 0usize;

    while pc < code.insts.len() {
        match &code.insts[pc] {
            Inst::PushConst(idx) => stack.push(code.consts[*idx as usize].clone()),
            Inst::PushArg { op, slot } => {
                stack.push(seq.op(OpIdx(*op)).args.slot(*slot as usize).clone())
            },
            Inst::PushVar(var) => stack.push(vars[*var as usize].get().clone()),
            Inst::SetVar(var) => {
                let value = stack.pop().unwrap_or_default();
                let var = &vars[*var as usize];
                var.set(value.clone());
                if var.is_cloud {
                    let mut util = Utility { thread: &mut *thread, services: &mut *services };
                    util.notify_cloud_change(&var.name, &value);
                }
            },
            Inst::PushParam { name, default } => {
                let name = cast::to_text(&code.consts[*name as usize]);
                let default = code.consts[*default as usize].clone();
                stack.push(thread.get_param_or(&name, default));
            },
            Inst::ListAdd(list) => {
                let value = stack.pop().unwrap_or_default();
                lists[*list as usize].push(value);
            },
            Inst::ListDelete(list) => {
                let index = cast::to_number(&stack.pop().unwrap_or_default());
                let items = &lists[*list as usize].items;
                let mut items = items.borrow_mut();
                let index = index as i64;
                if index >= 1 && (index as usize) <= items.len() {
                    items.remove(index as usize - 1);
                }
            },
            Inst::ListDeleteAll(list) => lists[*list as usize].items.borrow_mut().clear(),
            Inst::ListReplace(list) => {
                let value = stack.pop().unwrap_or_default();
                let index = cast::to_number(&stack.pop().unwrap_or_default()) as i64;
                let items = &lists[*list as usize].items;
                let mut items = items.borrow_mut();
                if index >= 1 && (index as usize) <= items.len() {
                    items[index as usize - 1] = value;
                }
            },
            Inst::PushListItem(list) => {
                let index = cast::to_number(&stack.pop().unwrap_or_default()) as i64;
                let items = lists[*list as usize].items.borrow();
                let value = if index >= 1 && (index as usize) <= items.len() {
                    items[index as usize - 1].clone()
                } else {
                    Value::text("")
                };
                stack.push(value);
            },
            Inst::PushListLength(list) => {
                stack.push(Value::Num(lists[*list as usize].len() as f64))
            },
            Inst::PushListContains(list) => {
                let needle = stack.pop().unwrap_or_default();
                let found = lists[*list as usize]
                    .items
                    .borrow()
                    .iter()
                    .any(|item| cast::compare(item, &needle).is_eq());
                stack.push(Value::Bool(found));
            },
            Inst::BinOp(op) => {
                let rhs = stack.pop().unwrap_or_default();
                let lhs = stack.pop().unwrap_or_default();
                stack.push(apply_bin(*op, lhs, rhs));
            },
            Inst::UnOp(op) => {
                let value = stack.pop().unwrap_or_default();
                stack.push(apply_un(*op, value));
            },
            Inst::StoreArg { op, slot } => {
                let value = stack.pop().unwrap_or_default();
                let idx = OpIdx(*op);
                if matches!(
                    seq.op(idx).kind,
                    OpKind::ReportStackClick | OpKind::ReportMonitor
                ) {
                    thread.report_value = Some(value.clone());
                }
                seq.op_mut(idx).args.set_slot(*slot as usize, value);
            },
            Inst::CallPrimitive { op } | Inst::CallCommand { op } => {
                let idx = OpIdx(*op);
                let pushes = matches!(&code.insts[pc], Inst::CallPrimitive { .. });
                let Some(func) = seq.op(idx).func.clone() else {
                    if pushes {
                        stack.push(Value::default());
                    }
                    pc += 1;
                    continue;
                };
                let result = {
                    let mut util = Utility { thread: &mut *thread, services: &mut *services };
                    func.call(&seq.op(idx).args, &mut util)
                };
                match result {
                    PrimitiveResult::Value(value) => {
                        dispatch::note_reported_value(seq, thread, idx, &value);
                        if pushes {
                            stack.push(value);
                        }
                    },
                    PrimitiveResult::Promise(promise) => {
                        thread.pending_promise = Some(promise);
                        thread
                            .set_status(ThreadStatus::PromiseWait, "primitive returned a thenable");
                        seq.op_mut(idx).uses_promise = true;
                        suspend_op = Some(idx);
                        if pushes {
                            stack.push(Value::default());
                        }
                    },
                    PrimitiveResult::Nothing => {
                        if pushes {
                            stack.push(Value::default());
                        }
                    },
                }
            },
            Inst::CastString { op } => dispatch::cast_string_op(seq, OpIdx(*op)),
            Inst::DoStack { op } => {
                let idx = OpIdx(*op);
                if let OpKind::DoStack { branch_num } = seq.op(idx).kind {
                    dispatch::do_stack_op(seq, thread, idx, branch_num);
                }
            },
            Inst::ReportHat { op } => {
                let idx = OpIdx(*op);
                if let OpKind::ReportHat { edge_activated } = seq.op(idx).kind {
                    dispatch::report_hat_op(seq, thread, services, idx, edge_activated);
                }
            },
            Inst::ReportStackClick { op } => {
                dispatch::report_click_op(seq, thread, services, OpIdx(*op))
            },
            Inst::ReportMonitor { op } => {
                dispatch::report_monitor_op(seq, thread, services, OpIdx(*op))
            },
            Inst::MayContinue { op } => {
                if dispatch::may_continue_op(seq, thread, OpIdx(*op)) {
                    sequence_end = true;
                }
            },
            Inst::Advance { op } => {
                let idx = OpIdx(*op);
                if !thread.blocks.force_no_glow() {
                    thread.last_block = seq.op(idx).expect_stack.clone();
                }
                if let Some(next) = seq.op(idx).next_stack.clone() {
                    thread.reuse_stack_for_next_block(next);
                }
            },
            Inst::SequenceEnd { op } => {
                let idx = OpIdx(*op);
                if !thread.blocks.force_no_glow() {
                    thread.last_block = seq.op(idx).expect_stack.clone();
                }
                thread.set_status(ThreadStatus::Interrupt, "sequence boundary");
                sequence_end = true;
            },
            Inst::CheckStatus => {
                if thread.status != ThreadStatus::Running {
                    break;
                }
            },
            Inst::Jump(target) => {
                pc = *target as usize;
                continue;
            },
            Inst::JumpIfFalse(target) => {
                let value = stack.pop().unwrap_or_default();
                if !cast::to_boolean(&value) {
                    pc = *target as usize;
                    continue;
                }
            },
            Inst::Pop => {
                stack.pop();
            },
            Inst::Retire => thread.retire(),
        }
        if thread.status == ThreadStatus::Done {
            break;
        }
        pc += 1;
    }

    if thread.status == ThreadStatus::Running && pc >= code.insts.len() {
        sequence_end = true;
    }
    PlanExit { completed_pass: false, sequence_end, suspend_op, wants_compile: false }
}

// VALUE OPERATIONS
// ================================================================================================

fn apply_bin(op: BinOp, lhs: Value, rhs: Value) -> Value {
    match op {
        BinOp::Add => Value::Num(cast::to_number(&lhs) + cast::to_number(&rhs)),
        BinOp::Sub => Value::Num(cast::to_number(&lhs) - cast::to_number(&rhs)),
        BinOp::Mul => Value::Num(cast::to_number(&lhs) * cast::to_number(&rhs)),
        BinOp::Div => Value::Num(cast::to_number(&lhs) / cast::to_number(&rhs)),
        BinOp::Mod => Value::Num(cast::modulo(cast::to_number(&lhs), cast::to_number(&rhs))),
        BinOp::Compare => Value::Num(match cast::compare(&lhs, &rhs) {
            std::cmp::Ordering::Less => -1.0,
            std::cmp::Ordering::Equal => 0.0,
            std::cmp::Ordering::Greater => 1.0,
        }),
        BinOp::Lt => Value::Bool(cast::to_number(&lhs) < cast::to_number(&rhs)),
        BinOp::Gt => Value::Bool(cast::to_number(&lhs) > cast::to_number(&rhs)),
        BinOp::Eq => Value::Bool(cast::to_number(&lhs) == cast::to_number(&rhs)),
        BinOp::And => Value::Bool(cast::to_boolean(&lhs) && cast::to_boolean(&rhs)),
        BinOp::Or => Value::Bool(cast::to_boolean(&lhs) || cast::to_boolean(&rhs)),
        BinOp::Join => Value::from(format!("{}{}", cast::to_text(&lhs), cast::to_text(&rhs))),
        BinOp::LetterOf => {
            let index = cast::to_number(&lhs) as i64;
            let text = cast::to_text(&rhs);
            let letter = if index >= 1 {
                text.chars().nth(index as usize - 1).map(|c| c.to_string())
            } else {
                None
            };
            Value::from(letter.unwrap_or_default())
        },
        BinOp::TextContains => {
            let haystack = cast::to_text(&lhs).to_lowercase();
            let needle = cast::to_text(&rhs).to_lowercase();
            Value::Bool(haystack.contains(&needle))
        },
    }
}

fn apply_un(op: UnOp, value: Value) -> Value {
    let n = || cast::to_number(&value);
    match op {
        UnOp::ToNumber => Value::Num(cast::to_number(&value)),
        UnOp::ToBoolean => Value::Bool(cast::to_boolean(&value)),
        UnOp::ToText => Value::from(cast::to_text(&value)),
        UnOp::Not => Value::Bool(!cast::to_boolean(&value)),
        UnOp::Round => Value::Num(cast::round_half_up(n())),
        UnOp::Abs => Value::Num(cast::mathop("abs", n())),
        UnOp::Floor => Value::Num(cast::mathop("floor", n())),
        UnOp::Ceiling => Value::Num(cast::mathop("ceiling", n())),
        UnOp::Sqrt => Value::Num(cast::mathop("sqrt", n())),
        UnOp::Sin => Value::Num(cast::mathop("sin", n())),
        UnOp::Cos => Value::Num(cast::mathop("cos", n())),
        UnOp::Tan => Value::Num(cast::mathop("tan", n())),
        UnOp::Asin => Value::Num(cast::mathop("asin", n())),
        UnOp::Acos => Value::Num(cast::mathop("acos", n())),
        UnOp::Atan => Value::Num(cast::mathop("atan", n())),
        UnOp::Ln => Value::Num(cast::mathop("ln", n())),
        UnOp::Log => Value::Num(cast::mathop("log", n())),
        UnOp::Exp => Value::Num(cast::mathop("e ^", n())),
        UnOp::Pow10 => Value::Num(cast::mathop("10 ^", n())),
        UnOp::TextLength => Value::Num(cast::to_text(&value).chars().count() as f64),
    }
}
