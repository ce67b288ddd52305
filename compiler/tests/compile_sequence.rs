//! End-to-end compilation of a hand-built cached sequence.

use std::rc::Rc;

use blockvm_compiler::{CompileError, Inst, compile};
use blockvm_core::{CachedOp, CachedSequence, CommandSpan, OpIdx, OpKind, OpcodeInterner, Value};

fn set_variable_sequence() -> CachedSequence {
    let mut interner = OpcodeInterner::new();
    let block: Rc<str> = Rc::from("b1");

    let mut cmd = CachedOp::synthetic(
        block.clone(),
        "data_setvariableto",
        interner.intern("data_setvariableto"),
        OpKind::Primitive,
    );
    cmd.command = OpIdx(0);
    cmd.plan_pos = 0;
    cmd.args.set("VARIABLE", Value::named("v1", "score"));
    cmd.args.set("VALUE", Value::Num(10.0));

    let mut tail = CachedOp::synthetic(
        block.clone(),
        "vm_may_continue",
        interner.intern("vm_may_continue"),
        OpKind::MayContinue,
    );
    tail.command = OpIdx(0);
    tail.plan_pos = 1;
    tail.expect_stack = Some(block.clone());
    tail.next_stack = None;

    let mut seq = CachedSequence::default();
    seq.first_block = block.clone();
    seq.ops = vec![cmd, tail];
    seq.plan = vec![OpIdx(0), OpIdx(1)];
    seq.commands = vec![CommandSpan { block, op: OpIdx(0), plan_start: 0, plan_end: 2 }];
    seq
}

#[test]
fn set_variable_lowers_to_inlined_bytecode() {
    let seq = set_variable_sequence();
    let script = compile(&seq, "b1").unwrap();

    // The variable write inlined: no primitive call remains, the reference is hoisted, and the
    // command tail collapsed to a direct sequence end.
    assert_eq!(script.code.var_refs.len(), 1);
    assert_eq!(&*script.code.var_refs[0].id, "v1");
    assert_eq!(&*script.code.var_refs[0].name, "score");
    assert_eq!(
        script.code.insts,
        vec![
            Inst::PushConst(0),
            Inst::SetVar(0),
            Inst::SequenceEnd { op: 1 },
            Inst::CheckStatus,
        ]
    );
    assert_eq!(script.code.consts[0], Value::Num(10.0));
}

#[test]
fn printed_factory_body_is_mangled_and_named() {
    let seq = set_variable_sequence();
    let script = compile(&seq, "b1").unwrap();

    assert!(script.source.starts_with("function factory_b1(bindings)"));
    assert!(script.source.contains("return function b1()"));
    // Bindings dereference through short mangled names.
    assert!(script.source.contains("= bindings.thread;"));
}

#[test]
fn empty_plans_do_not_compile() {
    let seq = CachedSequence::default();
    assert!(matches!(compile(&seq, "none"), Err(CompileError::EmptyPlan)));
}
