//! Shared test plumbing: a tracing registry wrapper and block-graph builders.

use std::cell::RefCell;
use std::rc::Rc;

use blockvm_core::{
    Block, PrimitiveFn, PrimitiveRegistry, PrimitiveResult, Primitives, Target, cast,
    testing::TestBlocks,
};

use crate::primitives::builtin_registry;

pub(crate) type Trace = Rc<RefCell<Vec<String>>>;

// TRACED REGISTRY
// ================================================================================================

/// Wraps every registered primitive so each invocation records its opcode, arguments, and
/// outcome. The wrapper is applied at cache-build time, exactly where the real registry hands
/// out functions.
pub(crate) struct TracedRegistry {
    inner: Primitives,
    pub trace: Trace,
}

impl TracedRegistry {
    pub(crate) fn new() -> Self {
        Self { inner: builtin_registry(), trace: Rc::new(RefCell::new(Vec::new())) }
    }

    pub(crate) fn with_extra(extend: impl FnOnce(&mut Primitives)) -> Self {
        let mut inner = builtin_registry();
        extend(&mut inner);
        Self { inner, trace: Rc::new(RefCell::new(Vec::new())) }
    }
}

impl PrimitiveRegistry for TracedRegistry {
    fn get_opcode_function(&self, opcode: &str) -> Option<PrimitiveFn> {
        let func = self.inner.get_opcode_function(opcode)?;
        let trace = self.trace.clone();
        let opcode: Rc<str> = Rc::from(opcode);
        Some(PrimitiveFn::new(move |args, util| {
            let result = func.call(args, util);
            let rendered: Vec<String> =
                args.iter().map(|(key, value)| format!("{key}:{}", cast::to_text(value))).collect();
            let outcome = match &result {
                PrimitiveResult::Value(value) => cast::to_text(value),
                PrimitiveResult::Promise(_) => "<promise>".to_string(),
                PrimitiveResult::Nothing => "<none>".to_string(),
            };
            trace.borrow_mut().push(format!("{opcode}({})={outcome}", rendered.join(",")));
            result
        }))
    }

    fn get_is_hat(&self, opcode: &str) -> bool {
        self.inner.get_is_hat(opcode)
    }

    fn get_is_edge_activated_hat(&self, opcode: &str) -> bool {
        self.inner.get_is_edge_activated_hat(opcode)
    }
}

// GRAPH BUILDERS
// ================================================================================================

pub(crate) fn shadow_num(blocks: &mut TestBlocks, id: &str, text: &str) {
    blocks.add(Block::new(id, "math_number").with_field("NUM", text));
}

pub(crate) fn shadow_text(blocks: &mut TestBlocks, id: &str, text: &str) {
    blocks.add(Block::new(id, "text").with_field("TEXT", text));
}

/// `operator_add(3, operator_multiply(4, 5))` as a lone top-level reporter.
pub(crate) fn arithmetic_blocks() -> TestBlocks {
    let mut blocks = TestBlocks::new();
    blocks.add(
        Block::new("add", "operator_add")
            .with_shadow_input("NUM1", "n3")
            .with_block_input("NUM2", "mul"),
    );
    shadow_num(&mut blocks, "n3", "3");
    blocks.add(
        Block::new("mul", "operator_multiply")
            .with_shadow_input("NUM1", "n4")
            .with_shadow_input("NUM2", "n5"),
    );
    shadow_num(&mut blocks, "n4", "4");
    shadow_num(&mut blocks, "n5", "5");
    blocks
}

/// `set x to 0; repeat (times) { change x by 1 }`.
pub(crate) fn counting_loop_blocks(times: &str) -> TestBlocks {
    let mut blocks = TestBlocks::new();
    blocks.add(
        Block::new("set", "data_setvariableto")
            .with_ref_field("VARIABLE", "varx", "x")
            .with_shadow_input("VALUE", "zero")
            .with_next("rep"),
    );
    shadow_num(&mut blocks, "zero", "0");
    blocks.add(
        Block::new("rep", "control_repeat")
            .with_shadow_input("TIMES", "times")
            .with_branch(1, "chg"),
    );
    shadow_num(&mut blocks, "times", times);
    blocks.add(
        Block::new("chg", "data_changevariableby")
            .with_ref_field("VARIABLE", "varx", "x")
            .with_shadow_input("VALUE", "one"),
    );
    shadow_num(&mut blocks, "one", "1");
    blocks
}

pub(crate) fn sprite() -> Rc<Target> {
    Target::new("sprite", false)
}

/// Steps the runtime until every thread has finished, with a frame cap.
pub(crate) fn run_to_completion(rt: &mut crate::Runtime) {
    for _ in 0..200 {
        if rt.thread_count() == 0 {
            return;
        }
        rt.step_threads();
    }
    panic!("threads did not finish within the frame cap");
}

pub(crate) fn variable_number(target: &Rc<Target>, id: &str) -> f64 {
    target.variable(id).map(|var| cast::to_number(&var.get())).unwrap_or(f64::NAN)
}
