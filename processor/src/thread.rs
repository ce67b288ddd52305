use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use blockvm_core::{
    BlockContainer, BlockId, Promise, Target, Value, opcodes,
};
use fnv::FnvHashMap;

use crate::cache::ContainerId;

// THREAD STATUS
// ================================================================================================

/// Execution status of one thread. Transitions are cooperative: primitives and the dispatcher
/// move a thread out of `Running`; the sequencer and promise settlement move it back.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ThreadStatus {
    Running,
    /// Parked on an unsettled promise.
    PromiseWait,
    /// Yielded: other threads run, this one resumes within the same frame.
    Yield,
    /// Yielded until the next frame.
    YieldTick,
    /// Stopped at a potential block boundary; cleared to `Running` by the dispatcher in
    /// continuous mode.
    Interrupt,
    Done,
}

// STACK FRAME
// ================================================================================================

/// Per-stack-level execution context. Frames are pool-recycled: release resets every field and
/// parks the box on a freelist, so a recycled frame is indistinguishable from a fresh one.
#[derive(Debug, Default)]
pub struct StackFrame {
    pub warp_mode: bool,
    pub is_loop: bool,
    /// Set on frames pushed by a procedure call; used for recursion detection and script stops.
    pub proccode: Option<Rc<str>>,
    pub params: Option<FnvHashMap<Rc<str>, Value>>,
    pub execution_context: Option<FnvHashMap<Rc<str>, Value>>,
    pub waiting_reporter: bool,
}

impl StackFrame {
    fn reset(&mut self) {
        self.warp_mode = false;
        self.is_loop = false;
        self.proccode = None;
        self.params = None;
        self.execution_context = None;
        self.waiting_reporter = false;
    }

    /// Reset that survives a stack-entry reuse: warp mode carries over to the next block.
    fn reset_for_reuse(&mut self) {
        let warp = self.warp_mode;
        self.reset();
        self.warp_mode = warp;
    }
}

// FRAME POOL
// ================================================================================================

thread_local! {
    static FRAME_POOL: RefCell<Vec<Box<StackFrame>>> = const { RefCell::new(Vec::new()) };
}

fn create_frame() -> Box<StackFrame> {
    FRAME_POOL.with(|pool| pool.borrow_mut().pop()).unwrap_or_default()
}

fn release_frame(mut frame: Box<StackFrame>) {
    frame.reset();
    FRAME_POOL.with(|pool| pool.borrow_mut().push(frame));
}

// THREAD
// ================================================================================================

/// A branch-entry request recorded by a control primitive and consumed by the command's
/// `vm_do_stack` tail op.
#[derive(Copy, Clone, Debug)]
pub struct BranchRequest {
    pub branch_num: u8,
    pub is_loop: bool,
}

/// One cooperative thread: a stack of block ids with parallel stack frames, plus the promise and
/// reporter recovery state the dispatcher maintains.
pub struct Thread {
    pub top_block: BlockId,
    pub target: Rc<Target>,
    pub blocks: Rc<dyn BlockContainer>,
    pub container_id: ContainerId,
    pub status: ThreadStatus,
    /// In continuous mode the dispatcher clears `Interrupt` and trampolines across command
    /// boundaries without returning to the sequencer.
    pub continuous: bool,
    pub stack_click: bool,
    pub update_monitor: bool,
    pub killed: bool,

    stack: Vec<BlockId>,
    frames: Vec<Box<StackFrame>>,

    // Reporter recovery across a promise suspension.
    pub reporting: Option<BlockId>,
    pub reported: Option<Vec<(BlockId, Value)>>,
    pub just_reported: Option<Value>,
    pub pending_promise: Option<Promise>,

    pub pending_branch: Option<BranchRequest>,
    /// Set when a sequence boundary must re-enter a loop command instead of advancing.
    pub pending_loop_reentry: bool,
    /// Set when execution must resume just past the top command's tail (a stopped script left
    /// its `procedures_call` on top).
    pub pending_resume_after_top: bool,
    /// The value most recently reported toward a report tail op.
    pub report_value: Option<Value>,

    pub warp_started: Option<Instant>,
    pub last_block: Option<BlockId>,
}

impl Thread {
    pub fn new(
        top_block: BlockId,
        target: Rc<Target>,
        blocks: Rc<dyn BlockContainer>,
        container_id: ContainerId,
    ) -> Self {
        let mut thread = Self {
            top_block: top_block.clone(),
            target,
            blocks,
            container_id,
            status: ThreadStatus::Running,
            continuous: true,
            stack_click: false,
            update_monitor: false,
            killed: false,
            stack: Vec::new(),
            frames: Vec::new(),
            reporting: None,
            reported: None,
            just_reported: None,
            pending_promise: None,
            pending_branch: None,
            pending_loop_reentry: false,
            pending_resume_after_top: false,
            report_value: None,
            warp_started: None,
            last_block: None,
        };
        thread.push_stack(top_block);
        thread
    }

    // STACK OPERATIONS
    // --------------------------------------------------------------------------------------------

    /// Pushes a block onto the stack with a fresh frame inheriting the parent's warp mode.
    pub fn push_stack(&mut self, block_id: BlockId) {
        let parent_warp = self.frames.last().map(|frame| frame.warp_mode).unwrap_or(false);
        self.stack.push(block_id);
        let mut frame = create_frame();
        frame.warp_mode = parent_warp;
        self.frames.push(frame);
    }

    /// Replaces the top stack entry in place, resetting its frame but preserving warp mode.
    pub fn reuse_stack_for_next_block(&mut self, block_id: BlockId) {
        debug_assert!(!self.stack.is_empty());
        if let Some(top) = self.stack.last_mut() {
            *top = block_id;
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.reset_for_reuse();
        }
    }

    pub fn pop_stack(&mut self) -> Option<BlockId> {
        if let Some(frame) = self.frames.pop() {
            release_frame(frame);
        }
        self.stack.pop()
    }

    pub fn peek_stack(&self) -> Option<&BlockId> {
        self.stack.last()
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    pub fn stack_is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn peek_frame(&self) -> Option<&StackFrame> {
        self.frames.last().map(|frame| &**frame)
    }

    pub fn peek_frame_mut(&mut self) -> Option<&mut StackFrame> {
        self.frames.last_mut().map(|frame| &mut **frame)
    }

    /// Pops frames until a procedure call block is on top. An emptied stack marks the thread
    /// done.
    pub fn stop_this_script(&mut self) {
        loop {
            let Some(top) = self.peek_stack() else {
                self.set_status(ThreadStatus::Done, "stop script emptied the stack");
                return;
            };
            let is_call = self
                .blocks
                .get_block(top)
                .map(|block| &*block.opcode == opcodes::PROCEDURES_CALL)
                .unwrap_or(false);
            if is_call {
                return;
            }
            self.pop_stack();
        }
    }

    /// Retires the thread: unwinds the whole stack and marks it done.
    pub fn retire(&mut self) {
        while self.pop_stack().is_some() {}
        self.set_status(ThreadStatus::Done, "retired");
    }

    // PARAMETERS
    // --------------------------------------------------------------------------------------------

    pub fn init_params(&mut self) {
        if let Some(frame) = self.peek_frame_mut() {
            if frame.params.is_none() {
                frame.params = Some(FnvHashMap::default());
            }
        }
    }

    pub fn push_param(&mut self, name: &str, value: Value) {
        self.init_params();
        if let Some(frame) = self.peek_frame_mut() {
            if let Some(params) = frame.params.as_mut() {
                params.insert(Rc::from(name), value);
            }
        }
    }

    /// Scoped lookup: the nearest enclosing frame that carries params answers; a missing binding
    /// there (or no params anywhere) answers `0`.
    pub fn get_param(&self, name: &str) -> Value {
        self.get_param_or(name, Value::Num(0.0))
    }

    /// [`get_param`](Self::get_param) with a caller-chosen fallback.
    pub fn get_param_or(&self, name: &str, default: Value) -> Value {
        for frame in self.frames.iter().rev() {
            let Some(params) = frame.params.as_ref() else { continue };
            return params.get(name).cloned().unwrap_or(default);
        }
        default
    }

    /// Stores a reported value for the frame resuming after a promise.
    pub fn push_reported_value(&mut self, value: Value) {
        self.just_reported = Some(value);
    }

    /// Looks up to five stack levels back for a call to the same procedure. Stack entries (not
    /// frames) carry the evidence: a frame is reset whenever its entry is reused for the next
    /// block of a chain, while the calling block's entry stays put underneath.
    pub fn is_recursive_call(&self, proccode: &str) -> bool {
        for id in self.stack.iter().rev().skip(1).take(5) {
            let Some(block) = self.blocks.get_block(id) else { continue };
            if &*block.opcode == opcodes::PROCEDURES_CALL
                && block.mutation.as_ref().and_then(|m| m.proccode.as_deref()) == Some(proccode)
            {
                return true;
            }
        }
        false
    }

    // STATUS
    // --------------------------------------------------------------------------------------------

    pub fn set_status(&mut self, status: ThreadStatus, reason: &'static str) {
        if self.status != status {
            tracing::trace!(from = ?self.status, to = ?status, reason, "thread status");
            self.status = status;
        }
    }

    pub fn warp_elapsed_ms(&self) -> f64 {
        self.warp_started.map(|start| start.elapsed().as_secs_f64() * 1e3).unwrap_or(0.0)
    }

    pub fn in_warp_mode(&self) -> bool {
        self.peek_frame().map(|frame| frame.warp_mode).unwrap_or(false)
    }
}

// TESTS
// ================================================================================================

#[cfg(test)]
mod tests {
    use blockvm_core::testing::TestBlocks;

    use super::*;

    fn test_thread() -> Thread {
        let blocks: Rc<dyn BlockContainer> = Rc::new(TestBlocks::new());
        Thread::new(Rc::from("top"), Target::new("sprite", false), blocks, ContainerId::new(0))
    }

    #[test]
    fn released_frames_are_indistinguishable_from_fresh_ones() {
        let mut dirty = create_frame();
        dirty.warp_mode = true;
        dirty.is_loop = true;
        dirty.proccode = Some(Rc::from("ping"));
        dirty.params = Some(FnvHashMap::default());
        dirty.execution_context = Some(FnvHashMap::default());
        dirty.waiting_reporter = true;
        release_frame(dirty);

        let recycled = create_frame();
        let fresh = Box::<StackFrame>::default();
        assert_eq!(recycled.warp_mode, fresh.warp_mode);
        assert_eq!(recycled.is_loop, fresh.is_loop);
        assert_eq!(recycled.proccode, fresh.proccode);
        assert!(recycled.params.is_none());
        assert!(recycled.execution_context.is_none());
        assert_eq!(recycled.waiting_reporter, fresh.waiting_reporter);
    }

    #[test]
    fn pushed_frames_inherit_warp_mode() {
        let mut thread = test_thread();
        thread.peek_frame_mut().unwrap().warp_mode = true;
        thread.push_stack(Rc::from("child"));
        assert!(thread.peek_frame().unwrap().warp_mode);
        thread.pop_stack();
        assert!(thread.peek_frame().unwrap().warp_mode);
    }

    #[test]
    fn reuse_preserves_warp_but_resets_the_rest() {
        let mut thread = test_thread();
        {
            let frame = thread.peek_frame_mut().unwrap();
            frame.warp_mode = true;
            frame.is_loop = true;
            frame.execution_context = Some(FnvHashMap::default());
        }
        thread.reuse_stack_for_next_block(Rc::from("next"));
        let frame = thread.peek_frame().unwrap();
        assert!(frame.warp_mode);
        assert!(!frame.is_loop);
        assert!(frame.execution_context.is_none());
        assert_eq!(&**thread.peek_stack().unwrap(), "next");
    }

    #[test]
    fn param_lookup_walks_to_the_nearest_binding_frame() {
        let mut thread = test_thread();
        thread.push_param("x", Value::Num(5.0));
        thread.push_stack(Rc::from("inner"));
        // No params on the inner frame: lookup reaches the outer binding.
        assert_eq!(thread.get_param("x"), Value::Num(5.0));
        // A params frame without the binding answers 0 and stops the walk.
        thread.init_params();
        assert_eq!(thread.get_param("x"), Value::Num(0.0));
        assert_eq!(thread.get_param("missing"), Value::Num(0.0));
    }

    #[test]
    fn recursion_is_detected_within_five_stack_levels() {
        use blockvm_core::{Block, Mutation};

        let mut blocks = TestBlocks::new();
        blocks.add(Block::new("call_ping", opcodes::PROCEDURES_CALL).with_mutation(Mutation {
            proccode: Some(Rc::from("ping")),
            ..Mutation::default()
        }));
        let blocks: Rc<dyn BlockContainer> = Rc::new(blocks);
        let mut thread =
            Thread::new(Rc::from("call_ping"), Target::new("sprite", false), blocks, ContainerId::new(0));

        thread.push_stack(Rc::from("def_ping"));
        assert!(thread.is_recursive_call("ping"));
        assert!(!thread.is_recursive_call("pong"));

        for i in 0..6 {
            thread.push_stack(Rc::from(format!("filler{i}").as_str()));
        }
        assert!(!thread.is_recursive_call("ping"));
    }
}
