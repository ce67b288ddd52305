use std::rc::Rc;

use crate::{ProcedureParams, Promise, Target, Value};

// BLOCK UTILITY
// ================================================================================================

/// The capability surface handed to every primitive.
///
/// There is exactly one live utility at any instant: the dispatcher constructs it on entry from
/// the current sequencer/thread pair and drops it on exit, which is sound because execution is
/// single-threaded and cooperative. Primitives must reach all shared state through this trait;
/// anything else is hidden global state and breaks compile/interpret equivalence.
pub trait BlockUtility {
    // TARGETS
    // --------------------------------------------------------------------------------------------

    /// The target the current thread runs against.
    fn target(&self) -> Rc<Target>;

    /// The stage target, when the host registered one.
    fn stage(&self) -> Option<Rc<Target>>;

    // THREAD CONTROL
    // --------------------------------------------------------------------------------------------

    /// Yields the thread: other threads run, this one resumes within the same frame budget.
    fn yield_thread(&mut self);

    /// Yields until the next frame.
    fn yield_tick(&mut self);

    /// Retires the thread.
    fn retire(&mut self);

    /// Pops frames until a procedure call is on top (or the stack empties).
    fn stop_this_script(&mut self);

    /// Requests entry into branch `branch_num` (1 or 2) of the current command; consumed by the
    /// command's `vm_do_stack` tail op.
    fn start_branch(&mut self, branch_num: u8, is_loop: bool);

    /// Pushes the definition of `proccode` onto the stack. `warp` comes from the call site's
    /// mutation; recursion within the last five frames yields unless warp still has budget.
    fn start_procedure(&mut self, proccode: &str, warp: bool);

    /// True when the current frame runs in warp mode.
    fn in_warp_mode(&self) -> bool;

    // PROCEDURE PARAMETERS
    // --------------------------------------------------------------------------------------------

    fn init_params(&mut self);
    fn push_param(&mut self, name: &str, value: Value);

    /// Scoped lookup: nearest enclosing frame's binding, or `0` when none exists.
    fn get_param(&self, name: &str) -> Value;

    fn get_procedure_params(&self, proccode: &str) -> Option<ProcedureParams>;
    fn is_recursive_call(&self, proccode: &str) -> bool;

    // PER-FRAME SCRATCH
    // --------------------------------------------------------------------------------------------

    /// Reads a slot of the current frame's execution context (loop counters and the like).
    fn frame_slot(&self, key: &str) -> Option<Value>;
    fn set_frame_slot(&mut self, key: &str, value: Value);

    // HOST SERVICES
    // --------------------------------------------------------------------------------------------

    /// Forwards a query to a host io service. Unknown services answer with the default value.
    fn io_query(&mut self, service: &str, method: &str, args: &[Value]) -> Value;

    /// Notifies the host that a cloud variable changed.
    fn notify_cloud_change(&mut self, name: &str, value: &Value);

    /// Returns a promise the runtime fulfils `ms` milliseconds from now.
    fn start_timer_promise(&mut self, ms: f64) -> Promise;

    fn request_redraw(&mut self);

    /// Milliseconds since the runtime started.
    fn now_ms(&self) -> f64;
}
