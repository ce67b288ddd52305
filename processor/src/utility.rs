use std::rc::Rc;
use std::time::Instant;

use blockvm_core::{
    BlockUtility, ProcedureParams, Promise, Target, Value,
};
use fnv::FnvHashMap;

use crate::runtime::Services;
use crate::sequencer;
use crate::thread::{BranchRequest, Thread, ThreadStatus};

// BLOCK UTILITY
// ================================================================================================

/// The single live utility: a facade over the current thread and the runtime services,
/// constructed by the dispatcher on entry and dropped on exit. Primitives reach every shared
/// resource through this and nothing else.
pub(crate) struct Utility<'a> {
    pub thread: &'a mut Thread,
    pub services: &'a mut Services,
}

impl BlockUtility for Utility<'_> {
    fn target(&self) -> Rc<Target> {
        self.thread.target.clone()
    }

    fn stage(&self) -> Option<Rc<Target>> {
        self.services.stage.clone()
    }

    fn yield_thread(&mut self) {
        self.thread.set_status(ThreadStatus::Yield, "primitive yield");
    }

    fn yield_tick(&mut self) {
        self.thread.set_status(ThreadStatus::YieldTick, "primitive single-tick yield");
    }

    fn retire(&mut self) {
        self.thread.retire();
    }

    fn stop_this_script(&mut self) {
        self.thread.stop_this_script();
        // A procedures_call left on top must be advanced past, not re-run.
        if self.thread.status == ThreadStatus::Running && !self.thread.stack_is_empty() {
            self.thread.pending_resume_after_top = true;
            self.thread.set_status(ThreadStatus::Interrupt, "script stopped inside a call");
        }
    }

    fn start_branch(&mut self, branch_num: u8, is_loop: bool) {
        self.thread.pending_branch = Some(BranchRequest { branch_num, is_loop });
    }

    fn start_procedure(&mut self, proccode: &str, warp: bool) {
        sequencer::step_to_procedure(&self.services.options, self.thread, proccode, warp);
    }

    fn in_warp_mode(&self) -> bool {
        self.thread.in_warp_mode()
    }

    fn init_params(&mut self) {
        self.thread.init_params();
    }

    fn push_param(&mut self, name: &str, value: Value) {
        self.thread.push_param(name, value);
    }

    fn get_param(&self, name: &str) -> Value {
        self.thread.get_param(name)
    }

    fn get_procedure_params(&self, proccode: &str) -> Option<ProcedureParams> {
        self.thread.blocks.get_procedure_params(proccode)
    }

    fn is_recursive_call(&self, proccode: &str) -> bool {
        self.thread.is_recursive_call(proccode)
    }

    fn frame_slot(&self, key: &str) -> Option<Value> {
        self.thread
            .peek_frame()
            .and_then(|frame| frame.execution_context.as_ref())
            .and_then(|context| context.get(key))
            .cloned()
    }

    fn set_frame_slot(&mut self, key: &str, value: Value) {
        if let Some(frame) = self.thread.peek_frame_mut() {
            frame
                .execution_context
                .get_or_insert_with(FnvHashMap::default)
                .insert(Rc::from(key), value);
        }
    }

    fn io_query(&mut self, service: &str, method: &str, args: &[Value]) -> Value {
        match self.services.io.as_mut() {
            Some(io) => io.query(service, method, args),
            None => Value::default(),
        }
    }

    fn notify_cloud_change(&mut self, name: &str, value: &Value) {
        let args = [Value::text(name), value.clone()];
        self.io_query("cloud", "update_variable", &args);
    }

    fn start_timer_promise(&mut self, ms: f64) -> Promise {
        let (promise, handle) = Promise::pending();
        let deadline = self.now_ms() + ms;
        self.services.timers.push((deadline, handle));
        promise
    }

    fn request_redraw(&mut self) {
        self.services.redraw_requested = true;
    }

    fn now_ms(&self) -> f64 {
        now_ms_since(self.services.epoch)
    }
}

pub(crate) fn now_ms_since(epoch: Instant) -> f64 {
    epoch.elapsed().as_secs_f64() * 1e3
}
