//! The blockvm processor: the execution core of the visual-block runtime.
//!
//! The processor flattens authored block graphs into linear operation plans (the block cache),
//! schedules threads cooperatively within a frame budget (the sequencer), walks plans calling
//! primitives and handling promise suspension (the dispatcher), and swaps hot plans for
//! compiled programs produced by `blockvm-compiler`. Author-visible graph errors never raise:
//! missing blocks retire their thread, unknown opcodes are skipped, rejected promises pop a
//! frame and keep running.

mod cache;
mod compiled;
mod dispatch;
mod options;
mod primitives;
mod resume;
mod runtime;
mod sequencer;
mod thread;
mod utility;

#[cfg(test)]
mod tests;

// RE-EXPORTS
// ================================================================================================

pub use cache::{CacheStore, ContainerId};
pub use options::{OptionsError, RuntimeOptions};
pub use primitives::builtin_registry;
pub use runtime::{IoHandler, Report, ReportKind, Runtime};
pub use thread::{BranchRequest, StackFrame, Thread, ThreadStatus};
