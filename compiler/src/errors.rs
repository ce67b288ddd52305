// COMPILE ERROR
// ================================================================================================

/// Compilation failures are non-fatal: the dispatcher logs them and keeps interpreting.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("cannot compile an empty plan")]
    EmptyPlan,
    #[error("plan op {0} has no owning command")]
    MalformedPlan(u32),
}
