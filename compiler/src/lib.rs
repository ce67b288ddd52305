//! The blockvm specializing compiler.
//!
//! Takes a flattened [`CachedSequence`](blockvm_core::CachedSequence), rebuilds it as a typed
//! factory IR, applies opcode-aware rewrites (inlined math, variable and list accesses, argument
//! reporters, direct command-tail jumps), folds redundant casts, and emits two artifacts: a
//! bytecode [`CodeChunk`] the processor executes with a switch-dispatch loop, and the printed,
//! mangled factory body kept for diagnostics. Compilation is always non-fatal to the runtime:
//! the interpretive plan stays behind as the fallback.

pub mod ast;
mod budget;
mod code;
mod errors;
mod lower;
mod passes;
mod printer;
pub mod transform;

use blockvm_core::CachedSequence;

// RE-EXPORTS
// ================================================================================================

pub use budget::CompileBudget;
pub use code::{BinOp, CodeChunk, CompiledScript, DataRef, Inst, UnOp};
pub use errors::CompileError;

// COMPILE
// ================================================================================================

/// Compiles one cached sequence into a [`CompiledScript`].
pub fn compile(seq: &CachedSequence, name: &str) -> Result<CompiledScript, CompileError> {
    if seq.plan.is_empty() {
        return Err(CompileError::EmptyPlan);
    }
    let name = sanitize_name(name);
    log::debug!("compiling sequence {} ({} ops)", name, seq.plan.len());

    let passes::BuildOutput { mut arena, factory, info } = passes::build(seq, &name);

    let mut inline = passes::InlineOperators::new(seq, &info);
    let factory = transform::transform(&mut arena, factory, &mut [&mut inline]);

    let mut fold = passes::FoldCasts::default();
    let factory = transform::transform(&mut arena, factory, &mut [&mut fold]);

    let mut elide = passes::ElideStatusChecks::default();
    let factory = transform::transform(&mut arena, factory, &mut [&mut elide]);

    let mut propagate = passes::PropagateStores::default();
    let factory = transform::transform(&mut arena, factory, &mut [&mut propagate]);

    // Propagated stores expose fresh cast-over-numeric shapes; fold once more.
    let mut fold = passes::FoldCasts::default();
    let factory = transform::transform(&mut arena, factory, &mut [&mut fold]);

    let code = lower::lower(&arena, factory, seq, inline.var_refs, inline.list_refs)?;

    let mut refs = passes::CountRefs::default();
    transform::transform(&mut arena, factory, &mut [&mut refs]);
    let renames = passes::mangle(&refs);
    let source = printer::Printer::new(&arena, &renames).print_factory(factory);

    log::debug!("compiled {} to {} instructions", name, code.insts.len());
    Ok(CompiledScript { name: name.to_string(), code, source })
}

fn sanitize_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() || out.as_bytes()[0].is_ascii_digit() {
        out.insert(0, '_');
    }
    out
}
