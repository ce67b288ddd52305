//! Core components of the blockvm visual-block runtime: the authored block model, dynamic
//! values and their cast semantics, the flattened operation plans the processor executes, and
//! the trait surfaces (block container, primitive registry, block utility) the execution core
//! consumes from its host.

mod block;
pub mod cast;
mod container;
pub mod opcodes;
mod plan;
mod promise;
mod registry;
mod target;
mod utility;
mod value;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// RE-EXPORTS
// ================================================================================================

pub use block::{Block, BlockId, Field, Input, Mutation};
pub use container::{BlockContainer, ProcedureParams};
pub use plan::{
    ArgValues, CachedOp, CachedSequence, CommandSpan, OpIdx, OpKind, OpcodeId, OpcodeInterner,
};
pub use promise::{Promise, PromiseHandle, PromiseState};
pub use registry::{PrimitiveFn, PrimitiveRegistry, PrimitiveResult, Primitives};
pub use target::{
    LIST_ITEM_LIMIT, List, Target, Variable, lookup_or_create_list, lookup_or_create_variable,
};
pub use utility::BlockUtility;
pub use value::{NamedRef, Value};
