use std::rc::Rc;

use crate::{Block, BlockId, Value};

// BLOCK CONTAINER
// ================================================================================================

/// Parameter metadata for one procedure: parallel name/id lists plus per-parameter defaults.
#[derive(Clone, Debug, Default)]
pub struct ProcedureParams {
    pub names: Vec<Rc<str>>,
    pub ids: Vec<Rc<str>>,
    pub defaults: Vec<Value>,
}

/// Read-only view over an authored block graph, provided by the hosting application.
///
/// Every lookup returns `None` on a miss and never panics; the execution core recovers from
/// missing blocks by retiring the affected thread. Edits to the underlying graph are signalled
/// to the runtime out of band (see the processor's invalidation API) and must not happen while a
/// dispatch is in progress.
pub trait BlockContainer {
    /// Returns the block with the given id.
    fn get_block(&self, id: &str) -> Option<Block>;

    /// Returns the id of the block following `id` in its chain.
    fn get_next_block(&self, id: &str) -> Option<BlockId>;

    /// Returns the first block of branch `branch_num` (1 or 2) of the given block.
    fn get_branch(&self, id: &str, branch_num: u8) -> Option<BlockId>;

    /// Returns the id of the definition block for the given procedure code.
    fn get_procedure_definition(&self, proccode: &str) -> Option<BlockId>;

    /// Returns the parameter names, ids, and defaults declared by the given procedure.
    fn get_procedure_params(&self, proccode: &str) -> Option<ProcedureParams>;

    /// Ids of the top-level blocks that start scripts. Used to drive edge-activated hats.
    fn get_scripts(&self) -> Vec<BlockId> {
        Vec::new()
    }

    /// When true, the runtime suppresses glow (last-executed block) reporting for this container.
    fn force_no_glow(&self) -> bool {
        false
    }
}
