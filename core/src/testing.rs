//! In-memory block container for tests.

use std::rc::Rc;

use fnv::FnvHashMap;

use crate::{Block, BlockContainer, BlockId, ProcedureParams};

/// A map-backed [`BlockContainer`] that tests (and examples) assemble by hand.
#[derive(Default)]
pub struct TestBlocks {
    blocks: FnvHashMap<Rc<str>, Block>,
    procedures: FnvHashMap<Rc<str>, BlockId>,
    params: FnvHashMap<Rc<str>, ProcedureParams>,
    scripts: Vec<BlockId>,
    pub force_no_glow: bool,
}

impl TestBlocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, block: Block) -> &mut Self {
        self.blocks.insert(block.id.clone(), block);
        self
    }

    /// Registers a top-level script entry (a hat or a clicked stack).
    pub fn add_script(&mut self, first: impl AsRef<str>) -> &mut Self {
        self.scripts.push(Rc::from(first.as_ref()));
        self
    }

    pub fn add_procedure(
        &mut self,
        proccode: impl AsRef<str>,
        definition: impl AsRef<str>,
        params: ProcedureParams,
    ) -> &mut Self {
        let proccode: Rc<str> = Rc::from(proccode.as_ref());
        self.procedures.insert(proccode.clone(), Rc::from(definition.as_ref()));
        self.params.insert(proccode, params);
        self
    }

    /// Removes a block, simulating an edit.
    pub fn remove(&mut self, id: &str) -> &mut Self {
        self.blocks.remove(id);
        self
    }
}

impl BlockContainer for TestBlocks {
    fn get_block(&self, id: &str) -> Option<Block> {
        self.blocks.get(id).cloned()
    }

    fn get_next_block(&self, id: &str) -> Option<BlockId> {
        self.blocks.get(id).and_then(|block| block.next.clone())
    }

    fn get_branch(&self, id: &str, branch_num: u8) -> Option<BlockId> {
        self.blocks.get(id).and_then(|block| block.branch(branch_num).cloned())
    }

    fn get_procedure_definition(&self, proccode: &str) -> Option<BlockId> {
        self.procedures.get(proccode).cloned()
    }

    fn get_procedure_params(&self, proccode: &str) -> Option<ProcedureParams> {
        self.params.get(proccode).cloned()
    }

    fn get_scripts(&self) -> Vec<BlockId> {
        self.scripts.clone()
    }

    fn force_no_glow(&self) -> bool {
        self.force_no_glow
    }
}
