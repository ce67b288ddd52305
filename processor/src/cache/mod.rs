//! The block cache: flattened sequences, keyed per container and entry block.
//!
//! Sequences are built lazily on first dispatch and dropped wholesale when the host signals an
//! edit; a thread parked on a promise across an invalidation restarts from the top of its
//! current command, because re-entry finds nothing to match.

mod builder;

use std::cell::RefCell;
use std::rc::Rc;

use blockvm_core::{
    BlockContainer, BlockId, CachedSequence, OpcodeInterner, PrimitiveRegistry,
};
use blockvm_compiler::CompiledScript;
use fnv::FnvHashMap;

// CONTAINER ID
// ================================================================================================

/// Dense id assigned to each registered block container.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ContainerId(u32);

impl ContainerId {
    pub(crate) fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

// CACHE STORE
// ================================================================================================

type SequenceKey = (ContainerId, BlockId);

/// All cached sequences plus the compiled programs that replaced some of them.
#[derive(Default)]
pub struct CacheStore {
    sequences: FnvHashMap<SequenceKey, Rc<RefCell<CachedSequence>>>,
    compiled: FnvHashMap<SequenceKey, Rc<CompiledScript>>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached sequence entered at `first`, building it on a miss. `None` when the
    /// entry block does not exist at all, in which case the caller retires the thread.
    pub(crate) fn get_or_build(
        &mut self,
        container: ContainerId,
        first: &BlockId,
        blocks: &dyn BlockContainer,
        registry: &dyn PrimitiveRegistry,
        interner: &mut OpcodeInterner,
    ) -> Option<Rc<RefCell<CachedSequence>>> {
        let key = (container, first.clone());
        if let Some(seq) = self.sequences.get(&key) {
            return Some(seq.clone());
        }
        let seq = builder::build_sequence(first.clone(), blocks, registry, interner)?;
        let seq = Rc::new(RefCell::new(seq));
        self.sequences.insert(key, seq.clone());
        Some(seq)
    }

    pub(crate) fn compiled_for(
        &self,
        container: ContainerId,
        first: &BlockId,
    ) -> Option<Rc<CompiledScript>> {
        self.compiled.get(&(container, first.clone())).cloned()
    }

    pub(crate) fn set_compiled(
        &mut self,
        container: ContainerId,
        first: &BlockId,
        script: Rc<CompiledScript>,
    ) {
        self.compiled.insert((container, first.clone()), script);
    }

    // INVALIDATION
    // --------------------------------------------------------------------------------------------

    /// Drops every cached sequence and compiled program of the container. Any authored edit
    /// invalidates all plans that could reference the changed block, so the whole container goes.
    pub fn invalidate_container(&mut self, container: ContainerId) {
        self.sequences.retain(|(c, _), _| *c != container);
        self.compiled.retain(|(c, _), _| *c != container);
    }

    /// Per-script signal from the host. The cache keeps no script→sequence reverse index, so
    /// this falls back to the container-wide drop.
    pub fn invalidate_script(&mut self, container: ContainerId, _top_block: &BlockId) {
        self.invalidate_container(container);
    }

    #[cfg(test)]
    pub(crate) fn sequence(
        &self,
        container: ContainerId,
        first: &str,
    ) -> Option<Rc<RefCell<CachedSequence>>> {
        self.sequences
            .iter()
            .find(|((c, id), _)| *c == container && &**id == first)
            .map(|(_, seq)| seq.clone())
    }
}
