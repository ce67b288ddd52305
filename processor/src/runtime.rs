//! The runtime: owner of threads, caches, and host-facing services.
//!
//! This is the embedding surface. The host registers containers and primitives, pushes threads
//! for its events, and calls [`Runtime::step_threads`] once per frame; everything below that is
//! the sequencer's business. Edits to authored graphs are signalled through the invalidation
//! methods, which drop every cached plan of the touched container.

use std::rc::Rc;
use std::time::Instant;

use blockvm_compiler::CompileBudget;
use blockvm_core::{
    BlockContainer, BlockId, OpcodeInterner, PrimitiveRegistry, Target, Value,
};
use fnv::FnvHashMap;

use crate::cache::{CacheStore, ContainerId};
use crate::options::RuntimeOptions;
use crate::sequencer;
use crate::thread::Thread;

// SERVICES
// ================================================================================================

/// Host io endpoint. Unknown services answer with a default value.
pub trait IoHandler {
    fn query(&mut self, service: &str, method: &str, args: &[Value]) -> Value;
}

/// What a report tail op produced.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReportKind {
    StackClick,
    Monitor,
}

/// A reported value surfaced to the host (clicked reporters and monitored values).
#[derive(Clone, Debug)]
pub struct Report {
    pub container: ContainerId,
    pub block: BlockId,
    pub value: Value,
    pub kind: ReportKind,
}

/// Shared state every dispatch reaches through the block utility: the registry, timing, io, the
/// hat edge-state table, the compile budget, and the report queue.
pub(crate) struct Services {
    pub registry: Rc<dyn PrimitiveRegistry>,
    pub interner: OpcodeInterner,
    pub options: RuntimeOptions,
    pub stage: Option<Rc<Target>>,
    pub io: Option<Box<dyn IoHandler>>,
    pub redraw_requested: bool,
    pub edge_state: FnvHashMap<(ContainerId, BlockId), bool>,
    pub budget: CompileBudget,
    pub reports: Vec<Report>,
    pub timers: Vec<(f64, blockvm_core::PromiseHandle)>,
    pub epoch: Instant,
}

// RUNTIME
// ================================================================================================

struct ContainerEntry {
    blocks: Rc<dyn BlockContainer>,
    target: Rc<Target>,
}

pub struct Runtime {
    threads: Vec<Box<Thread>>,
    containers: FnvHashMap<ContainerId, ContainerEntry>,
    next_container: u32,
    services: Services,
    caches: CacheStore,
}

impl Runtime {
    // CONSTRUCTORS
    // --------------------------------------------------------------------------------------------

    pub fn new(registry: Rc<dyn PrimitiveRegistry>) -> Self {
        Self::with_options(registry, RuntimeOptions::default())
    }

    pub fn with_options(registry: Rc<dyn PrimitiveRegistry>, options: RuntimeOptions) -> Self {
        let budget =
            CompileBudget::new(options.compile_token_cap(), options.compile_tokens_per_ms());
        Self {
            threads: Vec::new(),
            containers: FnvHashMap::default(),
            next_container: 0,
            services: Services {
                registry,
                interner: OpcodeInterner::new(),
                options,
                stage: None,
                io: None,
                redraw_requested: false,
                edge_state: FnvHashMap::default(),
                budget,
                reports: Vec::new(),
                timers: Vec::new(),
                epoch: Instant::now(),
            },
            caches: CacheStore::new(),
        }
    }

    // HOST WIRING
    // --------------------------------------------------------------------------------------------

    /// Registers a block container together with the target its threads run against.
    pub fn register_container(
        &mut self,
        blocks: Rc<dyn BlockContainer>,
        target: Rc<Target>,
    ) -> ContainerId {
        let id = ContainerId::new(self.next_container);
        self.next_container += 1;
        self.containers.insert(id, ContainerEntry { blocks, target });
        id
    }

    pub fn set_stage(&mut self, stage: Rc<Target>) {
        self.services.stage = Some(stage);
    }

    pub fn set_io_handler(&mut self, io: Box<dyn IoHandler>) {
        self.services.io = Some(io);
    }

    // THREADS
    // --------------------------------------------------------------------------------------------

    /// Starts a thread at `top_block`; returns its index in the thread list.
    pub fn push_thread(&mut self, container: ContainerId, top_block: impl AsRef<str>) -> usize {
        let entry = self.containers.get(&container).expect("unregistered container");
        let thread = Thread::new(
            Rc::from(top_block.as_ref()),
            entry.target.clone(),
            entry.blocks.clone(),
            container,
        );
        self.threads.push(Box::new(thread));
        self.threads.len() - 1
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    pub fn thread(&self, index: usize) -> &Thread {
        &self.threads[index]
    }

    pub fn thread_mut(&mut self, index: usize) -> &mut Thread {
        &mut self.threads[index]
    }

    /// The id of the last-executed block of a thread, for glow reporting.
    pub fn last_executed_block(&self, index: usize) -> Option<BlockId> {
        self.threads.get(index).and_then(|thread| thread.last_block.clone())
    }

    // FRAME STEPPING
    // --------------------------------------------------------------------------------------------

    /// Runs one frame: interleaves every runnable thread within the work budget and returns the
    /// threads that finished during it.
    pub fn step_threads(&mut self) -> Vec<Box<Thread>> {
        self.services.redraw_requested = false;
        sequencer::step_threads(&mut self.threads, &mut self.services, &mut self.caches)
    }

    /// Settles due timers and resolved promises without stepping anything. `step_threads` does
    /// this on its own; hosts call it to surface settlements between frames.
    pub fn poll_promises(&mut self) {
        sequencer::settle_promises(&mut self.threads, &mut self.services);
    }

    /// Starts (or restarts) threads for every edge-activated hat script; the hats' report ops
    /// retire threads whose predicate did not transition false→true.
    pub fn start_edge_activated_hats(&mut self) {
        let containers: Vec<(ContainerId, Rc<dyn BlockContainer>, Rc<Target>)> = self
            .containers
            .iter()
            .map(|(id, entry)| (*id, entry.blocks.clone(), entry.target.clone()))
            .collect();
        for (container_id, blocks, target) in containers {
            for script in blocks.get_scripts() {
                let Some(block) = blocks.get_block(&script) else { continue };
                if !self.services.registry.get_is_edge_activated_hat(&block.opcode) {
                    continue;
                }
                self.start_hat_thread(container_id, blocks.clone(), target.clone(), script);
            }
        }
    }

    fn start_hat_thread(
        &mut self,
        container_id: ContainerId,
        blocks: Rc<dyn BlockContainer>,
        target: Rc<Target>,
        top_block: BlockId,
    ) {
        // A still-live thread on the same script restarts instead of duplicating.
        if let Some(existing) = self
            .threads
            .iter_mut()
            .find(|thread| thread.container_id == container_id && thread.top_block == top_block)
        {
            **existing = Thread::new(top_block, target, blocks, container_id);
            return;
        }
        let thread = Thread::new(top_block, target, blocks, container_id);
        self.threads.push(Box::new(thread));
    }

    // REPORTS & REDRAW
    // --------------------------------------------------------------------------------------------

    pub fn drain_reports(&mut self) -> Vec<Report> {
        std::mem::take(&mut self.services.reports)
    }

    pub fn redraw_requested(&self) -> bool {
        self.services.redraw_requested
    }

    pub fn set_turbo_mode(&mut self, turbo: bool) {
        self.services.options = self.services.options.clone().with_turbo_mode(turbo);
    }

    // INVALIDATION
    // --------------------------------------------------------------------------------------------

    /// Drops every cached plan of the container. Threads parked on promises restart from the top
    /// of their current command on resume.
    pub fn invalidate_container(&mut self, container: ContainerId) {
        self.caches.invalidate_container(container);
    }

    pub fn invalidate_script(&mut self, container: ContainerId, top_block: impl AsRef<str>) {
        let id: BlockId = Rc::from(top_block.as_ref());
        self.caches.invalidate_script(container, &id);
    }

    // TEST SUPPORT
    // --------------------------------------------------------------------------------------------

    #[cfg(test)]
    pub(crate) fn caches(&self) -> &CacheStore {
        &self.caches
    }

    #[cfg(test)]
    pub(crate) fn parts_mut(
        &mut self,
    ) -> (&mut Vec<Box<Thread>>, &mut Services, &mut CacheStore) {
        (&mut self.threads, &mut self.services, &mut self.caches)
    }
}
