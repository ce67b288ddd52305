use std::fmt;
use std::rc::Rc;

use fnv::FnvHashMap;

use crate::{ArgValues, BlockUtility, Promise, Value};

// PRIMITIVE FUNCTION
// ================================================================================================

/// What a primitive reports back to the dispatcher.
#[derive(Clone, Debug)]
pub enum PrimitiveResult {
    /// A concrete value, copied into the op's parent slot.
    Value(Value),
    /// A thenable: the thread parks in `PROMISE_WAIT` until it settles.
    Promise(Promise),
    /// Nothing reported (commands).
    Nothing,
}

/// A primitive function handle.
///
/// The closure capture plays the role of the bound receiver: the cache stores a clone of this
/// handle on each op, so dispatch performs neither a registry lookup nor a re-bind per call.
#[derive(Clone)]
pub struct PrimitiveFn(Rc<dyn Fn(&ArgValues, &mut dyn BlockUtility) -> PrimitiveResult>);

impl PrimitiveFn {
    pub fn new(
        f: impl Fn(&ArgValues, &mut dyn BlockUtility) -> PrimitiveResult + 'static,
    ) -> Self {
        Self(Rc::new(f))
    }

    #[inline(always)]
    pub fn call(&self, args: &ArgValues, util: &mut dyn BlockUtility) -> PrimitiveResult {
        (self.0)(args, util)
    }
}

impl fmt::Debug for PrimitiveFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrimitiveFn(..)")
    }
}

// PRIMITIVE REGISTRY
// ================================================================================================

/// Opcode → primitive resolution, consumed by the block cache at build time.
///
/// A missing opcode is not an error: the cache records the op as undefined and the dispatcher
/// skips it (or retires the thread when the whole entry block is unknown).
pub trait PrimitiveRegistry {
    fn get_opcode_function(&self, opcode: &str) -> Option<PrimitiveFn>;
    fn get_is_hat(&self, opcode: &str) -> bool;
    fn get_is_edge_activated_hat(&self, opcode: &str) -> bool;
}

/// A plain map-backed registry for hosts to fill.
#[derive(Default)]
pub struct Primitives {
    entries: FnvHashMap<Rc<str>, PrimitiveEntry>,
}

struct PrimitiveEntry {
    func: PrimitiveFn,
    is_hat: bool,
    is_edge_activated: bool,
}

impl Primitives {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        opcode: impl AsRef<str>,
        f: impl Fn(&ArgValues, &mut dyn BlockUtility) -> PrimitiveResult + 'static,
    ) {
        self.entries.insert(
            Rc::from(opcode.as_ref()),
            PrimitiveEntry { func: PrimitiveFn::new(f), is_hat: false, is_edge_activated: false },
        );
    }

    pub fn insert_hat(
        &mut self,
        opcode: impl AsRef<str>,
        edge_activated: bool,
        f: impl Fn(&ArgValues, &mut dyn BlockUtility) -> PrimitiveResult + 'static,
    ) {
        self.entries.insert(
            Rc::from(opcode.as_ref()),
            PrimitiveEntry {
                func: PrimitiveFn::new(f),
                is_hat: true,
                is_edge_activated: edge_activated,
            },
        );
    }
}

impl PrimitiveRegistry for Primitives {
    fn get_opcode_function(&self, opcode: &str) -> Option<PrimitiveFn> {
        self.entries.get(opcode).map(|entry| entry.func.clone())
    }

    fn get_is_hat(&self, opcode: &str) -> bool {
        self.entries.get(opcode).map(|entry| entry.is_hat).unwrap_or(false)
    }

    fn get_is_edge_activated_hat(&self, opcode: &str) -> bool {
        self.entries.get(opcode).map(|entry| entry.is_edge_activated).unwrap_or(false)
    }
}
