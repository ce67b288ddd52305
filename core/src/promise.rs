use std::cell::RefCell;
use std::rc::Rc;

use crate::Value;

// PROMISE
// ================================================================================================

/// A single-threaded thenable.
///
/// A primitive that cannot answer synchronously returns a [`Promise`] and keeps the matching
/// [`PromiseHandle`]; the owning thread parks in `PROMISE_WAIT` until the handle is settled. The
/// runtime polls settlement at thread-step boundaries, the single-threaded equivalent of a
/// fulfilment callback.
#[derive(Clone, Debug)]
pub struct Promise {
    state: Rc<RefCell<PromiseState>>,
}

/// The write end of a [`Promise`]. Settling twice is a no-op.
#[derive(Clone, Debug)]
pub struct PromiseHandle {
    state: Rc<RefCell<PromiseState>>,
}

#[derive(Clone, Debug)]
pub enum PromiseState {
    Pending,
    Fulfilled(Value),
    Rejected(Rc<str>),
}

impl Promise {
    /// Returns a pending promise and the handle that settles it.
    pub fn pending() -> (Promise, PromiseHandle) {
        let state = Rc::new(RefCell::new(PromiseState::Pending));
        (Promise { state: state.clone() }, PromiseHandle { state })
    }

    /// Returns an already-fulfilled promise.
    pub fn fulfilled(value: Value) -> Promise {
        Promise { state: Rc::new(RefCell::new(PromiseState::Fulfilled(value))) }
    }

    /// Returns the settled outcome, or `None` while pending.
    pub fn settled(&self) -> Option<Result<Value, Rc<str>>> {
        match &*self.state.borrow() {
            PromiseState::Pending => None,
            PromiseState::Fulfilled(value) => Some(Ok(value.clone())),
            PromiseState::Rejected(reason) => Some(Err(reason.clone())),
        }
    }
}

impl PromiseHandle {
    pub fn resolve(&self, value: Value) {
        let mut state = self.state.borrow_mut();
        if matches!(*state, PromiseState::Pending) {
            *state = PromiseState::Fulfilled(value);
        }
    }

    pub fn reject(&self, reason: impl AsRef<str>) {
        let mut state = self.state.borrow_mut();
        if matches!(*state, PromiseState::Pending) {
            *state = PromiseState::Rejected(Rc::from(reason.as_ref()));
        }
    }
}
