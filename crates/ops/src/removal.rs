//! One-shot removal signal.
//!
//! The removal-aware adapters expose, next to each value, a signal that
//! resolves exactly once: when the value leaves the set, or when the
//! adapter's activation tears down while still holding it. Callbacks run
//! synchronously at the moment the removal is observed.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;

enum State {
    Pending(Vec<Box<dyn FnOnce()>>),
    Resolved,
}

/// The observer half of a removal signal. Cheap to clone; all clones
/// observe the same resolution.
#[derive(Clone)]
pub struct Removal {
    state: Rc<RefCell<State>>,
}

impl Removal {
    pub(crate) fn new() -> (Removal, RemovalResolver) {
        let state = Rc::new(RefCell::new(State::Pending(Vec::new())));
        (
            Removal {
                state: state.clone(),
            },
            RemovalResolver { state },
        )
    }

    /// Returns true once the value has been removed (or the activation
    /// holding it has torn down).
    pub fn is_resolved(&self) -> bool {
        matches!(*self.state.borrow(), State::Resolved)
    }

    /// Registers a callback to run at resolution; runs it immediately if
    /// the signal has already resolved.
    pub fn on_resolve(&self, f: impl FnOnce() + 'static) {
        let run_now = {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                State::Pending(callbacks) => {
                    callbacks.push(Box::new(f));
                    None
                }
                State::Resolved => Some(f),
            }
        };
        if let Some(f) = run_now {
            f();
        }
    }
}

/// The resolving half, held by the adapter that tracks the value.
pub(crate) struct RemovalResolver {
    state: Rc<RefCell<State>>,
}

impl RemovalResolver {
    /// Resolves the signal. Idempotent.
    pub(crate) fn resolve(&self) {
        let callbacks = {
            let mut state = self.state.borrow_mut();
            match core::mem::replace(&mut *state, State::Resolved) {
                State::Pending(callbacks) => callbacks,
                State::Resolved => Vec::new(),
            }
        };
        for callback in callbacks {
            callback();
        }
    }
}
