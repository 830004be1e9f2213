//! Producer contract: the read/listen pair behind every container.
//!
//! A producer supplies `read` (a fresh snapshot for inactive reads) and
//! `listen` (activation: establish the initial snapshot, drive the
//! controller, return a cleanup handle). `listen` runs when the observer
//! count goes 0 to 1 and its cleanup runs when it returns to 0.

use alloc::boxed::Box;
use alloc::rc::Rc;
use core::hash::Hash;
use liveset_core::ValueSet;

use crate::controller::Controller;
use crate::live_set::SharedState;

pub(crate) type ReadFn<T> = Box<dyn Fn() -> ValueSet<T>>;
pub(crate) type ListenFn<T> = Box<dyn FnMut(InitialSnapshot<T>, Controller<T>) -> ListenGuard>;

/// The read/listen pair used to construct a base container.
pub struct Producer<T> {
    pub(crate) read: ReadFn<T>,
    pub(crate) listen: ListenFn<T>,
}

impl<T> Producer<T> {
    /// Creates a producer from its two halves.
    ///
    /// `read` must be cheap and side-effect-free relative to repeated
    /// invocation: it runs anew on every read of an inactive container.
    /// `listen` must consume the `InitialSnapshot` synchronously before
    /// returning and before any asynchronous use of the controller.
    pub fn new(
        read: impl Fn() -> ValueSet<T> + 'static,
        listen: impl FnMut(InitialSnapshot<T>, Controller<T>) -> ListenGuard + 'static,
    ) -> Self {
        Self {
            read: Box::new(read),
            listen: Box::new(listen),
        }
    }
}

/// One-shot setter for the initial snapshot of an activation.
///
/// Consuming `set` makes a second call impossible; a producer that returns
/// from `listen` without calling it is reported at subscribe time.
pub struct InitialSnapshot<T> {
    state: Rc<SharedState<T>>,
    epoch: u64,
}

impl<T: Eq + Hash + Clone + 'static> InitialSnapshot<T> {
    pub(crate) fn new(state: Rc<SharedState<T>>, epoch: u64) -> Self {
        Self { state, epoch }
    }

    /// Establishes the initial contents of this activation.
    ///
    /// # Panics
    ///
    /// Panics when called outside the synchronous extent of the `listen`
    /// call it was passed to.
    pub fn set(self, values: ValueSet<T>) {
        if !self.state.is_activating(self.epoch) {
            panic!("initial snapshot must be set synchronously during listen");
        }
        self.state.install_snapshot(values);
    }
}

/// Normalized cleanup handle returned by `listen`.
///
/// Mandatory-by-position cleanup with an optional pull hook; producers
/// that need neither return `ListenGuard::default()`.
#[derive(Default)]
pub struct ListenGuard {
    pub(crate) cleanup: Option<Box<dyn FnOnce()>>,
    pub(crate) pull: Option<Box<dyn FnMut()>>,
}

impl ListenGuard {
    /// Creates a guard that runs `cleanup` at deactivation.
    pub fn new(cleanup: impl FnOnce() + 'static) -> Self {
        Self {
            cleanup: Some(Box::new(cleanup)),
            pull: None,
        }
    }

    /// Attaches a pull hook: invoked when a downstream read or
    /// `pull_changes` needs queued upstream changes delivered now.
    pub fn with_pull(mut self, pull: impl FnMut() + 'static) -> Self {
        self.pull = Some(Box::new(pull));
        self
    }
}
