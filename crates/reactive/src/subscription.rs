//! Subscription handles.
//!
//! A subscription is the capability an observer holds to release its
//! registration or to force immediate delivery of queued changes,
//! bypassing the deferred batch tick.

use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::hash::Hash;
use liveset_core::ChangeRecord;

use crate::live_set::SharedState;
use crate::observer::ObserverRecord;
use crate::producer::ListenGuard;

/// Handle returned to an observer by `LiveSet::subscribe`.
pub struct Subscription<T> {
    state: Weak<SharedState<T>>,
    record: Rc<ObserverRecord<T>>,
}

impl<T> Clone for Subscription<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            record: self.record.clone(),
        }
    }
}

impl<T: Eq + Hash + Clone + 'static> Subscription<T> {
    pub(crate) fn new(state: Weak<SharedState<T>>, record: Rc<ObserverRecord<T>>) -> Self {
        Self { state, record }
    }

    /// Returns true once the observer can receive no further callbacks:
    /// after `unsubscribe` or after terminal delivery.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.record.is_closed()
    }

    /// Removes the observer. Synchronous and idempotent; when this was the
    /// last observer of a live container, the producer cleanup has already
    /// run by the time this returns.
    pub fn unsubscribe(&self) {
        if let Some(state) = self.state.upgrade() {
            SharedState::unsubscribe(&state, &self.record);
        } else {
            self.record.unsubscribed.set(true);
        }
    }

    /// Synchronously delivers this observer's undelivered queue suffix,
    /// first propagating a pull to the active producer so upstream queues
    /// drain into this container. A no-op when nothing is pending.
    pub fn pull_changes(&self) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        SharedState::pull_producer(&state);
        if self.record.is_closed() {
            return;
        }
        let batch: Vec<ChangeRecord<T>> = {
            let queue = state.queue_snapshot();
            let len = queue.len();
            let skip = self.record.skip.get().min(len);
            if skip == len {
                return;
            }
            self.record.skip.set(len);
            queue[skip..].to_vec()
        };
        if self.record.is_delivering() {
            panic!("pull_changes re-entered during this observer's own delivery");
        }
        self.record.call_next(&batch);
    }

    /// Adapts this subscription into the cleanup handle an operator's
    /// listen returns: unsubscribe as cleanup, pull_changes as the pull
    /// hook.
    pub fn into_guard(self) -> ListenGuard {
        let on_pull = self.clone();
        ListenGuard::new(move || self.unsubscribe()).with_pull(move || on_pull.pull_changes())
    }
}
