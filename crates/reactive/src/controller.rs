//! The mutation capability handed to an active producer.
//!
//! A controller is bound to exactly one activation of its container. Adds
//! and removes are idempotent against the current snapshot; end and error
//! are idempotent terminal transitions. Once the container has ended every
//! operation is a no-op, but using a controller from a superseded
//! activation of a live container is a protocol violation and fails
//! loudly rather than corrupting the snapshot.

use alloc::rc::Weak;
use core::hash::Hash;
use liveset_core::{ChangeRecord, StreamError};

use crate::live_set::SharedState;

/// The add/remove/error/end handle given to a producer.
pub struct Controller<T> {
    state: Weak<SharedState<T>>,
    epoch: u64,
}

impl<T> Clone for Controller<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            epoch: self.epoch,
        }
    }
}

impl<T: Eq + Hash + Clone + 'static> Controller<T> {
    pub(crate) fn new(state: Weak<SharedState<T>>, epoch: u64) -> Self {
        Self { state, epoch }
    }

    /// Returns true once this capability no longer drives its container:
    /// after the container ended, deactivated, or was dropped.
    pub fn is_closed(&self) -> bool {
        match self.state.upgrade() {
            Some(state) => !state.is_current_activation(self.epoch),
            None => true,
        }
    }

    /// Adds a value to the snapshot and queues an add record.
    ///
    /// A no-op when the value is already present or the container has
    /// ended.
    pub fn add(&self, value: T) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        if state.is_ended() {
            return;
        }
        self.assert_current(&state);
        if state.snapshot_insert(value.clone()) {
            SharedState::queue_change(&state, Some(ChangeRecord::Add(value)));
        }
    }

    /// Removes a value from the snapshot and queues a remove record.
    ///
    /// A no-op when the value is absent or the container has ended.
    pub fn remove(&self, value: &T) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        if state.is_ended() {
            return;
        }
        self.assert_current(&state);
        if state.snapshot_remove(value) {
            SharedState::queue_change(&state, Some(ChangeRecord::Remove(value.clone())));
        }
    }

    /// Terminates the container with an error. Idempotent.
    pub fn error(&self, err: StreamError) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        if state.is_ended() {
            return;
        }
        self.assert_current(&state);
        state.mark_ended(Some(err));
        SharedState::queue_change(&state, None);
        SharedState::deactivate(&state);
    }

    /// Terminates the container normally. Idempotent.
    pub fn end(&self) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        if state.is_ended() {
            return;
        }
        self.assert_current(&state);
        state.mark_ended(None);
        SharedState::queue_change(&state, None);
        SharedState::deactivate(&state);
    }

    fn assert_current(&self, state: &SharedState<T>) {
        if !state.is_current_activation(self.epoch) {
            panic!("stale controller used after deactivation");
        }
    }
}
