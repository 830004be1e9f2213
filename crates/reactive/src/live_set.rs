//! The reactive set container.
//!
//! A `LiveSet` owns a lazily materialized snapshot, a registry of
//! observers, and a change-record queue flushed through the batch
//! scheduler. Its producer is activated when the observer count goes 0 to 1
//! and deactivated when it returns to 0; termination is permanent and
//! global.
//!
//! Reads are pull-based: `values` forces pending upstream deliveries
//! first, so a synchronous read always reflects every mutation issued so
//! far even though observers are notified on a later tick.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::{Cell, Ref, RefCell};
use core::hash::Hash;
use liveset_core::{ChangeRecord, Scheduler, StreamError, ValueSet};

use crate::controller::Controller;
use crate::observer::{Observer, ObserverRecord};
use crate::producer::{InitialSnapshot, ListenFn, Producer, ReadFn};
use crate::subscription::Subscription;

/// A collection of values that changes over time.
///
/// Handles are cheap to clone and share one underlying container.
pub struct LiveSet<T> {
    state: Rc<SharedState<T>>,
}

impl<T> Clone for LiveSet<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

// Identity semantics: two handles are equal iff they share one container.
// This is what lets containers themselves be the values of another
// container (the pooling pattern behind the recursive flat-map).
impl<T> PartialEq for LiveSet<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

impl<T> Eq for LiveSet<T> {}

impl<T> Hash for LiveSet<T> {
    fn hash<H: core::hash::Hasher>(&self, hasher: &mut H) {
        (Rc::as_ptr(&self.state) as usize).hash(hasher);
    }
}

/// Capability-discovery hook: a type that can present itself as a live
/// collection. `LiveSet` is its own source.
pub trait ObservableSource<T> {
    /// Returns the underlying live collection.
    fn as_live_set(&self) -> &LiveSet<T>;
}

impl<T> ObservableSource<T> for LiveSet<T> {
    fn as_live_set(&self) -> &LiveSet<T> {
        self
    }
}

struct Activation {
    epoch: u64,
    cleanup: Option<alloc::boxed::Box<dyn FnOnce()>>,
    pull: Option<alloc::boxed::Box<dyn FnMut()>>,
}

pub(crate) struct SharedState<T> {
    scheduler: Rc<Scheduler>,
    read: ReadFn<T>,
    listen: RefCell<ListenFn<T>>,
    values: RefCell<Option<ValueSet<T>>>,
    active: RefCell<Option<Activation>>,
    epoch: Cell<u64>,
    activating: Cell<bool>,
    ended: Cell<bool>,
    end_error: RefCell<Option<StreamError>>,
    flush_queued: Cell<bool>,
    queue: RefCell<Vec<ChangeRecord<T>>>,
    observers: RefCell<Vec<Rc<ObserverRecord<T>>>>,
    pulling: Cell<bool>,
}

impl<T: Eq + Hash + Clone + 'static> LiveSet<T> {
    /// Creates a container from a producer, batching deliveries through
    /// the given scheduler. Derived containers share their upstream's
    /// scheduler.
    pub fn new(producer: Producer<T>, scheduler: &Rc<Scheduler>) -> Self {
        let Producer { read, listen } = producer;
        Self {
            state: Rc::new(SharedState {
                scheduler: scheduler.clone(),
                read,
                listen: RefCell::new(listen),
                values: RefCell::new(None),
                active: RefCell::new(None),
                epoch: Cell::new(0),
                activating: Cell::new(false),
                ended: Cell::new(false),
                end_error: RefCell::new(None),
                flush_queued: Cell::new(false),
                queue: RefCell::new(Vec::new()),
                observers: RefCell::new(Vec::new()),
                pulling: Cell::new(false),
            }),
        }
    }

    /// Creates an already-active container driven by the returned
    /// controller, for ad hoc producing and tests.
    pub fn active(
        scheduler: &Rc<Scheduler>,
        initial: ValueSet<T>,
    ) -> (LiveSet<T>, Controller<T>) {
        let seed = Rc::new(RefCell::new(initial));
        let slot: Rc<RefCell<Option<Controller<T>>>> = Rc::new(RefCell::new(None));
        let read_seed = seed.clone();
        let listen_slot = slot.clone();
        let set = LiveSet::new(
            Producer::new(
                move || read_seed.borrow().clone(),
                move |snapshot, controller| {
                    snapshot.set(seed.borrow().clone());
                    *listen_slot.borrow_mut() = Some(controller);
                    crate::producer::ListenGuard::default()
                },
            ),
            scheduler,
        );
        let _ = set.subscribe(Observer::new());
        let controller = slot
            .borrow_mut()
            .take()
            .expect("listen runs synchronously on first subscribe");
        (set, controller)
    }

    /// Creates an immediately-ended container holding a fixed snapshot.
    pub fn constant(scheduler: &Rc<Scheduler>, values: ValueSet<T>) -> LiveSet<T> {
        let (set, controller) = LiveSet::active(scheduler, values);
        controller.end();
        set
    }

    /// Returns a fresh copy of the current contents.
    ///
    /// Active containers pull pending upstream changes first, so the
    /// result reflects every mutation issued synchronously so far. Ended
    /// containers answer with the snapshot frozen at termination.
    /// Inactive containers invoke the producer's read anew on every call.
    pub fn values(&self) -> ValueSet<T> {
        if self.state.values.borrow().is_some() {
            if self.state.active.borrow().is_some() {
                SharedState::pull_producer(&self.state);
            }
            if let Some(values) = self.state.values.borrow().as_ref() {
                return values.clone();
            }
        }
        (self.state.read)()
    }

    /// Returns whether the container has reached its terminal state.
    #[inline]
    pub fn is_ended(&self) -> bool {
        self.state.ended.get()
    }

    /// Returns the number of registered observers.
    #[inline]
    pub fn subscriber_count(&self) -> usize {
        self.state.observers.borrow().len()
    }

    /// Returns the scheduler this container batches deliveries through.
    #[inline]
    pub fn scheduler(&self) -> &Rc<Scheduler> {
        &self.state.scheduler
    }

    /// Registers an observer and returns its subscription.
    ///
    /// Subscribing to an ended container synthesizes an immediately
    /// resolved subscription: `start`, then `complete` or `error` unless
    /// the observer unsubscribed during `start`; the producer is never
    /// reactivated. Otherwise the observer is registered with a skip
    /// count equal to the queued-change count, so it never sees changes
    /// issued before it joined, and the producer is activated if this is
    /// the first real observer.
    pub fn subscribe(&self, observer: Observer<T>) -> Subscription<T> {
        let state = &self.state;

        if state.ended.get() {
            let record = ObserverRecord::new(observer, 0);
            let subscription = Subscription::new(Rc::downgrade(state), record.clone());
            record.call_start(&subscription);
            if !record.is_closed() {
                let err = state.end_error.borrow().clone();
                match err {
                    Some(err) => record.call_error(&err),
                    None => record.call_complete(),
                }
            }
            record.finalized.set(true);
            return subscription;
        }

        let skip = state.queue.borrow().len();
        let record = ObserverRecord::new(observer, skip);
        state.observers.borrow_mut().push(record.clone());
        let subscription = Subscription::new(Rc::downgrade(state), record.clone());
        record.call_start(&subscription);

        // An observer that unsubscribed during start never really
        // subscribed: activation is skipped entirely.
        if !record.is_closed() && !state.ended.get() && state.active.borrow().is_none() {
            SharedState::activate(state);
            // Mutations issued while listen ran are already part of the
            // snapshot this observer reads; fold them out of its feed.
            record.skip.set(state.queue.borrow().len());
        }
        subscription
    }

    /// Single-callback shorthand for `subscribe`.
    pub fn subscribe_next(
        &self,
        next: impl FnMut(&[ChangeRecord<T>]) + 'static,
    ) -> Subscription<T> {
        self.subscribe(Observer::new().on_next(next))
    }
}

impl<T: Eq + Hash + Clone + 'static> SharedState<T> {
    #[inline]
    pub(crate) fn is_ended(&self) -> bool {
        self.ended.get()
    }

    pub(crate) fn is_current_activation(&self, epoch: u64) -> bool {
        matches!(self.active.borrow().as_ref(), Some(act) if act.epoch == epoch)
    }

    pub(crate) fn is_activating(&self, epoch: u64) -> bool {
        self.activating.get() && self.epoch.get() == epoch
    }

    pub(crate) fn install_snapshot(&self, values: ValueSet<T>) {
        *self.values.borrow_mut() = Some(values);
    }

    /// Inserts into the live snapshot. Panics when the producer has not
    /// yet established the initial snapshot.
    pub(crate) fn snapshot_insert(&self, value: T) -> bool {
        match self.values.borrow_mut().as_mut() {
            Some(values) => values.insert(value),
            None => panic!("initial snapshot must be set before the controller is used"),
        }
    }

    pub(crate) fn snapshot_remove(&self, value: &T) -> bool {
        match self.values.borrow_mut().as_mut() {
            Some(values) => values.shift_remove(value),
            None => panic!("initial snapshot must be set before the controller is used"),
        }
    }

    pub(crate) fn mark_ended(&self, err: Option<StreamError>) {
        self.ended.set(true);
        *self.end_error.borrow_mut() = err;
    }

    pub(crate) fn queue_snapshot(&self) -> Ref<'_, Vec<ChangeRecord<T>>> {
        self.queue.borrow()
    }

    /// Appends a record (if any) and arranges one deferred flush for all
    /// records queued before it runs.
    pub(crate) fn queue_change(state: &Rc<Self>, record: Option<ChangeRecord<T>>) {
        if let Some(record) = record {
            state.queue.borrow_mut().push(record);
        }
        if !state.flush_queued.replace(true) {
            let weak = Rc::downgrade(state);
            state.scheduler.schedule(move || {
                if let Some(state) = weak.upgrade() {
                    SharedState::deliver(&state);
                }
            });
        }
    }

    /// The scheduled flush: drains the queue and notifies observers.
    ///
    /// Every observer is offered the same batch (less its skip prefix)
    /// before any terminal callback fires; when the container has ended,
    /// the registry is drained and each remaining observer receives its
    /// terminal notification after the final batch.
    fn deliver(state: &Rc<Self>) {
        state.flush_queued.set(false);
        let changes = core::mem::take(&mut *state.queue.borrow_mut());
        let ended = state.ended.get();
        let observers: Vec<Rc<ObserverRecord<T>>> = if ended {
            core::mem::take(&mut *state.observers.borrow_mut())
        } else {
            state.observers.borrow().clone()
        };
        if ended {
            for record in &observers {
                record.finalized.set(true);
            }
        }
        for record in &observers {
            if record.unsubscribed.get() {
                continue;
            }
            let skip = record.skip.replace(0).min(changes.len());
            let batch = &changes[skip..];
            if !batch.is_empty() {
                record.call_next(batch);
            }
        }
        if ended {
            let err = state.end_error.borrow().clone();
            for record in &observers {
                if record.unsubscribed.get() {
                    continue;
                }
                match &err {
                    Some(err) => record.call_error(err),
                    None => record.call_complete(),
                }
            }
        }
    }

    /// Runs the producer's listen, establishing the activation.
    fn activate(state: &Rc<Self>) {
        let epoch = state.epoch.get() + 1;
        state.epoch.set(epoch);
        *state.active.borrow_mut() = Some(Activation {
            epoch,
            cleanup: None,
            pull: None,
        });
        let controller = Controller::new(Rc::downgrade(state), epoch);
        let snapshot = InitialSnapshot::new(state.clone(), epoch);
        state.activating.set(true);
        let guard = {
            let mut listen = state.listen.borrow_mut();
            (*listen)(snapshot, controller)
        };
        state.activating.set(false);
        if state.values.borrow().is_none() {
            panic!("listen must set the initial snapshot exactly once before returning");
        }
        let mut active = state.active.borrow_mut();
        match active.as_mut() {
            Some(act) if act.epoch == epoch => {
                act.cleanup = guard.cleanup;
                act.pull = guard.pull;
            }
            _ => {
                // The controller ended the container during listen; the
                // activation is already torn down, so the real cleanup
                // runs now.
                drop(active);
                if let Some(cleanup) = guard.cleanup {
                    cleanup();
                }
            }
        }
    }

    /// Tears down the current activation and runs its cleanup.
    pub(crate) fn deactivate(state: &Rc<Self>) {
        let activation = state.active.borrow_mut().take();
        match activation {
            Some(act) => {
                if let Some(cleanup) = act.cleanup {
                    cleanup();
                }
            }
            None => panic!("container is already inactive"),
        }
    }

    /// Invokes the active producer's pull hook, guarded against re-entry
    /// so cycles and diamond-shaped graphs pull each container at most
    /// once per in-flight pull.
    pub(crate) fn pull_producer(state: &Rc<Self>) {
        if state.pulling.replace(true) {
            return;
        }
        let taken = {
            let mut active = state.active.borrow_mut();
            active.as_mut().map(|act| (act.epoch, act.pull.take()))
        };
        if let Some((epoch, Some(mut pull))) = taken {
            pull();
            let mut active = state.active.borrow_mut();
            if let Some(act) = active.as_mut() {
                if act.epoch == epoch {
                    act.pull = Some(pull);
                }
            }
        }
        state.pulling.set(false);
    }

    /// Removes an observer; deactivates the producer when the last
    /// observer of a live container leaves.
    pub(crate) fn unsubscribe(state: &Rc<Self>, record: &Rc<ObserverRecord<T>>) {
        record.unsubscribed.set(true);
        let removed = {
            let mut observers = state.observers.borrow_mut();
            match observers.iter().position(|r| Rc::ptr_eq(r, record)) {
                Some(ix) => {
                    observers.remove(ix);
                    true
                }
                None => false,
            }
        };
        if removed && !state.ended.get() && state.observers.borrow().is_empty() {
            *state.values.borrow_mut() = None;
            SharedState::deactivate(state);
        }
    }
}
