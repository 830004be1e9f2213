//! Shared child-subscription bookkeeping for the flat-expand operators.
//!
//! Both flat-map variants track one child container per upstream value.
//! The pool records, for every tracked child, its subscription and whether
//! it has completed; completed children stay tracked so their values can
//! still be removed when the upstream value goes away. The pool also
//! carries the change-activity counter driving pull propagation rounds.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::hash::Hash;
use hashbrown::hash_map::DefaultHashBuilder;
use indexmap::IndexMap;
use liveset_core::ChangeRecord;
use liveset_reactive::{Controller, LiveSet, Observer, Subscription};

pub(crate) struct ChildEntry<U> {
    set: LiveSet<U>,
    sub: Option<Subscription<U>>,
    completed: bool,
}

/// Per-activation state shared between the main observer, every child
/// observer, the pull hook and the cleanup of a flat-expand operator.
pub(crate) struct ChildPool<T, U> {
    children: RefCell<IndexMap<T, ChildEntry<U>, DefaultHashBuilder>>,
    /// Children subscribed and not yet completed.
    live: Cell<usize>,
    main_done: Cell<bool>,
    /// Initial derivation finished; completion checks are armed.
    initialized: Cell<bool>,
    /// Bumped on every forwarded change and every newly tracked child;
    /// a pull round that leaves it untouched has settled.
    activity: Cell<u64>,
    pull_in_flight: Cell<bool>,
}

impl<T, U> ChildPool<T, U>
where
    T: Eq + Hash + Clone + 'static,
    U: Eq + Hash + Clone + 'static,
{
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self {
            children: RefCell::new(IndexMap::default()),
            live: Cell::new(0),
            main_done: Cell::new(false),
            initialized: Cell::new(false),
            activity: Cell::new(0),
            pull_in_flight: Cell::new(false),
        })
    }

    #[inline]
    pub(crate) fn bump(&self) {
        self.activity.set(self.activity.get() + 1);
    }

    /// Tracks and subscribes the child derived for `key`, forwarding its
    /// change records into `controller`.
    pub(crate) fn attach(pool: &Rc<Self>, key: T, child: LiveSet<U>, controller: &Controller<U>) {
        pool.children.borrow_mut().insert(
            key.clone(),
            ChildEntry {
                set: child.clone(),
                sub: None,
                completed: false,
            },
        );
        pool.live.set(pool.live.get() + 1);
        pool.bump();

        let next_pool = pool.clone();
        let next_controller = controller.clone();
        let error_controller = controller.clone();
        let complete_pool = pool.clone();
        let complete_controller = controller.clone();
        let complete_key = key.clone();
        let sub = child.subscribe(
            Observer::new()
                .on_next(move |changes: &[ChangeRecord<U>]| {
                    next_pool.bump();
                    for change in changes {
                        match change {
                            ChangeRecord::Add(value) => next_controller.add(value.clone()),
                            ChangeRecord::Remove(value) => next_controller.remove(value),
                            ChangeRecord::End => {}
                        }
                    }
                })
                .on_error(move |err| error_controller.error(err.clone()))
                .on_complete(move || {
                    // The entry stays tracked: a later upstream remove must
                    // still see the child's frozen values.
                    if let Some(entry) = complete_pool.children.borrow_mut().get_mut(&complete_key)
                    {
                        if !entry.completed {
                            entry.completed = true;
                            complete_pool.live.set(complete_pool.live.get() - 1);
                        }
                    }
                    complete_pool.maybe_end(&complete_controller);
                }),
        );
        if let Some(entry) = pool.children.borrow_mut().get_mut(&key) {
            entry.sub = Some(sub);
        }
    }

    /// Handles an upstream removal: forwards a synthetic remove for every
    /// value the child holds, then unsubscribes and forgets it.
    pub(crate) fn on_upstream_remove(&self, key: &T, controller: &Controller<U>) {
        let entry = self.children.borrow_mut().shift_remove(key);
        let Some(entry) = entry else {
            panic!("removed value has no tracked child");
        };
        let Some(sub) = entry.sub else {
            panic!("tracked child was never subscribed");
        };
        self.bump();
        for value in entry.set.values().iter() {
            controller.remove(value);
        }
        sub.unsubscribe();
        if !entry.completed {
            self.live.set(self.live.get() - 1);
        }
    }

    pub(crate) fn main_completed(&self, controller: &Controller<U>) {
        self.main_done.set(true);
        self.maybe_end(controller);
    }

    /// Arms completion checks once the initial derivation is done.
    pub(crate) fn finish_initialization(&self, controller: &Controller<U>) {
        self.initialized.set(true);
        self.maybe_end(controller);
    }

    /// Ends the output once the upstream has completed and no live child
    /// subscriptions remain.
    fn maybe_end(&self, controller: &Controller<U>) {
        if self.initialized.get() && self.main_done.get() && self.live.get() == 0 {
            controller.end();
        }
    }

    /// Propagates a pull to the main subscription and every tracked child
    /// subscription, repeating the round while any pull produced change
    /// activity (a child discovered mid-round needs pulling too). A pull
    /// already in flight makes re-entrant pulls no-ops.
    pub(crate) fn pull_rounds(&self, main: &Subscription<T>) {
        if self.pull_in_flight.replace(true) {
            return;
        }
        loop {
            let before = self.activity.get();
            main.pull_changes();
            let subs: Vec<Subscription<U>> = self
                .children
                .borrow()
                .values()
                .filter_map(|entry| entry.sub.clone())
                .collect();
            for sub in subs {
                sub.pull_changes();
            }
            if self.activity.get() == before {
                break;
            }
        }
        self.pull_in_flight.set(false);
    }

    /// Unsubscribes every tracked child and clears the pool.
    pub(crate) fn teardown(&self) {
        let entries: Vec<ChildEntry<U>> = self
            .children
            .borrow_mut()
            .drain(..)
            .map(|(_, entry)| entry)
            .collect();
        for entry in entries {
            if let Some(sub) = entry.sub {
                sub.unsubscribe();
            }
        }
    }
}

/// Builds the upstream observer shared by both flat-map variants: adds
/// derive, track and flatten a new child; removes tear one down; errors
/// and completion propagate.
pub(crate) fn main_observer<T, U, F>(
    pool: &Rc<ChildPool<T, U>>,
    expand: &Rc<RefCell<F>>,
    controller: &Controller<U>,
) -> Observer<T>
where
    T: Eq + Hash + Clone + 'static,
    U: Eq + Hash + Clone + 'static,
    F: FnMut(&T) -> LiveSet<U> + 'static,
{
    let next_pool = pool.clone();
    let next_expand = expand.clone();
    let next_controller = controller.clone();
    let error_controller = controller.clone();
    let complete_pool = pool.clone();
    let complete_controller = controller.clone();
    Observer::new()
        .on_next(move |changes| {
            next_pool.bump();
            for change in changes {
                match change {
                    ChangeRecord::Add(value) => {
                        let child = (&mut *next_expand.borrow_mut())(value);
                        ChildPool::attach(&next_pool, value.clone(), child.clone(), &next_controller);
                        for flattened in child.values().iter() {
                            next_controller.add(flattened.clone());
                        }
                    }
                    ChangeRecord::Remove(value) => {
                        next_pool.on_upstream_remove(value, &next_controller);
                    }
                    ChangeRecord::End => {}
                }
            }
        })
        .on_error(move |err| error_controller.error(err.clone()))
        .on_complete(move || complete_pool.main_completed(&complete_controller))
}
