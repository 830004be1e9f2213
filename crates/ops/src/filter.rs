//! Incremental filter operator.

use alloc::rc::Rc;
use core::cell::RefCell;
use core::hash::Hash;
use hashbrown::HashSet;
use liveset_core::{ChangeRecord, ValueSet};
use liveset_reactive::{LiveSet, Observer, Producer};

/// Derives a container holding the upstream values that pass `predicate`.
///
/// The predicate is re-evaluated from scratch on every add; removals are
/// forwarded only for values previously recorded as passing, so a
/// predicate that is deterministic per value stays input/output
/// consistent without being assumed pure across calls.
pub fn filter<T, F>(source: &LiveSet<T>, predicate: F) -> LiveSet<T>
where
    T: Eq + Hash + Clone + 'static,
    F: FnMut(&T) -> bool + 'static,
{
    let predicate = Rc::new(RefCell::new(predicate));
    let read_source = source.clone();
    let read_predicate = predicate.clone();
    let listen_source = source.clone();
    let scheduler = source.scheduler().clone();
    LiveSet::new(
        Producer::new(
            move || {
                let mut out = ValueSet::default();
                for value in read_source.values().iter() {
                    if (&mut *read_predicate.borrow_mut())(value) {
                        out.insert(value.clone());
                    }
                }
                out
            },
            move |snapshot, controller| {
                let passing: Rc<RefCell<HashSet<T>>> = Rc::new(RefCell::new(HashSet::new()));
                let next_passing = passing.clone();
                let next_predicate = predicate.clone();
                let next_controller = controller.clone();
                let error_controller = controller.clone();
                let sub = listen_source.subscribe(
                    Observer::new()
                        .on_next(move |changes| {
                            for change in changes {
                                match change {
                                    ChangeRecord::Add(value) => {
                                        if (&mut *next_predicate.borrow_mut())(value) {
                                            next_passing.borrow_mut().insert(value.clone());
                                            next_controller.add(value.clone());
                                        }
                                    }
                                    ChangeRecord::Remove(value) => {
                                        if next_passing.borrow_mut().remove(value) {
                                            next_controller.remove(value);
                                        }
                                    }
                                    ChangeRecord::End => {}
                                }
                            }
                        })
                        .on_error(move |err| error_controller.error(err.clone()))
                        .on_complete(move || controller.end()),
                );
                let mut initial = ValueSet::default();
                {
                    let mut passing = passing.borrow_mut();
                    for value in listen_source.values().iter() {
                        if (&mut *predicate.borrow_mut())(value) {
                            passing.insert(value.clone());
                            initial.insert(value.clone());
                        }
                    }
                }
                snapshot.set(initial);
                sub.into_guard()
            },
        ),
        &scheduler,
    )
}
