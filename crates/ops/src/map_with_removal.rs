//! Map operator handing the transform a per-value removal signal.

use alloc::rc::Rc;
use core::cell::RefCell;
use core::hash::Hash;
use hashbrown::HashMap;
use liveset_core::{ChangeRecord, ValueSet};
use liveset_reactive::{LiveSet, ListenGuard, Observer, Producer};

use crate::removal::{Removal, RemovalResolver};

/// Like `map`, but `transform` also receives a `Removal` that resolves
/// exactly once: when the value is removed, or when the activation tears
/// down (unsubscribe or termination) while the value is still held.
///
/// A removal signal needs an activation to honor it, so reads on an
/// inactive instance fail instead of minting signals nothing will ever
/// resolve.
pub fn map_with_removal<T, U, F>(source: &LiveSet<T>, transform: F) -> LiveSet<U>
where
    T: Eq + Hash + Clone + 'static,
    U: Eq + Hash + Clone + 'static,
    F: FnMut(&T, Removal) -> U + 'static,
{
    let transform = Rc::new(RefCell::new(transform));
    let listen_source = source.clone();
    let scheduler = source.scheduler().clone();
    LiveSet::new(
        Producer::new(
            || panic!("reading an inactive map_with_removal is not supported"),
            move |snapshot, controller| {
                let entries: Rc<RefCell<HashMap<T, (U, RemovalResolver)>>> =
                    Rc::new(RefCell::new(HashMap::new()));
                let next_entries = entries.clone();
                let next_transform = transform.clone();
                let next_controller = controller.clone();
                let error_controller = controller.clone();
                let sub = listen_source.subscribe(
                    Observer::new()
                        .on_next(move |changes| {
                            for change in changes {
                                match change {
                                    ChangeRecord::Add(value) => {
                                        if next_entries.borrow().contains_key(value) {
                                            continue;
                                        }
                                        let (removal, resolver) = Removal::new();
                                        let out =
                                            (&mut *next_transform.borrow_mut())(value, removal);
                                        next_entries
                                            .borrow_mut()
                                            .insert(value.clone(), (out.clone(), resolver));
                                        next_controller.add(out);
                                    }
                                    ChangeRecord::Remove(value) => {
                                        let removed = next_entries.borrow_mut().remove(value);
                                        match removed {
                                            Some((out, resolver)) => {
                                                resolver.resolve();
                                                next_controller.remove(&out);
                                            }
                                            None => panic!("removed value was never mapped"),
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
                    let mut entries_mut = entries.borrow_mut();
                    for value in listen_source.values().iter() {
                        let (removal, resolver) = Removal::new();
                        let out = (&mut *transform.borrow_mut())(value, removal);
                        entries_mut.insert(value.clone(), (out.clone(), resolver));
                        initial.insert(out);
                    }
                }
                snapshot.set(initial);

                let cleanup_entries = entries;
                let pull_sub = sub.clone();
                ListenGuard::new(move || {
                    sub.unsubscribe();
                    // Signals for values still held resolve at teardown.
                    let resolvers: alloc::vec::Vec<RemovalResolver> = cleanup_entries
                        .borrow_mut()
                        .drain()
                        .map(|(_, (_, resolver))| resolver)
                        .collect();
                    for resolver in resolvers {
                        resolver.resolve();
                    }
                })
                .with_pull(move || pull_sub.pull_changes())
            },
        ),
        &scheduler,
    )
}
