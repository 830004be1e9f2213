//! Merge operator: the live union of several containers.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::hash::Hash;
use liveset_core::{ChangeRecord, Scheduler, ValueSet};
use liveset_reactive::{LiveSet, Observer, Producer, Subscription};

/// Derives a container forwarding every input's adds and removes
/// verbatim.
///
/// The output completes exactly once, after every input has completed; an
/// empty input list completes at activation. Any input error propagates
/// immediately and tears the remaining subscriptions down.
pub fn merge<T>(sources: &[LiveSet<T>], scheduler: &Rc<Scheduler>) -> LiveSet<T>
where
    T: Eq + Hash + Clone + 'static,
{
    let sources: Rc<Vec<LiveSet<T>>> = Rc::new(sources.to_vec());
    let read_sources = sources.clone();
    LiveSet::new(
        Producer::new(
            move || {
                let mut out = ValueSet::default();
                for source in read_sources.iter() {
                    for value in source.values().iter() {
                        out.insert(value.clone());
                    }
                }
                out
            },
            move |snapshot, controller| {
                let subs: Rc<RefCell<Vec<Subscription<T>>>> = Rc::new(RefCell::new(Vec::new()));
                let live = Rc::new(Cell::new(sources.len()));
                let done_subscribing = Rc::new(Cell::new(false));

                for source in sources.iter() {
                    let next_controller = controller.clone();
                    let error_controller = controller.clone();
                    let complete_controller = controller.clone();
                    let complete_live = live.clone();
                    let complete_done = done_subscribing.clone();
                    let sub = source.subscribe(
                        Observer::new()
                            .on_next(move |changes: &[ChangeRecord<T>]| {
                                for change in changes {
                                    match change {
                                        ChangeRecord::Add(value) => {
                                            next_controller.add(value.clone())
                                        }
                                        ChangeRecord::Remove(value) => {
                                            next_controller.remove(value)
                                        }
                                        ChangeRecord::End => {}
                                    }
                                }
                            })
                            .on_error(move |err| error_controller.error(err.clone()))
                            .on_complete(move || {
                                complete_live.set(complete_live.get() - 1);
                                if complete_done.get() && complete_live.get() == 0 {
                                    complete_controller.end();
                                }
                            }),
                    );
                    subs.borrow_mut().push(sub);
                }

                let mut initial = ValueSet::default();
                for source in sources.iter() {
                    for value in source.values().iter() {
                        initial.insert(value.clone());
                    }
                }
                snapshot.set(initial);

                done_subscribing.set(true);
                if live.get() == 0 {
                    controller.end();
                }

                if subs.borrow().is_empty() {
                    return liveset_reactive::ListenGuard::default();
                }
                let cleanup_subs = subs.clone();
                let pull_subs = subs;
                liveset_reactive::ListenGuard::new(move || {
                    for sub in cleanup_subs.borrow().iter() {
                        sub.unsubscribe();
                    }
                })
                .with_pull(move || {
                    for sub in pull_subs.borrow().iter() {
                        sub.pull_changes();
                    }
                })
            },
        ),
        scheduler,
    )
}
