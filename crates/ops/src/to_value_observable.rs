//! Per-value observable adapter.
//!
//! Flattens the batched add/remove protocol into one callback per value:
//! each emission carries the value and a `Removal` signal that resolves
//! when the value leaves the set, when the container ends, or when the
//! observer unsubscribes.

use alloc::rc::Rc;
use core::cell::RefCell;
use core::hash::Hash;
use hashbrown::HashMap;
use liveset_core::ChangeRecord;
use liveset_reactive::{LiveSet, Observer, Subscription};

use crate::removal::{Removal, RemovalResolver};

/// One emitted value and its removal signal.
pub struct EachValue<T> {
    pub value: T,
    pub removal: Removal,
}

/// A per-value view over a live collection.
pub struct ValueObservable<T> {
    source: LiveSet<T>,
}

/// Wraps a container for per-value observation.
pub fn to_value_observable<T>(source: &LiveSet<T>) -> ValueObservable<T>
where
    T: Eq + Hash + Clone + 'static,
{
    ValueObservable {
        source: source.clone(),
    }
}

type Outstanding<T> = Rc<RefCell<HashMap<T, RemovalResolver>>>;

impl<T: Eq + Hash + Clone + 'static> ValueObservable<T> {
    /// Subscribes: `on_value` fires synchronously for every current
    /// value, then once for each later addition.
    pub fn subscribe(&self, on_value: impl FnMut(EachValue<T>) + 'static) -> ValueSubscription<T> {
        let on_value = Rc::new(RefCell::new(on_value));
        let outstanding: Outstanding<T> = Rc::new(RefCell::new(HashMap::new()));

        let next_on_value = on_value.clone();
        let next_outstanding = outstanding.clone();
        let error_outstanding = outstanding.clone();
        let complete_outstanding = outstanding.clone();
        let inner = self.source.subscribe(
            Observer::new()
                .on_next(move |changes: &[ChangeRecord<T>]| {
                    for change in changes {
                        match change {
                            ChangeRecord::Add(value) => {
                                if next_outstanding.borrow().contains_key(value) {
                                    continue;
                                }
                                let (removal, resolver) = Removal::new();
                                next_outstanding.borrow_mut().insert(value.clone(), resolver);
                                (&mut *next_on_value.borrow_mut())(EachValue {
                                    value: value.clone(),
                                    removal,
                                });
                            }
                            ChangeRecord::Remove(value) => {
                                if let Some(resolver) =
                                    next_outstanding.borrow_mut().remove(value)
                                {
                                    resolver.resolve();
                                }
                            }
                            ChangeRecord::End => {}
                        }
                    }
                })
                .on_error(move |_| resolve_all(&error_outstanding))
                .on_complete(move || resolve_all(&complete_outstanding)),
        );

        // Current contents are emitted synchronously at subscribe time.
        for value in self.source.values().iter() {
            if outstanding.borrow().contains_key(value) {
                continue;
            }
            let (removal, resolver) = Removal::new();
            outstanding.borrow_mut().insert(value.clone(), resolver);
            (&mut *on_value.borrow_mut())(EachValue {
                value: value.clone(),
                removal,
            });
        }

        ValueSubscription { inner, outstanding }
    }
}

fn resolve_all<T: Eq + Hash>(outstanding: &Outstanding<T>) {
    let resolvers: alloc::vec::Vec<RemovalResolver> = outstanding
        .borrow_mut()
        .drain()
        .map(|(_, resolver)| resolver)
        .collect();
    for resolver in resolvers {
        resolver.resolve();
    }
}

/// Handle for a per-value observation; releasing it resolves every
/// outstanding removal signal.
pub struct ValueSubscription<T> {
    inner: Subscription<T>,
    outstanding: Outstanding<T>,
}

impl<T: Eq + Hash + Clone + 'static> ValueSubscription<T> {
    /// Returns true once no further emissions can occur.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Stops observing and resolves every outstanding removal signal.
    pub fn unsubscribe(&self) {
        self.inner.unsubscribe();
        resolve_all(&self.outstanding);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::rc::Rc;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::cell::Cell;
    use liveset_core::{DeferQueue, Scheduler, ValueSet};
    use liveset_reactive::{ListenGuard, Producer};

    fn rig() -> (DeferQueue, Rc<Scheduler>) {
        let ticks = DeferQueue::new();
        let scheduler = Rc::new(Scheduler::new(ticks.defer_fn()));
        (ticks, scheduler)
    }

    #[test]
    fn test_emits_current_values_then_additions() {
        let (ticks, scheduler) = rig();
        let cleanups = Rc::new(Cell::new(0));
        let slot: Rc<RefCell<Option<liveset_reactive::Controller<i32>>>> =
            Rc::new(RefCell::new(None));
        let cl = cleanups.clone();
        let s = slot.clone();
        let set = LiveSet::new(
            Producer::new(
                || ValueSet::from_iter([5, 6]),
                move |snapshot, controller| {
                    snapshot.set(ValueSet::from_iter([5, 6]));
                    *s.borrow_mut() = Some(controller);
                    let cl = cl.clone();
                    ListenGuard::new(move || cl.set(cl.get() + 1))
                },
            ),
            &scheduler,
        );

        let seen: Rc<RefCell<Vec<(i32, Removal)>>> = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        let sub = to_value_observable(&set)
            .subscribe(move |each| log.borrow_mut().push((each.value, each.removal)));

        let values = |seen: &Rc<RefCell<Vec<(i32, Removal)>>>| -> Vec<i32> {
            seen.borrow().iter().map(|(v, _)| *v).collect()
        };
        assert_eq!(values(&seen), vec![5, 6]);

        let controller = slot.borrow_mut().take().unwrap();
        controller.add(7);
        assert_eq!(values(&seen), vec![5, 6]);
        ticks.tick();
        assert_eq!(values(&seen), vec![5, 6, 7]);

        controller.add(8);
        ticks.tick();
        assert_eq!(values(&seen), vec![5, 6, 7, 8]);

        // Removal resolves the matching signals.
        controller.remove(&6);
        controller.remove(&7);
        ticks.tick();
        assert!(seen.borrow()[1].1.is_resolved());
        assert!(seen.borrow()[2].1.is_resolved());
        assert!(!seen.borrow()[3].1.is_resolved());

        // Unsubscribing resolves whatever is still outstanding and runs
        // the producer cleanup.
        assert!(!sub.is_closed());
        assert_eq!(cleanups.get(), 0);
        sub.unsubscribe();
        assert!(sub.is_closed());
        assert_eq!(cleanups.get(), 1);
        assert!(seen.borrow()[3].1.is_resolved());
        assert_eq!(values(&seen), vec![5, 6, 7, 8]);
    }

    #[test]
    fn test_completion_resolves_outstanding() {
        let (ticks, scheduler) = rig();
        let (set, controller) = LiveSet::active(&scheduler, ValueSet::from_iter([1, 2]));
        let seen: Rc<RefCell<Vec<(i32, Removal)>>> = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        let _sub = to_value_observable(&set)
            .subscribe(move |each| log.borrow_mut().push((each.value, each.removal)));

        assert_eq!(seen.borrow().len(), 2);
        controller.end();
        ticks.tick();
        assert!(seen.borrow()[0].1.is_resolved());
        assert!(seen.borrow()[1].1.is_resolved());
    }
}
