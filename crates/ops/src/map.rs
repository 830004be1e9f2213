//! Incremental map operator.

use alloc::rc::Rc;
use core::cell::RefCell;
use core::hash::Hash;
use hashbrown::HashMap;
use liveset_core::{ChangeRecord, ValueSet};
use liveset_reactive::{LiveSet, Observer, Producer};

/// Derives a container holding `transform` of every upstream value.
///
/// The value derived for each upstream addition is remembered and looked
/// up (then forgotten) when that upstream value is removed; the upstream
/// snapshot at removal time no longer contains what the transform saw.
/// An upstream removal with no remembered derivation signals stream
/// corruption and panics.
pub fn map<T, U, F>(source: &LiveSet<T>, transform: F) -> LiveSet<U>
where
    T: Eq + Hash + Clone + 'static,
    U: Eq + Hash + Clone + 'static,
    F: FnMut(&T) -> U + 'static,
{
    let transform = Rc::new(RefCell::new(transform));
    let read_source = source.clone();
    let read_transform = transform.clone();
    let listen_source = source.clone();
    let scheduler = source.scheduler().clone();
    LiveSet::new(
        Producer::new(
            move || {
                let mut out = ValueSet::default();
                for value in read_source.values().iter() {
                    out.insert((&mut *read_transform.borrow_mut())(value));
                }
                out
            },
            move |snapshot, controller| {
                let derived: Rc<RefCell<HashMap<T, U>>> = Rc::new(RefCell::new(HashMap::new()));
                let next_derived = derived.clone();
                let next_transform = transform.clone();
                let next_controller = controller.clone();
                let error_controller = controller.clone();
                let sub = listen_source.subscribe(
                    Observer::new()
                        .on_next(move |changes| {
                            for change in changes {
                                match change {
                                    ChangeRecord::Add(value) => {
                                        let out = (&mut *next_transform.borrow_mut())(value);
                                        next_derived.borrow_mut().insert(value.clone(), out.clone());
                                        next_controller.add(out);
                                    }
                                    ChangeRecord::Remove(value) => {
                                        match next_derived.borrow_mut().remove(value) {
                                            Some(out) => next_controller.remove(&out),
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
                    let mut derived = derived.borrow_mut();
                    for value in listen_source.values().iter() {
                        let out = (&mut *transform.borrow_mut())(value);
                        derived.insert(value.clone(), out.clone());
                        initial.insert(out);
                    }
                }
                snapshot.set(initial);
                sub.into_guard()
            },
        ),
        &scheduler,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::cell::Cell;
    use liveset_core::{DeferQueue, Scheduler, StreamError};

    fn rig() -> (DeferQueue, Rc<Scheduler>) {
        let ticks = DeferQueue::new();
        let scheduler = Rc::new(Scheduler::new(ticks.defer_fn()));
        (ticks, scheduler)
    }

    fn to_vec<T: Clone>(set: &ValueSet<T>) -> Vec<T> {
        set.iter().cloned().collect()
    }

    #[test]
    fn test_map_inactive_read() {
        let (_ticks, scheduler) = rig();
        let (set, controller) = LiveSet::active(&scheduler, ValueSet::from_iter([1, 2]));
        let mapped = map(&set, |x| x * 10);
        assert_eq!(to_vec(&mapped.values()), vec![10, 20]);
        controller.add(3);
        assert_eq!(to_vec(&mapped.values()), vec![10, 20, 30]);
    }

    #[test]
    fn test_map_read_consistency_without_tick() {
        let (ticks, scheduler) = rig();
        let (set, controller) = LiveSet::active(&scheduler, ValueSet::from_iter([5, 6]));
        let mapped = map(&set, |x| x * 10);
        let _sub = mapped.subscribe(Observer::new());

        assert_eq!(to_vec(&mapped.values()), vec![50, 60]);
        controller.add(7);
        // No tick has run; the read pulls the pending change through.
        assert_eq!(to_vec(&mapped.values()), vec![50, 60, 70]);
        ticks.tick();
        assert_eq!(to_vec(&mapped.values()), vec![50, 60, 70]);
    }

    #[test]
    fn test_map_translates_removals_through_bookkeeping() {
        let (ticks, scheduler) = rig();
        let (set, controller) = LiveSet::active(&scheduler, ValueSet::from_iter([1, 2]));
        let mapped = map(&set, |x| x * 10);

        let batches: Rc<RefCell<Vec<Vec<ChangeRecord<i32>>>>> = Rc::new(RefCell::new(Vec::new()));
        let b = batches.clone();
        let _sub = mapped.subscribe_next(move |changes| b.borrow_mut().push(changes.to_vec()));

        controller.remove(&1);
        controller.add(3);
        ticks.tick();
        assert_eq!(
            *batches.borrow(),
            vec![vec![ChangeRecord::Remove(10), ChangeRecord::Add(30)]]
        );
        assert_eq!(to_vec(&mapped.values()), vec![20, 30]);
    }

    #[test]
    fn test_map_transform_runs_once_per_live_add() {
        let (ticks, scheduler) = rig();
        let (set, controller) = LiveSet::active(&scheduler, ValueSet::from_iter([1]));
        let calls = Rc::new(Cell::new(0));
        let c = calls.clone();
        let mapped = map(&set, move |x: &i32| {
            c.set(c.get() + 1);
            x * 10
        });
        let _sub = mapped.subscribe(Observer::new());
        assert_eq!(calls.get(), 1);
        controller.add(2);
        ticks.tick();
        assert_eq!(calls.get(), 2);
        controller.remove(&2);
        ticks.tick();
        // Removal consults the remembered derivation instead.
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_map_propagates_completion_and_error() {
        let (ticks, scheduler) = rig();

        let (set, controller) = LiveSet::active(&scheduler, ValueSet::from_iter([1]));
        let mapped = map(&set, |x| x * 10);
        let completes = Rc::new(Cell::new(0));
        let co = completes.clone();
        let _sub = mapped.subscribe(Observer::new().on_complete(move || co.set(co.get() + 1)));
        controller.end();
        ticks.tick();
        assert_eq!(completes.get(), 1);
        assert!(mapped.is_ended());
        assert_eq!(to_vec(&mapped.values()), vec![10]);

        let (set, controller) = LiveSet::active(&scheduler, ValueSet::from_iter([1]));
        let mapped = map(&set, |x| x * 10);
        let errors: Rc<RefCell<Vec<StreamError>>> = Rc::new(RefCell::new(Vec::new()));
        let e = errors.clone();
        let _sub = mapped.subscribe(Observer::new().on_error(move |err| e.borrow_mut().push(err.clone())));
        controller.error(StreamError::new("boom"));
        ticks.tick();
        assert_eq!(*errors.borrow(), vec![StreamError::new("boom")]);
    }

    #[test]
    #[should_panic(expected = "never mapped")]
    fn test_map_panics_on_untracked_removal() {
        let (ticks, scheduler) = rig();
        // A producer whose pull hook removes a value between the map's
        // subscribe and its initial read: the map never tracks 99, yet the
        // queued remove is still delivered to it on the next tick.
        let set = LiveSet::new(
            Producer::new(
                || ValueSet::from_iter([1, 99]),
                move |snapshot, controller| {
                    snapshot.set(ValueSet::from_iter([1, 99]));
                    let pulled = Cell::new(false);
                    liveset_reactive::ListenGuard::new(|| {}).with_pull(move || {
                        if !pulled.replace(true) {
                            controller.remove(&99);
                        }
                    })
                },
            ),
            &scheduler,
        );
        let mapped = map(&set, |x| x * 10);
        let _sub = mapped.subscribe(Observer::new());
        ticks.tick();
    }
}
