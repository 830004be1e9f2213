//! Flat-expand operator, simple variant.
//!
//! Each upstream value derives a child container via `expand`; the output
//! is the live union of every child's contents. Children are subscribed
//! eagerly, at activation and on each upstream add; an upstream remove
//! tears the corresponding child down after emitting a synthetic remove
//! for everything it contributed.
//!
//! This variant's inactive `read` is fully re-entrant (it re-derives all
//! children fresh on every call) but the children must not depend,
//! transitively, on this operator's own output; use
//! `flat_map_recursive` for pooled cycles.

use alloc::rc::Rc;
use core::cell::RefCell;
use core::hash::Hash;
use liveset_core::ValueSet;
use liveset_reactive::{LiveSet, ListenGuard, Producer};

use crate::children::{main_observer, ChildPool};

/// Derives the live union of one child container per upstream value.
pub fn flat_map<T, U, F>(source: &LiveSet<T>, expand: F) -> LiveSet<U>
where
    T: Eq + Hash + Clone + 'static,
    U: Eq + Hash + Clone + 'static,
    F: FnMut(&T) -> LiveSet<U> + 'static,
{
    let expand = Rc::new(RefCell::new(expand));
    let read_source = source.clone();
    let read_expand = expand.clone();
    let listen_source = source.clone();
    let scheduler = source.scheduler().clone();
    LiveSet::new(
        Producer::new(
            move || {
                let mut out = ValueSet::default();
                for value in read_source.values().iter() {
                    let child = (&mut *read_expand.borrow_mut())(value);
                    for flattened in child.values().iter() {
                        out.insert(flattened.clone());
                    }
                }
                out
            },
            move |snapshot, controller| {
                let pool = ChildPool::new();
                let main_sub = listen_source.subscribe(main_observer(&pool, &expand, &controller));

                let mut initial = ValueSet::default();
                for value in listen_source.values().iter() {
                    let child = (&mut *expand.borrow_mut())(value);
                    ChildPool::attach(&pool, value.clone(), child.clone(), &controller);
                    for flattened in child.values().iter() {
                        initial.insert(flattened.clone());
                    }
                }
                snapshot.set(initial);
                pool.finish_initialization(&controller);

                let cleanup_pool = pool.clone();
                let cleanup_main = main_sub.clone();
                let pull_pool = pool;
                ListenGuard::new(move || {
                    cleanup_main.unsubscribe();
                    cleanup_pool.teardown();
                })
                .with_pull(move || pull_pool.pull_rounds(&main_sub))
            },
        ),
        &scheduler,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::map;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::cell::Cell;
    use liveset_core::{ChangeRecord, DeferQueue, Scheduler};
    use liveset_reactive::{Controller, Observer};

    fn rig() -> (DeferQueue, Rc<Scheduler>) {
        let ticks = DeferQueue::new();
        let scheduler = Rc::new(Scheduler::new(ticks.defer_fn()));
        (ticks, scheduler)
    }

    fn to_vec<T: Clone>(set: &ValueSet<T>) -> Vec<T> {
        set.iter().cloned().collect()
    }

    /// Child producer multiplying its upstream value, driven externally.
    fn tens_child(
        x: i32,
        controllers: Rc<RefCell<Vec<Controller<i32>>>>,
        cleanups: Rc<Cell<usize>>,
        scheduler: &Rc<Scheduler>,
    ) -> LiveSet<i32> {
        LiveSet::new(
            Producer::new(
                move || ValueSet::from_iter([x * 10]),
                move |snapshot, controller| {
                    snapshot.set(ValueSet::from_iter([x * 10]));
                    controllers.borrow_mut().push(controller);
                    let cleanups = cleanups.clone();
                    ListenGuard::new(move || cleanups.set(cleanups.get() + 1))
                },
            ),
            scheduler,
        )
    }

    #[test]
    fn test_flat_map_flattens_and_tracks_children() {
        let (ticks, scheduler) = rig();
        let (set, controller) = LiveSet::active(&scheduler, ValueSet::from_iter([1, 2]));
        let child_controllers: Rc<RefCell<Vec<Controller<i32>>>> = Rc::new(RefCell::new(Vec::new()));
        let child_cleanups = Rc::new(Cell::new(0));

        let cs = child_controllers.clone();
        let cl = child_cleanups.clone();
        let sched = scheduler.clone();
        let flattened = flat_map(&set, move |x| tens_child(*x, cs.clone(), cl.clone(), &sched));

        // Inactive reads derive children fresh each call.
        assert_eq!(to_vec(&flattened.values()), vec![10, 20]);
        assert_eq!(to_vec(&flattened.values()), vec![10, 20]);

        let batches: Rc<RefCell<Vec<Vec<ChangeRecord<i32>>>>> = Rc::new(RefCell::new(Vec::new()));
        let b = batches.clone();
        let _sub = flattened.subscribe_next(move |changes| b.borrow_mut().push(changes.to_vec()));
        assert_eq!(to_vec(&flattened.values()), vec![10, 20]);

        // Upstream add spawns, subscribes and flattens a new child.
        controller.add(3);
        ticks.tick();
        assert_eq!(*batches.borrow(), vec![vec![ChangeRecord::Add(30)]]);
        assert_eq!(to_vec(&flattened.values()), vec![10, 20, 30]);

        // A child's own changes flow through.
        child_controllers.borrow()[0].add(101);
        child_controllers.borrow()[0].remove(&10);
        ticks.tick();
        assert_eq!(
            batches.borrow().last().unwrap(),
            &vec![ChangeRecord::Add(101), ChangeRecord::Remove(10)]
        );
        assert_eq!(to_vec(&flattened.values()), vec![20, 30, 101]);

        // Upstream remove emits synthetic removes for the child's values
        // and runs the child's cleanup.
        assert_eq!(child_cleanups.get(), 0);
        controller.remove(&2);
        ticks.tick();
        assert_eq!(
            batches.borrow().last().unwrap(),
            &vec![ChangeRecord::Remove(20)]
        );
        assert_eq!(child_cleanups.get(), 1);
        assert_eq!(to_vec(&flattened.values()), vec![30, 101]);
    }

    #[test]
    fn test_flat_map_completes_after_main_and_children() {
        let (ticks, scheduler) = rig();
        let (set, controller) = LiveSet::active(&scheduler, ValueSet::from_iter([1, 2]));
        let child_controllers: Rc<RefCell<Vec<Controller<i32>>>> = Rc::new(RefCell::new(Vec::new()));
        let child_cleanups = Rc::new(Cell::new(0));

        let cs = child_controllers.clone();
        let cl = child_cleanups.clone();
        let sched = scheduler.clone();
        let flattened = flat_map(&set, move |x| tens_child(*x, cs.clone(), cl.clone(), &sched));

        let completes = Rc::new(Cell::new(0));
        let co = completes.clone();
        let _sub = flattened.subscribe(Observer::new().on_complete(move || co.set(co.get() + 1)));

        controller.end();
        ticks.tick();
        // Children are still live: no completion yet.
        assert_eq!(completes.get(), 0);
        assert!(!flattened.is_ended());

        child_controllers.borrow()[0].end();
        ticks.tick();
        assert_eq!(completes.get(), 0);

        child_controllers.borrow()[1].end();
        ticks.tick();
        assert_eq!(completes.get(), 1);
        assert!(flattened.is_ended());
        assert_eq!(to_vec(&flattened.values()), vec![10, 20]);
    }

    #[test]
    fn test_flat_map_handles_constant_children() {
        let (ticks, scheduler) = rig();
        let (set, controller) = LiveSet::active(&scheduler, ValueSet::from_iter([5, 6]));
        let sched = scheduler.clone();
        let flattened = flat_map(&set, move |x| {
            LiveSet::constant(&sched, ValueSet::from_iter([*x, x * 10]))
        });
        assert_eq!(to_vec(&flattened.values()), vec![5, 50, 6, 60]);

        let batches: Rc<RefCell<Vec<Vec<ChangeRecord<i32>>>>> = Rc::new(RefCell::new(Vec::new()));
        let b = batches.clone();
        let _sub = flattened.subscribe_next(move |changes| b.borrow_mut().push(changes.to_vec()));
        assert_eq!(to_vec(&flattened.values()), vec![5, 50, 6, 60]);

        controller.add(7);
        ticks.tick();
        assert_eq!(
            *batches.borrow(),
            vec![vec![ChangeRecord::Add(7), ChangeRecord::Add(70)]]
        );

        // Removing an upstream value whose (completed) child is still
        // tracked removes the child's frozen values.
        controller.remove(&5);
        ticks.tick();
        assert_eq!(
            batches.borrow().last().unwrap(),
            &vec![ChangeRecord::Remove(5), ChangeRecord::Remove(50)]
        );
        assert_eq!(to_vec(&flattened.values()), vec![6, 60, 7, 70]);
    }

    #[test]
    fn test_flat_map_with_ended_upstream() {
        let (_ticks, scheduler) = rig();
        let input = LiveSet::constant(&scheduler, ValueSet::from_iter([5]));
        let child_controllers: Rc<RefCell<Vec<Controller<i32>>>> = Rc::new(RefCell::new(Vec::new()));
        let cs = child_controllers.clone();
        let sched = scheduler.clone();
        let flattened = flat_map(&input, move |x| {
            let x = *x;
            let cs = cs.clone();
            LiveSet::new(
                Producer::new(
                    move || ValueSet::from_iter([x]),
                    move |snapshot, controller| {
                        snapshot.set(ValueSet::from_iter([x]));
                        cs.borrow_mut().push(controller);
                        ListenGuard::default()
                    },
                ),
                &sched,
            )
        });

        let nexts = Rc::new(Cell::new(0));
        let n = nexts.clone();
        let sub = flattened.subscribe_next(move |_| n.set(n.get() + 1));
        // The ended upstream completed during activation, but the live
        // child keeps the output open.
        assert!(!flattened.is_ended());

        child_controllers.borrow()[0].add(123);
        assert_eq!(nexts.get(), 0);
        sub.pull_changes();
        assert_eq!(nexts.get(), 1);
        assert_eq!(to_vec(&flattened.values()), vec![5, 123]);
    }

    #[test]
    fn test_flat_map_upstream_ends_after_subscribe() {
        let (_ticks, scheduler) = rig();
        let (input, input_controller) = LiveSet::active(&scheduler, ValueSet::from_iter([5]));
        let child_controllers: Rc<RefCell<Vec<Controller<i32>>>> = Rc::new(RefCell::new(Vec::new()));
        let cs = child_controllers.clone();
        let sched = scheduler.clone();
        let flattened = flat_map(&input, move |x| {
            let x = *x;
            let cs = cs.clone();
            LiveSet::new(
                Producer::new(
                    move || ValueSet::from_iter([x]),
                    move |snapshot, controller| {
                        snapshot.set(ValueSet::from_iter([x]));
                        cs.borrow_mut().push(controller);
                        ListenGuard::default()
                    },
                ),
                &sched,
            )
        });

        let nexts = Rc::new(Cell::new(0));
        let n = nexts.clone();
        let sub = flattened.subscribe_next(move |_| n.set(n.get() + 1));
        input_controller.end();
        assert!(!flattened.is_ended());

        child_controllers.borrow()[0].add(123);
        sub.pull_changes();
        assert_eq!(nexts.get(), 1);
        assert_eq!(to_vec(&flattened.values()), vec![5, 123]);
    }

    #[test]
    fn test_flat_map_pull_discovers_new_child_in_same_round_trip() {
        let (ticks, scheduler) = rig();
        let (pool_source, pool_controller) = LiveSet::active(&scheduler, ValueSet::default());
        let flattened = flat_map(&pool_source, |s: &LiveSet<i32>| s.clone());

        let batches: Rc<RefCell<Vec<Vec<ChangeRecord<i32>>>>> = Rc::new(RefCell::new(Vec::new()));
        let b = batches.clone();
        let sub = flattened.subscribe_next(move |changes| b.borrow_mut().push(changes.to_vec()));

        // A producer that only yields its value when pulled.
        let lazy = LiveSet::new(
            Producer::new(
                || panic!("inactive read must not happen"),
                |snapshot, controller| {
                    snapshot.set(ValueSet::default());
                    let pulled = Cell::new(false);
                    ListenGuard::new(|| {}).with_pull(move || {
                        if !pulled.replace(true) {
                            controller.add(5);
                        }
                    })
                },
            ),
            &scheduler,
        );
        let mapped = map(&lazy, |x| x * 10);
        pool_controller.add(mapped);
        assert_eq!(*batches.borrow(), Vec::<Vec<ChangeRecord<i32>>>::new());

        // The pull round discovers the child as a side effect of pulling
        // the main subscription, then repeats until the newly pulled
        // child stops producing. The add arrives exactly once.
        sub.pull_changes();
        assert_eq!(*batches.borrow(), vec![vec![ChangeRecord::Add(50)]]);
        assert_eq!(to_vec(&flattened.values()), vec![50]);

        // Nothing further on the tick: the pull already delivered it all.
        ticks.tick();
        assert_eq!(batches.borrow().len(), 1);
    }
}
