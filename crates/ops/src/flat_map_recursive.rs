//! Flat-expand operator, recursive/pooling variant.
//!
//! Same propagation as `flat_map`, but a child container may be derived,
//! transitively, from this operator's own output (a pool that feeds
//! itself). Two consequences:
//!
//! - An inactive synchronous read is undefined: deriving the children
//!   would re-enter this same read through the cycle. A latch detects the
//!   re-entry and fails with a descriptive error instead of looping.
//! - The initial snapshot is built through the controller, value by
//!   value, so a child activated mid-listen can already observe the
//!   partially built pool; the pull rounds then settle the cascade.

use alloc::rc::Rc;
use core::cell::{Cell, RefCell};
use core::hash::Hash;
use liveset_core::ValueSet;
use liveset_reactive::{LiveSet, ListenGuard, Producer};

use crate::children::{main_observer, ChildPool};

/// Derives the live union of one child container per upstream value,
/// tolerating children that feed back into this output.
pub fn flat_map_recursive<T, U, F>(source: &LiveSet<T>, expand: F) -> LiveSet<U>
where
    T: Eq + Hash + Clone + 'static,
    U: Eq + Hash + Clone + 'static,
    F: FnMut(&T) -> LiveSet<U> + 'static,
{
    let expand = Rc::new(RefCell::new(expand));
    let reading = Rc::new(Cell::new(false));
    let read_source = source.clone();
    let read_expand = expand.clone();
    let listen_source = source.clone();
    let scheduler = source.scheduler().clone();
    LiveSet::new(
        Producer::new(
            move || {
                if reading.replace(true) {
                    panic!("reading an inactive recursive flat-map is not supported");
                }
                let mut out = ValueSet::default();
                for value in read_source.values().iter() {
                    let child = (&mut *read_expand.borrow_mut())(value);
                    for flattened in child.values().iter() {
                        out.insert(flattened.clone());
                    }
                }
                reading.set(false);
                out
            },
            move |snapshot, controller| {
                let pool = ChildPool::new();
                let main_sub = listen_source.subscribe(main_observer(&pool, &expand, &controller));

                // The snapshot must exist before any child activates:
                // a pooled child reads this very output while subscribing.
                snapshot.set(ValueSet::default());
                for value in listen_source.values().iter() {
                    let child = (&mut *expand.borrow_mut())(value);
                    ChildPool::attach(&pool, value.clone(), child.clone(), &controller);
                    for flattened in child.values().iter() {
                        controller.add(flattened.clone());
                    }
                }
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
