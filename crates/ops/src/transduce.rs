//! Transduce operator: a stateful reducer pipeline over a container.
//!
//! The reducer protocol is injected as a strategy object (`Reducer`),
//! keeping the container logic decoupled from any particular
//! reducer-composition library: `init` seeds outputs, `step` feeds one
//! input and may signal early termination, `result` flushes whatever the
//! pipeline still holds at termination.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::hash::Hash;
use hashbrown::HashMap;
use liveset_core::{ChangeRecord, ValueSet};
use liveset_reactive::{LiveSet, Observer, Producer};

/// Outcome of feeding one input to a reducer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// The reducer accepts further inputs.
    Continue,
    /// The reducer short-circuited: no further input produces output.
    Complete,
}

/// The opaque stepwise reducer protocol behind `transduce`.
pub trait Reducer<I, O> {
    /// Seeds outputs present before any input is processed.
    fn init(&mut self, out: &mut Vec<O>) {
        let _ = out;
    }

    /// Feeds one input, appending the outputs it produces.
    fn step(&mut self, input: &I, out: &mut Vec<O>) -> StepOutcome;

    /// Flushes outputs still pending when the reducer terminates early.
    fn result(&mut self, out: &mut Vec<O>) {
        let _ = out;
    }
}

struct Context<T, U, R> {
    reducer: R,
    /// Outputs produced per processed input, consulted on removal.
    produced: HashMap<T, Vec<U>>,
    adds_complete: bool,
}

/// Derives a container by running the upstream contents, in snapshot
/// order, through a fresh reducer from `reducer_factory`.
///
/// Once the reducer signals early termination the output is frozen with
/// respect to additions: further upstream adds are ignored entirely,
/// while removals of already-processed inputs still remove the outputs
/// recorded for them.
pub fn transduce<T, U, R, F>(source: &LiveSet<T>, reducer_factory: F) -> LiveSet<U>
where
    T: Eq + Hash + Clone + 'static,
    U: Eq + Hash + Clone + 'static,
    R: Reducer<T, U> + 'static,
    F: FnMut() -> R + 'static,
{
    let factory = Rc::new(RefCell::new(reducer_factory));
    let read_source = source.clone();
    let read_factory = factory.clone();
    let listen_source = source.clone();
    let scheduler = source.scheduler().clone();
    LiveSet::new(
        Producer::new(
            move || {
                let mut reducer = (&mut *read_factory.borrow_mut())();
                let mut out = ValueSet::default();
                let mut buf = Vec::new();
                reducer.init(&mut buf);
                out.extend(buf.drain(..));
                for value in read_source.values().iter() {
                    let outcome = reducer.step(value, &mut buf);
                    out.extend(buf.drain(..));
                    if outcome == StepOutcome::Complete {
                        reducer.result(&mut buf);
                        out.extend(buf.drain(..));
                        break;
                    }
                }
                out
            },
            move |snapshot, controller| {
                let ctx: Rc<RefCell<Context<T, U, R>>> = Rc::new(RefCell::new(Context {
                    reducer: (&mut *factory.borrow_mut())(),
                    produced: HashMap::new(),
                    adds_complete: false,
                }));
                let next_ctx = ctx.clone();
                let next_controller = controller.clone();
                let error_controller = controller.clone();
                let sub = listen_source.subscribe(
                    Observer::new()
                        .on_next(move |changes| {
                            let mut buf = Vec::new();
                            for change in changes {
                                match change {
                                    ChangeRecord::Add(value) => {
                                        let mut ctx = next_ctx.borrow_mut();
                                        if ctx.adds_complete {
                                            continue;
                                        }
                                        let outcome = ctx.reducer.step(value, &mut buf);
                                        ctx.produced.insert(value.clone(), buf.clone());
                                        drop(ctx);
                                        for out in buf.drain(..) {
                                            next_controller.add(out);
                                        }
                                        if outcome == StepOutcome::Complete {
                                            let mut ctx = next_ctx.borrow_mut();
                                            ctx.adds_complete = true;
                                            ctx.reducer.result(&mut buf);
                                            drop(ctx);
                                            for out in buf.drain(..) {
                                                next_controller.add(out);
                                            }
                                        }
                                    }
                                    ChangeRecord::Remove(value) => {
                                        let removed = next_ctx.borrow_mut().produced.remove(value);
                                        match removed {
                                            Some(outs) => {
                                                for out in &outs {
                                                    next_controller.remove(out);
                                                }
                                            }
                                            None => {
                                                // Inputs arriving after early
                                                // termination were never
                                                // processed; their removal has
                                                // nothing to undo.
                                                if !next_ctx.borrow().adds_complete {
                                                    panic!(
                                                        "removed value was never processed"
                                                    );
                                                }
                                            }
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
                    let mut ctx = ctx.borrow_mut();
                    let mut buf = Vec::new();
                    ctx.reducer.init(&mut buf);
                    initial.extend(buf.drain(..));
                    for value in listen_source.values().iter() {
                        let outcome = ctx.reducer.step(value, &mut buf);
                        ctx.produced.insert(value.clone(), buf.clone());
                        initial.extend(buf.drain(..));
                        if outcome == StepOutcome::Complete {
                            ctx.adds_complete = true;
                            ctx.reducer.result(&mut buf);
                            initial.extend(buf.drain(..));
                            break;
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
