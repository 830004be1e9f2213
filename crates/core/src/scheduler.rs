//! Batch scheduler for coalesced change delivery.
//!
//! Containers issue many mutations within one synchronous turn; the
//! scheduler coalesces the resulting delivery callbacks into a single
//! deferred flush, run once per cooperative tick, preserving FIFO order.
//!
//! The "run later" primitive is injected (`DeferFn`) so the scheduler stays
//! deterministic and testable: browser hosts hand it a microtask hook (see
//! `microtask_defer` behind the `wasm` feature), tests and synchronous
//! hosts drive a `DeferQueue` by hand.

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};

/// Executed-prefix length at which the queue is compacted during a flush.
const COMPACT_THRESHOLD: usize = 1024;

/// The injected single-shot "run later" capability.
pub type DeferFn = Box<dyn Fn(Box<dyn FnOnce()>)>;

struct Queue {
    callbacks: RefCell<Vec<Option<Box<dyn FnOnce()>>>>,
    index: Cell<usize>,
    flush_pending: Cell<bool>,
}

impl Queue {
    /// Drains the queue with an index cursor (never array truncation), so
    /// callbacks appended while draining run in the same flush and
    /// re-entrant flush calls cannot skip or double-run entries.
    fn flush(&self) {
        loop {
            let cb = {
                let mut callbacks = self.callbacks.borrow_mut();
                let index = self.index.get();
                if index >= callbacks.len() {
                    break;
                }
                self.index.set(index + 1);
                callbacks[index].take()
            };
            if let Some(cb) = cb {
                cb();
            }
            if self.index.get() > COMPACT_THRESHOLD {
                // Drop the executed prefix so recursive scheduling cannot
                // grow the queue without bound. A re-entrant flush inside
                // the callback may already have rebased the cursor.
                let mut callbacks = self.callbacks.borrow_mut();
                let executed = self.index.get().min(callbacks.len());
                callbacks.drain(..executed);
                self.index.set(self.index.get() - executed);
            }
        }
        self.callbacks.borrow_mut().clear();
        self.index.set(0);
        self.flush_pending.set(false);
    }
}

/// A FIFO callback queue flushed once per cooperative tick.
///
/// `schedule` appends a callback and, if no flush is pending, arranges
/// exactly one deferred `flush` through the injected defer primitive.
pub struct Scheduler {
    queue: Rc<Queue>,
    defer: DeferFn,
}

impl Scheduler {
    /// Creates a scheduler around the given defer primitive.
    pub fn new(defer: impl Fn(Box<dyn FnOnce()>) + 'static) -> Self {
        Self {
            queue: Rc::new(Queue {
                callbacks: RefCell::new(Vec::new()),
                index: Cell::new(0),
                flush_pending: Cell::new(false),
            }),
            defer: Box::new(defer),
        }
    }

    /// Appends a callback and arranges a deferred flush if none is pending.
    pub fn schedule(&self, cb: impl FnOnce() + 'static) {
        self.queue.callbacks.borrow_mut().push(Some(Box::new(cb)));
        if !self.queue.flush_pending.replace(true) {
            let queue: Weak<Queue> = Rc::downgrade(&self.queue);
            (self.defer)(Box::new(move || {
                if let Some(queue) = queue.upgrade() {
                    queue.flush();
                }
            }));
        }
    }

    /// Synchronously drains the queue, including callbacks appended while
    /// draining. Safe to call re-entrantly and when nothing is queued.
    pub fn flush(&self) {
        self.queue.flush();
    }

    /// Returns the number of callbacks not yet executed.
    #[inline]
    pub fn pending(&self) -> usize {
        self.queue.callbacks.borrow().len() - self.queue.index.get()
    }
}

/// A manually driven defer primitive.
///
/// Stands in for the host's cooperative run loop: deferred callbacks
/// accumulate until `tick` is called, which runs them (and any callbacks
/// they defer) to exhaustion, i.e. one cooperative turn.
#[derive(Clone, Default)]
pub struct DeferQueue {
    pending: Rc<RefCell<VecDeque<Box<dyn FnOnce()>>>>,
}

impl DeferQueue {
    /// Creates an empty defer queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the defer capability to hand to `Scheduler::new`.
    pub fn defer_fn(&self) -> DeferFn {
        let pending = self.pending.clone();
        Box::new(move |cb| pending.borrow_mut().push_back(cb))
    }

    /// Runs deferred callbacks until none remain. Returns how many ran.
    pub fn tick(&self) -> usize {
        let mut ran = 0;
        loop {
            let cb = self.pending.borrow_mut().pop_front();
            match cb {
                Some(cb) => {
                    cb();
                    ran += 1;
                }
                None => break,
            }
        }
        ran
    }

    /// Returns true if no callbacks are waiting for the next tick.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }
}

/// Defer primitive backed by the JS microtask queue (`Promise.then`).
#[cfg(feature = "wasm")]
pub fn microtask_defer() -> DeferFn {
    use wasm_bindgen::closure::Closure;
    use wasm_bindgen::JsValue;

    Box::new(|cb: Box<dyn FnOnce()>| {
        let mut cb = Some(cb);
        let closure = Closure::wrap(Box::new(move |_: JsValue| {
            if let Some(cb) = cb.take() {
                cb();
            }
        }) as Box<dyn FnMut(JsValue)>);
        let _ = js_sys::Promise::resolve(&JsValue::NULL).then(&closure);
        closure.forget();
    })
}
