//! Observer contract and per-observer registration records.
//!
//! Callers may observe with anything from a bare change callback to the
//! full start/next/error/complete surface. All shapes normalize into one
//! canonical `Observer` record at subscribe time; the container only ever
//! deals with that record.

use alloc::boxed::Box;
use alloc::rc::Rc;
use core::cell::{Cell, RefCell};
use liveset_core::{ChangeRecord, StreamError};

use crate::subscription::Subscription;

/// The canonical observer record: four optional capabilities.
pub struct Observer<T> {
    pub(crate) start: Option<Box<dyn FnMut(&Subscription<T>)>>,
    pub(crate) next: Option<Box<dyn FnMut(&[ChangeRecord<T>])>>,
    pub(crate) error: Option<Box<dyn FnMut(&StreamError)>>,
    pub(crate) complete: Option<Box<dyn FnMut()>>,
}

impl<T> Default for Observer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Observer<T> {
    /// Creates an observer with no callbacks.
    pub fn new() -> Self {
        Self {
            start: None,
            next: None,
            error: None,
            complete: None,
        }
    }

    /// Sets the callback invoked with the subscription at registration.
    pub fn on_start(mut self, f: impl FnMut(&Subscription<T>) + 'static) -> Self {
        self.start = Some(Box::new(f));
        self
    }

    /// Sets the callback invoked with each delivered batch of changes.
    pub fn on_next(mut self, f: impl FnMut(&[ChangeRecord<T>]) + 'static) -> Self {
        self.next = Some(Box::new(f));
        self
    }

    /// Sets the callback invoked when the container ends with an error.
    pub fn on_error(mut self, f: impl FnMut(&StreamError) + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }

    /// Sets the callback invoked when the container ends normally.
    pub fn on_complete(mut self, f: impl FnMut() + 'static) -> Self {
        self.complete = Some(Box::new(f));
        self
    }
}

/// One registered observer plus its delivery bookkeeping.
///
/// `skip` counts queued changes that predate this observer's subscription;
/// the flush delivers only the suffix beyond it. `unsubscribed` is set by
/// an explicit release, `finalized` by terminal delivery; either closes
/// the subscription.
pub(crate) struct ObserverRecord<T> {
    pub(crate) skip: Cell<usize>,
    pub(crate) unsubscribed: Cell<bool>,
    pub(crate) finalized: Cell<bool>,
    delivering: Cell<bool>,
    callbacks: RefCell<Observer<T>>,
}

impl<T> ObserverRecord<T> {
    pub(crate) fn new(observer: Observer<T>, skip: usize) -> Rc<Self> {
        Rc::new(Self {
            skip: Cell::new(skip),
            unsubscribed: Cell::new(false),
            finalized: Cell::new(false),
            delivering: Cell::new(false),
            callbacks: RefCell::new(observer),
        })
    }

    #[inline]
    pub(crate) fn is_closed(&self) -> bool {
        self.unsubscribed.get() || self.finalized.get()
    }

    #[inline]
    pub(crate) fn is_delivering(&self) -> bool {
        self.delivering.get()
    }

    pub(crate) fn call_start(&self, subscription: &Subscription<T>) {
        let mut callbacks = self.callbacks.borrow_mut();
        if let Some(start) = callbacks.start.as_mut() {
            start(subscription);
        }
    }

    pub(crate) fn call_next(&self, batch: &[ChangeRecord<T>]) {
        let mut callbacks = self.callbacks.borrow_mut();
        if let Some(next) = callbacks.next.as_mut() {
            self.delivering.set(true);
            next(batch);
            self.delivering.set(false);
        }
    }

    pub(crate) fn call_error(&self, err: &StreamError) {
        let mut callbacks = self.callbacks.borrow_mut();
        if let Some(error) = callbacks.error.as_mut() {
            error(err);
        }
    }

    pub(crate) fn call_complete(&self) {
        let mut callbacks = self.callbacks.borrow_mut();
        if let Some(complete) = callbacks.complete.as_mut() {
            complete();
        }
    }
}
