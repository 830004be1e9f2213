//! Liveset Reactive - The reactive set container.
//!
//! A `LiveSet` is a collection of values that changes over time. It exposes
//! a synchronous snapshot read (`values`) and an asynchronous feed of
//! add/remove change records (`subscribe`), backed by a producer that is
//! activated lazily while at least one observer exists.
//!
//! # Core Concepts
//!
//! - `LiveSet`: The container (snapshot, observer registry, change queue)
//! - `Producer`: The read/listen pair supplied to construct a base container
//! - `Controller`: The mutation capability handed to an active producer
//! - `Subscription`: The capability an observer holds to release or pull
//! - `Observer`: Canonical record of the four optional observer callbacks
//!
//! # Example
//!
//! ```ignore
//! use liveset_core::{DeferQueue, Scheduler, ValueSet};
//! use liveset_reactive::LiveSet;
//! use std::rc::Rc;
//!
//! let ticks = DeferQueue::new();
//! let scheduler = Rc::new(Scheduler::new(ticks.defer_fn()));
//!
//! let (set, controller) = LiveSet::active(&scheduler, ValueSet::from_iter([5, 6]));
//! let sub = set.subscribe_next(|changes| {
//!     // batched change records arrive here on the next tick
//! });
//!
//! controller.add(7);
//! assert!(set.values().contains(&7)); // reads pull; no tick needed
//! ticks.tick();                       // observers notified
//! sub.unsubscribe();
//! ```

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

mod controller;
mod live_set;
mod observer;
mod producer;
mod subscription;

pub use controller::Controller;
pub use live_set::{LiveSet, ObservableSource};
pub use observer::Observer;
pub use producer::{InitialSnapshot, ListenGuard, Producer};
pub use subscription::Subscription;

// Re-export commonly used types from liveset-core
pub use liveset_core::{ChangeRecord, DeferQueue, Scheduler, StreamError, ValueSet};
