//! Liveset Core - Shared types for the liveset reactive collection engine.
//!
//! This crate provides the foundational pieces shared by the container and
//! the transform operators:
//!
//! - `ChangeRecord`: One add, remove or end event in a container's diff stream
//! - `StreamError`: Error payload reported by a producer and propagated downstream
//! - `Scheduler`: FIFO batch scheduler that coalesces change delivery into one
//!   deferred flush per cooperative tick
//! - `DeferQueue`: Manually driven "run later" primitive for tests and hosts
//!   without an event loop
//! - `ValueSet`: The insertion-ordered set type used for container snapshots
//!
//! # Example
//!
//! ```rust
//! use liveset_core::{DeferQueue, Scheduler};
//! use std::rc::Rc;
//!
//! let ticks = DeferQueue::new();
//! let scheduler = Rc::new(Scheduler::new(ticks.defer_fn()));
//!
//! scheduler.schedule(|| { /* runs on the next tick */ });
//! assert_eq!(ticks.tick(), 1);
//! ```

#![no_std]

extern crate alloc;

mod change;
mod error;
mod scheduler;

pub use change::ChangeRecord;
pub use error::StreamError;
pub use scheduler::{DeferFn, DeferQueue, Scheduler};

#[cfg(feature = "wasm")]
pub use scheduler::microtask_defer;

/// The snapshot type used for all container contents.
///
/// Set semantics with deterministic insertion order: operators that consume a
/// snapshot "in order" (such as `transduce`) observe the order values were
/// added, matching the change-record stream.
pub type ValueSet<T> = indexmap::IndexSet<T, hashbrown::hash_map::DefaultHashBuilder>;
