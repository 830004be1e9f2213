//! Liveset Ops - Transform operators over liveset containers.
//!
//! Every operator is a pure factory function from one or more containers
//! to a new container on the same scheduler, implementing the shared
//! producer/consumer contract: subscribe upstream, translate its change
//! records, keep exactly the private bookkeeping needed to translate
//! removals correctly, and propagate errors and completion.
//!
//! # Operators
//!
//! - `map` / `filter`: per-value translation and predicate gating
//! - `merge`: union of several containers, completing after all inputs
//! - `flat_map` / `flat_map_recursive`: one child container per upstream
//!   value, flattened into the output; the recursive variant supports
//!   children derived (transitively) from the output itself
//! - `transduce`: stateful reducer pipeline with early termination
//! - `map_with_removal` / `to_value_observable`: value + removal-signal
//!   adapters over the add/remove protocol

#![no_std]

extern crate alloc;

mod children;
mod filter;
mod flat_map;
mod flat_map_recursive;
mod map;
mod map_with_removal;
mod merge;
mod removal;
mod to_value_observable;
mod transduce;

pub use filter::filter;
pub use flat_map::flat_map;
pub use flat_map_recursive::flat_map_recursive;
pub use map::map;
pub use map_with_removal::map_with_removal;
pub use merge::merge;
pub use removal::Removal;
pub use to_value_observable::{to_value_observable, EachValue, ValueObservable, ValueSubscription};
pub use transduce::{transduce, Reducer, StepOutcome};

// Re-export commonly used types from the container crate
pub use liveset_reactive::{ChangeRecord, LiveSet, Observer, StreamError, ValueSet};
