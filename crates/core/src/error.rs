//! Error type for producer-reported stream failures.
//!
//! A `StreamError` is the payload a producer hands to its controller's
//! `error` call. It terminates the container and is forwarded verbatim
//! through every derived operator to the observers' `error` callbacks.
//!
//! Protocol violations (a producer that never sets its initial snapshot, a
//! stale controller, removal of an untracked value inside an operator) are
//! programming errors, not `StreamError`s; those fail loudly via `panic!`
//! at the call site that broke the contract.

use alloc::string::String;
use core::fmt;

/// An error reported by a producer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamError {
    message: String,
}

impl StreamError {
    /// Creates a new stream error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream error: {}", self.message)
    }
}
