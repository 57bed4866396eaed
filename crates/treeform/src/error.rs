#![forbid(unsafe_code)]

//! Error types for location parsing, model writes and validation scheduling.
//!
//! Validation *messages* are never errors: they are plain data committed to the
//! [`ValidationModel`](crate::validation::ValidationModel). The types here cover
//! caller mistakes (malformed locations, impossible writes) and environment
//! problems (no async runtime to schedule validators on).

use thiserror::Error;

/// A location could not be parsed, or a write could not be applied at it.
///
/// Path errors are raised synchronously and abort the operation; a failed
/// write never produces a partially updated model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The location string was empty.
    #[error("location is empty")]
    Empty,

    /// A segment between dots was empty (`"a..b"`, `".a"`, `"a."`).
    #[error("location `{location}` has an empty segment at position {position}")]
    EmptySegment { location: String, position: usize },

    /// A write addressed a sequence element past the end of the sequence.
    #[error("index {index} is out of range for a sequence of length {len} at `{location}`")]
    IndexOutOfRange {
        location: String,
        index: usize,
        len: usize,
    },

    /// A write tried to descend through a value that cannot hold `segment`.
    #[error("cannot descend into `{segment}` at `{location}`: {found} is not a mapping or sequence")]
    NotIndexable {
        location: String,
        segment: String,
        found: &'static str,
    },
}

/// Errors returned by leaf operations that may start validation.
#[derive(Debug, Error)]
pub enum FormError {
    /// The location or the write was invalid.
    #[error(transparent)]
    Path(#[from] PathError),

    /// Asynchronous validators were configured but no tokio runtime is running.
    #[error("asynchronous validation for `{location}` requires a running tokio runtime")]
    NoRuntime { location: String },
}

/// Result type for leaf operations.
pub type FormResult<T> = Result<T, FormError>;
