/// Error types for tracklog operations.
///
/// Every fallible operation in the crate returns `Result<T, TrackError>`.
/// Errors are well-typed so hosts can match on the precise failure, in
/// particular to tell a missing baseline apart from observer failures.
use std::fmt;

use thiserror::Error;

/// The main error type for tracklog operations.
#[derive(Error, Debug)]
pub enum TrackError {
    /// An entity-relative comparison was requested but no baseline snapshot
    /// was ever captured.
    #[error(
        "Missing baseline: set an initial state first (tracker.set_initial_state(&entity))"
    )]
    MissingBaseline,

    /// A caller-supplied argument is malformed (e.g. a selector that is
    /// neither a string nor a list of strings).
    #[error("Invalid argument: {reason}")]
    InvalidArgument {
        /// Description of why the argument was rejected
        reason: String,
    },

    /// An entity could not be captured or written as a set of named fields.
    #[error("Invalid data: {reason}")]
    InvalidData {
        /// Description of why the data is invalid
        reason: String,
    },

    /// Serialization error when converting an entity to/from JSON
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// One or more observers failed during a dispatch.
    ///
    /// The triggering change was recorded and every observer in the list was
    /// invoked before this error was returned.
    #[error("{} observer(s) failed: {}", .failures.len(), ObserverFailures(.failures))]
    ObserverFailed {
        /// Each individual failure, in dispatch order
        failures: Vec<ObserverFailure>,
    },
}

impl TrackError {
    /// Build an `InvalidArgument` error.
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Build an `InvalidData` error.
    pub fn invalid_data(reason: impl Into<String>) -> Self {
        Self::InvalidData {
            reason: reason.into(),
        }
    }

    /// Observer failures carried by this error, if any.
    pub fn observer_failures(&self) -> &[ObserverFailure] {
        match self {
            Self::ObserverFailed { failures } => failures,
            _ => &[],
        }
    }
}

/// A single observer failure captured during dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverFailure {
    /// Attribute whose write triggered the dispatch
    pub attribute: String,
    /// Position of the failing observer in the resolved list
    pub observer_index: usize,
    /// Error message, or the panic payload if the observer panicked
    pub message: String,
}

impl fmt::Display for ObserverFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "observer #{} on '{}': {}",
            self.observer_index, self.attribute, self.message
        )
    }
}

struct ObserverFailures<'a>(&'a [ObserverFailure]);

impl fmt::Display for ObserverFailures<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", failure)?;
        }
        Ok(())
    }
}

/// Result type alias for tracklog operations.
pub type TrackResult<T> = Result<T, TrackError>;
