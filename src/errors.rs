/*!
 * Error Types
 * Centralized error handling with thiserror and miette
 */

use miette::Diagnostic;
use std::collections::TryReserveError;
use thiserror::Error;

/// Result type for set construction and growth
pub type SetResult<T> = Result<T, SetError>;

/// Set errors
///
/// Lock acquisition never fails, so the only runtime failure is running out
/// of memory while growing a table.
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum SetError {
    #[error("Invalid argument: {0}")]
    #[diagnostic(
        code(set::invalid_argument),
        help("Capacity and stripe count must be positive, and the stripe count must divide the capacity.")
    )]
    InvalidArgument(String),

    #[error("Out of memory: could not allocate {requested_buckets} buckets")]
    #[diagnostic(
        code(set::out_of_memory),
        help("The table keeps its previous capacity. Free memory or bound the number of elements.")
    )]
    OutOfMemory {
        requested_buckets: usize,
        /// Allocator failure, absent when the capacity itself overflowed
        #[source]
        source: Option<TryReserveError>,
    },
}

impl SetError {
    /// Shorthand for an `InvalidArgument` with a formatted reason
    pub fn invalid(reason: impl Into<String>) -> Self {
        SetError::InvalidArgument(reason.into())
    }

    pub(crate) fn from_reserve(requested_buckets: usize, err: TryReserveError) -> Self {
        SetError::OutOfMemory {
            requested_buckets,
            source: Some(err),
        }
    }

    /// Doubling the capacity would overflow `usize`
    pub(crate) fn capacity_overflow() -> Self {
        SetError::OutOfMemory {
            requested_buckets: usize::MAX,
            source: None,
        }
    }
}
