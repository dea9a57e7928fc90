//! Domain error types.

use thiserror::Error;

use crate::event::AggregateType;

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Malformed filter, missing required event field, or bad version format.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Nothing matched the request.
    #[error("not found: {0}")]
    NotFound(String),

    /// A unique constraint is already taken. Carries the constraint's error key.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Optimistic concurrency conflict: the stream moved past the expected sequence.
    #[error(
        "concurrency conflict on aggregate {aggregate_type}/{aggregate_id}: expected previous sequence {expected}"
    )]
    ConcurrencyConflict {
        /// Type of the aggregate that had the conflict.
        aggregate_type: AggregateType,
        /// The aggregate that had the conflict.
        aggregate_id: String,
        /// The previous sequence the caller expected.
        expected: u64,
    },

    /// Decode failure or unexpected backend error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DomainError {
    /// Returns `true` for optimistic concurrency conflicts.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }

    /// Returns `true` for `NotFound`.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns `true` for unique constraint violations.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    /// Returns `true` for `InvalidArgument`.
    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }
}
