//! Event repository abstraction.

use async_trait::async_trait;

use crate::error::DomainError;
use crate::event::{PushEvent, StoredEvent};
use crate::search::SearchQuery;
use crate::unique::UniqueConstraint;

/// Storage contract every command and query service depends on.
///
/// Dropping a returned future before it resolves cancels the call; a push
/// cancelled that way leaves nothing visible.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Appends `events` (possibly spanning several aggregates) and applies
    /// `unique_constraints`, all in one atomic unit.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if an event is missing a required field.
    /// - `ConcurrencyConflict` if a checked previous sequence is stale.
    /// - `AlreadyExists` if an added unique constraint is taken.
    /// - `Internal` on backend failure.
    ///
    /// On any error nothing from the batch is stored.
    async fn push(
        &self,
        events: &[PushEvent],
        unique_constraints: &[UniqueConstraint],
    ) -> Result<Vec<StoredEvent>, DomainError>;

    /// Loads events matching `query`, ordered by sequence.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the query cannot be compiled, `Internal`
    /// on backend failure.
    async fn filter(&self, query: &SearchQuery) -> Result<Vec<StoredEvent>, DomainError>;

    /// Returns the highest sequence among events matching `query`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no event matches.
    async fn latest_sequence(&self, query: &SearchQuery) -> Result<u64, DomainError>;

    /// Checks that the backend is reachable.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if it is not.
    async fn health(&self) -> Result<(), DomainError>;
}
