//! Write model / read model replay.
//!
//! A model is built by filtering the store, decoding every event through the
//! owning context's [`EventRegistry`], and folding the typed events left to
//! right. Models are never persisted; they are rebuilt per call.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::DomainError;
use crate::event::{DecodedEvent, EventMetadata};
use crate::registry::EventRegistry;
use crate::repository::EventRepository;
use crate::search::SearchQuery;

/// Bookkeeping every write and read model carries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelState {
    /// Aggregate the model was built for.
    pub aggregate_id: String,
    /// Owning tenant, filled from the first folded event when empty.
    pub resource_owner: String,
    /// Sequence of the last folded event, `0` before any event.
    pub processed_sequence: u64,
    /// Creation date of the last folded event.
    pub change_date: Option<DateTime<Utc>>,
    /// Number of folded events.
    pub event_count: usize,
}

impl ModelState {
    /// Creates the state for an aggregate that has not been loaded yet.
    pub fn new(aggregate_id: impl Into<String>, resource_owner: impl Into<String>) -> Self {
        Self {
            aggregate_id: aggregate_id.into(),
            resource_owner: resource_owner.into(),
            ..Self::default()
        }
    }

    /// Returns `true` once at least one event was folded.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.event_count > 0
    }

    /// The previous sequence the next push must name to detect
    /// write-write conflicts.
    #[must_use]
    pub fn push_precondition(&self) -> u64 {
        self.processed_sequence
    }

    fn advance(&mut self, metadata: &EventMetadata) {
        if self.resource_owner.is_empty() {
            self.resource_owner.clone_from(&metadata.resource_owner);
        }
        self.processed_sequence = metadata.sequence;
        self.change_date = Some(metadata.creation_date);
        self.event_count += 1;
    }
}

/// A model rebuilt from an event stream.
pub trait Projection: Send {
    /// The decoded event type this model folds.
    type Event: DecodedEvent;

    /// The query selecting the events this model needs.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the query cannot be built.
    fn query(&self) -> Result<SearchQuery, DomainError>;

    /// Mutates exactly the fields `event` owns.
    fn reduce(&mut self, event: &Self::Event);

    /// Returns the bookkeeping state.
    fn state(&self) -> &ModelState;

    /// Returns the bookkeeping state mutably.
    fn state_mut(&mut self) -> &mut ModelState;
}

/// Folds `events` into `model` in order and advances its processed sequence.
pub fn fold<P: Projection>(model: &mut P, events: &[P::Event]) {
    for event in events {
        model.reduce(event);
        model.state_mut().advance(event.metadata());
    }
}

/// Filters the store with the model's query, decodes the whole result, and
/// folds it.
///
/// # Errors
///
/// Returns the repository error, or `Internal` if any event cannot be decoded.
/// A stream with an undecodable event is never partially folded.
pub async fn load_model<P: Projection>(
    repo: &dyn EventRepository,
    registry: &EventRegistry<P::Event>,
    model: &mut P,
) -> Result<(), DomainError> {
    let query = model.query()?;
    let stored = repo.filter(&query).await?;
    let events = registry.decode_all(&stored).inspect_err(|e| {
        tracing::error!(
            aggregate_id = %model.state().aggregate_id,
            error = %e,
            "event stream is unreadable"
        );
    })?;
    fold(model, &events);
    Ok(())
}

/// Runs `operation` until it succeeds, fails with something other than a
/// concurrency conflict, or `attempts` runs are used up. The operation must
/// reload its write model each time.
///
/// # Errors
///
/// Returns the last error of `operation`.
pub async fn retry_on_conflict<T, F, Fut>(attempts: usize, mut operation: F) -> Result<T, DomainError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DomainError>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Err(err) if err.is_conflict() && attempt < attempts => {
                tracing::warn!(attempt, error = %err, "concurrency conflict, reloading write model");
                attempt += 1;
            }
            result => return result,
        }
    }
}
