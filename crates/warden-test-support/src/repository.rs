//! Mock `EventRepository` implementations for tests.

use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;
use warden_core::error::DomainError;
use warden_core::event::{PushEvent, StoredEvent};
use warden_core::repository::EventRepository;
use warden_core::search::SearchQuery;
use warden_core::unique::UniqueConstraint;

/// One recorded `push` call.
pub type RecordedPush = (Vec<PushEvent>, Vec<UniqueConstraint>);

/// An event repository that records every `push` and `filter` call. Returns
/// the configured events from `filter` on every call and accepts every push,
/// numbering pushed events from `1` per call.
#[derive(Debug)]
pub struct RecordingEventRepository {
    filter_result: Vec<StoredEvent>,
    pushed: Mutex<Vec<RecordedPush>>,
    queries: Mutex<Vec<SearchQuery>>,
}

impl RecordingEventRepository {
    /// Create a new recording repository that returns `filter_result` from
    /// every `filter` call.
    #[must_use]
    pub fn new(filter_result: Vec<StoredEvent>) -> Self {
        Self {
            filter_result,
            pushed: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Returns a snapshot of all recorded pushes.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn pushed(&self) -> Vec<RecordedPush> {
        self.pushed.lock().unwrap().clone()
    }

    /// Returns a snapshot of all queries passed to `filter`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn queries(&self) -> Vec<SearchQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventRepository for RecordingEventRepository {
    async fn push(
        &self,
        events: &[PushEvent],
        unique_constraints: &[UniqueConstraint],
    ) -> Result<Vec<StoredEvent>, DomainError> {
        self.pushed
            .lock()
            .unwrap()
            .push((events.to_vec(), unique_constraints.to_vec()));
        Ok(events
            .iter()
            .zip(1..)
            .map(|(event, sequence)| StoredEvent {
                id: Uuid::now_v7(),
                aggregate_id: event.aggregate_id.clone(),
                aggregate_type: event.aggregate_type.clone(),
                resource_owner: event.resource_owner.clone(),
                version: event.version.clone(),
                event_type: event.event_type.clone(),
                data: event.data.clone(),
                editor_user: event.editor_user.clone(),
                editor_service: event.editor_service.clone(),
                sequence,
                previous_sequence: sequence - 1,
                creation_date: event.creation_date.unwrap_or_else(chrono::Utc::now),
            })
            .collect())
    }

    async fn filter(&self, query: &SearchQuery) -> Result<Vec<StoredEvent>, DomainError> {
        self.queries.lock().unwrap().push(query.clone());
        Ok(self.filter_result.clone())
    }

    async fn latest_sequence(&self, query: &SearchQuery) -> Result<u64, DomainError> {
        self.queries.lock().unwrap().push(query.clone());
        self.filter_result
            .iter()
            .map(|e| e.sequence)
            .max()
            .ok_or_else(|| DomainError::NotFound("no events".into()))
    }

    async fn health(&self) -> Result<(), DomainError> {
        Ok(())
    }
}

/// An event repository that always returns an empty event list and silently
/// accepts pushes. Useful for testing "aggregate not found" scenarios.
#[derive(Debug)]
pub struct EmptyEventRepository;

#[async_trait]
impl EventRepository for EmptyEventRepository {
    async fn push(
        &self,
        _events: &[PushEvent],
        _unique_constraints: &[UniqueConstraint],
    ) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(vec![])
    }

    async fn filter(&self, _query: &SearchQuery) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(vec![])
    }

    async fn latest_sequence(&self, _query: &SearchQuery) -> Result<u64, DomainError> {
        Err(DomainError::NotFound("no events".into()))
    }

    async fn health(&self) -> Result<(), DomainError> {
        Ok(())
    }
}

/// An event repository that always returns an internal error. Useful for
/// testing error-handling paths.
#[derive(Debug)]
pub struct FailingEventRepository;

#[async_trait]
impl EventRepository for FailingEventRepository {
    async fn push(
        &self,
        _events: &[PushEvent],
        _unique_constraints: &[UniqueConstraint],
    ) -> Result<Vec<StoredEvent>, DomainError> {
        Err(DomainError::Internal("connection refused".into()))
    }

    async fn filter(&self, _query: &SearchQuery) -> Result<Vec<StoredEvent>, DomainError> {
        Err(DomainError::Internal("connection refused".into()))
    }

    async fn latest_sequence(&self, _query: &SearchQuery) -> Result<u64, DomainError> {
        Err(DomainError::Internal("connection refused".into()))
    }

    async fn health(&self) -> Result<(), DomainError> {
        Err(DomainError::Internal("connection refused".into()))
    }
}
