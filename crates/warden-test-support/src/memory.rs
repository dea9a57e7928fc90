//! In-process event store implementing the full push protocol.
//!
//! Sequences, conditional appends, resource-owner inheritance, and unique
//! constraints behave like the Postgres backend. A push works on a copy of
//! the state and only swaps it in once every event and constraint applied,
//! so a failing batch leaves nothing behind.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;
use warden_core::clock::{Clock, SystemClock};
use warden_core::error::DomainError;
use warden_core::event::{PushEvent, StoredEvent};
use warden_core::repository::EventRepository;
use warden_core::search::{Columns, Field, Filter, FilterValue, Operation, SearchQuery};
use warden_core::unique::{UniqueConstraint, check_unique_constraint_actions};

#[derive(Debug, Clone, Default)]
struct State {
    events: Vec<StoredEvent>,
    constraints: HashSet<(String, String)>,
}

/// An event repository backed by process memory.
pub struct InMemoryEventRepository {
    state: Mutex<State>,
    clock: Arc<dyn Clock>,
}

impl InMemoryEventRepository {
    /// Creates an empty store using the wall clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store that stamps events with `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            clock,
        }
    }

    /// Returns every stored event in insertion order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn events(&self) -> Vec<StoredEvent> {
        self.state.lock().unwrap().events.clone()
    }

    /// Returns the claimed `(unique_type, unique_field)` pairs, sorted.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn unique_constraints(&self) -> Vec<(String, String)> {
        let mut constraints: Vec<_> = self
            .state
            .lock()
            .unwrap()
            .constraints
            .iter()
            .cloned()
            .collect();
        constraints.sort();
        constraints
    }

    fn matching(&self, query: &SearchQuery) -> Result<Vec<StoredEvent>, DomainError> {
        if query.filters.is_empty() || query.filters.iter().any(Vec::is_empty) {
            return Err(DomainError::InvalidArgument("search query has no filters".into()));
        }
        if let Some(filter) = query.filters.iter().flatten().find(|f| !f.is_well_formed()) {
            return Err(DomainError::InvalidArgument(format!(
                "filter on {:?} with {:?} is malformed",
                filter.field, filter.operation
            )));
        }

        let state = self.state.lock().unwrap();
        let mut events: Vec<StoredEvent> = state
            .events
            .iter()
            .filter(|event| {
                query
                    .filters
                    .iter()
                    .any(|group| group.iter().all(|filter| matches(filter, event)))
            })
            .cloned()
            .collect();
        drop(state);

        events.sort_by(|a, b| by_sequence(a, b, query.desc));
        if query.limit > 0 {
            events.truncate(usize::try_from(query.limit).unwrap_or(usize::MAX));
        }
        Ok(events)
    }
}

impl Default for InMemoryEventRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryEventRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventRepository").finish_non_exhaustive()
    }
}

fn by_sequence(a: &StoredEvent, b: &StoredEvent, desc: bool) -> Ordering {
    let ordering = a.sequence.cmp(&b.sequence).then(a.id.cmp(&b.id));
    if desc { ordering.reverse() } else { ordering }
}

fn text_field<'a>(field: Field, event: &'a StoredEvent) -> Option<&'a str> {
    match field {
        Field::AggregateId => Some(&event.aggregate_id),
        Field::AggregateType => Some(event.aggregate_type.as_str()),
        Field::ResourceOwner => Some(&event.resource_owner),
        Field::EditorUser => Some(&event.editor_user),
        Field::EditorService => Some(&event.editor_service),
        Field::EventType => Some(event.event_type.as_str()),
        Field::Sequence => None,
    }
}

fn matches(filter: &Filter, event: &StoredEvent) -> bool {
    match (filter.field, filter.operation, &filter.value) {
        (Field::Sequence, Operation::Equals, FilterValue::Sequence(n)) => event.sequence == *n,
        (Field::Sequence, Operation::Greater, FilterValue::Sequence(n)) => event.sequence > *n,
        (Field::Sequence, Operation::Less, FilterValue::Sequence(n)) => event.sequence < *n,
        (field, Operation::Equals, FilterValue::Text(value)) => {
            text_field(field, event) == Some(value.as_str())
        }
        (field, Operation::In, FilterValue::TextList(values)) => {
            text_field(field, event).is_some_and(|actual| values.iter().any(|v| v == actual))
        }
        _ => false,
    }
}

fn append(
    state: &mut State,
    event: &PushEvent,
    clock: &dyn Clock,
) -> Result<StoredEvent, DomainError> {
    let stream: Vec<&StoredEvent> = state
        .events
        .iter()
        .filter(|e| e.aggregate_type == event.aggregate_type && e.aggregate_id == event.aggregate_id)
        .collect();
    let max_sequence = stream.iter().map(|e| e.sequence).max().unwrap_or(0);

    if event.check_previous_sequence && event.previous_sequence != max_sequence {
        return Err(DomainError::ConcurrencyConflict {
            aggregate_type: event.aggregate_type.clone(),
            aggregate_id: event.aggregate_id.clone(),
            expected: event.previous_sequence,
        });
    }

    let resource_owner = stream
        .iter()
        .min_by_key(|e| e.sequence)
        .map_or_else(|| event.resource_owner.clone(), |first| first.resource_owner.clone());

    let stored = StoredEvent {
        id: Uuid::now_v7(),
        aggregate_id: event.aggregate_id.clone(),
        aggregate_type: event.aggregate_type.clone(),
        resource_owner,
        version: event.version.clone(),
        event_type: event.event_type.clone(),
        data: event.data.clone(),
        editor_user: event.editor_user.clone(),
        editor_service: event.editor_service.clone(),
        sequence: max_sequence + 1,
        previous_sequence: max_sequence,
        creation_date: event.creation_date.unwrap_or_else(|| clock.now()),
    };
    state.events.push(stored.clone());
    Ok(stored)
}

fn apply_constraints(state: &mut State, constraints: &[UniqueConstraint]) -> Result<(), DomainError> {
    let actions = check_unique_constraint_actions(constraints);
    for constraint in actions.removes {
        state
            .constraints
            .remove(&(constraint.unique_type.clone(), constraint.unique_field.clone()));
    }
    for constraint in actions.adds {
        let key = (constraint.unique_type.clone(), constraint.unique_field.clone());
        if !state.constraints.insert(key) {
            return Err(DomainError::AlreadyExists(constraint.error_key.clone()));
        }
    }
    Ok(())
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn push(
        &self,
        events: &[PushEvent],
        unique_constraints: &[UniqueConstraint],
    ) -> Result<Vec<StoredEvent>, DomainError> {
        for event in events {
            event.validate()?;
        }
        if events.is_empty() && unique_constraints.is_empty() {
            return Ok(vec![]);
        }

        let mut guard = self.state.lock().unwrap();
        let mut next = guard.clone();

        let mut stored = Vec::with_capacity(events.len());
        for event in events {
            stored.push(append(&mut next, event, self.clock.as_ref())?);
        }
        apply_constraints(&mut next, unique_constraints)?;

        *guard = next;
        Ok(stored)
    }

    async fn filter(&self, query: &SearchQuery) -> Result<Vec<StoredEvent>, DomainError> {
        self.matching(query)
    }

    async fn latest_sequence(&self, query: &SearchQuery) -> Result<u64, DomainError> {
        let unlimited = SearchQuery {
            columns: Columns::MaxSequence,
            limit: 0,
            ..query.clone()
        };
        self.matching(&unlimited)?
            .iter()
            .map(|e| e.sequence)
            .max()
            .ok_or_else(|| DomainError::NotFound("no events match the query".into()))
    }

    async fn health(&self) -> Result<(), DomainError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use warden_core::aggregate::Aggregate;
    use warden_core::search::SearchQueryBuilder;

    use super::*;
    use crate::FixedClock;

    fn user(id: &str) -> Aggregate {
        Aggregate::new(id, "user", "org1", "v1")
    }

    fn stream_query(id: &str) -> SearchQuery {
        SearchQueryBuilder::stream("user", id).build().unwrap()
    }

    #[tokio::test]
    async fn test_example_scenario_detects_stale_precondition() {
        // Arrange
        let repo = InMemoryEventRepository::new();
        let u1 = user("u1");

        // Act
        let first = repo
            .push(&[u1.event("user.human.email.changed", serde_json::Value::Null)], &[])
            .await
            .unwrap();
        let second = repo
            .push(
                &[u1
                    .event("user.human.email.changed", serde_json::Value::Null)
                    .with_previous_sequence(1)],
                &[],
            )
            .await
            .unwrap();
        let stale = repo
            .push(
                &[u1
                    .event("user.human.email.changed", serde_json::Value::Null)
                    .with_previous_sequence(1)],
                &[],
            )
            .await;

        // Assert
        assert_eq!(first[0].sequence, 1);
        assert_eq!(second[0].sequence, 2);
        assert!(stale.unwrap_err().is_conflict());
        assert_eq!(repo.filter(&stream_query("u1")).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_sequences_are_gap_free_per_stream() {
        // Arrange
        let repo = InMemoryEventRepository::new();

        // Act
        for _ in 0..4 {
            repo.push(
                &[
                    user("u1").event("user.locked", serde_json::Value::Null),
                    user("u2").event("user.locked", serde_json::Value::Null),
                ],
                &[],
            )
            .await
            .unwrap();
        }

        // Assert
        let sequences: Vec<u64> = repo
            .filter(&stream_query("u1"))
            .await
            .unwrap()
            .iter()
            .map(|e| e.sequence)
            .collect();
        assert_eq!(sequences, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_first_event_with_nonzero_precondition_conflicts() {
        // Arrange
        let repo = InMemoryEventRepository::new();
        let event = user("u1")
            .event("user.human.added", serde_json::Value::Null)
            .with_previous_sequence(3);

        // Act
        let result = repo.push(&[event], &[]).await;

        // Assert
        assert!(result.unwrap_err().is_conflict());
        assert!(repo.events().is_empty());
    }

    #[tokio::test]
    async fn test_unique_violation_rolls_back_whole_batch() {
        // Arrange
        let repo = InMemoryEventRepository::new();
        repo.push(
            &[user("u1").event("user.human.added", serde_json::Value::Null)],
            &[UniqueConstraint::add("usernames", "gigi", "Errors.User.AlreadyExists")],
        )
        .await
        .unwrap();

        // Act
        let result = repo
            .push(
                &[
                    user("u2").event("user.human.added", serde_json::Value::Null),
                    user("u1").event("user.locked", serde_json::Value::Null),
                ],
                &[UniqueConstraint::add("usernames", "gigi", "Errors.User.AlreadyExists")],
            )
            .await;

        // Assert
        match result {
            Err(DomainError::AlreadyExists(key)) => assert_eq!(key, "Errors.User.AlreadyExists"),
            other => panic!("expected AlreadyExists, got {other:?}"),
        }
        assert_eq!(repo.events().len(), 1);
        assert!(repo.filter(&stream_query("u2")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_removing_missing_constraint_is_not_an_error() {
        // Arrange
        let repo = InMemoryEventRepository::new();

        // Act
        let result = repo
            .push(
                &[user("u1").event("user.removed", serde_json::Value::Null)],
                &[UniqueConstraint::remove("usernames", "nobody")],
            )
            .await;

        // Assert
        assert!(result.is_ok());
        assert!(repo.unique_constraints().is_empty());
    }

    #[tokio::test]
    async fn test_constraint_can_be_swapped_in_one_push() {
        // Arrange
        let repo = InMemoryEventRepository::new();
        repo.push(
            &[user("u1").event("user.human.added", serde_json::Value::Null)],
            &[UniqueConstraint::add("usernames", "old", "taken")],
        )
        .await
        .unwrap();

        // Act
        repo.push(
            &[user("u1").event("user.username.changed", serde_json::Value::Null)],
            &[
                UniqueConstraint::remove("usernames", "old"),
                UniqueConstraint::add("usernames", "new", "taken"),
            ],
        )
        .await
        .unwrap();

        // Assert
        assert_eq!(
            repo.unique_constraints(),
            vec![("usernames".to_owned(), "new".to_owned())]
        );
    }

    #[tokio::test]
    async fn test_later_events_inherit_first_resource_owner() {
        // Arrange
        let repo = InMemoryEventRepository::new();
        repo.push(&[user("u1").event("user.human.added", serde_json::Value::Null)], &[])
            .await
            .unwrap();

        // Act
        let other_owner = Aggregate::new("u1", "user", "org2", "v1");
        let stored = repo
            .push(&[other_owner.event("user.locked", serde_json::Value::Null)], &[])
            .await
            .unwrap();

        // Assert
        assert_eq!(stored[0].resource_owner, "org1");
    }

    #[tokio::test]
    async fn test_filter_by_event_type_and_in_list() {
        // Arrange
        let repo = InMemoryEventRepository::new();
        repo.push(
            &[
                user("u1").event("x", serde_json::Value::Null),
                user("u1").event("y", serde_json::Value::Null),
            ],
            &[],
        )
        .await
        .unwrap();

        // Act
        let only_x = repo
            .filter(
                &SearchQueryBuilder::stream("user", "u1")
                    .event_types(["x"])
                    .build()
                    .unwrap(),
            )
            .await
            .unwrap();
        let both = repo
            .filter(
                &SearchQueryBuilder::stream("user", "u1")
                    .event_types(["x", "y"])
                    .build()
                    .unwrap(),
            )
            .await
            .unwrap();

        // Assert
        assert_eq!(only_x.len(), 1);
        assert_eq!(only_x[0].event_type.as_str(), "x");
        let types: Vec<&str> = both.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, vec!["x", "y"]);
    }

    #[tokio::test]
    async fn test_filter_groups_match_either_stream() {
        // Arrange
        let repo = InMemoryEventRepository::new();
        let org = Aggregate::new("o1", "org", "o1", "v1");
        for _ in 0..2 {
            repo.push(&[user("u1").event("user.locked", serde_json::Value::Null)], &[])
                .await
                .unwrap();
        }
        for _ in 0..3 {
            repo.push(&[org.event("org.changed", serde_json::Value::Null)], &[])
                .await
                .unwrap();
        }
        for _ in 0..4 {
            repo.push(&[user("u2").event("user.locked", serde_json::Value::Null)], &[])
                .await
                .unwrap();
        }
        let query = SearchQueryBuilder::new(Columns::Event)
            .aggregate_types(["user"])
            .aggregate_ids(["u1"])
            .or()
            .aggregate_types(["org"])
            .aggregate_ids(["o1"])
            .build()
            .unwrap();

        // Act
        let events = repo.filter(&query).await.unwrap();
        let latest = repo.latest_sequence(&query).await.unwrap();

        // Assert
        let mut ids: Vec<&str> = events.iter().map(|e| e.aggregate_id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["o1", "o1", "o1", "u1", "u1"]);
        assert_eq!(latest, 3);
    }

    #[tokio::test]
    async fn test_filter_desc_with_limit() {
        // Arrange
        let repo = InMemoryEventRepository::new();
        for _ in 0..5 {
            repo.push(&[user("u1").event("user.locked", serde_json::Value::Null)], &[])
                .await
                .unwrap();
        }

        // Act
        let events = repo
            .filter(
                &SearchQueryBuilder::stream("user", "u1")
                    .order_desc()
                    .limit(2)
                    .build()
                    .unwrap(),
            )
            .await
            .unwrap();

        // Assert
        let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![5, 4]);
    }

    #[tokio::test]
    async fn test_malformed_filter_is_invalid_argument() {
        // Arrange
        let repo = InMemoryEventRepository::new();
        let query = SearchQuery {
            filters: vec![vec![Filter::new(
                Field::Sequence,
                FilterValue::Text("1".into()),
                Operation::Equals,
            )]],
            ..SearchQuery::default()
        };

        // Act
        let result = repo.filter(&query).await;

        // Assert
        assert!(result.unwrap_err().is_invalid_argument());
    }

    #[tokio::test]
    async fn test_latest_sequence_not_found_for_empty_stream() {
        // Arrange
        let repo = InMemoryEventRepository::new();

        // Act
        let result = repo.latest_sequence(&stream_query("u1")).await;

        // Assert
        assert!(result.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_latest_sequence_returns_max() {
        // Arrange
        let repo = InMemoryEventRepository::new();
        for _ in 0..3 {
            repo.push(&[user("u1").event("user.locked", serde_json::Value::Null)], &[])
                .await
                .unwrap();
        }

        // Act
        let latest = repo.latest_sequence(&stream_query("u1")).await.unwrap();

        // Assert
        assert_eq!(latest, 3);
    }

    #[tokio::test]
    async fn test_creation_date_comes_from_clock_unless_backdated() {
        // Arrange
        let clock = FixedClock::reference();
        let repo = InMemoryEventRepository::with_clock(Arc::new(clock));
        let backdate = clock.0 - chrono::Duration::days(1);

        // Act
        let stored = repo
            .push(
                &[
                    user("u1").event("user.human.added", serde_json::Value::Null),
                    user("u1")
                        .event("user.locked", serde_json::Value::Null)
                        .backdated(backdate),
                ],
                &[],
            )
            .await
            .unwrap();

        // Assert
        assert_eq!(stored[0].creation_date, clock.0);
        assert_eq!(stored[1].creation_date, backdate);
    }

    #[tokio::test]
    async fn test_invalid_event_is_rejected_before_anything_is_stored() {
        // Arrange
        let repo = InMemoryEventRepository::new();

        // Act
        let result = repo
            .push(
                &[
                    user("u1").event("user.human.added", serde_json::Value::Null),
                    Aggregate::new("u2", "user", "org1", "one").event("user.human.added", serde_json::Value::Null),
                ],
                &[],
            )
            .await;

        // Assert
        assert!(result.unwrap_err().is_invalid_argument());
        assert!(repo.events().is_empty());
    }
}
