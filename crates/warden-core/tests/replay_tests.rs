//! Write-model replay against the in-memory store.

use serde::{Deserialize, Serialize};
use warden_core::aggregate::Aggregate;
use warden_core::error::DomainError;
use warden_core::event::{DecodedEvent, EventMetadata, StoredEvent};
use warden_core::model::{ModelState, Projection, load_model, retry_on_conflict};
use warden_core::registry::{EventRegistry, decode_payload};
use warden_core::repository::EventRepository;
use warden_core::search::{SearchQuery, SearchQueryBuilder};
use warden_test_support::{FailingEventRepository, InMemoryEventRepository};

#[derive(Debug, Serialize, Deserialize)]
struct EmailChanged {
    email: String,
}

#[derive(Debug)]
enum ContactKind {
    EmailChanged(EmailChanged),
    TokenAdded,
}

#[derive(Debug)]
struct ContactEvent {
    metadata: EventMetadata,
    kind: ContactKind,
}

impl DecodedEvent for ContactEvent {
    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}

fn registry() -> EventRegistry<ContactEvent> {
    let mut registry = EventRegistry::new();
    registry
        .register("contact.email.changed", |stored: &StoredEvent| {
            Ok(ContactEvent {
                metadata: stored.into(),
                kind: ContactKind::EmailChanged(decode_payload(stored)?),
            })
        })
        .register("contact.token.added", |stored: &StoredEvent| {
            Ok(ContactEvent {
                metadata: stored.into(),
                kind: ContactKind::TokenAdded,
            })
        });
    registry
}

#[derive(Debug, Default, Clone, PartialEq)]
struct ContactModel {
    state: ModelState,
    email: String,
    tokens: usize,
}

impl ContactModel {
    fn new(id: &str) -> Self {
        Self {
            state: ModelState::new(id, ""),
            ..Self::default()
        }
    }
}

impl Projection for ContactModel {
    type Event = ContactEvent;

    fn query(&self) -> Result<SearchQuery, DomainError> {
        SearchQueryBuilder::stream("contact", self.state.aggregate_id.clone()).build()
    }

    fn reduce(&mut self, event: &ContactEvent) {
        match &event.kind {
            ContactKind::EmailChanged(e) => self.email.clone_from(&e.email),
            ContactKind::TokenAdded => self.tokens += 1,
        }
    }

    fn state(&self) -> &ModelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ModelState {
        &mut self.state
    }
}

fn contact() -> Aggregate {
    Aggregate::new("c1", "contact", "org1", "v1")
}

async fn seed(repo: &InMemoryEventRepository) {
    repo.push(
        &[
            contact().event(
                "contact.email.changed",
                serde_json::json!({"email": "a@example.com"}),
            ),
            contact().event("contact.token.added", serde_json::Value::Null),
            contact().event(
                "contact.email.changed",
                serde_json::json!({"email": "b@example.com"}),
            ),
        ],
        &[],
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_load_model_folds_each_event_into_its_own_fields() {
    // Arrange
    let repo = InMemoryEventRepository::new();
    seed(&repo).await;
    let mut model = ContactModel::new("c1");

    // Act
    load_model(&repo, &registry(), &mut model).await.unwrap();

    // Assert
    assert_eq!(model.email, "b@example.com");
    assert_eq!(model.tokens, 1);
    assert_eq!(model.state.processed_sequence, 3);
    assert_eq!(model.state.resource_owner, "org1");
    assert!(model.state.exists());
}

#[tokio::test]
async fn test_replay_is_deterministic() {
    // Arrange
    let repo = InMemoryEventRepository::new();
    seed(&repo).await;
    let mut first = ContactModel::new("c1");
    let mut second = ContactModel::new("c1");

    // Act
    load_model(&repo, &registry(), &mut first).await.unwrap();
    load_model(&repo, &registry(), &mut second).await.unwrap();

    // Assert
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_processed_sequence_closes_the_concurrency_loop() {
    // Arrange
    let repo = InMemoryEventRepository::new();
    seed(&repo).await;
    let mut model = ContactModel::new("c1");
    load_model(&repo, &registry(), &mut model).await.unwrap();

    // Act
    let fresh = repo
        .push(
            &[contact()
                .event("contact.token.added", serde_json::Value::Null)
                .with_previous_sequence(model.state.push_precondition())],
            &[],
        )
        .await;
    let stale = repo
        .push(
            &[contact()
                .event("contact.token.added", serde_json::Value::Null)
                .with_previous_sequence(model.state.push_precondition())],
            &[],
        )
        .await;

    // Assert
    assert_eq!(fresh.unwrap()[0].sequence, 4);
    assert!(stale.unwrap_err().is_conflict());
}

#[tokio::test]
async fn test_unknown_event_type_makes_stream_unreadable() {
    // Arrange
    let repo = InMemoryEventRepository::new();
    seed(&repo).await;
    repo.push(
        &[contact().event("contact.phone.changed", serde_json::Value::Null)],
        &[],
    )
    .await
    .unwrap();
    let mut model = ContactModel::new("c1");

    // Act
    let result = load_model(&repo, &registry(), &mut model).await;

    // Assert
    match result {
        Err(DomainError::Internal(msg)) => assert!(msg.contains("contact.phone.changed")),
        other => panic!("expected Internal, got {other:?}"),
    }
    assert!(!model.state.exists());
    assert!(model.email.is_empty());
}

#[tokio::test]
async fn test_corrupt_payload_names_event_type() {
    // Arrange
    let repo = InMemoryEventRepository::new();
    repo.push(
        &[contact().event("contact.email.changed", serde_json::json!({"mail": 1}))],
        &[],
    )
    .await
    .unwrap();
    let mut model = ContactModel::new("c1");

    // Act
    let result = load_model(&repo, &registry(), &mut model).await;

    // Assert
    match result {
        Err(DomainError::Internal(msg)) => assert!(msg.contains("contact.email.changed")),
        other => panic!("expected Internal, got {other:?}"),
    }
}

#[tokio::test]
async fn test_load_model_propagates_repository_errors() {
    // Arrange
    let mut model = ContactModel::new("c1");

    // Act
    let result = load_model(&FailingEventRepository, &registry(), &mut model).await;

    // Assert
    assert!(matches!(result, Err(DomainError::Internal(_))));
}

#[tokio::test]
async fn test_retry_on_conflict_reloads_and_succeeds() {
    // Arrange
    let repo = InMemoryEventRepository::new();
    seed(&repo).await;
    let registry = registry();
    let mut stale = ContactModel::new("c1");
    load_model(&repo, &registry, &mut stale).await.unwrap();
    repo.push(
        &[contact().event("contact.token.added", serde_json::Value::Null)],
        &[],
    )
    .await
    .unwrap();
    let mut first_attempt = true;

    // Act
    let result = retry_on_conflict(3, || {
        let use_stale = std::mem::replace(&mut first_attempt, false);
        let stale_sequence = stale.state.push_precondition();
        let repo = &repo;
        let registry = &registry;
        async move {
            let sequence = if use_stale {
                stale_sequence
            } else {
                let mut model = ContactModel::new("c1");
                load_model(repo, registry, &mut model).await?;
                model.state.push_precondition()
            };
            repo.push(
                &[contact()
                    .event("contact.token.added", serde_json::Value::Null)
                    .with_previous_sequence(sequence)],
                &[],
            )
            .await
        }
    })
    .await;

    // Assert
    assert_eq!(result.unwrap()[0].sequence, 5);
}
