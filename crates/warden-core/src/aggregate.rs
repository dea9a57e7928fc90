//! Aggregate identity.

use crate::event::{AggregateType, DomainEvent, EventType, PushEvent, Version};

/// Logical identity of an event stream. Not stored as a row: an aggregate is
/// its `(type, id)` plus the ordered events appended to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    /// Aggregate identifier.
    pub id: String,
    /// Aggregate type.
    pub aggregate_type: AggregateType,
    /// Owning tenant/org.
    pub resource_owner: String,
    /// Current schema version.
    pub version: Version,
}

impl Aggregate {
    /// Creates a new aggregate identity.
    pub fn new(
        id: impl Into<String>,
        aggregate_type: impl Into<AggregateType>,
        resource_owner: impl Into<String>,
        version: impl Into<Version>,
    ) -> Self {
        Self {
            id: id.into(),
            aggregate_type: aggregate_type.into(),
            resource_owner: resource_owner.into(),
            version: version.into(),
        }
    }

    /// Starts a pushable event on this aggregate without a sequence check.
    pub fn event(&self, event_type: impl Into<EventType>, data: serde_json::Value) -> PushEvent {
        PushEvent {
            aggregate_id: self.id.clone(),
            aggregate_type: self.aggregate_type.clone(),
            resource_owner: self.resource_owner.clone(),
            version: self.version.clone(),
            event_type: event_type.into(),
            data,
            editor_user: String::new(),
            editor_service: String::new(),
            previous_sequence: 0,
            check_previous_sequence: false,
            creation_date: None,
        }
    }

    /// Starts a pushable event from a typed domain event.
    pub fn push_event(&self, event: &impl DomainEvent) -> PushEvent {
        self.event(event.event_type(), event.to_payload())
    }
}
