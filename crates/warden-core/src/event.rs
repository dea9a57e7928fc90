//! Event records: the pushable form, the stored form, and typed metadata.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Type of an aggregate stream, e.g. `user` or `org`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateType(pub String);

/// Past-tense dotted event type, e.g. `user.human.email.changed`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventType(pub String);

/// Schema version of an aggregate at event time, `v<major>[.<minor>[.<patch>]]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(pub String);

macro_rules! string_newtype {
    ($name:ident) => {
        impl $name {
            /// Returns the inner string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns `true` if the inner string is empty.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_newtype!(AggregateType);
string_newtype!(EventType);
string_newtype!(Version);

impl Version {
    /// Checks the `v\d+(\.\d+){0,2}` format.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidArgument` if the version is malformed.
    pub fn validate(&self) -> Result<(), DomainError> {
        let invalid = || DomainError::InvalidArgument(format!("invalid version format: {:?}", self.0));

        let numbers = self.0.strip_prefix('v').ok_or_else(invalid)?;
        let parts: Vec<&str> = numbers.split('.').collect();
        if parts.len() > 3 {
            return Err(invalid());
        }
        for part in parts {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
        }
        Ok(())
    }
}

/// Trait implemented by the closed event catalog of each bounded context.
pub trait DomainEvent: Send + Sync + fmt::Debug {
    /// Returns the event type name (used for decoder routing).
    fn event_type(&self) -> &'static str;

    /// Serializes the event payload to JSON.
    fn to_payload(&self) -> serde_json::Value;
}

/// Trait for decoded event envelopes that carry their stored metadata.
pub trait DecodedEvent: Send + Sync + fmt::Debug {
    /// Returns the metadata for this event.
    fn metadata(&self) -> &EventMetadata;
}

/// An event ready to be pushed. `sequence` and `creation_date` of the
/// resulting [`StoredEvent`] are assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct PushEvent {
    /// Aggregate this event is appended to.
    pub aggregate_id: String,
    /// Type of that aggregate.
    pub aggregate_type: AggregateType,
    /// Owning tenant. Only the first event of a stream decides it.
    pub resource_owner: String,
    /// Aggregate schema version.
    pub version: Version,
    /// Event type name.
    pub event_type: EventType,
    /// Encoded payload, `Null` for events without data.
    pub data: serde_json::Value,
    /// Acting user.
    pub editor_user: String,
    /// Acting service.
    pub editor_service: String,
    /// Sequence the caller believed was latest when it built this event.
    pub previous_sequence: u64,
    /// Whether the store must enforce `previous_sequence`.
    pub check_previous_sequence: bool,
    /// Backdated creation date; the store uses its own clock when `None`.
    pub creation_date: Option<DateTime<Utc>>,
}

impl PushEvent {
    /// Requires the stream's latest sequence to equal `sequence` at insert
    /// time. `0` means the stream must not exist yet.
    #[must_use]
    pub fn with_previous_sequence(mut self, sequence: u64) -> Self {
        self.previous_sequence = sequence;
        self.check_previous_sequence = true;
        self
    }

    /// Appends regardless of the stream's current sequence.
    #[must_use]
    pub fn without_sequence_check(mut self) -> Self {
        self.previous_sequence = 0;
        self.check_previous_sequence = false;
        self
    }

    /// Sets actor attribution.
    #[must_use]
    pub fn with_editor(mut self, user: impl Into<String>, service: impl Into<String>) -> Self {
        self.editor_user = user.into();
        self.editor_service = service.into();
        self
    }

    /// Stores the event with an explicit creation date.
    #[must_use]
    pub fn backdated(mut self, creation_date: DateTime<Utc>) -> Self {
        self.creation_date = Some(creation_date);
        self
    }

    /// Checks that all required fields are present and the version is valid.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidArgument` naming the first missing field.
    pub fn validate(&self) -> Result<(), DomainError> {
        let required = [
            ("aggregate id", self.aggregate_id.is_empty()),
            ("aggregate type", self.aggregate_type.is_empty()),
            ("resource owner", self.resource_owner.is_empty()),
            ("event type", self.event_type.is_empty()),
        ];
        if let Some((field, _)) = required.iter().find(|(_, missing)| *missing) {
            return Err(DomainError::InvalidArgument(format!(
                "{field} is required (event type {:?})",
                self.event_type.0
            )));
        }
        self.version.validate()
    }
}

/// Stored representation of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Store-assigned event identifier.
    pub id: Uuid,
    /// Aggregate this event belongs to.
    pub aggregate_id: String,
    /// Type of that aggregate.
    pub aggregate_type: AggregateType,
    /// Owning tenant of the stream.
    pub resource_owner: String,
    /// Aggregate schema version at event time.
    pub version: Version,
    /// Event type name for decoder routing.
    pub event_type: EventType,
    /// Encoded payload.
    pub data: serde_json::Value,
    /// Acting user.
    pub editor_user: String,
    /// Acting service.
    pub editor_service: String,
    /// Position within the aggregate stream, starting at 1.
    pub sequence: u64,
    /// Sequence of the preceding event in the stream, `0` for the first one.
    pub previous_sequence: u64,
    /// Timestamp of event creation.
    pub creation_date: DateTime<Utc>,
}

/// Metadata attached to every decoded event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Type name the event was decoded from.
    pub event_type: EventType,
    /// Aggregate/stream this event belongs to.
    pub aggregate_id: String,
    /// Type of that aggregate.
    pub aggregate_type: AggregateType,
    /// Owning tenant.
    pub resource_owner: String,
    /// Position within the aggregate stream.
    pub sequence: u64,
    /// Timestamp of event creation.
    pub creation_date: DateTime<Utc>,
    /// Acting user.
    pub editor_user: String,
}

impl From<&StoredEvent> for EventMetadata {
    fn from(stored: &StoredEvent) -> Self {
        Self {
            event_id: stored.id,
            event_type: stored.event_type.clone(),
            aggregate_id: stored.aggregate_id.clone(),
            aggregate_type: stored.aggregate_type.clone(),
            resource_owner: stored.resource_owner.clone(),
            sequence: stored.sequence,
            creation_date: stored.creation_date,
            editor_user: stored.editor_user.clone(),
        }
    }
}
