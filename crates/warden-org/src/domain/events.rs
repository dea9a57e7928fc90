//! Domain events for the Organization context.

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use warden_core::event::{DecodedEvent, DomainEvent, EventMetadata};
use warden_core::registry::{EventRegistry, decode_payload};

/// Event type: an organization was added.
pub const ORG_ADDED_EVENT_TYPE: &str = "org.added";
/// Event type: an organization was renamed.
pub const ORG_CHANGED_EVENT_TYPE: &str = "org.changed";
/// Event type: a domain was added.
pub const DOMAIN_ADDED_EVENT_TYPE: &str = "org.domain.added";
/// Event type: a domain was verified.
pub const DOMAIN_VERIFIED_EVENT_TYPE: &str = "org.domain.verified";
/// Event type: a domain became the primary domain.
pub const DOMAIN_PRIMARY_SET_EVENT_TYPE: &str = "org.domain.primary.set";
/// Event type: a domain was removed.
pub const DOMAIN_REMOVED_EVENT_TYPE: &str = "org.domain.removed";
/// Event type: an organization was deactivated.
pub const ORG_DEACTIVATED_EVENT_TYPE: &str = "org.deactivated";
/// Event type: an organization was reactivated.
pub const ORG_REACTIVATED_EVENT_TYPE: &str = "org.reactivated";
/// Event type: an organization was removed.
pub const ORG_REMOVED_EVENT_TYPE: &str = "org.removed";

/// Emitted when an organization is added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgAdded {
    /// Organization name.
    pub name: String,
}

/// Emitted when an organization is renamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgChanged {
    /// The new name.
    pub name: String,
}

/// Payload shared by all domain events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainPayload {
    /// The domain name, e.g. `acme.ch`.
    pub domain: String,
}

/// Event payload variants for the Organization context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrgEventKind {
    /// An organization has been added.
    Added(OrgAdded),
    /// An organization has been renamed.
    Changed(OrgChanged),
    /// A domain has been added.
    DomainAdded(DomainPayload),
    /// A domain has been verified.
    DomainVerified(DomainPayload),
    /// A domain has become primary.
    DomainPrimarySet(DomainPayload),
    /// A domain has been removed.
    DomainRemoved(DomainPayload),
    /// The organization has been deactivated.
    Deactivated,
    /// The organization has been reactivated.
    Reactivated,
    /// The organization has been removed.
    Removed,
}

impl DomainEvent for OrgEventKind {
    fn event_type(&self) -> &'static str {
        match self {
            Self::Added(_) => ORG_ADDED_EVENT_TYPE,
            Self::Changed(_) => ORG_CHANGED_EVENT_TYPE,
            Self::DomainAdded(_) => DOMAIN_ADDED_EVENT_TYPE,
            Self::DomainVerified(_) => DOMAIN_VERIFIED_EVENT_TYPE,
            Self::DomainPrimarySet(_) => DOMAIN_PRIMARY_SET_EVENT_TYPE,
            Self::DomainRemoved(_) => DOMAIN_REMOVED_EVENT_TYPE,
            Self::Deactivated => ORG_DEACTIVATED_EVENT_TYPE,
            Self::Reactivated => ORG_REACTIVATED_EVENT_TYPE,
            Self::Removed => ORG_REMOVED_EVENT_TYPE,
        }
    }

    fn to_payload(&self) -> serde_json::Value {
        let payload = match self {
            Self::Added(p) => serde_json::to_value(p),
            Self::Changed(p) => serde_json::to_value(p),
            Self::DomainAdded(p)
            | Self::DomainVerified(p)
            | Self::DomainPrimarySet(p)
            | Self::DomainRemoved(p) => serde_json::to_value(p),
            Self::Deactivated | Self::Reactivated | Self::Removed => {
                return serde_json::Value::Null;
            }
        };
        // Serialization of derived Serialize types to Value is infallible.
        payload.expect("org event payload serialization is infallible")
    }
}

/// Decoded org event envelope.
#[derive(Debug, Clone)]
pub struct OrgEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: OrgEventKind,
}

impl DecodedEvent for OrgEvent {
    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}

macro_rules! register {
    ($registry:ident, $event_type:expr, unit $variant:path) => {
        $registry.register($event_type, |stored| {
            Ok(OrgEvent {
                metadata: stored.into(),
                kind: $variant,
            })
        })
    };
    ($registry:ident, $event_type:expr, $variant:path) => {
        $registry.register($event_type, |stored| {
            Ok(OrgEvent {
                metadata: stored.into(),
                kind: $variant(decode_payload(stored)?),
            })
        })
    };
}

static REGISTRY: LazyLock<EventRegistry<OrgEvent>> = LazyLock::new(|| {
    let mut registry = EventRegistry::new();
    register!(registry, ORG_ADDED_EVENT_TYPE, OrgEventKind::Added);
    register!(registry, ORG_CHANGED_EVENT_TYPE, OrgEventKind::Changed);
    register!(registry, DOMAIN_ADDED_EVENT_TYPE, OrgEventKind::DomainAdded);
    register!(registry, DOMAIN_VERIFIED_EVENT_TYPE, OrgEventKind::DomainVerified);
    register!(registry, DOMAIN_PRIMARY_SET_EVENT_TYPE, OrgEventKind::DomainPrimarySet);
    register!(registry, DOMAIN_REMOVED_EVENT_TYPE, OrgEventKind::DomainRemoved);
    register!(registry, ORG_DEACTIVATED_EVENT_TYPE, unit OrgEventKind::Deactivated);
    register!(registry, ORG_REACTIVATED_EVENT_TYPE, unit OrgEventKind::Reactivated);
    register!(registry, ORG_REMOVED_EVENT_TYPE, unit OrgEventKind::Removed);
    registry
});

/// The decoder registry for every org event type.
#[must_use]
pub fn registry() -> &'static EventRegistry<OrgEvent> {
    &REGISTRY
}
