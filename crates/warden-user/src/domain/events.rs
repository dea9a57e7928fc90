//! Domain events for the User context.
//!
//! One canonical catalog: every event a user stream can contain, its type
//! string, its payload, and the decoder the registry routes it to.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use warden_core::error::DomainError;
use warden_core::event::{DecodedEvent, DomainEvent, EventMetadata, StoredEvent};
use warden_core::registry::{EventRegistry, decode_payload};

/// Event type: a human user was added.
pub const HUMAN_ADDED_EVENT_TYPE: &str = "user.human.added";
/// Event type: a machine user was added.
pub const MACHINE_ADDED_EVENT_TYPE: &str = "user.machine.added";
/// Event type: the username changed.
pub const USERNAME_CHANGED_EVENT_TYPE: &str = "user.username.changed";
/// Event type: the human profile changed.
pub const PROFILE_CHANGED_EVENT_TYPE: &str = "user.human.profile.changed";
/// Event type: the email address changed.
pub const EMAIL_CHANGED_EVENT_TYPE: &str = "user.human.email.changed";
/// Event type: the email address was verified.
pub const EMAIL_VERIFIED_EVENT_TYPE: &str = "user.human.email.verified";
/// Event type: the phone number changed.
pub const PHONE_CHANGED_EVENT_TYPE: &str = "user.human.phone.changed";
/// Event type: the phone number was verified.
pub const PHONE_VERIFIED_EVENT_TYPE: &str = "user.human.phone.verified";
/// Event type: the phone number was removed.
pub const PHONE_REMOVED_EVENT_TYPE: &str = "user.human.phone.removed";
/// Event type: the password changed.
pub const PASSWORD_CHANGED_EVENT_TYPE: &str = "user.human.password.changed";
/// Event type: an external identity provider was linked.
pub const EXTERNAL_IDP_ADDED_EVENT_TYPE: &str = "user.human.externalidp.added";
/// Event type: an external identity provider link was removed.
pub const EXTERNAL_IDP_REMOVED_EVENT_TYPE: &str = "user.human.externalidp.removed";
/// Event type: a machine key was added.
pub const MACHINE_KEY_ADDED_EVENT_TYPE: &str = "user.machine.key.added";
/// Event type: a machine key was removed.
pub const MACHINE_KEY_REMOVED_EVENT_TYPE: &str = "user.machine.key.removed";
/// Event type: an OTP second factor was added.
pub const OTP_ADDED_EVENT_TYPE: &str = "user.human.mfa.otp.added";
/// Event type: the OTP second factor was removed.
pub const OTP_REMOVED_EVENT_TYPE: &str = "user.human.mfa.otp.removed";
/// Event type: a `WebAuthn` token was added.
pub const WEBAUTHN_TOKEN_ADDED_EVENT_TYPE: &str = "user.human.webauthn.token.added";
/// Event type: a `WebAuthn` token was removed.
pub const WEBAUTHN_TOKEN_REMOVED_EVENT_TYPE: &str = "user.human.webauthn.token.removed";
/// Event type: the user was locked.
pub const LOCKED_EVENT_TYPE: &str = "user.locked";
/// Event type: the user was unlocked.
pub const UNLOCKED_EVENT_TYPE: &str = "user.unlocked";
/// Event type: the user was deactivated.
pub const DEACTIVATED_EVENT_TYPE: &str = "user.deactivated";
/// Event type: the user was reactivated.
pub const REACTIVATED_EVENT_TYPE: &str = "user.reactivated";
/// Event type: the user was removed.
pub const REMOVED_EVENT_TYPE: &str = "user.removed";

/// Emitted when a human user is added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanAdded {
    /// Login name.
    pub username: String,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Display name.
    pub display_name: String,
    /// Email address.
    pub email: String,
    /// Phone number, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Emitted when a machine user is added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineAdded {
    /// Login name.
    pub username: String,
    /// Machine name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
}

/// Emitted when the username changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsernameChanged {
    /// The new login name.
    pub username: String,
}

/// Emitted when profile fields change. Only changed fields are present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileChanged {
    /// New given name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// New family name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// New display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Emitted when the email address changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailChanged {
    /// The new email address.
    pub email: String,
}

/// Emitted when the phone number changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneChanged {
    /// The new phone number.
    pub phone: String,
}

/// Emitted when the password changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordChanged {
    /// Encoded password hash, produced by the caller.
    pub encoded_password: String,
    /// Whether the user must change the password at next login.
    #[serde(default)]
    pub change_required: bool,
}

/// Emitted when an external identity provider is linked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIdpAdded {
    /// Identity provider configuration.
    pub idp_config_id: String,
    /// User id at the identity provider.
    pub external_user_id: String,
    /// Display name reported by the identity provider.
    #[serde(default)]
    pub display_name: String,
}

/// Emitted when an external identity provider link is removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIdpRemoved {
    /// Identity provider configuration.
    pub idp_config_id: String,
    /// User id at the identity provider.
    pub external_user_id: String,
}

/// Emitted when a machine key is added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineKeyAdded {
    /// Key identifier.
    pub key_id: String,
    /// Key format, e.g. `json`.
    pub key_type: String,
    /// When the key stops being accepted.
    pub expiration_date: DateTime<Utc>,
}

/// Emitted when a machine key is removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineKeyRemoved {
    /// Key identifier.
    pub key_id: String,
}

/// Emitted when an OTP second factor is added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpAdded {
    /// Encrypted shared secret.
    pub secret: String,
}

/// Emitted when a `WebAuthn` token is added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebAuthnTokenAdded {
    /// Token identifier.
    pub token_id: String,
    /// User-chosen token name.
    #[serde(default)]
    pub name: String,
}

/// Emitted when a `WebAuthn` token is removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebAuthnTokenRemoved {
    /// Token identifier.
    pub token_id: String,
}

/// Event payload variants for the User context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserEventKind {
    /// A human user has been added.
    HumanAdded(HumanAdded),
    /// A machine user has been added.
    MachineAdded(MachineAdded),
    /// The username has changed.
    UsernameChanged(UsernameChanged),
    /// Profile fields have changed.
    ProfileChanged(ProfileChanged),
    /// The email address has changed.
    EmailChanged(EmailChanged),
    /// The email address has been verified.
    EmailVerified,
    /// The phone number has changed.
    PhoneChanged(PhoneChanged),
    /// The phone number has been verified.
    PhoneVerified,
    /// The phone number has been removed.
    PhoneRemoved,
    /// The password has changed.
    PasswordChanged(PasswordChanged),
    /// An external identity provider has been linked.
    ExternalIdpAdded(ExternalIdpAdded),
    /// An external identity provider link has been removed.
    ExternalIdpRemoved(ExternalIdpRemoved),
    /// A machine key has been added.
    MachineKeyAdded(MachineKeyAdded),
    /// A machine key has been removed.
    MachineKeyRemoved(MachineKeyRemoved),
    /// An OTP second factor has been added.
    OtpAdded(OtpAdded),
    /// The OTP second factor has been removed.
    OtpRemoved,
    /// A `WebAuthn` token has been added.
    WebAuthnTokenAdded(WebAuthnTokenAdded),
    /// A `WebAuthn` token has been removed.
    WebAuthnTokenRemoved(WebAuthnTokenRemoved),
    /// The user has been locked.
    Locked,
    /// The user has been unlocked.
    Unlocked,
    /// The user has been deactivated.
    Deactivated,
    /// The user has been reactivated.
    Reactivated,
    /// The user has been removed.
    Removed,
}

fn to_value<T: Serialize>(payload: &T) -> serde_json::Value {
    // Serialization of derived Serialize types to Value is infallible.
    serde_json::to_value(payload).expect("user event payload serialization is infallible")
}

impl DomainEvent for UserEventKind {
    fn event_type(&self) -> &'static str {
        match self {
            Self::HumanAdded(_) => HUMAN_ADDED_EVENT_TYPE,
            Self::MachineAdded(_) => MACHINE_ADDED_EVENT_TYPE,
            Self::UsernameChanged(_) => USERNAME_CHANGED_EVENT_TYPE,
            Self::ProfileChanged(_) => PROFILE_CHANGED_EVENT_TYPE,
            Self::EmailChanged(_) => EMAIL_CHANGED_EVENT_TYPE,
            Self::EmailVerified => EMAIL_VERIFIED_EVENT_TYPE,
            Self::PhoneChanged(_) => PHONE_CHANGED_EVENT_TYPE,
            Self::PhoneVerified => PHONE_VERIFIED_EVENT_TYPE,
            Self::PhoneRemoved => PHONE_REMOVED_EVENT_TYPE,
            Self::PasswordChanged(_) => PASSWORD_CHANGED_EVENT_TYPE,
            Self::ExternalIdpAdded(_) => EXTERNAL_IDP_ADDED_EVENT_TYPE,
            Self::ExternalIdpRemoved(_) => EXTERNAL_IDP_REMOVED_EVENT_TYPE,
            Self::MachineKeyAdded(_) => MACHINE_KEY_ADDED_EVENT_TYPE,
            Self::MachineKeyRemoved(_) => MACHINE_KEY_REMOVED_EVENT_TYPE,
            Self::OtpAdded(_) => OTP_ADDED_EVENT_TYPE,
            Self::OtpRemoved => OTP_REMOVED_EVENT_TYPE,
            Self::WebAuthnTokenAdded(_) => WEBAUTHN_TOKEN_ADDED_EVENT_TYPE,
            Self::WebAuthnTokenRemoved(_) => WEBAUTHN_TOKEN_REMOVED_EVENT_TYPE,
            Self::Locked => LOCKED_EVENT_TYPE,
            Self::Unlocked => UNLOCKED_EVENT_TYPE,
            Self::Deactivated => DEACTIVATED_EVENT_TYPE,
            Self::Reactivated => REACTIVATED_EVENT_TYPE,
            Self::Removed => REMOVED_EVENT_TYPE,
        }
    }

    fn to_payload(&self) -> serde_json::Value {
        match self {
            Self::HumanAdded(p) => to_value(p),
            Self::MachineAdded(p) => to_value(p),
            Self::UsernameChanged(p) => to_value(p),
            Self::ProfileChanged(p) => to_value(p),
            Self::EmailChanged(p) => to_value(p),
            Self::PhoneChanged(p) => to_value(p),
            Self::PasswordChanged(p) => to_value(p),
            Self::ExternalIdpAdded(p) => to_value(p),
            Self::ExternalIdpRemoved(p) => to_value(p),
            Self::MachineKeyAdded(p) => to_value(p),
            Self::MachineKeyRemoved(p) => to_value(p),
            Self::OtpAdded(p) => to_value(p),
            Self::WebAuthnTokenAdded(p) => to_value(p),
            Self::WebAuthnTokenRemoved(p) => to_value(p),
            Self::EmailVerified
            | Self::PhoneVerified
            | Self::PhoneRemoved
            | Self::OtpRemoved
            | Self::Locked
            | Self::Unlocked
            | Self::Deactivated
            | Self::Reactivated
            | Self::Removed => serde_json::Value::Null,
        }
    }
}

/// Decoded user event envelope.
#[derive(Debug, Clone)]
pub struct UserEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: UserEventKind,
}

impl DecodedEvent for UserEvent {
    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}

fn with_payload<T, F>(wrap: F) -> impl Fn(&StoredEvent) -> Result<UserEvent, DomainError> + Send + Sync
where
    T: DeserializeOwned,
    F: Fn(T) -> UserEventKind + Send + Sync,
{
    move |stored| {
        Ok(UserEvent {
            metadata: stored.into(),
            kind: wrap(decode_payload(stored)?),
        })
    }
}

fn without_payload(
    kind: UserEventKind,
) -> impl Fn(&StoredEvent) -> Result<UserEvent, DomainError> + Send + Sync {
    move |stored| {
        Ok(UserEvent {
            metadata: stored.into(),
            kind: kind.clone(),
        })
    }
}

static REGISTRY: LazyLock<EventRegistry<UserEvent>> = LazyLock::new(|| {
    let mut registry = EventRegistry::new();
    registry
        .register(HUMAN_ADDED_EVENT_TYPE, with_payload(UserEventKind::HumanAdded))
        .register(MACHINE_ADDED_EVENT_TYPE, with_payload(UserEventKind::MachineAdded))
        .register(USERNAME_CHANGED_EVENT_TYPE, with_payload(UserEventKind::UsernameChanged))
        .register(PROFILE_CHANGED_EVENT_TYPE, with_payload(UserEventKind::ProfileChanged))
        .register(EMAIL_CHANGED_EVENT_TYPE, with_payload(UserEventKind::EmailChanged))
        .register(EMAIL_VERIFIED_EVENT_TYPE, without_payload(UserEventKind::EmailVerified))
        .register(PHONE_CHANGED_EVENT_TYPE, with_payload(UserEventKind::PhoneChanged))
        .register(PHONE_VERIFIED_EVENT_TYPE, without_payload(UserEventKind::PhoneVerified))
        .register(PHONE_REMOVED_EVENT_TYPE, without_payload(UserEventKind::PhoneRemoved))
        .register(PASSWORD_CHANGED_EVENT_TYPE, with_payload(UserEventKind::PasswordChanged))
        .register(EXTERNAL_IDP_ADDED_EVENT_TYPE, with_payload(UserEventKind::ExternalIdpAdded))
        .register(EXTERNAL_IDP_REMOVED_EVENT_TYPE, with_payload(UserEventKind::ExternalIdpRemoved))
        .register(MACHINE_KEY_ADDED_EVENT_TYPE, with_payload(UserEventKind::MachineKeyAdded))
        .register(MACHINE_KEY_REMOVED_EVENT_TYPE, with_payload(UserEventKind::MachineKeyRemoved))
        .register(OTP_ADDED_EVENT_TYPE, with_payload(UserEventKind::OtpAdded))
        .register(OTP_REMOVED_EVENT_TYPE, without_payload(UserEventKind::OtpRemoved))
        .register(WEBAUTHN_TOKEN_ADDED_EVENT_TYPE, with_payload(UserEventKind::WebAuthnTokenAdded))
        .register(
            WEBAUTHN_TOKEN_REMOVED_EVENT_TYPE,
            with_payload(UserEventKind::WebAuthnTokenRemoved),
        )
        .register(LOCKED_EVENT_TYPE, without_payload(UserEventKind::Locked))
        .register(UNLOCKED_EVENT_TYPE, without_payload(UserEventKind::Unlocked))
        .register(DEACTIVATED_EVENT_TYPE, without_payload(UserEventKind::Deactivated))
        .register(REACTIVATED_EVENT_TYPE, without_payload(UserEventKind::Reactivated))
        .register(REMOVED_EVENT_TYPE, without_payload(UserEventKind::Removed));
    registry
});

/// The decoder registry for every user event type.
#[must_use]
pub fn registry() -> &'static EventRegistry<UserEvent> {
    &REGISTRY
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use uuid::Uuid;
    use warden_core::event::{AggregateType, EventType, Version};

    use super::*;

    fn stored(event_type: &str, data: serde_json::Value) -> StoredEvent {
        StoredEvent {
            id: Uuid::new_v4(),
            aggregate_id: "u1".into(),
            aggregate_type: AggregateType::from("user"),
            resource_owner: "org1".into(),
            version: Version::from("v1"),
            event_type: EventType::from(event_type),
            data,
            editor_user: "admin".into(),
            editor_service: String::new(),
            sequence: 4,
            previous_sequence: 3,
            creation_date: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_every_event_type_is_registered() {
        assert_eq!(registry().len(), 23);
        for event_type in [
            HUMAN_ADDED_EVENT_TYPE,
            EMAIL_VERIFIED_EVENT_TYPE,
            EXTERNAL_IDP_REMOVED_EVENT_TYPE,
            WEBAUTHN_TOKEN_REMOVED_EVENT_TYPE,
            REMOVED_EVENT_TYPE,
        ] {
            assert!(registry().is_registered(event_type), "{event_type}");
        }
    }

    #[test]
    fn test_payload_round_trips_through_registry() {
        let kind = UserEventKind::EmailChanged(EmailChanged {
            email: "gigi@example.com".into(),
        });

        let decoded = registry()
            .decode(&stored(kind.event_type(), kind.to_payload()))
            .unwrap();

        assert_eq!(decoded.kind, kind);
        assert_eq!(decoded.metadata.sequence, 4);
        assert_eq!(decoded.metadata.editor_user, "admin");
    }

    #[test]
    fn test_events_without_data_encode_as_null() {
        assert_eq!(UserEventKind::Locked.to_payload(), serde_json::Value::Null);

        let decoded = registry()
            .decode(&stored(LOCKED_EVENT_TYPE, serde_json::Value::Null))
            .unwrap();

        assert_eq!(decoded.kind, UserEventKind::Locked);
    }

    #[test]
    fn test_profile_change_only_carries_changed_fields() {
        let kind = UserEventKind::ProfileChanged(ProfileChanged {
            display_name: Some("Gigi".into()),
            ..ProfileChanged::default()
        });

        assert_eq!(kind.to_payload(), serde_json::json!({"display_name": "Gigi"}));
    }

    #[test]
    fn test_malformed_payload_is_internal_error() {
        let result = registry().decode(&stored(
            USERNAME_CHANGED_EVENT_TYPE,
            serde_json::json!({"name": 3}),
        ));

        match result {
            Err(DomainError::Internal(msg)) => assert!(msg.contains(USERNAME_CHANGED_EVENT_TYPE)),
            other => panic!("expected Internal, got {other:?}"),
        }
    }
}
