//! User write model, rebuilt from the user's event stream before every
//! command.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use warden_core::aggregate::Aggregate;
use warden_core::error::DomainError;
use warden_core::model::{ModelState, Projection};
use warden_core::search::{SearchQuery, SearchQueryBuilder};

use super::events::{UserEvent, UserEventKind};
use super::{USER_AGGREGATE_TYPE, USER_VERSION};

/// Kind of account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    /// A person logging in interactively.
    Human,
    /// A service account authenticating with keys.
    Machine,
}

/// Lifecycle state of a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    /// No events yet.
    #[default]
    Unspecified,
    /// Usable.
    Active,
    /// Deactivated by an administrator.
    Inactive,
    /// Locked, e.g. after too many failed logins.
    Locked,
    /// Removed; the stream is closed.
    Removed,
}

/// A linked external identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalIdpLink {
    /// Identity provider configuration.
    pub idp_config_id: String,
    /// User id at the identity provider.
    pub external_user_id: String,
    /// Display name reported by the identity provider.
    pub display_name: String,
}

impl ExternalIdpLink {
    /// Field claimed in the `external_idps` constraint table.
    #[must_use]
    pub fn unique_field(idp_config_id: &str, external_user_id: &str) -> String {
        format!("{idp_config_id}:{external_user_id}")
    }
}

/// A machine key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MachineKey {
    /// Key format.
    pub key_type: String,
    /// When the key stops being accepted.
    pub expiration_date: DateTime<Utc>,
}

/// State a user command decides on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserWriteModel {
    /// Replay bookkeeping.
    pub state: ModelState,
    /// Human or machine, once added.
    pub user_type: Option<UserType>,
    /// Lifecycle state.
    pub status: UserStatus,
    /// Current login name.
    pub username: String,
    /// Given name (human).
    pub first_name: String,
    /// Family name (human).
    pub last_name: String,
    /// Display name (human) or machine name.
    pub display_name: String,
    /// Machine description.
    pub description: String,
    /// Email address (human).
    pub email: String,
    /// Whether `email` is verified.
    pub email_verified: bool,
    /// Phone number (human).
    pub phone: Option<String>,
    /// Whether `phone` is verified.
    pub phone_verified: bool,
    /// Whether a password was ever set.
    pub password_set: bool,
    /// Whether a password change is required at next login.
    pub password_change_required: bool,
    /// Linked external identities.
    pub external_idps: Vec<ExternalIdpLink>,
    /// Machine keys by key id.
    pub machine_keys: BTreeMap<String, MachineKey>,
    /// Whether OTP is set up.
    pub otp_active: bool,
    /// `WebAuthn` token names by token id.
    pub webauthn_tokens: BTreeMap<String, String>,
}

impl UserWriteModel {
    /// Creates an unloaded model for `user_id`.
    #[must_use]
    pub fn new(user_id: &str) -> Self {
        Self {
            state: ModelState::new(user_id, ""),
            ..Self::default()
        }
    }

    /// Returns `true` if the user was added and not removed.
    #[must_use]
    pub fn is_active_stream(&self) -> bool {
        self.state.exists() && self.status != UserStatus::Removed
    }

    /// Returns `true` if the user is a human.
    #[must_use]
    pub fn is_human(&self) -> bool {
        self.user_type == Some(UserType::Human)
    }

    /// Returns `true` if the user is a machine.
    #[must_use]
    pub fn is_machine(&self) -> bool {
        self.user_type == Some(UserType::Machine)
    }

    /// Returns the link for `(idp_config_id, external_user_id)`, if any.
    #[must_use]
    pub fn external_idp(&self, idp_config_id: &str, external_user_id: &str) -> Option<&ExternalIdpLink> {
        self.external_idps
            .iter()
            .find(|l| l.idp_config_id == idp_config_id && l.external_user_id == external_user_id)
    }

    /// The aggregate identity events for this user are pushed to.
    #[must_use]
    pub fn aggregate(&self) -> Aggregate {
        Aggregate::new(
            self.state.aggregate_id.clone(),
            USER_AGGREGATE_TYPE,
            self.state.resource_owner.clone(),
            USER_VERSION,
        )
    }
}

impl Projection for UserWriteModel {
    type Event = UserEvent;

    fn query(&self) -> Result<SearchQuery, DomainError> {
        SearchQueryBuilder::stream(USER_AGGREGATE_TYPE, self.state.aggregate_id.clone()).build()
    }

    fn reduce(&mut self, event: &UserEvent) {
        match &event.kind {
            UserEventKind::HumanAdded(e) => {
                self.user_type = Some(UserType::Human);
                self.status = UserStatus::Active;
                self.username.clone_from(&e.username);
                self.first_name.clone_from(&e.first_name);
                self.last_name.clone_from(&e.last_name);
                self.display_name.clone_from(&e.display_name);
                self.email.clone_from(&e.email);
                self.phone.clone_from(&e.phone);
            }
            UserEventKind::MachineAdded(e) => {
                self.user_type = Some(UserType::Machine);
                self.status = UserStatus::Active;
                self.username.clone_from(&e.username);
                self.display_name.clone_from(&e.name);
                self.description.clone_from(&e.description);
            }
            UserEventKind::UsernameChanged(e) => self.username.clone_from(&e.username),
            UserEventKind::ProfileChanged(e) => {
                if let Some(first_name) = &e.first_name {
                    self.first_name.clone_from(first_name);
                }
                if let Some(last_name) = &e.last_name {
                    self.last_name.clone_from(last_name);
                }
                if let Some(display_name) = &e.display_name {
                    self.display_name.clone_from(display_name);
                }
            }
            UserEventKind::EmailChanged(e) => {
                self.email.clone_from(&e.email);
                self.email_verified = false;
            }
            UserEventKind::EmailVerified => self.email_verified = true,
            UserEventKind::PhoneChanged(e) => {
                self.phone = Some(e.phone.clone());
                self.phone_verified = false;
            }
            UserEventKind::PhoneVerified => self.phone_verified = true,
            UserEventKind::PhoneRemoved => {
                self.phone = None;
                self.phone_verified = false;
            }
            UserEventKind::PasswordChanged(e) => {
                self.password_set = true;
                self.password_change_required = e.change_required;
            }
            UserEventKind::ExternalIdpAdded(e) => self.external_idps.push(ExternalIdpLink {
                idp_config_id: e.idp_config_id.clone(),
                external_user_id: e.external_user_id.clone(),
                display_name: e.display_name.clone(),
            }),
            UserEventKind::ExternalIdpRemoved(e) => self.external_idps.retain(|l| {
                l.idp_config_id != e.idp_config_id || l.external_user_id != e.external_user_id
            }),
            UserEventKind::MachineKeyAdded(e) => {
                self.machine_keys.insert(
                    e.key_id.clone(),
                    MachineKey {
                        key_type: e.key_type.clone(),
                        expiration_date: e.expiration_date,
                    },
                );
            }
            UserEventKind::MachineKeyRemoved(e) => {
                self.machine_keys.remove(&e.key_id);
            }
            UserEventKind::OtpAdded(_) => self.otp_active = true,
            UserEventKind::OtpRemoved => self.otp_active = false,
            UserEventKind::WebAuthnTokenAdded(e) => {
                self.webauthn_tokens.insert(e.token_id.clone(), e.name.clone());
            }
            UserEventKind::WebAuthnTokenRemoved(e) => {
                self.webauthn_tokens.remove(&e.token_id);
            }
            UserEventKind::Locked => self.status = UserStatus::Locked,
            UserEventKind::Unlocked | UserEventKind::Reactivated => self.status = UserStatus::Active,
            UserEventKind::Deactivated => self.status = UserStatus::Inactive,
            UserEventKind::Removed => self.status = UserStatus::Removed,
        }
    }

    fn state(&self) -> &ModelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ModelState {
        &mut self.state
    }
}
