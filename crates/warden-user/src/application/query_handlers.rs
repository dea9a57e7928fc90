//! Query handlers for the User context.
//!
//! Read models are rebuilt from the store on every call and returned as
//! serializable views.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use warden_core::error::DomainError;
use warden_core::model::{Projection, fold, load_model};
use warden_core::repository::EventRepository;
use warden_core::search::{Columns, SearchQueryBuilder};

use crate::domain::USER_AGGREGATE_TYPE;
use crate::domain::events::{UserEvent, registry};
use crate::domain::write_model::{ExternalIdpLink, UserStatus, UserType, UserWriteModel};

/// Read-only view of a user.
#[derive(Debug, Serialize)]
pub struct UserView {
    /// The user identifier.
    pub user_id: String,
    /// Owning organization.
    pub resource_owner: String,
    /// Human or machine.
    pub user_type: Option<UserType>,
    /// Lifecycle state.
    pub status: UserStatus,
    /// Login name.
    pub username: String,
    /// Display name, or machine name.
    pub display_name: String,
    /// Email address, empty for machines.
    pub email: String,
    /// Whether the email is verified.
    pub email_verified: bool,
    /// Phone number.
    pub phone: Option<String>,
    /// Whether the phone is verified.
    pub phone_verified: bool,
    /// Linked external identities.
    pub external_idps: Vec<ExternalIdpLink>,
    /// Ids of the machine keys.
    pub machine_key_ids: Vec<String>,
    /// Whether OTP is set up.
    pub otp_active: bool,
    /// Number of registered `WebAuthn` tokens.
    pub webauthn_token_count: usize,
    /// Sequence of the last event.
    pub sequence: u64,
    /// Creation date of the last event.
    pub change_date: Option<DateTime<Utc>>,
}

impl From<&UserWriteModel> for UserView {
    fn from(model: &UserWriteModel) -> Self {
        Self {
            user_id: model.state.aggregate_id.clone(),
            resource_owner: model.state.resource_owner.clone(),
            user_type: model.user_type,
            status: model.status,
            username: model.username.clone(),
            display_name: model.display_name.clone(),
            email: model.email.clone(),
            email_verified: model.email_verified,
            phone: model.phone.clone(),
            phone_verified: model.phone_verified,
            external_idps: model.external_idps.clone(),
            machine_key_ids: model.machine_keys.keys().cloned().collect(),
            otp_active: model.otp_active,
            webauthn_token_count: model.webauthn_tokens.len(),
            sequence: model.state.processed_sequence,
            change_date: model.state.change_date,
        }
    }
}

/// Retrieves a user by id. Removed users are still returned, with status
/// `removed`.
///
/// # Errors
///
/// Returns `DomainError::NotFound` if no events exist for the id.
/// Returns `DomainError::Internal` if the stream cannot be decoded.
pub async fn get_user_by_id(
    user_id: &str,
    repo: &dyn EventRepository,
) -> Result<UserView, DomainError> {
    let mut model = UserWriteModel::new(user_id);
    load_model(repo, registry(), &mut model).await?;
    if !model.state().exists() {
        return Err(DomainError::NotFound(format!("user {user_id} not found")));
    }
    Ok(UserView::from(&model))
}

/// Lists the users owned by `resource_owner`, ordered by user id. Removed
/// users are skipped.
///
/// # Errors
///
/// Returns `DomainError::InvalidArgument` for an empty resource owner.
/// Returns `DomainError::Internal` if any user stream cannot be decoded.
pub async fn list_users_by_resource_owner(
    resource_owner: &str,
    repo: &dyn EventRepository,
) -> Result<Vec<UserView>, DomainError> {
    if resource_owner.is_empty() {
        return Err(DomainError::InvalidArgument(
            "resource owner must not be empty".into(),
        ));
    }
    let query = SearchQueryBuilder::new(Columns::Event)
        .aggregate_types([USER_AGGREGATE_TYPE])
        .resource_owner(resource_owner)
        .build()?;
    let events = registry().decode_all(&repo.filter(&query).await?)?;

    let mut streams: BTreeMap<String, Vec<UserEvent>> = BTreeMap::new();
    for event in events {
        streams
            .entry(event.metadata.aggregate_id.clone())
            .or_default()
            .push(event);
    }

    Ok(streams
        .into_iter()
        .filter_map(|(user_id, events)| {
            let mut model = UserWriteModel::new(&user_id);
            fold(&mut model, &events);
            model.is_active_stream().then(|| UserView::from(&model))
        })
        .collect())
}
