//! Query handlers for the Organization context.

use chrono::{DateTime, Utc};
use serde::Serialize;
use warden_core::error::DomainError;
use warden_core::model::load_model;
use warden_core::repository::EventRepository;

use crate::domain::events::registry;
use crate::domain::write_model::{OrgStatus, OrgWriteModel};

/// A domain as seen by readers.
#[derive(Debug, Serialize)]
pub struct OrgDomainView {
    /// The domain name.
    pub domain: String,
    /// Ownership was proven.
    pub verified: bool,
    /// Used to build login names.
    pub primary: bool,
}

/// Read-only view of an organization.
#[derive(Debug, Serialize)]
pub struct OrgView {
    /// The organization identifier.
    pub org_id: String,
    /// Current name.
    pub name: String,
    /// Lifecycle state.
    pub status: OrgStatus,
    /// Domains, ordered by name.
    pub domains: Vec<OrgDomainView>,
    /// The primary domain, if set.
    pub primary_domain: Option<String>,
    /// Sequence of the last event.
    pub sequence: u64,
    /// Creation date of the last event.
    pub change_date: Option<DateTime<Utc>>,
}

/// Retrieves an organization by id.
///
/// # Errors
///
/// Returns `DomainError::NotFound` if no events exist for the id.
/// Returns `DomainError::Internal` if the stream cannot be decoded.
pub async fn get_org_by_id(org_id: &str, repo: &dyn EventRepository) -> Result<OrgView, DomainError> {
    let mut model = OrgWriteModel::new(org_id);
    load_model(repo, registry(), &mut model).await?;
    if !model.state.exists() {
        return Err(DomainError::NotFound(format!("org {org_id} not found")));
    }
    Ok(OrgView {
        org_id: model.state.aggregate_id.clone(),
        name: model.name.clone(),
        status: model.status,
        domains: model
            .domains
            .iter()
            .map(|(domain, state)| OrgDomainView {
                domain: domain.clone(),
                verified: state.verified,
                primary: state.primary,
            })
            .collect(),
        primary_domain: model.primary_domain().map(str::to_owned),
        sequence: model.state.processed_sequence,
        change_date: model.state.change_date,
    })
}
