//! Organization write model.

use std::collections::BTreeMap;

use serde::Serialize;
use warden_core::aggregate::Aggregate;
use warden_core::error::DomainError;
use warden_core::model::{ModelState, Projection};
use warden_core::search::{SearchQuery, SearchQueryBuilder};

use super::events::{OrgEvent, OrgEventKind};
use super::{ORG_AGGREGATE_TYPE, ORG_VERSION};

/// Lifecycle state of an organization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrgStatus {
    /// No events yet.
    #[default]
    Unspecified,
    /// Usable.
    Active,
    /// Deactivated.
    Inactive,
    /// Removed; the stream is closed.
    Removed,
}

/// A domain registered on an organization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrgDomain {
    /// Ownership was proven.
    pub verified: bool,
    /// Used to build login names.
    pub primary: bool,
}

/// State an org command decides on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrgWriteModel {
    /// Replay bookkeeping.
    pub state: ModelState,
    /// Lifecycle state.
    pub status: OrgStatus,
    /// Current name.
    pub name: String,
    /// Domains by name.
    pub domains: BTreeMap<String, OrgDomain>,
}

impl OrgWriteModel {
    /// Creates an unloaded model for `org_id`. An org owns itself.
    #[must_use]
    pub fn new(org_id: &str) -> Self {
        Self {
            state: ModelState::new(org_id, org_id),
            ..Self::default()
        }
    }

    /// Returns `true` if the org was added and not removed.
    #[must_use]
    pub fn is_active_stream(&self) -> bool {
        self.state.exists() && self.status != OrgStatus::Removed
    }

    /// Names of the verified domains, which hold unique claims.
    pub fn verified_domains(&self) -> impl Iterator<Item = &str> {
        self.domains
            .iter()
            .filter(|(_, d)| d.verified)
            .map(|(name, _)| name.as_str())
    }

    /// The primary domain, if one is set.
    #[must_use]
    pub fn primary_domain(&self) -> Option<&str> {
        self.domains
            .iter()
            .find(|(_, d)| d.primary)
            .map(|(name, _)| name.as_str())
    }

    /// The aggregate identity events for this org are pushed to.
    #[must_use]
    pub fn aggregate(&self) -> Aggregate {
        Aggregate::new(
            self.state.aggregate_id.clone(),
            ORG_AGGREGATE_TYPE,
            self.state.resource_owner.clone(),
            ORG_VERSION,
        )
    }
}

impl Projection for OrgWriteModel {
    type Event = OrgEvent;

    fn query(&self) -> Result<SearchQuery, DomainError> {
        SearchQueryBuilder::stream(ORG_AGGREGATE_TYPE, self.state.aggregate_id.clone()).build()
    }

    fn reduce(&mut self, event: &OrgEvent) {
        match &event.kind {
            OrgEventKind::Added(e) => {
                self.name.clone_from(&e.name);
                self.status = OrgStatus::Active;
            }
            OrgEventKind::Changed(e) => self.name.clone_from(&e.name),
            OrgEventKind::DomainAdded(e) => {
                self.domains.entry(e.domain.clone()).or_default();
            }
            OrgEventKind::DomainVerified(e) => {
                if let Some(domain) = self.domains.get_mut(&e.domain) {
                    domain.verified = true;
                }
            }
            OrgEventKind::DomainPrimarySet(e) => {
                for (name, domain) in &mut self.domains {
                    domain.primary = *name == e.domain;
                }
            }
            OrgEventKind::DomainRemoved(e) => {
                self.domains.remove(&e.domain);
            }
            OrgEventKind::Deactivated => self.status = OrgStatus::Inactive,
            OrgEventKind::Reactivated => self.status = OrgStatus::Active,
            OrgEventKind::Removed => self.status = OrgStatus::Removed,
        }
    }

    fn state(&self) -> &ModelState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ModelState {
        &mut self.state
    }
}
