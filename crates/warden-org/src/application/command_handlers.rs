//! Command handlers for the Organization context.

use tracing::Instrument;
use warden_core::command::Command;
use warden_core::error::DomainError;
use warden_core::event::{PushEvent, StoredEvent};
use warden_core::model::{load_model, retry_on_conflict};
use warden_core::repository::EventRepository;
use warden_core::unique::UniqueConstraint;
use warden_user::application::command_handlers::prepare_add_human_user;
use warden_user::domain::commands::AddHumanUser;

use crate::domain::commands::{AddOrg, ChangeOrg, OrgDomainCommand, OrgLifecycleCommand, SetupOrg};
use crate::domain::events::{DomainPayload, OrgAdded, OrgChanged, OrgEventKind, registry};
use crate::domain::write_model::{OrgStatus, OrgWriteModel};
use crate::domain::{ORG_DOMAINS_TABLE, ORG_NAMES_TABLE};

/// Editor service recorded on every event this context pushes.
pub const EDITOR_SERVICE: &str = "warden-org";

/// Error key reported when an organization name is taken.
pub const ORG_NAME_TAKEN_ERROR_KEY: &str = "Errors.Org.AlreadyExists";

/// Error key reported when a domain is verified by another organization.
pub const DOMAIN_TAKEN_ERROR_KEY: &str = "Errors.Org.Domain.AlreadyExists";

const PUSH_ATTEMPTS: usize = 3;

type Decision = (OrgEventKind, Vec<UniqueConstraint>);

fn require(value: &str, what: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::InvalidArgument(format!("{what} must not be empty")));
    }
    Ok(())
}

async fn execute<C, F>(
    command: &C,
    repo: &dyn EventRepository,
    decide: F,
) -> Result<Vec<StoredEvent>, DomainError>
where
    C: Command,
    F: Fn(&OrgWriteModel) -> Result<Decision, DomainError>,
{
    let decide = &decide;
    let span = tracing::info_span!(
        "org_command",
        command = command.command_type(),
        org_id = %command.aggregate_id()
    );
    retry_on_conflict(PUSH_ATTEMPTS, move || async move {
        let mut model = OrgWriteModel::new(command.aggregate_id());
        load_model(repo, registry(), &mut model).await?;
        if !model.is_active_stream() {
            return Err(DomainError::NotFound(format!(
                "org {} not found",
                command.aggregate_id()
            )));
        }

        let (kind, constraints) = decide(&model)?;
        let event = model
            .aggregate()
            .push_event(&kind)
            .with_previous_sequence(model.state.push_precondition())
            .with_editor(command.editor_user(), EDITOR_SERVICE);
        repo.push(&[event], &constraints).await
    })
    .instrument(span)
    .await
}

fn prepare_add_org(command: &AddOrg) -> Result<(PushEvent, Vec<UniqueConstraint>), DomainError> {
    require(&command.org_id, "org id")?;
    require(&command.name, "org name")?;

    let event = OrgWriteModel::new(&command.org_id)
        .aggregate()
        .push_event(&OrgEventKind::Added(OrgAdded {
            name: command.name.clone(),
        }))
        .with_previous_sequence(0)
        .with_editor(&command.editor_user, EDITOR_SERVICE);
    let constraints = vec![UniqueConstraint::add(
        ORG_NAMES_TABLE,
        command.name.clone(),
        ORG_NAME_TAKEN_ERROR_KEY,
    )];
    Ok((event, constraints))
}

fn existing_aggregate_is_already_exists(err: DomainError) -> DomainError {
    match err {
        DomainError::ConcurrencyConflict {
            aggregate_type,
            aggregate_id,
            ..
        } => DomainError::AlreadyExists(format!("{aggregate_type} {aggregate_id} already exists")),
        other => other,
    }
}

/// Handles the `AddOrg` command.
///
/// # Errors
///
/// Returns `DomainError::InvalidArgument` for an empty id or name,
/// `DomainError::AlreadyExists` if the id or name is taken.
pub async fn handle_add_org(
    command: &AddOrg,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    let (event, constraints) = prepare_add_org(command)?;
    repo.push(&[event], &constraints)
        .await
        .map_err(existing_aggregate_is_already_exists)
}

/// Handles the `SetupOrg` command: adds the organization and its first
/// human user in one atomic push. Either both streams and all unique
/// claims are written, or nothing is.
///
/// # Errors
///
/// Returns `DomainError::InvalidArgument` for missing fields,
/// `DomainError::AlreadyExists` if either aggregate, the org name, or the
/// username is taken.
#[tracing::instrument(skip_all, fields(org_id = %command.org.org_id, user_id = %command.admin.user_id))]
pub async fn handle_setup_org(
    command: &SetupOrg,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    let (org_event, mut constraints) = prepare_add_org(&command.org)?;
    let admin = AddHumanUser {
        resource_owner: command.org.org_id.clone(),
        ..command.admin.clone()
    };
    let (user_event, user_constraints) = prepare_add_human_user(&admin)?;
    constraints.extend(user_constraints);

    repo.push(&[org_event, user_event], &constraints)
        .await
        .map_err(existing_aggregate_is_already_exists)
}

/// Handles the `ChangeOrg` command, swapping the name claim.
///
/// # Errors
///
/// Returns `DomainError::NotFound` for a missing org,
/// `DomainError::InvalidArgument` for an empty or unchanged name,
/// `DomainError::AlreadyExists` if the new name is taken.
pub async fn handle_change_org(
    command: &ChangeOrg,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    require(&command.name, "org name")?;
    execute(command, repo, |model| {
        if model.name == command.name {
            return Err(DomainError::InvalidArgument("org name not changed".into()));
        }
        Ok((
            OrgEventKind::Changed(OrgChanged {
                name: command.name.clone(),
            }),
            vec![
                UniqueConstraint::remove(ORG_NAMES_TABLE, model.name.clone()),
                UniqueConstraint::add(ORG_NAMES_TABLE, command.name.clone(), ORG_NAME_TAKEN_ERROR_KEY),
            ],
        ))
    })
    .await
}

fn domain_payload(command: &OrgDomainCommand) -> DomainPayload {
    DomainPayload {
        domain: command.domain.clone(),
    }
}

fn domain_not_found(command: &OrgDomainCommand) -> DomainError {
    DomainError::NotFound(format!("domain {} not found", command.domain))
}

/// Adds an unverified domain.
///
/// # Errors
///
/// Returns `DomainError::NotFound` for a missing org,
/// `DomainError::AlreadyExists` if the org already has the domain.
pub async fn handle_add_domain(
    command: &OrgDomainCommand,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    require(&command.domain, "domain")?;
    execute(command, repo, |model| {
        if model.domains.contains_key(&command.domain) {
            return Err(DomainError::AlreadyExists(format!(
                "domain {} already added",
                command.domain
            )));
        }
        Ok((OrgEventKind::DomainAdded(domain_payload(command)), Vec::new()))
    })
    .await
}

/// Verifies a domain, claiming it instance-wide.
///
/// # Errors
///
/// Returns `DomainError::NotFound` for a missing org or domain,
/// `DomainError::InvalidArgument` if it is already verified,
/// `DomainError::AlreadyExists` if another org verified it.
pub async fn handle_verify_domain(
    command: &OrgDomainCommand,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    execute(command, repo, |model| {
        let domain = model
            .domains
            .get(&command.domain)
            .ok_or_else(|| domain_not_found(command))?;
        if domain.verified {
            return Err(DomainError::InvalidArgument("domain already verified".into()));
        }
        Ok((
            OrgEventKind::DomainVerified(domain_payload(command)),
            vec![UniqueConstraint::add(
                ORG_DOMAINS_TABLE,
                command.domain.clone(),
                DOMAIN_TAKEN_ERROR_KEY,
            )],
        ))
    })
    .await
}

/// Makes a verified domain the primary domain.
///
/// # Errors
///
/// Returns `DomainError::NotFound` for a missing org or domain,
/// `DomainError::InvalidArgument` if it is unverified or already primary.
pub async fn handle_set_primary_domain(
    command: &OrgDomainCommand,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    execute(command, repo, |model| {
        let domain = model
            .domains
            .get(&command.domain)
            .ok_or_else(|| domain_not_found(command))?;
        if !domain.verified {
            return Err(DomainError::InvalidArgument("domain is not verified".into()));
        }
        if domain.primary {
            return Err(DomainError::InvalidArgument("domain is already primary".into()));
        }
        Ok((OrgEventKind::DomainPrimarySet(domain_payload(command)), Vec::new()))
    })
    .await
}

/// Removes a domain, releasing its claim if it was verified.
///
/// # Errors
///
/// Returns `DomainError::NotFound` for a missing org or domain,
/// `DomainError::InvalidArgument` for the primary domain.
pub async fn handle_remove_domain(
    command: &OrgDomainCommand,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    execute(command, repo, |model| {
        let domain = model
            .domains
            .get(&command.domain)
            .ok_or_else(|| domain_not_found(command))?;
        if domain.primary {
            return Err(DomainError::InvalidArgument(
                "the primary domain cannot be removed".into(),
            ));
        }
        let constraints = if domain.verified {
            vec![UniqueConstraint::remove(ORG_DOMAINS_TABLE, command.domain.clone())]
        } else {
            Vec::new()
        };
        Ok((OrgEventKind::DomainRemoved(domain_payload(command)), constraints))
    })
    .await
}

/// Deactivates an active organization.
///
/// # Errors
///
/// Returns `DomainError::NotFound` for a missing org,
/// `DomainError::InvalidArgument` if it is already inactive.
pub async fn handle_deactivate_org(
    command: &OrgLifecycleCommand,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    execute(command, repo, |model| {
        if model.status != OrgStatus::Active {
            return Err(DomainError::InvalidArgument("org is not active".into()));
        }
        Ok((OrgEventKind::Deactivated, Vec::new()))
    })
    .await
}

/// Reactivates an inactive organization.
///
/// # Errors
///
/// Returns `DomainError::NotFound` for a missing org,
/// `DomainError::InvalidArgument` unless it is inactive.
pub async fn handle_reactivate_org(
    command: &OrgLifecycleCommand,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    execute(command, repo, |model| {
        if model.status != OrgStatus::Inactive {
            return Err(DomainError::InvalidArgument("org is not inactive".into()));
        }
        Ok((OrgEventKind::Reactivated, Vec::new()))
    })
    .await
}

/// Removes an organization, releasing its name and verified domains.
///
/// # Errors
///
/// Returns `DomainError::NotFound` for a missing or removed org.
pub async fn handle_remove_org(
    command: &OrgLifecycleCommand,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    execute(command, repo, |model| {
        let mut constraints = vec![UniqueConstraint::remove(ORG_NAMES_TABLE, model.name.clone())];
        constraints.extend(
            model
                .verified_domains()
                .map(|domain| UniqueConstraint::remove(ORG_DOMAINS_TABLE, domain)),
        );
        Ok((OrgEventKind::Removed, constraints))
    })
    .await
}
