//! Command handlers for the User context.
//!
//! Every handler follows the same loop: rebuild the `UserWriteModel` from
//! the stream, decide on one event and the unique constraints it claims or
//! releases, and push it with the model's processed sequence as
//! precondition. A concurrency conflict reruns the loop from the reload.

use tracing::Instrument;
use warden_core::aggregate::Aggregate;
use warden_core::clock::Clock;
use warden_core::command::Command;
use warden_core::error::DomainError;
use warden_core::event::{PushEvent, StoredEvent};
use warden_core::model::{load_model, retry_on_conflict};
use warden_core::repository::EventRepository;
use warden_core::unique::UniqueConstraint;

use crate::domain::commands::{
    AddHumanUser, AddMachineKey, AddMachineUser, AddOtp, AddWebAuthnToken, ChangeEmail,
    ChangePassword, ChangePhone, ChangeProfile, ChangeUsername, DeactivateUser, LinkExternalIdp,
    LockUser, ReactivateUser, RemoveMachineKey, RemoveOtp, RemovePhone, RemoveUser,
    RemoveWebAuthnToken, UnlinkExternalIdp, UnlockUser, VerifyEmail, VerifyPhone,
};
use crate::domain::events::{
    EmailChanged, ExternalIdpAdded, ExternalIdpRemoved, HumanAdded, MachineAdded,
    MachineKeyAdded, MachineKeyRemoved, OtpAdded, PasswordChanged, PhoneChanged, ProfileChanged,
    UserEventKind, UsernameChanged, WebAuthnTokenAdded, WebAuthnTokenRemoved, registry,
};
use crate::domain::write_model::{ExternalIdpLink, UserStatus, UserWriteModel};
use crate::domain::{EXTERNAL_IDPS_TABLE, USER_AGGREGATE_TYPE, USER_VERSION, USERNAMES_TABLE};

/// Editor service recorded on every event this context pushes.
pub const EDITOR_SERVICE: &str = "warden-user";

/// Error key reported when a username is taken.
pub const USERNAME_TAKEN_ERROR_KEY: &str = "Errors.User.AlreadyExists";

/// Error key reported when an external identity is linked to another user.
pub const EXTERNAL_IDP_TAKEN_ERROR_KEY: &str = "Errors.User.ExternalIDP.AlreadyExists";

const PUSH_ATTEMPTS: usize = 3;

type Decision = (UserEventKind, Vec<UniqueConstraint>);

fn require(value: &str, what: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::InvalidArgument(format!("{what} must not be empty")));
    }
    Ok(())
}

fn require_human(model: &UserWriteModel) -> Result<(), DomainError> {
    if model.is_human() {
        Ok(())
    } else {
        Err(DomainError::InvalidArgument(format!(
            "user {} is not a human user",
            model.state.aggregate_id
        )))
    }
}

fn require_machine(model: &UserWriteModel) -> Result<(), DomainError> {
    if model.is_machine() {
        Ok(())
    } else {
        Err(DomainError::InvalidArgument(format!(
            "user {} is not a machine user",
            model.state.aggregate_id
        )))
    }
}

fn only(kind: UserEventKind) -> Result<Decision, DomainError> {
    Ok((kind, Vec::new()))
}

/// Reloads the write model, runs `decide`, and pushes the decided event,
/// retrying the whole sequence on concurrency conflicts.
async fn execute<C, F>(
    command: &C,
    repo: &dyn EventRepository,
    decide: F,
) -> Result<Vec<StoredEvent>, DomainError>
where
    C: Command,
    F: Fn(&UserWriteModel) -> Result<Decision, DomainError>,
{
    let decide = &decide;
    let span = tracing::info_span!(
        "user_command",
        command = command.command_type(),
        user_id = %command.aggregate_id()
    );
    retry_on_conflict(PUSH_ATTEMPTS, move || async move {
        let mut model = UserWriteModel::new(command.aggregate_id());
        load_model(repo, registry(), &mut model).await?;
        if !model.is_active_stream() {
            return Err(DomainError::NotFound(format!(
                "user {} not found",
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

/// Builds the first event of a new human user and the username claim,
/// without pushing. Lets other contexts add a user in their own batch.
///
/// # Errors
///
/// Returns `DomainError::InvalidArgument` if a required field is empty.
pub fn prepare_add_human_user(
    command: &AddHumanUser,
) -> Result<(PushEvent, Vec<UniqueConstraint>), DomainError> {
    require(&command.user_id, "user id")?;
    require(&command.resource_owner, "resource owner")?;
    require(&command.username, "username")?;
    require(&command.first_name, "first name")?;
    require(&command.last_name, "last name")?;
    require(&command.email, "email")?;

    let kind = UserEventKind::HumanAdded(HumanAdded {
        username: command.username.clone(),
        first_name: command.first_name.clone(),
        last_name: command.last_name.clone(),
        display_name: format!("{} {}", command.first_name, command.last_name),
        email: command.email.clone(),
        phone: command.phone.clone().filter(|p| !p.trim().is_empty()),
    });
    Ok(new_user_event(
        &command.user_id,
        &command.resource_owner,
        &command.editor_user,
        &command.username,
        &kind,
    ))
}

fn new_user_event(
    user_id: &str,
    resource_owner: &str,
    editor_user: &str,
    username: &str,
    kind: &UserEventKind,
) -> (PushEvent, Vec<UniqueConstraint>) {
    let event = Aggregate::new(
        user_id,
        USER_AGGREGATE_TYPE,
        resource_owner,
        USER_VERSION,
    )
    .push_event(kind)
    .with_previous_sequence(0)
    .with_editor(editor_user, EDITOR_SERVICE);
    let constraints = vec![UniqueConstraint::add(
        USERNAMES_TABLE,
        username,
        USERNAME_TAKEN_ERROR_KEY,
    )];
    (event, constraints)
}

/// Handles the `AddHumanUser` command.
///
/// # Errors
///
/// Returns `DomainError::InvalidArgument` if a required field is empty,
/// `DomainError::AlreadyExists` if the user id or username is taken.
pub async fn handle_add_human_user(
    command: &AddHumanUser,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    let (event, constraints) = prepare_add_human_user(command)?;
    push_new_user(&command.user_id, repo, event, constraints).await
}

/// Handles the `AddMachineUser` command.
///
/// # Errors
///
/// Returns `DomainError::InvalidArgument` if a required field is empty,
/// `DomainError::AlreadyExists` if the user id or username is taken.
pub async fn handle_add_machine_user(
    command: &AddMachineUser,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    require(&command.user_id, "user id")?;
    require(&command.resource_owner, "resource owner")?;
    require(&command.username, "username")?;
    require(&command.name, "name")?;

    let kind = UserEventKind::MachineAdded(MachineAdded {
        username: command.username.clone(),
        name: command.name.clone(),
        description: command.description.clone(),
    });
    let (event, constraints) = new_user_event(
        &command.user_id,
        &command.resource_owner,
        &command.editor_user,
        &command.username,
        &kind,
    );
    push_new_user(&command.user_id, repo, event, constraints).await
}

async fn push_new_user(
    user_id: &str,
    repo: &dyn EventRepository,
    event: PushEvent,
    constraints: Vec<UniqueConstraint>,
) -> Result<Vec<StoredEvent>, DomainError> {
    repo.push(&[event], &constraints).await.map_err(|e| {
        if e.is_conflict() {
            DomainError::AlreadyExists(format!("user {user_id} already exists"))
        } else {
            e
        }
    })
}

/// Handles the `ChangeUsername` command, swapping the username claim.
///
/// # Errors
///
/// Returns `DomainError::NotFound` for a missing user,
/// `DomainError::InvalidArgument` if the username is empty or unchanged,
/// `DomainError::AlreadyExists` if the new username is taken.
pub async fn handle_change_username(
    command: &ChangeUsername,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    require(&command.username, "username")?;
    execute(command, repo, |model| {
        if model.username == command.username {
            return Err(DomainError::InvalidArgument("username not changed".into()));
        }
        Ok((
            UserEventKind::UsernameChanged(UsernameChanged {
                username: command.username.clone(),
            }),
            vec![
                UniqueConstraint::remove(USERNAMES_TABLE, model.username.clone()),
                UniqueConstraint::add(
                    USERNAMES_TABLE,
                    command.username.clone(),
                    USERNAME_TAKEN_ERROR_KEY,
                ),
            ],
        ))
    })
    .await
}

/// Handles the `ChangeProfile` command. Only fields that differ from the
/// current profile are recorded.
///
/// # Errors
///
/// Returns `DomainError::NotFound` for a missing user,
/// `DomainError::InvalidArgument` for machine users or if nothing changed.
pub async fn handle_change_profile(
    command: &ChangeProfile,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    execute(command, repo, |model| {
        require_human(model)?;
        let changed = |new: &Option<String>, current: &str| {
            new.as_ref()
                .filter(|v| !v.trim().is_empty() && v.as_str() != current)
                .cloned()
        };
        let event = ProfileChanged {
            first_name: changed(&command.first_name, &model.first_name),
            last_name: changed(&command.last_name, &model.last_name),
            display_name: changed(&command.display_name, &model.display_name),
        };
        if event == ProfileChanged::default() {
            return Err(DomainError::InvalidArgument("profile not changed".into()));
        }
        only(UserEventKind::ProfileChanged(event))
    })
    .await
}

/// Handles the `ChangeEmail` command. The new address starts unverified.
///
/// # Errors
///
/// Returns `DomainError::NotFound` for a missing user,
/// `DomainError::InvalidArgument` for machine users or an empty or
/// unchanged address.
pub async fn handle_change_email(
    command: &ChangeEmail,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    require(&command.email, "email")?;
    execute(command, repo, |model| {
        require_human(model)?;
        if model.email == command.email {
            return Err(DomainError::InvalidArgument("email not changed".into()));
        }
        only(UserEventKind::EmailChanged(EmailChanged {
            email: command.email.clone(),
        }))
    })
    .await
}

/// Handles the `VerifyEmail` command.
///
/// # Errors
///
/// Returns `DomainError::NotFound` for a missing user,
/// `DomainError::InvalidArgument` if the email is already verified.
pub async fn handle_verify_email(
    command: &VerifyEmail,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    execute(command, repo, |model| {
        require_human(model)?;
        if model.email_verified {
            return Err(DomainError::InvalidArgument("email already verified".into()));
        }
        only(UserEventKind::EmailVerified)
    })
    .await
}

/// Handles the `ChangePhone` command. The new number starts unverified.
///
/// # Errors
///
/// Returns `DomainError::NotFound` for a missing user,
/// `DomainError::InvalidArgument` for an empty or unchanged number.
pub async fn handle_change_phone(
    command: &ChangePhone,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    require(&command.phone, "phone")?;
    execute(command, repo, |model| {
        require_human(model)?;
        if model.phone.as_deref() == Some(command.phone.as_str()) {
            return Err(DomainError::InvalidArgument("phone not changed".into()));
        }
        only(UserEventKind::PhoneChanged(PhoneChanged {
            phone: command.phone.clone(),
        }))
    })
    .await
}

/// Handles the `VerifyPhone` command.
///
/// # Errors
///
/// Returns `DomainError::NotFound` for a missing user or phone,
/// `DomainError::InvalidArgument` if the phone is already verified.
pub async fn handle_verify_phone(
    command: &VerifyPhone,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    execute(command, repo, |model| {
        require_human(model)?;
        if model.phone.is_none() {
            return Err(DomainError::NotFound("user has no phone".into()));
        }
        if model.phone_verified {
            return Err(DomainError::InvalidArgument("phone already verified".into()));
        }
        only(UserEventKind::PhoneVerified)
    })
    .await
}

/// Handles the `RemovePhone` command.
///
/// # Errors
///
/// Returns `DomainError::NotFound` for a missing user or phone.
pub async fn handle_remove_phone(
    command: &RemovePhone,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    execute(command, repo, |model| {
        require_human(model)?;
        if model.phone.is_none() {
            return Err(DomainError::NotFound("user has no phone".into()));
        }
        only(UserEventKind::PhoneRemoved)
    })
    .await
}

/// Handles the `ChangePassword` command.
///
/// # Errors
///
/// Returns `DomainError::NotFound` for a missing user,
/// `DomainError::InvalidArgument` for machine users or an empty hash.
pub async fn handle_change_password(
    command: &ChangePassword,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    require(&command.encoded_password, "encoded password")?;
    execute(command, repo, |model| {
        require_human(model)?;
        only(UserEventKind::PasswordChanged(PasswordChanged {
            encoded_password: command.encoded_password.clone(),
            change_required: command.change_required,
        }))
    })
    .await
}

/// Handles the `LinkExternalIdp` command, claiming the external identity.
///
/// # Errors
///
/// Returns `DomainError::NotFound` for a missing user,
/// `DomainError::InvalidArgument` for empty ids,
/// `DomainError::AlreadyExists` if the identity is linked to any user.
pub async fn handle_link_external_idp(
    command: &LinkExternalIdp,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    require(&command.idp_config_id, "idp config id")?;
    require(&command.external_user_id, "external user id")?;
    execute(command, repo, |model| {
        require_human(model)?;
        if model
            .external_idp(&command.idp_config_id, &command.external_user_id)
            .is_some()
        {
            return Err(DomainError::AlreadyExists(EXTERNAL_IDP_TAKEN_ERROR_KEY.into()));
        }
        Ok((
            UserEventKind::ExternalIdpAdded(ExternalIdpAdded {
                idp_config_id: command.idp_config_id.clone(),
                external_user_id: command.external_user_id.clone(),
                display_name: command.display_name.clone(),
            }),
            vec![UniqueConstraint::add(
                EXTERNAL_IDPS_TABLE,
                ExternalIdpLink::unique_field(&command.idp_config_id, &command.external_user_id),
                EXTERNAL_IDP_TAKEN_ERROR_KEY,
            )],
        ))
    })
    .await
}

/// Handles the `UnlinkExternalIdp` command, releasing the external identity.
///
/// # Errors
///
/// Returns `DomainError::NotFound` for a missing user or link.
pub async fn handle_unlink_external_idp(
    command: &UnlinkExternalIdp,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    execute(command, repo, |model| {
        if model
            .external_idp(&command.idp_config_id, &command.external_user_id)
            .is_none()
        {
            return Err(DomainError::NotFound("external idp link not found".into()));
        }
        Ok((
            UserEventKind::ExternalIdpRemoved(ExternalIdpRemoved {
                idp_config_id: command.idp_config_id.clone(),
                external_user_id: command.external_user_id.clone(),
            }),
            vec![UniqueConstraint::remove(
                EXTERNAL_IDPS_TABLE,
                ExternalIdpLink::unique_field(&command.idp_config_id, &command.external_user_id),
            )],
        ))
    })
    .await
}

/// Handles the `AddMachineKey` command.
///
/// # Errors
///
/// Returns `DomainError::NotFound` for a missing user,
/// `DomainError::InvalidArgument` for human users, empty ids, or an
/// expiration date that is not in the future,
/// `DomainError::AlreadyExists` if the key id is in use.
pub async fn handle_add_machine_key(
    command: &AddMachineKey,
    clock: &dyn Clock,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    require(&command.key_id, "key id")?;
    require(&command.key_type, "key type")?;
    if command.expiration_date <= clock.now() {
        return Err(DomainError::InvalidArgument(
            "expiration date must be in the future".into(),
        ));
    }
    execute(command, repo, |model| {
        require_machine(model)?;
        if model.machine_keys.contains_key(&command.key_id) {
            return Err(DomainError::AlreadyExists(format!(
                "machine key {} already exists",
                command.key_id
            )));
        }
        only(UserEventKind::MachineKeyAdded(MachineKeyAdded {
            key_id: command.key_id.clone(),
            key_type: command.key_type.clone(),
            expiration_date: command.expiration_date,
        }))
    })
    .await
}

/// Handles the `RemoveMachineKey` command.
///
/// # Errors
///
/// Returns `DomainError::NotFound` for a missing user or key.
pub async fn handle_remove_machine_key(
    command: &RemoveMachineKey,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    execute(command, repo, |model| {
        if !model.machine_keys.contains_key(&command.key_id) {
            return Err(DomainError::NotFound(format!(
                "machine key {} not found",
                command.key_id
            )));
        }
        only(UserEventKind::MachineKeyRemoved(MachineKeyRemoved {
            key_id: command.key_id.clone(),
        }))
    })
    .await
}

/// Handles the `AddOtp` command.
///
/// # Errors
///
/// Returns `DomainError::NotFound` for a missing user,
/// `DomainError::AlreadyExists` if OTP is already set up.
pub async fn handle_add_otp(
    command: &AddOtp,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    require(&command.secret, "otp secret")?;
    execute(command, repo, |model| {
        require_human(model)?;
        if model.otp_active {
            return Err(DomainError::AlreadyExists("otp already set up".into()));
        }
        only(UserEventKind::OtpAdded(OtpAdded {
            secret: command.secret.clone(),
        }))
    })
    .await
}

/// Handles the `RemoveOtp` command.
///
/// # Errors
///
/// Returns `DomainError::NotFound` for a missing user or if OTP is not set up.
pub async fn handle_remove_otp(
    command: &RemoveOtp,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    execute(command, repo, |model| {
        if !model.otp_active {
            return Err(DomainError::NotFound("otp not set up".into()));
        }
        only(UserEventKind::OtpRemoved)
    })
    .await
}

/// Handles the `AddWebAuthnToken` command.
///
/// # Errors
///
/// Returns `DomainError::NotFound` for a missing user,
/// `DomainError::AlreadyExists` if the token id is in use.
pub async fn handle_add_webauthn_token(
    command: &AddWebAuthnToken,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    require(&command.token_id, "token id")?;
    execute(command, repo, |model| {
        require_human(model)?;
        if model.webauthn_tokens.contains_key(&command.token_id) {
            return Err(DomainError::AlreadyExists(format!(
                "webauthn token {} already exists",
                command.token_id
            )));
        }
        only(UserEventKind::WebAuthnTokenAdded(WebAuthnTokenAdded {
            token_id: command.token_id.clone(),
            name: command.name.clone(),
        }))
    })
    .await
}

/// Handles the `RemoveWebAuthnToken` command.
///
/// # Errors
///
/// Returns `DomainError::NotFound` for a missing user or token.
pub async fn handle_remove_webauthn_token(
    command: &RemoveWebAuthnToken,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    execute(command, repo, |model| {
        if !model.webauthn_tokens.contains_key(&command.token_id) {
            return Err(DomainError::NotFound(format!(
                "webauthn token {} not found",
                command.token_id
            )));
        }
        only(UserEventKind::WebAuthnTokenRemoved(WebAuthnTokenRemoved {
            token_id: command.token_id.clone(),
        }))
    })
    .await
}

fn transition(
    model: &UserWriteModel,
    allowed: &[UserStatus],
    kind: UserEventKind,
) -> Result<Decision, DomainError> {
    if !allowed.contains(&model.status) {
        return Err(DomainError::InvalidArgument(format!(
            "user {} is {:?}",
            model.state.aggregate_id, model.status
        )));
    }
    only(kind)
}

/// Handles the `LockUser` command.
///
/// # Errors
///
/// Returns `DomainError::NotFound` for a missing user,
/// `DomainError::InvalidArgument` unless the user is active.
pub async fn handle_lock_user(
    command: &LockUser,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    execute(command, repo, |model| {
        transition(model, &[UserStatus::Active], UserEventKind::Locked)
    })
    .await
}

/// Handles the `UnlockUser` command.
///
/// # Errors
///
/// Returns `DomainError::NotFound` for a missing user,
/// `DomainError::InvalidArgument` unless the user is locked.
pub async fn handle_unlock_user(
    command: &UnlockUser,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    execute(command, repo, |model| {
        transition(model, &[UserStatus::Locked], UserEventKind::Unlocked)
    })
    .await
}

/// Handles the `DeactivateUser` command.
///
/// # Errors
///
/// Returns `DomainError::NotFound` for a missing user,
/// `DomainError::InvalidArgument` if the user is already inactive.
pub async fn handle_deactivate_user(
    command: &DeactivateUser,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    execute(command, repo, |model| {
        transition(
            model,
            &[UserStatus::Active, UserStatus::Locked],
            UserEventKind::Deactivated,
        )
    })
    .await
}

/// Handles the `ReactivateUser` command.
///
/// # Errors
///
/// Returns `DomainError::NotFound` for a missing user,
/// `DomainError::InvalidArgument` unless the user is inactive.
pub async fn handle_reactivate_user(
    command: &ReactivateUser,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    execute(command, repo, |model| {
        transition(model, &[UserStatus::Inactive], UserEventKind::Reactivated)
    })
    .await
}

/// Handles the `RemoveUser` command, releasing the username and every
/// linked external identity.
///
/// # Errors
///
/// Returns `DomainError::NotFound` for a missing or already removed user.
pub async fn handle_remove_user(
    command: &RemoveUser,
    repo: &dyn EventRepository,
) -> Result<Vec<StoredEvent>, DomainError> {
    execute(command, repo, |model| {
        let mut constraints = vec![UniqueConstraint::remove(
            USERNAMES_TABLE,
            model.username.clone(),
        )];
        constraints.extend(model.external_idps.iter().map(|link| {
            UniqueConstraint::remove(
                EXTERNAL_IDPS_TABLE,
                ExternalIdpLink::unique_field(&link.idp_config_id, &link.external_user_id),
            )
        }));
        Ok((UserEventKind::Removed, constraints))
    })
    .await
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use warden_core::error::DomainError;
    use warden_test_support::{
        EmptyEventRepository, FailingEventRepository, FixedClock, InMemoryEventRepository,
        RecordingEventRepository,
    };

    use super::*;
    use crate::domain::events::{
        EMAIL_CHANGED_EVENT_TYPE, HUMAN_ADDED_EVENT_TYPE, REMOVED_EVENT_TYPE,
    };

    fn add_gigi() -> AddHumanUser {
        AddHumanUser {
            user_id: "u1".into(),
            resource_owner: "org1".into(),
            editor_user: "admin".into(),
            username: "gigi".into(),
            first_name: "Gigi".into(),
            last_name: "Giraffe".into(),
            email: "gigi@example.com".into(),
            phone: None,
        }
    }

    fn add_bot() -> AddMachineUser {
        AddMachineUser {
            user_id: "m1".into(),
            resource_owner: "org1".into(),
            editor_user: "admin".into(),
            username: "ci-bot".into(),
            name: "CI".into(),
            description: "pipeline".into(),
        }
    }

    fn change_email(email: &str) -> ChangeEmail {
        ChangeEmail {
            user_id: "u1".into(),
            editor_user: "gigi".into(),
            email: email.into(),
        }
    }

    async fn repo_with_gigi() -> InMemoryEventRepository {
        let repo = InMemoryEventRepository::new();
        handle_add_human_user(&add_gigi(), &repo).await.unwrap();
        repo
    }

    #[tokio::test]
    async fn test_add_human_user_claims_username() {
        // Arrange
        let repo = RecordingEventRepository::new(Vec::new());

        // Act
        let stored = handle_add_human_user(&add_gigi(), &repo).await.unwrap();

        // Assert
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].event_type.as_str(), HUMAN_ADDED_EVENT_TYPE);
        let pushed = repo.pushed();
        let (events, constraints) = &pushed[0];
        assert!(events[0].check_previous_sequence);
        assert_eq!(events[0].previous_sequence, 0);
        assert_eq!(events[0].editor_user, "admin");
        assert_eq!(events[0].editor_service, EDITOR_SERVICE);
        assert_eq!(events[0].data["display_name"], "Gigi Giraffe");
        assert_eq!(
            constraints,
            &vec![UniqueConstraint::add(
                USERNAMES_TABLE,
                "gigi",
                USERNAME_TAKEN_ERROR_KEY
            )]
        );
    }

    #[tokio::test]
    async fn test_add_human_user_rejects_empty_email() {
        // Arrange
        let repo = RecordingEventRepository::new(Vec::new());
        let command = AddHumanUser {
            email: "  ".into(),
            ..add_gigi()
        };

        // Act
        let result = handle_add_human_user(&command, &repo).await;

        // Assert
        assert!(result.unwrap_err().is_invalid_argument());
        assert!(repo.pushed().is_empty());
    }

    #[tokio::test]
    async fn test_add_user_twice_is_already_exists() {
        // Arrange
        let repo = repo_with_gigi().await;
        let command = AddHumanUser {
            username: "gigi2".into(),
            ..add_gigi()
        };

        // Act
        let result = handle_add_human_user(&command, &repo).await;

        // Assert
        assert!(result.unwrap_err().is_already_exists());
        assert_eq!(repo.events().len(), 1);
    }

    #[tokio::test]
    async fn test_taken_username_reports_error_key() {
        // Arrange
        let repo = repo_with_gigi().await;
        let command = AddHumanUser {
            user_id: "u2".into(),
            ..add_gigi()
        };

        // Act
        let result = handle_add_human_user(&command, &repo).await;

        // Assert
        match result {
            Err(DomainError::AlreadyExists(key)) => assert_eq!(key, USERNAME_TAKEN_ERROR_KEY),
            other => panic!("expected AlreadyExists, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_change_email_pushes_with_processed_sequence() {
        // Arrange
        let repo = repo_with_gigi().await;

        // Act
        let stored = handle_change_email(&change_email("gigi@acme.ch"), &repo)
            .await
            .unwrap();

        // Assert
        assert_eq!(stored[0].event_type.as_str(), EMAIL_CHANGED_EVENT_TYPE);
        assert_eq!(stored[0].sequence, 2);
        assert_eq!(stored[0].previous_sequence, 1);
        assert_eq!(stored[0].editor_user, "gigi");
        assert_eq!(stored[0].resource_owner, "org1");
    }

    #[tokio::test]
    async fn test_unchanged_email_is_rejected() {
        // Arrange
        let repo = repo_with_gigi().await;

        // Act
        let result = handle_change_email(&change_email("gigi@example.com"), &repo).await;

        // Assert
        assert!(result.unwrap_err().is_invalid_argument());
        assert_eq!(repo.events().len(), 1);
    }

    #[tokio::test]
    async fn test_command_on_missing_user_is_not_found() {
        // Arrange
        let repo = EmptyEventRepository;

        // Act
        let result = handle_change_email(&change_email("gigi@acme.ch"), &repo).await;

        // Assert
        assert!(result.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_repository_failure_propagates() {
        // Act
        let result = handle_change_email(&change_email("gigi@acme.ch"), &FailingEventRepository).await;

        // Assert
        assert!(matches!(result, Err(DomainError::Internal(_))));
    }

    #[tokio::test]
    async fn test_change_username_swaps_claim() {
        // Arrange
        let repo = repo_with_gigi().await;
        let command = ChangeUsername {
            user_id: "u1".into(),
            editor_user: "admin".into(),
            username: "gigi.giraffe".into(),
        };

        // Act
        handle_change_username(&command, &repo).await.unwrap();

        // Assert
        assert_eq!(
            repo.unique_constraints(),
            vec![(USERNAMES_TABLE.to_owned(), "gigi.giraffe".to_owned())]
        );
    }

    #[tokio::test]
    async fn test_change_profile_records_only_changed_fields() {
        // Arrange
        let repo = repo_with_gigi().await;
        let command = ChangeProfile {
            user_id: "u1".into(),
            editor_user: "gigi".into(),
            first_name: Some("Gigi".into()),
            last_name: None,
            display_name: Some("G.".into()),
        };

        // Act
        let stored = handle_change_profile(&command, &repo).await.unwrap();

        // Assert
        assert_eq!(stored[0].data, serde_json::json!({"display_name": "G."}));
    }

    #[tokio::test]
    async fn test_verify_phone_without_phone_is_not_found() {
        // Arrange
        let repo = repo_with_gigi().await;
        let command = VerifyPhone {
            user_id: "u1".into(),
            editor_user: "gigi".into(),
        };

        // Act
        let result = handle_verify_phone(&command, &repo).await;

        // Assert
        assert!(result.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_phone_change_verify_and_remove() {
        // Arrange
        let repo = repo_with_gigi().await;
        let change = ChangePhone {
            user_id: "u1".into(),
            editor_user: "gigi".into(),
            phone: "+41 79 000 00 00".into(),
        };
        let verify = VerifyPhone {
            user_id: "u1".into(),
            editor_user: "gigi".into(),
        };
        let remove = RemovePhone {
            user_id: "u1".into(),
            editor_user: "gigi".into(),
        };

        // Act
        handle_change_phone(&change, &repo).await.unwrap();
        handle_verify_phone(&verify, &repo).await.unwrap();
        let second_verify = handle_verify_phone(&verify, &repo).await;
        handle_remove_phone(&remove, &repo).await.unwrap();
        let second_remove = handle_remove_phone(&remove, &repo).await;

        // Assert
        assert!(second_verify.unwrap_err().is_invalid_argument());
        assert!(second_remove.unwrap_err().is_not_found());
        assert_eq!(repo.events().len(), 4);
    }

    #[tokio::test]
    async fn test_external_idp_link_is_unique_across_users() {
        // Arrange
        let repo = repo_with_gigi().await;
        handle_add_human_user(
            &AddHumanUser {
                user_id: "u2".into(),
                username: "mimi".into(),
                ..add_gigi()
            },
            &repo,
        )
        .await
        .unwrap();
        let link = |user_id: &str| LinkExternalIdp {
            user_id: user_id.into(),
            editor_user: "admin".into(),
            idp_config_id: "google".into(),
            external_user_id: "g-42".into(),
            display_name: "Gigi".into(),
        };

        // Act
        handle_link_external_idp(&link("u1"), &repo).await.unwrap();
        let result = handle_link_external_idp(&link("u2"), &repo).await;

        // Assert
        match result {
            Err(DomainError::AlreadyExists(key)) => assert_eq!(key, EXTERNAL_IDP_TAKEN_ERROR_KEY),
            other => panic!("expected AlreadyExists, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unlink_releases_external_idp() {
        // Arrange
        let repo = repo_with_gigi().await;
        handle_link_external_idp(
            &LinkExternalIdp {
                user_id: "u1".into(),
                editor_user: "admin".into(),
                idp_config_id: "google".into(),
                external_user_id: "g-42".into(),
                display_name: String::new(),
            },
            &repo,
        )
        .await
        .unwrap();
        let unlink = UnlinkExternalIdp {
            user_id: "u1".into(),
            editor_user: "admin".into(),
            idp_config_id: "google".into(),
            external_user_id: "g-42".into(),
        };

        // Act
        handle_unlink_external_idp(&unlink, &repo).await.unwrap();
        let again = handle_unlink_external_idp(&unlink, &repo).await;

        // Assert
        assert!(again.unwrap_err().is_not_found());
        assert_eq!(
            repo.unique_constraints(),
            vec![(USERNAMES_TABLE.to_owned(), "gigi".to_owned())]
        );
    }

    #[tokio::test]
    async fn test_machine_key_must_expire_in_the_future() {
        // Arrange
        let repo = InMemoryEventRepository::new();
        handle_add_machine_user(&add_bot(), &repo).await.unwrap();
        let clock = FixedClock::reference();
        let key = |expiration_date| AddMachineKey {
            user_id: "m1".into(),
            editor_user: "admin".into(),
            key_id: "k1".into(),
            key_type: "json".into(),
            expiration_date,
        };

        // Act
        let expired = handle_add_machine_key(&key(clock.0), &clock, &repo).await;
        let valid = handle_add_machine_key(&key(clock.0 + Duration::days(30)), &clock, &repo).await;
        let duplicate =
            handle_add_machine_key(&key(clock.0 + Duration::days(30)), &clock, &repo).await;

        // Assert
        assert!(expired.unwrap_err().is_invalid_argument());
        assert_eq!(valid.unwrap()[0].sequence, 2);
        assert!(duplicate.unwrap_err().is_already_exists());
    }

    #[tokio::test]
    async fn test_machine_key_on_human_user_is_rejected() {
        // Arrange
        let repo = repo_with_gigi().await;
        let clock = FixedClock::reference();
        let command = AddMachineKey {
            user_id: "u1".into(),
            editor_user: "admin".into(),
            key_id: "k1".into(),
            key_type: "json".into(),
            expiration_date: clock.0 + Duration::days(1),
        };

        // Act
        let result = handle_add_machine_key(&command, &clock, &repo).await;

        // Assert
        assert!(result.unwrap_err().is_invalid_argument());
    }

    #[tokio::test]
    async fn test_otp_and_webauthn_lifecycle() {
        // Arrange
        let repo = repo_with_gigi().await;
        let add_otp = AddOtp {
            user_id: "u1".into(),
            editor_user: "gigi".into(),
            secret: "encrypted".into(),
        };
        let add_token = AddWebAuthnToken {
            user_id: "u1".into(),
            editor_user: "gigi".into(),
            token_id: "t1".into(),
            name: "yubikey".into(),
        };
        let remove_token = RemoveWebAuthnToken {
            user_id: "u1".into(),
            editor_user: "gigi".into(),
            token_id: "t1".into(),
        };

        // Act
        handle_add_otp(&add_otp, &repo).await.unwrap();
        let second_otp = handle_add_otp(&add_otp, &repo).await;
        handle_remove_otp(
            &RemoveOtp {
                user_id: "u1".into(),
                editor_user: "gigi".into(),
            },
            &repo,
        )
        .await
        .unwrap();
        handle_add_webauthn_token(&add_token, &repo).await.unwrap();
        handle_remove_webauthn_token(&remove_token, &repo)
            .await
            .unwrap();
        let second_remove = handle_remove_webauthn_token(&remove_token, &repo).await;

        // Assert
        assert!(second_otp.unwrap_err().is_already_exists());
        assert!(second_remove.unwrap_err().is_not_found());
        assert_eq!(repo.events().len(), 5);
    }

    #[tokio::test]
    async fn test_lock_requires_active_user() {
        // Arrange
        let repo = repo_with_gigi().await;
        let lock = LockUser {
            user_id: "u1".into(),
            editor_user: "admin".into(),
        };

        // Act
        handle_lock_user(&lock, &repo).await.unwrap();
        let again = handle_lock_user(&lock, &repo).await;
        let unlocked = handle_unlock_user(
            &UnlockUser {
                user_id: "u1".into(),
                editor_user: "admin".into(),
            },
            &repo,
        )
        .await;

        // Assert
        assert!(again.unwrap_err().is_invalid_argument());
        assert_eq!(unlocked.unwrap()[0].sequence, 3);
    }

    #[tokio::test]
    async fn test_deactivate_and_reactivate() {
        // Arrange
        let repo = repo_with_gigi().await;
        let reactivate = ReactivateUser {
            user_id: "u1".into(),
            editor_user: "admin".into(),
        };

        // Act
        let early = handle_reactivate_user(&reactivate, &repo).await;
        handle_deactivate_user(
            &DeactivateUser {
                user_id: "u1".into(),
                editor_user: "admin".into(),
            },
            &repo,
        )
        .await
        .unwrap();
        let reactivated = handle_reactivate_user(&reactivate, &repo).await;

        // Assert
        assert!(early.unwrap_err().is_invalid_argument());
        assert!(reactivated.is_ok());
    }

    #[tokio::test]
    async fn test_remove_user_releases_claims_and_closes_stream() {
        // Arrange
        let repo = repo_with_gigi().await;
        handle_link_external_idp(
            &LinkExternalIdp {
                user_id: "u1".into(),
                editor_user: "admin".into(),
                idp_config_id: "google".into(),
                external_user_id: "g-42".into(),
                display_name: String::new(),
            },
            &repo,
        )
        .await
        .unwrap();
        let remove = RemoveUser {
            user_id: "u1".into(),
            editor_user: "admin".into(),
        };

        // Act
        let stored = handle_remove_user(&remove, &repo).await.unwrap();
        let again = handle_remove_user(&remove, &repo).await;
        let change = handle_change_email(&change_email("gigi@acme.ch"), &repo).await;

        // Assert
        assert_eq!(stored[0].event_type.as_str(), REMOVED_EVENT_TYPE);
        assert!(repo.unique_constraints().is_empty());
        assert!(again.unwrap_err().is_not_found());
        assert!(change.unwrap_err().is_not_found());
    }
}
