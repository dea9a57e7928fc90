//! Commands for the User context.

use chrono::{DateTime, Utc};
use warden_core::command::Command;

macro_rules! user_command {
    ($name:ident, $command_type:literal) => {
        impl Command for $name {
            fn command_type(&self) -> &'static str {
                $command_type
            }

            fn aggregate_id(&self) -> &str {
                &self.user_id
            }

            fn editor_user(&self) -> &str {
                &self.editor_user
            }
        }
    };
}

macro_rules! lifecycle_command {
    ($(#[$doc:meta])* $name:ident, $command_type:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name {
            /// Target user.
            pub user_id: String,
            /// Acting user.
            pub editor_user: String,
        }

        user_command!($name, $command_type);
    };
}

/// Command to add a human user.
#[derive(Debug, Clone)]
pub struct AddHumanUser {
    /// New user identifier.
    pub user_id: String,
    /// Owning organization.
    pub resource_owner: String,
    /// Acting user.
    pub editor_user: String,
    /// Login name, unique across the instance.
    pub username: String,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Email address.
    pub email: String,
    /// Optional phone number.
    pub phone: Option<String>,
}

/// Command to add a machine user.
#[derive(Debug, Clone)]
pub struct AddMachineUser {
    /// New user identifier.
    pub user_id: String,
    /// Owning organization.
    pub resource_owner: String,
    /// Acting user.
    pub editor_user: String,
    /// Login name, unique across the instance.
    pub username: String,
    /// Machine name.
    pub name: String,
    /// Free-form description.
    pub description: String,
}

/// Command to change the username.
#[derive(Debug, Clone)]
pub struct ChangeUsername {
    /// Target user.
    pub user_id: String,
    /// Acting user.
    pub editor_user: String,
    /// The new login name.
    pub username: String,
}

/// Command to change profile fields of a human user. `None` keeps a field.
#[derive(Debug, Clone)]
pub struct ChangeProfile {
    /// Target user.
    pub user_id: String,
    /// Acting user.
    pub editor_user: String,
    /// New given name.
    pub first_name: Option<String>,
    /// New family name.
    pub last_name: Option<String>,
    /// New display name.
    pub display_name: Option<String>,
}

/// Command to change the email address.
#[derive(Debug, Clone)]
pub struct ChangeEmail {
    /// Target user.
    pub user_id: String,
    /// Acting user.
    pub editor_user: String,
    /// The new email address.
    pub email: String,
}

/// Command to change the phone number.
#[derive(Debug, Clone)]
pub struct ChangePhone {
    /// Target user.
    pub user_id: String,
    /// Acting user.
    pub editor_user: String,
    /// The new phone number.
    pub phone: String,
}

/// Command to change the password.
#[derive(Debug, Clone)]
pub struct ChangePassword {
    /// Target user.
    pub user_id: String,
    /// Acting user.
    pub editor_user: String,
    /// Encoded password hash.
    pub encoded_password: String,
    /// Force a change at next login.
    pub change_required: bool,
}

/// Command to link an external identity provider.
#[derive(Debug, Clone)]
pub struct LinkExternalIdp {
    /// Target user.
    pub user_id: String,
    /// Acting user.
    pub editor_user: String,
    /// Identity provider configuration.
    pub idp_config_id: String,
    /// User id at the identity provider.
    pub external_user_id: String,
    /// Display name reported by the identity provider.
    pub display_name: String,
}

/// Command to remove an external identity provider link.
#[derive(Debug, Clone)]
pub struct UnlinkExternalIdp {
    /// Target user.
    pub user_id: String,
    /// Acting user.
    pub editor_user: String,
    /// Identity provider configuration.
    pub idp_config_id: String,
    /// User id at the identity provider.
    pub external_user_id: String,
}

/// Command to add a key to a machine user.
#[derive(Debug, Clone)]
pub struct AddMachineKey {
    /// Target user.
    pub user_id: String,
    /// Acting user.
    pub editor_user: String,
    /// Key identifier.
    pub key_id: String,
    /// Key format.
    pub key_type: String,
    /// Must lie in the future.
    pub expiration_date: DateTime<Utc>,
}

/// Command to remove a machine key.
#[derive(Debug, Clone)]
pub struct RemoveMachineKey {
    /// Target user.
    pub user_id: String,
    /// Acting user.
    pub editor_user: String,
    /// Key identifier.
    pub key_id: String,
}

/// Command to add an OTP second factor.
#[derive(Debug, Clone)]
pub struct AddOtp {
    /// Target user.
    pub user_id: String,
    /// Acting user.
    pub editor_user: String,
    /// Encrypted shared secret.
    pub secret: String,
}

/// Command to add a `WebAuthn` token.
#[derive(Debug, Clone)]
pub struct AddWebAuthnToken {
    /// Target user.
    pub user_id: String,
    /// Acting user.
    pub editor_user: String,
    /// Token identifier.
    pub token_id: String,
    /// User-chosen token name.
    pub name: String,
}

/// Command to remove a `WebAuthn` token.
#[derive(Debug, Clone)]
pub struct RemoveWebAuthnToken {
    /// Target user.
    pub user_id: String,
    /// Acting user.
    pub editor_user: String,
    /// Token identifier.
    pub token_id: String,
}

lifecycle_command!(
    /// Command to mark the email address verified.
    VerifyEmail,
    "user.verify_email"
);
lifecycle_command!(
    /// Command to mark the phone number verified.
    VerifyPhone,
    "user.verify_phone"
);
lifecycle_command!(
    /// Command to remove the phone number.
    RemovePhone,
    "user.remove_phone"
);
lifecycle_command!(
    /// Command to remove the OTP second factor.
    RemoveOtp,
    "user.remove_otp"
);
lifecycle_command!(
    /// Command to lock an active user.
    LockUser,
    "user.lock"
);
lifecycle_command!(
    /// Command to unlock a locked user.
    UnlockUser,
    "user.unlock"
);
lifecycle_command!(
    /// Command to deactivate an active user.
    DeactivateUser,
    "user.deactivate"
);
lifecycle_command!(
    /// Command to reactivate an inactive user.
    ReactivateUser,
    "user.reactivate"
);
lifecycle_command!(
    /// Command to remove a user and release its unique claims.
    RemoveUser,
    "user.remove"
);

user_command!(AddHumanUser, "user.add_human");
user_command!(AddMachineUser, "user.add_machine");
user_command!(ChangeUsername, "user.change_username");
user_command!(ChangeProfile, "user.change_profile");
user_command!(ChangeEmail, "user.change_email");
user_command!(ChangePhone, "user.change_phone");
user_command!(ChangePassword, "user.change_password");
user_command!(LinkExternalIdp, "user.link_external_idp");
user_command!(UnlinkExternalIdp, "user.unlink_external_idp");
user_command!(AddMachineKey, "user.add_machine_key");
user_command!(RemoveMachineKey, "user.remove_machine_key");
user_command!(AddOtp, "user.add_otp");
user_command!(AddWebAuthnToken, "user.add_webauthn_token");
user_command!(RemoveWebAuthnToken, "user.remove_webauthn_token");
