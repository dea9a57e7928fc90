//! Commands for the Organization context.

use warden_core::command::Command;
use warden_user::domain::commands::AddHumanUser;

macro_rules! org_command {
    ($name:ident, $command_type:literal) => {
        impl Command for $name {
            fn command_type(&self) -> &'static str {
                $command_type
            }

            fn aggregate_id(&self) -> &str {
                &self.org_id
            }

            fn editor_user(&self) -> &str {
                &self.editor_user
            }
        }
    };
}

/// Command to add an organization.
#[derive(Debug, Clone)]
pub struct AddOrg {
    /// New organization identifier. Also the resource owner of the org.
    pub org_id: String,
    /// Acting user.
    pub editor_user: String,
    /// Organization name, unique across the instance.
    pub name: String,
}

/// Command to rename an organization.
#[derive(Debug, Clone)]
pub struct ChangeOrg {
    /// Target organization.
    pub org_id: String,
    /// Acting user.
    pub editor_user: String,
    /// The new name.
    pub name: String,
}

/// Command acting on one domain of an organization.
#[derive(Debug, Clone)]
pub struct OrgDomainCommand {
    /// Target organization.
    pub org_id: String,
    /// Acting user.
    pub editor_user: String,
    /// The domain name.
    pub domain: String,
}

/// Command acting on the organization lifecycle.
#[derive(Debug, Clone)]
pub struct OrgLifecycleCommand {
    /// Target organization.
    pub org_id: String,
    /// Acting user.
    pub editor_user: String,
}

/// Command to add an organization together with its first human user in
/// one atomic push. The user is owned by the new organization.
#[derive(Debug, Clone)]
pub struct SetupOrg {
    /// The organization to add.
    pub org: AddOrg,
    /// The first user; its resource owner is replaced by the org id.
    pub admin: AddHumanUser,
}

org_command!(AddOrg, "org.add");
org_command!(ChangeOrg, "org.change");
org_command!(OrgDomainCommand, "org.domain");
org_command!(OrgLifecycleCommand, "org.lifecycle");

impl Command for SetupOrg {
    fn command_type(&self) -> &'static str {
        "org.setup"
    }

    fn aggregate_id(&self) -> &str {
        &self.org.org_id
    }

    fn editor_user(&self) -> &str {
        &self.org.editor_user
    }
}
