//! Domain layer for the User context.

pub mod commands;
pub mod events;
pub mod write_model;

/// Aggregate type of every user stream.
pub const USER_AGGREGATE_TYPE: &str = "user";

/// Current schema version of the user aggregate.
pub const USER_VERSION: &str = "v1";

/// Unique constraint table for usernames.
pub const USERNAMES_TABLE: &str = "usernames";

/// Unique constraint table for `idp_config_id:external_user_id` links.
pub const EXTERNAL_IDPS_TABLE: &str = "external_idps";
