//! Domain layer for the Organization context.

pub mod commands;
pub mod events;
pub mod write_model;

/// Aggregate type of every org stream.
pub const ORG_AGGREGATE_TYPE: &str = "org";

/// Current schema version of the org aggregate.
pub const ORG_VERSION: &str = "v1";

/// Unique constraint table for organization names.
pub const ORG_NAMES_TABLE: &str = "org_names";

/// Unique constraint table for verified domains.
pub const ORG_DOMAINS_TABLE: &str = "org_domains";
