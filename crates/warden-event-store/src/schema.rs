//! Event store database schema.
//!
//! The DDL lives in `migrations/`; these constants name what the SQL in this
//! crate refers to.

/// Table holding every event.
pub const EVENTS_TABLE: &str = "eventstore.events";

/// Table holding claimed unique constraints.
pub const UNIQUE_CONSTRAINTS_TABLE: &str = "eventstore.unique_constraints";

/// Primary key of [`EVENTS_TABLE`], `(aggregate_type, aggregate_id, event_sequence)`.
/// A violation means a concurrent push took the same sequence.
pub const EVENTS_PRIMARY_KEY: &str = "events_pkey";

/// Primary key of [`UNIQUE_CONSTRAINTS_TABLE`], `(unique_type, unique_field)`.
pub const UNIQUE_CONSTRAINTS_PRIMARY_KEY: &str = "unique_constraints_pkey";

/// Columns selected for a full event row, in decode order.
pub const EVENT_COLUMNS: &str = "id, creation_date, event_type, event_sequence, previous_sequence, \
     event_data, editor_service, editor_user, resource_owner, aggregate_type, aggregate_id, \
     aggregate_version";
