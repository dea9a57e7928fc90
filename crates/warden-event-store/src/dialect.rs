//! SQL dialects.
//!
//! A dialect maps abstract search fields and operations to the physical
//! names and syntax of one database engine. The query compiler only talks to
//! this trait.

use warden_core::search::{Field, Operation};

use crate::schema;

/// Physical naming and parameter syntax of a SQL engine.
///
/// `column_name` and `operation` return an empty string for anything the
/// dialect cannot express; the compiler rejects such queries.
pub trait Dialect: Send + Sync {
    /// Fully qualified events table.
    fn events_table(&self) -> &'static str;

    /// Fully qualified unique constraints table.
    fn unique_constraints_table(&self) -> &'static str;

    /// Physical column for `field`.
    fn column_name(&self, field: Field) -> &'static str;

    /// Comparator for `operation`.
    fn operation(&self, operation: Operation) -> &'static str;

    /// Condition template with `{column}` and `{operation}` slots and one `?`
    /// marker for the bound value.
    fn condition_format(&self, operation: Operation) -> &'static str;

    /// Rewrites positional `?` markers into the engine's parameter syntax.
    fn placeholder(&self, query: &str) -> String;
}

/// `PostgreSQL`: snake_case columns, `= ANY(array)` membership, `$n` parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Dialect for Postgres {
    fn events_table(&self) -> &'static str {
        schema::EVENTS_TABLE
    }

    fn unique_constraints_table(&self) -> &'static str {
        schema::UNIQUE_CONSTRAINTS_TABLE
    }

    fn column_name(&self, field: Field) -> &'static str {
        match field {
            Field::AggregateId => "aggregate_id",
            Field::AggregateType => "aggregate_type",
            Field::ResourceOwner => "resource_owner",
            Field::EditorUser => "editor_user",
            Field::EditorService => "editor_service",
            Field::EventType => "event_type",
            Field::Sequence => "event_sequence",
        }
    }

    fn operation(&self, operation: Operation) -> &'static str {
        match operation {
            Operation::Equals | Operation::In => "=",
            Operation::Greater => ">",
            Operation::Less => "<",
        }
    }

    fn condition_format(&self, operation: Operation) -> &'static str {
        match operation {
            Operation::In => "{column} {operation} ANY(?)",
            Operation::Equals | Operation::Greater | Operation::Less => "{column} {operation} ?",
        }
    }

    fn placeholder(&self, query: &str) -> String {
        let mut rewritten = String::with_capacity(query.len() + 8);
        let mut position = 0;
        for c in query.chars() {
            if c == '?' {
                position += 1;
                rewritten.push('$');
                rewritten.push_str(&position.to_string());
            } else {
                rewritten.push(c);
            }
        }
        rewritten
    }
}
