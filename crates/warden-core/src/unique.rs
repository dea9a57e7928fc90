//! Unique constraints: global invariants outside any single aggregate stream.
//!
//! A constraint is written or deleted in the same transaction as the events
//! that establish or release it. It never exists on its own.

use serde::{Deserialize, Serialize};

/// What a push does with a constraint row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UniqueConstraintAction {
    /// Insert the row; fails the push if it already exists.
    Add,
    /// Delete the row if present.
    Remove,
}

/// An intent to claim or release `(unique_type, unique_field)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueConstraint {
    /// Logical table, e.g. `usernames`.
    pub unique_type: String,
    /// The value that must be unique within `unique_type`.
    pub unique_field: String,
    /// Add or remove.
    pub action: UniqueConstraintAction,
    /// Error key reported when an add collides. Empty for removes.
    pub error_key: String,
}

impl UniqueConstraint {
    /// Claims `field` in `table`; a collision fails the push with
    /// `AlreadyExists(error_key)`.
    pub fn add(
        table: impl Into<String>,
        field: impl Into<String>,
        error_key: impl Into<String>,
    ) -> Self {
        Self {
            unique_type: table.into(),
            unique_field: field.into(),
            action: UniqueConstraintAction::Add,
            error_key: error_key.into(),
        }
    }

    /// Releases `field` in `table`.
    pub fn remove(table: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            unique_type: table.into(),
            unique_field: field.into(),
            action: UniqueConstraintAction::Remove,
            error_key: String::new(),
        }
    }
}

/// A batch of constraints split by action.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct UniqueConstraintActions<'a> {
    /// Constraints to insert.
    pub adds: Vec<&'a UniqueConstraint>,
    /// Constraints to delete.
    pub removes: Vec<&'a UniqueConstraint>,
}

impl UniqueConstraintActions<'_> {
    /// Returns `true` if at least one constraint must be inserted.
    #[must_use]
    pub fn has_adds(&self) -> bool {
        !self.adds.is_empty()
    }

    /// Returns `true` if at least one constraint must be deleted.
    #[must_use]
    pub fn has_removes(&self) -> bool {
        !self.removes.is_empty()
    }
}

/// Partitions a batch into adds and removes, preserving input order.
#[must_use]
pub fn check_unique_constraint_actions(
    constraints: &[UniqueConstraint],
) -> UniqueConstraintActions<'_> {
    let (adds, removes): (Vec<_>, Vec<_>) = constraints
        .iter()
        .partition(|c| c.action == UniqueConstraintAction::Add);
    UniqueConstraintActions { adds, removes }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partitions_adds_and_removes() {
        let constraints = vec![
            UniqueConstraint::add("usernames", "gigi", "Errors.User.AlreadyExists"),
            UniqueConstraint::remove("usernames", "gigi-old"),
            UniqueConstraint::add("org_domains", "acme.ch", "Errors.Org.Domain.AlreadyExists"),
        ];

        let actions = check_unique_constraint_actions(&constraints);

        assert!(actions.has_adds());
        assert!(actions.has_removes());
        assert_eq!(actions.adds.len(), 2);
        assert_eq!(actions.adds[0].unique_field, "gigi");
        assert_eq!(actions.adds[1].unique_type, "org_domains");
        assert_eq!(actions.removes.len(), 1);
        assert_eq!(actions.removes[0].unique_field, "gigi-old");
    }

    #[test]
    fn test_empty_batch_has_nothing_to_do() {
        let actions = check_unique_constraint_actions(&[]);

        assert!(!actions.has_adds());
        assert!(!actions.has_removes());
    }

    #[test]
    fn test_remove_carries_no_error_key() {
        let constraint = UniqueConstraint::remove("usernames", "gigi");

        assert_eq!(constraint.action, UniqueConstraintAction::Remove);
        assert!(constraint.error_key.is_empty());
    }
}
