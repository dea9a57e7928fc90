//! Warden Event Store: `PostgreSQL` storage backend.
//!
//! Compiles abstract search queries through a SQL [`dialect::Dialect`] and
//! implements the push protocol with conditional inserts inside one
//! serializable transaction.

pub mod config;
pub mod dialect;
pub mod pg_event_repository;
pub mod query;
pub mod schema;
