//! Warden Core: event model and replay abstractions.
//!
//! This crate defines the event and aggregate model, unique constraints,
//! abstract search queries, the storage contract, the event registry, and
//! write/read model replay. It contains no infrastructure code.

pub mod aggregate;
pub mod clock;
pub mod command;
pub mod error;
pub mod event;
pub mod model;
pub mod registry;
pub mod repository;
pub mod search;
pub mod unique;
