//! Application layer for the Organization context.

pub mod command_handlers;
pub mod query_handlers;
