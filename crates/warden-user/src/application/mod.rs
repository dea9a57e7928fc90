//! Application layer for the User context.

pub mod command_handlers;
pub mod query_handlers;
