//! Route modules.

pub mod events;
pub mod health;
pub mod orgs;
pub mod users;
