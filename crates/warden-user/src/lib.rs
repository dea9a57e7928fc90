//! User bounded context.
//!
//! Human and machine users, their contact data, credentials, external
//! identity provider links, and lifecycle, all derived from the `user`
//! event stream.

pub mod application;
pub mod domain;
