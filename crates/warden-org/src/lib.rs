//! Organization bounded context.
//!
//! Organizations own users and domains. Names and verified domains are
//! unique across the instance.

pub mod application;
pub mod domain;
