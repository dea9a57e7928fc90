//! Shared application state.

use std::sync::Arc;

use warden_core::repository::EventRepository;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The event store every handler reads through.
    pub event_repository: Arc<dyn EventRepository>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(event_repository: Arc<dyn EventRepository>) -> Self {
        Self { event_repository }
    }
}
