//! Warden API: operational HTTP surface over the event store.
//!
//! Exposes the store's health check, a read-only event listing for
//! administrators, and the user and organization read models.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;

use std::sync::Arc;

use axum::Router;
use sqlx::PgPool;
use tower_http::trace::TraceLayer;
use warden_event_store::pg_event_repository::PgEventRepository;

use crate::config::Config;
use crate::state::AppState;

/// Builds the full router with request tracing.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/events", routes::events::router())
        .nest("/api/v1/users", routes::users::router())
        .nest("/api/v1/orgs", routes::orgs::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Builds the full router over a Postgres event store tuned by `config`.
pub fn app_with_pool(pool: PgPool, config: &Config) -> Router {
    let repository = PgEventRepository::with_config(pool, config.event_store.clone());
    app(AppState::new(Arc::new(repository)))
}
