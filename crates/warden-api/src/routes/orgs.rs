//! Routes for the Organization read model.

use axum::extract::{Path, State};
use axum::{Json, Router, routing::get};
use tracing::instrument;

use warden_org::application::query_handlers::{self, OrgView};
use warden_user::application::query_handlers::{UserView, list_users_by_resource_owner};

use crate::error::ApiError;
use crate::state::AppState;

/// GET /{org_id}
#[instrument(skip(state))]
async fn get_org(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
) -> Result<Json<OrgView>, ApiError> {
    let view = query_handlers::get_org_by_id(&org_id, &*state.event_repository).await?;
    Ok(Json(view))
}

/// GET /{org_id}/users
///
/// Users owned by the organization, removed users excluded.
#[instrument(skip(state))]
async fn list_org_users(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
) -> Result<Json<Vec<UserView>>, ApiError> {
    let users = list_users_by_resource_owner(&org_id, &*state.event_repository).await?;
    Ok(Json(users))
}

/// Returns the router for the Organization context.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{org_id}", get(get_org))
        .route("/{org_id}/users", get(list_org_users))
}
