//! Routes for the User read model.

use axum::extract::{Path, State};
use axum::{Json, Router, routing::get};
use tracing::instrument;

use warden_user::application::query_handlers::{self, UserView};

use crate::error::ApiError;
use crate::state::AppState;

/// GET /{user_id}
#[instrument(skip(state))]
async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserView>, ApiError> {
    let view = query_handlers::get_user_by_id(&user_id, &*state.event_repository).await?;
    Ok(Json(view))
}

/// Returns the router for the User context.
pub fn router() -> Router<AppState> {
    Router::new().route("/{user_id}", get(get_user))
}
