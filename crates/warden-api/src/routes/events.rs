//! Read-only event listing for administrators.
//!
//! Query parameters map one-to-one onto `SearchQueryBuilder` calls. List
//! parameters are comma-separated.

use axum::extract::{Query, State};
use axum::{Json, Router, routing::get};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use warden_core::error::DomainError;
use warden_core::event::StoredEvent;
use warden_core::search::{Columns, SearchQuery, SearchQueryBuilder};

use crate::error::ApiError;
use crate::state::AppState;

/// Page size when `limit` is absent.
pub const DEFAULT_LIMIT: u64 = 100;

/// Largest accepted `limit`.
pub const MAX_LIMIT: u64 = 1000;

/// Query parameters shared by both endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct EventFilterParams {
    /// Aggregate types, comma-separated. Required.
    pub aggregate_type: Option<String>,
    /// Aggregate ids, comma-separated.
    pub aggregate_id: Option<String>,
    /// Event types, comma-separated.
    pub event_type: Option<String>,
    /// Owning organization.
    pub resource_owner: Option<String>,
    /// Acting user.
    pub editor_user: Option<String>,
    /// Acting service.
    pub editor_service: Option<String>,
    /// Only events with a greater sequence.
    pub sequence_greater: Option<u64>,
    /// Only events with a smaller sequence.
    pub sequence_less: Option<u64>,
    /// Maximum number of events returned.
    pub limit: Option<u64>,
    /// Newest first.
    #[serde(default)]
    pub desc: bool,
}

fn split(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

impl EventFilterParams {
    /// Builds the search query these parameters describe.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidArgument` if no aggregate type is given
    /// or `limit` is out of range.
    pub fn to_query(&self, columns: Columns) -> Result<SearchQuery, DomainError> {
        let mut builder = SearchQueryBuilder::new(columns);
        if let Some(types) = &self.aggregate_type {
            builder = builder.aggregate_types(split(types));
        }
        if let Some(ids) = &self.aggregate_id {
            builder = builder.aggregate_ids(split(ids));
        }
        if let Some(types) = &self.event_type {
            builder = builder.event_types(split(types));
        }
        if let Some(owner) = &self.resource_owner {
            builder = builder.resource_owner(owner.clone());
        }
        if let Some(user) = &self.editor_user {
            builder = builder.editor_user(user.clone());
        }
        if let Some(service) = &self.editor_service {
            builder = builder.editor_service(service.clone());
        }
        if let Some(sequence) = self.sequence_greater {
            builder = builder.sequence_greater(sequence);
        }
        if let Some(sequence) = self.sequence_less {
            builder = builder.sequence_less(sequence);
        }
        if columns == Columns::Event {
            let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
            if limit == 0 || limit > MAX_LIMIT {
                return Err(DomainError::InvalidArgument(format!(
                    "limit must be between 1 and {MAX_LIMIT}"
                )));
            }
            builder = builder.limit(limit);
            if self.desc {
                builder = builder.order_desc();
            }
        }
        builder.build()
    }
}

/// Response body of GET /latest-sequence.
#[derive(Debug, Serialize)]
pub struct LatestSequenceResponse {
    /// Highest sequence among matching events.
    pub sequence: u64,
}

/// GET /
#[instrument(skip(state))]
async fn list_events(
    State(state): State<AppState>,
    Query(params): Query<EventFilterParams>,
) -> Result<Json<Vec<StoredEvent>>, ApiError> {
    let query = params.to_query(Columns::Event)?;
    let events = state.event_repository.filter(&query).await?;
    Ok(Json(events))
}

/// GET /latest-sequence
#[instrument(skip(state))]
async fn latest_sequence(
    State(state): State<AppState>,
    Query(params): Query<EventFilterParams>,
) -> Result<Json<LatestSequenceResponse>, ApiError> {
    let query = params.to_query(Columns::MaxSequence)?;
    let sequence = state.event_repository.latest_sequence(&query).await?;
    Ok(Json(LatestSequenceResponse { sequence }))
}

/// Returns the router for the event listing.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_events))
        .route("/latest-sequence", get(latest_sequence))
}
