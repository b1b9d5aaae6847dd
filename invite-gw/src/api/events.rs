//! Read-only event endpoints for the invitation page

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use uuid::Uuid;

use invite_common::db::{event_exists, load_event, EventId, EventRecord, PublicGuestbookEntry};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// GET /api/events/:event_id
pub async fn get_event(State(state): State<AppState>, Path(event_id): Path<Uuid>) -> ApiResult<Json<EventRecord>> {
    let event = load_event(&state.db, EventId(event_id))
        .await?
        .ok_or_else(|| ApiError::NotFound("Event".to_string()))?;
    Ok(Json(event))
}

/// GET /api/events/:event_id/guestbook
///
/// Public, verified entries, newest first. Phones are never included.
pub async fn list_guestbook(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> ApiResult<Json<Vec<PublicGuestbookEntry>>> {
    let event_id = EventId(event_id);
    if !event_exists(&state.db, event_id).await? {
        return Err(ApiError::NotFound("Event".to_string()));
    }

    let entries = state.deps.store.list_public_guestbook(event_id).await?;
    Ok(Json(entries))
}

pub fn event_routes() -> Router<AppState> {
    Router::new()
        .route("/api/events/:event_id", get(get_event))
        .route("/api/events/:event_id/guestbook", get(list_guestbook))
}
