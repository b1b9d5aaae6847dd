//! Guest session endpoints
//!
//! One session per page load. Every step answers with the modal snapshot;
//! step-level problems (wrong code, empty name) come back inside
//! `step.error_message` with status 200, so the page can render them in
//! place. Malformed requests and unknown ids are HTTP errors.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use invite_common::db::{load_event, Domain, Entry, EntryContent, EventId, EventRecord};
use invite_common::PhoneNumber;

use crate::error::{ApiError, ApiResult};
use crate::workflow::{Choice, ModalController, ModalSnapshot, SessionContext, Workflow};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub event_id: Uuid,
    /// Marker the page kept from an earlier verification in this browser
    #[serde(default)]
    pub verified_phone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: Uuid,
    pub event: EventRecord,
    pub modal: ModalSnapshot,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceRequest {
    pub choice: Choice,
}

#[derive(Debug, Deserialize)]
pub struct PhoneRequest {
    pub phone: String,
    #[serde(default)]
    pub consent: bool,
}

#[derive(Debug, Deserialize)]
pub struct CodeRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ArrivalRequest {
    pub accept: bool,
}

async fn controller(state: &AppState, id: Uuid) -> ApiResult<Arc<ModalController>> {
    state
        .session(id)
        .await
        .ok_or_else(|| ApiError::NotFound("Session".to_string()))
}

/// POST /api/sessions
pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> ApiResult<(StatusCode, Json<CreateSessionResponse>)> {
    let event_id = EventId(req.event_id);
    let event = load_event(&state.db, event_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Event".to_string()))?;

    let session = match req.verified_phone.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => SessionContext::with_marker(
            PhoneNumber::parse(raw).map_err(|e| ApiError::BadRequest(e.user_message()))?,
        ),
        None => SessionContext::new(),
    };

    let workflow = Workflow::new(state.deps.clone(), Arc::new(session));
    let controller = Arc::new(ModalController::new(event_id, workflow));
    let session_id = controller.id();

    state
        .sessions
        .insert(controller.clone())
        .await
        .map_err(|e| ApiError::Unavailable(e.to_string()))?;
    let _ = controller.schedule_arrival_prompt();
    info!("Opened session {} for event {}", session_id, event_id);

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id,
            event,
            modal: controller.snapshot().await,
        }),
    ))
}

/// GET /api/sessions/:id
pub async fn get_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<ModalSnapshot>> {
    let controller = controller(&state, id).await?;
    Ok(Json(controller.snapshot().await))
}

/// POST /api/sessions/:id/choice
pub async fn choose(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ChoiceRequest>,
) -> ApiResult<Json<ModalSnapshot>> {
    let controller = controller(&state, id).await?;
    Ok(Json(controller.choose(req.choice).await?))
}

/// POST /api/sessions/:id/phone
pub async fn submit_phone(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<PhoneRequest>,
) -> ApiResult<Json<ModalSnapshot>> {
    let controller = controller(&state, id).await?;
    Ok(Json(controller.submit_phone(&req.phone, req.consent).await?))
}

/// POST /api/sessions/:id/code
pub async fn submit_code(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CodeRequest>,
) -> ApiResult<Json<ModalSnapshot>> {
    let controller = controller(&state, id).await?;
    Ok(Json(controller.submit_code(&req.code).await?))
}

/// POST /api/sessions/:id/resend
pub async fn resend_code(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<ModalSnapshot>> {
    let controller = controller(&state, id).await?;
    Ok(Json(controller.resend_code().await?))
}

/// POST /api/sessions/:id/content
pub async fn submit_content(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(content): Json<EntryContent>,
) -> ApiResult<Json<ModalSnapshot>> {
    let controller = controller(&state, id).await?;
    Ok(Json(controller.submit_content(content).await?))
}

/// POST /api/sessions/:id/close
pub async fn close(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<ModalSnapshot>> {
    let controller = controller(&state, id).await?;
    Ok(Json(controller.close().await?))
}

/// POST /api/sessions/:id/arrival
pub async fn respond_arrival(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ArrivalRequest>,
) -> ApiResult<Json<ModalSnapshot>> {
    let controller = controller(&state, id).await?;
    Ok(Json(controller.respond_arrival(req.accept).await?))
}

/// POST /api/sessions/:id/restart
pub async fn restart(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<ModalSnapshot>> {
    let controller = controller(&state, id).await?;
    Ok(Json(controller.restart().await?))
}

/// DELETE /api/sessions/:id/entries/:domain/:entry_id
pub async fn delete_entry(
    State(state): State<AppState>,
    Path((id, domain, entry_id)): Path<(Uuid, String, Uuid)>,
) -> ApiResult<StatusCode> {
    let controller = controller(&state, id).await?;
    let domain: Domain = domain
        .parse()
        .map_err(|e: invite_common::Error| ApiError::BadRequest(e.to_string()))?;

    controller.delete_entry(domain, entry_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/sessions/:id/entries/:domain/:entry_id
pub async fn update_entry(
    State(state): State<AppState>,
    Path((id, domain, entry_id)): Path<(Uuid, String, Uuid)>,
    Json(content): Json<EntryContent>,
) -> ApiResult<Json<Entry>> {
    let controller = controller(&state, id).await?;
    let domain: Domain = domain
        .parse()
        .map_err(|e: invite_common::Error| ApiError::BadRequest(e.to_string()))?;

    Ok(Json(controller.update_entry(domain, entry_id, content).await?))
}

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session))
        .route("/api/sessions/:id/choice", post(choose))
        .route("/api/sessions/:id/phone", post(submit_phone))
        .route("/api/sessions/:id/code", post(submit_code))
        .route("/api/sessions/:id/resend", post(resend_code))
        .route("/api/sessions/:id/content", post(submit_content))
        .route("/api/sessions/:id/close", post(close))
        .route("/api/sessions/:id/arrival", post(respond_arrival))
        .route("/api/sessions/:id/restart", post(restart))
        .route(
            "/api/sessions/:id/entries/:domain/:entry_id",
            put(update_entry).delete(delete_entry),
        )
}
