//! invite-gw library - guest workflow service
//!
//! Hosts the verification-gated guestbook and contribution flow behind a
//! small JSON API.

use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub mod api;
pub mod config;
pub mod error;
pub mod notify;
pub mod registry;
pub mod workflow;

use registry::{SessionRegistry, SessionSettings};
use workflow::{ModalController, WorkflowDeps};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub deps: WorkflowDeps,
    /// Open guest sessions by id
    pub sessions: SessionRegistry,
}

impl AppState {
    pub fn new(db: SqlitePool, deps: WorkflowDeps) -> Self {
        Self::with_session_settings(db, deps, SessionSettings::default())
    }

    pub fn with_session_settings(db: SqlitePool, deps: WorkflowDeps, settings: SessionSettings) -> Self {
        Self {
            db,
            deps,
            sessions: SessionRegistry::new(settings),
        }
    }

    pub async fn session(&self, id: Uuid) -> Option<Arc<ModalController>> {
        self.sessions.get(id).await
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::event_routes())
        .merge(api::session_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
