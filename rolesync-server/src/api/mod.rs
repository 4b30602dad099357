//! API Routes
//!
//! REST surface over the engine: status, config reload, audits, event
//! ingestion and operator role commands.

mod audit;
mod config;
mod events;
mod roles;


use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tracing::error;

use crate::state::AppState;
use rolesync_core::{EngineError, EngineStatus};

pub fn router() -> Router<AppState> {
    Router::new()
        // Status
        .route("/status", get(get_status))
        // Config
        .route("/config", get(config::get_config))
        .route("/config/reload", post(config::reload_config))
        // Reconciliation
        .route("/audit", post(audit::run_audit))
        // Events
        .route("/events", post(events::post_event))
        // Operator commands
        .route("/roles/add", post(roles::add_role))
        .route("/roles/remove", post(roles::remove_role))
        .fallback(api_not_found)
}

async fn api_not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(serde_json::json!({"error": "Not found"})))
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub version: String,
    #[serde(flatten)]
    pub engine: EngineStatus,
}

pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        engine: state.engine().status(),
    })
}

/// Maps engine errors onto HTTP status codes.
pub(crate) fn engine_error(e: EngineError) -> (StatusCode, String) {
    let status = match &e {
        EngineError::Unauthorized { .. } => StatusCode::FORBIDDEN,
        EngineError::UnknownNode(_) | EngineError::UnknownRole { .. } => StatusCode::NOT_FOUND,
        EngineError::AuditInProgress => StatusCode::CONFLICT,
        EngineError::Config(_) => StatusCode::BAD_REQUEST,
        EngineError::Node(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("[API] {}", e);
    }
    (status, e.to_string())
}
