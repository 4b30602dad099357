//! Event ingestion

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;

use rolesync_types::models::MemberEvent;

use super::engine_error;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct EventQuery {
    /// Handle the event inline and answer with its outcome.
    #[serde(default)]
    pub wait: bool,
}

pub async fn post_event(
    State(state): State<AppState>,
    Query(query): Query<EventQuery>,
    Json(event): Json<MemberEvent>,
) -> Result<Response, (StatusCode, String)> {
    if query.wait {
        let outcome = state.engine().handle_event(&event).await.map_err(engine_error)?;
        return Ok(Json(outcome).into_response());
    }

    state.enqueue(event).await.map_err(|event| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("Propagation loop stopped, dropped {} for {}", event.kind(), event.member()),
        )
    })?;
    Ok((StatusCode::ACCEPTED, Json(serde_json::json!({"queued": true}))).into_response())
}
