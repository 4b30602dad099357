//! Audit handler

use axum::{extract::State, http::StatusCode, response::Json};
use serde::Deserialize;

use rolesync_core::AuditRequest;
use rolesync_types::models::{MemberId, NodeId, ReconciliationReport, SyncMode};

use super::engine_error;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditPayload {
    pub node: NodeId,
    pub requester: MemberId,
    #[serde(default = "default_mode")]
    pub mode: SyncMode,
}

fn default_mode() -> SyncMode {
    SyncMode::Analyze
}

/// Runs a full audit and answers with the finished report. The report is
/// also delivered to the configured sink.
pub async fn run_audit(
    State(state): State<AppState>,
    Json(payload): Json<AuditPayload>,
) -> Result<Json<ReconciliationReport>, (StatusCode, String)> {
    let request =
        AuditRequest { node: payload.node, requester: payload.requester, mode: payload.mode };
    state.engine().audit(&request).await.map(Json).map_err(engine_error)
}
