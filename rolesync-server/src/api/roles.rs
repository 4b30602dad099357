//! Operator role commands

use axum::{extract::State, http::StatusCode, response::Json};
use serde::Deserialize;

use rolesync_core::CommandOutcome;
use rolesync_types::models::{MemberId, NodeId, RoleId};

use super::engine_error;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleCommandPayload {
    pub requester: MemberId,
    pub member: MemberId,
    pub role: RoleId,
    /// Node the role belongs to.
    pub node: NodeId,
}

pub async fn add_role(
    State(state): State<AppState>,
    Json(p): Json<RoleCommandPayload>,
) -> Result<Json<CommandOutcome>, (StatusCode, String)> {
    state
        .engine()
        .add_role_everywhere(&p.requester, &p.member, &p.role, &p.node)
        .await
        .map(Json)
        .map_err(engine_error)
}

pub async fn remove_role(
    State(state): State<AppState>,
    Json(p): Json<RoleCommandPayload>,
) -> Result<Json<CommandOutcome>, (StatusCode, String)> {
    state
        .engine()
        .remove_role_everywhere(&p.requester, &p.member, &p.role, &p.node)
        .await
        .map(Json)
        .map_err(engine_error)
}
