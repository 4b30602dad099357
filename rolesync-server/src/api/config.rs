//! Configuration handlers

use axum::{extract::State, http::StatusCode, response::Json};
use serde::Serialize;

use rolesync_core::config::load_config;
use rolesync_types::models::AppConfig;

use super::engine_error;
use crate::state::AppState;

pub async fn get_config(State(state): State<AppState>) -> Json<AppConfig> {
    Json(state.engine().config().as_ref().clone())
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub reloaded: bool,
    pub warnings: Vec<String>,
}

/// Re-reads the config file and swaps mappings and access settings.
pub async fn reload_config(
    State(state): State<AppState>,
) -> Result<Json<ReloadResponse>, (StatusCode, String)> {
    let path = state.config_path().to_path_buf();
    let (config, _) = match tokio::task::spawn_blocking(move || load_config(&path)).await {
        Ok(Ok(loaded)) => loaded,
        Ok(Err(e)) => return Err((StatusCode::BAD_REQUEST, e.to_string())),
        Err(e) => {
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("spawn_blocking panicked: {e}"),
            ))
        },
    };

    let warnings = state.engine().reload(config).map_err(engine_error)?;
    Ok(Json(ReloadResponse { reloaded: true, warnings }))
}
