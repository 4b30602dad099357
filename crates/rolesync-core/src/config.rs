//! Loading `AppConfig` from a JSON file.

use std::path::Path;
use tracing::warn;

use rolesync_types::error::ConfigError;
use rolesync_types::models::AppConfig;

pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Parses and checks the config at `path`.
///
/// Returns the config together with non-fatal warnings (no synced nodes,
/// no access settings, Sync IDs unknown to the main node).
pub fn load_config(path: &Path) -> Result<(AppConfig, Vec<String>), ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound { path: path.display().to_string() });
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ParseError { message: format!("{}: {}", path.display(), e) })?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<(AppConfig, Vec<String>), ConfigError> {
    let config: AppConfig =
        serde_json::from_str(content).map_err(|e| ConfigError::from_json_error(&e))?;
    let warnings = config.check()?;
    for warning in &warnings {
        warn!("[Config] {}", warning);
    }
    Ok((config, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rolesync_types::models::SyncDirection;
    use std::io::Write;

    const VALID: &str = r#"{
        "mainNode": { "id": "main", "roles": [{ "id": "vip", "syncId": 5 }] },
        "syncedNodes": [{ "id": "a", "roles": [{ "id": "vip-a", "syncIds": [5] }] }],
        "direction": "main-to-many",
        "access": { "allowedRoleName": "Admin" },
        "engine": { "batchSize": 50 }
    }"#;

    #[test]
    fn test_load_valid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(VALID.as_bytes()).unwrap();

        let (config, warnings) = load_config(file.path()).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(config.direction, SyncDirection::Regular);
        assert_eq!(config.engine.batch_size, 50);
        assert_eq!(config.engine.max_retries, 3);
        assert_eq!(config.synced_nodes[0].roles[0].all_sync_ids().len(), 1);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config(&dir.path().join(DEFAULT_CONFIG_FILE));
        assert!(matches!(result, Err(ConfigError::NotFound { .. })));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(parse_config("{ not json"), Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn test_structural_error_rejected() {
        let content = r#"{
            "mainNode": { "id": "main", "roles": [] },
            "syncedNodes": [{ "id": "main", "roles": [] }]
        }"#;
        assert!(matches!(parse_config(content), Err(ConfigError::ValidationError { .. })));
    }

    #[test]
    fn test_missing_access_is_a_warning() {
        let content = r#"{
            "mainNode": { "id": "main", "roles": [] },
            "syncedNodes": [{ "id": "a", "roles": [] }]
        }"#;
        let (_, warnings) = parse_config(content).unwrap();
        assert_eq!(warnings.len(), 1);
    }
}
