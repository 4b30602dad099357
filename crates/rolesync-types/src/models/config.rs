//! Application configuration.
//!
//! Loaded once at startup from a JSON file, validated, and passed by
//! reference into every engine component. Keys are camelCase to match the
//! files operators already have.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

use super::ids::{NodeId, RoleId, SyncId};
use crate::error::ConfigError;

/// Which way role changes flow between the main node and synced nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    /// Main node is authoritative; synced nodes follow it.
    #[serde(alias = "main-to-many")]
    Regular,
    /// Synced nodes are authoritative; the main node follows them.
    #[serde(alias = "many-to-main")]
    Reverse,
    #[default]
    Bidirectional,
}

impl SyncDirection {
    pub fn propagates_from_main(self) -> bool {
        matches!(self, Self::Regular | Self::Bidirectional)
    }

    pub fn propagates_from_synced(self) -> bool {
        matches!(self, Self::Reverse | Self::Bidirectional)
    }
}

/// Sync ID binding for one role.
///
/// Synced-node roles may list several ids in `syncIds`; `syncId` is the
/// single-id shorthand. Both forms are merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleMapping {
    pub id: RoleId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_id: Option<SyncId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sync_ids: Vec<SyncId>,
}

impl RoleMapping {
    pub fn new(id: impl Into<RoleId>, sync_ids: impl IntoIterator<Item = u32>) -> Self {
        Self {
            id: id.into(),
            sync_id: None,
            sync_ids: sync_ids.into_iter().map(SyncId).collect(),
        }
    }

    /// Union of `syncId` and `syncIds`.
    pub fn all_sync_ids(&self) -> BTreeSet<SyncId> {
        self.sync_id.into_iter().chain(self.sync_ids.iter().copied()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
    pub id: NodeId,
    #[serde(default)]
    pub roles: Vec<RoleMapping>,
}

impl NodeConfig {
    pub fn new(id: impl Into<NodeId>, roles: Vec<RoleMapping>) -> Self {
        Self { id: id.into(), roles }
    }
}

/// Tuning knobs for the engine. Defaults match the remote's published limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Role catalog TTL in milliseconds
    #[validate(range(min = 1_u64))]
    pub cache_ttl_ms: u64,
    /// Retries after a throttled mutation
    #[validate(range(max = 10_u32))]
    pub max_retries: u32,
    /// First backoff step in milliseconds, doubled per retry
    #[validate(range(min = 1_u64, max = 60_000_u64))]
    pub initial_retry_delay_ms: u64,
    /// Members per batch during an audit
    #[validate(range(min = 1_usize, max = 1000_usize))]
    pub batch_size: usize,
    /// Pause between batches in milliseconds
    pub batch_delay_ms: u64,
    /// How long an intentional write suppresses its echo, in milliseconds
    #[validate(range(min = 1_u64))]
    pub echo_window_ms: u64,
    /// Emit progress after this many batches
    #[validate(range(min = 1_usize))]
    pub progress_every_batches: usize,
    /// Progress is only reported for member sets larger than this
    pub progress_member_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: 60_000,
            max_retries: 3,
            initial_retry_delay_ms: 1000,
            batch_size: 20,
            batch_delay_ms: 1000,
            echo_window_ms: 2000,
            progress_every_batches: 5,
            progress_member_threshold: 100,
        }
    }
}

impl EngineConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn initial_retry_delay(&self) -> Duration {
        Duration::from_millis(self.initial_retry_delay_ms)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn echo_window(&self) -> Duration {
        Duration::from_millis(self.echo_window_ms)
    }
}

/// Who may run audits and operator commands besides the node owner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessConfig {
    #[serde(default)]
    pub allowed_role_id: Option<RoleId>,
    #[serde(default)]
    pub allowed_role_name: Option<String>,
}

/// Remote REST API settings. The token is supplied at runtime, never here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiConfig {
    #[validate(url)]
    pub base_url: String,
    #[validate(range(min = 1_u64, max = 300_u64))]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { base_url: "https://discord.com/api/v10".to_string(), timeout_secs: 30 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportConfig {
    /// Directory receiving `<node>_results.json` / `<node>_errors.txt`
    pub output_dir: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self { output_dir: PathBuf::from("reports") }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub main_node: NodeConfig,
    #[serde(default)]
    pub synced_nodes: Vec<NodeConfig>,
    #[serde(default)]
    pub direction: SyncDirection,
    #[serde(default)]
    #[validate(nested)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub access: AccessConfig,
    #[serde(default)]
    #[validate(nested)]
    pub api: ApiConfig,
    #[serde(default)]
    pub reports: ReportConfig,
}

impl AppConfig {
    pub fn new(main_node: NodeConfig, synced_nodes: Vec<NodeConfig>) -> Self {
        Self {
            main_node,
            synced_nodes,
            direction: SyncDirection::default(),
            engine: EngineConfig::default(),
            access: AccessConfig::default(),
            api: ApiConfig::default(),
            reports: ReportConfig::default(),
        }
    }

    /// Runs range validation and the structural checks the registry relies
    /// on. Returns non-fatal warnings on success.
    pub fn check(&self) -> Result<Vec<String>, ConfigError> {
        self.validate().map_err(|e| ConfigError::validation("config", e.to_string()))?;

        if self.main_node.id.is_empty() {
            return Err(ConfigError::validation("mainNode.id", "must not be empty"));
        }

        let mut seen_nodes = HashSet::from([self.main_node.id.clone()]);
        for (idx, node) in self.synced_nodes.iter().enumerate() {
            if node.id.is_empty() {
                return Err(ConfigError::validation(
                    format!("syncedNodes[{}].id", idx),
                    "must not be empty",
                ));
            }
            if !seen_nodes.insert(node.id.clone()) {
                return Err(ConfigError::validation(
                    format!("syncedNodes[{}].id", idx),
                    format!("node {} is listed more than once", node.id),
                ));
            }
        }

        for node in std::iter::once(&self.main_node).chain(&self.synced_nodes) {
            let mut seen_roles = HashSet::new();
            for mapping in &node.roles {
                if !seen_roles.insert(&mapping.id) {
                    return Err(ConfigError::validation(
                        format!("node {} roles", node.id),
                        format!("role {} is mapped twice", mapping.id),
                    ));
                }
            }
        }

        let mut main_sync_ids = HashSet::new();
        for mapping in &self.main_node.roles {
            let ids = mapping.all_sync_ids();
            if ids.len() > 1 {
                return Err(ConfigError::validation(
                    format!("mainNode.roles[{}]", mapping.id),
                    "main node roles carry at most one Sync ID",
                ));
            }
            for id in ids {
                if !main_sync_ids.insert(id) {
                    return Err(ConfigError::validation(
                        "mainNode.roles",
                        format!("Sync ID {} is bound to more than one main node role", id),
                    ));
                }
            }
        }

        let mut warnings = Vec::new();
        if self.synced_nodes.is_empty() {
            warnings.push("no synced nodes configured, nothing will be propagated".to_string());
        }
        if self.access.allowed_role_id.is_none() && self.access.allowed_role_name.is_none() {
            warnings.push(
                "allowedRoleId and allowedRoleName not set, only node owners can run commands"
                    .to_string(),
            );
        }
        for node in &self.synced_nodes {
            for mapping in &node.roles {
                for id in mapping.all_sync_ids() {
                    if !main_sync_ids.contains(&id) {
                        warnings.push(format!(
                            "role {} on node {} uses Sync ID {} which no main node role carries",
                            mapping.id, node.id, id
                        ));
                    }
                }
            }
        }

        Ok(warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig::new(
            NodeConfig::new("main", vec![RoleMapping::new("vip", [5])]),
            vec![NodeConfig::new("a", vec![RoleMapping::new("vip-a", [5, 6])])],
        )
    }

    #[test]
    fn test_parse_camel_case_file() {
        let json = r#"{
            "mainNode": { "id": "100", "roles": [{ "id": "1", "syncId": 5 }] },
            "syncedNodes": [
                { "id": "200", "roles": [{ "id": "2", "syncIds": [5, 7] }, { "id": "3", "syncId": 9 }] }
            ],
            "direction": "main-to-many",
            "engine": { "batchSize": 50 }
        }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.direction, SyncDirection::Regular);
        assert_eq!(config.engine.batch_size, 50);
        assert_eq!(config.engine.cache_ttl_ms, 60_000);
        let ids = config.synced_nodes[0].roles[0].all_sync_ids();
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec![SyncId(5), SyncId(7)]);
    }

    #[test]
    fn test_check_accepts_valid_config_with_warnings() {
        let warnings = base_config().check().unwrap();
        assert!(warnings.iter().any(|w| w.contains("only node owners")));
        assert!(warnings.iter().any(|w| w.contains("Sync ID 6")));
    }

    #[test]
    fn test_check_rejects_multiple_sync_ids_on_main_role() {
        let mut config = base_config();
        config.main_node.roles = vec![RoleMapping::new("vip", [5, 6])];
        let err = config.check().unwrap_err();
        assert!(err.to_string().contains("at most one Sync ID"));
    }

    #[test]
    fn test_check_rejects_shared_sync_id_on_main() {
        let mut config = base_config();
        config.main_node.roles.push(RoleMapping::new("vip-2", [5]));
        assert!(config.check().is_err());
    }

    #[test]
    fn test_check_rejects_duplicate_nodes() {
        let mut config = base_config();
        config.synced_nodes.push(NodeConfig::new("main", vec![]));
        assert!(config.check().is_err());
    }

    #[test]
    fn test_check_rejects_zero_batch_size() {
        let mut config = base_config();
        config.engine.batch_size = 0;
        let err = config.check().unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }
}
