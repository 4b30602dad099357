//! Test helpers for rolesync-server unit tests.

use std::sync::Arc;

use tempfile::TempDir;

use rolesync_core::adapter::InMemoryNodeAdapter;
use rolesync_core::{DirectorySink, SyncEngine, EVENT_CHANNEL_CAPACITY};
use rolesync_types::models::{
    AppConfig, Member, MemberId, NodeConfig, NodeId, NodeInfo, Role, RoleId, RoleMapping,
};

use crate::state::AppState;

pub const MAIN: &str = "main";
pub const SYNCED: &str = "synced";

pub struct TestApp {
    pub state: AppState,
    pub adapter: Arc<InMemoryNodeAdapter>,
    /// Holds the config file and the report directory.
    pub dir: TempDir,
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::new(
        NodeConfig::new(MAIN, vec![RoleMapping::new("vip", [5])]),
        vec![NodeConfig::new(SYNCED, vec![RoleMapping::new("vip-s", [5])])],
    );
    config.engine.batch_delay_ms = 0;
    config
}

fn node(id: &str, name: &str) -> NodeInfo {
    NodeInfo {
        id: NodeId::from(id),
        name: name.to_string(),
        owner_id: MemberId::from("owner"),
        authority_position: 50,
    }
}

pub fn member(node: &str, id: &str, roles: &[&str]) -> Member {
    Member::new(id, node, format!("user-{}", id)).with_roles(roles.iter().copied())
}

pub fn roles_of(adapter: &InMemoryNodeAdapter, node: &str, id: &str) -> Vec<RoleId> {
    adapter.member_roles(&NodeId::from(node), &MemberId::from(id)).unwrap_or_default()
}

/// Builds an `AppState` over an in-memory main node and one synced node.
///
/// The config file is written to `dir/config.json` so reloads have
/// something to read.
pub async fn test_app() -> TestApp {
    let dir = TempDir::new().expect("failed to create temp dir");
    let config = test_config();
    let config_path = dir.path().join("config.json");
    std::fs::write(&config_path, serde_json::to_string_pretty(&config).expect("serializable"))
        .expect("failed to write config");

    let adapter = Arc::new(InMemoryNodeAdapter::new());
    adapter.add_node(node(MAIN, "Main"), vec![Role::new("vip", "VIP", MAIN, 10)]);
    adapter.add_node(node(SYNCED, "Synced"), vec![Role::new("vip-s", "VIP", SYNCED, 10)]);

    let sink = Arc::new(DirectorySink::new(dir.path().join("reports")));
    let engine = Arc::new(
        SyncEngine::new(config, adapter.clone(), sink, None).expect("failed to build engine"),
    );
    let (events, _loop) = engine.spawn_propagator(EVENT_CHANNEL_CAPACITY);

    TestApp { state: AppState::new(engine, events, config_path), adapter, dir }
}
