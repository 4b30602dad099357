//! Shared fixture for engine tests: one main node and two synced nodes.

use std::sync::Arc;
use std::time::Duration;

use crate::adapter::InMemoryNodeAdapter;
use crate::cache::RoleCatalogCache;
use crate::echo_guard::EchoGuard;
use crate::executor::RateLimitedExecutor;
use crate::policy::ForceSync;
use crate::propagator::Propagator;
use crate::registry::{RegistryHandle, SyncRegistry};
use rolesync_types::models::{
    AppConfig, Member, MemberId, NodeConfig, NodeId, NodeInfo, Role, RoleId, RoleMapping,
};

pub(crate) const MAIN: &str = "main";
pub(crate) const NODE_A: &str = "a";
pub(crate) const NODE_B: &str = "b";

pub(crate) fn config() -> AppConfig {
    AppConfig::new(
        NodeConfig::new(MAIN, vec![RoleMapping::new("vip", [5]), RoleMapping::new("mod", [7])]),
        vec![
            NodeConfig::new(
                NODE_A,
                vec![RoleMapping::new("vip-a", [5]), RoleMapping::new("mod-a", [7])],
            ),
            NodeConfig::new(NODE_B, vec![RoleMapping::new("vip-b", [5])]),
        ],
    )
}

fn info(id: &str, name: &str) -> NodeInfo {
    NodeInfo {
        id: NodeId::from(id),
        name: name.to_string(),
        owner_id: MemberId::from("owner"),
        authority_position: 50,
    }
}

pub(crate) fn adapter() -> Arc<InMemoryNodeAdapter> {
    let adapter = Arc::new(InMemoryNodeAdapter::new());
    adapter.add_node(
        info(MAIN, "Main"),
        vec![
            Role::new("vip", "VIP", MAIN, 10),
            Role::new("mod", "Moderator", MAIN, 20),
            Role::new("art", "Artist", MAIN, 5),
            Role::new("boost", "Booster", MAIN, 3).protected(),
        ],
    );
    adapter.add_node(
        info(NODE_A, "Alpha"),
        vec![
            Role::new("vip-a", "VIP-A", NODE_A, 10),
            Role::new("mod-a", "Mods", NODE_A, 30),
            Role::new("art-a", "Artist", NODE_A, 4),
            Role::new("local", "Local", NODE_A, 2),
        ],
    );
    adapter.add_node(info(NODE_B, "Beta"), vec![Role::new("vip-b", "VIP-B", NODE_B, 3)]);
    adapter
}

pub(crate) fn member(node: &str, id: &str, roles: &[&str]) -> Member {
    Member::new(id, node, format!("user-{}", id)).with_roles(roles.iter().copied())
}

pub(crate) fn roles_of(adapter: &InMemoryNodeAdapter, node: &str, id: &str) -> Vec<RoleId> {
    let mut roles =
        adapter.member_roles(&NodeId::from(node), &MemberId::from(id)).unwrap_or_default();
    roles.sort();
    roles
}

pub(crate) struct Fixture {
    pub adapter: Arc<InMemoryNodeAdapter>,
    pub registry: Arc<RegistryHandle>,
    pub cache: Arc<RoleCatalogCache>,
    pub guard: Arc<EchoGuard>,
    pub force: ForceSync,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(&config())
    }

    pub fn with_config(config: &AppConfig) -> Self {
        let adapter = adapter();
        let registry = Arc::new(RegistryHandle::new(SyncRegistry::from_config(config)));
        let cache = Arc::new(RoleCatalogCache::new(adapter.clone(), Duration::from_secs(60)));
        let guard = Arc::new(EchoGuard::new(Duration::from_millis(2000)));
        let force = ForceSync::new(
            adapter.clone(),
            RateLimitedExecutor::new(3, Duration::from_millis(10)),
            guard.clone(),
        );
        Self { adapter, registry, cache, guard, force }
    }

    pub fn propagator(&self) -> Propagator {
        Propagator::new(
            self.registry.clone(),
            self.cache.clone(),
            self.adapter.clone(),
            self.guard.clone(),
            self.force.clone(),
        )
    }
}
