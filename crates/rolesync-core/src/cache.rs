//! Role catalog cache with lazy TTL expiry.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::adapter::{NodeAdapter, NodeResult};
use rolesync_types::models::{Member, NodeId, NodeInfo, Role, RoleId};

/// One node's live facts plus its role catalog, fetched together.
#[derive(Debug, Clone)]
pub struct NodeCatalog {
    pub info: NodeInfo,
    /// Ordered by descending position.
    pub roles: Vec<Role>,
}

impl NodeCatalog {
    pub fn new(info: NodeInfo, mut roles: Vec<Role>) -> Self {
        roles.sort_by(|a, b| b.position.cmp(&a.position));
        Self { info, roles }
    }

    pub fn role(&self, id: &RoleId) -> Option<&Role> {
        self.roles.iter().find(|r| &r.id == id)
    }

    /// Highest position among the member's roles known to this catalog.
    pub fn highest_position(&self, member: &Member) -> i64 {
        member.roles.iter().filter_map(|id| self.role(id)).map(|r| r.position).max().unwrap_or(0)
    }

    /// Not the owner, and ranked strictly below the engine's authority role.
    pub fn is_manageable(&self, member: &Member) -> bool {
        member.id != self.info.owner_id
            && self.highest_position(member) < self.info.authority_position
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    catalog: Arc<NodeCatalog>,
    fetched_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() >= ttl
    }
}

/// Per-node role catalog cache.
///
/// Entries are refreshed on read once older than the TTL and replaced
/// wholesale. Local mutations never write through.
pub struct RoleCatalogCache {
    adapter: Arc<dyn NodeAdapter>,
    ttl: Duration,
    entries: RwLock<HashMap<NodeId, CacheEntry>>,
}

impl RoleCatalogCache {
    pub fn new(adapter: Arc<dyn NodeAdapter>, ttl: Duration) -> Self {
        Self { adapter, ttl, entries: RwLock::new(HashMap::new()) }
    }

    pub async fn catalog(&self, node: &NodeId) -> NodeResult<Arc<NodeCatalog>> {
        if let Some(entry) = self.entries.read().get(node) {
            if !entry.is_expired(self.ttl) {
                return Ok(Arc::clone(&entry.catalog));
            }
        }

        debug!("[RoleCache] Refreshing catalog of {}", node);
        let (info, roles) = self.adapter.fetch_catalog(node).await?;
        let catalog = Arc::new(NodeCatalog::new(info, roles));
        self.entries.write().insert(
            node.clone(),
            CacheEntry { catalog: Arc::clone(&catalog), fetched_at: Instant::now() },
        );
        Ok(catalog)
    }

    pub async fn roles_of(&self, node: &NodeId) -> NodeResult<Vec<Role>> {
        Ok(self.catalog(node).await?.roles.clone())
    }

    pub fn invalidate(&self, node: &NodeId) {
        self.entries.write().remove(node);
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{AdapterCall, InMemoryNodeAdapter};
    use rolesync_types::models::MemberId;

    fn adapter() -> Arc<InMemoryNodeAdapter> {
        let adapter = Arc::new(InMemoryNodeAdapter::new());
        adapter.add_node(
            NodeInfo {
                id: NodeId::from("g1"),
                name: "Main".into(),
                owner_id: MemberId::from("owner"),
                authority_position: 5,
            },
            vec![Role::new("low", "Low", "g1", 1), Role::new("high", "High", "g1", 9)],
        );
        adapter
    }

    fn role_fetches(adapter: &InMemoryNodeAdapter) -> usize {
        adapter.count_calls(|c| matches!(c, AdapterCall::FetchRoles(_)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_refreshed_only_after_ttl() {
        let adapter = adapter();
        let cache = RoleCatalogCache::new(adapter.clone(), Duration::from_secs(60));
        let node = NodeId::from("g1");

        cache.roles_of(&node).await.unwrap();
        tokio::time::advance(Duration::from_secs(59)).await;
        cache.roles_of(&node).await.unwrap();
        assert_eq!(role_fetches(&adapter), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        cache.roles_of(&node).await.unwrap();
        assert_eq!(role_fetches(&adapter), 2);
    }

    #[tokio::test]
    async fn test_roles_ordered_by_position_and_replaced_wholesale() {
        let adapter = adapter();
        let cache = RoleCatalogCache::new(adapter.clone(), Duration::from_secs(60));
        let node = NodeId::from("g1");

        let roles = cache.roles_of(&node).await.unwrap();
        assert_eq!(roles[0].name, "High");

        adapter.set_roles(&node, vec![Role::new("new", "New", "g1", 2)]);
        assert_eq!(cache.roles_of(&node).await.unwrap().len(), 2);
        cache.invalidate(&node);
        let roles = cache.roles_of(&node).await.unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].name, "New");
    }

    #[tokio::test]
    async fn test_manageability() {
        let cache = RoleCatalogCache::new(adapter(), Duration::from_secs(60));
        let catalog = cache.catalog(&NodeId::from("g1")).await.unwrap();

        assert!(catalog.is_manageable(&Member::new("u1", "g1", "a").with_roles(["low"])));
        assert!(!catalog.is_manageable(&Member::new("u2", "g1", "b").with_roles(["high"])));
        assert!(!catalog.is_manageable(&Member::new("owner", "g1", "c")));
    }
}
