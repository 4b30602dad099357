//! Sync mapping registry.
//!
//! Immutable lookup between roles and Sync IDs, built wholesale from
//! [`AppConfig`]. A reload builds a new registry; nothing is ever patched in
//! place. Unmapped roles and unknown Sync IDs yield empty results.

use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use rolesync_types::models::{AppConfig, NodeId, NodeKind, Role, RoleId, SyncDirection, SyncId};

#[derive(Debug, Clone)]
pub struct SyncRegistry {
    main: NodeId,
    synced: Vec<NodeId>,
    direction: SyncDirection,
    mappings: HashMap<NodeId, HashMap<RoleId, BTreeSet<SyncId>>>,
}

impl SyncRegistry {
    /// Builds the registry from an already validated configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut mappings = HashMap::new();
        for node in std::iter::once(&config.main_node).chain(&config.synced_nodes) {
            let roles: HashMap<RoleId, BTreeSet<SyncId>> = node
                .roles
                .iter()
                .map(|m| (m.id.clone(), m.all_sync_ids()))
                .filter(|(_, ids)| !ids.is_empty())
                .collect();
            mappings.insert(node.id.clone(), roles);
        }

        Self {
            main: config.main_node.id.clone(),
            synced: config.synced_nodes.iter().map(|n| n.id.clone()).collect(),
            direction: config.direction,
            mappings,
        }
    }

    pub fn direction(&self) -> SyncDirection {
        self.direction
    }

    /// Whether role changes observed on `node` should be propagated.
    pub fn propagates_from(&self, node: &NodeId) -> bool {
        match self.kind_of(node) {
            Some(NodeKind::Main) => self.direction.propagates_from_main(),
            Some(NodeKind::Synced) => self.direction.propagates_from_synced(),
            None => false,
        }
    }

    /// Whether roles held on the other side flow into `node`, as they do
    /// when a member joins it.
    pub fn propagates_into(&self, node: &NodeId) -> bool {
        match self.kind_of(node) {
            Some(NodeKind::Main) => self.direction.propagates_from_synced(),
            Some(NodeKind::Synced) => self.direction.propagates_from_main(),
            None => false,
        }
    }

    pub fn main_node(&self) -> &NodeId {
        &self.main
    }

    /// Synced nodes in configuration order.
    pub fn synced_nodes(&self) -> &[NodeId] {
        &self.synced
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeId> {
        std::iter::once(&self.main).chain(self.synced.iter())
    }

    pub fn kind_of(&self, node: &NodeId) -> Option<NodeKind> {
        if node == &self.main {
            Some(NodeKind::Main)
        } else if self.synced.contains(node) {
            Some(NodeKind::Synced)
        } else {
            None
        }
    }

    /// Nodes a change on `node` is reconciled against: every synced node when
    /// `node` is main, the main node when `node` is synced.
    pub fn counterparts(&self, node: &NodeId) -> Vec<NodeId> {
        match self.kind_of(node) {
            Some(NodeKind::Main) => self.synced.clone(),
            Some(NodeKind::Synced) => vec![self.main.clone()],
            None => Vec::new(),
        }
    }

    /// Synced nodes other than `node`.
    pub fn other_synced(&self, node: &NodeId) -> Vec<NodeId> {
        self.synced.iter().filter(|n| *n != node).cloned().collect()
    }

    pub fn sync_ids_of(&self, role: &RoleId, node: &NodeId) -> BTreeSet<SyncId> {
        self.mappings.get(node).and_then(|roles| roles.get(role)).cloned().unwrap_or_default()
    }

    pub fn is_mapped(&self, role: &RoleId, node: &NodeId) -> bool {
        self.mappings.get(node).is_some_and(|roles| roles.contains_key(role))
    }

    /// The main-node role bound to `sync_id`, resolved against the main
    /// node's current catalog.
    pub fn role_for_sync_id<'a>(
        &self,
        sync_id: SyncId,
        main_catalog: &'a [Role],
    ) -> Option<&'a Role> {
        let roles = self.mappings.get(&self.main)?;
        main_catalog
            .iter()
            .find(|r| roles.get(&r.id).is_some_and(|ids| ids.contains(&sync_id)))
    }

    /// Every role of `node` whose Sync ID set contains `sync_id`, in catalog
    /// order.
    pub fn roles_for_sync_id<'a>(
        &self,
        sync_id: SyncId,
        node: &NodeId,
        catalog: &'a [Role],
    ) -> Vec<&'a Role> {
        let Some(roles) = self.mappings.get(node) else {
            return Vec::new();
        };
        catalog
            .iter()
            .filter(|r| roles.get(&r.id).is_some_and(|ids| ids.contains(&sync_id)))
            .collect()
    }

    /// Sync ID table: every group with its `(node, role)` members, for
    /// operator display.
    pub fn groups(&self) -> BTreeMap<SyncId, Vec<(NodeId, RoleId)>> {
        let mut groups: BTreeMap<SyncId, Vec<(NodeId, RoleId)>> = BTreeMap::new();
        for node in self.nodes() {
            let Some(roles) = self.mappings.get(node) else {
                continue;
            };
            let mut sorted: Vec<_> = roles.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            for (role, ids) in sorted {
                for id in ids {
                    groups.entry(*id).or_default().push((node.clone(), role.clone()));
                }
            }
        }
        groups
    }
}

/// Swappable registry snapshot shared by the engine's components.
///
/// Readers take an `Arc` and keep it for the whole operation, so a reload
/// never changes the mapping under a running audit.
#[derive(Debug)]
pub struct RegistryHandle {
    current: RwLock<Arc<SyncRegistry>>,
}

impl RegistryHandle {
    pub fn new(registry: SyncRegistry) -> Self {
        Self { current: RwLock::new(Arc::new(registry)) }
    }

    pub fn snapshot(&self) -> Arc<SyncRegistry> {
        Arc::clone(&self.current.read())
    }

    pub fn replace(&self, registry: SyncRegistry) {
        *self.current.write() = Arc::new(registry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rolesync_types::models::{NodeConfig, RoleMapping};

    fn registry() -> SyncRegistry {
        SyncRegistry::from_config(&AppConfig::new(
            NodeConfig::new("main", vec![RoleMapping::new("vip", [5]), RoleMapping::new("mod", [7])]),
            vec![
                NodeConfig::new(
                    "a",
                    vec![
                        RoleMapping::new("vip-a", [5]),
                        RoleMapping::new("gold-a", [5, 7]),
                        RoleMapping::new("mod-a", [7]),
                    ],
                ),
                NodeConfig::new("b", vec![]),
            ],
        ))
    }

    fn catalog_a() -> Vec<Role> {
        vec![
            Role::new("vip-a", "VIP-A", "a", 3),
            Role::new("gold-a", "Gold", "a", 2),
            Role::new("mod-a", "Mod", "a", 4),
            Role::new("local", "Local", "a", 1),
        ]
    }

    #[test]
    fn test_roles_for_sync_id_returns_exactly_matching_roles() {
        let registry = registry();
        let catalog = catalog_a();
        let ids: Vec<&str> = registry
            .roles_for_sync_id(SyncId(5), &NodeId::from("a"), &catalog)
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(ids, vec!["vip-a", "gold-a"]);
    }

    #[test]
    fn test_unmapped_lookups_are_empty() {
        let registry = registry();
        assert!(registry.sync_ids_of(&RoleId::from("local"), &NodeId::from("a")).is_empty());
        assert!(registry.roles_for_sync_id(SyncId(99), &NodeId::from("a"), &catalog_a()).is_empty());
        assert!(registry.roles_for_sync_id(SyncId(5), &NodeId::from("zzz"), &catalog_a()).is_empty());
    }

    #[test]
    fn test_role_for_sync_id_on_main() {
        let registry = registry();
        let main = vec![Role::new("vip", "VIP", "main", 5), Role::new("mod", "Mod", "main", 6)];
        assert_eq!(registry.role_for_sync_id(SyncId(7), &main).map(|r| r.name.as_str()), Some("Mod"));
        assert!(registry.role_for_sync_id(SyncId(8), &main).is_none());
    }

    #[test]
    fn test_topology() {
        let registry = registry();
        assert_eq!(registry.kind_of(&NodeId::from("main")), Some(NodeKind::Main));
        assert_eq!(registry.kind_of(&NodeId::from("b")), Some(NodeKind::Synced));
        assert_eq!(registry.kind_of(&NodeId::from("x")), None);
        assert_eq!(registry.counterparts(&NodeId::from("a")), vec![NodeId::from("main")]);
        assert_eq!(registry.other_synced(&NodeId::from("a")), vec![NodeId::from("b")]);
        assert_eq!(registry.groups()[&SyncId(5)].len(), 3);
    }

    #[test]
    fn test_direction_gates_propagation() {
        let mut config = AppConfig::new(NodeConfig::new("main", vec![]), vec![NodeConfig::new("a", vec![])]);
        config.direction = SyncDirection::Regular;
        let registry = SyncRegistry::from_config(&config);
        assert!(registry.propagates_from(&NodeId::from("main")));
        assert!(!registry.propagates_from(&NodeId::from("a")));
        assert!(!registry.propagates_from(&NodeId::from("x")));

        // Joins pull from the other side
        assert!(registry.propagates_into(&NodeId::from("a")));
        assert!(!registry.propagates_into(&NodeId::from("main")));
    }

    #[test]
    fn test_handle_snapshot_survives_replace() {
        let handle = RegistryHandle::new(registry());
        let before = handle.snapshot();
        handle.replace(SyncRegistry::from_config(&AppConfig::new(
            NodeConfig::new("other", vec![]),
            vec![],
        )));
        assert_eq!(before.main_node(), &NodeId::from("main"));
        assert_eq!(handle.snapshot().main_node(), &NodeId::from("other"));
    }
}
