//! Role difference computation.
//!
//! [`compute`] is pure: given the roles a member holds on a source and a
//! target node plus both catalogs, it returns what the target needs to match
//! the source. [`Reconciler`] gathers those inputs through the cache and the
//! adapter and applies the cross-node "still granted elsewhere" rule.
//!
//! A source role with a Sync ID matches target roles sharing that Sync ID and
//! nothing else. A source role without one matches target roles by exact
//! name.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::adapter::{find_member, NodeAdapter};
use crate::cache::{NodeCatalog, RoleCatalogCache};
use crate::error::EngineResult;
use crate::registry::SyncRegistry;
use rolesync_types::models::{
    Member, MemberId, NodeId, NodeKind, ReportError, Role, RoleId, UnresolvedRole,
};

/// Additions and removals that bring a target node in line with a source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleDiff {
    pub to_add: Vec<Role>,
    pub to_remove: Vec<Role>,
    /// Mapped source roles with no counterpart in the target catalog.
    pub unresolved: Vec<UnresolvedRole>,
}

impl RoleDiff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    pub fn add_names(&self) -> Vec<String> {
        self.to_add.iter().map(|r| r.name.clone()).collect()
    }

    pub fn remove_names(&self) -> Vec<String> {
        self.to_remove.iter().map(|r| r.name.clone()).collect()
    }

    /// Keeps only entries equivalent to at least one of `roles`.
    pub fn restricted_to(mut self, registry: &SyncRegistry, roles: &[Role]) -> Self {
        let keep = |candidate: &Role| roles.iter().any(|r| equivalent(registry, r, candidate));
        self.to_add.retain(|r| keep(r));
        self.to_remove.retain(|r| keep(r));
        self.unresolved.retain(|u| roles.iter().any(|r| r.id == u.role_id));
        self
    }

    /// Drops removals, for flows that only ever grant.
    pub fn additions_only(mut self) -> Self {
        self.to_remove.clear();
        self
    }
}

/// Whether `target` is a counterpart of `source`. The source side decides
/// the rule: Sync IDs when it is mapped, its name otherwise.
pub fn equivalent(registry: &SyncRegistry, source: &Role, target: &Role) -> bool {
    if !registry.is_mapped(&source.id, &source.node) {
        return source.name == target.name;
    }
    let source_ids = registry.sync_ids_of(&source.id, &source.node);
    !source_ids.is_disjoint(&registry.sync_ids_of(&target.id, &target.node))
}

fn held<'a>(catalog: &'a NodeCatalog, roles: &[RoleId]) -> Vec<&'a Role> {
    catalog.roles.iter().filter(|r| !r.protected && roles.contains(&r.id)).collect()
}

/// Computes the diff for one member between two nodes.
///
/// Only tracked target roles (those with an equivalent in the source
/// catalog) are removal candidates. Protected roles and target roles ranked
/// above the target authority never appear.
pub fn compute(
    registry: &SyncRegistry,
    source: &NodeCatalog,
    source_roles: &[RoleId],
    target: &NodeCatalog,
    target_roles: &[RoleId],
) -> RoleDiff {
    let authority = target.info.authority_position;
    let source_held = held(source, source_roles);
    let target_held = held(target, target_roles);
    let mut diff = RoleDiff::default();

    for t in &target_held {
        if t.outranks(authority) {
            continue;
        }
        let tracked = source.roles.iter().any(|s| !s.protected && equivalent(registry, s, t));
        let still_held = source_held.iter().any(|s| equivalent(registry, s, t));
        if tracked && !still_held {
            diff.to_remove.push((*t).clone());
        }
    }

    for s in &source_held {
        if target_held.iter().any(|t| equivalent(registry, s, t)) {
            continue;
        }
        let candidates: Vec<&Role> =
            target.roles.iter().filter(|t| !t.protected && equivalent(registry, s, t)).collect();
        if candidates.is_empty() {
            let sync_ids = registry.sync_ids_of(&s.id, &s.node);
            if !sync_ids.is_empty() {
                diff.unresolved.push(UnresolvedRole {
                    role_id: s.id.clone(),
                    role: s.name.clone(),
                    sync_ids: sync_ids.into_iter().collect(),
                });
            }
            continue;
        }
        for candidate in candidates {
            if candidate.outranks(authority) {
                debug!(
                    "[Diff] {} outranks authority in {}, not adding",
                    candidate.name, target.info.name
                );
                continue;
            }
            if !diff.to_add.iter().any(|r| r.id == candidate.id) {
                diff.to_add.push(candidate.clone());
            }
        }
    }

    diff
}

/// Result of diffing one member against one target node.
#[derive(Debug, Clone)]
pub enum TargetDiff {
    /// Member is not present on the target.
    Absent,
    /// Target copy of the member cannot be touched.
    Skipped(ReportError),
    Ready { target: Arc<NodeCatalog>, member: Member, diff: RoleDiff },
}

/// Fetches what [`compute`] needs and post-filters reverse-direction
/// removals.
#[derive(Clone)]
pub struct Reconciler {
    registry: Arc<SyncRegistry>,
    cache: Arc<RoleCatalogCache>,
    adapter: Arc<dyn NodeAdapter>,
}

impl Reconciler {
    pub fn new(
        registry: Arc<SyncRegistry>,
        cache: Arc<RoleCatalogCache>,
        adapter: Arc<dyn NodeAdapter>,
    ) -> Self {
        Self { registry, cache, adapter }
    }

    pub fn registry(&self) -> &SyncRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &RoleCatalogCache {
        &self.cache
    }

    pub fn adapter(&self) -> &dyn NodeAdapter {
        self.adapter.as_ref()
    }

    /// Diffs `source_roles` (held on `source_node`) against the live member on
    /// `target_node`.
    pub async fn diff(
        &self,
        member: &MemberId,
        source_node: &NodeId,
        source_roles: &[RoleId],
        target_node: &NodeId,
    ) -> EngineResult<TargetDiff> {
        let source = self.cache.catalog(source_node).await?;
        let target = self.cache.catalog(target_node).await?;

        let Some(target_member) = find_member(self.adapter.as_ref(), target_node, member).await?
        else {
            debug!("[Diff] {} does not exist in {}", member, target.info.name);
            return Ok(TargetDiff::Absent);
        };
        if target_member.is_system {
            return Ok(TargetDiff::Skipped(ReportError::IsSystemAccount {
                member: member.clone(),
                display_name: target_member.display_name,
                node: target_node.clone(),
            }));
        }
        if !target.is_manageable(&target_member) {
            return Ok(TargetDiff::Skipped(ReportError::NotManageable {
                member: member.clone(),
                display_name: target_member.display_name,
                node: target_node.clone(),
            }));
        }

        let mut diff =
            compute(&self.registry, &source, source_roles, &target, &target_member.roles);

        let reverse = self.registry.kind_of(target_node) == Some(NodeKind::Main)
            && self.registry.kind_of(source_node) == Some(NodeKind::Synced);
        if reverse && !diff.to_remove.is_empty() {
            let mut kept = Vec::with_capacity(diff.to_remove.len());
            for role in diff.to_remove {
                if self.still_granted_elsewhere(member, &role, source_node).await {
                    debug!(
                        "[Diff] Keeping {} on {}: still granted by another synced node",
                        role.name, target.info.name
                    );
                } else {
                    kept.push(role);
                }
            }
            diff.to_remove = kept;
        }

        Ok(TargetDiff::Ready { target, member: target_member, diff })
    }

    /// Whether a synced node other than `exclude` still grants `member` a
    /// counterpart of the main-node role `main_role`, matched the way
    /// `main_role` itself is: by Sync ID when mapped, by name otherwise.
    ///
    /// Queried live on every call. Lookup failures count as granted so a
    /// flaky node never causes a removal.
    pub async fn still_granted_elsewhere(
        &self,
        member: &MemberId,
        main_role: &Role,
        exclude: &NodeId,
    ) -> bool {
        for node in self.registry.other_synced(exclude) {
            let catalog = match self.cache.catalog(&node).await {
                Ok(c) => c,
                Err(e) => {
                    warn!(
                        "[Diff] Cannot read roles of {}, assuming {} still granted: {}",
                        node, main_role.name, e
                    );
                    return true;
                },
            };
            let synced_member = match find_member(self.adapter.as_ref(), &node, member).await {
                Ok(Some(m)) => m,
                Ok(None) => continue,
                Err(e) => {
                    warn!(
                        "[Diff] Cannot read {} in {}, assuming {} still granted: {}",
                        member, node, main_role.name, e
                    );
                    return true;
                },
            };
            if held(&catalog, &synced_member.roles)
                .iter()
                .any(|r| equivalent(&self.registry, main_role, r))
            {
                return true;
            }
        }
        false
    }

    /// Equivalents of `role` in `catalog`, excluding protected roles.
    pub fn equivalents_in<'a>(&self, role: &Role, catalog: &'a NodeCatalog) -> Vec<&'a Role> {
        catalog
            .roles
            .iter()
            .filter(|r| !r.protected && equivalent(&self.registry, role, r))
            .collect()
    }
}
