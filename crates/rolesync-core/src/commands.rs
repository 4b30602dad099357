//! Operator commands: add or remove a role for one member on every node.

use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::adapter::{find_member, NodeAdapter};
use crate::auth::Authorizer;
use crate::cache::RoleCatalogCache;
use crate::diff::Reconciler;
use crate::error::{EngineError, EngineResult};
use crate::policy::{ForceSync, Mutation, MutationKind};
use crate::registry::RegistryHandle;
use rolesync_types::models::{MemberId, NodeId, NodeKind, Role, RoleId};

/// Result for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeLine {
    pub node: NodeId,
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandOutcome {
    pub lines: Vec<NodeLine>,
}

impl CommandOutcome {
    fn push(&mut self, node: &NodeId, success: bool, message: impl Into<String>) {
        self.lines.push(NodeLine { node: node.clone(), success, message: message.into() });
    }

    pub fn all_succeeded(&self) -> bool {
        self.lines.iter().all(|l| l.success)
    }
}

pub struct OperatorCommands {
    registry: Arc<RegistryHandle>,
    cache: Arc<RoleCatalogCache>,
    adapter: Arc<dyn NodeAdapter>,
    authorizer: Arc<Authorizer>,
    force: ForceSync,
}

impl OperatorCommands {
    pub fn new(
        registry: Arc<RegistryHandle>,
        cache: Arc<RoleCatalogCache>,
        adapter: Arc<dyn NodeAdapter>,
        authorizer: Arc<Authorizer>,
        force: ForceSync,
    ) -> Self {
        Self { registry, cache, adapter, authorizer, force }
    }

    /// Adds `role` (a role of `node`) to `member` on `node` and on every node
    /// holding an equivalent role.
    pub async fn add_role_everywhere(
        &self,
        requester: &MemberId,
        member: &MemberId,
        role: &RoleId,
        node: &NodeId,
    ) -> EngineResult<CommandOutcome> {
        self.run(MutationKind::Add, requester, member, role, node).await
    }

    /// Symmetric removal. Removing from the main node on behalf of a synced
    /// node is skipped while another synced node still grants the role.
    pub async fn remove_role_everywhere(
        &self,
        requester: &MemberId,
        member: &MemberId,
        role: &RoleId,
        node: &NodeId,
    ) -> EngineResult<CommandOutcome> {
        self.run(MutationKind::Remove, requester, member, role, node).await
    }

    async fn run(
        &self,
        kind: MutationKind,
        requester: &MemberId,
        member: &MemberId,
        role_id: &RoleId,
        origin: &NodeId,
    ) -> EngineResult<CommandOutcome> {
        let registry = self.registry.snapshot();
        let origin_kind =
            registry.kind_of(origin).ok_or_else(|| EngineError::UnknownNode(origin.clone()))?;
        self.authorizer.authorize(&self.cache, self.adapter.as_ref(), requester, origin).await?;

        let origin_catalog = self.cache.catalog(origin).await?;
        let role = origin_catalog.role(role_id).cloned().ok_or_else(|| EngineError::UnknownRole {
            role: role_id.to_string(),
            node: origin.clone(),
        })?;
        info!(
            "[Commands] {} requested {:?} {} for {} from {}",
            requester, kind, role.name, member, origin
        );

        let reconciler = Reconciler::new(
            Arc::clone(&registry),
            Arc::clone(&self.cache),
            Arc::clone(&self.adapter),
        );
        let mut outcome = CommandOutcome::default();
        if role.protected {
            let message = format!("role {} is managed by {} itself", role.name, origin);
            outcome.push(origin, false, message);
            return Ok(outcome);
        }

        // A synced-side removal reaches main last so the "still granted" check
        // sees the other synced nodes after they were updated.
        let mut order: Vec<NodeId> = registry.nodes().cloned().collect();
        if kind == MutationKind::Remove && origin_kind == NodeKind::Synced {
            order.rotate_left(1);
        }

        for node in &order {
            let catalog = match self.cache.catalog(node).await {
                Ok(c) => c,
                Err(e) => {
                    outcome.push(node, false, format!("Error processing node {}: {}", node, e));
                    continue;
                },
            };
            let name = &catalog.info.name;
            let candidates: Vec<Role> = if node == origin {
                vec![role.clone()]
            } else {
                reconciler.equivalents_in(&role, &catalog).into_iter().cloned().collect()
            };
            if candidates.is_empty() {
                outcome.push(node, false, format!("role {} does not exist in {}", role.name, name));
                continue;
            }
            let (allowed, outranked): (Vec<Role>, Vec<Role>) =
                candidates.into_iter().partition(|r| !r.outranks(catalog.info.authority_position));
            for r in outranked {
                let message = format!("role {} ranks above the bot in {}", r.name, name);
                outcome.push(node, false, message);
            }

            let target = match find_member(self.adapter.as_ref(), node, member).await {
                Ok(Some(m)) => m,
                Ok(None) => {
                    outcome.push(node, false, format!("{} does not exist in {}", member, name));
                    continue;
                },
                Err(e) => {
                    outcome.push(node, false, format!("Error processing node {}: {}", name, e));
                    continue;
                },
            };

            let mut mutations = Vec::new();
            for r in allowed {
                let held = target.has_role(&r.id);
                match kind {
                    MutationKind::Add if held => {
                        let message = format!("{} already has {} in {}", member, r.name, name);
                        outcome.push(node, true, message);
                    },
                    MutationKind::Add => mutations.push(Mutation::add(node, member, r)),
                    MutationKind::Remove if !held => {
                        let message = format!("{} does not have {} in {}", member, r.name, name);
                        outcome.push(node, true, message);
                    },
                    MutationKind::Remove => {
                        let reverse =
                            origin_kind == NodeKind::Synced && node == registry.main_node();
                        if reverse && reconciler.still_granted_elsewhere(member, &r, origin).await {
                            let message = format!(
                                "Not removing {} in {}: still granted by another synced node",
                                r.name, name
                            );
                            outcome.push(node, true, message);
                        } else {
                            mutations.push(Mutation::remove(node, member, r));
                        }
                    },
                }
            }

            let (applied, failed) = self.force.run_all(mutations).await;
            for m in applied {
                outcome.push(node, true, m.to_string());
            }
            for f in failed {
                outcome.push(node, false, f.to_string());
            }
        }
        Ok(outcome)
    }
}
