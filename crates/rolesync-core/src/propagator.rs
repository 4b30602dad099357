//! Event-driven propagation.
//!
//! Applies single-member changes as they are observed: a role change on the
//! main node fans out to every synced node, a role change on a synced node
//! flows back to the main node. Joins copy roles from the other side and
//! leaves strip the departed member's equivalents.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::adapter::{find_member, NodeAdapter};
use crate::cache::{NodeCatalog, RoleCatalogCache};
use crate::diff::{Reconciler, RoleDiff, TargetDiff};
use crate::echo_guard::EchoGuard;
use crate::error::EngineResult;
use crate::logger;
use crate::policy::{FailedMutation, ForceSync, Mutation, ReconciliationPolicy};
use crate::registry::RegistryHandle;
use rolesync_types::models::{
    MemberEvent, MemberEventKind, MemberId, NodeId, NodeKind, Role, RoleId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// Caused by one of the engine's own writes.
    Echo,
    /// Node is not part of the topology.
    UnknownNode,
    /// Configured direction does not propagate from this node.
    Direction,
}

/// What handling one event did.
#[derive(Debug, Clone, Serialize)]
pub struct PropagationOutcome {
    pub event: MemberEventKind,
    pub node: NodeId,
    pub member: MemberId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignored: Option<IgnoreReason>,
    pub applied: Vec<Mutation>,
    pub failed: Vec<FailedMutation>,
    /// Targets skipped and roles left alone, with the reason.
    pub notes: Vec<String>,
}

impl PropagationOutcome {
    fn for_event(event: &MemberEvent) -> Self {
        Self {
            event: event.kind(),
            node: event.node().clone(),
            member: event.member().clone(),
            ignored: None,
            applied: Vec::new(),
            failed: Vec::new(),
            notes: Vec::new(),
        }
    }

    fn ignored(event: &MemberEvent, reason: IgnoreReason) -> Self {
        Self { ignored: Some(reason), ..Self::for_event(event) }
    }

    pub fn is_noop(&self) -> bool {
        self.applied.is_empty() && self.failed.is_empty()
    }
}

pub struct Propagator {
    registry: Arc<RegistryHandle>,
    cache: Arc<RoleCatalogCache>,
    adapter: Arc<dyn NodeAdapter>,
    guard: Arc<EchoGuard>,
    force: ForceSync,
}

impl Propagator {
    pub fn new(
        registry: Arc<RegistryHandle>,
        cache: Arc<RoleCatalogCache>,
        adapter: Arc<dyn NodeAdapter>,
        guard: Arc<EchoGuard>,
        force: ForceSync,
    ) -> Self {
        Self { registry, cache, adapter, guard, force }
    }

    /// Drains `events` until every sender is dropped. Failures are logged per
    /// event and never end the loop.
    pub async fn run(&self, mut events: mpsc::Receiver<MemberEvent>) {
        info!("[Propagator] Listening for member events");
        while let Some(event) = events.recv().await {
            match self.handle(&event).await {
                Ok(outcome) if outcome.ignored.is_none() && !outcome.is_noop() => {
                    info!(
                        "[Propagator] {} for {} in {}: {} applied, {} failed",
                        outcome.event,
                        outcome.member,
                        outcome.node,
                        outcome.applied.len(),
                        outcome.failed.len()
                    );
                },
                Ok(_) => {},
                Err(e) => logger::log_error(
                    &format!("[Propagator] Error handling {} for {}", event.kind(), event.member()),
                    &e,
                ),
            }
            self.guard.purge_expired();
        }
        info!("[Propagator] Event channel closed");
    }

    pub async fn handle(&self, event: &MemberEvent) -> EngineResult<PropagationOutcome> {
        let registry = self.registry.snapshot();
        let node = event.node();
        if registry.kind_of(node).is_none() {
            debug!("[Propagator] Ignoring {} from unknown node {}", event.kind(), node);
            return Ok(PropagationOutcome::ignored(event, IgnoreReason::UnknownNode));
        }
        if self.guard.is_echo(event) {
            return Ok(PropagationOutcome::ignored(event, IgnoreReason::Echo));
        }
        // A join pulls roles into the node; everything else pushes them out
        let flows = match event {
            MemberEvent::Joined { .. } => registry.propagates_into(node),
            _ => registry.propagates_from(node),
        };
        if !flows {
            debug!("[Propagator] Direction {:?} skips events from {}", registry.direction(), node);
            return Ok(PropagationOutcome::ignored(event, IgnoreReason::Direction));
        }

        let reconciler = Reconciler::new(
            Arc::clone(&registry),
            Arc::clone(&self.cache),
            Arc::clone(&self.adapter),
        );
        let mut outcome = PropagationOutcome::for_event(event);
        match event {
            MemberEvent::RoleAdded { node, member, role } => {
                self.on_role_change(&reconciler, node, member, role, true, &mut outcome).await?;
            },
            MemberEvent::RoleRemoved { node, member, role } => {
                self.on_role_change(&reconciler, node, member, role, false, &mut outcome).await?;
            },
            MemberEvent::Joined { node, member } => {
                self.on_join(&reconciler, node, member, &mut outcome).await?;
            },
            MemberEvent::Left { node, member, roles } => {
                self.on_leave(&reconciler, node, member, roles, &mut outcome).await?;
            },
        }
        Ok(outcome)
    }

    /// Looks a role up, refreshing the catalog once if it is missing.
    async fn resolve_role(&self, node: &NodeId, role: &RoleId) -> EngineResult<Option<Role>> {
        let catalog = self.cache.catalog(node).await?;
        if let Some(found) = catalog.role(role) {
            return Ok(Some(found.clone()));
        }
        self.cache.invalidate(node);
        Ok(self.cache.catalog(node).await?.role(role).cloned())
    }

    async fn on_role_change(
        &self,
        reconciler: &Reconciler,
        node: &NodeId,
        member: &MemberId,
        role: &RoleId,
        added: bool,
        outcome: &mut PropagationOutcome,
    ) -> EngineResult<()> {
        let Some(role) = self.resolve_role(node, role).await? else {
            outcome.notes.push(format!("role {} not found in {}", role, node));
            return Ok(());
        };
        if role.protected {
            outcome.notes.push(format!("role {} is protected", role.name));
            return Ok(());
        }
        let Some(source) = find_member(self.adapter.as_ref(), node, member).await? else {
            outcome.notes.push(format!("{} no longer in {}", member, node));
            return Ok(());
        };

        // The snapshot may lag the event; make it agree with what happened.
        let mut source_roles = source.roles;
        source_roles.retain(|r| r != &role.id);
        if added {
            source_roles.push(role.id.clone());
        }

        let restrict = std::slice::from_ref(&role);
        for target in reconciler.registry().counterparts(node) {
            let result = reconciler.diff(member, node, &source_roles, &target).await;
            let narrow = |d: RoleDiff| d.restricted_to(reconciler.registry(), restrict);
            self.apply(result, &target, narrow, outcome).await;
        }
        Ok(())
    }

    async fn on_join(
        &self,
        reconciler: &Reconciler,
        node: &NodeId,
        member: &MemberId,
        outcome: &mut PropagationOutcome,
    ) -> EngineResult<()> {
        let registry = reconciler.registry();
        // Sources are the opposite side: main for a synced join, every synced
        // node for a main join.
        let sources = match registry.kind_of(node) {
            Some(NodeKind::Main) => registry.synced_nodes().to_vec(),
            Some(NodeKind::Synced) => vec![registry.main_node().clone()],
            None => Vec::new(),
        };
        for source in sources {
            let found = match find_member(self.adapter.as_ref(), &source, member).await {
                Ok(found) => found,
                Err(e) => {
                    warn!("[Propagator] Cannot read {} in {}: {}", member, source, e);
                    outcome.notes.push(format!("{} unavailable: {}", source, e));
                    continue;
                },
            };
            let Some(source_member) = found else {
                outcome.notes.push(format!("{} does not exist in {}", member, source));
                continue;
            };
            let result = reconciler.diff(member, &source, &source_member.roles, node).await;
            self.apply(result, node, RoleDiff::additions_only, outcome).await;
        }
        Ok(())
    }

    async fn on_leave(
        &self,
        reconciler: &Reconciler,
        node: &NodeId,
        member: &MemberId,
        roles: &[RoleId],
        outcome: &mut PropagationOutcome,
    ) -> EngineResult<()> {
        let catalog: Arc<NodeCatalog> = self.cache.catalog(node).await?;
        let departed: Vec<Role> = catalog
            .roles
            .iter()
            .filter(|r| !r.protected && roles.contains(&r.id))
            .cloned()
            .collect();
        if departed.is_empty() {
            outcome.notes.push(format!("{} left {} without synced roles", member, node));
            return Ok(());
        }

        for target in reconciler.registry().counterparts(node) {
            let result = reconciler.diff(member, node, &[], &target).await;
            let narrow = |d: RoleDiff| {
                let mut d = d.restricted_to(reconciler.registry(), &departed);
                d.to_add.clear();
                d
            };
            self.apply(result, &target, narrow, outcome).await;
        }
        Ok(())
    }

    /// Applies a narrowed diff to one target, folding the result into
    /// `outcome`. Target-level failures become notes.
    async fn apply(
        &self,
        result: EngineResult<TargetDiff>,
        target: &NodeId,
        narrow: impl FnOnce(RoleDiff) -> RoleDiff,
        outcome: &mut PropagationOutcome,
    ) {
        let (member, diff) = match result {
            Ok(TargetDiff::Ready { member, diff, .. }) => (member, narrow(diff)),
            Ok(TargetDiff::Absent) => {
                outcome.notes.push(format!("{} does not exist in {}", outcome.member, target));
                return;
            },
            Ok(TargetDiff::Skipped(reason)) => {
                outcome.notes.push(reason.to_string());
                return;
            },
            Err(e) => {
                warn!("[Propagator] Skipping {}: {}", target, e);
                outcome.notes.push(format!("{} unavailable: {}", target, e));
                return;
            },
        };
        for unresolved in &diff.unresolved {
            outcome.notes.push(format!("{} in {}", unresolved, target));
        }
        if diff.is_empty() {
            return;
        }
        let applied = self.force.apply(target, &member.id, &diff).await;
        outcome.applied.extend(applied.applied);
        outcome.failed.extend(applied.failed);
    }
}
