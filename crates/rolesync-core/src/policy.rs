//! Reconciliation policies.
//!
//! A policy decides what happens to a computed [`RoleDiff`]: `AnalyzeOnly`
//! reports it, `ForceSync` applies it. Force mode removes before it adds and
//! runs each mutation independently; a failed mutation is recorded and the
//! rest still run. Nothing is rolled back.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::error;

use crate::adapter::{NodeAdapter, NodeResult};
use crate::diff::RoleDiff;
use crate::echo_guard::EchoGuard;
use crate::executor::RateLimitedExecutor;
use crate::logger;
use rolesync_types::error::NodeError;
use rolesync_types::models::{MemberId, NodeChange, NodeId, Role, SyncMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Add,
    Remove,
}

/// One role write against one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mutation {
    pub kind: MutationKind,
    pub node: NodeId,
    pub member: MemberId,
    pub role: Role,
}

impl Mutation {
    pub fn add(node: &NodeId, member: &MemberId, role: Role) -> Self {
        Self { kind: MutationKind::Add, node: node.clone(), member: member.clone(), role }
    }

    pub fn remove(node: &NodeId, member: &MemberId, role: Role) -> Self {
        Self { kind: MutationKind::Remove, node: node.clone(), member: member.clone(), role }
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            MutationKind::Add => {
                write!(f, "Added {} to {} in {}", self.role.name, self.member, self.node)
            },
            MutationKind::Remove => {
                write!(f, "Removed {} from {} in {}", self.role.name, self.member, self.node)
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedMutation {
    pub mutation: Mutation,
    pub error: NodeError,
}

impl fmt::Display for FailedMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.mutation.kind {
            MutationKind::Add => "add",
            MutationKind::Remove => "remove",
        };
        write!(f, "Failed to {} {}: {}", verb, self.mutation.role.name, self.error)
    }
}

/// What a policy did with one diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyOutcome {
    pub change: NodeChange,
    pub applied: Vec<Mutation>,
    pub failed: Vec<FailedMutation>,
}

#[async_trait]
pub trait ReconciliationPolicy: Send + Sync {
    fn mode(&self) -> SyncMode;

    async fn apply(&self, node: &NodeId, member: &MemberId, diff: &RoleDiff) -> PolicyOutcome;
}

pub struct AnalyzeOnly;

#[async_trait]
impl ReconciliationPolicy for AnalyzeOnly {
    fn mode(&self) -> SyncMode {
        SyncMode::Analyze
    }

    async fn apply(&self, _node: &NodeId, _member: &MemberId, diff: &RoleDiff) -> PolicyOutcome {
        PolicyOutcome {
            change: NodeChange::Pending {
                roles_to_add: diff.add_names(),
                roles_to_remove: diff.remove_names(),
            },
            applied: Vec::new(),
            failed: Vec::new(),
        }
    }
}

/// Applies diffs through the executor, arming the echo guard before each
/// write.
#[derive(Clone)]
pub struct ForceSync {
    adapter: Arc<dyn NodeAdapter>,
    executor: RateLimitedExecutor,
    guard: Arc<EchoGuard>,
}

impl ForceSync {
    pub fn new(
        adapter: Arc<dyn NodeAdapter>,
        executor: RateLimitedExecutor,
        guard: Arc<EchoGuard>,
    ) -> Self {
        Self { adapter, executor, guard }
    }

    /// Runs a single mutation.
    pub async fn run(&self, mutation: &Mutation) -> NodeResult<()> {
        let Mutation { kind, node, member, role } = mutation;
        let label = mutation.to_string();
        match kind {
            MutationKind::Add => {
                self.executor
                    .execute(&label, || {
                        self.guard.arm(member, node, &role.id);
                        self.adapter.add_role(node, member, &role.id)
                    })
                    .await
            },
            MutationKind::Remove => {
                self.executor
                    .execute(&label, || {
                        self.guard.arm(member, node, &role.id);
                        self.adapter.remove_role(node, member, &role.id)
                    })
                    .await
            },
        }
    }

    /// Runs mutations in order, collecting successes and failures.
    pub async fn run_all(&self, mutations: Vec<Mutation>) -> (Vec<Mutation>, Vec<FailedMutation>) {
        let mut applied = Vec::new();
        let mut failed = Vec::new();
        for mutation in mutations {
            match self.run(&mutation).await {
                Ok(()) => {
                    logger::log_success(&mutation.to_string());
                    applied.push(mutation);
                },
                Err(error) => {
                    error!("[ForceSync] {}: {}", mutation, error);
                    failed.push(FailedMutation { mutation, error });
                },
            }
        }
        (applied, failed)
    }
}

#[async_trait]
impl ReconciliationPolicy for ForceSync {
    fn mode(&self) -> SyncMode {
        SyncMode::Force
    }

    async fn apply(&self, node: &NodeId, member: &MemberId, diff: &RoleDiff) -> PolicyOutcome {
        let mutations = diff
            .to_remove
            .iter()
            .map(|r| Mutation::remove(node, member, r.clone()))
            .chain(diff.to_add.iter().map(|r| Mutation::add(node, member, r.clone())))
            .collect();
        let (applied, failed) = self.run_all(mutations).await;

        let names = |kind: MutationKind| -> Vec<String> {
            applied.iter().filter(|m| m.kind == kind).map(|m| m.role.name.clone()).collect()
        };
        PolicyOutcome {
            change: NodeChange::Applied {
                roles_added: names(MutationKind::Add),
                roles_removed: names(MutationKind::Remove),
                failed: failed.iter().map(ToString::to_string).collect(),
            },
            applied,
            failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{AdapterCall, InMemoryNodeAdapter};
    use rolesync_types::models::{Member, NodeInfo, RoleId};
    use std::time::Duration;

    fn setup() -> (Arc<InMemoryNodeAdapter>, Arc<EchoGuard>, ForceSync) {
        let adapter = Arc::new(InMemoryNodeAdapter::new());
        adapter.add_node(
            NodeInfo {
                id: NodeId::from("a"),
                name: "A".into(),
                owner_id: MemberId::from("owner"),
                authority_position: 50,
            },
            vec![Role::new("new", "New", "a", 2), Role::new("old", "Old", "a", 1)],
        );
        adapter.put_member(Member::new("u1", "a", "alice").with_roles(["old"]));
        let guard = Arc::new(EchoGuard::new(Duration::from_millis(2000)));
        let force = ForceSync::new(
            adapter.clone(),
            RateLimitedExecutor::new(3, Duration::from_millis(10)),
            guard.clone(),
        );
        (adapter, guard, force)
    }

    fn diff() -> RoleDiff {
        RoleDiff {
            to_add: vec![Role::new("new", "New", "a", 2)],
            to_remove: vec![Role::new("old", "Old", "a", 1)],
            unresolved: vec![],
        }
    }

    #[tokio::test]
    async fn test_analyze_only_never_writes() {
        let outcome = AnalyzeOnly.apply(&NodeId::from("a"), &MemberId::from("u1"), &diff()).await;
        assert_eq!(
            outcome.change,
            NodeChange::Pending { roles_to_add: vec!["New".into()], roles_to_remove: vec!["Old".into()] }
        );
        assert!(outcome.applied.is_empty());
    }

    #[tokio::test]
    async fn test_force_removes_before_adding_and_arms_guard() {
        let (adapter, guard, force) = setup();
        let outcome = force.apply(&NodeId::from("a"), &MemberId::from("u1"), &diff()).await;

        let mutations = adapter.mutations();
        assert!(matches!(mutations[0], AdapterCall::RemoveRole { .. }));
        assert!(matches!(mutations[1], AdapterCall::AddRole { .. }));
        assert_eq!(
            adapter.member_roles(&NodeId::from("a"), &MemberId::from("u1")),
            Some(vec![RoleId::from("new")])
        );
        assert_eq!(guard.active_tokens(), 2);
        assert!(outcome.failed.is_empty());
    }

    #[tokio::test]
    async fn test_force_keeps_going_after_a_failed_mutation() {
        let (adapter, _guard, force) = setup();
        adapter.fail_next_mutations([NodeError::Forbidden {
            node: NodeId::from("a"),
            message: "missing permissions".into(),
        }]);

        let outcome = force.apply(&NodeId::from("a"), &MemberId::from("u1"), &diff()).await;

        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.applied.len(), 1);
        let NodeChange::Applied { roles_added, roles_removed, failed } = outcome.change else {
            panic!("expected applied change");
        };
        assert_eq!(roles_added, vec!["New".to_string()]);
        assert!(roles_removed.is_empty());
        assert!(failed[0].starts_with("Failed to remove Old"));
    }
}
