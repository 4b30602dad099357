//! In-memory node adapter for tests.
//!
//! Holds node catalogs and members in process, applies mutations to its own
//! state, records every call, and can be scripted to fail.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet, VecDeque};

use super::{NodeAdapter, NodeResult};
use rolesync_types::error::NodeError;
use rolesync_types::models::{Member, MemberId, NodeId, NodeInfo, Role, RoleId};

/// One recorded adapter call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterCall {
    FetchNode(NodeId),
    FetchRoles(NodeId),
    FetchMember(NodeId, MemberId),
    FetchAllMembers(NodeId),
    AddRole { node: NodeId, member: MemberId, role: RoleId },
    RemoveRole { node: NodeId, member: MemberId, role: RoleId },
}

impl AdapterCall {
    pub fn is_mutation(&self) -> bool {
        matches!(self, Self::AddRole { .. } | Self::RemoveRole { .. })
    }
}

#[derive(Debug, Clone)]
struct NodeState {
    info: NodeInfo,
    roles: Vec<Role>,
    members: Vec<Member>,
}

#[derive(Default)]
pub struct InMemoryNodeAdapter {
    nodes: RwLock<HashMap<NodeId, NodeState>>,
    calls: Mutex<Vec<AdapterCall>>,
    mutation_failures: Mutex<VecDeque<NodeError>>,
    unreachable: RwLock<HashSet<NodeId>>,
    broken_listings: RwLock<HashSet<NodeId>>,
}

impl InMemoryNodeAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&self, info: NodeInfo, roles: Vec<Role>) {
        let id = info.id.clone();
        self.nodes.write().insert(id, NodeState { info, roles, members: Vec::new() });
    }

    pub fn set_roles(&self, node: &NodeId, roles: Vec<Role>) {
        if let Some(state) = self.nodes.write().get_mut(node) {
            state.roles = roles;
        }
    }

    /// Inserts or replaces a member on `member.node`.
    pub fn put_member(&self, member: Member) {
        let mut nodes = self.nodes.write();
        let Some(state) = nodes.get_mut(&member.node) else {
            return;
        };
        match state.members.iter_mut().find(|m| m.id == member.id) {
            Some(existing) => *existing = member,
            None => state.members.push(member),
        }
    }

    /// Current roles of a member, `None` when absent.
    pub fn member_roles(&self, node: &NodeId, member: &MemberId) -> Option<Vec<RoleId>> {
        self.nodes
            .read()
            .get(node)
            .and_then(|s| s.members.iter().find(|m| &m.id == member))
            .map(|m| m.roles.clone())
    }

    /// Queues errors returned by the next add/remove calls, one per call.
    pub fn fail_next_mutations(&self, errors: impl IntoIterator<Item = NodeError>) {
        self.mutation_failures.lock().extend(errors);
    }

    /// Every call against `node` fails with `Unreachable` while set.
    pub fn set_unreachable(&self, node: &NodeId, unreachable: bool) {
        let mut set = self.unreachable.write();
        if unreachable {
            set.insert(node.clone());
        } else {
            set.remove(node);
        }
    }

    /// `fetch_all_members` on `node` fails while everything else works.
    pub fn break_member_listing(&self, node: &NodeId) {
        self.broken_listings.write().insert(node.clone());
    }

    pub fn calls(&self) -> Vec<AdapterCall> {
        self.calls.lock().clone()
    }

    pub fn mutations(&self) -> Vec<AdapterCall> {
        self.calls.lock().iter().filter(|c| c.is_mutation()).cloned().collect()
    }

    pub fn count_calls(&self, pred: impl Fn(&AdapterCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: AdapterCall) {
        self.calls.lock().push(call);
    }

    fn reachable(&self, node: &NodeId) -> NodeResult<()> {
        if self.unreachable.read().contains(node) {
            return Err(NodeError::Unreachable {
                node: node.clone(),
                message: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    fn with_state<T>(&self, node: &NodeId, f: impl FnOnce(&NodeState) -> T) -> NodeResult<T> {
        self.reachable(node)?;
        self.nodes
            .read()
            .get(node)
            .map(f)
            .ok_or_else(|| NodeError::NotFound { node: node.clone(), what: "node".to_string() })
    }

    fn mutate(
        &self,
        node: &NodeId,
        member: &MemberId,
        role: &RoleId,
        apply: impl FnOnce(&mut Vec<RoleId>),
    ) -> NodeResult<()> {
        self.reachable(node)?;
        if let Some(err) = self.mutation_failures.lock().pop_front() {
            return Err(err);
        }
        let mut nodes = self.nodes.write();
        let state = nodes
            .get_mut(node)
            .ok_or_else(|| NodeError::NotFound { node: node.clone(), what: "node".to_string() })?;
        if !state.roles.iter().any(|r| &r.id == role) {
            return Err(NodeError::NotFound { node: node.clone(), what: format!("role {}", role) });
        }
        let target = state.members.iter_mut().find(|m| &m.id == member).ok_or_else(|| {
            NodeError::NotFound { node: node.clone(), what: format!("member {}", member) }
        })?;
        apply(&mut target.roles);
        Ok(())
    }
}

#[async_trait]
impl NodeAdapter for InMemoryNodeAdapter {
    async fn fetch_node(&self, node: &NodeId) -> NodeResult<NodeInfo> {
        self.record(AdapterCall::FetchNode(node.clone()));
        self.with_state(node, |s| s.info.clone())
    }

    async fn fetch_roles(&self, node: &NodeId) -> NodeResult<Vec<Role>> {
        self.record(AdapterCall::FetchRoles(node.clone()));
        self.with_state(node, |s| s.roles.clone())
    }

    async fn fetch_member(&self, node: &NodeId, member: &MemberId) -> NodeResult<Member> {
        self.record(AdapterCall::FetchMember(node.clone(), member.clone()));
        self.with_state(node, |s| s.members.iter().find(|m| &m.id == member).cloned())?.ok_or_else(
            || NodeError::NotFound { node: node.clone(), what: format!("member {}", member) },
        )
    }

    async fn fetch_all_members(&self, node: &NodeId) -> NodeResult<Vec<Member>> {
        self.record(AdapterCall::FetchAllMembers(node.clone()));
        if self.broken_listings.read().contains(node) {
            return Err(NodeError::Unreachable {
                node: node.clone(),
                message: "member listing interrupted".to_string(),
            });
        }
        self.with_state(node, |s| s.members.clone())
    }

    async fn add_role(&self, node: &NodeId, member: &MemberId, role: &RoleId) -> NodeResult<()> {
        self.record(AdapterCall::AddRole {
            node: node.clone(),
            member: member.clone(),
            role: role.clone(),
        });
        self.mutate(node, member, role, |roles| {
            if !roles.contains(role) {
                roles.push(role.clone());
            }
        })
    }

    async fn remove_role(
        &self,
        node: &NodeId,
        member: &MemberId,
        role: &RoleId,
    ) -> NodeResult<()> {
        self.record(AdapterCall::RemoveRole {
            node: node.clone(),
            member: member.clone(),
            role: role.clone(),
        });
        self.mutate(node, member, role, |roles| roles.retain(|r| r != role))
    }
}
