use serde::{Deserialize, Serialize};

use super::ids::{MemberId, NodeId, RoleId};

/// Snapshot of one member as seen by a single node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub node: NodeId,
    pub display_name: String,
    /// Roles assigned on `node`, in the order the node reported them.
    #[serde(default)]
    pub roles: Vec<RoleId>,
    /// Bot or system account.
    #[serde(default)]
    pub is_system: bool,
}

impl Member {
    pub fn new(
        id: impl Into<MemberId>,
        node: impl Into<NodeId>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            node: node.into(),
            display_name: display_name.into(),
            roles: Vec::new(),
            is_system: false,
        }
    }

    pub fn with_roles<I, R>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<RoleId>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn system(mut self) -> Self {
        self.is_system = true;
        self
    }

    pub fn has_role(&self, role: &RoleId) -> bool {
        self.roles.contains(role)
    }
}
