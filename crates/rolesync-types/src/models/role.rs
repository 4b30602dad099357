use serde::{Deserialize, Serialize};

use super::ids::{NodeId, RoleId};

/// A named privilege scoped to one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub node: NodeId,
    /// Rank within the node; higher outranks lower.
    pub position: i64,
    /// Premium, integration and default roles: never diffed or assigned.
    #[serde(default)]
    pub protected: bool,
}

impl Role {
    pub fn new(
        id: impl Into<RoleId>,
        name: impl Into<String>,
        node: impl Into<NodeId>,
        position: i64,
    ) -> Self {
        Self { id: id.into(), name: name.into(), node: node.into(), position, protected: false }
    }

    /// Marks the role as node-protected.
    pub fn protected(mut self) -> Self {
        self.protected = true;
        self
    }

    /// Whether the role ranks above the given authority position.
    pub fn outranks(&self, authority_position: i64) -> bool {
        self.position > authority_position
    }
}
