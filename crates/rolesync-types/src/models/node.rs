use serde::{Deserialize, Serialize};

use super::ids::{MemberId, NodeId};

/// Position of a node in the sync topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Main,
    Synced,
}

/// Live facts about a node, fetched from the adapter together with its roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: NodeId,
    pub name: String,
    pub owner_id: MemberId,
    /// Position of the engine's own highest role. Roles ranked above it
    /// cannot be assigned or removed by the engine.
    pub authority_position: i64,
}
