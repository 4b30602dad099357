//! Inbound membership events.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{MemberId, NodeId, RoleId};

/// A single change observed on one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MemberEvent {
    RoleAdded { node: NodeId, member: MemberId, role: RoleId },
    RoleRemoved { node: NodeId, member: MemberId, role: RoleId },
    Joined { node: NodeId, member: MemberId },
    /// `roles` holds the member's last known roles; the node no longer
    /// reports them once the member is gone.
    Left {
        node: NodeId,
        member: MemberId,
        #[serde(default)]
        roles: Vec<RoleId>,
    },
}

/// Discriminant of [`MemberEvent`], used for logging and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberEventKind {
    RoleAdded,
    RoleRemoved,
    Joined,
    Left,
}

impl fmt::Display for MemberEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RoleAdded => "role_added",
            Self::RoleRemoved => "role_removed",
            Self::Joined => "joined",
            Self::Left => "left",
        };
        f.write_str(s)
    }
}

impl MemberEvent {
    pub fn node(&self) -> &NodeId {
        match self {
            Self::RoleAdded { node, .. }
            | Self::RoleRemoved { node, .. }
            | Self::Joined { node, .. }
            | Self::Left { node, .. } => node,
        }
    }

    pub fn member(&self) -> &MemberId {
        match self {
            Self::RoleAdded { member, .. }
            | Self::RoleRemoved { member, .. }
            | Self::Joined { member, .. }
            | Self::Left { member, .. } => member,
        }
    }

    pub fn kind(&self) -> MemberEventKind {
        match self {
            Self::RoleAdded { .. } => MemberEventKind::RoleAdded,
            Self::RoleRemoved { .. } => MemberEventKind::RoleRemoved,
            Self::Joined { .. } => MemberEventKind::Joined,
            Self::Left { .. } => MemberEventKind::Left,
        }
    }
}
