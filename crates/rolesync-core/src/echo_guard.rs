//! Echo suppression.
//!
//! Before the engine writes a role it arms a token for `(member, node, role)`.
//! Role-change events matching a live token are the engine's own echo and
//! are dropped. Re-arming a live token pushes its expiry out instead of
//! stacking a second one. Tokens are not consumed on match, so duplicate
//! deliveries inside the window are also dropped.

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use rolesync_types::models::{MemberEvent, MemberId, NodeId, RoleId};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EchoKey {
    pub member: MemberId,
    pub node: NodeId,
    pub role: RoleId,
}

impl EchoKey {
    pub fn new(member: &MemberId, node: &NodeId, role: &RoleId) -> Self {
        Self { member: member.clone(), node: node.clone(), role: role.clone() }
    }

    /// Key for a role-change event; membership events have none.
    pub fn for_event(event: &MemberEvent) -> Option<Self> {
        match event {
            MemberEvent::RoleAdded { node, member, role }
            | MemberEvent::RoleRemoved { node, member, role } => {
                Some(Self::new(member, node, role))
            },
            MemberEvent::Joined { .. } | MemberEvent::Left { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Idle,
    Suppressing,
}

pub struct EchoGuard {
    window: Duration,
    tokens: DashMap<EchoKey, Instant>,
}

impl EchoGuard {
    pub fn new(window: Duration) -> Self {
        Self { window, tokens: DashMap::new() }
    }

    /// Idle -> Suppressing for this key, or reset the timer if already
    /// suppressing.
    pub fn arm(&self, member: &MemberId, node: &NodeId, role: &RoleId) {
        let expires = Instant::now() + self.window;
        self.tokens.insert(EchoKey::new(member, node, role), expires);
    }

    pub fn state(&self, key: &EchoKey) -> GuardState {
        let now = Instant::now();
        let live = match self.tokens.get(key) {
            Some(expires) => *expires > now,
            None => return GuardState::Idle,
        };
        if live {
            GuardState::Suppressing
        } else {
            self.tokens.remove_if(key, |_, expires| *expires <= now);
            GuardState::Idle
        }
    }

    /// Whether `event` is an echo of one of our own writes.
    pub fn is_echo(&self, event: &MemberEvent) -> bool {
        let Some(key) = EchoKey::for_event(event) else {
            return false;
        };
        let suppressed = self.state(&key) == GuardState::Suppressing;
        if suppressed {
            debug!("[EchoGuard] Ignoring {} for {} in {}", event.kind(), key.member, key.node);
        }
        suppressed
    }

    /// Drops every expired token.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.tokens.retain(|_, expires| *expires > now);
    }

    pub fn active_tokens(&self) -> usize {
        let now = Instant::now();
        self.tokens.iter().filter(|entry| *entry.value() > now).count()
    }
}
