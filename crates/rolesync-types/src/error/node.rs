//! Node adapter errors.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::models::NodeId;

/// Errors raised by a node adapter while talking to a remote community.
///
/// Only [`NodeError::Throttled`] is transient; the rate-limited executor
/// retries it and propagates everything else untouched.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum NodeError {
    /// Remote rejected the call because of rate limiting (429)
    #[error("Throttled by {node}{}", retry_after_ms.map(|ms| format!(", retry after {}ms", ms)).unwrap_or_default())]
    Throttled {
        /// Node that throttled the call
        node: NodeId,
        /// Wait hint supplied by the remote, if any
        retry_after_ms: Option<u64>,
    },

    /// Node, member or role does not exist
    #[error("Not found in {node}: {what}")]
    NotFound {
        /// Node the lookup ran against
        node: NodeId,
        /// Description of the missing entity
        what: String,
    },

    /// Missing permissions for the requested operation
    #[error("Forbidden in {node}: {message}")]
    Forbidden {
        /// Node that refused the call
        node: NodeId,
        /// Remote error message
        message: String,
    },

    /// Network failure, timeout or 5xx
    #[error("Node {node} unreachable: {message}")]
    Unreachable {
        /// Node that could not be reached
        node: NodeId,
        /// Transport error description
        message: String,
    },

    /// Remote answered with something we could not interpret
    #[error("Invalid response from {node}: {message}")]
    InvalidResponse {
        /// Node that sent the response
        node: NodeId,
        /// Decode error description
        message: String,
    },
}

impl NodeError {
    /// Whether the executor should retry this failure.
    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::Throttled { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Retry-after hint attached to a throttled failure.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Throttled { retry_after_ms: Some(ms), .. } => Some(Duration::from_millis(*ms)),
            _ => None,
        }
    }

    /// Node the failure originated from.
    pub fn node(&self) -> &NodeId {
        match self {
            Self::Throttled { node, .. }
            | Self::NotFound { node, .. }
            | Self::Forbidden { node, .. }
            | Self::Unreachable { node, .. }
            | Self::InvalidResponse { node, .. } => node,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_after_only_for_throttled() {
        let throttled = NodeError::Throttled { node: NodeId::from("a"), retry_after_ms: Some(250) };
        assert!(throttled.is_throttled());
        assert_eq!(throttled.retry_after(), Some(Duration::from_millis(250)));

        let forbidden =
            NodeError::Forbidden { node: NodeId::from("a"), message: "missing perms".into() };
        assert!(!forbidden.is_throttled());
        assert_eq!(forbidden.retry_after(), None);
    }

    #[test]
    fn test_throttled_display_without_hint() {
        let err = NodeError::Throttled { node: NodeId::from("guild"), retry_after_ms: None };
        assert_eq!(err.to_string(), "Throttled by guild");
    }
}
