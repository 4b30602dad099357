//! Engine error type.

use rolesync_types::error::{ConfigError, NodeError};
use rolesync_types::models::{MemberId, NodeId};
use thiserror::Error;

/// Errors surfaced by engine entry points (audit, operator commands, reload).
///
/// Per-member and per-node problems during a run are not errors here; they
/// are recorded in the report and the run continues.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum EngineError {
    /// Adapter call failed after retries.
    #[error(transparent)]
    Node(#[from] NodeError),

    /// Configuration could not be loaded or validated.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Requester is neither owner nor holder of the allowed role.
    #[error("Member {member} is not allowed to run commands in {node}")]
    Unauthorized { member: MemberId, node: NodeId },

    /// Another audit holds the run lock.
    #[error("An audit is already in progress")]
    AuditInProgress,

    /// Node is not part of the configured topology.
    #[error("Node {0} is not configured")]
    UnknownNode(NodeId),

    /// Role does not exist in the node's catalog.
    #[error("Role {role} not found in {node}")]
    UnknownRole { role: String, node: NodeId },

    /// Report artifacts could not be written.
    #[error("Report sink error: {0}")]
    Sink(String),
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        Self::Sink(e.to_string())
    }
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
