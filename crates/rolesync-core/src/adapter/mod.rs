//! Node adapter trait for remote community access.
//!
//! Everything the engine knows about a node comes through this seam. Mutating
//! calls may fail with [`NodeError::Throttled`]; callers wrap them in the
//! [`crate::executor::RateLimitedExecutor`]. Reads are not retried.

mod http;
#[cfg(any(test, feature = "testing"))]
mod memory;

pub use http::HttpNodeAdapter;
#[cfg(any(test, feature = "testing"))]
pub use memory::{AdapterCall, InMemoryNodeAdapter};

use async_trait::async_trait;
use rolesync_types::error::NodeError;
use rolesync_types::models::{Member, MemberId, NodeId, NodeInfo, Role, RoleId};

pub type NodeResult<T> = Result<T, NodeError>;

#[async_trait]
pub trait NodeAdapter: Send + Sync {
    /// Node name, owner and the engine's authority position.
    async fn fetch_node(&self, node: &NodeId) -> NodeResult<NodeInfo>;

    /// Full role catalog of a node, in any order.
    async fn fetch_roles(&self, node: &NodeId) -> NodeResult<Vec<Role>>;

    /// One member snapshot. Fails with `NotFound` when the member is absent.
    async fn fetch_member(&self, node: &NodeId, member: &MemberId) -> NodeResult<Member>;

    /// Every member of a node, in the node's own order.
    async fn fetch_all_members(&self, node: &NodeId) -> NodeResult<Vec<Member>>;

    async fn add_role(&self, node: &NodeId, member: &MemberId, role: &RoleId) -> NodeResult<()>;

    async fn remove_role(&self, node: &NodeId, member: &MemberId, role: &RoleId)
        -> NodeResult<()>;

    /// Node facts and role catalog in one go. Adapters that derive the
    /// authority position from the catalog override this to list roles once.
    async fn fetch_catalog(&self, node: &NodeId) -> NodeResult<(NodeInfo, Vec<Role>)> {
        let info = self.fetch_node(node).await?;
        let roles = self.fetch_roles(node).await?;
        Ok((info, roles))
    }
}

/// Member lookup that treats absence as a normal outcome.
pub async fn find_member(
    adapter: &dyn NodeAdapter,
    node: &NodeId,
    member: &MemberId,
) -> NodeResult<Option<Member>> {
    match adapter.fetch_member(node, member).await {
        Ok(m) => Ok(Some(m)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
