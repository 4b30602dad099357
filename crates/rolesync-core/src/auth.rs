//! Command authorization.

use parking_lot::RwLock;
use tracing::error;

use crate::adapter::{find_member, NodeAdapter};
use crate::cache::RoleCatalogCache;
use crate::error::{EngineError, EngineResult};
use rolesync_types::models::{AccessConfig, MemberId, NodeId};

/// Decides who may run audits and operator commands on a node: the node
/// owner, or a member holding the configured role (matched by id or name).
pub struct Authorizer {
    access: RwLock<AccessConfig>,
}

impl Authorizer {
    pub fn new(access: AccessConfig) -> Self {
        Self { access: RwLock::new(access) }
    }

    pub fn update(&self, access: AccessConfig) {
        *self.access.write() = access;
    }

    /// Fails with `Unauthorized` only on a real denial. A node that cannot
    /// be read surfaces as `EngineError::Node`.
    pub async fn authorize(
        &self,
        cache: &RoleCatalogCache,
        adapter: &dyn NodeAdapter,
        requester: &MemberId,
        node: &NodeId,
    ) -> EngineResult<()> {
        let denied = || EngineError::Unauthorized { member: requester.clone(), node: node.clone() };

        let catalog = cache.catalog(node).await.map_err(|e| {
            error!("[Auth] Cannot read roles of {}: {}", node, e);
            EngineError::Node(e)
        })?;
        if &catalog.info.owner_id == requester {
            return Ok(());
        }

        let member = match find_member(adapter, node, requester).await {
            Ok(Some(m)) => m,
            Ok(None) => return Err(denied()),
            Err(e) => {
                error!("[Auth] Cannot read {} in {}: {}", requester, node, e);
                return Err(EngineError::Node(e));
            },
        };

        let access = self.access.read().clone();
        let by_id = access.allowed_role_id.as_ref().is_some_and(|id| member.has_role(id));
        let by_name = access.allowed_role_name.as_deref().is_some_and(|name| {
            member.roles.iter().filter_map(|id| catalog.role(id)).any(|r| r.name == name)
        });
        if by_id || by_name {
            Ok(())
        } else {
            Err(denied())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use rolesync_types::models::RoleId;

    async fn check(access: AccessConfig, requester: &str) -> EngineResult<()> {
        let fx = Fixture::new();
        fx.adapter.put_member(member(MAIN, "staff", &["mod"]));
        fx.adapter.put_member(member(MAIN, "pleb", &["art"]));
        Authorizer::new(access)
            .authorize(&fx.cache, fx.adapter.as_ref(), &MemberId::from(requester), &NodeId::from(MAIN))
            .await
    }

    #[tokio::test]
    async fn test_owner_always_allowed() {
        assert!(check(AccessConfig::default(), "owner").await.is_ok());
    }

    #[tokio::test]
    async fn test_allowed_role_by_id_or_name() {
        let by_id = AccessConfig { allowed_role_id: Some(RoleId::from("mod")), allowed_role_name: None };
        assert!(check(by_id.clone(), "staff").await.is_ok());
        assert!(matches!(check(by_id, "pleb").await, Err(EngineError::Unauthorized { .. })));

        let by_name =
            AccessConfig { allowed_role_id: None, allowed_role_name: Some("Artist".into()) };
        assert!(check(by_name, "pleb").await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_node_is_not_a_denial() {
        let fx = Fixture::new();
        fx.adapter.set_unreachable(&NodeId::from(MAIN), true);
        let result = Authorizer::new(AccessConfig::default())
            .authorize(&fx.cache, fx.adapter.as_ref(), &MemberId::from("owner"), &NodeId::from(MAIN))
            .await;
        assert!(matches!(result, Err(EngineError::Node(_))));
    }

    #[tokio::test]
    async fn test_unknown_member_denied() {
        let access = AccessConfig { allowed_role_id: Some(RoleId::from("mod")), allowed_role_name: None };
        assert!(check(access, "ghost").await.is_err());
    }
}
