//! REST adapter for a Discord-style guild API.

use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

use super::{NodeAdapter, NodeResult};
use rolesync_types::error::NodeError;
use rolesync_types::models::{ApiConfig, Member, MemberId, NodeId, NodeInfo, Role, RoleId};

const MEMBER_PAGE_SIZE: usize = 1000;

#[derive(Debug, Deserialize)]
struct GuildPayload {
    name: String,
    owner_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct RoleTagsPayload {
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    integration_id: Option<String>,
    // Sent as an explicit `null` when set, absent otherwise
    #[serde(default, deserialize_with = "present")]
    premium_subscriber: bool,
}

#[derive(Debug, Deserialize)]
struct RolePayload {
    id: String,
    name: String,
    position: i64,
    #[serde(default)]
    managed: bool,
    #[serde(default)]
    tags: Option<RoleTagsPayload>,
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    id: String,
    username: String,
    #[serde(default)]
    global_name: Option<String>,
    #[serde(default)]
    bot: bool,
    #[serde(default)]
    system: bool,
}

#[derive(Debug, Deserialize)]
struct MemberPayload {
    user: UserPayload,
    #[serde(default)]
    nick: Option<String>,
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ThrottlePayload {
    /// Seconds, fractional.
    retry_after: f64,
}

fn present<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let _ = serde_json::Value::deserialize(deserializer)?;
    Ok(true)
}

impl RolePayload {
    fn into_role(self, node: &NodeId) -> Role {
        let tags = self.tags.unwrap_or_default();
        // @everyone shares the guild id
        let protected = self.managed
            || self.id == node.as_str()
            || tags.bot_id.is_some()
            || tags.integration_id.is_some()
            || tags.premium_subscriber;
        let role = Role::new(self.id, self.name, node.clone(), self.position);
        if protected {
            role.protected()
        } else {
            role
        }
    }
}

impl MemberPayload {
    fn into_member(self, node: &NodeId) -> Member {
        let display_name = self
            .nick
            .or(self.user.global_name)
            .unwrap_or_else(|| self.user.username.clone());
        let member = Member::new(self.user.id, node.clone(), display_name).with_roles(self.roles);
        if self.user.bot || self.user.system {
            member.system()
        } else {
            member
        }
    }
}

/// Node adapter over the remote REST API.
///
/// Authenticates with a bot token. The bot's own user id is resolved once
/// and reused to compute the authority position in every node.
pub struct HttpNodeAdapter {
    client: Client,
    base_url: String,
    token: String,
    page_size: usize,
    self_id: OnceCell<String>,
}

impl HttpNodeAdapter {
    pub fn new(api: &ApiConfig, token: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(api.timeout_secs))
            .tcp_nodelay(true)
            .build()?;
        Ok(Self {
            client,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            token: token.into(),
            page_size: MEMBER_PAGE_SIZE,
            self_id: OnceCell::new(),
        })
    }

    /// Overrides the member listing page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    async fn send(&self, node: &NodeId, method: Method, path: &str) -> NodeResult<Response> {
        let url = format!("{}{}", self.base_url, path);
        debug!("[HttpAdapter] {} {}", method, url);
        let resp = self
            .client
            .request(method, &url)
            .header("Authorization", format!("Bot {}", self.token))
            .send()
            .await
            .map_err(|e| NodeError::Unreachable { node: node.clone(), message: e.to_string() })?;
        check_status(node, resp).await
    }

    async fn get_json<T: DeserializeOwned>(&self, node: &NodeId, path: &str) -> NodeResult<T> {
        let resp = self.send(node, Method::GET, path).await?;
        resp.json::<T>()
            .await
            .map_err(|e| NodeError::InvalidResponse { node: node.clone(), message: e.to_string() })
    }

    async fn self_id(&self, node: &NodeId) -> NodeResult<&str> {
        let id = self
            .self_id
            .get_or_try_init(|| async {
                let me: UserPayload = self.get_json(node, "/users/@me").await?;
                Ok::<_, NodeError>(me.id)
            })
            .await?;
        Ok(id.as_str())
    }

    /// Guild facts, with the authority position taken from `roles`.
    async fn node_info(&self, node: &NodeId, roles: &[Role]) -> NodeResult<NodeInfo> {
        let guild: GuildPayload = self.get_json(node, &format!("/guilds/{}", node)).await?;
        let self_id = self.self_id(node).await?.to_string();
        let me: MemberPayload =
            self.get_json(node, &format!("/guilds/{}/members/{}", node, self_id)).await?;
        let authority_position = roles
            .iter()
            .filter(|r| me.roles.iter().any(|id| id == r.id.as_str()))
            .map(|r| r.position)
            .max()
            .unwrap_or(0);

        Ok(NodeInfo {
            id: node.clone(),
            name: guild.name,
            owner_id: MemberId::new(guild.owner_id),
            authority_position,
        })
    }
}

async fn check_status(node: &NodeId, resp: Response) -> NodeResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let header_hint = resp
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<f64>().ok());
    let body = resp.text().await.unwrap_or_default();
    let node = node.clone();

    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => {
            let seconds = serde_json::from_str::<ThrottlePayload>(&body)
                .ok()
                .map(|p| p.retry_after)
                .or(header_hint);
            NodeError::Throttled {
                node,
                retry_after_ms: seconds.map(|s| (s * 1000.0).ceil().max(0.0) as u64),
            }
        },
        StatusCode::NOT_FOUND => NodeError::NotFound { node, what: body },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            NodeError::Forbidden { node, message: body }
        },
        s if s.is_server_error() => {
            NodeError::Unreachable { node, message: format!("HTTP {}: {}", s.as_u16(), body) }
        },
        s => NodeError::InvalidResponse { node, message: format!("HTTP {}: {}", s.as_u16(), body) },
    })
}

#[async_trait]
impl NodeAdapter for HttpNodeAdapter {
    async fn fetch_node(&self, node: &NodeId) -> NodeResult<NodeInfo> {
        let roles = self.fetch_roles(node).await?;
        self.node_info(node, &roles).await
    }

    async fn fetch_catalog(&self, node: &NodeId) -> NodeResult<(NodeInfo, Vec<Role>)> {
        let roles = self.fetch_roles(node).await?;
        let info = self.node_info(node, &roles).await?;
        Ok((info, roles))
    }

    async fn fetch_roles(&self, node: &NodeId) -> NodeResult<Vec<Role>> {
        let roles: Vec<RolePayload> =
            self.get_json(node, &format!("/guilds/{}/roles", node)).await?;
        Ok(roles.into_iter().map(|r| r.into_role(node)).collect())
    }

    async fn fetch_member(&self, node: &NodeId, member: &MemberId) -> NodeResult<Member> {
        let payload: MemberPayload =
            self.get_json(node, &format!("/guilds/{}/members/{}", node, member)).await?;
        Ok(payload.into_member(node))
    }

    async fn fetch_all_members(&self, node: &NodeId) -> NodeResult<Vec<Member>> {
        let mut members = Vec::new();
        let mut after = String::from("0");
        loop {
            let path =
                format!("/guilds/{}/members?limit={}&after={}", node, self.page_size, after);
            let page: Vec<MemberPayload> = self.get_json(node, &path).await?;
            let page_len = page.len();
            if let Some(last) = page.last() {
                after = last.user.id.clone();
            }
            members.extend(page.into_iter().map(|m| m.into_member(node)));
            if page_len < self.page_size {
                break;
            }
        }
        debug!("[HttpAdapter] Listed {} members of {}", members.len(), node);
        Ok(members)
    }

    async fn add_role(&self, node: &NodeId, member: &MemberId, role: &RoleId) -> NodeResult<()> {
        self.send(node, Method::PUT, &format!("/guilds/{}/members/{}/roles/{}", node, member, role))
            .await
            .map(drop)
    }

    async fn remove_role(
        &self,
        node: &NodeId,
        member: &MemberId,
        role: &RoleId,
    ) -> NodeResult<()> {
        self.send(
            node,
            Method::DELETE,
            &format!("/guilds/{}/members/{}/roles/{}", node, member, role),
        )
        .await
        .map(drop)
    }
}
