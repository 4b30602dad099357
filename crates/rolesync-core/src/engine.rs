//! `SyncEngine`: the assembled engine.
//!
//! Built once from a validated `AppConfig`, a node adapter and a report
//! sink. Every component shares the same registry handle, role catalog cache
//! and echo guard.

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::adapter::NodeAdapter;
use crate::audit::{AuditCommand, AuditRequest};
use crate::auth::Authorizer;
use crate::batch::{BatchIterator, BatchOptions, ProgressFn};
use crate::cache::RoleCatalogCache;
use crate::commands::{CommandOutcome, OperatorCommands};
use crate::echo_guard::EchoGuard;
use crate::error::{EngineError, EngineResult};
use crate::executor::RateLimitedExecutor;
use crate::policy::ForceSync;
use crate::propagator::{PropagationOutcome, Propagator};
use crate::registry::{RegistryHandle, SyncRegistry};
use crate::sink::ReportSink;
use rolesync_types::models::{
    AppConfig, MemberEvent, MemberId, NodeId, ReconciliationReport, RoleId, SyncDirection,
};

/// Default capacity of the event channel handed out by `spawn_propagator`.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Point-in-time view of the engine, served by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub main_node: NodeId,
    pub synced_nodes: Vec<NodeId>,
    pub direction: SyncDirection,
    pub audit_running: bool,
    pub cached_catalogs: usize,
    pub echo_tokens: usize,
}

pub struct SyncEngine {
    config: RwLock<Arc<AppConfig>>,
    registry: Arc<RegistryHandle>,
    cache: Arc<RoleCatalogCache>,
    guard: Arc<EchoGuard>,
    authorizer: Arc<Authorizer>,
    audit: AuditCommand,
    commands: OperatorCommands,
    propagator: Arc<Propagator>,
}

impl SyncEngine {
    /// Checks `config` and wires every component.
    ///
    /// Engine tuning (retries, batch pacing, echo window, cache TTL) is read
    /// here only; `reload` swaps the mapping and access settings.
    pub fn new(
        config: AppConfig,
        adapter: Arc<dyn NodeAdapter>,
        sink: Arc<dyn ReportSink>,
        progress: Option<ProgressFn>,
    ) -> EngineResult<Self> {
        for warning in config.check()? {
            warn!("[Engine] {}", warning);
        }

        let registry = Arc::new(RegistryHandle::new(SyncRegistry::from_config(&config)));
        let cache =
            Arc::new(RoleCatalogCache::new(Arc::clone(&adapter), config.engine.cache_ttl()));
        let guard = Arc::new(EchoGuard::new(config.engine.echo_window()));
        let force = ForceSync::new(
            Arc::clone(&adapter),
            RateLimitedExecutor::from_config(&config.engine),
            Arc::clone(&guard),
        );
        let authorizer = Arc::new(Authorizer::new(config.access.clone()));

        let mut batch = BatchIterator::new(BatchOptions::from_config(&config.engine));
        if let Some(progress) = progress {
            batch = batch.with_progress(progress);
        }

        let audit = AuditCommand::new(
            Arc::clone(&registry),
            Arc::clone(&cache),
            Arc::clone(&adapter),
            Arc::clone(&authorizer),
            force.clone(),
            batch,
            sink,
        );
        let commands = OperatorCommands::new(
            Arc::clone(&registry),
            Arc::clone(&cache),
            Arc::clone(&adapter),
            Arc::clone(&authorizer),
            force.clone(),
        );
        let propagator = Arc::new(Propagator::new(
            Arc::clone(&registry),
            Arc::clone(&cache),
            adapter,
            Arc::clone(&guard),
            force,
        ));

        info!(
            "[Engine] Main node {} with {} synced nodes ({:?})",
            config.main_node.id,
            config.synced_nodes.len(),
            config.direction
        );
        Ok(Self {
            config: RwLock::new(Arc::new(config)),
            registry,
            cache,
            guard,
            authorizer,
            audit,
            commands,
            propagator,
        })
    }

    pub fn config(&self) -> Arc<AppConfig> {
        Arc::clone(&self.config.read())
    }

    pub fn registry(&self) -> Arc<SyncRegistry> {
        self.registry.snapshot()
    }

    pub fn status(&self) -> EngineStatus {
        let registry = self.registry.snapshot();
        EngineStatus {
            main_node: registry.main_node().clone(),
            synced_nodes: registry.synced_nodes().to_vec(),
            direction: registry.direction(),
            audit_running: self.audit.is_running(),
            cached_catalogs: self.cache.len(),
            echo_tokens: self.guard.active_tokens(),
        }
    }

    /// Replaces mappings and access settings. Refused while an audit runs so
    /// a run never sees two registries.
    pub fn reload(&self, config: AppConfig) -> EngineResult<Vec<String>> {
        if self.audit.is_running() {
            return Err(EngineError::AuditInProgress);
        }
        let warnings = config.check()?;
        let previous = self.config();
        if previous.engine != config.engine || previous.api != config.api {
            warn!("[Engine] Engine and API settings take effect after a restart");
        }

        self.registry.replace(SyncRegistry::from_config(&config));
        self.authorizer.update(config.access.clone());
        self.cache.clear();
        *self.config.write() = Arc::new(config);
        info!("[Engine] Configuration reloaded");
        Ok(warnings)
    }

    pub async fn audit(&self, request: &AuditRequest) -> EngineResult<ReconciliationReport> {
        self.audit.run(request).await
    }

    pub async fn add_role_everywhere(
        &self,
        requester: &MemberId,
        member: &MemberId,
        role: &RoleId,
        node: &NodeId,
    ) -> EngineResult<CommandOutcome> {
        self.commands.add_role_everywhere(requester, member, role, node).await
    }

    pub async fn remove_role_everywhere(
        &self,
        requester: &MemberId,
        member: &MemberId,
        role: &RoleId,
        node: &NodeId,
    ) -> EngineResult<CommandOutcome> {
        self.commands.remove_role_everywhere(requester, member, role, node).await
    }

    /// Handles one event inline, bypassing the channel.
    pub async fn handle_event(&self, event: &MemberEvent) -> EngineResult<PropagationOutcome> {
        let outcome = self.propagator.handle(event).await;
        self.guard.purge_expired();
        outcome
    }

    /// Starts the propagation loop. It ends once every sender is dropped.
    pub fn spawn_propagator(&self, capacity: usize) -> (mpsc::Sender<MemberEvent>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity);
        let propagator = Arc::clone(&self.propagator);
        let handle = tokio::spawn(async move { propagator.run(rx).await });
        (tx, handle)
    }
}
