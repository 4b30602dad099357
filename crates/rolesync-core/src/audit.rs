//! On-demand full reconciliation.
//!
//! An audit walks every member of the requesting node and diffs each one
//! against the node's counterparts: every synced node when run from the
//! main node, the main node when run from a synced node. Only one audit runs
//! at a time.

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info};

use crate::adapter::NodeAdapter;
use crate::auth::Authorizer;
use crate::batch::{BatchIterator, MemberOutcome, MemberTask};
use crate::cache::{NodeCatalog, RoleCatalogCache};
use crate::diff::{Reconciler, TargetDiff};
use crate::error::{EngineError, EngineResult};
use crate::policy::{AnalyzeOnly, ForceSync, ReconciliationPolicy};
use crate::registry::RegistryHandle;
use crate::sink::ReportSink;
use rolesync_types::models::{
    Member, MemberDifference, MemberId, NodeDifference, NodeId, ReconciliationReport, ReportError,
    RoleId, SyncMode,
};

/// Who asked for an audit, where, and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRequest {
    pub node: NodeId,
    pub requester: MemberId,
    pub mode: SyncMode,
}

struct AuditTask<'a> {
    reconciler: Reconciler,
    source: Arc<NodeCatalog>,
    targets: Vec<Arc<NodeCatalog>>,
    policy: &'a dyn ReconciliationPolicy,
    /// Unresolved mappings already reported in this run.
    inconsistencies: Mutex<HashSet<(RoleId, NodeId)>>,
}

#[async_trait]
impl MemberTask for AuditTask<'_> {
    fn is_manageable(&self, member: &Member) -> bool {
        self.source.is_manageable(member)
    }

    async fn process(&self, member: &Member) -> Result<MemberOutcome, EngineError> {
        let mut outcome = MemberOutcome::default();
        let mut nodes = Vec::new();

        for target in &self.targets {
            let target_id = &target.info.id;
            let result =
                self.reconciler.diff(&member.id, &member.node, &member.roles, target_id).await;
            let (diff, node_name) = match result {
                Ok(TargetDiff::Ready { target, diff, .. }) => (diff, target.info.name.clone()),
                Ok(TargetDiff::Absent) => {
                    outcome.notes.push(ReportError::NotOnTarget {
                        member: member.id.clone(),
                        display_name: member.display_name.clone(),
                        node: target_id.clone(),
                    });
                    continue;
                },
                Ok(TargetDiff::Skipped(reason)) => {
                    outcome.notes.push(reason);
                    continue;
                },
                Err(e) => {
                    outcome.notes.push(ReportError::PerMember {
                        member: member.id.clone(),
                        display_name: member.display_name.clone(),
                        message: format!("{}: {}", target.info.name, e),
                    });
                    continue;
                },
            };

            for unresolved in &diff.unresolved {
                let first = self
                    .inconsistencies
                    .lock()
                    .insert((unresolved.role_id.clone(), target_id.clone()));
                if first {
                    for sync_id in &unresolved.sync_ids {
                        outcome.notes.push(ReportError::MappingInconsistency {
                            role: unresolved.role.clone(),
                            sync_id: *sync_id,
                            node: target_id.clone(),
                        });
                    }
                }
            }
            if diff.is_empty() {
                continue;
            }

            let applied = self.policy.apply(target_id, &member.id, &diff).await;
            nodes.push(NodeDifference {
                node: target_id.clone(),
                node_name,
                change: applied.change,
                unresolved: diff.unresolved,
            });
        }

        if !nodes.is_empty() {
            outcome.difference = Some(MemberDifference {
                member: member.id.clone(),
                display_name: member.display_name.clone(),
                nodes,
            });
        }
        Ok(outcome)
    }
}

pub struct AuditCommand {
    registry: Arc<RegistryHandle>,
    cache: Arc<RoleCatalogCache>,
    adapter: Arc<dyn NodeAdapter>,
    authorizer: Arc<Authorizer>,
    force: ForceSync,
    batch: BatchIterator,
    sink: Arc<dyn ReportSink>,
    running: tokio::sync::Mutex<()>,
}

impl AuditCommand {
    pub fn new(
        registry: Arc<RegistryHandle>,
        cache: Arc<RoleCatalogCache>,
        adapter: Arc<dyn NodeAdapter>,
        authorizer: Arc<Authorizer>,
        force: ForceSync,
        batch: BatchIterator,
        sink: Arc<dyn ReportSink>,
    ) -> Self {
        Self {
            registry,
            cache,
            adapter,
            authorizer,
            force,
            batch,
            sink,
            running: tokio::sync::Mutex::new(()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }

    /// Runs a full audit and delivers the report to the sink.
    ///
    /// Fails fast with `AuditInProgress` when another audit is running. Sink
    /// failures are logged; the report is returned either way.
    pub async fn run(&self, request: &AuditRequest) -> EngineResult<ReconciliationReport> {
        let _running = self.running.try_lock().map_err(|_| EngineError::AuditInProgress)?;

        let registry = self.registry.snapshot();
        if registry.kind_of(&request.node).is_none() {
            return Err(EngineError::UnknownNode(request.node.clone()));
        }
        self.authorizer
            .authorize(&self.cache, self.adapter.as_ref(), &request.requester, &request.node)
            .await?;

        info!(
            "[Audit] {} requested {} of {}",
            request.requester, request.mode, request.node
        );
        let mut report = ReconciliationReport::new(request.node.clone(), request.mode);
        let source = match self.cache.catalog(&request.node).await {
            Ok(catalog) => catalog,
            Err(e) => {
                error!("[Audit] Cannot read roles of {}: {}", request.node, e);
                report.record_error(ReportError::Fatal { message: e.to_string() });
                return Ok(self.finish(report).await);
            },
        };

        let counterparts = registry.counterparts(&request.node);
        let loaded = join_all(counterparts.iter().map(|node| self.cache.catalog(node))).await;
        let mut targets = Vec::new();
        for (node, result) in counterparts.into_iter().zip(loaded) {
            match result {
                Ok(catalog) => targets.push(catalog),
                Err(e) => {
                    error!("[Audit] Error processing node {}: {}", node, e);
                    report.record_error(ReportError::NodeFailure { node, message: e.to_string() });
                },
            }
        }

        let policy: &dyn ReconciliationPolicy = match request.mode {
            SyncMode::Analyze => &AnalyzeOnly,
            SyncMode::Force => &self.force,
        };
        let task = AuditTask {
            reconciler: Reconciler::new(
                registry,
                Arc::clone(&self.cache),
                Arc::clone(&self.adapter),
            ),
            source,
            targets,
            policy,
            inconsistencies: Mutex::new(HashSet::new()),
        };

        let members = self.adapter.fetch_all_members(&request.node);
        Ok(self.batch.run(members, &task, report, |report| self.finish(report)).await)
    }

    /// Hands the report to the sink. Runs once per audit that got past
    /// authorization, whether or not the walk completed.
    async fn finish(&self, report: ReconciliationReport) -> ReconciliationReport {
        if let Err(e) = self.sink.deliver(&report).await {
            error!("[Audit] Failed to deliver report {}: {}", report.run_id, e);
        }
        info!("[Audit] {}", report.summary());
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{InMemoryNodeAdapter, NodeResult};
    use crate::batch::BatchOptions;
    use crate::test_support::*;
    use rolesync_types::error::NodeError;
    use rolesync_types::models::{NodeChange, NodeInfo, Role};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CollectingSink(Mutex<Vec<ReconciliationReport>>);

    #[async_trait]
    impl ReportSink for CollectingSink {
        async fn deliver(&self, report: &ReconciliationReport) -> EngineResult<()> {
            self.0.lock().push(report.clone());
            Ok(())
        }
    }

    fn command(fx: &Fixture, sink: Arc<CollectingSink>) -> AuditCommand {
        AuditCommand::new(
            fx.registry.clone(),
            fx.cache.clone(),
            fx.adapter.clone(),
            Arc::new(Authorizer::new(Default::default())),
            fx.force.clone(),
            BatchIterator::new(BatchOptions {
                batch_delay: Duration::from_millis(0),
                ..BatchOptions::default()
            }),
            sink,
        )
    }

    fn request(node: &str, mode: SyncMode) -> AuditRequest {
        AuditRequest { node: NodeId::from(node), requester: MemberId::from("owner"), mode }
    }

    fn seed(fx: &Fixture) {
        fx.adapter.put_member(member(MAIN, "owner", &[]));
        fx.adapter.put_member(member(MAIN, "u1", &["vip"]));
        fx.adapter.put_member(member(MAIN, "u2", &["art"]));
        fx.adapter.put_member(member(MAIN, "bot", &[]).system());
        fx.adapter.put_member(member(NODE_A, "u1", &[]));
        fx.adapter.put_member(member(NODE_A, "u2", &["art-a", "local"]));
        fx.adapter.put_member(member(NODE_B, "u1", &["vip-b"]));
    }

    #[tokio::test]
    async fn test_analyze_reports_without_writing() {
        let fx = Fixture::new();
        seed(&fx);
        let sink = Arc::new(CollectingSink(Mutex::new(Vec::new())));
        let report = command(&fx, sink.clone()).run(&request(MAIN, SyncMode::Analyze)).await.unwrap();

        assert!(fx.adapter.mutations().is_empty());
        assert_eq!(report.members_analyzed, 2);
        assert_eq!(report.members_with_differences.len(), 1);
        let diff = &report.members_with_differences[0];
        assert_eq!(diff.member, MemberId::from("u1"));
        assert_eq!(
            diff.nodes[0].change,
            NodeChange::Pending { roles_to_add: vec!["VIP-A".into()], roles_to_remove: vec![] }
        );
        // owner is not manageable, bot is a system account, u2 is missing from b
        assert!(report.errors.iter().any(|e| matches!(e, ReportError::NotManageable { .. })));
        assert!(report.errors.iter().any(|e| matches!(e, ReportError::IsSystemAccount { .. })));
        assert!(report.errors.iter().any(|e| matches!(e, ReportError::NotOnTarget { .. })));
        assert_eq!(sink.0.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_force_then_second_pass_is_empty() {
        let fx = Fixture::new();
        seed(&fx);
        let sink = Arc::new(CollectingSink(Mutex::new(Vec::new())));
        let command = command(&fx, sink);

        let first = command.run(&request(MAIN, SyncMode::Force)).await.unwrap();
        assert_eq!(first.members_with_differences.len(), 1);
        assert_eq!(
            fx.adapter.mutations(),
            vec![crate::adapter::AdapterCall::AddRole {
                node: NodeId::from(NODE_A),
                member: MemberId::from("u1"),
                role: RoleId::from("vip-a"),
            }]
        );

        let second = command.run(&request(MAIN, SyncMode::Force)).await.unwrap();
        assert!(second.members_with_differences.is_empty());
        assert_eq!(fx.adapter.mutations().len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_target_recorded_and_others_processed() {
        let fx = Fixture::new();
        seed(&fx);
        fx.adapter.set_unreachable(&NodeId::from(NODE_B), true);
        let sink = Arc::new(CollectingSink(Mutex::new(Vec::new())));

        let report = command(&fx, sink).run(&request(MAIN, SyncMode::Analyze)).await.unwrap();
        assert!(report.errors.iter().any(|e| matches!(e, ReportError::NodeFailure { .. })));
        assert_eq!(report.members_with_differences.len(), 1);
    }

    #[tokio::test]
    async fn test_member_listing_failure_still_delivers_report() {
        let fx = Fixture::new();
        seed(&fx);
        fx.adapter.break_member_listing(&NodeId::from(MAIN));
        let sink = Arc::new(CollectingSink(Mutex::new(Vec::new())));

        let report = command(&fx, sink.clone()).run(&request(MAIN, SyncMode::Analyze)).await.unwrap();
        assert!(report.has_fatal_error());
        assert_eq!(sink.0.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_unauthorized_and_unknown_node() {
        let fx = Fixture::new();
        seed(&fx);
        let command = command(&fx, Arc::new(CollectingSink(Mutex::new(Vec::new()))));

        let mut req = request(MAIN, SyncMode::Analyze);
        req.requester = MemberId::from("u1");
        assert!(matches!(command.run(&req).await, Err(EngineError::Unauthorized { .. })));
        assert!(matches!(
            command.run(&request("nowhere", SyncMode::Analyze)).await,
            Err(EngineError::UnknownNode(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_requesting_node_is_a_node_error() {
        let fx = Fixture::new();
        seed(&fx);
        fx.adapter.set_unreachable(&NodeId::from(MAIN), true);
        let sink = Arc::new(CollectingSink(Mutex::new(Vec::new())));

        let result = command(&fx, sink.clone()).run(&request(MAIN, SyncMode::Analyze)).await;
        assert!(matches!(result, Err(EngineError::Node(_))));
        assert!(sink.0.lock().is_empty());
    }

    /// Serves the first catalog read of the main node, then fails.
    struct MainGoesDown {
        inner: Arc<InMemoryNodeAdapter>,
        main_reads: AtomicUsize,
    }

    #[async_trait]
    impl NodeAdapter for MainGoesDown {
        async fn fetch_node(&self, node: &NodeId) -> NodeResult<NodeInfo> {
            if node.as_str() == MAIN && self.main_reads.fetch_add(1, Ordering::SeqCst) > 0 {
                return Err(NodeError::Unreachable {
                    node: node.clone(),
                    message: "connection reset".to_string(),
                });
            }
            self.inner.fetch_node(node).await
        }

        async fn fetch_roles(&self, node: &NodeId) -> NodeResult<Vec<Role>> {
            self.inner.fetch_roles(node).await
        }

        async fn fetch_member(&self, node: &NodeId, member: &MemberId) -> NodeResult<Member> {
            self.inner.fetch_member(node, member).await
        }

        async fn fetch_all_members(&self, node: &NodeId) -> NodeResult<Vec<Member>> {
            self.inner.fetch_all_members(node).await
        }

        async fn add_role(&self, node: &NodeId, member: &MemberId, role: &RoleId) -> NodeResult<()> {
            self.inner.add_role(node, member, role).await
        }

        async fn remove_role(
            &self,
            node: &NodeId,
            member: &MemberId,
            role: &RoleId,
        ) -> NodeResult<()> {
            self.inner.remove_role(node, member, role).await
        }
    }

    #[tokio::test]
    async fn test_source_catalog_failure_after_authorization_still_delivers_report() {
        let fx = Fixture::new();
        seed(&fx);
        let adapter: Arc<dyn NodeAdapter> =
            Arc::new(MainGoesDown { inner: fx.adapter.clone(), main_reads: AtomicUsize::new(0) });
        // Zero TTL: every catalog read goes to the adapter
        let cache = Arc::new(RoleCatalogCache::new(Arc::clone(&adapter), Duration::ZERO));
        let sink = Arc::new(CollectingSink(Mutex::new(Vec::new())));
        let command = AuditCommand::new(
            fx.registry.clone(),
            cache,
            adapter,
            Arc::new(Authorizer::new(Default::default())),
            fx.force.clone(),
            BatchIterator::new(BatchOptions::default()),
            sink.clone(),
        );

        let report = command.run(&request(MAIN, SyncMode::Analyze)).await.unwrap();
        assert!(report.has_fatal_error());
        assert_eq!(report.members_analyzed, 0);
        let delivered = sink.0.lock();
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].has_fatal_error());
    }

    #[tokio::test]
    async fn test_second_concurrent_audit_is_rejected() {
        let fx = Fixture::new();
        seed(&fx);
        let command = command(&fx, Arc::new(CollectingSink(Mutex::new(Vec::new()))));

        let _held = command.running.try_lock().unwrap();
        assert!(command.is_running());
        assert!(matches!(
            command.run(&request(MAIN, SyncMode::Analyze)).await,
            Err(EngineError::AuditInProgress)
        ));
    }
}
