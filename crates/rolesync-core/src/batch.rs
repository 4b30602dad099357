//! Batch member iterator.
//!
//! Walks a node's full member set in fixed-size batches, pausing between
//! batches. Members inside a batch run sequentially in fetch order. Skips and
//! per-member failures are recorded in the report and never stop the walk.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

use crate::adapter::NodeResult;
use crate::error::EngineError;
use rolesync_types::models::{
    EngineConfig, Member, MemberDifference, ReconciliationReport, ReportError,
};

/// What processing one member produced.
#[derive(Debug, Default)]
pub struct MemberOutcome {
    pub difference: Option<MemberDifference>,
    /// Non-fatal notes (target node failures, member absent from target, ...)
    pub notes: Vec<ReportError>,
}

/// Per-member work driven by [`BatchIterator::run`].
#[async_trait]
pub trait MemberTask: Send + Sync {
    /// Precondition checked before `process`; failing members are skipped.
    fn is_manageable(&self, member: &Member) -> bool;

    async fn process(&self, member: &Member) -> Result<MemberOutcome, EngineError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchProgress {
    /// Emitted once up front for large member sets.
    Started { total: usize },
    Advanced { processed: usize, total: usize },
}

impl BatchProgress {
    pub fn message(&self) -> String {
        match self {
            Self::Started { total } => {
                format!("Processing {} members. This may take some time...", total)
            },
            Self::Advanced { processed, total } => format!(
                "Progress: {}% ({}/{} members processed)",
                processed * 100 / (*total).max(1),
                processed,
                total
            ),
        }
    }
}

pub type ProgressFn = Arc<dyn Fn(&BatchProgress) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub progress_every_batches: usize,
    pub progress_member_threshold: usize,
}

impl BatchOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            batch_delay: config.batch_delay(),
            progress_every_batches: config.progress_every_batches.max(1),
            progress_member_threshold: config.progress_member_threshold,
        }
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

#[derive(Clone)]
pub struct BatchIterator {
    options: BatchOptions,
    progress: Option<ProgressFn>,
}

impl BatchIterator {
    pub fn new(options: BatchOptions) -> Self {
        Self { options, progress: None }
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    fn notify(&self, progress: BatchProgress) {
        info!("[Batch] {}", progress.message());
        if let Some(callback) = &self.progress {
            callback(&progress);
        }
    }

    /// Runs `task` over the members yielded by `source`, then hands the
    /// report to `finalize`.
    ///
    /// `finalize` runs exactly once. If `source` fails, it receives whatever
    /// was gathered so far plus a `Fatal` entry.
    pub async fn run<S, F, Fut, R>(
        &self,
        source: S,
        task: &dyn MemberTask,
        mut report: ReconciliationReport,
        finalize: F,
    ) -> R
    where
        S: Future<Output = NodeResult<Vec<Member>>>,
        F: FnOnce(ReconciliationReport) -> Fut,
        Fut: Future<Output = R>,
    {
        let started = Instant::now();
        match source.await {
            Ok(members) => self.walk(&members, task, &mut report).await,
            Err(e) => {
                error!("[Batch] Member source failed: {}", e);
                report.record_error(ReportError::Fatal { message: e.to_string() });
            },
        }
        report.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            "[Batch] Processed {} members in {:.2} seconds",
            report.members_analyzed,
            report.elapsed_ms as f64 / 1000.0
        );
        finalize(report).await
    }

    async fn walk(
        &self,
        members: &[Member],
        task: &dyn MemberTask,
        report: &mut ReconciliationReport,
    ) {
        let total = members.len();
        let large = total > self.options.progress_member_threshold;
        if large {
            self.notify(BatchProgress::Started { total });
        }

        let batch_count = total.div_ceil(self.options.batch_size);
        let mut processed = 0;
        for (index, batch) in members.chunks(self.options.batch_size).enumerate() {
            for member in batch {
                self.visit(member, task, report).await;
                processed += 1;
            }

            let batch_no = index + 1;
            if large && batch_no % self.options.progress_every_batches == 0 {
                self.notify(BatchProgress::Advanced { processed, total });
            }
            if batch_no < batch_count {
                sleep(self.options.batch_delay).await;
            }
        }
    }

    async fn visit(
        &self,
        member: &Member,
        task: &dyn MemberTask,
        report: &mut ReconciliationReport,
    ) {
        if member.is_system {
            warn!("[Batch] Skipping {}: system account", member.display_name);
            report.record_error(ReportError::IsSystemAccount {
                member: member.id.clone(),
                display_name: member.display_name.clone(),
                node: member.node.clone(),
            });
            return;
        }
        if !task.is_manageable(member) {
            warn!("[Batch] Skipping {}: not manageable", member.display_name);
            report.record_error(ReportError::NotManageable {
                member: member.id.clone(),
                display_name: member.display_name.clone(),
                node: member.node.clone(),
            });
            return;
        }

        report.members_analyzed += 1;
        match task.process(member).await {
            Ok(outcome) => {
                if let Some(difference) = outcome.difference {
                    report.members_with_differences.push(difference);
                }
                for note in outcome.notes {
                    report.record_error(note);
                }
            },
            Err(e) => {
                error!("[Batch] Error processing member {}: {}", member.display_name, e);
                report.record_error(ReportError::PerMember {
                    member: member.id.clone(),
                    display_name: member.display_name.clone(),
                    message: e.to_string(),
                });
            },
        }
    }
}
