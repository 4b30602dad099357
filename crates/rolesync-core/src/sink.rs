//! Report sinks.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};
use rolesync_types::models::ReconciliationReport;

/// Receives a finished report exactly once.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn deliver(&self, report: &ReconciliationReport) -> EngineResult<()>;
}

/// Writes `<node>_results.json` and, when errors exist, `<node>_errors.txt`
/// into a directory.
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn results_path(&self, report: &ReconciliationReport) -> PathBuf {
        self.dir.join(format!("{}_results.json", report.node))
    }

    pub fn errors_path(&self, report: &ReconciliationReport) -> PathBuf {
        self.dir.join(format!("{}_errors.txt", report.node))
    }
}

#[async_trait]
impl ReportSink for DirectorySink {
    async fn deliver(&self, report: &ReconciliationReport) -> EngineResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let json = report.differences_json().map_err(|e| EngineError::Sink(e.to_string()))?;
        let results = self.results_path(report);
        tokio::fs::write(&results, json).await?;

        let errors = self.errors_path(report);
        match report.error_log() {
            Some(log) => tokio::fs::write(&errors, log).await?,
            // A clean run must not leave a stale log from an earlier one
            None => {
                if tokio::fs::try_exists(&errors).await.unwrap_or(false) {
                    tokio::fs::remove_file(&errors).await?;
                }
            },
        }
        info!("[Sink] Report {} written to {}", report.run_id, results.display());
        Ok(())
    }
}

/// Emits the summary and every error line through tracing.
pub struct LogSink;

#[async_trait]
impl ReportSink for LogSink {
    async fn deliver(&self, report: &ReconciliationReport) -> EngineResult<()> {
        info!(
            run_id = %report.run_id,
            node = %report.node,
            mode = %report.mode,
            "[Audit] {}",
            report.summary()
        );
        for error in report.errors.iter().filter(|e| !e.is_skip()) {
            warn!(run_id = %report.run_id, "[Audit] {}", error);
        }
        Ok(())
    }
}

/// Delivers to several sinks in order; the first failure is returned after
/// every sink has been tried.
pub struct MultiSink {
    sinks: Vec<Arc<dyn ReportSink>>,
}

impl MultiSink {
    pub fn new(sinks: Vec<Arc<dyn ReportSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl ReportSink for MultiSink {
    async fn deliver(&self, report: &ReconciliationReport) -> EngineResult<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.deliver(report).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rolesync_types::models::{NodeId, ReportError, SyncMode};

    #[tokio::test]
    async fn test_directory_sink_writes_both_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path().join("reports"));
        let mut report = ReconciliationReport::new(NodeId::from("123"), SyncMode::Analyze);
        report.record_error(ReportError::Fatal { message: "boom".into() });

        sink.deliver(&report).await.unwrap();

        let json = std::fs::read_to_string(sink.results_path(&report)).unwrap();
        let parsed: ReconciliationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.run_id, report.run_id);
        let log = std::fs::read_to_string(sink.errors_path(&report)).unwrap();
        assert_eq!(log, "General error: boom");
    }

    #[tokio::test]
    async fn test_clean_run_has_no_error_log() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path());
        let mut report = ReconciliationReport::new(NodeId::from("123"), SyncMode::Force);
        report.record_error(ReportError::Fatal { message: "old".into() });
        sink.deliver(&report).await.unwrap();

        report.errors.clear();
        sink.deliver(&report).await.unwrap();
        assert!(sink.results_path(&report).exists());
        assert!(!sink.errors_path(&report).exists());
    }
}
