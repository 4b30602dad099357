//! Application State
//!
//! Shared by every handler: the engine, the sender side of the event
//! channel, and the config path used by reloads.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

use rolesync_core::SyncEngine;
use rolesync_types::models::MemberEvent;

#[derive(Clone)]
pub struct AppState {
    pub(crate) inner: Arc<AppStateInner>,
}

pub struct AppStateInner {
    pub engine: Arc<SyncEngine>,
    pub events: mpsc::Sender<MemberEvent>,
    pub config_path: PathBuf,
}

impl AppState {
    pub fn new(
        engine: Arc<SyncEngine>,
        events: mpsc::Sender<MemberEvent>,
        config_path: PathBuf,
    ) -> Self {
        Self { inner: Arc::new(AppStateInner { engine, events, config_path }) }
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.inner.engine
    }

    pub fn config_path(&self) -> &Path {
        &self.inner.config_path
    }

    /// Queues an event for the propagation loop. Fails once the loop has
    /// stopped.
    pub async fn enqueue(&self, event: MemberEvent) -> Result<(), MemberEvent> {
        self.inner.events.send(event).await.map_err(|e| e.0)
    }
}
