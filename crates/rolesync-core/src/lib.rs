//! # rolesync Core
//!
//! Role reconciliation engine: keeps equivalent roles aligned between one
//! main node and any number of synced nodes.
//!
//! ## Layout
//!
//! ```text
//! rolesync-core/src/
//! ├── adapter/       # NodeAdapter trait, REST adapter, in-memory adapter (tests)
//! ├── registry.rs    # Sync ID mapping registry (immutable snapshot + handle)
//! ├── cache.rs       # TTL role catalog cache
//! ├── executor.rs    # throttle-aware retry with exponential backoff
//! ├── batch.rs       # paced member iteration with progress notices
//! ├── diff.rs        # role diff + target-side checks
//! ├── policy.rs      # AnalyzeOnly / ForceSync
//! ├── echo_guard.rs  # per-(member, node, role) echo suppression
//! ├── propagator.rs  # event-driven propagation
//! ├── audit.rs       # on-demand full reconciliation
//! ├── commands.rs    # add/remove a role on every node
//! ├── auth.rs        # who may run commands
//! ├── sink.rs        # report artifacts
//! └── engine.rs      # SyncEngine, wires everything together
//! ```

#![allow(
    clippy::significant_drop_tightening,
    reason = "RwLock guards in async code require careful lifetime management"
)]
#![allow(clippy::needless_continue, reason = "Explicit continue improves loop readability")]
#![allow(clippy::implicit_clone, reason = "Explicit .clone() vs .to_string() is stylistic")]
#![cfg_attr(
    test,
    allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::indexing_slicing,
        clippy::assertions_on_result_states
    )
)]

pub mod adapter;
pub mod audit;
pub mod auth;
pub mod batch;
pub mod cache;
pub mod commands;
pub mod config;
pub mod diff;
pub mod echo_guard;
pub mod engine;
pub mod error;
pub mod executor;
pub mod logger;
pub mod policy;
pub mod propagator;
pub mod registry;
pub mod sink;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use adapter::{HttpNodeAdapter, NodeAdapter};
pub use audit::AuditRequest;
pub use commands::{CommandOutcome, NodeLine};
pub use config::load_config;
pub use engine::{EngineStatus, SyncEngine, EVENT_CHANNEL_CAPACITY};
pub use error::{EngineError, EngineResult};
pub use propagator::PropagationOutcome;
pub use sink::{DirectorySink, LogSink, MultiSink, ReportSink};
