//! # rolesync Types
//!
//! Core types, models, and error definitions for rolesync.
//!
//! This crate provides the foundational type system for the workspace:
//!
//! - **`error`** - Typed error hierarchy for node adapters and configuration
//! - **`models`** - Domain models (Node, Role, Member, events, reports, config)
//!
//! ## Architecture Role
//!
//! `rolesync-types` sits at the bottom of the dependency graph:
//!
//! ```text
//!          rolesync-types (this crate)
//!                  │
//!                  ▼
//!            rolesync-core
//!                  │
//!                  ▼
//!           rolesync-server
//! ```
//!
//! All types are designed to be:
//! - **Serializable** via serde for the HTTP API and report artifacts
//! - **Clone** for cheap sharing across async boundaries
//! - **PartialEq** for testing and comparison

pub mod error;
pub mod models;

// Re-export error types for convenience
pub use error::{ConfigError, NodeError};

// Re-export core model types
pub use models::{
    AppConfig, Member, MemberEvent, MemberId, NodeId, NodeInfo, NodeKind, ReconciliationReport,
    Role, RoleId, SyncDirection, SyncId, SyncMode,
};
