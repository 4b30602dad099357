//! Core domain models for rolesync.
//!
//! This module contains all shared data structures used across the workspace.

mod config;
mod event;
mod ids;
mod member;
mod node;
mod report;
mod role;

// Re-export all models
pub use config::{
    AccessConfig, ApiConfig, AppConfig, EngineConfig, NodeConfig, ReportConfig, RoleMapping,
    SyncDirection,
};
pub use event::{MemberEvent, MemberEventKind};
pub use ids::{MemberId, NodeId, RoleId, SyncId};
pub use member::Member;
pub use node::{NodeInfo, NodeKind};
pub use report::{
    MemberDifference, NodeChange, NodeDifference, ReconciliationReport, ReportError, SyncMode,
    UnresolvedRole,
};
pub use role::Role;
