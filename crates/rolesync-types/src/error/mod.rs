//! Typed error definitions for rolesync.
//!
//! This module provides a structured error hierarchy with specific error types
//! for different domains. All errors are designed to be:
//!
//! - **Serializable** for API responses and report artifacts via serde
//! - **Displayable** for logging via Display trait
//! - **Matchable** for retry and skip decisions via enum variants
//! - **Composable** via thiserror derive macros

mod config;
mod node;

pub use config::ConfigError;
pub use node::NodeError;
