//! Logging convenience wrappers.
//!
//! Maps the five operator-facing levels onto tracing. `success` has no
//! tracing level of its own; it is INFO tagged with `outcome = "success"`.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Success,
    Debug,
}

pub fn log(level: LogLevel, message: &str) {
    match level {
        LogLevel::Error => error!("{}", message),
        LogLevel::Warning => warn!("{}", message),
        LogLevel::Info => info!("{}", message),
        LogLevel::Success => info!(outcome = "success", "{}", message),
        LogLevel::Debug => debug!("{}", message),
    }
}

pub(crate) fn log_success(message: &str) {
    log(LogLevel::Success, message);
}

/// Logs an error together with the failure that caused it.
pub(crate) fn log_error(message: &str, cause: &dyn std::fmt::Display) {
    error!(error = %cause, "{}", message);
}
