//! Error types for the guard supervisor.
//!
//! Only faults in the monitor itself surface here. Guarded-program failures,
//! unresolvable targets and failed restores are recorded in the run report.

use thiserror::Error;

/// Result type alias for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Faults fatal to a monitoring run.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The periodic check task failed (panicked or was cancelled).
    #[error("periodic check task failed: {0}")]
    CheckTask(#[from] tokio::task::JoinError),

    /// Check state was still shared when the run finished.
    #[error("invalid supervisor state: {0}")]
    InvalidState(String),

    /// The report could not be serialized.
    #[error("report serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
