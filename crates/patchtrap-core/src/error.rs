//! Error types for PatchTrap Core.

use thiserror::Error;

/// Core error type for PatchTrap operations.
///
/// Guarded-program failures are not errors; they are reported in the
/// [`RunReport`](patchtrap_monitor::RunReport).
#[derive(Debug, Error)]
pub enum PatchTrapError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// No program to guard.
    #[error("no program given")]
    MissingProgram,

    /// I/O error (report writing, working directory).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Registry error passthrough.
    #[error("Registry error: {0}")]
    Registry(#[from] patchtrap_registry::RegistryError),

    /// Monitor error passthrough.
    #[error("Monitor error: {0}")]
    Monitor(#[from] patchtrap_monitor::MonitorError),
}
