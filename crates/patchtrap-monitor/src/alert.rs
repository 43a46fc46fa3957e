//! Alert records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use patchtrap_registry::RestoreError;

/// Alert target used for hook-chain alerts.
pub const META_PATH_TARGET: &str = "meta_path";

/// Category of a detected change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    /// A watched reference was replaced, edited or removed.
    TargetReplaced,
    /// The import-hook chain differs from the baseline.
    MetaPathTampered,
    /// An environment variable was added, removed or changed.
    EnvChanged,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlertKind::TargetReplaced => "TARGET_REPLACED",
            AlertKind::MetaPathTampered => "META_PATH_TAMPERED",
            AlertKind::EnvChanged => "ENV_CHANGED",
        };
        f.write_str(name)
    }
}

/// How one environment variable differs from the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvChange {
    /// Present now, absent at seal time.
    Added,
    /// Present at seal time, absent now.
    Removed,
    /// Present in both with different values.
    ValueChanged,
}

impl fmt::Display for EnvChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnvChange::Added => "added",
            EnvChange::Removed => "removed",
            EnvChange::ValueChanged => "value-changed",
        };
        f.write_str(name)
    }
}

/// One detected change.
///
/// `restored` is only meaningful for [`AlertKind::TargetReplaced`]; the other
/// kinds are never reverted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// What changed.
    pub kind: AlertKind,
    /// Watched path, environment key, or [`META_PATH_TARGET`].
    pub target: String,
    /// Human-readable description.
    pub detail: String,
    /// Whether the original reference was put back.
    pub restored: bool,
    /// When the change was observed.
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    fn new(kind: AlertKind, target: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            detail: detail.into(),
            restored: false,
            timestamp: Utc::now(),
        }
    }

    /// A watched reference no longer matches its baseline.
    pub fn target_replaced(path: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(AlertKind::TargetReplaced, path, detail)
    }

    /// The hook chain differs from its baseline.
    pub fn meta_path_tampered(detail: impl Into<String>) -> Self {
        Self::new(AlertKind::MetaPathTampered, META_PATH_TARGET, detail)
    }

    /// One environment variable differs from its baseline.
    pub fn env_changed(key: impl Into<String>, change: EnvChange) -> Self {
        let key = key.into();
        let detail = format!("environment variable '{}' {}", key, change);
        Self::new(AlertKind::EnvChanged, key, detail)
    }

    /// Records the outcome of a restore attempt.
    pub fn record_restore(&mut self, outcome: Result<(), RestoreError>) {
        match outcome {
            Ok(()) => self.restored = true,
            Err(e) => {
                self.restored = false;
                self.detail = format!("{}; restore failed: {}", self.detail, e);
            }
        }
    }
}
