//! Configuration types for PatchTrap.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use patchtrap_monitor::SupervisorConfig;

use crate::error::PatchTrapError;
use crate::Result;

/// Watch list used when none is given.
pub const DEFAULT_WATCH: &[&str] = &["io.open", "net.Socket", "process.Command", "rand.random"];

/// Default periodic check interval in milliseconds.
pub const DEFAULT_INTERVAL_MS: u64 = 250;

/// Default report location.
pub const DEFAULT_REPORT_PATH: &str = "patchtrap_report.json";

/// How the guarded program is executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoaderKind {
    /// Guard script run in-process against the monitored namespace.
    #[default]
    Script,
    /// Child process.
    Process,
}

impl std::str::FromStr for LoaderKind {
    type Err = PatchTrapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "script" => Ok(LoaderKind::Script),
            "process" => Ok(LoaderKind::Process),
            other => Err(PatchTrapError::Config(format!(
                "unknown loader '{}' (expected script or process)",
                other
            ))),
        }
    }
}

/// Configuration for a guarded run.
///
/// Every field has a default, so a config file only needs the fields it
/// overrides.
///
/// # Example
///
/// ```rust
/// use patchtrap_core::PatchTrapConfig;
///
/// let config = PatchTrapConfig::from_json(r#"{"program": "guard.pt", "interval_ms": 0}"#)?
///     .with_watch(["io.open"])
///     .with_auto_restore(false);
///
/// assert_eq!(config.watch, vec!["io.open"]);
/// assert!(config.interval().is_zero());
/// # Ok::<(), patchtrap_core::PatchTrapError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchTrapConfig {
    /// Program to guard.
    pub program: Option<PathBuf>,

    /// Arguments passed to the program.
    pub args: Vec<String>,

    /// Dotted paths to seal.
    pub watch: Vec<String>,

    /// Restore replaced targets after alerting.
    pub auto_restore: bool,

    /// Periodic check interval; 0 checks only after the program ends.
    pub interval_ms: u64,

    /// Where the JSON report is written.
    pub report_path: PathBuf,

    /// Namespace manifest; the built-in prelude when absent.
    pub namespace_manifest: Option<PathBuf>,

    /// Program loader.
    pub loader: LoaderKind,
}

impl Default for PatchTrapConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            watch: DEFAULT_WATCH.iter().map(|s| s.to_string()).collect(),
            auto_restore: true,
            interval_ms: DEFAULT_INTERVAL_MS,
            report_path: PathBuf::from(DEFAULT_REPORT_PATH),
            namespace_manifest: None,
            loader: LoaderKind::Script,
        }
    }
}

impl PatchTrapConfig {
    /// Reads a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            PatchTrapError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    /// Parses JSON config text.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Sets the program.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    /// Sets the program arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the watch list.
    #[must_use]
    pub fn with_watch<I, S>(mut self, watch: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.watch = watch.into_iter().map(Into::into).collect();
        self
    }

    /// Enables or disables auto-restore.
    #[must_use]
    pub fn with_auto_restore(mut self, enabled: bool) -> Self {
        self.auto_restore = enabled;
        self
    }

    /// Sets the periodic check interval.
    ///
    /// A non-zero interval below one millisecond is rounded up to one, since
    /// `interval_ms = 0` disables periodic checks.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        let millis = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self.interval_ms = if millis == 0 && !interval.is_zero() {
            1
        } else {
            millis
        };
        self
    }

    /// Sets the report path.
    #[must_use]
    pub fn with_report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = path.into();
        self
    }

    /// Uses a namespace manifest instead of the prelude.
    #[must_use]
    pub fn with_namespace_manifest(mut self, path: impl Into<PathBuf>) -> Self {
        self.namespace_manifest = Some(path.into());
        self
    }

    /// Sets the loader.
    #[must_use]
    pub fn with_loader(mut self, loader: LoaderKind) -> Self {
        self.loader = loader;
        self
    }

    /// Periodic check interval.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Supervisor settings derived from this config.
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig::new()
            .with_interval(self.interval())
            .with_auto_restore(self.auto_restore)
    }
}

/// Splits a comma-separated watch list. Blank entries are dropped.
pub fn parse_watch_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Converts an interval in (fractional) seconds.
///
/// # Errors
///
/// Rejects negative and non-finite values.
pub fn interval_from_secs(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| PatchTrapError::Config(format!("invalid interval: {} seconds", secs)))
}
