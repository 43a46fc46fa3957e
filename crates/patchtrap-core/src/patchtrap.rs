//! The unified PatchTrap facade.
//!
//! [`PatchTrap`] wires a configuration to a namespace, an environment and a
//! program loader, runs the guard supervisor, and persists the report.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use patchtrap_monitor::{GuardSupervisor, ProgramLoader, RunReport};
use patchtrap_registry::{
    Environment, Namespace, NamespaceManifest, ProcessEnvironment, SealingRegistry,
};

use crate::config::{LoaderKind, PatchTrapConfig};
use crate::error::PatchTrapError;
use crate::loader::{ProcessLoader, ScriptLoader};
use crate::prelude::prelude;
use crate::Result;

/// The PatchTrap facade.
///
/// # Security Model
///
/// 1. Seal the configured watch list against the namespace
/// 2. Run the program through the configured loader
/// 3. Re-check periodically and once after the program ends
/// 4. Restore replaced targets (when enabled) and report everything
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::time::Duration;
/// use patchtrap_core::{PatchTrap, PatchTrapConfig, RunStatus};
/// use patchtrap_registry::MemoryEnvironment;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let dir = tempfile::TempDir::new()?;
/// let script = dir.path().join("guard.pt");
/// std::fs::write(&script, "replace rand.random builtin builtin_function\n")?;
///
/// let config = PatchTrapConfig::default()
///     .with_program(&script)
///     .with_interval(Duration::ZERO)
///     .with_report_path(dir.path().join("report.json"));
/// let trap = PatchTrap::new(config)?.with_environment(Arc::new(MemoryEnvironment::new()));
///
/// let report = trap.run().await?;
/// assert_eq!(report.status, RunStatus::AlertsFound);
/// trap.write_report(&report)?;
/// # Ok(())
/// # }
/// ```
pub struct PatchTrap {
    config: PatchTrapConfig,
    namespace: Namespace,
    environment: Arc<dyn Environment>,
}

impl PatchTrap {
    /// Creates the facade, loading the namespace manifest if one is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest cannot be read or built.
    pub fn new(config: PatchTrapConfig) -> Result<Self> {
        let namespace = match &config.namespace_manifest {
            Some(path) => {
                info!(manifest = %path.display(), "Loading namespace manifest");
                NamespaceManifest::from_file(path)?.build()?
            }
            None => prelude()?,
        };
        Ok(Self {
            config,
            namespace,
            environment: Arc::new(ProcessEnvironment),
        })
    }

    /// Uses the given namespace instead of the configured one.
    #[must_use]
    pub fn with_namespace(mut self, namespace: Namespace) -> Self {
        self.namespace = namespace;
        self
    }

    /// Uses the given environment instead of the process environment.
    #[must_use]
    pub fn with_environment(mut self, environment: Arc<dyn Environment>) -> Self {
        self.environment = environment;
        self
    }

    /// The configuration.
    pub fn config(&self) -> &PatchTrapConfig {
        &self.config
    }

    /// The monitored namespace.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// The loader selected by the configuration.
    pub fn loader(&self) -> Arc<dyn ProgramLoader> {
        match self.config.loader {
            LoaderKind::Script => Arc::new(ScriptLoader::new(
                self.namespace.clone(),
                Arc::clone(&self.environment),
            )),
            LoaderKind::Process => Arc::new(ProcessLoader),
        }
    }

    /// Runs the configured program under guard.
    ///
    /// # Errors
    ///
    /// Returns an error if no program is configured, the working directory
    /// is unavailable, or the monitor itself fails. Program failures are
    /// reported, not returned.
    pub async fn run(&self) -> Result<RunReport> {
        let program = self
            .config
            .program
            .as_deref()
            .ok_or(PatchTrapError::MissingProgram)?;
        self.run_with(self.loader(), program.to_path_buf()).await
    }

    /// Runs `program` through a caller-supplied loader.
    ///
    /// Relative paths are resolved against the working directory before the
    /// run starts.
    pub async fn run_with(
        &self,
        loader: Arc<dyn ProgramLoader>,
        program: PathBuf,
    ) -> Result<RunReport> {
        let program = absolute(&program)?;
        let registry = SealingRegistry::new(
            Arc::new(self.namespace.clone()),
            Arc::clone(&self.environment),
        );
        let supervisor = GuardSupervisor::new(
            registry,
            self.config.watch.clone(),
            self.config.supervisor_config(),
        );
        let report = supervisor
            .run(loader, program, self.config.args.clone())
            .await?;

        if report.summary.restore_failed > 0 {
            warn!(
                unrestored = report.summary.restore_failed,
                "Replaced targets left unrestored"
            );
        }
        Ok(report)
    }

    /// Writes the report as pretty JSON to the configured path.
    pub fn write_report(&self, report: &RunReport) -> Result<PathBuf> {
        write_report(report, &self.config.report_path)?;
        Ok(self.config.report_path.clone())
    }
}

/// Writes a report as pretty JSON, creating parent directories.
pub fn write_report(report: &RunReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = report.to_json_pretty()?;
    std::fs::write(path, json)?;
    info!(path = %path.display(), "Report written");
    Ok(())
}

fn absolute(program: &Path) -> Result<PathBuf> {
    if program.is_absolute() {
        Ok(program.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(program))
    }
}
