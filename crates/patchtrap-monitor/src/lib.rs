//! # PatchTrap Monitor - Guard Supervisor
//!
//! Runs a guarded program against a sealed registry and reports every
//! observed change to a watched reference, the import-hook chain, or the
//! process environment.
//!
//! ## Components
//!
//! - [`GuardSupervisor`]: seal, run, periodic checks, final check
//! - [`Classifier`] and the `diff_*` functions: observations to alerts
//! - [`ReportBuilder`] / [`RunReport`]: the structured run record
//! - [`ProgramLoader`]: how the guarded program is executed
//!
//! ## Alert Kinds
//!
//! | Kind | Target | Restorable |
//! |------|--------|------------|
//! | `TARGET_REPLACED` | watched path | yes |
//! | `META_PATH_TAMPERED` | `meta_path` | no |
//! | `ENV_CHANGED` | variable name | no |
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use patchtrap_monitor::{AlertKind, GuardSupervisor, ProgramFailure, SupervisorConfig};
//! use patchtrap_registry::{Binding, MemoryEnvironment, Module, Namespace, Resolver, SealingRegistry};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let ns = Namespace::new();
//! ns.insert_module(Module::new("io").with_attr("open", Binding::builtin("io.open", "builtin_function")));
//! let registry = SealingRegistry::new(Arc::new(ns.clone()), Arc::new(MemoryEnvironment::new()));
//!
//! let tamper = ns.clone();
//! let loader = move |_: &std::path::Path, _: &[String]| -> Result<(), ProgramFailure> {
//!     let path = "io.open".parse().unwrap();
//!     tamper.rebind(&path, Binding::builtin("evil.open", "builtin_function")).unwrap();
//!     Ok(())
//! };
//!
//! let config = SupervisorConfig::new().with_interval(Duration::ZERO);
//! let supervisor = GuardSupervisor::new(registry, vec!["io.open".into()], config);
//! let report = supervisor.run(Arc::new(loader), "guard".into(), vec![]).await.unwrap();
//!
//! assert_eq!(report.alerts.len(), 1);
//! assert_eq!(report.alerts[0].kind, AlertKind::TargetReplaced);
//! assert!(report.alerts[0].restored);
//! # }
//! ```

pub mod alert;
pub mod diff;
pub mod error;
pub mod loader;
pub mod report;
pub mod supervisor;

pub use alert::{Alert, AlertKind, EnvChange, META_PATH_TARGET};
pub use diff::{diff_env, diff_hooks, diff_target, Classifier};
pub use error::{MonitorError, Result};
pub use loader::{ProgramFailure, ProgramLoader};
pub use report::{ReportBuilder, RunReport, RunStatus, Summary, EXIT_UNRESTORED};
pub use supervisor::{GuardState, GuardSupervisor, SupervisorConfig, DEFAULT_INTERVAL};
