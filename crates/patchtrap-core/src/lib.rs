//! # PatchTrap Core
//!
//! Runtime monkey-patch guard. Seals a watch list of callable references,
//! runs a guarded program, and reports (and optionally reverts) every
//! replacement, import-hook change and environment change it observes.
//!
//! ## Threat Coverage
//!
//! | Layer | Component | Threats Detected |
//! |-------|-----------|------------------|
//! | References | Sealing Registry | Rebinding, in-place code swaps, deletion |
//! | Import system | Hook baseline | Inserted, removed or reordered hooks |
//! | Process | Environment baseline | Added, removed or changed variables |
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        PATCHTRAP CORE                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │                    ┌─────────────────┐                          │
//! │                    │    PatchTrap    │  ← Unified Facade        │
//! │                    └────────┬────────┘                          │
//! │                             │                                   │
//! │         ┌───────────────────┼───────────────────┐               │
//! │         ▼                   ▼                   ▼               │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐          │
//! │  │  Sealing    │    │   Guard     │    │  Program    │          │
//! │  │  Registry   │    │ Supervisor  │    │  Loaders    │          │
//! │  └─────────────┘    └─────────────┘    └─────────────┘          │
//! │                                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use patchtrap_core::{PatchTrap, PatchTrapConfig};
//!
//! let config = PatchTrapConfig::from_file("patchtrap.json")?.with_program("guard.pt");
//! let trap = PatchTrap::new(config)?;
//! let report = trap.run().await?;
//! trap.write_report(&report)?;
//! std::process::exit(report.exit_code());
//! ```
//!
//! ## Security Notes
//!
//! - Checks are sampling-based; the final check after the program ends
//!   always runs.
//! - Only `TARGET_REPLACED` is ever reverted. Hook and environment changes
//!   are reported, not undone.
//! - A program failure never hides alerts.

mod config;
mod error;
mod loader;
mod patchtrap;
mod prelude;
mod script;

pub use config::{
    interval_from_secs, parse_watch_list, LoaderKind, PatchTrapConfig, DEFAULT_INTERVAL_MS,
    DEFAULT_REPORT_PATH, DEFAULT_WATCH,
};
pub use error::PatchTrapError;
pub use loader::{ProcessLoader, ScriptLoader};
pub use patchtrap::{write_report, PatchTrap};
pub use prelude::{prelude, prelude_manifest};
pub use script::{GuardScript, ScriptCommand, ScriptError};

// Re-export component types for convenience
pub use patchtrap_monitor::{
    Alert, AlertKind, GuardState, ProgramFailure, ProgramLoader, RunReport, RunStatus, Summary,
};
pub use patchtrap_registry::{
    Environment, MemoryEnvironment, Namespace, ProcessEnvironment, RefKind, Resolver, TargetPath,
};

/// Core result type for PatchTrap operations.
pub type Result<T> = std::result::Result<T, PatchTrapError>;

#[cfg(test)]
mod tests;
