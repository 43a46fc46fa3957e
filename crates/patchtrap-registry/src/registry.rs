//! # Sealing Registry
//!
//! Resolves the watch-list, pins every original reference and records the
//! baselines later checks are compared against.
//!
//! ## Threat Model
//!
//! | Threat | Defense |
//! |--------|---------|
//! | Replaced callable | Baseline fingerprint per target |
//! | Vanished callable | Re-resolution on every observation |
//! | Identity reuse | Original binding pinned for the run |
//! | Hijacked import hooks | Ordered hook-chain baseline |
//! | Environment poisoning | Environment baseline |
//!
//! ## Architecture
//!
//! ```text
//!                 ┌─────────────────────┐
//!   watch-list ──▶│   SealingRegistry   │
//!                 └──────────┬──────────┘
//!          ┌─────────────────┼──────────────────┐
//!          ▼                 ▼                  ▼
//!   ┌────────────┐   ┌──────────────┐   ┌──────────────┐
//!   │  Resolver  │   │ Fingerprint  │   │ Environment  │
//!   │ (namespace)│   │    Engine    │   │              │
//!   └────────────┘   └──────────────┘   └──────────────┘
//! ```
//!
//! ## Security Notes
//!
//! - Sealing never alters a watched target.
//! - An unresolvable or malformed entry is excluded with a [`SealWarning`];
//!   the run continues with the remainder.
//! - Baselines are read-only after sealing. The restore engine reads the
//!   pinned original but never mutates it.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::environment::{EnvSnapshot, Environment};
use crate::fingerprint::FingerprintEngine;
use crate::models::{Fingerprint, RefKind, SealWarning, TargetPath};
use crate::namespace::{Binding, ResolveError, Resolver};

/// Environment variables captured at seal time.
pub type EnvironmentBaseline = EnvSnapshot;

/// Hook identifiers captured at seal time, in resolution order.
pub type ImportHookBaseline = Vec<String>;

/// One sealed reference.
///
/// Owns a pinned clone of the original binding for the run's lifetime.
#[derive(Debug, Clone)]
pub struct WatchTarget {
    path: TargetPath,
    kind: RefKind,
    original: Binding,
    baseline: Fingerprint,
}

impl WatchTarget {
    /// The watched path (unique per registry).
    #[must_use]
    pub fn path(&self) -> &TargetPath {
        &self.path
    }

    /// Kind of the original reference.
    #[must_use]
    pub fn kind(&self) -> RefKind {
        self.kind
    }

    /// The pinned original reference.
    #[must_use]
    pub fn original(&self) -> &Binding {
        &self.original
    }

    /// Fingerprint taken at seal time.
    #[must_use]
    pub fn baseline(&self) -> &Fingerprint {
        &self.baseline
    }
}

/// Outcome of [`SealingRegistry::seal`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SealResult {
    /// Paths sealed, in watch-list order.
    pub sealed: Vec<String>,
    /// Entries excluded from monitoring.
    pub warnings: Vec<SealWarning>,
}

impl SealResult {
    /// Number of active watch targets.
    #[must_use]
    pub fn sealed_count(&self) -> usize {
        self.sealed.len()
    }
}

/// The current state of one watched path.
#[derive(Debug, Clone)]
pub enum Observation {
    /// The path resolves.
    Present {
        /// What is bound now.
        binding: Binding,
        /// Its fingerprint.
        fingerprint: Fingerprint,
    },
    /// The path no longer resolves.
    Missing {
        /// Why resolution failed.
        error: ResolveError,
    },
}

impl Observation {
    /// Whether this observation matches the target's baseline.
    #[must_use]
    pub fn matches(&self, target: &WatchTarget) -> bool {
        matches!(self, Observation::Present { fingerprint, .. } if fingerprint == target.baseline())
    }
}

/// The sealing registry.
///
/// # Thread Safety
///
/// `SealingRegistry` is `Send + Sync`, but check passes and restores must be
/// serialized by the caller; the guard supervisor holds it behind one mutex.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use patchtrap_registry::{
///     Binding, MemoryEnvironment, Module, Namespace, SealingRegistry,
/// };
///
/// let ns = Namespace::new();
/// ns.insert_module(Module::new("io").with_attr("open", Binding::builtin("io.open", "builtin_function")));
///
/// let mut registry = SealingRegistry::new(Arc::new(ns.clone()), Arc::new(MemoryEnvironment::new()));
/// let result = registry.seal(&["io.open", "io.missing"]);
///
/// assert_eq!(result.sealed, vec!["io.open".to_string()]);
/// assert_eq!(result.warnings.len(), 1);
/// ```
pub struct SealingRegistry {
    resolver: Arc<dyn Resolver>,
    environment: Arc<dyn Environment>,
    engine: FingerprintEngine,
    targets: Vec<WatchTarget>,
    env_baseline: EnvironmentBaseline,
    hook_baseline: ImportHookBaseline,
}

impl SealingRegistry {
    /// Creates an unsealed registry over the given capabilities.
    pub fn new(resolver: Arc<dyn Resolver>, environment: Arc<dyn Environment>) -> Self {
        Self {
            resolver,
            environment,
            engine: FingerprintEngine::new(),
            targets: Vec::new(),
            env_baseline: EnvironmentBaseline::new(),
            hook_baseline: ImportHookBaseline::new(),
        }
    }

    /// Replaces the fingerprint engine. Call before sealing.
    #[must_use]
    pub fn with_engine(mut self, engine: FingerprintEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Seals the watch-list.
    ///
    /// For each path: parse, resolve, classify, fingerprint and pin. The
    /// environment and hook chain are captured in the same call. Sealing
    /// again discards the previous seal.
    pub fn seal<S: AsRef<str>>(&mut self, watch_paths: &[S]) -> SealResult {
        self.targets.clear();
        let mut result = SealResult::default();
        let mut seen = HashSet::new();

        for raw in watch_paths {
            let raw = raw.as_ref().trim();
            let path = match TargetPath::parse(raw) {
                Ok(path) => path,
                Err(e) => {
                    warn!(target_path = raw, error = %e, "Excluding malformed watch target");
                    result.warnings.push(SealWarning {
                        target: raw.to_string(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            if !seen.insert(path.clone()) {
                warn!(target_path = %path, "Excluding duplicate watch target");
                result.warnings.push(SealWarning {
                    target: raw.to_string(),
                    reason: "duplicate target".to_string(),
                });
                continue;
            }
            match self.resolver.resolve(&path) {
                Ok(original) => {
                    let kind = original.kind();
                    let baseline = self.engine.fingerprint(&original);
                    debug!(
                        target_path = %path,
                        %kind,
                        strategy = baseline.strategy(),
                        fingerprint = %baseline,
                        "Sealed target"
                    );
                    result.sealed.push(path.to_string());
                    self.targets.push(WatchTarget {
                        path,
                        kind,
                        original,
                        baseline,
                    });
                }
                Err(e) => {
                    warn!(target_path = %path, error = %e, "Excluding unresolvable watch target");
                    result.warnings.push(SealWarning {
                        target: path.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        self.env_baseline = self.environment.snapshot();
        self.hook_baseline = self.resolver.hook_chain();

        info!(
            sealed = result.sealed.len(),
            warnings = result.warnings.len(),
            env_vars = self.env_baseline.len(),
            hooks = self.hook_baseline.len(),
            "Seal complete"
        );
        result
    }

    /// Active watch targets, in watch-list order.
    #[must_use]
    pub fn targets(&self) -> &[WatchTarget] {
        &self.targets
    }

    /// Looks up a sealed target by path.
    #[must_use]
    pub fn target(&self, path: &str) -> Option<&WatchTarget> {
        self.targets.iter().find(|t| t.path.to_string() == path)
    }

    /// Environment captured at seal time.
    #[must_use]
    pub fn env_baseline(&self) -> &EnvironmentBaseline {
        &self.env_baseline
    }

    /// Hook chain captured at seal time.
    #[must_use]
    pub fn hook_baseline(&self) -> &ImportHookBaseline {
        &self.hook_baseline
    }

    /// Re-resolves and re-fingerprints one target.
    #[must_use]
    pub fn observe(&self, target: &WatchTarget) -> Observation {
        match self.resolver.resolve(target.path()) {
            Ok(binding) => {
                let fingerprint = self.engine.fingerprint(&binding);
                Observation::Present {
                    binding,
                    fingerprint,
                }
            }
            Err(error) => Observation::Missing { error },
        }
    }

    /// Current hook chain.
    #[must_use]
    pub fn current_hooks(&self) -> Vec<String> {
        self.resolver.hook_chain()
    }

    /// Current environment.
    #[must_use]
    pub fn current_env(&self) -> EnvSnapshot {
        self.environment.snapshot()
    }

    pub(crate) fn resolver(&self) -> &dyn Resolver {
        self.resolver.as_ref()
    }
}

impl std::fmt::Debug for SealingRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealingRegistry")
            .field("targets", &self.targets.len())
            .field("env_baseline", &self.env_baseline.len())
            .field("hook_baseline", &self.hook_baseline)
            .field("engine", &self.engine)
            .finish()
    }
}
