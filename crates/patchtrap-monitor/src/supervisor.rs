//! # Guard Supervisor
//!
//! Seals the watch list, runs the guarded program, and re-checks every
//! watched reference while it runs and once more after it ends.
//!
//! ## Architecture
//!
//! ```text
//!            ┌────────────────────────────────────────────┐
//!            │              GUARD SUPERVISOR              │
//!            └────────────────────────────────────────────┘
//!  seal ──▶ ┌────────────────┐        ┌─────────────────────┐
//!           │ blocking pool  │        │ periodic check task │
//!           │                │        │                     │
//!           │ loader.run()   │        │ every `interval`:   │
//!           │                │        │   lock ─▶ check     │
//!           └───────┬────────┘        └──────────▲──────────┘
//!                   │ finished                   │ stop (oneshot)
//!                   └────────────────────────────┘
//!                               │ join
//!                               ▼
//!                   final check ─▶ RunReport
//! ```
//!
//! ## Lifecycle
//!
//! `IDLE → SEALING → RUNNING → FINAL_CHECK → DONE`, published on a
//! `tokio::sync::watch` channel.
//!
//! ## Concurrency
//!
//! All check state (registry, classifier, report) lives behind one async
//! mutex. A check pass and a restore never run concurrently with another
//! check pass, and the final check starts only after the periodic task has
//! been joined.
//!
//! ## Security Notes
//!
//! - Detection is sampling-based: a change made and reverted between two
//!   passes is not seen.
//! - The final check always runs, even when the program fails or panics.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use patchtrap_registry::SealingRegistry;

use crate::diff::{diff_target, Classifier};
use crate::error::{MonitorError, Result};
use crate::loader::{ProgramFailure, ProgramLoader};
use crate::report::{ReportBuilder, RunReport};

/// Default periodic check interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(250);

/// Supervisor lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuardState {
    /// Not started.
    Idle,
    /// Sealing the watch list.
    Sealing,
    /// Guarded program running.
    Running,
    /// Program finished, final check in progress.
    FinalCheck,
    /// Report complete.
    Done,
}

/// Supervisor configuration.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use patchtrap_monitor::SupervisorConfig;
///
/// let config = SupervisorConfig::new()
///     .with_interval(Duration::from_millis(50))
///     .with_auto_restore(false);
/// assert!(!config.auto_restore);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Time between periodic checks. Zero disables them.
    pub interval: Duration,
    /// Restore replaced targets after alerting.
    pub auto_restore: bool,
}

impl SupervisorConfig {
    /// Defaults: 250ms interval, auto-restore on.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the periodic check interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Enables or disables auto-restore.
    #[must_use]
    pub fn with_auto_restore(mut self, enabled: bool) -> Self {
        self.auto_restore = enabled;
        self
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            auto_restore: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum CheckPhase {
    Periodic,
    Final,
}

impl fmt::Display for CheckPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckPhase::Periodic => f.write_str("periodic"),
            CheckPhase::Final => f.write_str("final"),
        }
    }
}

/// Everything a check pass touches.
struct CheckState {
    registry: SealingRegistry,
    classifier: Classifier,
    report: ReportBuilder,
    auto_restore: bool,
}

impl CheckState {
    fn check(&mut self, phase: CheckPhase) {
        let before = self.report.alerts().len();

        for target in self.registry.targets() {
            let observation = self.registry.observe(target);
            let Some(mut alert) = diff_target(target, &observation) else {
                continue;
            };
            if self.auto_restore {
                alert.record_restore(self.registry.restore(target));
            }
            warn!(
                target = %alert.target,
                restored = alert.restored,
                detail = %alert.detail,
                "TARGET_REPLACED"
            );
            self.report.push(alert);
        }

        let hooks = self.registry.current_hooks();
        if let Some(alert) = self
            .classifier
            .classify_hooks(self.registry.hook_baseline(), hooks)
        {
            warn!(detail = %alert.detail, "META_PATH_TAMPERED");
            self.report.push(alert);
        }

        let env = self.registry.current_env();
        for alert in self.classifier.classify_env(self.registry.env_baseline(), env) {
            warn!(key = %alert.target, detail = %alert.detail, "ENV_CHANGED");
            self.report.push(alert);
        }

        self.report.record_check();
        debug!(
            %phase,
            new_alerts = self.report.alerts().len() - before,
            "Check pass complete"
        );
    }
}

/// Runs one guarded program under observation.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use patchtrap_monitor::{GuardSupervisor, ProgramFailure, RunStatus, SupervisorConfig};
/// use patchtrap_registry::{Binding, MemoryEnvironment, Module, Namespace, SealingRegistry};
///
/// # #[tokio::main]
/// # async fn main() {
/// let ns = Namespace::new();
/// ns.insert_module(Module::new("io").with_attr("open", Binding::builtin("io.open", "builtin_function")));
/// let registry = SealingRegistry::new(Arc::new(ns), Arc::new(MemoryEnvironment::new()));
///
/// let supervisor = GuardSupervisor::new(registry, vec!["io.open".into()], SupervisorConfig::new());
/// let loader = |_: &std::path::Path, _: &[String]| -> Result<(), ProgramFailure> { Ok(()) };
/// let report = supervisor.run(Arc::new(loader), "noop".into(), vec![]).await.unwrap();
/// assert_eq!(report.status, RunStatus::Ok);
/// # }
/// ```
pub struct GuardSupervisor {
    registry: SealingRegistry,
    watch_list: Vec<String>,
    config: SupervisorConfig,
    state: watch::Sender<GuardState>,
}

impl GuardSupervisor {
    /// Creates a supervisor. Nothing is sealed until [`run`](Self::run).
    pub fn new(registry: SealingRegistry, watch_list: Vec<String>, config: SupervisorConfig) -> Self {
        let (state, _) = watch::channel(GuardState::Idle);
        Self {
            registry,
            watch_list,
            config,
            state,
        }
    }

    /// Subscribes to lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<GuardState> {
        self.state.subscribe()
    }

    /// Seals, runs the program, checks, and returns the report.
    ///
    /// Program failures and panics are captured in the report.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError`] only if the monitor itself fails.
    pub async fn run(
        mut self,
        loader: Arc<dyn ProgramLoader>,
        program: PathBuf,
        args: Vec<String>,
    ) -> Result<RunReport> {
        publish(&self.state, GuardState::Sealing);
        let seal = self.registry.seal(&self.watch_list);
        for warning in &seal.warnings {
            warn!(target = %warning.target, reason = %warning.reason, "Watch target skipped");
        }
        info!(
            sealed = seal.sealed_count(),
            skipped = seal.warnings.len(),
            program = %program.display(),
            "Watch list sealed"
        );

        let mut report = ReportBuilder::new(
            program.clone(),
            args.clone(),
            self.config.auto_restore,
            self.config.interval,
        );
        report.record_seal(&seal);

        let GuardSupervisor {
            registry,
            config,
            state,
            ..
        } = self;
        let classifier = Classifier::new(registry.hook_baseline(), registry.env_baseline());
        let checks = Arc::new(Mutex::new(CheckState {
            registry,
            classifier,
            report,
            auto_restore: config.auto_restore,
        }));

        publish(&state, GuardState::Running);

        let periodic = if config.interval.is_zero() {
            None
        } else {
            let (stop_tx, stop_rx) = oneshot::channel();
            let handle = tokio::spawn(periodic_checks(
                Arc::clone(&checks),
                config.interval,
                stop_rx,
            ));
            Some((stop_tx, handle))
        };

        let program_task = tokio::task::spawn_blocking(move || loader.run(&program, &args));
        let outcome = match program_task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => Err(ProgramFailure::new(format!(
                "guarded program panicked: {}",
                panic_message(e.into_panic())
            ))),
            Err(e) => Err(ProgramFailure::new(format!("guarded program aborted: {}", e))),
        };
        if let Err(failure) = &outcome {
            warn!(exit_code = ?failure.exit_code, message = %failure.message, "Guarded program failed");
        }

        if let Some((stop_tx, handle)) = periodic {
            // The task may already be gone; the join below reports why.
            let _ = stop_tx.send(());
            handle.await?;
        }

        publish(&state, GuardState::FinalCheck);
        checks.lock().await.check(CheckPhase::Final);

        let checks = Arc::try_unwrap(checks)
            .map_err(|_| MonitorError::InvalidState("check state still shared".to_string()))?
            .into_inner();
        let report = checks.report.finish(outcome);

        publish(&state, GuardState::Done);
        info!(
            run_id = %report.run_id,
            status = ?report.status,
            alerts = report.alerts.len(),
            checks = report.checks,
            duration_ms = report.duration_ms,
            "Guarded run complete"
        );
        Ok(report)
    }
}

fn publish(state: &watch::Sender<GuardState>, next: GuardState) {
    debug!(state = ?next, "Guard state");
    state.send_replace(next);
}

async fn periodic_checks(
    checks: Arc<Mutex<CheckState>>,
    interval: Duration,
    mut stop: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = &mut stop => break,
            _ = ticker.tick() => checks.lock().await.check(CheckPhase::Periodic),
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = SupervisorConfig::default();
        assert_eq!(config.interval, Duration::from_millis(250));
        assert!(config.auto_restore);
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new("boom".to_string())), "boom");
        assert_eq!(panic_message(Box::new(7_u8)), "unknown panic payload");
    }
}
