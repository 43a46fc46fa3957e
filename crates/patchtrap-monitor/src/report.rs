//! # Run Report
//!
//! The structured record of one guarded run. Alerts accumulate through a
//! [`ReportBuilder`] while the run is in progress; [`ReportBuilder::finish`]
//! decides the final status.
//!
//! ## Status Rules
//!
//! ```text
//! program failed ─────────────▶ GUARDED_PROGRAM_FAILED
//! otherwise, any alert ───────▶ ALERTS_FOUND
//! otherwise ──────────────────▶ OK
//! ```
//!
//! A program failure never suppresses alerts; both are reported.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use uuid::Uuid;

use patchtrap_registry::{SealResult, SealWarning};

use crate::alert::{Alert, AlertKind};
use crate::error::Result;
use crate::loader::ProgramFailure;

/// Exit status for a run with an unrestored replaced target.
pub const EXIT_UNRESTORED: i32 = 2;

/// Final status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// No alerts, program completed.
    Ok,
    /// At least one alert, program completed.
    AlertsFound,
    /// The guarded program failed.
    GuardedProgramFailed,
}

/// Alert counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// `TARGET_REPLACED` alerts.
    pub target_replaced: usize,
    /// `META_PATH_TAMPERED` alerts.
    pub meta_path_tampered: usize,
    /// `ENV_CHANGED` alerts.
    pub env_changed: usize,
    /// Replaced targets put back.
    pub restored: usize,
    /// Replaced targets left tampered.
    pub restore_failed: usize,
}

impl Summary {
    /// Tallies a list of alerts.
    pub fn from_alerts(alerts: &[Alert]) -> Self {
        let mut summary = Self::default();
        for alert in alerts {
            match alert.kind {
                AlertKind::TargetReplaced => {
                    summary.target_replaced += 1;
                    if alert.restored {
                        summary.restored += 1;
                    } else {
                        summary.restore_failed += 1;
                    }
                }
                AlertKind::MetaPathTampered => summary.meta_path_tampered += 1,
                AlertKind::EnvChanged => summary.env_changed += 1,
            }
        }
        summary
    }

    /// Total alert count.
    pub fn total(&self) -> usize {
        self.target_replaced + self.meta_path_tampered + self.env_changed
    }
}

/// The complete record of a guarded run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique id for this run.
    pub run_id: Uuid,
    /// Final status.
    pub status: RunStatus,
    /// The guarded program.
    pub program: PathBuf,
    /// Arguments passed to it.
    pub args: Vec<String>,
    /// Whether replaced targets were restored.
    pub auto_restore: bool,
    /// Periodic check interval; 0 means final check only.
    pub interval_ms: u64,
    /// Number of targets sealed.
    pub sealed_targets: usize,
    /// Paths sealed, in watch-list order.
    pub targets: Vec<String>,
    /// Seal-time warnings.
    pub warnings: Vec<SealWarning>,
    /// Wall-clock start.
    pub started_at: DateTime<Utc>,
    /// Wall-clock end.
    pub finished_at: DateTime<Utc>,
    /// Run duration in milliseconds.
    pub duration_ms: u64,
    /// Check passes performed, final check included.
    pub checks: u64,
    /// Set when the guarded program failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<ProgramFailure>,
    /// Alerts in the order they were raised.
    pub alerts: Vec<Alert>,
    /// Alert counts.
    pub summary: Summary,
}

impl RunReport {
    /// Process exit status for this run.
    ///
    /// - `OK` and fully restored `ALERTS_FOUND`: 0
    /// - `ALERTS_FOUND` with an unrestored target: [`EXIT_UNRESTORED`]
    /// - `GUARDED_PROGRAM_FAILED`: the program's own non-zero code, else 1
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self.status {
            RunStatus::Ok => 0,
            RunStatus::AlertsFound if self.summary.restore_failed > 0 => EXIT_UNRESTORED,
            RunStatus::AlertsFound => 0,
            RunStatus::GuardedProgramFailed => self
                .failure
                .as_ref()
                .and_then(|f| f.exit_code)
                .filter(|code| *code != 0)
                .unwrap_or(1),
        }
    }

    /// Alerts of one kind.
    pub fn alerts_of(&self, kind: AlertKind) -> impl Iterator<Item = &Alert> {
        self.alerts.iter().filter(move |a| a.kind == kind)
    }

    /// Pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Accumulates a report while a run is in progress.
#[derive(Debug)]
pub struct ReportBuilder {
    run_id: Uuid,
    program: PathBuf,
    args: Vec<String>,
    auto_restore: bool,
    interval: Duration,
    sealed: Vec<String>,
    warnings: Vec<SealWarning>,
    started_at: DateTime<Utc>,
    started: Instant,
    checks: u64,
    alerts: Vec<Alert>,
}

impl ReportBuilder {
    /// Starts a report; the clock starts now.
    pub fn new(
        program: impl Into<PathBuf>,
        args: Vec<String>,
        auto_restore: bool,
        interval: Duration,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            program: program.into(),
            args,
            auto_restore,
            interval,
            sealed: Vec::new(),
            warnings: Vec::new(),
            started_at: Utc::now(),
            started: Instant::now(),
            checks: 0,
            alerts: Vec::new(),
        }
    }

    /// Records the seal outcome.
    pub fn record_seal(&mut self, seal: &SealResult) {
        self.sealed = seal.sealed.clone();
        self.warnings = seal.warnings.clone();
    }

    /// Counts one completed check pass.
    pub fn record_check(&mut self) {
        self.checks += 1;
    }

    /// Appends an alert.
    pub fn push(&mut self, alert: Alert) {
        self.alerts.push(alert);
    }

    /// Alerts so far.
    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    /// Run id.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Closes the report with the program's outcome.
    pub fn finish(self, outcome: std::result::Result<(), ProgramFailure>) -> RunReport {
        let failure = outcome.err();
        let status = match (&failure, self.alerts.is_empty()) {
            (Some(_), _) => RunStatus::GuardedProgramFailed,
            (None, false) => RunStatus::AlertsFound,
            (None, true) => RunStatus::Ok,
        };
        let summary = Summary::from_alerts(&self.alerts);

        RunReport {
            run_id: self.run_id,
            status,
            program: self.program,
            args: self.args,
            auto_restore: self.auto_restore,
            interval_ms: u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            sealed_targets: self.sealed.len(),
            targets: self.sealed,
            warnings: self.warnings,
            started_at: self.started_at,
            finished_at: Utc::now(),
            duration_ms: u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX),
            checks: self.checks,
            failure,
            alerts: self.alerts,
            summary,
        }
    }
}
