//! # Threat Scenario Tests
//!
//! Guard scripts that behave like hostile dependencies.
//!
//! ## Scenarios Covered
//!
//! 1. **Combined Attacks**: several tamper vectors in one program
//! 2. **Repeat Offenders**: re-tampering after a restore
//! 3. **False Positive Resistance**: legitimate activity stays quiet
//! 4. **Edge Cases**: deletion, aliasing, failures mid-attack

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use patchtrap_core::{
    AlertKind, MemoryEnvironment, PatchTrap, PatchTrapConfig, RunReport, RunStatus,
};
use tempfile::TempDir;

async fn guard(body: &str, config: impl FnOnce(PatchTrapConfig) -> PatchTrapConfig) -> RunReport {
    let dir = TempDir::new().unwrap();
    let program: PathBuf = dir.path().join("guard.pt");
    std::fs::write(&program, body).unwrap();
    let config = config(
        PatchTrapConfig::default()
            .with_program(program)
            .with_interval(Duration::from_millis(10))
            .with_report_path(dir.path().join("report.json")),
    );
    PatchTrap::new(config)
        .unwrap()
        .with_environment(Arc::new(MemoryEnvironment::from_pairs([("PATH", "/usr/bin")])))
        .run()
        .await
        .unwrap()
}

// =============================================================================
// COMBINED ATTACK SCENARIOS
// =============================================================================

#[tokio::test]
async fn test_scenario_full_takeover() {
    let report = guard(
        "replace net.Socket builtin type\n\
         replace rand.random function 640053\n\
         hook insert 0 evil-finder\n\
         env set PATH /tmp/evil\n\
         env set LD_PRELOAD /tmp/evil.so\n",
        |c| c.with_interval(Duration::ZERO),
    )
    .await;

    assert_eq!(report.status, RunStatus::AlertsFound);
    assert_eq!(report.summary.target_replaced, 2);
    assert_eq!(report.summary.restored, 2);
    assert_eq!(report.summary.meta_path_tampered, 1);
    assert_eq!(report.summary.env_changed, 2);

    let hook = report.alerts_of(AlertKind::MetaPathTampered).next().unwrap();
    assert!(hook.detail.contains("evil-finder"));
}

#[tokio::test]
async fn test_scenario_alias_to_attacker_code() {
    let report = guard("alias io.open process.exit\n", |c| {
        c.with_interval(Duration::ZERO)
    })
    .await;

    let alert = report.alerts_of(AlertKind::TargetReplaced).next().unwrap();
    assert_eq!(alert.target, "io.open");
    assert!(alert.detail.contains("process.exit"));
    assert!(alert.restored);
}

// =============================================================================
// REPEAT OFFENDERS
// =============================================================================

#[tokio::test]
async fn test_scenario_retamper_after_restore() {
    // Each sleep leaves room for several periodic checks.
    let report = guard(
        "replace io.open builtin builtin_function\n\
         sleep 200\n\
         replace io.open builtin builtin_function\n",
        |c| c,
    )
    .await;

    assert_eq!(report.alerts_of(AlertKind::TargetReplaced).count(), 2);
    assert!(report.alerts.iter().all(|a| a.restored));
}

#[tokio::test]
async fn test_scenario_persistent_hook_change_reported_once() {
    let report = guard("hook reverse\nsleep 80\n", |c| c).await;
    assert_eq!(report.alerts_of(AlertKind::MetaPathTampered).count(), 1);
    assert!(report.checks > 1);
}

// =============================================================================
// FALSE POSITIVE RESISTANCE
// =============================================================================

#[tokio::test]
async fn test_scenario_unwatched_changes_are_ignored() {
    let report = guard(
        "replace io.read_to_end builtin builtin_function\ndelete rand.seed\n",
        |c| c,
    )
    .await;
    assert_eq!(report.status, RunStatus::Ok);
}

#[tokio::test]
async fn test_scenario_env_restored_by_program_is_quiet() {
    let report = guard(
        "env set PATH /tmp\nenv set PATH /usr/bin\n",
        |c| c.with_interval(Duration::ZERO),
    )
    .await;
    assert_eq!(report.status, RunStatus::Ok);
}

// =============================================================================
// EDGE CASES
// =============================================================================

#[tokio::test]
async fn test_scenario_deleted_class_restored() {
    let report = guard("delete net.Socket\n", |c| c.with_interval(Duration::ZERO)).await;
    let alert = report.alerts_of(AlertKind::TargetReplaced).next().unwrap();
    assert_eq!(alert.detail, "missing");
    assert!(alert.restored);
}

#[tokio::test]
async fn test_scenario_attack_then_crash() {
    let report = guard(
        "replace rand.random builtin builtin_function\nfail crashed on purpose\n",
        |c| c.with_interval(Duration::ZERO),
    )
    .await;

    assert_eq!(report.status, RunStatus::GuardedProgramFailed);
    assert_eq!(report.summary.target_replaced, 1);
    assert_eq!(report.failure.as_ref().unwrap().message, "line 2: crashed on purpose");
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn test_scenario_no_restore_mode() {
    let report = guard("replace io.open builtin builtin_function\n", |c| {
        c.with_interval(Duration::ZERO).with_auto_restore(false)
    })
    .await;
    assert_eq!(report.summary.restore_failed, 1);
    assert_eq!(report.exit_code(), 2);
}
