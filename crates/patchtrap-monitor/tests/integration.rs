//! # Integration Tests
//!
//! End-to-end runs of the guard supervisor against an in-memory namespace,
//! with closures standing in for guarded programs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use patchtrap_monitor::{
    AlertKind, GuardState, GuardSupervisor, ProgramFailure, RunReport, RunStatus,
    SupervisorConfig, EXIT_UNRESTORED,
};
use patchtrap_registry::{
    Binding, ClassDef, CodeObject, Environment, MemoryEnvironment, Module, Namespace, Resolver,
    SealingRegistry, TargetPath,
};
use serde_json::json;

// ============================================================================
// Helpers
// ============================================================================

fn namespace() -> Namespace {
    let ns = Namespace::new();
    ns.insert_module(
        Module::new("io")
            .with_attr("open", Binding::builtin("io.open", "builtin_function"))
            .with_attr(
                "read_to_end",
                Binding::function(
                    "io.read_to_end",
                    CodeObject::new(vec![0x01, 0x02]).with_constants(vec![json!(4096)]),
                ),
            ),
    );
    ns.insert_module(Module::new("net").with_attr(
        "Socket",
        Binding::class(ClassDef::new("net.Socket")),
    ));
    ns.push_hook("builtin-importer");
    ns.push_hook("path-finder");
    ns
}

fn path(raw: &str) -> TargetPath {
    raw.parse().unwrap()
}

fn evil() -> Binding {
    Binding::builtin("evil.open", "builtin_function")
}

async fn run_guarded<F>(
    ns: &Namespace,
    env: Arc<MemoryEnvironment>,
    watch: &[&str],
    config: SupervisorConfig,
    program: F,
) -> RunReport
where
    F: Fn(&std::path::Path, &[String]) -> Result<(), ProgramFailure> + Send + Sync + 'static,
{
    let registry = SealingRegistry::new(Arc::new(ns.clone()), env);
    let watch = watch.iter().map(|s| s.to_string()).collect();
    GuardSupervisor::new(registry, watch, config)
        .run(Arc::new(program), "guarded".into(), vec![])
        .await
        .unwrap()
}

fn final_only() -> SupervisorConfig {
    SupervisorConfig::new().with_interval(Duration::ZERO)
}

fn fast() -> SupervisorConfig {
    SupervisorConfig::new().with_interval(Duration::from_millis(10))
}

/// Blocks until `path` is bound to `original` again.
fn wait_for_restore(ns: &Namespace, path: &TargetPath, original: &Binding) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if let Ok(current) = ns.resolve(path) {
            if current.same_ref(original) {
                return;
            }
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!("{} was not restored", path);
}

// ============================================================================
// Clean Runs
// ============================================================================

#[tokio::test]
async fn test_clean_run_is_ok() {
    let ns = namespace();
    let report = run_guarded(
        &ns,
        Arc::new(MemoryEnvironment::new()),
        &["io.open", "io.read_to_end", "net.Socket"],
        fast(),
        |_, _| {
            std::thread::sleep(Duration::from_millis(40));
            Ok(())
        },
    )
    .await;

    assert_eq!(report.status, RunStatus::Ok);
    assert_eq!(report.sealed_targets, 3);
    assert!(report.alerts.is_empty());
    assert!(report.checks >= 1);
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn test_args_reach_the_loader() {
    let ns = namespace();
    let registry = SealingRegistry::new(Arc::new(ns), Arc::new(MemoryEnvironment::new()));
    let loader = |program: &std::path::Path, args: &[String]| -> Result<(), ProgramFailure> {
        assert_eq!(program, std::path::Path::new("guard.pt"));
        assert_eq!(args, ["--mode".to_string(), "fast".to_string()]);
        Ok(())
    };
    let report = GuardSupervisor::new(registry, vec!["io.open".into()], final_only())
        .run(
            Arc::new(loader),
            "guard.pt".into(),
            vec!["--mode".into(), "fast".into()],
        )
        .await
        .unwrap();
    assert_eq!(report.status, RunStatus::Ok);
    assert_eq!(report.args, vec!["--mode", "fast"]);
}

// ============================================================================
// Target Replacement
// ============================================================================

#[tokio::test]
async fn test_short_program_caught_by_final_check() {
    let ns = namespace();
    let tamper = ns.clone();
    let report = run_guarded(
        &ns,
        Arc::new(MemoryEnvironment::new()),
        &["io.open"],
        final_only(),
        move |_, _| {
            tamper.rebind(&path("io.open"), evil()).unwrap();
            Ok(())
        },
    )
    .await;

    assert_eq!(report.status, RunStatus::AlertsFound);
    assert_eq!(report.checks, 1);
    assert_eq!(report.alerts.len(), 1);
    let alert = &report.alerts[0];
    assert_eq!(alert.kind, AlertKind::TargetReplaced);
    assert_eq!(alert.target, "io.open");
    assert!(alert.restored);
    assert_eq!(report.exit_code(), 0);

    // The namespace holds the original again.
    let restored = ns.resolve(&path("io.open")).unwrap();
    assert_eq!(restored.to_string(), Binding::builtin("io.open", "builtin_function").to_string());
}

#[tokio::test]
async fn test_program_shorter_than_interval_is_not_waited_out() {
    let ns = namespace();
    let tamper = ns.clone();
    let started = Instant::now();
    let report = run_guarded(
        &ns,
        Arc::new(MemoryEnvironment::new()),
        &["io.open"],
        SupervisorConfig::new().with_interval(Duration::from_secs(30)),
        move |_, _| {
            tamper.rebind(&path("io.open"), evil()).unwrap();
            Ok(())
        },
    )
    .await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(report.checks, 1);
    assert_eq!(report.interval_ms, 30_000);
    let replaced: Vec<_> = report.alerts_of(AlertKind::TargetReplaced).collect();
    assert_eq!(replaced.len(), 1);
    assert!(replaced[0].restored);
}

#[tokio::test]
async fn test_restored_target_does_not_refire() {
    let ns = namespace();
    let original = ns.resolve(&path("io.open")).unwrap();
    let tamper = ns.clone();
    let report = run_guarded(
        &ns,
        Arc::new(MemoryEnvironment::new()),
        &["io.open"],
        fast(),
        move |_, _| {
            tamper.rebind(&path("io.open"), evil()).unwrap();
            wait_for_restore(&tamper, &path("io.open"), &original);
            std::thread::sleep(Duration::from_millis(50));
            Ok(())
        },
    )
    .await;

    assert_eq!(report.alerts_of(AlertKind::TargetReplaced).count(), 1);
    assert!(report.checks > 1);
}

#[tokio::test]
async fn test_retamper_fires_again() {
    let ns = namespace();
    let original = ns.resolve(&path("io.open")).unwrap();
    let tamper = ns.clone();
    let report = run_guarded(
        &ns,
        Arc::new(MemoryEnvironment::new()),
        &["io.open"],
        fast(),
        move |_, _| {
            tamper.rebind(&path("io.open"), evil()).unwrap();
            wait_for_restore(&tamper, &path("io.open"), &original);
            tamper.rebind(&path("io.open"), evil()).unwrap();
            Ok(())
        },
    )
    .await;

    let replaced: Vec<_> = report.alerts_of(AlertKind::TargetReplaced).collect();
    assert_eq!(replaced.len(), 2);
    assert!(replaced.iter().all(|a| a.restored));
}

#[tokio::test]
async fn test_without_auto_restore_alert_stays_unrestored() {
    let ns = namespace();
    let tamper = ns.clone();
    let report = run_guarded(
        &ns,
        Arc::new(MemoryEnvironment::new()),
        &["net.Socket"],
        final_only().with_auto_restore(false),
        move |_, _| {
            tamper
                .rebind(&path("net.Socket"), Binding::class(ClassDef::new("evil.Socket")))
                .unwrap();
            Ok(())
        },
    )
    .await;

    assert!(!report.auto_restore);
    assert_eq!(report.summary.restore_failed, 1);
    assert_eq!(report.exit_code(), EXIT_UNRESTORED);
    assert!(ns.resolve(&path("net.Socket")).unwrap().to_string().contains("evil"));
}

#[tokio::test]
async fn test_deleted_target_reported_missing_and_restored() {
    let ns = namespace();
    let tamper = ns.clone();
    let report = run_guarded(
        &ns,
        Arc::new(MemoryEnvironment::new()),
        &["io.open"],
        final_only(),
        move |_, _| {
            tamper.delete(&path("io.open")).unwrap();
            Ok(())
        },
    )
    .await;

    assert_eq!(report.alerts.len(), 1);
    assert_eq!(report.alerts[0].detail, "missing");
    assert!(report.alerts[0].restored);
    assert!(ns.resolve(&path("io.open")).is_ok());
}

#[tokio::test]
async fn test_in_place_edit_cannot_be_restored() {
    let ns = namespace();
    let tamper = ns.clone();
    let report = run_guarded(
        &ns,
        Arc::new(MemoryEnvironment::new()),
        &["io.read_to_end"],
        final_only(),
        move |_, _| {
            if let Ok(Binding::Function(def)) = tamper.resolve(&path("io.read_to_end")) {
                def.replace_code(CodeObject::new(vec![0xff]));
            }
            Ok(())
        },
    )
    .await;

    assert_eq!(report.alerts.len(), 1);
    let alert = &report.alerts[0];
    assert!(!alert.restored);
    assert!(alert.detail.contains("modified in place"));
    assert_eq!(report.exit_code(), EXIT_UNRESTORED);
}

// ============================================================================
// Hook Chain and Environment
// ============================================================================

#[tokio::test]
async fn test_hook_reorder_alerts_once() {
    let ns = namespace();
    let tamper = ns.clone();
    let report = run_guarded(
        &ns,
        Arc::new(MemoryEnvironment::new()),
        &["io.open"],
        fast(),
        move |_, _| {
            tamper.reverse_hooks();
            std::thread::sleep(Duration::from_millis(60));
            Ok(())
        },
    )
    .await;

    let hooks: Vec<_> = report.alerts_of(AlertKind::MetaPathTampered).collect();
    assert_eq!(hooks.len(), 1);
    assert_eq!(hooks[0].target, "meta_path");
    assert!(!hooks[0].restored);
    assert!(hooks[0].detail.contains("reordered"));
    // Hook chains are reported, never reverted.
    assert_eq!(ns.hook_chain(), vec!["path-finder", "builtin-importer"]);
}

#[tokio::test]
async fn test_env_changes_alert_per_key() {
    let ns = namespace();
    let env = Arc::new(MemoryEnvironment::from_pairs([("A", "1")]));
    let program_env = Arc::clone(&env);
    let report = run_guarded(&ns, env, &["io.open"], fast(), move |_, _| {
        program_env.set("A", "2");
        program_env.set("B", "3");
        std::thread::sleep(Duration::from_millis(60));
        Ok(())
    })
    .await;

    let mut keys: Vec<_> = report
        .alerts_of(AlertKind::EnvChanged)
        .map(|a| a.target.as_str())
        .collect();
    keys.sort_unstable();
    assert_eq!(keys, vec!["A", "B"]);
    assert_eq!(report.summary.env_changed, 2);
}

#[tokio::test]
async fn test_env_key_changed_twice_alerts_twice() {
    let ns = namespace();
    let env = Arc::new(MemoryEnvironment::from_pairs([("A", "1")]));
    let program_env = Arc::clone(&env);
    let report = run_guarded(&ns, env, &["io.open"], fast(), move |_, _| {
        program_env.set("A", "2");
        std::thread::sleep(Duration::from_millis(60));
        program_env.set("A", "3");
        std::thread::sleep(Duration::from_millis(60));
        Ok(())
    })
    .await;

    let alerts: Vec<_> = report.alerts_of(AlertKind::EnvChanged).collect();
    assert_eq!(alerts.len(), 2);
    assert!(alerts.iter().all(|a| a.target == "A"));
    assert!(alerts.iter().all(|a| a.detail.contains("value-changed")));
    assert!(report.checks > 2);
}

// ============================================================================
// Sealing Warnings and Failures
// ============================================================================

#[tokio::test]
async fn test_unresolvable_target_is_warned_and_skipped() {
    let ns = namespace();
    let report = run_guarded(
        &ns,
        Arc::new(MemoryEnvironment::new()),
        &["io.nope", "io.open"],
        final_only(),
        |_, _| Ok(()),
    )
    .await;

    assert_eq!(report.status, RunStatus::Ok);
    assert_eq!(report.targets, vec!["io.open"]);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].target, "io.nope");
}

#[tokio::test]
async fn test_program_failure_still_runs_final_check() {
    let ns = namespace();
    let tamper = ns.clone();
    let report = run_guarded(
        &ns,
        Arc::new(MemoryEnvironment::new()),
        &["io.open"],
        final_only(),
        move |_, _| {
            tamper.rebind(&path("io.open"), evil()).unwrap();
            Err(ProgramFailure::exit(3))
        },
    )
    .await;

    assert_eq!(report.status, RunStatus::GuardedProgramFailed);
    assert_eq!(report.alerts.len(), 1);
    assert_eq!(report.exit_code(), 3);
}

#[tokio::test]
async fn test_program_panic_is_captured() {
    let ns = namespace();
    let report = run_guarded(
        &ns,
        Arc::new(MemoryEnvironment::new()),
        &["io.open"],
        fast(),
        |_, _| panic!("loader exploded"),
    )
    .await;

    assert_eq!(report.status, RunStatus::GuardedProgramFailed);
    let failure = report.failure.as_ref().unwrap();
    assert!(failure.message.contains("loader exploded"));
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn test_state_transitions_end_in_done() {
    let ns = namespace();
    let registry = SealingRegistry::new(Arc::new(ns), Arc::new(MemoryEnvironment::new()));
    let supervisor = GuardSupervisor::new(registry, vec!["io.open".into()], final_only());
    let state = supervisor.subscribe();
    assert_eq!(*state.borrow(), GuardState::Idle);

    let loader = |_: &std::path::Path, _: &[String]| -> Result<(), ProgramFailure> { Ok(()) };
    supervisor
        .run(Arc::new(loader), "guarded".into(), vec![])
        .await
        .unwrap();
    assert_eq!(*state.borrow(), GuardState::Done);
}
