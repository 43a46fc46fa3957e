//! Unit tests for patchtrap-core.

use std::sync::Arc;
use std::time::Duration;

use crate::{
    prelude, AlertKind, GuardScript, MemoryEnvironment, PatchTrap, PatchTrapConfig, Resolver,
    RunStatus, TargetPath, DEFAULT_WATCH,
};

#[test]
fn test_crate_structure() {
    let config = PatchTrapConfig::default();
    assert_eq!(config.watch.len(), DEFAULT_WATCH.len());
    assert!(GuardScript::default().is_empty());

    let trap = PatchTrap::new(config).unwrap();
    for raw in DEFAULT_WATCH {
        let path: TargetPath = raw.parse().unwrap();
        assert!(trap.namespace().resolve(&path).is_ok(), "{} should resolve", raw);
    }
}

#[tokio::test]
async fn test_facade_runs_through_custom_loader() {
    let ns = prelude().unwrap();
    let trap = PatchTrap::new(PatchTrapConfig::default().with_interval(Duration::ZERO))
        .unwrap()
        .with_namespace(ns.clone())
        .with_environment(Arc::new(MemoryEnvironment::new()));

    let loader = move |_: &std::path::Path, _: &[String]| {
        GuardScript::parse("hook remove frozen-importer", &[])
            .unwrap()
            .execute(&ns, &MemoryEnvironment::new())
    };
    let report = trap
        .run_with(Arc::new(loader), "inline".into())
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::AlertsFound);
    assert_eq!(report.summary.meta_path_tampered, 1);
    assert_eq!(report.alerts_of(AlertKind::MetaPathTampered).count(), 1);
    assert_eq!(report.sealed_targets, 4);
    assert!(report.program.is_absolute());
    assert!(report.program.ends_with("inline"));
}
