//! # Change Classification
//!
//! Turns observations into alerts. The pure comparison functions here
//! ([`diff_target`], [`diff_hooks`], [`diff_env`]) know nothing about time;
//! [`Classifier`] adds the de-duplication that keeps a persistent change
//! from being reported on every check pass.
//!
//! ## Re-firing Rules
//!
//! | Kind | Fires when |
//! |------|------------|
//! | `TARGET_REPLACED` | observation differs from baseline, every pass |
//! | `META_PATH_TAMPERED` | chain differs from baseline and from the last pass |
//! | `ENV_CHANGED` | key differs from baseline and from the last pass |
//!
//! Replaced targets are restored after each alert, so a target that fires
//! twice was tampered with twice. Hook chains and environment variables are
//! never reverted; without the last-observed comparison they would re-fire
//! forever.

use std::collections::BTreeSet;

use patchtrap_registry::{EnvSnapshot, Observation, WatchTarget};

use crate::alert::{Alert, EnvChange};

/// Compares one observation against its target's baseline.
///
/// Returns `None` when the target is intact.
#[must_use]
pub fn diff_target(target: &WatchTarget, observation: &Observation) -> Option<Alert> {
    match observation {
        Observation::Missing { .. } => Some(Alert::target_replaced(
            target.path().to_string(),
            "missing",
        )),
        Observation::Present {
            binding,
            fingerprint,
        } => {
            if fingerprint == target.baseline() {
                return None;
            }
            let how = if binding.same_ref(target.original()) {
                "modified in place".to_string()
            } else {
                format!("rebound to {}", binding)
            };
            Some(Alert::target_replaced(
                target.path().to_string(),
                format!(
                    "{} {}: {} -> {}",
                    target.kind(),
                    how,
                    target.baseline(),
                    fingerprint
                ),
            ))
        }
    }
}

/// Compares the hook chain against its baseline. Order matters.
#[must_use]
pub fn diff_hooks(baseline: &[String], current: &[String]) -> Option<Alert> {
    if baseline == current {
        return None;
    }

    let before: BTreeSet<&String> = baseline.iter().collect();
    let after: BTreeSet<&String> = current.iter().collect();
    let added: Vec<&str> = after.difference(&before).map(|s| s.as_str()).collect();
    let removed: Vec<&str> = before.difference(&after).map(|s| s.as_str()).collect();

    let mut parts = Vec::new();
    if !added.is_empty() {
        parts.push(format!("added [{}]", added.join(", ")));
    }
    if !removed.is_empty() {
        parts.push(format!("removed [{}]", removed.join(", ")));
    }
    if parts.is_empty() {
        parts.push("reordered".to_string());
    }

    Some(Alert::meta_path_tampered(format!(
        "import hook chain {}: [{}] -> [{}]",
        parts.join(", "),
        baseline.join(", "),
        current.join(", ")
    )))
}

/// Per-key differences between two environment snapshots, in key order.
#[must_use]
pub fn diff_env(baseline: &EnvSnapshot, current: &EnvSnapshot) -> Vec<(String, EnvChange)> {
    let keys: BTreeSet<&String> = baseline.keys().chain(current.keys()).collect();
    keys.into_iter()
        .filter_map(|key| {
            let change = match (baseline.get(key), current.get(key)) {
                (None, Some(_)) => EnvChange::Added,
                (Some(_), None) => EnvChange::Removed,
                (Some(a), Some(b)) if a != b => EnvChange::ValueChanged,
                _ => return None,
            };
            Some((key.clone(), change))
        })
        .collect()
}

/// Stateful classifier for the non-restorable alert kinds.
#[derive(Debug, Clone)]
pub struct Classifier {
    last_hooks: Vec<String>,
    last_env: EnvSnapshot,
}

impl Classifier {
    /// Starts from the sealed baselines.
    pub fn new(hook_baseline: &[String], env_baseline: &EnvSnapshot) -> Self {
        Self {
            last_hooks: hook_baseline.to_vec(),
            last_env: env_baseline.clone(),
        }
    }

    /// Alerts on a hook chain that differs from the baseline and from the
    /// previous observation.
    pub fn classify_hooks(&mut self, baseline: &[String], current: Vec<String>) -> Option<Alert> {
        let alert = if current != self.last_hooks {
            diff_hooks(baseline, &current)
        } else {
            None
        };
        self.last_hooks = current;
        alert
    }

    /// Alerts on each key that differs from the baseline and whose value
    /// changed since the previous observation.
    pub fn classify_env(&mut self, baseline: &EnvSnapshot, current: EnvSnapshot) -> Vec<Alert> {
        let alerts = diff_env(baseline, &current)
            .into_iter()
            .filter(|(key, _)| self.last_env.get(key) != current.get(key))
            .map(|(key, change)| Alert::env_changed(key, change))
            .collect();
        self.last_env = current;
        alerts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertKind;

    fn env(pairs: &[(&str, &str)]) -> EnvSnapshot {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn hooks(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_diff_env_categories() {
        let changes = diff_env(&env(&[("A", "1")]), &env(&[("A", "2"), ("B", "3")]));
        assert_eq!(
            changes,
            vec![
                ("A".to_string(), EnvChange::ValueChanged),
                ("B".to_string(), EnvChange::Added),
            ]
        );

        let changes = diff_env(&env(&[("A", "1")]), &env(&[]));
        assert_eq!(changes, vec![("A".to_string(), EnvChange::Removed)]);
        assert!(diff_env(&env(&[("A", "1")]), &env(&[("A", "1")])).is_empty());
    }

    #[test]
    fn test_diff_hooks_is_order_sensitive() {
        let baseline = hooks(&["a", "b"]);
        assert!(diff_hooks(&baseline, &hooks(&["a", "b"])).is_none());

        let alert = diff_hooks(&baseline, &hooks(&["b", "a"])).unwrap();
        assert_eq!(alert.kind, AlertKind::MetaPathTampered);
        assert!(alert.detail.contains("reordered"));
    }

    #[test]
    fn test_diff_hooks_names_added_and_removed() {
        let alert = diff_hooks(&hooks(&["a", "b"]), &hooks(&["evil", "a"])).unwrap();
        assert!(alert.detail.contains("added [evil]"));
        assert!(alert.detail.contains("removed [b]"));
    }

    #[test]
    fn test_classifier_env_dedup() {
        let baseline = env(&[("A", "1")]);
        let mut classifier = Classifier::new(&[], &baseline);

        let first = classifier.classify_env(&baseline, env(&[("A", "2"), ("B", "3")]));
        assert_eq!(first.len(), 2);

        // Unchanged since last pass: silent.
        assert!(classifier
            .classify_env(&baseline, env(&[("A", "2"), ("B", "3")]))
            .is_empty());

        // A changes again; B stays.
        let third = classifier.classify_env(&baseline, env(&[("A", "4"), ("B", "3")]));
        assert_eq!(third.len(), 1);
        assert_eq!(third[0].target, "A");

        // Back to baseline: nothing to report.
        assert!(classifier.classify_env(&baseline, baseline.clone()).is_empty());
    }

    #[test]
    fn test_classifier_hooks_dedup() {
        let baseline = hooks(&["a", "b"]);
        let mut classifier = Classifier::new(&baseline, &EnvSnapshot::new());

        assert!(classifier.classify_hooks(&baseline, hooks(&["b", "a"])).is_some());
        assert!(classifier.classify_hooks(&baseline, hooks(&["b", "a"])).is_none());
        assert!(classifier.classify_hooks(&baseline, hooks(&["a", "b"])).is_none());
        assert!(classifier.classify_hooks(&baseline, hooks(&["b", "a"])).is_some());
    }
}
