//! Environment-variable capability.
//!
//! The registry snapshots the environment at seal time and the monitor
//! re-snapshots it on every check. [`ProcessEnvironment`] reads the real
//! process environment; [`MemoryEnvironment`] keeps an isolated map for
//! embedders that run guarded code against a private environment.

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::namespace::{read, write};

/// Ordered name -> value snapshot of an environment.
pub type EnvSnapshot = BTreeMap<String, String>;

/// Read/write access to an environment.
pub trait Environment: Send + Sync {
    /// Captures every variable.
    fn snapshot(&self) -> EnvSnapshot;

    /// Sets a variable.
    fn set(&self, key: &str, value: &str);

    /// Removes a variable.
    fn remove(&self, key: &str);
}

/// The real process environment.
///
/// Non-UTF-8 names and values are converted lossily so they still
/// participate in comparisons.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn snapshot(&self) -> EnvSnapshot {
        std::env::vars_os()
            .map(|(k, v)| {
                (
                    k.to_string_lossy().into_owned(),
                    v.to_string_lossy().into_owned(),
                )
            })
            .collect()
    }

    fn set(&self, key: &str, value: &str) {
        std::env::set_var(key, value);
    }

    fn remove(&self, key: &str) {
        std::env::remove_var(key);
    }
}

/// An isolated in-memory environment.
#[derive(Debug, Default)]
pub struct MemoryEnvironment {
    vars: RwLock<EnvSnapshot>,
}

impl MemoryEnvironment {
    /// Creates an empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an environment pre-populated from `pairs`.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: RwLock::new(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

impl Environment for MemoryEnvironment {
    fn snapshot(&self) -> EnvSnapshot {
        read(&self.vars).clone()
    }

    fn set(&self, key: &str, value: &str) {
        write(&self.vars).insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        write(&self.vars).remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_environment() {
        let env = MemoryEnvironment::from_pairs([("A", "1")]);
        env.set("B", "2");
        env.remove("A");
        let snap = env.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.get("B").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_process_snapshot_is_a_copy() {
        let mut snap = ProcessEnvironment.snapshot();
        snap.insert("PATCHTRAP_SNAPSHOT_ONLY".to_string(), "x".to_string());
        assert!(!ProcessEnvironment.snapshot().contains_key("PATCHTRAP_SNAPSHOT_ONLY"));
    }
}
