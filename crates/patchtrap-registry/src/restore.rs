//! # Restore Engine
//!
//! Re-binds a tampered target to its pinned original.
//!
//! Only watched targets are ever restored. Import hooks and environment
//! variables are reported but left alone: rewriting process-wide machinery
//! reaches further than a single watched reference.
//!
//! ## Security Notes
//!
//! - The pinned original is re-bound as-is; the engine never edits it.
//! - Success is verified by re-fingerprinting the path. If the original was
//!   itself edited in place, re-binding cannot help and the restore fails.
//! - Failures are returned to the caller for the alert record; they never
//!   abort the run.

use thiserror::Error;
use tracing::{info, warn};

use crate::namespace::ResolveError;
use crate::registry::{Observation, SealingRegistry, WatchTarget};

/// Why a restore did not take effect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RestoreError {
    /// The holder of the attribute could not be rewritten.
    #[error("holder could not be rewritten: {0}")]
    Holder(#[from] ResolveError),

    /// The path was re-bound but still differs from its baseline.
    #[error("original reference was modified in place")]
    OriginalModified,

    /// Something else was bound to the path before the restore was verified.
    #[error("path was re-bound again during restore")]
    Superseded,
}

impl SealingRegistry {
    /// Re-binds `target`'s path to its pinned original and verifies the result.
    pub fn restore(&self, target: &WatchTarget) -> Result<(), RestoreError> {
        if let Err(e) = self
            .resolver()
            .rebind(target.path(), target.original().clone())
        {
            warn!(target_path = %target.path(), error = %e, "Restore failed");
            return Err(RestoreError::Holder(e));
        }

        match self.observe(target) {
            observation if observation.matches(target) => {
                info!(target_path = %target.path(), "Restored original reference");
                Ok(())
            }
            Observation::Missing { error } => {
                warn!(target_path = %target.path(), error = %error, "Restored path vanished");
                Err(RestoreError::Holder(error))
            }
            Observation::Present {
                binding,
                fingerprint,
            } => {
                warn!(
                    target_path = %target.path(),
                    expected = %target.baseline(),
                    actual = %fingerprint,
                    "Restore did not reproduce the baseline"
                );
                if binding.same_ref(target.original()) {
                    Err(RestoreError::OriginalModified)
                } else {
                    Err(RestoreError::Superseded)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::MemoryEnvironment;
    use crate::namespace::{Binding, ClassDef, CodeObject, Module, Namespace, Resolver};
    use std::sync::Arc;

    fn setup() -> (Namespace, SealingRegistry) {
        let ns = Namespace::new();
        ns.insert_module(
            Module::new("net")
                .with_attr("connect", Binding::builtin("net.connect", "builtin_function"))
                .with_attr(
                    "Socket",
                    Binding::class(
                        ClassDef::new("net.Socket")
                            .with_attr("send", Binding::function("net.Socket.send", CodeObject::new(vec![1]))),
                    ),
                ),
        );
        let mut registry =
            SealingRegistry::new(Arc::new(ns.clone()), Arc::new(MemoryEnvironment::new()));
        registry.seal(&["net.connect", "net.Socket.send"]);
        (ns, registry)
    }

    #[test]
    fn test_restore_replaced_builtin() {
        let (ns, registry) = setup();
        let target = registry.target("net.connect").unwrap().clone();
        ns.rebind(target.path(), Binding::builtin("evil", "builtin_function"))
            .unwrap();
        assert!(!registry.observe(&target).matches(&target));

        registry.restore(&target).unwrap();
        assert!(registry.observe(&target).matches(&target));
        assert!(ns.resolve(target.path()).unwrap().same_ref(target.original()));
    }

    #[test]
    fn test_restore_deleted_attribute() {
        let (ns, registry) = setup();
        let target = registry.target("net.connect").unwrap().clone();
        ns.delete(target.path()).unwrap();
        registry.restore(&target).unwrap();
        assert!(registry.observe(&target).matches(&target));
    }

    #[test]
    fn test_restore_fails_when_holder_vanished() {
        let (ns, registry) = setup();
        let target = registry.target("net.Socket.send").unwrap().clone();
        ns.delete(&"net.Socket".parse().unwrap()).unwrap();
        assert!(matches!(
            registry.restore(&target),
            Err(RestoreError::Holder(ResolveError::MissingAttribute { .. }))
        ));
    }

    #[test]
    fn test_restore_fails_when_original_modified_in_place() {
        let (_ns, registry) = setup();
        let target = registry.target("net.Socket.send").unwrap().clone();
        if let Binding::Function(def) = target.original() {
            def.replace_code(CodeObject::new(vec![0xff]));
        }
        assert_eq!(registry.restore(&target), Err(RestoreError::OriginalModified));
    }
}
