//! # Fingerprint Engine
//!
//! Computes a deterministic, comparable [`Fingerprint`] for any binding so
//! tampering can be detected without running the guarded code.
//!
//! ## Strategies
//!
//! | Kind | Strategy | Signal |
//! |------|----------|--------|
//! | `FUNCTION` | [`StructuralStrategy`] | instructions + constants + free-variable names |
//! | `BUILTIN_OR_OPAQUE` | [`IdentityStrategy`] | identity token + type signature |
//! | `CLASS` | [`IdentityStrategy`] | identity token + type signature |
//!
//! Opaque references have no structure worth hashing: anything derived from
//! them would either drift on a harmless reload or say nothing at all. Their
//! identity is the honest signal, so they never get a structural strategy.
//!
//! ## Threat Model
//!
//! - **Rebinding**: a replaced opaque callable gets a new identity token,
//!   even when the replacement has the same type and behaves alike.
//! - **In-place code edits**: a function whose instructions, constants or
//!   captured names change gets a new structural fingerprint although its
//!   identity is unchanged.
//!
//! ## Example
//!
//! ```rust
//! use patchtrap_registry::{Binding, CodeObject, FingerprintEngine, Fingerprint};
//!
//! let engine = FingerprintEngine::new();
//! let f = Binding::function("m.f", CodeObject::new(vec![0x64, 0x00]));
//!
//! let first = engine.fingerprint(&f);
//! assert!(matches!(first, Fingerprint::Structural { .. }));
//! assert_eq!(first, engine.fingerprint(&f));
//! ```

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use crate::canonicalize::{hash_bytes, hash_canonical, hash_sequence};
use crate::models::{Fingerprint, RefKind};
use crate::namespace::Binding;

/// A fingerprinting strategy for one kind of reference.
///
/// Returning `None` means the strategy cannot describe this binding; the
/// engine then falls back to the identity strategy.
pub trait FingerprintStrategy: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Describes the binding, never mutating it.
    fn fingerprint(&self, binding: &Binding) -> Option<Fingerprint>;
}

/// Hashes a function's code object.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralStrategy;

impl FingerprintStrategy for StructuralStrategy {
    fn name(&self) -> &'static str {
        "structural"
    }

    fn fingerprint(&self, binding: &Binding) -> Option<Fingerprint> {
        let Binding::Function(func) = binding else {
            return None;
        };
        let code = func.code();
        Some(Fingerprint::Structural {
            instructions: hash_bytes(&code.instructions),
            constants: hash_canonical(&Value::Array(code.constants)),
            free_vars: hash_sequence(&code.free_vars),
        })
    }
}

/// Identity token plus type signature. Always succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityStrategy;

impl IdentityStrategy {
    fn describe(binding: &Binding) -> Fingerprint {
        Fingerprint::Identity {
            identity: binding.identity(),
            type_signature: binding.type_signature(),
        }
    }
}

impl FingerprintStrategy for IdentityStrategy {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn fingerprint(&self, binding: &Binding) -> Option<Fingerprint> {
        Some(Self::describe(binding))
    }
}

/// Strategy table keyed by [`RefKind`], with an identity fallback.
///
/// # Thread Safety
///
/// The engine is immutable once built and can be shared freely.
pub struct FingerprintEngine {
    strategies: HashMap<RefKind, Box<dyn FingerprintStrategy>>,
}

impl FingerprintEngine {
    /// Structural fingerprints for functions; identity for everything else.
    #[must_use]
    pub fn new() -> Self {
        let mut strategies: HashMap<RefKind, Box<dyn FingerprintStrategy>> = HashMap::new();
        strategies.insert(RefKind::Function, Box::new(StructuralStrategy));
        Self { strategies }
    }

    /// Identity fingerprints for every kind.
    #[must_use]
    pub fn identity_only() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// Installs a strategy for `kind`, replacing any previous one.
    #[must_use]
    pub fn with_strategy(mut self, kind: RefKind, strategy: impl FingerprintStrategy + 'static) -> Self {
        self.strategies.insert(kind, Box::new(strategy));
        self
    }

    /// Fingerprints a binding. Pure: reads current state, mutates nothing.
    #[must_use]
    pub fn fingerprint(&self, binding: &Binding) -> Fingerprint {
        self.strategies
            .get(&binding.kind())
            .and_then(|strategy| strategy.fingerprint(binding))
            .unwrap_or_else(|| IdentityStrategy::describe(binding))
    }

    /// Name of the strategy used for `kind`.
    #[must_use]
    pub fn strategy_name(&self, kind: RefKind) -> &'static str {
        self.strategies
            .get(&kind)
            .map_or(IdentityStrategy.name(), |s| s.name())
    }
}

impl Default for FingerprintEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FingerprintEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self
            .strategies
            .iter()
            .map(|(kind, s)| (*kind, s.name()))
            .collect();
        kinds.sort();
        f.debug_struct("FingerprintEngine")
            .field("strategies", &kinds)
            .finish()
    }
}
