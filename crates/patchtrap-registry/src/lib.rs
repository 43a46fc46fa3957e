//! # PatchTrap Registry - Sealing and Fingerprinting
//!
//! The registry seals a set of callable references before a guarded program
//! runs, so that any later replacement, rebinding or in-place edit can be
//! detected by re-inspection alone, without running the guarded code.
//!
//! ## Purpose
//!
//! This crate implements four capabilities:
//!
//! 1. **Fingerprint Engine** - Deterministic digests per reference kind:
//!    structural for inspectable functions, identity for everything opaque.
//!
//! 2. **Sealing Registry** - Resolves dotted watch paths through an explicit
//!    [`Resolver`], pins each original reference and stores its baseline,
//!    together with environment and import-hook baselines.
//!
//! 3. **Restore Engine** - Re-binds a tampered path to its pinned original
//!    and verifies the result.
//!
//! 4. **Namespace** - The in-memory reference graph guarded programs run
//!    against, buildable from a JSON [`NamespaceManifest`].
//!
//! ## Threat Model
//!
//! | Threat | Description | Defense |
//! |--------|-------------|---------|
//! | Monkey-patch | Callable rebound to attacker code | Identity fingerprint |
//! | Code swap | Function body rewritten in place | Structural fingerprint |
//! | Deletion | Watched attribute removed | Re-resolution, "missing" |
//! | Hook hijack | Import hook inserted or reordered | Ordered hook baseline |
//! | Env poisoning | Variables added, removed, changed | Environment baseline |
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        SEALING REGISTRY                         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌───────────────────┐   resolve    ┌─────────────────────────┐ │
//! │  │     RESOLVER      │◀────────────▶│      WATCH TARGETS      │ │
//! │  │                   │   rebind     │                         │ │
//! │  │  dotted path walk │              │  path, kind             │ │
//! │  │  hook chain       │              │  pinned original        │ │
//! │  └───────────────────┘              │  baseline fingerprint   │ │
//! │                                     └─────────────────────────┘ │
//! │  ┌───────────────────┐              ┌─────────────────────────┐ │
//! │  │ FINGERPRINT ENGINE│              │       BASELINES         │ │
//! │  │                   │              │                         │ │
//! │  │  FUNCTION: code   │              │  environment snapshot   │ │
//! │  │  other: identity  │              │  import-hook chain      │ │
//! │  └───────────────────┘              └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use patchtrap_registry::{
//!     Binding, MemoryEnvironment, Module, Namespace, Resolver, SealingRegistry,
//! };
//!
//! let ns = Namespace::new();
//! ns.insert_module(Module::new("io").with_attr("open", Binding::builtin("io.open", "builtin_function")));
//!
//! let mut registry = SealingRegistry::new(Arc::new(ns.clone()), Arc::new(MemoryEnvironment::new()));
//! registry.seal(&["io.open"]);
//!
//! // The guarded program monkey-patches io.open...
//! let target = registry.targets()[0].clone();
//! ns.rebind(target.path(), Binding::builtin("evil.open", "builtin_function")).unwrap();
//! assert!(!registry.observe(&target).matches(&target));
//!
//! // ...and the restore engine puts the original back.
//! registry.restore(&target).unwrap();
//! assert!(registry.observe(&target).matches(&target));
//! ```
//!
//! ## Security Considerations
//!
//! - **Detection only**: tampering that happens and is reverted between two
//!   observations is invisible by construction.
//! - **Hash Algorithm**: SHA-256 for structural digests.
//! - **Scope**: only the reference graph reachable through the resolver is
//!   monitored; native code outside it is out of reach.

pub mod canonicalize;
pub mod environment;
pub mod fingerprint;
pub mod manifest;
pub mod models;
pub mod namespace;
pub mod registry;
pub mod restore;

pub use environment::{EnvSnapshot, Environment, MemoryEnvironment, ProcessEnvironment};
pub use fingerprint::{FingerprintEngine, FingerprintStrategy, IdentityStrategy, StructuralStrategy};
pub use manifest::{EntryManifest, NamespaceManifest};
pub use models::{
    Fingerprint, Hash, PathError, RefKind, RegistryError, Result, SealWarning, TargetPath,
};
pub use namespace::{
    Attributes, Binding, BuiltinDef, ClassDef, CodeObject, FunctionDef, Module, Namespace,
    ResolveError, Resolver,
};
pub use registry::{
    EnvironmentBaseline, ImportHookBaseline, Observation, SealResult, SealingRegistry,
    WatchTarget,
};
pub use restore::RestoreError;
