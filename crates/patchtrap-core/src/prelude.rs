//! The built-in namespace.
//!
//! Used when no manifest is configured. It provides every module the default
//! watch list names (`io`, `net`, `process`, `rand`) plus a three-entry
//! import-hook chain.

use patchtrap_registry::{Namespace, NamespaceManifest};

use crate::Result;

const PRELUDE: &str = include_str!("prelude.json");

/// The prelude as a manifest.
pub fn prelude_manifest() -> Result<NamespaceManifest> {
    Ok(NamespaceManifest::from_json(PRELUDE)?)
}

/// Builds a fresh prelude namespace.
pub fn prelude() -> Result<Namespace> {
    Ok(prelude_manifest()?.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_WATCH;
    use patchtrap_registry::{RefKind, Resolver, TargetPath};

    #[test]
    fn test_prelude_resolves_default_watch_list() {
        let ns = prelude().unwrap();
        for raw in DEFAULT_WATCH {
            let path: TargetPath = raw.parse().unwrap();
            assert!(ns.resolve(&path).is_ok(), "{raw} missing from prelude");
        }
    }

    #[test]
    fn test_prelude_kinds_and_hooks() {
        let ns = prelude().unwrap();
        let kind = |raw: &str| ns.resolve(&raw.parse().unwrap()).unwrap().kind();
        assert_eq!(kind("io.open"), RefKind::BuiltinOrOpaque);
        assert_eq!(kind("io.read_to_end"), RefKind::Function);
        assert_eq!(kind("net.Socket"), RefKind::Class);
        assert_eq!(kind("process.Command.spawn"), RefKind::Function);
        assert_eq!(
            ns.hook_chain(),
            vec!["builtin-importer", "frozen-importer", "path-finder"]
        );
    }

    #[test]
    fn test_prelude_instances_are_independent() {
        let a = prelude().unwrap();
        let b = prelude().unwrap();
        let path: TargetPath = "io.open".parse().unwrap();
        assert!(!a.resolve(&path).unwrap().same_ref(&b.resolve(&path).unwrap()));
    }
}
