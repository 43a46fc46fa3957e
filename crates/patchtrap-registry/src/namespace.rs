//! # Monitored Namespace and Resolver Capability
//!
//! Watched references live in a namespace supplied by the embedding
//! environment. The registry never performs a hidden process-wide lookup:
//! it is handed a [`Resolver`] and walks dotted paths through it.
//!
//! ## Model
//!
//! ```text
//!  Namespace
//!  ├── hooks: [builtin-importer, frozen-importer, path-finder]   (ordered)
//!  └── modules
//!      ├── io        (Module)
//!      │   ├── open          Builtin
//!      │   └── read_to_end   Function ── code (swappable in place)
//!      └── net       (Module)
//!          └── Socket        Class
//!              └── connect   Builtin
//! ```
//!
//! Modules and classes are attribute containers. Every [`Binding`] is a
//! cheap `Arc` handle; its allocation address is its identity token.
//!
//! ## Security Notes
//!
//! - A pinned clone of a binding keeps its allocation alive, so a
//!   replacement can never be allocated at the same address and inherit
//!   the original's identity.
//! - Locks are never held across calls back into the namespace.

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

use crate::models::{RefKind, TargetPath};

/// Errors from walking or rewriting a dotted path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// No root module with this name exists.
    #[error("unknown module '{0}'")]
    UnknownModule(String),

    /// The holder exists but has no such attribute.
    #[error("'{holder}' has no attribute '{attribute}'")]
    MissingAttribute {
        /// Dotted name of the holder.
        holder: String,
        /// The missing attribute.
        attribute: String,
    },

    /// A path segment resolved to something that cannot hold attributes.
    #[error("'{0}' is not an attribute container")]
    NotAContainer(String),
}

/// Capability for resolving and rebinding watched paths.
///
/// Implemented by whatever owns the monitored reference graph. The registry
/// reads through it on every check; the restore engine writes through it.
pub trait Resolver: Send + Sync {
    /// Walks `path` from its root module and returns the current binding.
    fn resolve(&self, path: &TargetPath) -> Result<Binding, ResolveError>;

    /// Rebinds the final attribute of `path` on its current holder.
    fn rebind(&self, path: &TargetPath, binding: Binding) -> Result<(), ResolveError>;

    /// The ordered module-resolution hook chain.
    fn hook_chain(&self) -> Vec<String>;
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Inspectable body of a function.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CodeObject {
    /// Instruction bytes.
    pub instructions: Vec<u8>,
    /// Constant pool.
    pub constants: Vec<Value>,
    /// Names captured from enclosing scopes, in order.
    pub free_vars: Vec<String>,
}

impl CodeObject {
    /// Creates a code object from instruction bytes alone.
    #[must_use]
    pub fn new(instructions: impl Into<Vec<u8>>) -> Self {
        Self {
            instructions: instructions.into(),
            ..Self::default()
        }
    }

    /// Sets the constant pool.
    #[must_use]
    pub fn with_constants(mut self, constants: Vec<Value>) -> Self {
        self.constants = constants;
        self
    }

    /// Sets the free-variable names.
    #[must_use]
    pub fn with_free_vars<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.free_vars = names.into_iter().map(Into::into).collect();
        self
    }
}

/// A first-class function value.
///
/// The code sits behind a lock so a guarded program can rewrite it in place,
/// the same way a dynamic runtime lets a function's code object be swapped.
#[derive(Debug)]
pub struct FunctionDef {
    qualname: String,
    code: RwLock<CodeObject>,
}

impl FunctionDef {
    /// Creates a function.
    pub fn new(qualname: impl Into<String>, code: CodeObject) -> Self {
        Self {
            qualname: qualname.into(),
            code: RwLock::new(code),
        }
    }

    /// Qualified name.
    #[must_use]
    pub fn qualname(&self) -> &str {
        &self.qualname
    }

    /// A snapshot of the current code.
    #[must_use]
    pub fn code(&self) -> CodeObject {
        read(&self.code).clone()
    }

    /// Replaces the code in place; identity is unchanged.
    pub fn replace_code(&self, code: CodeObject) {
        *write(&self.code) = code;
    }
}

/// A native or otherwise opaque callable.
#[derive(Debug)]
pub struct BuiltinDef {
    qualname: String,
    type_name: String,
}

impl BuiltinDef {
    /// Creates a builtin with the given type name (e.g. `builtin_function`).
    pub fn new(qualname: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            qualname: qualname.into(),
            type_name: type_name.into(),
        }
    }

    /// Qualified name.
    #[must_use]
    pub fn qualname(&self) -> &str {
        &self.qualname
    }

    /// Type name used as the type signature.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }
}

/// An attribute container: the shared body of modules and classes.
#[derive(Debug, Default)]
pub struct Attributes {
    entries: RwLock<BTreeMap<String, Binding>>,
}

impl Attributes {
    /// Looks up one attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Binding> {
        read(&self.entries).get(name).cloned()
    }

    /// Binds an attribute, returning the previous binding.
    pub fn set(&self, name: impl Into<String>, binding: Binding) -> Option<Binding> {
        write(&self.entries).insert(name.into(), binding)
    }

    /// Removes an attribute.
    pub fn remove(&self, name: &str) -> Option<Binding> {
        write(&self.entries).remove(name)
    }

    /// Attribute names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        read(&self.entries).keys().cloned().collect()
    }
}

/// A class: identity plus attributes.
#[derive(Debug)]
pub struct ClassDef {
    qualname: String,
    attrs: Attributes,
}

impl ClassDef {
    /// Creates an empty class.
    pub fn new(qualname: impl Into<String>) -> Self {
        Self {
            qualname: qualname.into(),
            attrs: Attributes::default(),
        }
    }

    /// Adds an attribute (builder style).
    #[must_use]
    pub fn with_attr(self, name: impl Into<String>, binding: Binding) -> Self {
        self.attrs.set(name, binding);
        self
    }

    /// Qualified name.
    #[must_use]
    pub fn qualname(&self) -> &str {
        &self.qualname
    }

    /// The class attributes.
    #[must_use]
    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }
}

/// A module: a named attribute container.
#[derive(Debug)]
pub struct Module {
    name: String,
    attrs: Attributes,
}

impl Module {
    /// Creates an empty module.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Attributes::default(),
        }
    }

    /// Adds an attribute (builder style).
    #[must_use]
    pub fn with_attr(self, name: impl Into<String>, binding: Binding) -> Self {
        self.attrs.set(name, binding);
        self
    }

    /// Module name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The module attributes.
    #[must_use]
    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }
}

/// A handle to a reference in the namespace.
///
/// Cloning is cheap and shares the referent; [`Binding::identity`] is stable
/// for as long as any clone is alive.
#[derive(Debug, Clone)]
pub enum Binding {
    /// An inspectable function.
    Function(Arc<FunctionDef>),
    /// An opaque callable.
    Builtin(Arc<BuiltinDef>),
    /// A class.
    Class(Arc<ClassDef>),
    /// A module bound as an attribute (submodule).
    Module(Arc<Module>),
    /// Plain data.
    Value(Arc<Value>),
}

impl Binding {
    /// Wraps a new function.
    pub fn function(qualname: impl Into<String>, code: CodeObject) -> Self {
        Binding::Function(Arc::new(FunctionDef::new(qualname, code)))
    }

    /// Wraps a new builtin.
    pub fn builtin(qualname: impl Into<String>, type_name: impl Into<String>) -> Self {
        Binding::Builtin(Arc::new(BuiltinDef::new(qualname, type_name)))
    }

    /// Wraps a class.
    pub fn class(class: ClassDef) -> Self {
        Binding::Class(Arc::new(class))
    }

    /// Wraps a submodule.
    pub fn module(module: Module) -> Self {
        Binding::Module(Arc::new(module))
    }

    /// Wraps a data value.
    pub fn value(value: Value) -> Self {
        Binding::Value(Arc::new(value))
    }

    /// Classifies the binding for fingerprinting.
    #[must_use]
    pub fn kind(&self) -> RefKind {
        match self {
            Binding::Function(_) => RefKind::Function,
            Binding::Class(_) => RefKind::Class,
            Binding::Builtin(_) | Binding::Module(_) | Binding::Value(_) => {
                RefKind::BuiltinOrOpaque
            }
        }
    }

    /// Address of the shared allocation.
    #[must_use]
    pub fn identity(&self) -> usize {
        match self {
            Binding::Function(f) => Arc::as_ptr(f) as *const () as usize,
            Binding::Builtin(b) => Arc::as_ptr(b) as *const () as usize,
            Binding::Class(c) => Arc::as_ptr(c) as *const () as usize,
            Binding::Module(m) => Arc::as_ptr(m) as *const () as usize,
            Binding::Value(v) => Arc::as_ptr(v) as *const () as usize,
        }
    }

    /// Type signature used by the identity strategy.
    #[must_use]
    pub fn type_signature(&self) -> String {
        match self {
            Binding::Function(_) => "function".to_string(),
            Binding::Builtin(b) => b.type_name().to_string(),
            Binding::Class(_) => "class".to_string(),
            Binding::Module(_) => "module".to_string(),
            Binding::Value(v) => format!("value:{}", json_type(v)),
        }
    }

    /// Whether two handles share one referent.
    #[must_use]
    pub fn same_ref(&self, other: &Binding) -> bool {
        self.identity() == other.identity()
    }

    /// The attribute table, if this binding is a container.
    #[must_use]
    pub fn attrs(&self) -> Option<&Attributes> {
        match self {
            Binding::Class(c) => Some(c.attrs()),
            Binding::Module(m) => Some(m.attrs()),
            _ => None,
        }
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Function(func) => write!(f, "<function {}>", func.qualname()),
            Binding::Builtin(b) => write!(f, "<{} {}>", b.type_name(), b.qualname()),
            Binding::Class(c) => write!(f, "<class {}>", c.qualname()),
            Binding::Module(m) => write!(f, "<module {}>", m.name()),
            Binding::Value(v) => write!(f, "<value {}>", json_type(v)),
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Default)]
struct NamespaceState {
    modules: RwLock<BTreeMap<String, Arc<Module>>>,
    hooks: RwLock<Vec<String>>,
}

/// The in-memory monitored namespace.
///
/// A cloneable handle: the guarded program and the monitor share one state.
///
/// # Example
///
/// ```rust
/// use patchtrap_registry::{Binding, Module, Namespace, Resolver, TargetPath};
///
/// let ns = Namespace::new();
/// ns.insert_module(Module::new("io").with_attr("open", Binding::builtin("io.open", "builtin_function")));
///
/// let path: TargetPath = "io.open".parse().unwrap();
/// let original = ns.resolve(&path).unwrap();
///
/// ns.rebind(&path, Binding::builtin("evil.open", "builtin_function")).unwrap();
/// assert!(!ns.resolve(&path).unwrap().same_ref(&original));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    state: Arc<NamespaceState>,
}

impl Namespace {
    /// Creates an empty namespace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a root module, replacing any module with the same name.
    pub fn insert_module(&self, module: Module) -> Arc<Module> {
        let module = Arc::new(module);
        write(&self.state.modules).insert(module.name().to_string(), Arc::clone(&module));
        module
    }

    /// Looks up a root module.
    #[must_use]
    pub fn module(&self, name: &str) -> Option<Arc<Module>> {
        read(&self.state.modules).get(name).cloned()
    }

    /// Root module names in sorted order.
    #[must_use]
    pub fn module_names(&self) -> Vec<String> {
        read(&self.state.modules).keys().cloned().collect()
    }

    /// Removes the final attribute of `path` from its holder.
    pub fn delete(&self, path: &TargetPath) -> Result<Binding, ResolveError> {
        let holder = self.holder(path)?;
        holder
            .attrs()
            .and_then(|attrs| attrs.remove(path.attribute()))
            .ok_or_else(|| ResolveError::MissingAttribute {
                holder: path.holder_name(),
                attribute: path.attribute().to_string(),
            })
    }

    /// Appends a hook to the end of the chain.
    pub fn push_hook(&self, id: impl Into<String>) {
        write(&self.state.hooks).push(id.into());
    }

    /// Inserts a hook at `index` (clamped to the chain length).
    pub fn insert_hook(&self, index: usize, id: impl Into<String>) {
        let mut hooks = write(&self.state.hooks);
        let index = index.min(hooks.len());
        hooks.insert(index, id.into());
    }

    /// Removes the first hook with this id. Returns whether one was removed.
    pub fn remove_hook(&self, id: &str) -> bool {
        let mut hooks = write(&self.state.hooks);
        match hooks.iter().position(|h| h == id) {
            Some(index) => {
                hooks.remove(index);
                true
            }
            None => false,
        }
    }

    /// Reverses the hook chain.
    pub fn reverse_hooks(&self) {
        write(&self.state.hooks).reverse();
    }

    /// Resolves the holder of `path`'s final attribute.
    fn holder(&self, path: &TargetPath) -> Result<Binding, ResolveError> {
        let root = self
            .module(path.root())
            .ok_or_else(|| ResolveError::UnknownModule(path.root().to_string()))?;
        let mut current = Binding::Module(root);
        let mut walked = path.root().to_string();
        for segment in path.intermediate() {
            let attrs = current
                .attrs()
                .ok_or_else(|| ResolveError::NotAContainer(walked.clone()))?;
            let next = attrs
                .get(segment)
                .ok_or_else(|| ResolveError::MissingAttribute {
                    holder: walked.clone(),
                    attribute: segment.clone(),
                })?;
            walked.push('.');
            walked.push_str(segment);
            current = next;
        }
        if current.attrs().is_none() {
            return Err(ResolveError::NotAContainer(walked));
        }
        Ok(current)
    }
}

impl Resolver for Namespace {
    fn resolve(&self, path: &TargetPath) -> Result<Binding, ResolveError> {
        let holder = self.holder(path)?;
        holder
            .attrs()
            .and_then(|attrs| attrs.get(path.attribute()))
            .ok_or_else(|| ResolveError::MissingAttribute {
                holder: path.holder_name(),
                attribute: path.attribute().to_string(),
            })
    }

    fn rebind(&self, path: &TargetPath, binding: Binding) -> Result<(), ResolveError> {
        let holder = self.holder(path)?;
        let attrs = holder
            .attrs()
            .ok_or_else(|| ResolveError::NotAContainer(path.holder_name()))?;
        attrs.set(path.attribute(), binding);
        Ok(())
    }

    fn hook_chain(&self) -> Vec<String> {
        read(&self.state.hooks).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(raw: &str) -> TargetPath {
        raw.parse().unwrap()
    }

    fn sample() -> Namespace {
        let ns = Namespace::new();
        ns.insert_module(
            Module::new("net").with_attr(
                "Socket",
                Binding::class(
                    ClassDef::new("net.Socket")
                        .with_attr("connect", Binding::builtin("net.Socket.connect", "method")),
                ),
            ),
        );
        ns.insert_module(Module::new("cfg").with_attr("level", Binding::value(json!(3))));
        ns
    }

    #[test]
    fn test_resolve_nested_attribute() {
        let ns = sample();
        let binding = ns.resolve(&path("net.Socket.connect")).unwrap();
        assert_eq!(binding.kind(), RefKind::BuiltinOrOpaque);
        assert_eq!(binding.type_signature(), "method");
    }

    #[test]
    fn test_resolve_errors() {
        let ns = sample();
        assert_eq!(
            ns.resolve(&path("nope.x")).unwrap_err(),
            ResolveError::UnknownModule("nope".to_string())
        );
        assert_eq!(
            ns.resolve(&path("net.Socket.send")).unwrap_err(),
            ResolveError::MissingAttribute {
                holder: "net.Socket".to_string(),
                attribute: "send".to_string(),
            }
        );
        assert_eq!(
            ns.resolve(&path("cfg.level.bits")).unwrap_err(),
            ResolveError::NotAContainer("cfg.level".to_string())
        );
    }

    #[test]
    fn test_identity_follows_referent() {
        let ns = sample();
        let a = ns.resolve(&path("net.Socket")).unwrap();
        let b = ns.resolve(&path("net.Socket")).unwrap();
        assert!(a.same_ref(&b));

        ns.rebind(&path("net.Socket"), Binding::class(ClassDef::new("net.Socket")))
            .unwrap();
        let c = ns.resolve(&path("net.Socket")).unwrap();
        assert!(!a.same_ref(&c));
    }

    #[test]
    fn test_in_place_code_swap_keeps_identity() {
        let func = Binding::function("m.f", CodeObject::new(vec![1, 2]));
        let before = func.identity();
        if let Binding::Function(def) = &func {
            def.replace_code(CodeObject::new(vec![9]));
            assert_eq!(def.code().instructions, vec![9]);
        }
        assert_eq!(func.identity(), before);
    }

    #[test]
    fn test_delete_and_rebind_recreates() {
        let ns = sample();
        let p = path("net.Socket.connect");
        let original = ns.delete(&p).unwrap();
        assert!(ns.resolve(&p).is_err());
        ns.rebind(&p, original.clone()).unwrap();
        assert!(ns.resolve(&p).unwrap().same_ref(&original));
    }

    #[test]
    fn test_hook_chain_operations() {
        let ns = Namespace::new();
        ns.push_hook("a");
        ns.push_hook("b");
        ns.insert_hook(0, "z");
        assert_eq!(ns.hook_chain(), vec!["z", "a", "b"]);
        ns.reverse_hooks();
        assert_eq!(ns.hook_chain(), vec!["b", "a", "z"]);
        assert!(ns.remove_hook("a"));
        assert!(!ns.remove_hook("a"));
        ns.insert_hook(99, "tail");
        assert_eq!(ns.hook_chain(), vec!["b", "z", "tail"]);
    }
}
