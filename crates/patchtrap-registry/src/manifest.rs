//! JSON namespace manifests.
//!
//! A manifest describes the monitored namespace a guarded program runs
//! against: root modules, their attributes, and the import-hook chain.
//!
//! ```json
//! {
//!   "hooks": ["builtin-importer", "path-finder"],
//!   "modules": {
//!     "io": {
//!       "open": { "kind": "builtin", "type": "builtin_function" },
//!       "read_to_end": {
//!         "kind": "function",
//!         "instructions": "7c00530a",
//!         "constants": [null, 4096],
//!         "free_vars": ["buffer"]
//!       }
//!     },
//!     "net": {
//!       "Socket": { "kind": "class", "attrs": { "connect": { "kind": "builtin" } } }
//!     }
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::models::{RegistryError, Result};
use crate::namespace::{Binding, ClassDef, CodeObject, Module, Namespace};

fn default_builtin_type() -> String {
    "builtin_function".to_string()
}

/// One attribute entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryManifest {
    /// An inspectable function.
    Function {
        /// Hex-encoded instruction bytes.
        #[serde(default)]
        instructions: String,
        /// Constant pool.
        #[serde(default)]
        constants: Vec<Value>,
        /// Free-variable names.
        #[serde(default)]
        free_vars: Vec<String>,
    },
    /// An opaque callable.
    Builtin {
        /// Type signature.
        #[serde(rename = "type", default = "default_builtin_type")]
        type_name: String,
    },
    /// A class with attributes.
    Class {
        /// Class attributes.
        #[serde(default)]
        attrs: BTreeMap<String, EntryManifest>,
    },
    /// A nested module.
    Module {
        /// Module attributes.
        #[serde(default)]
        attrs: BTreeMap<String, EntryManifest>,
    },
    /// Plain data.
    Value {
        /// The value.
        value: Value,
    },
}

/// A whole namespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamespaceManifest {
    /// Import-hook chain, in resolution order.
    #[serde(default)]
    pub hooks: Vec<String>,
    /// Root modules by name.
    #[serde(default)]
    pub modules: BTreeMap<String, BTreeMap<String, EntryManifest>>,
}

impl NamespaceManifest {
    /// Reads a manifest from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parses a manifest from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Builds a live namespace.
    pub fn build(&self) -> Result<Namespace> {
        let ns = Namespace::new();
        for (name, attrs) in &self.modules {
            let module = Module::new(name.clone());
            populate(module.attrs(), name, attrs)?;
            ns.insert_module(module);
        }
        for hook in &self.hooks {
            ns.push_hook(hook.clone());
        }
        Ok(ns)
    }
}

fn populate(
    attrs: &crate::namespace::Attributes,
    prefix: &str,
    entries: &BTreeMap<String, EntryManifest>,
) -> Result<()> {
    for (name, entry) in entries {
        let qualname = format!("{}.{}", prefix, name);
        let binding = build_entry(&qualname, entry)?;
        attrs.set(name.clone(), binding);
    }
    Ok(())
}

fn build_entry(qualname: &str, entry: &EntryManifest) -> Result<Binding> {
    let binding = match entry {
        EntryManifest::Function {
            instructions,
            constants,
            free_vars,
        } => {
            let bytes = hex::decode(instructions).map_err(|e| RegistryError::Manifest {
                path: qualname.to_string(),
                reason: format!("instructions are not hex: {}", e),
            })?;
            Binding::function(
                qualname,
                CodeObject::new(bytes)
                    .with_constants(constants.clone())
                    .with_free_vars(free_vars.iter().cloned()),
            )
        }
        EntryManifest::Builtin { type_name } => Binding::builtin(qualname, type_name.clone()),
        EntryManifest::Class { attrs } => {
            let class = ClassDef::new(qualname);
            populate(class.attrs(), qualname, attrs)?;
            Binding::class(class)
        }
        EntryManifest::Module { attrs } => {
            let module = Module::new(qualname);
            populate(module.attrs(), qualname, attrs)?;
            Binding::module(module)
        }
        EntryManifest::Value { value } => Binding::value(value.clone()),
    };
    Ok(binding)
}
