//! # Core Data Models for the Sealing Registry
//!
//! This module defines the fundamental types shared by the fingerprint engine,
//! the sealing registry and the restore engine.
//!
//! ## Threat Model
//!
//! The types in this module help defend against:
//!
//! - **Type Confusion**: `Hash` and `Fingerprint` keep digests apart from other byte data.
//! - **Ambiguous Targets**: `TargetPath` is validated once, so every later
//!   lookup walks the same segments.
//! - **Silent Drops**: `SealWarning` records every excluded target instead of
//!   discarding it.
//!
//! ## References
//!
//! - NIST FIPS 180-4 for hash size (SHA-256 = 32 bytes)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::namespace::ResolveError;

/// SHA-256 hash output size in bytes.
pub const HASH_SIZE: usize = 32;

/// A 32-byte SHA-256 hash value.
pub type Hash = [u8; HASH_SIZE];

/// The kind of a watched reference.
///
/// Selects the fingerprint strategy. Anything that is neither a plain function
/// nor a class is treated as opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefKind {
    /// A first-class function whose code can be inspected.
    Function,

    /// A native callable, module or data value with no inspectable structure.
    BuiltinOrOpaque,

    /// A class (attribute container with its own identity).
    Class,
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RefKind::Function => "function",
            RefKind::BuiltinOrOpaque => "builtin",
            RefKind::Class => "class",
        };
        f.write_str(name)
    }
}

/// A comparable description of a reference at a point in time.
///
/// # Variants
///
/// - `Structural`: digests of a function's instruction bytes, constant pool
///   and free-variable names. Rebinding to an equivalent function keeps the
///   fingerprint; editing the code in place changes it.
/// - `Identity`: identity token plus type signature. Any rebinding changes
///   the token, even to an object of the same type.
///
/// # Security Notes
///
/// Equality is plain field equality. Every input sequence is canonicalized
/// before hashing, so recomputing a fingerprint on an unmutated reference
/// always yields an equal value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Fingerprint {
    /// Structural fingerprint of an inspectable function.
    Structural {
        /// Digest of the instruction sequence.
        #[serde(with = "hex_hash")]
        instructions: Hash,
        /// Digest of the canonicalized constant pool.
        #[serde(with = "hex_hash")]
        constants: Hash,
        /// Digest of the ordered free-variable names.
        #[serde(with = "hex_hash")]
        free_vars: Hash,
    },

    /// Identity fingerprint of an opaque reference.
    Identity {
        /// Address of the reference's shared allocation.
        identity: usize,
        /// Type signature, e.g. `builtin_function` or `class`.
        type_signature: String,
    },
}

impl Fingerprint {
    /// Short name of the strategy that produced this fingerprint.
    #[must_use]
    pub fn strategy(&self) -> &'static str {
        match self {
            Fingerprint::Structural { .. } => "structural",
            Fingerprint::Identity { .. } => "identity",
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fingerprint::Structural {
                instructions,
                constants,
                free_vars,
            } => write!(
                f,
                "code:{} consts:{} free:{}",
                short_hex(instructions),
                short_hex(constants),
                short_hex(free_vars)
            ),
            Fingerprint::Identity {
                identity,
                type_signature,
            } => write!(f, "{}@{:#x}", type_signature, identity),
        }
    }
}

/// First eight bytes of a digest, hex encoded.
fn short_hex(hash: &Hash) -> String {
    hex::encode(&hash[..8])
}

mod hex_hash {
    use super::{Hash, HASH_SIZE};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hash: &Hash, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(hash))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Hash, D::Error> {
        let text = String::deserialize(deserializer)?;
        let bytes = hex::decode(&text).map_err(D::Error::custom)?;
        <[u8; HASH_SIZE]>::try_from(bytes.as_slice())
            .map_err(|_| D::Error::custom(format!("expected {} bytes", HASH_SIZE)))
    }
}

/// A validated dotted path such as `net.Socket.connect`.
///
/// The first segment names a root module; the last names the watched
/// attribute; anything in between must resolve to attribute containers.
///
/// # Example
///
/// ```rust
/// use patchtrap_registry::TargetPath;
///
/// let path: TargetPath = "net.Socket.connect".parse().unwrap();
/// assert_eq!(path.root(), "net");
/// assert_eq!(path.attribute(), "connect");
/// assert_eq!(path.holder().unwrap().to_string(), "net.Socket");
///
/// assert!("builtins".parse::<TargetPath>().is_err());
/// assert!("a..b".parse::<TargetPath>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetPath {
    segments: Vec<String>,
}

impl TargetPath {
    /// Parses a dotted path, rejecting empty segments and bare roots.
    pub fn parse(raw: &str) -> std::result::Result<Self, PathError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PathError::Empty);
        }
        let segments: Vec<String> = trimmed.split('.').map(str::to_string).collect();
        if segments.iter().any(|s| s.trim().is_empty()) {
            return Err(PathError::EmptySegment(trimmed.to_string()));
        }
        if segments.len() < 2 {
            return Err(PathError::MissingAttribute(trimmed.to_string()));
        }
        Ok(Self { segments })
    }

    /// The root module name.
    #[must_use]
    pub fn root(&self) -> &str {
        &self.segments[0]
    }

    /// The final attribute name.
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.segments[self.segments.len() - 1]
    }

    /// All segments in order.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Segments between the root and the attribute.
    #[must_use]
    pub fn intermediate(&self) -> &[String] {
        &self.segments[1..self.segments.len() - 1]
    }

    /// The path of the holder, if the holder is itself a watchable path.
    ///
    /// Returns `None` when the holder is a root module (`io` for `io.open`).
    #[must_use]
    pub fn holder(&self) -> Option<TargetPath> {
        if self.segments.len() > 2 {
            Some(TargetPath {
                segments: self.segments[..self.segments.len() - 1].to_vec(),
            })
        } else {
            None
        }
    }

    /// The holder rendered as a dotted string (root included).
    #[must_use]
    pub fn holder_name(&self) -> String {
        self.segments[..self.segments.len() - 1].join(".")
    }
}

impl fmt::Display for TargetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl FromStr for TargetPath {
    type Err = PathError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Errors from parsing a dotted path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The path was empty.
    #[error("empty target path")]
    Empty,

    /// The path contains an empty segment (`a..b`, `.a`, `a.`).
    #[error("invalid dotted name '{0}': empty segment")]
    EmptySegment(String),

    /// The path names only a root module.
    #[error("invalid dotted name '{0}': expected <module>.<attribute>")]
    MissingAttribute(String),
}

/// A non-fatal problem found while sealing.
///
/// The affected entry is excluded and sealing continues with the remainder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealWarning {
    /// The watch-list entry as given.
    pub target: String,
    /// Why the entry was excluded.
    pub reason: String,
}

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A watched path does not resolve (`TargetUnresolvable`).
    #[error("target unresolvable: {0}")]
    Unresolvable(#[from] ResolveError),

    /// A watched path is malformed.
    #[error("invalid target path: {0}")]
    InvalidPath(#[from] PathError),

    /// Failed to read a namespace manifest.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse a namespace manifest.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A manifest entry is invalid.
    #[error("invalid manifest entry '{path}': {reason}")]
    Manifest {
        /// Dotted location of the entry.
        path: String,
        /// What is wrong with it.
        reason: String,
    },
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
