//! Structured keys identifying stored entities.
//!
//! A key is a path of (kind, identifier) segments. A [`Key`] is complete:
//! every segment carries an identifier. A [`PartialKey`] ends in a kind
//! whose identifier the server has not assigned yet.

use serde::Deserialize;
use serde::Serialize;

/// Identifier of a single path segment: a caller-assigned name or a
/// server-assigned numeric id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyId {
    Name(String),
    Numeric(i64),
}

impl From<&str> for KeyId {
    fn from(name: &str) -> Self {
        KeyId::Name(name.to_string())
    }
}

impl From<String> for KeyId {
    fn from(name: String) -> Self {
        KeyId::Name(name)
    }
}

impl From<i64> for KeyId {
    fn from(id: i64) -> Self {
        KeyId::Numeric(id)
    }
}

/// One complete path segment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathElement {
    pub kind: String,
    pub id: KeyId,
}

impl PathElement {
    pub fn new(kind: impl Into<String>, id: impl Into<KeyId>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

/// A complete key: a non-empty path where every segment has an identifier.
///
/// Equality and hashing are structural; a `Key` is a valid map key.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    path: Vec<PathElement>,
}

/// Deserialization enforces the non-empty-path invariant the
/// constructors assert, so no decoded `Key` can panic in accessors.
impl<'de> Deserialize<'de> for Key {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            path: Vec<PathElement>,
        }
        let raw = Raw::deserialize(deserializer)?;
        if raw.path.is_empty() {
            return Err(serde::de::Error::custom("key path must not be empty"));
        }
        Ok(Key { path: raw.path })
    }
}

impl Key {
    /// Create a single-segment key.
    pub fn new(kind: impl Into<String>, id: impl Into<KeyId>) -> Self {
        Self {
            path: vec![PathElement::new(kind, id)],
        }
    }

    /// Create a key from a full path.
    ///
    /// The path must be non-empty.
    pub fn from_path(path: Vec<PathElement>) -> Self {
        assert!(!path.is_empty(), "KEY: path must not be empty");
        Self { path }
    }

    /// Extend this key with a child segment.
    pub fn child(mut self, kind: impl Into<String>, id: impl Into<KeyId>) -> Self {
        self.path.push(PathElement::new(kind, id));
        self
    }

    /// Full path, ancestors first.
    pub fn path(&self) -> &[PathElement] {
        &self.path
    }

    /// Kind of the final segment.
    pub fn kind(&self) -> &str {
        &self.path[self.path.len() - 1].kind
    }

    /// Identifier of the final segment.
    pub fn id(&self) -> &KeyId {
        &self.path[self.path.len() - 1].id
    }

    /// Drop the final identifier, yielding the partial key the server
    /// would fill in during id allocation.
    pub fn to_partial(&self) -> PartialKey {
        let mut ancestors = self.path.clone();
        let last = ancestors.pop().expect("KEY: path must not be empty");
        PartialKey { ancestors, kind: last.kind }
    }
}

/// A key whose final segment has a kind but no identifier yet.
///
/// Not hashable on purpose: two partial keys are not "the same record"
/// until the server assigns identifiers, so they are tracked positionally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartialKey {
    ancestors: Vec<PathElement>,
    kind: String,
}

impl PartialKey {
    /// Create a partial key with no ancestors.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            ancestors: Vec::new(),
            kind: kind.into(),
        }
    }

    /// Create a partial key under an ancestor path.
    pub fn with_ancestors(ancestors: Vec<PathElement>, kind: impl Into<String>) -> Self {
        Self {
            ancestors,
            kind: kind.into(),
        }
    }

    /// Complete ancestor segments, outermost first.
    pub fn ancestors(&self) -> &[PathElement] {
        &self.ancestors
    }

    /// Kind of the pending final segment.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Complete this key with a server-assigned (or caller-chosen) id.
    pub fn complete(self, id: impl Into<KeyId>) -> Key {
        let mut path = self.ancestors;
        path.push(PathElement::new(self.kind, id));
        Key { path }
    }
}

/// A complete key converts by trimming its final id, so id allocation
/// accepts either form.
impl From<Key> for PartialKey {
    fn from(key: Key) -> Self {
        key.to_partial()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_structural_equality() {
        let a = Key::new("user", "alice");
        let b = Key::new("user", "alice");
        let c = Key::new("user", 42);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn key_child_extends_path() {
        let key = Key::new("account", 7).child("user", "alice");
        assert_eq!(key.path().len(), 2);
        assert_eq!(key.kind(), "user");
        assert_eq!(key.id(), &KeyId::Name("alice".to_string()));
    }

    #[test]
    fn to_partial_trims_final_id() {
        let key = Key::new("account", 7).child("user", "alice");
        let partial = key.to_partial();
        assert_eq!(partial.kind(), "user");
        assert_eq!(partial.ancestors(), &[PathElement::new("account", 7)]);
    }

    #[test]
    fn partial_complete_round_trip() {
        let partial = PartialKey::with_ancestors(vec![PathElement::new("account", 7)], "user");
        let key = partial.complete(99);
        assert_eq!(key, Key::new("account", 7).child("user", 99));
    }

    #[test]
    fn key_usable_as_map_key() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(Key::new("user", "alice"), 1);
        assert_eq!(map.get(&Key::new("user", "alice")), Some(&1));
    }

    #[test]
    fn key_serialization_roundtrip() {
        let key = Key::new("account", 7).child("user", "alice");
        let json = serde_json::to_string(&key).unwrap();
        let deserialized: Key = serde_json::from_str(&json).unwrap();
        assert_eq!(key, deserialized);
    }

    #[test]
    fn deserializing_an_empty_path_is_rejected() {
        let err = serde_json::from_str::<Key>(r#"{"path":[]}"#).unwrap_err();
        assert!(err.to_string().contains("path must not be empty"));
    }
}
