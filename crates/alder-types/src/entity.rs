//! Entities: keys plus ordered named property values.

use serde::Deserialize;
use serde::Serialize;

use crate::key::Key;
use crate::key::PartialKey;

/// A single property value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    Text(String),
    Blob(Vec<u8>),
    KeyRef(Key),
    List(Vec<Value>),
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

/// A stored record: a complete [`Key`] plus properties in insertion order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    key: Key,
    properties: Vec<(String, Value)>,
}

impl Entity {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            properties: Vec::new(),
        }
    }

    /// Set a property, replacing any existing value under the same name
    /// while keeping its original position.
    pub fn property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.properties.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.properties.push((name, value)),
        }
        self
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Properties in insertion order.
    pub fn properties(&self) -> &[(String, Value)] {
        &self.properties
    }
}

/// A record pending key completion: a [`PartialKey`] plus properties.
///
/// The server assigns the final identifier at commit time; until then the
/// record has no complete key and cannot be deduplicated against others.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PartialEntity {
    key: PartialKey,
    properties: Vec<(String, Value)>,
}

impl PartialEntity {
    pub fn new(key: PartialKey) -> Self {
        Self {
            key,
            properties: Vec::new(),
        }
    }

    /// Set a property, replacing any existing value under the same name.
    pub fn property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.properties.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.properties.push((name, value)),
        }
        self
    }

    pub fn key(&self) -> &PartialKey {
        &self.key
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn properties(&self) -> &[(String, Value)] {
        &self.properties
    }

    /// Promote to a complete entity once the server has assigned a key.
    pub fn into_entity(self, key: Key) -> Entity {
        Entity {
            key,
            properties: self.properties,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_order_preserved() {
        let entity = Entity::new(Key::new("user", 1))
            .property("name", "alice")
            .property("age", 30i64)
            .property("active", true);
        let names: Vec<&str> = entity.properties().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["name", "age", "active"]);
    }

    #[test]
    fn property_overwrite_keeps_position() {
        let entity = Entity::new(Key::new("user", 1))
            .property("name", "alice")
            .property("age", 30i64)
            .property("name", "bob");
        let names: Vec<&str> = entity.properties().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["name", "age"]);
        assert_eq!(entity.get("name"), Some(&Value::Text("bob".to_string())));
    }

    #[test]
    fn partial_entity_completion() {
        let partial = PartialEntity::new(PartialKey::new("user")).property("name", "carol");
        let entity = partial.into_entity(Key::new("user", 5));
        assert_eq!(entity.key(), &Key::new("user", 5));
        assert_eq!(entity.get("name"), Some(&Value::Text("carol".to_string())));
    }

    #[test]
    fn entity_serialization_roundtrip() {
        let entity = Entity::new(Key::new("user", 1))
            .property("name", "alice")
            .property("score", 2.5f64);
        let json = serde_json::to_string(&entity).unwrap();
        let deserialized: Entity = serde_json::from_str(&json).unwrap();
        assert_eq!(entity, deserialized);
    }
}
