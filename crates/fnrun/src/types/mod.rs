//! Foundational types for functions, triggers and stored objects.
//!
//! Persisted types are `Serialize + Deserialize + Debug + Clone`. Map fields
//! use `BTreeMap` so serialized objects are stable across runs.

pub mod function;
pub mod trace;
pub mod trigger;

pub use function::*;
pub use trace::*;
pub use trigger::*;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::DatabaseError;

// ---------------------------------------------------------------------------
// Spaces and object references
// ---------------------------------------------------------------------------

/// Identifies an isolated data space. Triggers are unique per space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpaceKey(pub String);

impl SpaceKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to a stored object by id. Serialized as `{"@ref": "<id>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectRef {
    #[serde(rename = "@ref")]
    pub id: String,
}

impl ObjectRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Collect every reference nested anywhere inside a JSON value.
    pub fn collect(value: &Value) -> Vec<ObjectRef> {
        let mut refs = Vec::new();
        collect_refs(value, &mut refs);
        refs
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.id)
    }
}

fn collect_refs(value: &Value, refs: &mut Vec<ObjectRef>) {
    match value {
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(Value::String(id)) = map.get("@ref") {
                    refs.push(ObjectRef::new(id.clone()));
                    return;
                }
            }
            for child in map.values() {
                collect_refs(child, refs);
            }
        }
        Value::Array(items) => {
            for child in items {
                collect_refs(child, refs);
            }
        }
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Stored objects
// ---------------------------------------------------------------------------

/// A typed JSON document held by a [`Database`](crate::traits::Database).
///
/// `version` is bumped by the database on every write and never decreases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbObject {
    pub id: String,
    pub typename: String,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub data: Value,
}

impl DbObject {
    /// New object with a random id.
    pub fn new(typename: impl Into<String>, data: Value) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), typename, data)
    }

    pub fn with_id(id: impl Into<String>, typename: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            typename: typename.into(),
            version: 0,
            data,
        }
    }

    pub fn reference(&self) -> ObjectRef {
        ObjectRef::new(self.id.clone())
    }

    /// Decode the payload into a typed value.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, DatabaseError> {
        serde_json::from_value(self.data.clone()).map_err(|e| DatabaseError::Decode {
            id: self.id.clone(),
            message: e.to_string(),
        })
    }
}

/// Object filter used for queries and live subscriptions.
///
/// Empty `types` matches any typename. `properties` match top-level fields
/// of the object's data by equality.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Value>,
}

impl Filter {
    pub fn of_type(typename: impl Into<String>) -> Self {
        Self {
            types: vec![typename.into()],
            ..Self::default()
        }
    }

    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: Some(ids.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn matches(&self, object: &DbObject) -> bool {
        if !self.types.is_empty() && !self.types.iter().any(|t| *t == object.typename) {
            return false;
        }
        if let Some(ids) = &self.ids {
            if !ids.iter().any(|id| *id == object.id) {
                return false;
            }
        }
        self.properties
            .iter()
            .all(|(key, expected)| object.data.get(key) == Some(expected))
    }
}

/// One emission of a live query: the full matching set plus the ids whose
/// content changed since the previous emission.
#[derive(Debug, Clone, Default)]
pub struct QuerySnapshot {
    pub objects: Vec<DbObject>,
    pub changed: Vec<String>,
}

// ---------------------------------------------------------------------------
// Queues
// ---------------------------------------------------------------------------

/// An item appended to a queue. Positions start at 1 and increase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub position: u64,
    pub object: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_ref_wire_shape() {
        let reference = ObjectRef::new("fn-1");
        assert_eq!(
            serde_json::to_value(&reference).expect("serialize"),
            json!({"@ref": "fn-1"})
        );
    }

    #[test]
    fn test_collect_nested_refs() {
        let data = json!({
            "owner": {"@ref": "a"},
            "items": [{"@ref": "b"}, {"name": "x", "link": {"@ref": "c"}}],
        });
        let ids: Vec<String> = ObjectRef::collect(&data).into_iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), 3);
        for id in ["a", "b", "c"] {
            assert!(ids.iter().any(|found| found == id), "missing {id}");
        }
    }

    #[test]
    fn test_filter_matches() {
        let object = DbObject::with_id("o1", "example.task", json!({"status": "open"}));
        assert!(Filter::of_type("example.task").matches(&object));
        assert!(!Filter::of_type("example.other").matches(&object));
        assert!(Filter::default().matches(&object));
        assert!(Filter::ids(["o1"]).matches(&object));
        assert!(Filter::of_type("example.task")
            .property("status", json!("open"))
            .matches(&object));
        assert!(!Filter::of_type("example.task")
            .property("status", json!("done"))
            .matches(&object));
    }
}
