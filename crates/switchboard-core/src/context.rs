//! Evaluation context and attribute resolution.
//!
//! Callers supply an arbitrary JSON object as the entity context. At
//! evaluation entry it is flattened once into a dotted keyspace, so the
//! condition `[foo][dfs][a]` and a pre-flattened `"foo.dfs.a"` key resolve
//! identically.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::conditions::value::{ArrayValue, Value};

/// Context for evaluating a flag.
///
/// # Example
///
/// ```rust
/// use switchboard_core::EvaluationContext;
///
/// let context = EvaluationContext::with_entity_id("u-42")
///     .entity_type("user")
///     .set("country", "US")
///     .set("tier", "gold");
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationContext {
    /// Stable identifier used as the rollout bucket key when present.
    #[serde(rename = "entityID", skip_serializing_if = "Option::is_none", default)]
    pub entity_id: Option<String>,
    /// Optional entity kind, carried through to results for export partitioning.
    #[serde(rename = "entityType", skip_serializing_if = "Option::is_none", default)]
    pub entity_type: Option<String>,
    /// Arbitrary, possibly nested attributes used by segment constraints.
    #[serde(rename = "entityContext", default)]
    pub entity_context: serde_json::Map<String, JsonValue>,
}

impl EvaluationContext {
    /// Creates an empty context (anonymous entity).
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context with an entity ID.
    pub fn with_entity_id(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: Some(entity_id.into()),
            ..Default::default()
        }
    }

    /// Sets the entity type.
    pub fn entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    /// Sets a context attribute.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.entity_context.insert(key.into(), value.into());
        self
    }

    /// Flattens the entity context into an attribute bag.
    pub fn attributes(&self) -> AttributeBag {
        AttributeBag::from_json(&self.entity_context)
    }
}

/// Flattened, typed attribute lookups for the condition evaluator.
///
/// Leaves that have no representation in the value domain (nulls, mixed or
/// nested arrays) are omitted; a condition reading one fails with an
/// unknown-variable error, which demotes its segment rather than the whole
/// evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeBag {
    values: HashMap<String, Value>,
}

impl AttributeBag {
    /// Creates an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a bag by flattening a JSON object.
    pub fn from_json(object: &serde_json::Map<String, JsonValue>) -> Self {
        let mut bag = Self::new();
        for (key, value) in object {
            flatten_into(key, value, &mut bag.values);
        }
        bag
    }

    /// Sets an attribute (builder form).
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Sets an attribute in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Looks up an attribute by dotted name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn flatten_into(prefix: &str, value: &JsonValue, out: &mut HashMap<String, Value>) {
    match value {
        JsonValue::Bool(b) => {
            out.insert(prefix.to_string(), Value::Bool(*b));
        },
        JsonValue::Number(n) => {
            if let Some(n) = n.as_f64() {
                out.insert(prefix.to_string(), Value::Number(n));
            }
        },
        JsonValue::String(s) => {
            out.insert(prefix.to_string(), Value::String(s.clone()));
        },
        JsonValue::Array(items) => {
            if let Some(array) = typed_array(items) {
                out.insert(prefix.to_string(), Value::Array(array));
            }
        },
        JsonValue::Object(object) => {
            for (key, nested) in object {
                flatten_into(&format!("{}.{}", prefix, key), nested, out);
            }
        },
        JsonValue::Null => {},
    }
}

/// Converts a JSON array to a typed array value when all elements are
/// scalars of one type.
fn typed_array(items: &[JsonValue]) -> Option<ArrayValue> {
    let first = items.first()?;
    match first {
        JsonValue::Bool(_) => {
            let values: Option<Vec<bool>> = items.iter().map(JsonValue::as_bool).collect();
            values.map(ArrayValue::Bool)
        },
        JsonValue::Number(_) => {
            let values: Option<Vec<f64>> = items.iter().map(JsonValue::as_f64).collect();
            values.map(ArrayValue::Number)
        },
        JsonValue::String(_) => {
            let values: Option<Vec<String>> = items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect();
            values.map(ArrayValue::String)
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_nested_and_preflattened_agree() {
        let nested = EvaluationContext::new()
            .set("foo", json!({"dfs": {"a": true}}))
            .set("bar", true);
        let flat = EvaluationContext::new()
            .set("foo.dfs.a", true)
            .set("bar", true);

        assert_eq!(nested.attributes(), flat.attributes());
        assert_eq!(nested.attributes().get("foo.dfs.a"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_scalar_and_array_flattening() {
        let context = EvaluationContext::new()
            .set("count", 14)
            .set("name", "OFF")
            .set("roles", json!(["admin", "ops"]))
            .set("buckets", json!([2, 3, 4]));
        let bag = context.attributes();

        assert_eq!(bag.get("count"), Some(&Value::Number(14.0)));
        assert_eq!(bag.get("name"), Some(&Value::String("OFF".into())));
        assert_eq!(
            bag.get("roles"),
            Some(&Value::Array(ArrayValue::String(vec![
                "admin".into(),
                "ops".into()
            ])))
        );
        assert_eq!(
            bag.get("buckets"),
            Some(&Value::Array(ArrayValue::Number(vec![2.0, 3.0, 4.0])))
        );
    }

    #[test]
    fn test_unrepresentable_leaves_are_omitted() {
        let context = EvaluationContext::new()
            .set("none", JsonValue::Null)
            .set("mixed", json!([1, "two"]))
            .set("objects", json!([{"a": 1}]))
            .set("ok", 1);
        let bag = context.attributes();

        assert_eq!(bag.len(), 1);
        assert!(bag.get("none").is_none());
        assert!(bag.get("mixed").is_none());
        assert!(bag.get("objects").is_none());
    }

    #[test]
    fn test_wire_field_spellings() {
        let context = EvaluationContext::with_entity_id("u-1").entity_type("user");
        let encoded = serde_json::to_value(&context).unwrap();
        assert_eq!(
            encoded,
            json!({"entityID": "u-1", "entityType": "user", "entityContext": {}})
        );
    }
}
