//! Object schema types carried by the snapshot
//!
//! The server describes every exposed object exactly once, in the init
//! response: its current property values, callable methods, emittable
//! signals, and enum tables. Property values may reference other exposed
//! objects via the `{"__object__": "<id>"}` wire convention.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key marking a JSON object as a reference to another exposed object
const OBJECT_REF_KEY: &str = "__object__";

/// Per-object schema from the snapshot
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjectSchema {
    /// Property name to initial value
    #[serde(default)]
    pub properties: HashMap<String, Value>,
    /// Callable method names
    #[serde(default)]
    pub methods: Vec<String>,
    /// Emittable signal names
    #[serde(default)]
    pub signals: Vec<String>,
    /// Enum name to member-name/ordinal table
    #[serde(default)]
    pub enums: HashMap<String, HashMap<String, i64>>,
}

/// Build a property value referencing another exposed object
pub fn object_ref(object_id: &str) -> Value {
    let mut map = serde_json::Map::new();
    map.insert(OBJECT_REF_KEY.into(), Value::String(object_id.into()));
    Value::Object(map)
}

/// Extract the object id from a reference-valued property, if it is one
pub fn referenced_object(value: &Value) -> Option<&str> {
    value
        .as_object()
        .and_then(|map| map.get(OBJECT_REF_KEY))
        .and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_ref_round_trip() {
        let value = object_ref("systemLogic");
        assert_eq!(value, json!({"__object__": "systemLogic"}));
        assert_eq!(referenced_object(&value), Some("systemLogic"));
    }

    #[test]
    fn test_plain_values_are_not_references() {
        assert_eq!(referenced_object(&json!("systemLogic")), None);
        assert_eq!(referenced_object(&json!(42)), None);
        assert_eq!(referenced_object(&json!({"object": "x"})), None);
    }

    #[test]
    fn test_schema_defaults_for_missing_sections() {
        let schema: ObjectSchema = serde_json::from_str(r#"{"methods": ["ping"]}"#).unwrap();
        assert_eq!(schema.methods, vec!["ping"]);
        assert!(schema.properties.is_empty());
        assert!(schema.signals.is_empty());
        assert!(schema.enums.is_empty());
    }

    #[test]
    fn test_enum_table_round_trip() {
        let mut members = HashMap::new();
        members.insert("Off".to_string(), 0);
        members.insert("On".to_string(), 1);
        let mut enums = HashMap::new();
        enums.insert("PowerState".to_string(), members);

        let schema = ObjectSchema {
            enums,
            ..Default::default()
        };
        let text = serde_json::to_string(&schema).unwrap();
        let decoded: ObjectSchema = serde_json::from_str(&text).unwrap();
        assert_eq!(decoded.enums["PowerState"]["On"], 1);
    }
}
