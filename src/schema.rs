// ABOUTME: Abstract schema types for discovered data extension fields
// ABOUTME: Maps remote field value types onto JSON-schema-like type names

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// JSON-schema type names used in catalog entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonType {
    Null,
    Boolean,
    Integer,
    Number,
    String,
    Object,
}

/// Map a remote field's declared value type to an abstract schema type.
///
/// Total over all inputs: `Boolean` maps to boolean, `Decimal` and `Number` map
/// to number, and anything else (including types the remote adds later) is
/// carried as a string.
///
/// # Examples
///
/// ```
/// # use exacttarget_replicator::schema::{map_type, JsonType};
/// assert_eq!(map_type("Boolean"), JsonType::Boolean);
/// assert_eq!(map_type("Decimal"), JsonType::Number);
/// assert_eq!(map_type("EmailAddress"), JsonType::String);
/// ```
pub fn map_type(declared_type: &str) -> JsonType {
    match declared_type {
        "Boolean" => JsonType::Boolean,
        "Decimal" | "Number" => JsonType::Number,
        _ => JsonType::String,
    }
}

/// Either a single type name or a union such as `["null", "string"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypeSpec {
    Single(JsonType),
    Union(Vec<JsonType>),
}

impl TypeSpec {
    /// Union `null` into the given type, for fields that may be absent on a row.
    pub fn nullable(json_type: JsonType) -> Self {
        TypeSpec::Union(vec![JsonType::Null, json_type])
    }
}

/// Schema for a single field in a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    #[serde(rename = "type")]
    pub field_type: TypeSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldSchema {
    pub fn new(field_type: TypeSpec, description: Option<String>) -> Self {
        Self {
            field_type,
            description,
        }
    }

    /// Schema for a field discovered on a data extension: always nullable.
    pub fn discovered(declared_type: &str, description: Option<String>) -> Self {
        Self::new(TypeSpec::nullable(map_type(declared_type)), description)
    }
}

/// Whether a stream is offered to the consumer for selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Inclusion {
    #[default]
    Available,
    Automatic,
    Unsupported,
}

/// Object schema of a stream, including the consumer's selection flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSchema {
    #[serde(rename = "type")]
    pub schema_type: JsonType,
    #[serde(default)]
    pub inclusion: Inclusion,
    #[serde(default)]
    pub selected: bool,
    #[serde(default)]
    pub properties: BTreeMap<String, FieldSchema>,
}

impl Default for StreamSchema {
    fn default() -> Self {
        Self {
            schema_type: JsonType::Object,
            inclusion: Inclusion::Available,
            selected: false,
            properties: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_type_known_types() {
        assert_eq!(map_type("Boolean"), JsonType::Boolean);
        assert_eq!(map_type("Decimal"), JsonType::Number);
        assert_eq!(map_type("Number"), JsonType::Number);
        assert_eq!(map_type("Text"), JsonType::String);
        assert_eq!(map_type("Date"), JsonType::String);
    }

    #[test]
    fn test_map_type_unknown_degrades_to_string() {
        for declared in ["", "boolean", "Locale", "Phone", "SomethingNew", "NUMBER"] {
            assert_eq!(map_type(declared), JsonType::String, "input {:?}", declared);
        }
    }

    #[test]
    fn test_discovered_field_is_nullable() {
        let field = FieldSchema::discovered("Boolean", Some("opted in".to_string()));
        assert_eq!(
            field.field_type,
            TypeSpec::Union(vec![JsonType::Null, JsonType::Boolean])
        );

        let json = serde_json::to_value(&field).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": ["null", "boolean"], "description": "opted in"})
        );
    }

    #[test]
    fn test_stream_schema_defaults_on_deserialize() {
        let schema: StreamSchema = serde_json::from_value(serde_json::json!({
            "type": "object",
            "properties": {"Email": {"type": "string"}}
        }))
        .unwrap();
        assert!(!schema.selected);
        assert_eq!(schema.inclusion, Inclusion::Available);
        assert_eq!(
            schema.properties.keys().collect::<Vec<_>>(),
            vec!["Email"]
        );
    }
}
