//! Value Normalizer
//!
//! Turns a [`ConfigValue`] into the string the driver reads from its
//! environment. An empty result means "leave the variable out".

use crate::domain::types::ConfigValue;
use serde_json::{Map, Value};
use tracing::{error, warn};

/// Normalize a config value to canonical JSON text.
///
/// Mappings are serialized with sorted keys. Strings holding a JSON object are
/// re-serialized the same way; any other string is forwarded untouched. Other
/// shapes cannot be represented and yield an empty string.
pub fn normalize(value: &ConfigValue) -> String {
    match value {
        ConfigValue::Mapping(map) => to_json(map),
        ConfigValue::Text(s) => match serde_json::from_str::<Map<String, Value>>(s) {
            Ok(map) => to_json(&map),
            Err(_) => {
                warn!("Forwarding unmodified input {:?} to Ember", s);
                s.clone()
            }
        },
        ConfigValue::Unsupported(other) => {
            error!("Could not marshal {} ({}) to JSON", other, shape_of(other));
            String::new()
        }
    }
}

/// Normalize an optional field; absent fields are empty
pub fn normalize_opt(value: Option<&ConfigValue>) -> String {
    value.map(normalize).unwrap_or_default()
}

fn to_json(map: &Map<String, Value>) -> String {
    // A map of JSON values always serializes
    serde_json::to_string(map).unwrap_or_default()
}

fn shape_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
