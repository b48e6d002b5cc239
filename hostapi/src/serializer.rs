//! Property serialization capability.
//!
//! The guest receives event properties as a JSON object in a single UTF-8
//! buffer. `CamelCaseJson` is the default encoder: it normalizes object keys
//! to camelCase the way .NET's `JsonNamingPolicy.CamelCase` does (only a
//! leading run of capitals is lowered, so `$current_url` and `plan` pass
//! through untouched while `PlanName` becomes `planName` and `URLPath`
//! becomes `urlPath`).

use serde_json::{Map, Value};

use crate::error::HostError;

/// Encodes the property map handed to `capture` into the guest wire format.
pub trait PropertySerializer: Send + Sync {
    fn serialize(&self, properties: &Map<String, Value>) -> Result<String, HostError>;
}

/// JSON encoder with camelCase keys at every nesting level.
#[derive(Debug, Clone, Copy, Default)]
pub struct CamelCaseJson {
    /// Emit indented JSON instead of the compact form.
    pub pretty: bool,
}

impl CamelCaseJson {
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl PropertySerializer for CamelCaseJson {
    fn serialize(&self, properties: &Map<String, Value>) -> Result<String, HostError> {
        let normalized = Value::Object(camel_case_object(properties));
        let encoded = if self.pretty {
            serde_json::to_string_pretty(&normalized)
        } else {
            serde_json::to_string(&normalized)
        };
        encoded.map_err(HostError::serialization)
    }
}

fn camel_case_object(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(key, value)| (camel_case(key), camel_case_value(value)))
        .collect()
}

fn camel_case_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(camel_case_object(map)),
        Value::Array(items) => Value::Array(items.iter().map(camel_case_value).collect()),
        other => other.clone(),
    }
}

/// Lower the leading run of upper-case characters.
///
/// The last capital of a run is kept when it starts the next word
/// (`URLPath` -> `urlPath`).
pub fn camel_case(key: &str) -> String {
    let mut chars: Vec<char> = key.chars().collect();
    if chars.first().map_or(true, |c| !c.is_uppercase()) {
        return key.to_string();
    }

    for i in 0..chars.len() {
        if i == 1 && !chars[i].is_uppercase() {
            break;
        }
        let has_next = i + 1 < chars.len();
        if i > 0 && has_next && !chars[i + 1].is_uppercase() {
            if chars[i + 1] == ' ' {
                chars[i] = to_lower(chars[i]);
            }
            break;
        }
        chars[i] = to_lower(chars[i]);
    }

    chars.into_iter().collect()
}

fn to_lower(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}
