use std::collections::BTreeMap;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::Value;

/// Characters percent-encoded in query-string values. Unreserved
/// characters pass through, as does the comma used as a list separator
/// in params like `_fields`.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b',');

/// REST query parameters with stable ordering and structural equality.
///
/// Two queries built from the same parameters are equal no matter the
/// insertion order, which is what lets a query double as a provenance key
/// for received records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityQuery {
    params: BTreeMap<String, Value>,
}

impl EntityQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a query from a selector argument. Only JSON objects form a
    /// query; anything else means "no query".
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self {
                params: map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            }),
            _ => None,
        }
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    pub fn is_trivial(&self) -> bool {
        self.params.is_empty()
    }

    /// The `_fields` restriction, if any: either a comma-separated string
    /// or an array of field names.
    pub fn fields(&self) -> Option<Vec<String>> {
        match self.params.get("_fields")? {
            Value::String(s) => Some(
                s.split(',')
                    .map(|f| f.trim().to_string())
                    .filter(|f| !f.is_empty())
                    .collect(),
            ),
            Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Force-include the primary key field in a `_fields` restriction so
    /// record identity is always resolvable. No-op without `_fields`.
    pub fn with_key_field(mut self, key_field: &str) -> Self {
        if let Some(mut fields) = self.fields() {
            if !fields.iter().any(|f| f == key_field) {
                fields.push(key_field.to_string());
            }
            self.params
                .insert("_fields".to_string(), Value::String(fields.join(",")));
        }
        self
    }

    /// Stable query-string serialization for the REST boundary. Always
    /// carries `context=edit`; the context marker is not part of the
    /// provenance key.
    pub fn to_query_string(&self) -> String {
        let mut parts = vec!["context=edit".to_string()];
        for (key, value) in &self.params {
            parts.push(format!(
                "{}={}",
                key,
                utf8_percent_encode(&render_value(value), QUERY_VALUE)
            ));
        }
        parts.join("&")
    }

    pub fn to_value(&self) -> Value {
        Value::Object(
            self.params
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .map(render_value)
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}
