//! Well-known tag keys and the mapping between tags and span attributes.

use std::collections::BTreeMap;

use opentelemetry::{KeyValue, Value};

/// A set of span or process tags.
pub type Tags = BTreeMap<String, serde_json::Value>;

pub const SPAN_KIND: &str = "span.kind";
pub const SPAN_KIND_RPC_SERVER: &str = "server";

pub const HTTP_METHOD: &str = "http.method";
pub const HTTP_URL: &str = "http.url";
pub const HTTP_STATUS_CODE: &str = "http.status_code";

pub const ERROR: &str = "error";
pub const ERROR_MESSAGE: &str = "error.message";
pub const ERROR_STACK: &str = "error.stack";

pub const SAMPLER_TYPE: &str = "sampler.type";
pub const SAMPLER_PARAM: &str = "sampler.param";

/// Serialized handler output.
pub const RESPONSE_BODY: &str = "response.body";
/// Set when a span was closed because its owner was dropped mid-flight.
pub const CANCELLED: &str = "cancelled";

pub const TRACER_VERSION: &str = "hookspan.version";
pub const CLIENT_UUID: &str = "client-uuid";

/// Attribute prefix under which baggage items are recorded on spans.
pub const BAGGAGE_ATTRIBUTE_PREFIX: &str = "baggage.";

/// Convert a tag to a span attribute.
///
/// Objects, arrays and null have no attribute form and are stored as JSON text.
pub(crate) fn to_attribute(key: &str, value: &serde_json::Value) -> KeyValue {
    let value = match value {
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::I64(i),
            None => Value::F64(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::from(s.clone()),
        other => Value::from(other.to_string()),
    };
    KeyValue::new(key.to_string(), value)
}

/// Convert a span attribute value back to a tag value.
pub(crate) fn from_attribute(value: &Value) -> serde_json::Value {
    match value {
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::I64(i) => serde_json::Value::from(*i),
        Value::F64(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s.as_str().to_string()),
        other => serde_json::Value::String(other.to_string()),
    }
}
