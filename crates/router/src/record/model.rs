use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("JSON is not an object")]
    NotAnObject,
}

/// A structured log event: field name to arbitrary JSON value.
///
/// No schema is enforced. Fields keep their arrival order and serialize
/// back exactly as received, apart from whatever routing writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogRecord {
    fields: Map<String, Value>,
}

impl LogRecord {
    /// Decode one JSON object. Arrays and primitives are rejected.
    pub fn from_slice(raw: &[u8]) -> Result<Self, DecodeError> {
        match serde_json::from_slice::<Value>(raw)? {
            Value::Object(fields) => Ok(Self { fields }),
            _ => Err(DecodeError::NotAnObject),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// String value of `field`, `None` when absent or not a string.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(field.into(), value.into())
    }

    /// Append `tag` to the `tags` array, creating it if needed.
    ///
    /// A string `tags` is promoted to a one-element array first. Any other
    /// shape is left alone. The tag is never added twice.
    pub fn add_tag(&mut self, tag: &str) {
        let tags = self
            .fields
            .entry("tags")
            .or_insert_with(|| Value::Array(Vec::new()));

        if let Value::String(existing) = tags {
            *tags = Value::Array(vec![Value::String(std::mem::take(existing))]);
        }

        if let Value::Array(items) = tags {
            if !items.iter().any(|v| v.as_str() == Some(tag)) {
                items.push(Value::String(tag.to_string()));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> LogRecord {
        LogRecord::from_slice(value.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn test_from_slice_object() {
        let rec = LogRecord::from_slice(br#"{"type":"travel_agent","msg":"hello"}"#).unwrap();
        assert_eq!(rec.get_str("type"), Some("travel_agent"));
        assert_eq!(rec.get_str("msg"), Some("hello"));
        assert_eq!(rec.len(), 2);
    }

    #[test]
    fn test_from_slice_rejects_array() {
        let err = LogRecord::from_slice(b"[1,2,3]").unwrap_err();
        assert!(matches!(err, DecodeError::NotAnObject));
    }

    #[test]
    fn test_from_slice_rejects_primitive() {
        assert!(matches!(
            LogRecord::from_slice(b"42").unwrap_err(),
            DecodeError::NotAnObject
        ));
    }

    #[test]
    fn test_from_slice_rejects_invalid_json() {
        let err = LogRecord::from_slice(b"{\"type\": ").unwrap_err();
        assert!(matches!(err, DecodeError::InvalidJson(_)));
    }

    #[test]
    fn test_from_slice_rejects_non_utf8() {
        let err = LogRecord::from_slice(&[b'{', 0xff, 0xfe, b'}']).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidJson(_)));
    }

    #[test]
    fn test_get_str_non_string_is_none() {
        let rec = record(json!({"type": 7}));
        assert!(rec.get("type").is_some());
        assert_eq!(rec.get_str("type"), None);
    }

    #[test]
    fn test_serialize_preserves_unknown_fields_and_order() {
        let raw = r#"{"zeta":1,"type":"other","nested":{"a":[1,2]},"alpha":null}"#;
        let rec = LogRecord::from_slice(raw.as_bytes()).unwrap();
        assert_eq!(serde_json::to_string(&rec).unwrap(), raw);
    }

    // ── Tags ─────────────────────────────────────────────────────

    #[test]
    fn test_add_tag_creates_array() {
        let mut rec = record(json!({"msg": "x"}));
        rec.add_tag("_dateparsefailure");
        assert_eq!(rec.get("tags"), Some(&json!(["_dateparsefailure"])));
    }

    #[test]
    fn test_add_tag_appends_without_duplicates() {
        let mut rec = record(json!({"tags": ["beta"]}));
        rec.add_tag("_dateparsefailure");
        rec.add_tag("_dateparsefailure");
        assert_eq!(rec.get("tags"), Some(&json!(["beta", "_dateparsefailure"])));
    }

    #[test]
    fn test_add_tag_promotes_string() {
        let mut rec = record(json!({"tags": "beta"}));
        rec.add_tag("_dateparsefailure");
        assert_eq!(rec.get("tags"), Some(&json!(["beta", "_dateparsefailure"])));
    }

    #[test]
    fn test_add_tag_leaves_other_shapes_alone() {
        let mut rec = record(json!({"tags": {"k": "v"}}));
        rec.add_tag("_dateparsefailure");
        assert_eq!(rec.get("tags"), Some(&json!({"k": "v"})));
    }

    #[test]
    fn test_serializes_back_exactly_as_received() {
        let raw = r#"{"type":"other","trace_id":123456789012345678901234567890,"f":1.10,"z":"last","a":null}"#;
        let rec = LogRecord::from_slice(raw.as_bytes()).unwrap();
        assert_eq!(serde_json::to_string(&rec).unwrap(), raw);
    }
}
