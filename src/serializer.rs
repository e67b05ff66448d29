//! Body serialization for service requests and responses.

use serde_json::Value;

/// Converts request bodies to text and response text back to values.
///
/// The format name is used for the `Content-Type` header as
/// `application/<format>`.
pub trait Serializer: Send + Sync {
    /// Short format name such as `json`.
    fn format(&self) -> &str;

    fn serialize(&self, value: &Value) -> Result<String, String>;

    fn deserialize(&self, text: &str) -> Result<Value, String>;
}

/// JSON serializer backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn format(&self) -> &str {
        "json"
    }

    fn serialize(&self, value: &Value) -> Result<String, String> {
        serde_json::to_string(value).map_err(|e| e.to_string())
    }

    fn deserialize(&self, text: &str) -> Result<Value, String> {
        serde_json::from_str(text).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_format_and_serialization() {
        let serializer = JsonSerializer;
        assert_eq!(serializer.format(), "json");
        assert_eq!(
            serializer.serialize(&json!({"name": "tower", "width": 1.5})).unwrap(),
            r#"{"name":"tower","width":1.5}"#
        );
    }

    #[test]
    fn test_json_deserialization_errors_are_reported() {
        let serializer = JsonSerializer;
        assert_eq!(serializer.deserialize("null").unwrap(), Value::Null);
        assert!(serializer.deserialize("{not json").is_err());
    }
}
