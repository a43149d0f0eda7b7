//! Actor input
//!
//! Task fields plus an optional binary document. Binary content never reaches a
//! prompt: [`ActorInput::sanitized`] replaces it with a size descriptor.

use serde_json::{json, Map, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct ActorInput {
    pub data: Map<String, Value>,
    pub document: Option<Arc<[u8]>>,
}

impl ActorInput {
    pub fn new(data: Map<String, Value>) -> Self {
        Self {
            data,
            document: None,
        }
    }

    /// Objects are used as-is; any other value is stored under `"value"`
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::new(map),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                Self::new(map)
            }
        }
    }

    pub fn with_document(mut self, document: impl Into<Arc<[u8]>>) -> Self {
        self.document = Some(document.into());
        self
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    /// Numeric field, accepting numbers or numeric strings
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.data.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().replace(',', "").parse().ok(),
            _ => None,
        }
    }

    pub fn has_document(&self) -> bool {
        self.document.as_ref().is_some_and(|d| !d.is_empty())
    }

    /// JSON view safe for prompts
    pub fn sanitized(&self) -> Value {
        let mut data = self.data.clone();
        let size = self.document.as_ref().map(|d| d.len()).unwrap_or(0);
        data.insert(
            "document_info".to_string(),
            json!({ "has_payload": self.has_document(), "size_bytes": size }),
        );
        Value::Object(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitized_replaces_document() {
        let input = ActorInput::default()
            .with_field("name", "Asha")
            .with_document(vec![0u8, 159, 146, 150]);

        let view = input.sanitized();
        assert_eq!(view["name"], "Asha");
        assert_eq!(view["document_info"]["has_payload"], true);
        assert_eq!(view["document_info"]["size_bytes"], 4);
        assert!(!view.to_string().contains("159"));
    }

    #[test]
    fn test_sanitized_without_document() {
        let view = ActorInput::default().sanitized();
        assert_eq!(view["document_info"]["has_payload"], false);
        assert_eq!(view["document_info"]["size_bytes"], 0);
    }

    #[test]
    fn test_get_f64_accepts_strings() {
        let input = ActorInput::default()
            .with_field("income", "5,00,000")
            .with_field("age", 31);
        assert_eq!(input.get_f64("income"), Some(500000.0));
        assert_eq!(input.get_f64("age"), Some(31.0));
        assert_eq!(input.get_f64("missing"), None);
    }

    #[test]
    fn test_from_value_wraps_scalars() {
        let input = ActorInput::from_value(json!(5));
        assert_eq!(input.get("value"), Some(&json!(5)));
    }
}
