//! Outbound query request
//!
//! Each attached filter value writes its own fields into the request before
//! the query runs. Values are expected to touch disjoint fields.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field map sent with the underlying query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryRequest {
    fields: Map<String, Value>,
}

impl QueryRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, returning the previous value if one was present
    pub fn set(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(field.into(), value)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_and_get() {
        let mut request = QueryRequest::new();
        assert!(request.set("page", json!(2)).is_none());
        assert_eq!(request.get("page"), Some(&json!(2)));
        assert!(request.get("status").is_none());
        assert_eq!(request.len(), 1);
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let mut request = QueryRequest::new();
        request.set("status", json!("open"));
        assert_eq!(serde_json::to_value(&request).unwrap(), json!({"status": "open"}));
    }
}
