//! Execution context (§3): a value supplied by the host per request, opaque
//! to the kernel. Middleware may derive additional fields visible to
//! downstream stages.
//!
//! The teacher's `agent::tools::base::ExecutionContext` is a concrete struct
//! (`channel`, `chat_id`, …) because it knows its host's fields ahead of
//! time. The kernel cannot: the derived-context shape is a registration-time
//! concern per host, not something this crate can express as a Rust type
//! (DESIGN NOTES). So the context is a generic, ordered bag of JSON values;
//! a host middleware stack agrees on field names out of band.

use indexmap::IndexMap;
use serde_json::Value;

#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    fields: IndexMap<String, Value>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Derive a field for downstream middleware/handlers to observe. This is
    /// the only sanctioned way to pass data forward through the chain (§4.2).
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }
}

impl FromIterator<(String, Value)> for ExecutionContext {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn insert_then_get_roundtrips() {
        let mut ctx = ExecutionContext::new();
        ctx.insert("user", json!({"id": "u1"}));
        assert_eq!(ctx.get("user"), Some(&json!({"id": "u1"})));
    }

    #[test]
    fn missing_field_is_none() {
        let ctx = ExecutionContext::new();
        assert!(ctx.get("nope").is_none());
        assert!(!ctx.contains("nope"));
    }

    #[test]
    fn derived_fields_are_visible_after_insert() {
        let mut ctx = ExecutionContext::new();
        assert!(!ctx.contains("auth_user"));
        ctx.insert("auth_user", json!("u1"));
        assert!(ctx.contains("auth_user"));
    }
}
