//! Per-invocation context handed to every user function.

use std::collections::HashMap;

use serde_json::Value;

/// Caller-supplied context passed through buses and pipelines unchanged.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Correlates every command and event of one cascade.
    pub correlation_id: Option<String>,

    metadata: HashMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Adds a metadata entry.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }
}
