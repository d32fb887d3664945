use dashmap::DashMap;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::sync::Arc;

use crate::error::{FlowError, Result};

/// Key/value state shared by the tasks of one graph execution.
///
/// Values are stored as JSON so that any serde type can travel between tasks.
/// Cloning is cheap and every clone sees the same underlying map.
#[derive(Clone, Debug, Default)]
pub struct Context {
    data: Arc<DashMap<String, Value>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, key: impl Into<String>, value: impl Serialize) -> Result<()> {
        let key = key.into();
        let value = serde_json::to_value(value)
            .map_err(|e| FlowError::ContextError(format!("cannot store `{key}`: {e}")))?;
        self.data.insert(key, value);
        Ok(())
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_sync(key)
    }

    /// Synchronous read, used by edge conditions.
    pub fn get_sync<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Like [`Context::get`], but a missing or mistyped value is an error.
    pub async fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .data
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| FlowError::ContextError(format!("`{key}` not found in context")))?;
        serde_json::from_value(value)
            .map_err(|e| FlowError::ContextError(format!("`{key}` has an unexpected shape: {e}")))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }
}
