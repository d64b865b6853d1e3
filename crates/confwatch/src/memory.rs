//! In-process configuration source.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{ConfError, ConfResult};
use crate::source::ConfigSource;
use crate::value::Value;

/// Map-backed source, useful for defaults and tests.
#[derive(Debug, Default)]
pub struct MemoryConfig {
    values: RwLock<HashMap<String, Value>>,
}

impl MemoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a source pre-filled with `values`.
    pub fn with_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let values = values
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            values: RwLock::new(values),
        }
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

#[async_trait]
impl ConfigSource for MemoryConfig {
    async fn get(&self, key: &str) -> ConfResult<Value> {
        self.values
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| ConfError::NoSuchKey {
                key: key.to_string(),
            })
    }

    async fn set(&self, key: &str, value: &str) -> ConfResult<Value> {
        let value = Value::from(value);
        self.values.write().insert(key.to_string(), value.clone());
        Ok(value)
    }

    async fn delete(&self, key: &str) -> ConfResult<()> {
        self.values.write().remove(key);
        Ok(())
    }
}
