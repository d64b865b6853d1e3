//! Layered configuration: several sources, highest priority first.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{ConfError, ConfResult};
use crate::source::ConfigSource;
use crate::value::Value;

/// Ordered list of sources.
///
/// Reads fall through sources that miss the key; writes and deletes go to
/// every source in order.
#[derive(Clone, Default)]
pub struct ConfigSuite {
    sources: Vec<Arc<dyn ConfigSource>>,
}

impl std::fmt::Debug for ConfigSuite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigSuite")
            .field("sources", &self.sources.len())
            .finish()
    }
}

impl ConfigSuite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a source with lower priority than those already added.
    pub fn with_source(mut self, source: Arc<dyn ConfigSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn push(&mut self, source: Arc<dyn ConfigSource>) {
        self.sources.push(source);
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[async_trait]
impl ConfigSource for ConfigSuite {
    async fn get(&self, key: &str) -> ConfResult<Value> {
        for (i, source) in self.sources.iter().enumerate() {
            match source.get(key).await {
                Ok(value) => return Ok(value),
                Err(ConfError::NoSuchKey { .. }) => {
                    debug!(key, source = i, "miss, trying next source");
                }
                Err(e) => return Err(e),
            }
        }
        Err(ConfError::NoSuchKey {
            key: key.to_string(),
        })
    }

    async fn set(&self, key: &str, value: &str) -> ConfResult<Value> {
        let mut canonical = None;
        for source in &self.sources {
            let stored = source.set(key, value).await?;
            canonical.get_or_insert(stored);
        }
        // An empty suite stores nothing; echo the input.
        Ok(canonical.unwrap_or_else(|| Value::from(value)))
    }

    async fn delete(&self, key: &str) -> ConfResult<()> {
        for source in &self.sources {
            source.delete(key).await?;
        }
        Ok(())
    }
}
