//! Configuration client for an etcd v2 style keys API.
//!
//! Public API: no status code knowledge. All HTTP/status mapping in http.rs.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use tracing::debug;
use url::Url;

use crate::cache::{EtcdCache, Observer, WatchPolicy};
use crate::error::{ConfError, ConfResult, STORE_NODE_EXIST};
use crate::source::ConfigSource;
use crate::types::{EtcdSettings, StoreResponse};
use crate::value::Value;

mod executor;
mod helpers;
mod http;
mod transport;

pub use executor::RequestExecutor;
pub use transport::{
    HttpRequest, HttpResponse, ReqwestTransport, Transport, CONTENT_TYPE_FORM_ENCODED,
    USER_AGENT_VALUE,
};

use helpers::parse_endpoint;
use http::HttpBackend;

/// Store-backed configuration with a watching cache.
///
/// Cloning is cheap and clones share the cache. Watch loops stop when the
/// last clone is dropped or [`EtcdConfig::close`] is called.
#[derive(Clone)]
pub struct EtcdConfig {
    backend: Arc<HttpBackend>,
    cache: Arc<EtcdCache>,
}

impl std::fmt::Debug for EtcdConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EtcdConfig")
            .field("endpoint", &self.backend.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

impl EtcdConfig {
    pub fn new(settings: EtcdSettings) -> ConfResult<Self> {
        Self::with_transport(settings, Arc::new(ReqwestTransport::new()?))
    }

    /// Build a client over a custom transport.
    pub fn with_transport(
        settings: EtcdSettings,
        transport: Arc<dyn Transport>,
    ) -> ConfResult<Self> {
        settings.validate()?;
        let endpoint = parse_endpoint(&settings.endpoint)?;

        let policy = WatchPolicy {
            backoff_base: settings.backoff_base(),
            backoff_max: settings.backoff_max(),
        };
        let backend = Arc::new(HttpBackend {
            executor: RequestExecutor::new(transport),
            endpoint,
            settings,
        });
        let cache = Arc::new(EtcdCache::new(backend.clone(), policy));

        Ok(Self { backend, cache })
    }

    pub fn from_env() -> ConfResult<Self> {
        Self::new(EtcdSettings::from_env())
    }

    pub fn endpoint(&self) -> &Url {
        &self.backend.endpoint
    }

    pub fn settings(&self) -> &EtcdSettings {
        &self.backend.settings
    }

    /// Read a value from the store (never from the cache).
    pub async fn get(&self, key: &str) -> ConfResult<Value> {
        self.get_with_index(key).await.map(|(value, _)| value)
    }

    /// Read a value and the modification index to use for a later
    /// [`compare_and_swap`](Self::compare_and_swap).
    pub async fn get_with_index(&self, key: &str) -> ConfResult<(Value, u64)> {
        let rsp = self.backend.get(key).await?;
        let decoded = decode(key, &rsp)?;
        self.cache.refresh(key, rsp);
        Ok(decoded)
    }

    /// Write a value; returns its canonical form.
    pub async fn set(&self, key: &str, value: &str) -> ConfResult<Value> {
        self.set_with_index(key, value).await.map(|(value, _)| value)
    }

    /// Write a value; returns its canonical form and new modification index.
    pub async fn set_with_index(&self, key: &str, value: &str) -> ConfResult<(Value, u64)> {
        let rsp = self
            .backend
            .write(Method::PUT, key, &[("value", value)])
            .await?;
        self.store_and_watch(key, rsp)
    }

    /// Conditional write.
    ///
    /// - `expected_index > 0`: succeeds only if the key is at that index.
    /// - `expected_index < 0`: succeeds only if the key does not exist.
    /// - `expected_index == 0`: rejected with [`ConfError::InvalidIndex`]
    ///   without contacting the store.
    pub async fn compare_and_swap(
        &self,
        key: &str,
        value: &str,
        expected_index: i64,
    ) -> ConfResult<(Value, u64)> {
        let prev_index;
        let params: Vec<(&str, &str)> = match expected_index.cmp(&0) {
            Ordering::Equal => {
                return Err(ConfError::InvalidIndex {
                    index: expected_index,
                })
            }
            Ordering::Greater => {
                prev_index = expected_index.to_string();
                vec![("value", value), ("prevIndex", prev_index.as_str())]
            }
            Ordering::Less => vec![("value", value), ("prevExist", "false")],
        };

        let rsp = self
            .backend
            .write(Method::PUT, key, &params)
            .await
            .map_err(|e| create_conflict(key, e))?;
        self.store_and_watch(key, rsp)
    }

    /// Conditional write that succeeds only if the current value equals `expected`.
    pub async fn compare_value_and_swap(
        &self,
        key: &str,
        value: &str,
        expected: &str,
    ) -> ConfResult<(Value, u64)> {
        let rsp = self
            .backend
            .write(Method::PUT, key, &[("value", value), ("prevValue", expected)])
            .await?;
        self.store_and_watch(key, rsp)
    }

    /// Create a directory. Directories are not cached.
    pub async fn mkdir(&self, path: &str) -> ConfResult<()> {
        self.backend
            .write(Method::PUT, path, &[("dir", "true")])
            .await
            .map(|_| ())
    }

    /// Append `value` to directory `dir` under a store-generated ordered key.
    pub async fn add(&self, dir: &str, value: &str) -> ConfResult<Value> {
        let rsp = self
            .backend
            .write(Method::POST, dir, &[("value", value)])
            .await?;
        decode(dir, &rsp).map(|(value, _)| value)
    }

    /// Delete a key. An active watch keeps running and sees the deletion as
    /// its last known state.
    pub async fn delete(&self, key: &str) -> ConfResult<()> {
        let rsp = self.backend.delete(key).await?;
        self.cache.set(key, rsp);
        Ok(())
    }

    /// Register `observer` for changes to `key`.
    ///
    /// Registration only; nothing is fetched, so the first notification is the
    /// next real change. Call [`get`](Self::get) first for the current value.
    ///
    /// Must be called within a Tokio runtime.
    pub fn watch<F>(&self, key: &str, observer: F)
    where
        F: Fn(&str, Value) + Send + Sync + 'static,
    {
        debug!(key, "registering observer");
        let observer: Observer = Arc::new(observer);
        self.cache.add_observer(key, observer);
    }

    /// Remove every observer of `key`. The watch itself keeps running.
    pub fn unwatch(&self, key: &str) {
        self.cache.remove_all_observers(key);
    }

    /// Stop the watch loop of `key` at its next iteration boundary.
    pub fn cancel_watch(&self, key: &str) {
        self.cache.cancel(key);
    }

    pub fn is_watching(&self, key: &str) -> bool {
        self.cache.is_watching(key)
    }

    /// Last known response for `key`, without contacting the store.
    pub fn cached(&self, key: &str) -> Option<StoreResponse> {
        self.cache.get(key)
    }

    /// Forget `key`: stop its watch, drop its observers and cached state.
    pub fn evict(&self, key: &str) {
        self.cache.delete(key);
    }

    /// Stop all watches and drop the cache contents.
    pub fn close(&self) {
        self.cache.clear();
    }

    fn store_and_watch(&self, key: &str, rsp: StoreResponse) -> ConfResult<(Value, u64)> {
        let decoded = decode(key, &rsp)?;
        self.cache.set_and_watch(key, rsp);
        Ok(decoded)
    }
}

/// Decoded value and modification index of a response's node.
fn decode(key: &str, rsp: &StoreResponse) -> ConfResult<(Value, u64)> {
    match &rsp.node {
        Some(node) => Ok((node.value()?, node.modified_index)),
        None => Err(ConfError::NoSuchKey {
            key: key.to_string(),
        }),
    }
}

/// The store reports create-only conflicts as "node exists"; surface them
/// like every other failed precondition.
fn create_conflict(key: &str, err: ConfError) -> ConfError {
    if err.store_code() == Some(STORE_NODE_EXIST) {
        return ConfError::ComparisonFailed {
            key: key.to_string(),
            message: err.to_string(),
        };
    }
    err
}

#[async_trait]
impl ConfigSource for EtcdConfig {
    async fn get(&self, key: &str) -> ConfResult<Value> {
        EtcdConfig::get(self, key).await
    }

    async fn set(&self, key: &str, value: &str) -> ConfResult<Value> {
        EtcdConfig::set(self, key, value).await
    }

    async fn delete(&self, key: &str) -> ConfResult<()> {
        EtcdConfig::delete(self, key).await
    }
}
