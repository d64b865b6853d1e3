//! Key → cache entry registry.
//!
//! Every mutating operation runs under one registry lock so that
//! find-or-create plus the follow-up mutation is atomic: two first-time
//! watchers of a key share one entry and therefore one loop. Lock order is
//! always registry → entry; the watch loops never take the registry lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::ConfResult;
use crate::types::StoreResponse;
use crate::value::Value;

mod entry;

use entry::CacheEntry;

/// Change callback: `(key, decoded value)`.
pub type Observer = Arc<dyn Fn(&str, Value) + Send + Sync>;

/// Store reads used by the watch loops.
#[async_trait]
pub(crate) trait LongPoll: Send + Sync + 'static {
    /// Wait for the next change of `key`. `after` is the last index already
    /// observed; `None` waits for whatever changes next.
    async fn long_poll(
        &self,
        key: &str,
        recursive: bool,
        after: Option<u64>,
    ) -> ConfResult<StoreResponse>;

    /// Current state of `key`, without waiting.
    async fn fetch(&self, key: &str) -> ConfResult<StoreResponse>;
}

/// Reconnect backoff for watch loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WatchPolicy {
    pub(crate) backoff_base: Duration,
    pub(crate) backoff_max: Duration,
}

pub(crate) struct EtcdCache {
    source: Arc<dyn LongPoll>,
    policy: WatchPolicy,
    entries: Mutex<HashMap<String, Arc<CacheEntry>>>,
}

impl EtcdCache {
    pub(crate) fn new(source: Arc<dyn LongPoll>, policy: WatchPolicy) -> Self {
        Self {
            source,
            policy,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Last known response for `key`, if the key has an entry with a response.
    pub(crate) fn get(&self, key: &str) -> Option<StoreResponse> {
        let entries = self.entries.lock();
        entries.get(key).and_then(|e| e.response())
    }

    /// Store a response without touching the watch state.
    pub(crate) fn set(&self, key: &str, response: StoreResponse) {
        let mut entries = self.entries.lock();
        self.get_or_create(&mut entries, key).set_response(response);
    }

    /// Store a response; arm the watch only if someone is observing the key.
    pub(crate) fn refresh(&self, key: &str, response: StoreResponse) {
        let mut entries = self.entries.lock();
        let entry = self.get_or_create(&mut entries, key);
        entry.set_response(response);
        if entry.has_observers() {
            entry.start_watching_if_idle();
        }
    }

    /// Store a response and make sure the key is being watched.
    pub(crate) fn set_and_watch(&self, key: &str, response: StoreResponse) {
        let mut entries = self.entries.lock();
        let entry = self.get_or_create(&mut entries, key);
        entry.set_response(response);
        entry.start_watching_if_idle();
    }

    /// Register an observer, starting the watch if necessary.
    pub(crate) fn add_observer(&self, key: &str, observer: Observer) {
        let mut entries = self.entries.lock();
        self.get_or_create(&mut entries, key).add_observer(observer);
    }

    pub(crate) fn remove_all_observers(&self, key: &str) {
        let entries = self.entries.lock();
        if let Some(entry) = entries.get(key) {
            entry.remove_all_observers();
        }
    }

    pub(crate) fn cancel(&self, key: &str) {
        let entries = self.entries.lock();
        if let Some(entry) = entries.get(key) {
            entry.cancel();
        }
    }

    pub(crate) fn is_watching(&self, key: &str) -> bool {
        let entries = self.entries.lock();
        entries.get(key).is_some_and(|e| e.is_watching())
    }

    /// Evict `key`, stopping its loop.
    pub(crate) fn delete(&self, key: &str) {
        let removed = self.entries.lock().remove(key);
        if let Some(entry) = removed {
            entry.cancel();
        }
    }

    /// Cancel every loop and drop every entry.
    pub(crate) fn clear(&self) {
        let drained: Vec<_> = self.entries.lock().drain().collect();
        for (_, entry) in drained {
            entry.cancel();
        }
    }

    fn get_or_create(
        &self,
        entries: &mut HashMap<String, Arc<CacheEntry>>,
        key: &str,
    ) -> Arc<CacheEntry> {
        Arc::clone(entries.entry(key.to_string()).or_insert_with(|| {
            Arc::new(CacheEntry::new(
                key,
                None,
                Arc::clone(&self.source),
                self.policy,
            ))
        }))
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

impl Drop for EtcdCache {
    // Loops hold their entry, not the registry; stop them with it.
    fn drop(&mut self) {
        for entry in self.entries.get_mut().values() {
            entry.cancel();
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{change, ScriptedPoll};
    use super::*;

    fn cache(poll: Arc<ScriptedPoll>) -> Arc<EtcdCache> {
        Arc::new(EtcdCache::new(
            poll,
            WatchPolicy {
                backoff_base: Duration::from_millis(1),
                backoff_max: Duration::from_millis(15),
            },
        ))
    }

    fn noop() -> Observer {
        Arc::new(|_: &str, _: Value| {})
    }

    #[tokio::test]
    async fn test_concurrent_first_watchers_share_one_loop() {
        let poll = ScriptedPoll::new();
        let cache = cache(poll.clone());

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                cache.add_observer("a.b.c", noop());
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        poll.wait_for_calls(1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.len(), 1);
        assert_eq!(poll.calls().len(), 1);
        assert!(cache.is_watching("a.b.c"));
    }

    #[tokio::test]
    async fn test_set_does_not_arm_but_set_and_watch_does() {
        let poll = ScriptedPoll::new();
        let cache = cache(poll.clone());

        cache.set("k", change("/k", "1", 3));
        assert!(!cache.is_watching("k"));
        assert_eq!(cache.get("k").and_then(|r| r.modified_index()), Some(3));

        cache.set_and_watch("k", change("/k", "2", 4));
        assert!(cache.is_watching("k"));
        poll.wait_for_calls(1).await;
        assert_eq!(poll.calls()[0], ("k".to_string(), false, Some(4)));
    }

    #[tokio::test]
    async fn test_refresh_arms_only_observed_keys() {
        let poll = ScriptedPoll::new();
        let cache = cache(poll.clone());

        cache.refresh("plain", change("/plain", "1", 1));
        assert!(!cache.is_watching("plain"));

        cache.add_observer("observed", noop());
        cache.cancel("observed");
        assert!(!cache.is_watching("observed"));

        cache.refresh("observed", change("/observed", "1", 2));
        assert!(cache.is_watching("observed"));
    }

    #[tokio::test]
    async fn test_delete_evicts_and_cancels() {
        let poll = ScriptedPoll::new();
        let cache = cache(poll.clone());

        cache.set_and_watch("k", change("/k", "1", 1));
        assert!(cache.is_watching("k"));

        cache.delete("k");
        assert!(!cache.is_watching("k"));
        assert!(cache.get("k").is_none());
        assert_eq!(cache.len(), 0);

        // Deleting an unknown key is harmless.
        cache.delete("missing");
    }

    #[tokio::test]
    async fn test_clear_cancels_everything() {
        let poll = ScriptedPoll::new();
        let cache = cache(poll.clone());

        cache.add_observer("a", noop());
        cache.add_observer("b", noop());
        cache.clear();

        assert_eq!(cache.len(), 0);
        assert!(!cache.is_watching("a"));
        assert!(!cache.is_watching("b"));
    }

    #[tokio::test]
    async fn test_dropping_cache_stops_loops() {
        let poll = ScriptedPoll::new();
        let cache = cache(poll.clone());

        cache.add_observer("a", noop());
        let entry = Arc::clone(cache.entries.lock().get("a").unwrap());
        assert!(entry.is_watching());

        drop(cache);
        assert!(!entry.is_watching());
    }
}
