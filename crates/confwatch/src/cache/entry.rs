//! Per-key cache entry and its long-poll reconnect loop.
//!
//! An entry is `idle` until something asks it to watch, then `watching` until
//! cancelled. At most one loop runs per entry at a time. The loop checks its
//! cancellation token at iteration boundaries only; an in-flight long-poll is
//! bounded by the watch deadline, not by `cancel()`.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{LongPoll, Observer, WatchPolicy};
use crate::error::ConfError;
use crate::types::StoreResponse;
use crate::value::Value;

/// Reconnect delay after `failures` consecutive failed long-polls:
/// `base * failures²`, capped at `max`.
pub(crate) fn backoff_delay(base: Duration, max: Duration, failures: u32) -> Duration {
    base.saturating_mul(failures.saturating_mul(failures)).min(max)
}

pub(crate) struct CacheEntry {
    key: String,
    source: Arc<dyn LongPoll>,
    policy: WatchPolicy,
    state: Mutex<EntryState>,
}

struct EntryState {
    response: Option<StoreResponse>,
    watching: bool,
    observers: Vec<ObserverQueue>,
    cancel: Option<CancellationToken>,
}

/// Serial delivery queue for one observer.
///
/// Each observer has its own worker, so a slow observer delays only itself and
/// still sees updates in store order. The worker exits once every sender
/// (the registration and any in-flight snapshot) is dropped.
#[derive(Clone)]
struct ObserverQueue {
    tx: mpsc::UnboundedSender<(String, Value)>,
}

impl ObserverQueue {
    fn spawn(observer: Observer) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<(String, Value)>();
        tokio::spawn(async move {
            while let Some((key, value)) = rx.recv().await {
                let observer = Arc::clone(&observer);
                if let Err(e) = tokio::task::spawn_blocking(move || observer(&key, value)).await {
                    warn!(error = %e, "observer failed");
                }
            }
        });
        Self { tx }
    }

    fn notify(&self, key: &str, value: &Value) {
        // A closed queue only means the observer was removed meanwhile.
        let _ = self.tx.send((key.to_string(), value.clone()));
    }
}

impl CacheEntry {
    pub(crate) fn new(
        key: impl Into<String>,
        response: Option<StoreResponse>,
        source: Arc<dyn LongPoll>,
        policy: WatchPolicy,
    ) -> Self {
        Self {
            key: key.into(),
            source,
            policy,
            state: Mutex::new(EntryState {
                response,
                watching: false,
                observers: Vec::new(),
                cancel: None,
            }),
        }
    }

    pub(crate) fn response(&self) -> Option<StoreResponse> {
        self.state.lock().response.clone()
    }

    pub(crate) fn set_response(&self, response: StoreResponse) {
        self.state.lock().response = Some(response);
    }

    pub(crate) fn is_watching(&self) -> bool {
        self.state.lock().watching
    }

    pub(crate) fn has_observers(&self) -> bool {
        !self.state.lock().observers.is_empty()
    }

    /// Register an observer; registering is what starts monitoring.
    pub(crate) fn add_observer(self: &Arc<Self>, observer: Observer) {
        let mut state = self.state.lock();
        state.observers.push(ObserverQueue::spawn(observer));
        self.start_locked(&mut state);
    }

    pub(crate) fn remove_all_observers(&self) {
        self.state.lock().observers.clear();
    }

    pub(crate) fn start_watching_if_idle(self: &Arc<Self>) {
        let mut state = self.state.lock();
        self.start_locked(&mut state);
    }

    fn start_locked(self: &Arc<Self>, state: &mut EntryState) {
        if state.watching {
            return;
        }

        let token = CancellationToken::new();
        state.cancel = Some(token.clone());
        state.watching = true;

        debug!(key = %self.key, "starting watch");
        tokio::spawn(Arc::clone(self).watch(token));
    }

    /// Stop the loop at its next iteration boundary. No-op when idle.
    pub(crate) fn cancel(&self) {
        let mut state = self.state.lock();
        if !state.watching {
            return;
        }
        if let Some(token) = state.cancel.take() {
            token.cancel();
        }
        state.watching = false;
        debug!(key = %self.key, "watch cancelled");
    }

    async fn watch(self: Arc<Self>, token: CancellationToken) {
        let key = self.key.clone();
        let mut failures: u32 = 0;
        // After the store clears our wait index: re-read the key once, then
        // wait past `floor`, the store index reported with the error.
        let mut resync = false;
        let mut floor: Option<u64> = None;
        let mut unanchored = false;

        while !token.is_cancelled() {
            let last = self.response();
            let known = last.as_ref().and_then(StoreResponse::modified_index);

            let fetched = resync;
            let result = if fetched {
                self.source.fetch(&key).await
            } else {
                let recursive = last.as_ref().is_some_and(StoreResponse::is_dir);
                let after = if unanchored { None } else { known.max(floor) };
                self.source.long_poll(&key, recursive, after).await
            };
            if token.is_cancelled() {
                break;
            }

            let response = match result {
                Ok(response) => response,
                Err(e) if e.is_disconnect() => {
                    debug!(key = %key, error = %e, "long-poll disconnected, reconnecting");
                    failures = 0;
                    continue;
                }
                Err(e) if e.is_index_cleared() => {
                    info!(key = %key, error = %e, index = ?e.store_index(), "watch index cleared, re-reading current state");
                    failures = 0;
                    floor = e.store_index().or(floor);
                    unanchored = e.store_index().is_none();
                    resync = true;
                    continue;
                }
                Err(ConfError::NoSuchKey { .. }) if fetched => {
                    match last.as_ref().and_then(|r| r.node.as_ref()) {
                        Some(prev) if !last.as_ref().is_some_and(StoreResponse::is_removal) => {
                            let index = floor.unwrap_or_else(|| prev.modified_index.saturating_add(1));
                            StoreResponse::removed(prev, index)
                        }
                        _ => {
                            debug!(key = %key, "key still absent after re-read");
                            failures = 0;
                            resync = false;
                            continue;
                        }
                    }
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let delay = backoff_delay(self.policy.backoff_base, self.policy.backoff_max, failures);
                    warn!(
                        key = %key,
                        error = %e,
                        failures,
                        backoff_ms = delay.as_millis() as u64,
                        "could not watch, backing off"
                    );
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    continue;
                }
            };

            failures = 0;
            if fetched {
                resync = false;
                if response.modified_index() <= known {
                    debug!(key = %key, index = ?known, "unchanged while the watch index was cleared");
                    continue;
                }
            } else {
                unanchored = false;
            }

            let observers = {
                let mut state = self.state.lock();
                state.response = Some(response.clone());
                state.observers.clone()
            };

            let value = match response.value() {
                Some(Ok(value)) => value,
                Some(Err(e)) => {
                    warn!(key = %key, action = %response.action, error = %e, "could not decode value, nobody will be notified");
                    continue;
                }
                None => {
                    warn!(key = %key, action = %response.action, "change event without a node, nobody will be notified");
                    continue;
                }
            };

            debug!(key = %key, index = ?response.modified_index(), observers = observers.len(), "updated");
            dispatch(&key, &value, observers);
        }

        debug!(key = %key, "watch loop stopped");
    }
}

/// Hand the update to every snapshotted observer queue; never blocks.
fn dispatch(key: &str, value: &Value, observers: Vec<ObserverQueue>) {
    for observer in &observers {
        observer.notify(key, value);
    }
}
