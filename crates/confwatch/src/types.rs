//! Wire types for the store's keys API, and client settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfError, ConfResult};
use crate::value::Value;

/// A store record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Store-assigned index at which the node was created.
    #[serde(default)]
    pub created_index: u64,

    /// Store-assigned index of the last mutation. Never decreases for a key.
    #[serde(default)]
    pub modified_index: u64,

    /// Absolute key path (e.g. "/a/b/c").
    #[serde(default)]
    pub key: String,

    /// Encoded value; absent for directories and deletions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Whether this node is a directory.
    #[serde(default)]
    pub dir: bool,

    /// Directory children, in store order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<Node>,

    /// Remaining time to live in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,

    /// Expiration timestamp (RFC 3339), when a TTL is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<String>,
}

impl Node {
    /// Decode the node's value. Directories decode to their children's values.
    pub fn value(&self) -> ConfResult<Value> {
        if self.dir {
            return self
                .nodes
                .iter()
                .map(Node::value)
                .collect::<ConfResult<Vec<_>>>()
                .map(Value::List);
        }

        match &self.value {
            Some(v) => Ok(Value::String(v.clone())),
            None => Err(ConfError::InvalidResponse {
                message: format!("node {} has no value", self.key),
            }),
        }
    }
}

/// Result of any store operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreResponse {
    /// Action tag ("get", "set", "compareAndSwap", "create", "delete", ...).
    #[serde(default)]
    pub action: String,

    /// Resulting node. Absent means "no such key" for reads.
    #[serde(default)]
    pub node: Option<Node>,

    /// Node state before the operation, for change events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_node: Option<Node>,
}

impl StoreResponse {
    /// Modification index of the resulting node.
    pub fn modified_index(&self) -> Option<u64> {
        self.node.as_ref().map(|n| n.modified_index)
    }

    /// Whether the resulting node is a directory.
    pub fn is_dir(&self) -> bool {
        self.node.as_ref().is_some_and(|n| n.dir)
    }

    /// Synthetic removal of `prev` at `index`, for a key found gone on re-read.
    pub fn removed(prev: &Node, index: u64) -> Self {
        Self {
            action: "delete".into(),
            node: Some(Node {
                created_index: prev.created_index,
                modified_index: index,
                key: prev.key.clone(),
                value: None,
                dir: false,
                nodes: Vec::new(),
                ttl: None,
                expiration: None,
            }),
            prev_node: Some(prev.clone()),
        }
    }

    /// Whether this event removed the key.
    pub fn is_removal(&self) -> bool {
        matches!(
            self.action.as_str(),
            "delete" | "expire" | "compareAndDelete"
        )
    }

    /// Decoded value carried by the event, `None` when there is no node.
    /// A removed key decodes to the empty string.
    pub fn value(&self) -> Option<ConfResult<Value>> {
        let node = self.node.as_ref()?;
        if !node.dir && node.value.is_none() && self.is_removal() {
            return Some(Ok(Value::String(String::new())));
        }
        Some(node.value())
    }
}

/// Structured error body returned with non-2xx responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreErrorBody {
    /// Store error code (e.g. 100 key not found, 101 compare failed).
    pub error_code: u32,

    /// Human-readable message.
    #[serde(default)]
    pub message: String,

    /// Offending key or condition.
    #[serde(default)]
    pub cause: Option<String>,

    /// Store index at the time of the error.
    #[serde(default)]
    pub index: Option<u64>,
}

/// Client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EtcdSettings {
    /// Store base URL; keys live under `{endpoint}/v2/keys/`.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Deadline for non-watch requests, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Deadline for long-poll watch requests, in milliseconds.
    #[serde(default = "default_watch_timeout_ms")]
    pub watch_timeout_ms: u64,

    /// Unit of the watch reconnect backoff, in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Ceiling of the watch reconnect backoff, in milliseconds.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

fn default_endpoint() -> String {
    "http://localhost:4001/".to_string()
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_watch_timeout_ms() -> u64 {
    120_000
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_max_ms() -> u64 {
    15_000
}

impl Default for EtcdSettings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_ms: default_timeout_ms(),
            watch_timeout_ms: default_watch_timeout_ms(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl EtcdSettings {
    /// Create settings from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `CONFWATCH_ETCD_URL` | Store base URL |
    /// | `CONFWATCH_TIMEOUT_MS` | Request deadline |
    /// | `CONFWATCH_WATCH_TIMEOUT_MS` | Long-poll deadline |
    /// | `CONFWATCH_BACKOFF_BASE_MS` | Watch backoff unit |
    /// | `CONFWATCH_BACKOFF_MAX_MS` | Watch backoff ceiling |
    pub fn from_env() -> Self {
        fn millis(var: &str, default: fn() -> u64) -> u64 {
            std::env::var(var)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default)
        }

        Self {
            endpoint: std::env::var("CONFWATCH_ETCD_URL").unwrap_or_else(|_| default_endpoint()),
            timeout_ms: millis("CONFWATCH_TIMEOUT_MS", default_timeout_ms),
            watch_timeout_ms: millis("CONFWATCH_WATCH_TIMEOUT_MS", default_watch_timeout_ms),
            backoff_base_ms: millis("CONFWATCH_BACKOFF_BASE_MS", default_backoff_base_ms),
            backoff_max_ms: millis("CONFWATCH_BACKOFF_MAX_MS", default_backoff_max_ms),
        }
    }

    /// Parse settings from a YAML document; missing fields take defaults.
    pub fn from_yaml_str(yaml: &str) -> ConfResult<Self> {
        serde_yaml::from_str(yaml).map_err(|e| ConfError::Config {
            message: format!("invalid settings: {}", e),
        })
    }

    /// Set the store base URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set the request deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the long-poll deadline.
    pub fn with_watch_timeout(mut self, timeout: Duration) -> Self {
        self.watch_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the watch reconnect backoff unit and ceiling.
    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base_ms = base.as_millis() as u64;
        self.backoff_max_ms = max.as_millis() as u64;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn watch_timeout(&self) -> Duration {
        Duration::from_millis(self.watch_timeout_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    /// Check invariants that the client relies on.
    pub fn validate(&self) -> ConfResult<()> {
        if self.timeout_ms == 0 {
            return Err(ConfError::Config {
                message: "timeout_ms must be greater than zero".into(),
            });
        }
        if self.watch_timeout_ms <= self.timeout_ms {
            return Err(ConfError::Config {
                message: format!(
                    "watch_timeout_ms ({}) must exceed timeout_ms ({})",
                    self.watch_timeout_ms, self.timeout_ms
                ),
            });
        }
        if self.backoff_max_ms < self.backoff_base_ms {
            return Err(ConfError::Config {
                message: "backoff_max_ms must not be below backoff_base_ms".into(),
            });
        }
        Ok(())
    }
}
