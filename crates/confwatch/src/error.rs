//! Error types for the configuration client.

use std::time::Duration;

/// Store error code for a failed test-and-set (prevIndex / prevValue mismatch).
pub const STORE_TEST_FAILED: u32 = 101;

/// Store error code for "key already exists" (prevExist=false on an existing key).
pub const STORE_NODE_EXIST: u32 = 105;

/// Store error code for a long-poll whose waitIndex fell out of the event history.
pub const STORE_EVENT_INDEX_CLEARED: u32 = 401;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfError {
    /// Key or path does not exist.
    #[error("no such key: {key}")]
    NoSuchKey { key: String },

    /// Malformed request (4xx other than 404).
    #[error("client error (HTTP {status}): {message}")]
    Client {
        status: u16,
        code: Option<u32>,
        message: String,
    },

    /// Unclassified store-side failure.
    #[error("service error (HTTP {status}): {message}")]
    Service {
        status: u16,
        code: Option<u32>,
        message: String,
    },

    /// Deadline exceeded; the in-flight request was cancelled.
    #[error("request timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// Conditional write precondition failed.
    #[error("comparison failed for {key}: {message}")]
    ComparisonFailed { key: String, message: String },

    /// Structurally invalid version token, rejected before any network call.
    #[error("invalid index: {index}")]
    InvalidIndex { index: i64 },

    /// Long-poll wait index fell out of the store's event history.
    /// `index` is the store's current index, when reported.
    #[error("watch index cleared: {message}")]
    IndexCleared { index: Option<u64>, message: String },

    /// Response stream truncated (connection recycled by the store).
    #[error("connection closed: {message}")]
    Disconnected { message: String },

    /// Transport failure before a response arrived.
    #[error("network error: {message}")]
    Network { message: String },

    /// Response body could not be decoded.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Value could not be coerced to the requested scalar type.
    #[error("cannot convert {value:?} to {target}")]
    Conversion { value: String, target: &'static str },
}

impl ConfError {
    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoSuchKey { .. } => 1,

            // Caller mistakes
            Self::Config { .. } => 2,
            Self::InvalidIndex { .. } => 2,
            Self::Conversion { .. } => 2,
            Self::Client { .. } => 2,

            Self::ComparisonFailed { .. } => 3,

            // Network/transient
            Self::Timeout { .. } => 5,
            Self::Disconnected { .. } => 5,
            Self::Network { .. } => 5,
            Self::IndexCleared { .. } => 5,

            // Store side
            Self::Service { .. } => 6,
            Self::InvalidResponse { .. } => 6,
        }
    }

    /// Whether the error is a truncated long-poll stream rather than a failure.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Disconnected { .. })
    }

    /// Whether a long-poll asked for an index older than the store's event history.
    pub fn is_index_cleared(&self) -> bool {
        matches!(self, Self::IndexCleared { .. })
    }

    /// Current store index carried by an index-cleared error.
    pub fn store_index(&self) -> Option<u64> {
        match self {
            Self::IndexCleared { index, .. } => *index,
            _ => None,
        }
    }

    /// Store error code, when the store supplied one.
    pub fn store_code(&self) -> Option<u32> {
        match self {
            Self::Client { code, .. } | Self::Service { code, .. } => *code,
            Self::IndexCleared { .. } => Some(STORE_EVENT_INDEX_CLEARED),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ConfError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            message: err.to_string(),
        }
    }
}

/// Result type for configuration operations.
pub type ConfResult<T> = Result<T, ConfError>;
