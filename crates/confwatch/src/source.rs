//! Common interface over configuration backends.

use async_trait::async_trait;

use crate::error::ConfResult;
use crate::value::Value;

/// A readable and writable configuration backend.
///
/// Keys are dotted paths (`"app.db.host"`). Implementations report a missing
/// key as [`ConfError::NoSuchKey`](crate::ConfError::NoSuchKey) so that
/// layered sources can fall through to the next one.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn get(&self, key: &str) -> ConfResult<Value>;

    /// Write `value`; returns the canonical value as stored.
    async fn set(&self, key: &str, value: &str) -> ConfResult<Value>;

    async fn delete(&self, key: &str) -> ConfResult<()>;
}
