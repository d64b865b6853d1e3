//! Watching configuration client for etcd v2 style key-value stores.
//!
//! This crate provides:
//!
//! - Reads and writes of dotted keys (`"app.db.host"` → `/v2/keys/app/db/host`)
//! - Optimistic concurrency via modification indexes (`compare_and_swap`)
//! - Long-poll watches with change observers and reconnect backoff
//! - Per-call deadlines that cancel the in-flight request
//! - Layered sources (`ConfigSuite`) over the store and in-memory defaults
//!
//! # Quick Start
//!
//! ```no_run
//! use confwatch::{EtcdConfig, EtcdSettings};
//!
//! # async fn example() -> confwatch::ConfResult<()> {
//! let config = EtcdConfig::new(EtcdSettings::from_env())?;
//!
//! let (value, index) = config.get_with_index("app.feature.enabled").await?;
//! if !value.to_bool()? {
//!     config.compare_and_swap("app.feature.enabled", "true", index as i64).await?;
//! }
//!
//! config.watch("app.feature.enabled", |key, value| {
//!     println!("{key} is now {value}");
//! });
//! # Ok(())
//! # }
//! ```
//!
//! # Watches
//!
//! Registering an observer starts one long-poll loop per key; every observer
//! of that key shares it. Each observer runs off the loop's task and sees
//! updates in store order. Failed polls back off `base × n²` up to a cap;
//! connections recycled by the store reconnect immediately.
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `CONFWATCH_ETCD_URL` | Store base URL (default: `http://localhost:4001/`) |
//! | `CONFWATCH_TIMEOUT_MS` | Per-call deadline (default: 5000) |
//! | `CONFWATCH_WATCH_TIMEOUT_MS` | Long-poll deadline (default: 120000) |
//! | `CONFWATCH_BACKOFF_BASE_MS` | Watch backoff unit (default: 1000) |
//! | `CONFWATCH_BACKOFF_MAX_MS` | Watch backoff ceiling (default: 15000) |

mod cache;
pub mod client;
pub mod error;
pub mod memory;
pub mod source;
pub mod suite;
pub mod types;
pub mod value;

// Re-export main types
pub use cache::Observer;
pub use client::{EtcdConfig, HttpRequest, HttpResponse, ReqwestTransport, Transport};
pub use error::{ConfError, ConfResult};
pub use memory::MemoryConfig;
pub use source::ConfigSource;
pub use suite::ConfigSuite;
pub use types::{EtcdSettings, Node, StoreErrorBody, StoreResponse};
pub use value::Value;
