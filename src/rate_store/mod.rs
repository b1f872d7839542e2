//! Counter stores backing the fixed-window rate limiter.
//!
//! # Overview
//!
//! The limiter needs exactly two primitives from its store, both with Redis
//! semantics:
//!
//! - `INCR key` - atomically increment, creating the key at 1 without a TTL
//! - `EXPIRE key seconds` - set a TTL on an existing key (false if missing)
//!
//! All cross-request coordination happens inside the store; the process keeps
//! no counter state of its own.
//!
//! # Backends
//!
//! - [`RedisRateStore`] - shared Redis/Redis-compatible store (production)
//! - [`MemoryRateStore`] - process-local map for single-instance development and tests
//!
//! Stores are constructed explicitly at startup and injected into the limiter
//! as `Arc<dyn RateStore>`.

mod memory;
mod redis_store;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryRateStore;
pub use redis_store::RedisRateStore;

/// Errors raised by a rate store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store could not be reached or the connection could not be built.
    #[error("Rate store connection failed: {0}")]
    Connection(String),

    /// A command reached the store but failed.
    #[error("Rate store command {command} failed: {message}")]
    Command {
        command: &'static str,
        message: String,
    },
}

impl StoreError {
    pub fn command(command: &'static str, err: impl std::fmt::Display) -> Self {
        StoreError::Command {
            command,
            message: err.to_string(),
        }
    }
}

/// Convenience type alias for Results with StoreError.
pub type StoreResult<T> = Result<T, StoreError>;

/// Atomic counter store with per-key expiry.
#[async_trait]
pub trait RateStore: Send + Sync {
    /// Increment `key` by one and return the post-increment value.
    async fn incr(&self, key: &str) -> StoreResult<i64>;

    /// Set `key` to expire after `seconds`. Returns `false` if the key does not exist.
    async fn expire(&self, key: &str, seconds: u64) -> StoreResult<bool>;

    /// Round-trip to the store to check connectivity.
    async fn ping(&self) -> StoreResult<()>;

    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;
}
