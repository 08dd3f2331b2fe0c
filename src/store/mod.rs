//! Key/TTL counter storage used by the rate limiter.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

pub use memory::MemoryCounterStore;

/// A counter value together with the instant it stops being readable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counter {
    pub value: u64,
    pub expires_at: DateTime<Utc>,
}

impl Counter {
    /// Seconds until expiry as seen from `now`, at least 1
    pub fn seconds_remaining(&self, now: DateTime<Utc>) -> u64 {
        (self.expires_at - now).num_seconds().max(1) as u64
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),

    #[error("ttl out of range: {0:?}")]
    InvalidTtl(Duration),
}

/// Counters that expire on their own.
///
/// Expired entries must read as absent. Implementations do not need to make
/// read-then-increment sequences atomic across calls, only each call by itself.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Counter>, StoreError>;

    /// Overwrites the counter and starts a fresh TTL
    async fn set(&self, key: &str, value: u64, ttl: Duration) -> Result<Counter, StoreError>;

    /// Adds one to a live counter keeping its expiry, or creates it at 1 with `ttl`
    async fn increment_or_init(&self, key: &str, ttl: Duration) -> Result<Counter, StoreError>;
}
