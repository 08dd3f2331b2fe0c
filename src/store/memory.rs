use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{Counter, CounterStore, StoreError};
use crate::clock::{Clock, SystemClock};

/// In-process counter store. Shared between workers through an `Arc`.
pub struct MemoryCounterStore {
    entries: Mutex<HashMap<String, Counter>>,
    clock: Arc<dyn Clock>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Counter>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Unavailable("counter map lock poisoned".to_string()))
    }

    fn expiry(&self, ttl: Duration) -> Result<chrono::DateTime<chrono::Utc>, StoreError> {
        let ttl = chrono::Duration::from_std(ttl).map_err(|_| StoreError::InvalidTtl(ttl))?;
        Ok(self.clock.now() + ttl)
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn get(&self, key: &str) -> Result<Option<Counter>, StoreError> {
        let now = self.clock.now();
        let mut entries = self.lock()?;

        let current = entries.get(key).copied();
        match current {
            Some(counter) if counter.expires_at > now => Ok(Some(counter)),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: u64, ttl: Duration) -> Result<Counter, StoreError> {
        let counter = Counter {
            value,
            expires_at: self.expiry(ttl)?,
        };
        self.lock()?.insert(key.to_string(), counter);
        Ok(counter)
    }

    async fn increment_or_init(&self, key: &str, ttl: Duration) -> Result<Counter, StoreError> {
        let now = self.clock.now();
        let fresh_expiry = self.expiry(ttl)?;
        let mut entries = self.lock()?;

        let counter = entries
            .entry(key.to_string())
            .and_modify(|c| {
                if c.expires_at > now {
                    c.value = c.value.saturating_add(1);
                } else {
                    *c = Counter {
                        value: 1,
                        expires_at: fresh_expiry,
                    };
                }
            })
            .or_insert(Counter {
                value: 1,
                expires_at: fresh_expiry,
            });

        Ok(*counter)
    }
}
