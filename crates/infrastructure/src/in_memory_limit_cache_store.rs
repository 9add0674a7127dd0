use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use limitgate_application::LimitCacheStore;
use limitgate_core::AppResult;
use tokio::sync::RwLock;

/// Writes between sweeps of expired entries.
const SWEEP_INTERVAL: u64 = 64;

#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    value: i64,
    expires_at: Instant,
}

impl CounterEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

#[derive(Default)]
struct CounterTable {
    entries: HashMap<String, CounterEntry>,
    writes: u64,
}

impl CounterTable {
    fn record_write(&mut self, now: Instant) {
        self.writes = self.writes.wrapping_add(1);
        if self.writes.is_multiple_of(SWEEP_INTERVAL) {
            self.entries.retain(|_, entry| entry.is_live(now));
        }
    }
}

/// In-memory limit cache store for single-process deployments and tests.
///
/// Expired entries read as absent and are swept out every few writes.
#[derive(Default)]
pub struct InMemoryLimitCacheStore {
    table: RwLock<CounterTable>,
}

impl InMemoryLimitCacheStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LimitCacheStore for InMemoryLimitCacheStore {
    async fn get(&self, key: &str) -> AppResult<Option<i64>> {
        let table = self.table.read().await;
        Ok(table
            .entries
            .get(key)
            .filter(|entry| entry.is_live(Instant::now()))
            .map(|entry| entry.value))
    }

    async fn add(&self, key: &str, value: i64, ttl_seconds: u64) -> AppResult<bool> {
        let now = Instant::now();
        let mut table = self.table.write().await;
        if table.entries.get(key).is_some_and(|entry| entry.is_live(now)) {
            return Ok(false);
        }

        table.record_write(now);
        table.entries.insert(
            key.to_owned(),
            CounterEntry {
                value,
                expires_at: now + Duration::from_secs(ttl_seconds),
            },
        );
        Ok(true)
    }

    async fn increment(&self, key: &str, ttl_seconds: u64) -> AppResult<i64> {
        let now = Instant::now();
        let mut table = self.table.write().await;
        table.record_write(now);
        let entry = table
            .entries
            .entry(key.to_owned())
            .and_modify(|entry| {
                if !entry.is_live(now) {
                    entry.value = 0;
                    entry.expires_at = now + Duration::from_secs(ttl_seconds);
                }
            })
            .or_insert(CounterEntry {
                value: 0,
                expires_at: now + Duration::from_secs(ttl_seconds),
            });

        entry.value += 1;
        Ok(entry.value)
    }

    async fn forget(&self, key: &str) -> AppResult<bool> {
        let mut table = self.table.write().await;
        Ok(table
            .entries
            .remove(key)
            .is_some_and(|entry| entry.is_live(Instant::now())))
    }

    async fn flush(&self) -> AppResult<()> {
        self.table.write().await.entries.clear();
        Ok(())
    }
}
