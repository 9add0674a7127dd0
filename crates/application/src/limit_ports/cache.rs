use async_trait::async_trait;

use limitgate_core::AppResult;

/// Key/value store holding hit counters and lockout markers.
///
/// Every value is an integer with a time-to-live in seconds. Backends report
/// connectivity problems as [`limitgate_core::AppError::Unavailable`] so the
/// evaluator can apply its failure policy.
#[async_trait]
pub trait LimitCacheStore: Send + Sync {
    /// Returns the live value stored at a key.
    async fn get(&self, key: &str) -> AppResult<Option<i64>>;

    /// Stores a value only when the key is absent. Returns whether it was stored.
    async fn add(&self, key: &str, value: i64, ttl_seconds: u64) -> AppResult<bool>;

    /// Atomically creates the key at zero with the given time-to-live when
    /// absent, then increments it. Returns the post-increment value.
    ///
    /// The time-to-live of an existing key is never extended.
    async fn increment(&self, key: &str, ttl_seconds: u64) -> AppResult<i64>;

    /// Deletes a key. Returns whether it existed.
    async fn forget(&self, key: &str) -> AppResult<bool>;

    /// Deletes every key owned by this store.
    async fn flush(&self) -> AppResult<()>;
}
