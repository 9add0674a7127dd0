//! Hit counters and lockout markers over a [`LimitCacheStore`].
//!
//! A counter lives at the rule key and expires one period after its first
//! hit. Once the counter reaches the rule's rate a lockout marker is written
//! at `<key>:lockout` holding the epoch second at which it expires, and the
//! counter itself is dropped. While the marker lives every check reports the
//! key as locked out.

use std::sync::Arc;

use chrono::Utc;

use limitgate_core::AppResult;
use limitgate_domain::LimitKey;

use crate::limit_ports::LimitCacheStore;

/// Outcome of a threshold check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleCheck {
    /// No lockout and the counter is below the rate.
    UnderLimit,
    /// A lockout marker already existed.
    LockedOut,
    /// The counter reached the rate and a lockout was just started.
    LockoutStarted,
}

impl ThrottleCheck {
    /// Returns whether the key is over its rate.
    #[must_use]
    pub fn is_over(self) -> bool {
        !matches!(self, Self::UnderLimit)
    }
}

/// Counter operations used by evaluation and administration.
#[derive(Clone)]
pub struct LimitCounterStore {
    cache: Arc<dyn LimitCacheStore>,
}

impl LimitCounterStore {
    /// Creates a counter store.
    #[must_use]
    pub fn new(cache: Arc<dyn LimitCacheStore>) -> Self {
        Self { cache }
    }

    /// Checks a key against its rate, starting a lockout when the counter
    /// has reached it.
    pub async fn too_many_attempts(
        &self,
        key: &LimitKey,
        rate: u32,
        period_minutes: u32,
    ) -> AppResult<ThrottleCheck> {
        if self.has_lockout(key).await? {
            return Ok(ThrottleCheck::LockedOut);
        }

        if self.attempts(key).await? < i64::from(rate) {
            return Ok(ThrottleCheck::UnderLimit);
        }

        let ttl_seconds = period_seconds(period_minutes);
        let expires_at = Utc::now().timestamp() + ttl_seconds_i64(ttl_seconds);
        let started = self
            .cache
            .add(&key.lockout_key(), expires_at, ttl_seconds)
            .await?;
        self.cache.forget(key.as_str()).await?;

        Ok(if started {
            ThrottleCheck::LockoutStarted
        } else {
            ThrottleCheck::LockedOut
        })
    }

    /// Counts one hit, creating the counter for a fresh window when absent.
    pub async fn hit(&self, key: &LimitKey, period_minutes: u32) -> AppResult<i64> {
        self.cache
            .increment(key.as_str(), period_seconds(period_minutes))
            .await
    }

    /// Returns the raw counter value, zero when absent.
    pub async fn attempts(&self, key: &LimitKey) -> AppResult<i64> {
        Ok(self.cache.get(key.as_str()).await?.unwrap_or(0))
    }

    /// Returns the attempts reported to administrators.
    ///
    /// A locked out key has had its counter dropped, so it reports the rate.
    pub async fn reported_attempts(&self, key: &LimitKey, rate: u32) -> AppResult<i64> {
        match self.cache.get(key.as_str()).await? {
            Some(attempts) => Ok(attempts),
            None if self.has_lockout(key).await? => Ok(i64::from(rate)),
            None => Ok(0),
        }
    }

    /// Returns the hits left before the key locks out.
    pub async fn retries_left(&self, key: &LimitKey, rate: u32) -> AppResult<u32> {
        if self.has_lockout(key).await? {
            return Ok(0);
        }

        let attempts = self.attempts(key).await?;
        let remaining = i64::from(rate).saturating_sub(attempts).max(0);
        Ok(u32::try_from(remaining).unwrap_or(0))
    }

    /// Returns seconds until the lockout marker expires, when locked out.
    pub async fn available_in(&self, key: &LimitKey) -> AppResult<Option<u64>> {
        let Some(expires_at) = self.cache.get(&key.lockout_key()).await? else {
            return Ok(None);
        };

        let remaining = expires_at.saturating_sub(Utc::now().timestamp()).max(0);
        Ok(Some(u64::try_from(remaining).unwrap_or(0)))
    }

    /// Returns the epoch second at which the lockout marker expires.
    pub async fn lockout_expires_at(&self, key: &LimitKey) -> AppResult<Option<i64>> {
        self.cache.get(&key.lockout_key()).await
    }

    /// Returns whether a lockout marker exists.
    pub async fn has_lockout(&self, key: &LimitKey) -> AppResult<bool> {
        Ok(self.cache.get(&key.lockout_key()).await?.is_some())
    }

    /// Drops the counter and the lockout marker.
    pub async fn clear(&self, key: &LimitKey) -> AppResult<()> {
        self.cache.forget(key.as_str()).await?;
        self.cache.forget(&key.lockout_key()).await?;
        Ok(())
    }

    /// Drops every counter and marker.
    pub async fn flush(&self) -> AppResult<()> {
        self.cache.flush().await
    }
}

fn period_seconds(period_minutes: u32) -> u64 {
    u64::from(period_minutes) * 60
}

fn ttl_seconds_i64(ttl_seconds: u64) -> i64 {
    i64::try_from(ttl_seconds).unwrap_or(i64::MAX)
}
