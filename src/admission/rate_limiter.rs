//! Per-identity request rate limiting.
//!
//! Counts requests in a fixed one-minute window keyed by identity. A batch
//! is charged once per envelope, so `count` may be larger than one.
//!
//! Counters live in the first tier that works:
//!
//! 1. a shared [`CounterStore`] with atomic increment (correct across
//!    processes; what multi-process deployments must configure),
//! 2. the same store used with read-then-write (racy, but shared),
//! 3. a mutex-guarded in-process map.
//!
//! The default store is [`NullStore`], so a fresh [`RateLimiter`] always
//! counts in-process. That is exact for a single process only.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::config::RATE_WINDOW_SECS;
use crate::errors::{McpError, McpResult};

const KEY_PREFIX: &str = "mcp:rate_limit:";

// ---------------------------------------------------------------------------
// CounterStore
// ---------------------------------------------------------------------------

/// An external key/value cache the limiter can count in.
///
/// Stores advertise which access styles they support. Errors are never
/// fatal: the limiter logs them and drops to the next tier.
pub trait CounterStore: Send + Sync {
    /// Short name for log lines.
    fn name(&self) -> &str;

    /// Whether [`CounterStore::increment`] is atomic and usable.
    fn supports_increment(&self) -> bool {
        false
    }

    /// Add `by` to `key`, creating it with `ttl` when absent.
    ///
    /// Returns the new value, or `None` when the store declined.
    fn increment(&self, _key: &str, _by: u64, _ttl: Duration) -> anyhow::Result<Option<u64>> {
        Ok(None)
    }

    /// Whether [`CounterStore::read`] and [`CounterStore::write`] are usable.
    fn supports_read_write(&self) -> bool {
        false
    }

    fn read(&self, _key: &str) -> anyhow::Result<Option<u64>> {
        Ok(None)
    }

    fn write(&self, _key: &str, _value: u64, _ttl: Duration) -> anyhow::Result<()> {
        Ok(())
    }

    /// Drop every counter.
    fn clear(&self) {}
}

/// A store that stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

impl CounterStore for NullStore {
    fn name(&self) -> &str {
        "null"
    }
}

#[derive(Debug, Clone, Copy)]
struct Expiring {
    value: u64,
    expires_at: Instant,
}

impl Expiring {
    fn live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-process cache with atomic per-key increment and expiry.
///
/// Shared across tasks of one process. Useful as a drop-in for tests of the
/// shared-store tier and for single-process deployments that want the same
/// code path as production.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, Expiring>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CounterStore for MemoryCacheStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn supports_increment(&self) -> bool {
        true
    }

    fn increment(&self, key: &str, by: u64, ttl: Duration) -> anyhow::Result<Option<u64>> {
        let now = Instant::now();
        let mut entry = self.entries.entry(key.to_string()).or_insert(Expiring {
            value: 0,
            expires_at: now + ttl,
        });
        if !entry.live(now) {
            *entry = Expiring {
                value: 0,
                expires_at: now + ttl,
            };
        }
        entry.value += by;
        Ok(Some(entry.value))
    }

    fn supports_read_write(&self) -> bool {
        true
    }

    fn read(&self, key: &str) -> anyhow::Result<Option<u64>> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|e| e.live(now))
            .map(|e| e.value))
    }

    fn write(&self, key: &str, value: u64, ttl: Duration) -> anyhow::Result<()> {
        self.entries.insert(
            key.to_string(),
            Expiring {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    fn clear(&self) {
        self.entries.clear();
    }
}

// ---------------------------------------------------------------------------
// RateLimiter
// ---------------------------------------------------------------------------

/// Fixed-window request counter per identity.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    local: Mutex<HashMap<String, Expiring>>,
    window: Duration,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("store", &self.store.name())
            .field("window", &self.window)
            .finish()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    /// A limiter that counts in-process only.
    pub fn new() -> Self {
        Self::with_store(Arc::new(NullStore))
    }

    /// A limiter that counts in `store` first.
    pub fn with_store(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            local: Mutex::new(HashMap::new()),
            window: Duration::from_secs(RATE_WINDOW_SECS),
        }
    }

    /// Charge `count` requests to `identity_id` and fail if the running
    /// total in this window exceeds `limit`.
    ///
    /// The charge is kept even when the check fails.
    pub fn check(&self, identity_id: u64, count: u64, limit: u64) -> McpResult<()> {
        self.check_at(identity_id, count, limit, Instant::now())
    }

    pub(crate) fn check_at(
        &self,
        identity_id: u64,
        count: u64,
        limit: u64,
        now: Instant,
    ) -> McpResult<()> {
        let key = format!("{}{}", KEY_PREFIX, identity_id);
        let current = self.increment_counter(&key, count, now);
        if current > limit {
            log::debug!(
                "Rate limit hit for identity {}: {} > {}/min",
                identity_id,
                current,
                limit
            );
            return Err(McpError::RateLimitExceeded { limit });
        }
        Ok(())
    }

    /// Reset every counter in every tier.
    pub fn clear(&self) {
        self.local.lock().clear();
        self.store.clear();
    }

    fn increment_counter(&self, key: &str, count: u64, now: Instant) -> u64 {
        if self.store.supports_increment() {
            match self.store.increment(key, count, self.window) {
                Ok(Some(value)) => return value,
                Ok(None) => {}
                Err(e) => log::warn!("Counter store '{}' increment failed: {:#}", self.store.name(), e),
            }
        }

        if self.store.supports_read_write() {
            match self.read_write(key, count) {
                Ok(Some(value)) => return value,
                Ok(None) => {}
                Err(e) => log::warn!("Counter store '{}' read/write failed: {:#}", self.store.name(), e),
            }
        }

        self.increment_local(key, count, now)
    }

    /// Read-then-write. Not atomic: concurrent callers may under-count.
    fn read_write(&self, key: &str, count: u64) -> anyhow::Result<Option<u64>> {
        match self.store.read(key)? {
            Some(value) => {
                let next = value + count;
                self.store.write(key, next, self.window)?;
                Ok(Some(next))
            }
            None => {
                self.store.write(key, count, self.window)?;
                // A store that silently drops writes must not be trusted.
                if self.store.read(key)? == Some(count) {
                    Ok(Some(count))
                } else {
                    Ok(None)
                }
            }
        }
    }

    fn increment_local(&self, key: &str, count: u64, now: Instant) -> u64 {
        let mut local = self.local.lock();
        match local.get_mut(key) {
            Some(entry) if entry.live(now) => {
                entry.value += count;
                entry.value
            }
            _ => {
                local.insert(
                    key.to_string(),
                    Expiring {
                        value: count,
                        expires_at: now + self.window,
                    },
                );
                count
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_exactly_limit_calls_succeed() {
        let limiter = RateLimiter::new();
        for _ in 0..60 {
            limiter.check(1, 1, 60).unwrap();
        }
        let err = limiter.check(1, 1, 60).unwrap_err();
        assert_eq!(err.to_string(), "Rate limit exceeded (60/min)");
        assert_eq!(err.code(), crate::errors::ADMISSION_REJECTED);
    }

    #[test]
    fn test_identities_are_independent() {
        let limiter = RateLimiter::new();
        for _ in 0..5 {
            limiter.check(1, 1, 5).unwrap();
        }
        assert!(limiter.check(1, 1, 5).is_err());
        assert!(limiter.check(2, 1, 5).is_ok());
    }

    #[test]
    fn test_batch_counts_each_envelope() {
        let limiter = RateLimiter::new();
        for _ in 0..20 {
            limiter.check(3, 1, 60).unwrap();
        }
        limiter.check(3, 40, 60).unwrap();
        assert!(limiter.check(3, 1, 60).is_err());

        limiter.check(4, 10, 10).unwrap();
        assert!(limiter.check(4, 1, 10).is_err());
    }

    #[test]
    fn test_window_expiry_resets_counter() {
        let limiter = RateLimiter::new();
        let start = Instant::now();
        for _ in 0..3 {
            limiter.check_at(5, 1, 3, start).unwrap();
        }
        assert!(limiter.check_at(5, 1, 3, start).is_err());

        let later = start + Duration::from_secs(RATE_WINDOW_SECS + 1);
        for _ in 0..3 {
            limiter.check_at(5, 1, 3, later).unwrap();
        }
        assert!(limiter.check_at(5, 1, 3, later).is_err());
    }

    #[test]
    fn test_clear_resets_counter() {
        let limiter = RateLimiter::with_store(Arc::new(MemoryCacheStore::new()));
        for _ in 0..2 {
            limiter.check(6, 1, 2).unwrap();
        }
        assert!(limiter.check(6, 1, 2).is_err());
        limiter.clear();
        limiter.check(6, 1, 2).unwrap();
        limiter.check(6, 1, 2).unwrap();
    }

    #[test]
    fn test_shared_store_used_first() {
        let store = Arc::new(MemoryCacheStore::new());
        let a = RateLimiter::with_store(store.clone());
        let b = RateLimiter::with_store(store.clone());
        // Two limiters sharing one store see the same counter.
        a.check(7, 2, 3).unwrap();
        assert!(b.check(7, 2, 3).is_err());
        assert_eq!(store.read("mcp:rate_limit:7").unwrap(), Some(4));
    }

    #[test]
    fn test_memory_store_expiry() {
        let store = MemoryCacheStore::new();
        let ttl = Duration::from_millis(10);
        assert_eq!(store.increment("k", 2, ttl).unwrap(), Some(2));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(store.read("k").unwrap(), None);
        assert_eq!(store.increment("k", 1, ttl).unwrap(), Some(1));
    }

    /// Read/write only, no atomic increment.
    #[derive(Default)]
    struct PlainStore {
        values: Mutex<HashMap<String, u64>>,
        writes: AtomicUsize,
    }

    impl CounterStore for PlainStore {
        fn name(&self) -> &str {
            "plain"
        }

        fn supports_read_write(&self) -> bool {
            true
        }

        fn read(&self, key: &str) -> anyhow::Result<Option<u64>> {
            Ok(self.values.lock().get(key).copied())
        }

        fn write(&self, key: &str, value: u64, _ttl: Duration) -> anyhow::Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.values.lock().insert(key.to_string(), value);
            Ok(())
        }
    }

    #[test]
    fn test_read_write_tier() {
        let store = Arc::new(PlainStore::default());
        let limiter = RateLimiter::with_store(store.clone());
        limiter.check(8, 1, 2).unwrap();
        limiter.check(8, 1, 2).unwrap();
        assert!(limiter.check(8, 1, 2).is_err());
        assert_eq!(store.writes.load(Ordering::SeqCst), 3);
        assert!(limiter.local.lock().is_empty());
    }

    /// Claims to work but loses every write.
    struct LossyStore;

    impl CounterStore for LossyStore {
        fn name(&self) -> &str {
            "lossy"
        }

        fn supports_increment(&self) -> bool {
            true
        }

        fn increment(&self, _key: &str, _by: u64, _ttl: Duration) -> anyhow::Result<Option<u64>> {
            anyhow::bail!("connection refused")
        }

        fn supports_read_write(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_broken_store_falls_back_to_local() {
        let limiter = RateLimiter::with_store(Arc::new(LossyStore));
        limiter.check(9, 1, 2).unwrap();
        limiter.check(9, 1, 2).unwrap();
        assert!(limiter.check(9, 1, 2).is_err());
        assert_eq!(limiter.local.lock().get("mcp:rate_limit:9").map(|e| e.value), Some(3));
    }

    #[test]
    fn test_concurrent_checks_count_exactly() {
        let limiter = Arc::new(RateLimiter::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..25).filter(|_| limiter.check(10, 1, 100).is_ok()).count()
                })
            })
            .collect();
        let ok: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(ok, 100);
        assert!(limiter.check(10, 1, 100).is_err());
    }
}
