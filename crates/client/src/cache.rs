//! Single-value cache with optional TTL and single-flight refresh
//!
//! [`CacheEntry`] backs the session, the resource snapshot and each client
//! factory slot. Readers share a read lock while the value is fresh; a stale
//! or empty entry is refreshed under the write lock, so concurrent callers
//! wait for one fetch instead of issuing their own.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
struct Cached<T> {
    value: T,
    fetched_at: Instant,
}

/// A lazily fetched value
///
/// `ttl = None` means the value never goes stale and is only dropped by
/// [`invalidate`](Self::invalidate).
#[derive(Debug)]
pub struct CacheEntry<T> {
    name: &'static str,
    ttl: Option<Duration>,
    slot: RwLock<Option<Cached<T>>>,
    fetches: AtomicU64,
}

impl<T: Clone> CacheEntry<T> {
    /// Entry that expires `ttl` after each fetch
    pub fn with_ttl(name: &'static str, ttl: Duration) -> Self {
        Self::new(name, Some(ttl))
    }

    /// Entry that stays valid until invalidated
    pub fn unbounded(name: &'static str) -> Self {
        Self::new(name, None)
    }

    /// Entry with an optional TTL
    pub fn new(name: &'static str, ttl: Option<Duration>) -> Self {
        Self {
            name,
            ttl,
            slot: RwLock::new(None),
            fetches: AtomicU64::new(0),
        }
    }

    /// Configured TTL
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    fn fresh(&self, cached: &Cached<T>) -> bool {
        self.ttl.is_none_or(|ttl| cached.fetched_at.elapsed() < ttl)
    }

    /// Current value, fetching it first if missing or stale
    ///
    /// The fetch runs while the write lock is held. On error the previous
    /// value stays in place and the error is returned to this caller;
    /// callers queued behind it will attempt their own fetch.
    pub async fn get_or_fetch<F, Fut, E>(&self, fetch: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        {
            let guard = self.slot.read().await;
            if let Some(cached) = guard.as_ref().filter(|c| self.fresh(c)) {
                debug!(cache = self.name, "cache hit");
                return Ok(cached.value.clone());
            }
        }

        let mut guard = self.slot.write().await;
        // Re-check: another caller may have refreshed while we waited
        if let Some(cached) = guard.as_ref().filter(|c| self.fresh(c)) {
            debug!(cache = self.name, "cache filled by concurrent fetch");
            return Ok(cached.value.clone());
        }

        debug!(cache = self.name, stale = guard.is_some(), "cache miss, fetching");
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let value = fetch().await?;
        *guard = Some(Cached {
            value: value.clone(),
            fetched_at: Instant::now(),
        });
        Ok(value)
    }

    /// Value regardless of freshness, without fetching
    pub async fn peek(&self) -> Option<T> {
        self.slot.read().await.as_ref().map(|c| c.value.clone())
    }

    /// Drop the value; the next read fetches
    pub async fn invalidate(&self) {
        if self.slot.write().await.take().is_some() {
            debug!(cache = self.name, "cache invalidated");
        }
    }

    /// Drop the value only if `pred` holds for it
    ///
    /// Returns whether the value was dropped.
    pub async fn invalidate_if<P>(&self, pred: P) -> bool
    where
        P: FnOnce(&T) -> bool,
    {
        let mut guard = self.slot.write().await;
        if guard.as_ref().is_some_and(|c| pred(&c.value)) {
            *guard = None;
            debug!(cache = self.name, "cache invalidated");
            true
        } else {
            false
        }
    }

    /// Number of fetches started so far
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn fresh_value_is_reused_until_ttl() {
        let entry = CacheEntry::with_ttl("test", Duration::from_secs(10));

        let v = entry.get_or_fetch(|| async { Ok::<_, ()>(1) }).await.unwrap();
        assert_eq!(v, 1);
        let v = entry.get_or_fetch(|| async { Ok::<_, ()>(2) }).await.unwrap();
        assert_eq!(v, 1);

        tokio::time::advance(Duration::from_secs(10)).await;
        let v = entry.get_or_fetch(|| async { Ok::<_, ()>(3) }).await.unwrap();
        assert_eq!(v, 3);
        assert_eq!(entry.fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_keeps_stale_value() {
        let entry = CacheEntry::with_ttl("test", Duration::from_secs(1));
        entry.get_or_fetch(|| async { Ok::<_, &str>("old") }).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        let err = entry.get_or_fetch(|| async { Err("down") }).await.unwrap_err();
        assert_eq!(err, "down");
        assert_eq!(entry.peek().await, Some("old"));
    }

    #[tokio::test]
    async fn unbounded_entry_needs_invalidation() {
        let entry = CacheEntry::unbounded("test");
        entry.get_or_fetch(|| async { Ok::<_, ()>(1) }).await.unwrap();
        assert_eq!(entry.get_or_fetch(|| async { Ok::<_, ()>(2) }).await, Ok(1));

        entry.invalidate().await;
        assert_eq!(entry.peek().await, None);
        assert_eq!(entry.get_or_fetch(|| async { Ok::<_, ()>(2) }).await, Ok(2));
    }

    #[tokio::test]
    async fn invalidate_if_compares_identity() {
        let entry = CacheEntry::unbounded("test");
        let first = entry
            .get_or_fetch(|| async { Ok::<_, ()>(Arc::new("a")) })
            .await
            .unwrap();
        let other = Arc::new("a");

        assert!(!entry.invalidate_if(|v| Arc::ptr_eq(v, &other)).await);
        assert!(entry.invalidate_if(|v| Arc::ptr_eq(v, &first)).await);
        assert!(!entry.invalidate_if(|_| true).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_readers_share_one_fetch() {
        let entry = Arc::new(CacheEntry::with_ttl("test", Duration::from_secs(60)));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let entry = Arc::clone(&entry);
            handles.push(tokio::spawn(async move {
                entry
                    .get_or_fetch(|| async {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok::<_, ()>(7)
                    })
                    .await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(7));
        }
        assert_eq!(entry.fetch_count(), 1);
    }
}
