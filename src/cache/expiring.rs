//! Generic time-expiring cache with in-flight fetch coalescing

use crate::metrics;
use crate::Result;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

type PendingFetch<T> = Shared<BoxFuture<'static, Option<Arc<T>>>>;

/// A single cached payload
///
/// Fresh iff the payload is present and `now - populated_at < ttl`.
#[derive(Debug)]
pub struct CacheEntry<T> {
    data: Option<Arc<T>>,
    populated_at: Option<Instant>,
    ttl: Duration,
}

impl<T> CacheEntry<T> {
    fn populated(data: Arc<T>, at: Instant, ttl: Duration) -> Self {
        Self {
            data: Some(data),
            populated_at: Some(at),
            ttl,
        }
    }

    pub fn is_fresh(&self, now: Instant) -> bool {
        match (&self.data, self.populated_at) {
            (Some(_), Some(at)) => now.saturating_duration_since(at) < self.ttl,
            _ => false,
        }
    }

    pub fn data(&self) -> Option<&Arc<T>> {
        self.data.as_ref()
    }

    pub fn populated_at(&self) -> Option<Instant> {
        self.populated_at
    }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears a key's in-flight slot when the fetch task ends, including by panic
struct InflightSlot<K: Eq + Hash, T> {
    inflight: Arc<Mutex<HashMap<K, PendingFetch<T>>>>,
    key: K,
}

impl<K: Eq + Hash, T> Drop for InflightSlot<K, T> {
    fn drop(&mut self) {
        lock(&self.inflight).remove(&self.key);
    }
}

/// Keyed cache where every entry expires `ttl` after it was populated
///
/// [`get`](Self::get) returns `None` to signal "unavailable": the entry was
/// stale or missing and the fetch failed. A failed fetch never touches the
/// stored entry. At most one fetch per key is in flight at a time; callers
/// arriving while one is pending await the same result.
pub struct ExpiringCache<K, T> {
    partition: &'static str,
    ttl: Duration,
    entries: Arc<Mutex<HashMap<K, CacheEntry<T>>>>,
    inflight: Arc<Mutex<HashMap<K, PendingFetch<T>>>>,
}

impl<K, T> ExpiringCache<K, T>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    pub fn new(partition: &'static str, ttl: Duration) -> Self {
        Self {
            partition,
            ttl,
            entries: Arc::new(Mutex::new(HashMap::new())),
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn partition(&self) -> &'static str {
        self.partition
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the fresh payload for `key`, or fetch it
    ///
    /// The fetch runs on its own task, so it completes and commits even if
    /// every caller waiting on it is dropped.
    pub async fn get<F, Fut>(&self, key: K, fetcher: F) -> Option<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        if let Some(data) = self.fresh(&key) {
            metrics::record_cache_operation(self.partition, "hit");
            return Some(data);
        }

        let pending = {
            let mut inflight = lock(&self.inflight);

            // A fetch may have committed between the check above and taking the lock
            if let Some(data) = self.fresh(&key) {
                metrics::record_cache_operation(self.partition, "hit");
                return Some(data);
            }

            match inflight.get(&key) {
                Some(pending) => {
                    tracing::debug!(partition = self.partition, key = ?key, "Joining in-flight fetch");
                    metrics::record_cache_operation(self.partition, "coalesced");
                    pending.clone()
                }
                None => {
                    tracing::debug!(partition = self.partition, key = ?key, "Cache miss, fetching");
                    metrics::record_cache_operation(self.partition, "miss");
                    let pending = self.spawn_fetch(key.clone(), fetcher());
                    inflight.insert(key, pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    fn spawn_fetch<Fut>(&self, key: K, fetch: Fut) -> PendingFetch<T>
    where
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let partition = self.partition;
        let ttl = self.ttl;
        let entries = Arc::clone(&self.entries);
        let inflight = Arc::clone(&self.inflight);
        let requested_at = Instant::now();

        let task = tokio::spawn(async move {
            let _slot = InflightSlot {
                inflight,
                key: key.clone(),
            };
            match fetch.await {
                Ok(data) => {
                    let data = Arc::new(data);
                    lock(&entries).insert(
                        key.clone(),
                        CacheEntry::populated(Arc::clone(&data), requested_at, ttl),
                    );
                    Some(data)
                }
                Err(e) => {
                    tracing::warn!(
                        partition,
                        key = ?key,
                        error = %e,
                        "Fetch failed, keeping previous entry"
                    );
                    metrics::record_cache_operation(partition, "unavailable");
                    metrics::record_fetch_error(partition);
                    None
                }
            }
        });

        async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(partition, error = %e, "Fetch task aborted");
                    metrics::record_cache_operation(partition, "unavailable");
                    metrics::record_fetch_error(partition);
                    None
                }
            }
        }
        .boxed()
        .shared()
    }

    fn fresh(&self, key: &K) -> Option<Arc<T>> {
        let entries = lock(&self.entries);
        let entry = entries.get(key)?;
        if entry.is_fresh(Instant::now()) {
            entry.data().cloned()
        } else {
            None
        }
    }

    /// Whether `key` holds a fresh payload
    pub fn is_fresh(&self, key: &K) -> bool {
        self.fresh(key).is_some()
    }

    /// Last population time for `key`, fresh or not
    pub fn populated_at(&self, key: &K) -> Option<Instant> {
        lock(&self.entries).get(key).and_then(CacheEntry::populated_at)
    }

    /// Stored payload for `key`, ignoring freshness
    pub fn peek(&self, key: &K) -> Option<Arc<T>> {
        lock(&self.entries).get(key).and_then(|e| e.data().cloned())
    }

    /// Whether a fetch for `key` is currently pending
    pub fn is_in_flight(&self, key: &K) -> bool {
        lock(&self.inflight).contains_key(key)
    }

    pub fn invalidate(&self, key: &K) {
        lock(&self.entries).remove(key);
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }

    /// Number of stored entries, stale ones included
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TrendSpotterError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_fetch(
        calls: &Arc<AtomicUsize>,
        value: Vec<u32>,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<Vec<u32>>> {
        let calls = Arc::clone(calls);
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(value)
            }
            .boxed()
        }
    }

    fn failing_fetch(
        calls: &Arc<AtomicUsize>,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<Vec<u32>>> {
        let calls = Arc::clone(calls);
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TrendSpotterError::Other("boom".to_string()))
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_within_ttl_fetch_once() {
        let cache: ExpiringCache<u64, Vec<u32>> =
            ExpiringCache::new("comments", Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let data = cache.get(1, counting_fetch(&calls, vec![1, 2, 3])).await;
            assert_eq!(data.as_deref(), Some(&vec![1, 2, 3]));
            tokio::time::advance(Duration::from_secs(10)).await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_refetches_once() {
        let cache: ExpiringCache<u64, Vec<u32>> =
            ExpiringCache::new("comments", Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));

        cache.get(1, counting_fetch(&calls, vec![1])).await;
        let first = cache.populated_at(&1).unwrap();

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(!cache.is_fresh(&1));

        let data = cache.get(1, counting_fetch(&calls, vec![1, 2])).await;
        assert_eq!(data.as_deref(), Some(&vec![1, 2]));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.populated_at(&1).unwrap() > first);

        // Fresh again: no third fetch
        cache.get(1, counting_fetch(&calls, vec![9])).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_unavailable_and_keeps_stale_entry() {
        let cache: ExpiringCache<String, Vec<u32>> =
            ExpiringCache::new("posts", Duration::from_secs(30));
        let calls = Arc::new(AtomicUsize::new(0));

        cache.get("u1".to_string(), counting_fetch(&calls, vec![7])).await;
        let stamped = cache.populated_at(&"u1".to_string());
        tokio::time::advance(Duration::from_secs(31)).await;

        let result = cache.get("u1".to_string(), failing_fetch(&calls)).await;
        assert!(result.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Stale payload untouched
        assert_eq!(cache.peek(&"u1".to_string()).as_deref(), Some(&vec![7]));
        assert_eq!(cache.populated_at(&"u1".to_string()), stamped);
        assert!(!cache.is_in_flight(&"u1".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_payload_is_not_unavailable() {
        let cache: ExpiringCache<u64, Vec<u32>> =
            ExpiringCache::new("comments", Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));

        let data = cache.get(3, counting_fetch(&calls, Vec::new())).await;
        assert_eq!(data.as_deref(), Some(&Vec::new()));
        assert!(cache.is_fresh(&3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_gets_share_one_fetch() {
        let cache: ExpiringCache<u64, Vec<u32>> =
            ExpiringCache::new("comments", Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));

        let slow = |calls: &Arc<AtomicUsize>| {
            let calls = Arc::clone(calls);
            move || {
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    Ok(vec![42])
                }
                .boxed()
            }
        };

        let (a, b, c) = tokio::join!(
            cache.get(5, slow(&calls)),
            cache.get(5, slow(&calls)),
            cache.get(5, slow(&calls)),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.as_deref(), Some(&vec![42]));
        assert_eq!(b, a);
        assert_eq!(c, a);
        assert!(!cache.is_in_flight(&5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_fetch_still_commits() {
        let cache: ExpiringCache<u64, Vec<u32>> =
            ExpiringCache::new("comments", Duration::from_secs(60));

        let fetch = || {
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(vec![1])
            }
            .boxed()
        };

        let timed_out =
            tokio::time::timeout(Duration::from_secs(1), cache.get(9, fetch)).await;
        assert!(timed_out.is_err());
        assert!(cache.is_in_flight(&9));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(cache.is_fresh(&9));
        assert!(!cache.is_in_flight(&9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_fetch_does_not_wedge_key() {
        let cache: ExpiringCache<u64, Vec<u32>> =
            ExpiringCache::new("comments", Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));

        let panicking = || -> BoxFuture<'static, Result<Vec<u32>>> {
            async { panic!("fetcher exploded") }.boxed()
        };
        assert!(cache.get(1, panicking).await.is_none());
        assert!(!cache.is_in_flight(&1));
        assert!(cache.peek(&1).is_none());

        let data = cache.get(1, counting_fetch(&calls, vec![4])).await;
        assert_eq!(data.as_deref(), Some(&vec![4]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.is_fresh(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_and_clear() {
        let cache: ExpiringCache<u64, Vec<u32>> =
            ExpiringCache::new("comments", Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));

        cache.get(1, counting_fetch(&calls, vec![1])).await;
        cache.get(2, counting_fetch(&calls, vec![2])).await;
        assert_eq!(cache.len(), 2);

        cache.invalidate(&1);
        assert_eq!(cache.len(), 1);
        assert!(cache.peek(&1).is_none());

        cache.clear();
        assert!(cache.is_empty());
    }
}
