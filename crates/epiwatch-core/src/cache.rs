//! Bounded, single-flight memoization of warehouse query results.
//!
//! Keys are [`BoundQuery`] signatures (the exact query text plus its
//! ordered parameter tuple), so two filter sets that build the same query
//! share one entry. Entries never expire by time: the operator accepts
//! staleness until the process recycles or [`ResultCache::clear`] is
//! called. Capacity is enforced with least-recently-used eviction.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use log::debug;
use tokio::sync::{Mutex, OnceCell};

use epiwatch_warehouse::{BoundQuery, QueryResult};

type Slot = Arc<OnceCell<Arc<QueryResult>>>;

struct CacheEntry {
    slot: Slot,
    last_used: u64,
}

struct CacheInner {
    map: HashMap<BoundQuery, CacheEntry>,
    capacity: usize,
    tick: u64,
}

/// Thread-safe memoization cache for `(query text, parameter tuple)` pairs.
///
/// Concurrent misses for the same signature coalesce into a single
/// computation; a failed computation stores nothing and its error
/// propagates to every waiting caller.
#[derive(Clone)]
pub struct ResultCache {
    inner: Arc<Mutex<CacheInner>>,
}

impl ResultCache {
    /// Create a cache holding at most `capacity` distinct signatures.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheInner {
                map: HashMap::new(),
                capacity: capacity.max(1),
                tick: 0,
            })),
        }
    }

    /// Return the cached result for `signature`, or run `compute` exactly
    /// once to produce it.
    ///
    /// Concurrent callers with the same signature wait on the in-flight
    /// computation instead of issuing their own warehouse call.
    ///
    /// # Errors
    /// Propagates the compute error unmodified; nothing is stored for the
    /// signature in that case.
    pub async fn get_or_compute<E, F, Fut>(
        &self,
        signature: BoundQuery,
        compute: F,
    ) -> Result<Arc<QueryResult>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<QueryResult, E>>,
    {
        let slot = {
            let mut inner = self.inner.lock().await;
            inner.tick += 1;
            let tick = inner.tick;
            let entry = inner
                .map
                .entry(signature.clone())
                .or_insert_with(|| CacheEntry {
                    slot: Arc::new(OnceCell::new()),
                    last_used: tick,
                });
            entry.last_used = tick;
            Arc::clone(&entry.slot)
        };

        if slot.initialized() {
            debug!("cache hit");
        } else {
            debug!("cache miss");
        }

        let computed = slot
            .get_or_try_init(|| async { compute().await.map(Arc::new) })
            .await;

        match computed {
            Ok(value) => {
                let value = Arc::clone(value);
                self.evict_over_capacity(&signature).await;
                Ok(value)
            }
            Err(error) => {
                // Failed computes must not be cached: drop the placeholder
                // unless a concurrent caller has since filled it.
                let mut inner = self.inner.lock().await;
                let remove = inner
                    .map
                    .get(&signature)
                    .is_some_and(|entry| Arc::ptr_eq(&entry.slot, &slot) && slot.get().is_none());
                if remove {
                    inner.map.remove(&signature);
                }
                Err(error)
            }
        }
    }

    async fn evict_over_capacity(&self, just_used: &BoundQuery) {
        let mut inner = self.inner.lock().await;
        while inner.map.len() > inner.capacity {
            // Only settled entries are eviction candidates: an uninitialized
            // slot has callers waiting on it.
            let victim = inner
                .map
                .iter()
                .filter(|(signature, entry)| {
                    *signature != just_used && entry.slot.initialized()
                })
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(signature, _)| signature.clone());

            match victim {
                Some(signature) => {
                    debug!("evicting least-recently-used cache entry");
                    inner.map.remove(&signature);
                }
                None => break,
            }
        }
    }

    /// Number of cached signatures, including in-flight entries.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.map.len()
    }

    /// Whether the cache currently holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every entry. Used after out-of-band warehouse loads.
    pub async fn clear(&self) {
        self.inner.lock().await.map.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use epiwatch_warehouse::SqlParam;

    fn signature(tag: &str) -> BoundQuery {
        BoundQuery {
            sql: "SELECT * FROM daily_counts WHERE 1=1 AND area = ?".to_string(),
            params: vec![SqlParam::Text(tag.to_string())],
        }
    }

    fn result_with_rows(count: usize) -> QueryResult {
        QueryResult {
            columns: Vec::new(),
            rows: vec![Vec::new(); count],
            row_count: count,
            truncated: false,
        }
    }

    #[tokio::test]
    async fn second_call_does_not_recompute() {
        let cache = ResultCache::new(8);
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let value = cache
                .get_or_compute::<(), _, _>(signature("Alameda"), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(result_with_rows(3))
                })
                .await
                .expect("compute");
            assert_eq!(value.row_count, 3);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1, "compute_fn ran twice");
    }

    #[tokio::test]
    async fn different_signatures_compute_independently() {
        let cache = ResultCache::new(8);
        let calls = AtomicUsize::new(0);

        for county in ["Alameda", "Fresno"] {
            cache
                .get_or_compute::<(), _, _>(signature(county), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(result_with_rows(1))
                })
                .await
                .expect("compute");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_compute_is_not_cached() {
        let cache = ResultCache::new(8);
        let calls = AtomicUsize::new(0);

        let error = cache
            .get_or_compute::<String, _, _>(signature("Kern"), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("connection refused".to_string())
            })
            .await
            .expect_err("first call fails");
        assert_eq!(error, "connection refused");
        assert_eq!(cache.len().await, 0, "failure must not be stored");

        // A later call retries the computation.
        cache
            .get_or_compute::<String, _, _>(signature("Kern"), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(result_with_rows(1))
            })
            .await
            .expect("second call succeeds");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_misses_for_same_signature_coalesce() {
        let cache = ResultCache::new(8);
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    cache
                        .get_or_compute::<(), _, _>(signature("Los Angeles"), || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(25)).await;
                            Ok(result_with_rows(2))
                        })
                        .await
                        .expect("compute")
                })
            })
            .collect();

        for task in tasks {
            let value = task.await.expect("join");
            assert_eq!(value.row_count, 2);
        }

        assert_eq!(
            calls.load(Ordering::SeqCst),
            1,
            "single-flight must deduplicate concurrent misses"
        );
    }

    #[tokio::test]
    async fn least_recently_used_entry_is_evicted_at_capacity() {
        let cache = ResultCache::new(2);

        for county in ["Alameda", "Fresno"] {
            cache
                .get_or_compute::<(), _, _>(signature(county), || async {
                    Ok(result_with_rows(1))
                })
                .await
                .expect("compute");
        }

        // Touch Alameda so Fresno becomes the LRU entry.
        let touched = AtomicUsize::new(0);
        cache
            .get_or_compute::<(), _, _>(signature("Alameda"), || async {
                touched.fetch_add(1, Ordering::SeqCst);
                Ok(result_with_rows(1))
            })
            .await
            .expect("cached");
        assert_eq!(
            touched.load(Ordering::SeqCst),
            0,
            "the touch must be served from cache"
        );

        cache
            .get_or_compute::<(), _, _>(signature("Kern"), || async { Ok(result_with_rows(1)) })
            .await
            .expect("compute");

        assert_eq!(cache.len().await, 2);

        // Fresno was evicted: asking again recomputes.
        let recomputed = AtomicUsize::new(0);
        cache
            .get_or_compute::<(), _, _>(signature("Fresno"), || async {
                recomputed.fetch_add(1, Ordering::SeqCst);
                Ok(result_with_rows(1))
            })
            .await
            .expect("compute");
        assert_eq!(recomputed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn clear_empties_the_cache() {
        let cache = ResultCache::new(4);
        cache
            .get_or_compute::<(), _, _>(signature("Alameda"), || async {
                Ok(result_with_rows(1))
            })
            .await
            .expect("compute");
        assert!(!cache.is_empty().await);

        cache.clear().await;
        assert!(cache.is_empty().await);
    }
}
