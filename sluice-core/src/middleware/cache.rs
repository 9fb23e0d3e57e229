//! Result caching keyed by query string and bound params.
//!
//! [`ResultCache`] memoizes successful responses in a [`CacheStore`]. Entries
//! are fresh while their age is strictly below the TTL; an expired entry is
//! evicted on the lookup that finds it.
//!
//! The store's lock guards map reads and writes only. The wrapped call runs
//! outside the lock, so two callers that miss on the same key may both run it;
//! the later write wins.
//!
//! A process-wide store is available through [`global_store`], with an
//! explicit [`install_global_store`] / [`teardown_global_store`] lifecycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, trace};

use super::context::{KeyExtractor, OperationContext, cache_key_extractor};
use super::types::{BoxFuture, Middleware, MiddlewareResult, Next, QueryResponse};

/// Default time-to-live for cached responses.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Configuration for [`ResultCache`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum age of a servable entry.
    pub ttl: Duration,
    /// Whether the layer is active. A disabled cache is skipped by the chain.
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            enabled: true,
        }
    }
}

impl CacheConfig {
    /// Create a config with the given TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            ..Default::default()
        }
    }

    /// Enable or disable the layer.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// A stored response and when the call that produced it started.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached response.
    pub response: QueryResponse,
    /// Creation time.
    pub created_at: Instant,
}

impl CacheEntry {
    /// Whether the entry can still be served at `now`.
    pub fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) < ttl
    }
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that found nothing servable.
    pub misses: u64,
    /// Entries written.
    pub writes: u64,
    /// Entries removed because they expired.
    pub evictions: u64,
    /// Entries currently stored.
    pub entries: usize,
}

impl CacheStats {
    /// Fraction of lookups served from the cache.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Storage behind a [`ResultCache`].
///
/// Implementations must be safe to share between tasks. No method is async:
/// locks are taken and released inside each call.
pub trait CacheStore: Send + Sync {
    /// Return a fresh entry for `key`, evicting it first if it has expired.
    fn get_fresh(&self, key: &str, ttl: Duration) -> Option<QueryResponse>;

    /// Store `response` under `key`, replacing any previous entry.
    fn insert(&self, key: String, response: QueryResponse, created_at: Instant);

    /// Remove the entry for `key`. Returns whether one existed.
    fn remove(&self, key: &str) -> bool;

    /// Remove every entry.
    fn clear(&self);

    /// Remove every entry older than `ttl`. Returns how many were removed.
    fn purge_expired(&self, ttl: Duration) -> usize;

    /// Number of stored entries, fresh or not.
    fn len(&self) -> usize;

    /// Whether the store holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counter snapshot.
    fn stats(&self) -> CacheStats;
}

/// A shared cache store.
pub type SharedCacheStore = Arc<dyn CacheStore>;

#[derive(Default)]
struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    evictions: AtomicU64,
}

impl CacheMetrics {
    #[inline]
    fn bump(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

/// In-memory [`CacheStore`]: one map behind one mutex.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
    metrics: CacheMetrics,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store already wrapped for sharing.
    pub fn shared() -> SharedCacheStore {
        Arc::new(Self::new())
    }
}

impl CacheStore for MemoryStore {
    fn get_fresh(&self, key: &str, ttl: Duration) -> Option<QueryResponse> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_fresh(ttl, now) => {
                CacheMetrics::bump(&self.metrics.hits, 1);
                Some(entry.response.clone())
            }
            Some(_) => {
                entries.remove(key);
                CacheMetrics::bump(&self.metrics.evictions, 1);
                CacheMetrics::bump(&self.metrics.misses, 1);
                None
            }
            None => {
                CacheMetrics::bump(&self.metrics.misses, 1);
                None
            }
        }
    }

    fn insert(&self, key: String, response: QueryResponse, created_at: Instant) {
        self.entries.lock().insert(
            key,
            CacheEntry {
                response,
                created_at,
            },
        );
        CacheMetrics::bump(&self.metrics.writes, 1);
    }

    fn remove(&self, key: &str) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    fn clear(&self) {
        self.entries.lock().clear();
    }

    fn purge_expired(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(ttl, now));
        let removed = before - entries.len();
        CacheMetrics::bump(&self.metrics.evictions, removed as u64);
        removed
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.metrics.hits.load(Ordering::Relaxed),
            misses: self.metrics.misses.load(Ordering::Relaxed),
            writes: self.metrics.writes.load(Ordering::Relaxed),
            evictions: self.metrics.evictions.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

// ============== Process-wide store ==============

static GLOBAL_STORE: RwLock<Option<SharedCacheStore>> = parking_lot::const_rwlock(None);

/// Install `store` as the process-wide cache store, returning the previous one.
pub fn install_global_store(store: SharedCacheStore) -> Option<SharedCacheStore> {
    GLOBAL_STORE.write().replace(store)
}

/// The process-wide cache store, installing a [`MemoryStore`] on first use.
pub fn global_store() -> SharedCacheStore {
    if let Some(store) = GLOBAL_STORE.read().as_ref() {
        return Arc::clone(store);
    }
    let mut slot = GLOBAL_STORE.write();
    Arc::clone(slot.get_or_insert_with(MemoryStore::shared))
}

/// Remove the process-wide cache store.
///
/// Caches built with [`ResultCache::global`] before teardown keep the store
/// they captured; the next [`global_store`] call installs a fresh one.
pub fn teardown_global_store() -> Option<SharedCacheStore> {
    GLOBAL_STORE.write().take()
}

// ============== Middleware ==============

/// Middleware that serves repeated queries from a [`CacheStore`].
///
/// The key is [`OperationContext::cache_key`] unless replaced with
/// [`ResultCache::with_key_extractor`]. Calls with no extractable key bypass
/// the cache. Only successful responses are stored, stamped with the time
/// the call started. Responses served from the cache have [`QueryResponse::from_cache`] set and share their rows with
/// the stored entry.
///
/// # Example
///
/// ```rust
/// use sluice_core::middleware::{CacheConfig, MemoryStore, ResultCache};
/// use std::time::Duration;
///
/// let cache = ResultCache::new(
///     MemoryStore::shared(),
///     CacheConfig::with_ttl(Duration::from_secs(60)),
/// );
/// assert_eq!(cache.config().ttl, Duration::from_secs(60));
/// ```
pub struct ResultCache {
    store: SharedCacheStore,
    config: CacheConfig,
    key_extractor: KeyExtractor,
}

impl ResultCache {
    /// Create a cache over an injected store.
    pub fn new(store: SharedCacheStore, config: CacheConfig) -> Self {
        Self {
            store,
            config,
            key_extractor: cache_key_extractor(),
        }
    }

    /// Create a cache over the process-wide store.
    pub fn global(config: CacheConfig) -> Self {
        Self::new(global_store(), config)
    }

    /// Replace the key extraction rule.
    pub fn with_key_extractor(mut self, extractor: KeyExtractor) -> Self {
        self.key_extractor = extractor;
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The underlying store.
    pub fn store(&self) -> &SharedCacheStore {
        &self.store
    }

    /// The key this cache would use for `ctx`, if any.
    pub fn key_for(&self, ctx: &OperationContext) -> Option<String> {
        (self.key_extractor)(ctx)
    }

    /// Drop the entry for `key`.
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.store.remove(key);
        if removed {
            debug!(target: "sluice::cache", key, "invalidated");
        }
        removed
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.store.clear();
        debug!(target: "sluice::cache", "cleared");
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) -> usize {
        self.store.purge_expired(self.config.ttl)
    }

    /// Counter snapshot.
    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }
}

impl Middleware for ResultCache {
    fn handle<'a>(
        &'a self,
        ctx: OperationContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult<QueryResponse>> {
        Box::pin(async move {
            let Some(key) = (self.key_extractor)(&ctx) else {
                trace!(
                    target: "sluice::cache",
                    operation = ctx.operation_name(),
                    "no cache key, bypassing"
                );
                return next.run(ctx).await;
            };

            if let Some(hit) = self.store.get_fresh(&key, self.config.ttl) {
                debug!(target: "sluice::cache", key = %key, "hit");
                return Ok(hit.from_cache());
            }

            debug!(target: "sluice::cache", key = %key, "miss");
            let created_at = Instant::now();
            let response = next.run(ctx).await?;
            self.store.insert(key, response.clone(), created_at);
            Ok(response)
        })
    }

    fn name(&self) -> &'static str {
        "ResultCache"
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SluiceError;
    use crate::middleware::{MiddlewareStack, Operation, operation_fn};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;

    const QUERY: &str = "SELECT * FROM users WHERE age > 25";

    fn counting(calls: Arc<AtomicU32>) -> impl Operation {
        operation_fn("fetch", move |_ctx| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok(QueryResponse::from_rows(vec![json!({ "invocation": n })])) }
        })
    }

    fn cached(ttl: Duration) -> (MiddlewareStack, SharedCacheStore) {
        let store = MemoryStore::shared();
        let stack = MiddlewareStack::new().with(ResultCache::new(
            Arc::clone(&store),
            CacheConfig::with_ttl(ttl),
        ));
        (stack, store)
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_boundary() {
        let calls = Arc::new(AtomicU32::new(0));
        let op = counting(calls.clone());
        let ttl = Duration::from_secs(300);
        let (stack, _store) = cached(ttl);

        let first = stack.execute(OperationContext::for_query(QUERY), &op).await.unwrap();
        assert!(!first.from_cache);

        tokio::time::advance(ttl - Duration::from_millis(1)).await;
        let second = stack.execute(OperationContext::for_query(QUERY), &op).await.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.rows, first.rows);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_millis(2)).await;
        let third = stack.execute(OperationContext::for_query(QUERY), &op).await.unwrap();
        assert!(!third.from_cache);
        assert_eq!(third.first(), Some(&json!({"invocation": 2})));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // The refreshed entry is served again.
        let fourth = stack.execute(OperationContext::for_query(QUERY), &op).await.unwrap();
        assert_eq!(fourth.rows, third.rows);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_hit_shares_rows() {
        let calls = Arc::new(AtomicU32::new(0));
        let op = counting(calls);
        let (stack, _store) = cached(DEFAULT_TTL);

        let first = stack.execute(OperationContext::for_query(QUERY), &op).await.unwrap();
        let second = stack.execute(OperationContext::for_query(QUERY), &op).await.unwrap();

        assert!(Arc::ptr_eq(&first.rows, &second.rows));
    }

    #[tokio::test]
    async fn test_no_key_bypasses_cache() {
        let calls = Arc::new(AtomicU32::new(0));
        let op = counting(calls.clone());
        let (stack, store) = cached(DEFAULT_TTL);

        for _ in 0..3 {
            stack
                .execute(OperationContext::new().arg_value(25), &op)
                .await
                .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(store.is_empty());
        assert_eq!(store.stats().misses, 0);
    }

    #[tokio::test]
    async fn test_bound_params_are_part_of_key() {
        let op = operation_fn("echo_params", |ctx| async move {
            Ok(QueryResponse::from_rows(vec![json!({ "params": ctx.params() })]))
        });
        let (stack, store) = cached(DEFAULT_TTL);
        let sql = "SELECT name FROM users WHERE age > ?";

        let young = stack
            .execute(OperationContext::for_query(sql).bind(25), &op)
            .await
            .unwrap();
        let old = stack
            .execute(OperationContext::for_query(sql).bind(40), &op)
            .await
            .unwrap();
        let young_again = stack
            .execute(OperationContext::for_query(sql).bind(25), &op)
            .await
            .unwrap();

        assert!(!old.from_cache);
        assert_eq!(old.first(), Some(&json!({ "params": [40] })));
        assert!(young_again.from_cache);
        assert_eq!(young_again.rows, young.rows);
        assert_eq!(store.len(), 2);
        assert_eq!(store.stats().misses, 2);
        assert_eq!(store.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_key_for_matches_stored_entry() {
        let op = counting(Arc::new(AtomicU32::new(0)));
        let store = MemoryStore::shared();
        let cache = ResultCache::new(Arc::clone(&store), CacheConfig::default());
        let ctx = OperationContext::for_query("SELECT * FROM users WHERE id = ?").bind(7);
        let key = cache.key_for(&ctx).unwrap();

        MiddlewareStack::new().with(cache).execute(ctx, &op).await.unwrap();

        assert_eq!(key, "SELECT * FROM users WHERE id = ? [7]");
        assert!(store.get_fresh(&key, DEFAULT_TTL).is_some());
    }

    #[tokio::test]
    async fn test_positional_text_is_key() {
        let calls = Arc::new(AtomicU32::new(0));
        let op = counting(calls.clone());
        let (stack, store) = cached(DEFAULT_TTL);

        for _ in 0..2 {
            let ctx = OperationContext::new().arg_value(1).arg_text(QUERY);
            stack.execute(ctx, &op).await.unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(store.get_fresh(QUERY, DEFAULT_TTL).is_some());
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let failing = operation_fn("failing", move |_ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Err::<QueryResponse, _>(SluiceError::database("no such table: users")) }
        });
        let (stack, store) = cached(DEFAULT_TTL);

        for _ in 0..2 {
            let err = stack
                .execute(OperationContext::for_query(QUERY), &failing)
                .await
                .unwrap_err();
            assert_eq!(err.message, "no such table: users");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_custom_key_extractor() {
        let calls = Arc::new(AtomicU32::new(0));
        let op = counting(calls.clone());
        let cache = ResultCache::new(MemoryStore::shared(), CacheConfig::default())
            .with_key_extractor(Arc::new(|ctx: &OperationContext| {
                ctx.operation().map(str::to_owned)
            }));
        let stack = MiddlewareStack::new().with(cache);

        stack
            .execute(OperationContext::new().with_operation("all_users"), &op)
            .await
            .unwrap();
        stack
            .execute(OperationContext::new().with_operation("all_users"), &op)
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disabled_cache_is_skipped() {
        let calls = Arc::new(AtomicU32::new(0));
        let op = counting(calls.clone());
        let stack = MiddlewareStack::new().with(ResultCache::new(
            MemoryStore::shared(),
            CacheConfig::default().enabled(false),
        ));

        stack.execute(OperationContext::for_query(QUERY), &op).await.unwrap();
        stack.execute(OperationContext::for_query(QUERY), &op).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_last_write_wins() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let op = Arc::new(operation_fn("slow_fetch", move |_ctx| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                tokio::task::yield_now().await;
                Ok(QueryResponse::from_rows(vec![json!({ "invocation": n })]))
            }
        }));
        let (stack, store) = cached(DEFAULT_TTL);
        let stack = Arc::new(stack);

        let mut tasks = Vec::new();
        for _ in 0..50 {
            let stack = Arc::clone(&stack);
            let op = Arc::clone(&op);
            tasks.push(tokio::spawn(async move {
                stack
                    .execute(OperationContext::for_query(QUERY), op.as_ref())
                    .await
            }));
        }

        let mut returned = Vec::new();
        for task in tasks {
            returned.push(task.await.unwrap().unwrap());
        }

        let invocations = calls.load(Ordering::SeqCst);
        assert!((1..=50).contains(&invocations));
        assert_eq!(store.len(), 1);

        let stored = store.get_fresh(QUERY, DEFAULT_TTL).unwrap();
        assert!(returned.iter().any(|r| r.rows == stored.rows));
    }

    #[tokio::test(start_paused = true)]
    async fn test_maintenance_operations() {
        let store = MemoryStore::shared();
        let cache = ResultCache::new(Arc::clone(&store), CacheConfig::with_ttl(Duration::from_secs(10)));

        store.insert("a".into(), QueryResponse::empty(), Instant::now());
        tokio::time::advance(Duration::from_secs(11)).await;
        store.insert("b".into(), QueryResponse::empty(), Instant::now());
        store.insert("c".into(), QueryResponse::empty(), Instant::now());

        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.invalidate("b"));
        assert!(!cache.invalidate("b"));
        assert_eq!(store.len(), 1);

        cache.clear();
        assert!(store.is_empty());

        let stats = cache.stats();
        assert_eq!(stats.writes, 3);
        assert_eq!(stats.evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_lookup_evicts() {
        let store = MemoryStore::new();
        store.insert("k".into(), QueryResponse::empty(), Instant::now());
        tokio::time::advance(Duration::from_secs(5)).await;

        assert!(store.get_fresh("k", Duration::from_secs(5)).is_none());
        assert!(store.is_empty());

        let stats = store.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_global_store_lifecycle() {
        teardown_global_store();

        let first = global_store();
        assert!(Arc::ptr_eq(&first, &global_store()));

        let custom = MemoryStore::shared();
        let previous = install_global_store(Arc::clone(&custom));
        assert!(previous.is_some_and(|p| Arc::ptr_eq(&p, &first)));
        assert!(Arc::ptr_eq(&ResultCache::global(CacheConfig::default()).store, &custom));

        let removed = teardown_global_store();
        assert!(removed.is_some_and(|r| Arc::ptr_eq(&r, &custom)));
        assert!(!Arc::ptr_eq(&global_store(), &custom));
        teardown_global_store();
    }
}
