//! Process-wide query cache for content-library listing responses.
//!
//! The dashboards read the same listings (topic materials, chapter
//! contents, class resources) far more often than they change, so
//! responses are cached with a TTL and invalidated when an upload
//! completes. Invalidation goes through the [`Invalidate`] trait so the
//! upload runner never touches the concrete cache and tests can
//! substitute a recording fake.

use crate::api::ApiError;
use moka::future::Cache;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Listing families the backend serves and the cache groups entries by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryScope {
    /// Materials attached to a topic
    TopicMaterials,
    /// Contents of a chapter
    ChapterContents,
    /// Resource listings for a class
    ClassResources,
}

/// Cache key: a listing family plus the identifier it was fetched for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    /// Listing family
    pub scope: QueryScope,
    /// Identifier the listing was fetched for (topic, chapter or class id)
    pub id: String,
}

impl QueryKey {
    /// Creates a key for `scope` and `id`
    #[must_use]
    pub fn new(scope: QueryScope, id: impl Into<String>) -> Self {
        Self {
            scope,
            id: id.into(),
        }
    }
}

/// Marks cached listings stale so the next read re-fetches them
pub trait Invalidate: Send + Sync {
    /// Invalidates every cached entry belonging to any of `scopes`.
    /// Fire-and-forget: failures are logged, never propagated.
    fn invalidate(&self, scopes: &[QueryScope]);
}

/// Moka-backed cache of listing responses keyed by [`QueryKey`]
#[derive(Clone)]
pub struct QueryCache {
    inner: Cache<QueryKey, Arc<Value>>,
}

impl QueryCache {
    /// Creates a cache bounded by `max_capacity` entries with a
    /// `ttl_secs` time-to-live.
    #[must_use]
    pub fn new(max_capacity: u64, ttl_secs: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(Duration::from_secs(ttl_secs))
            .support_invalidation_closures()
            .build();
        Self { inner }
    }

    /// Returns the cached value for `key`, or runs `fetch` and caches the
    /// result. Concurrent readers of the same key share a single fetch.
    ///
    /// # Errors
    ///
    /// Returns the `ApiError` produced by `fetch`; failed fetches are not
    /// cached.
    pub async fn get_or_fetch<F, Fut>(&self, key: QueryKey, fetch: F) -> Result<Arc<Value>, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, ApiError>>,
    {
        self.inner
            .try_get_with(key, async move { fetch().await.map(Arc::new) })
            .await
            .map_err(|e: Arc<ApiError>| (*e).clone())
    }

    /// Returns the cached value for `key` without fetching
    pub async fn get(&self, key: &QueryKey) -> Option<Arc<Value>> {
        self.inner.get(key).await
    }

    /// Invalidates every entry whose scope is in `scopes`
    pub fn invalidate_scopes(&self, scopes: &[QueryScope]) {
        let scopes = scopes.to_vec();
        if let Err(e) = self
            .inner
            .invalidate_entries_if(move |key, _| scopes.contains(&key.scope))
        {
            warn!(error = %e, "query cache invalidation predicate rejected");
        }
    }

    /// Number of entries currently held (approximate until pending tasks run)
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    #[cfg(test)]
    async fn run_pending_tasks(&self) {
        self.inner.run_pending_tasks().await;
    }
}

impl Invalidate for QueryCache {
    fn invalidate(&self, scopes: &[QueryScope]) {
        debug!(?scopes, "invalidating cached listings");
        self.invalidate_scopes(scopes);
    }
}
