//! CRUD operations for one resource, wired to the shared cache.
//!
//! # Design
//! A `CrudBinder` is cheap to clone and carries no state of its own beyond a
//! pending-mutation counter: the list lives in the `ResourceCache` under the
//! binder's key, so every binder built for the same key sees the same data.
//! Reads go through the cache; mutations go straight to the server and, only
//! once the server confirms, invalidate the key. Nothing is applied locally
//! ahead of the server.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{CacheEntry, EntryState, Invalidate, ResourceCache, ResourceKey};
use crate::client::HttpClient;
use crate::error::ApiError;
use crate::records::Record;

pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(30);

/// `{base}/{id}/`, whether or not `base` ends in a slash.
pub fn normalized_url(base: &str, id: impl fmt::Display) -> String {
    format!("{}/{id}/", base.trim_end_matches('/'))
}

/// What a page renders for a resource list.
#[derive(Debug, Clone)]
pub struct ListView<R> {
    pub data: Arc<Vec<R>>,
    /// Nothing cached yet and the first fetch is outstanding.
    pub is_loading: bool,
    /// Any fetch is outstanding, including background refetches.
    pub is_fetching: bool,
    /// Most recent fetch failure, if the last fetch failed.
    pub error: Option<ApiError>,
}

impl<R> ListView<R> {
    fn from_entry(entry: CacheEntry<R>) -> Self {
        Self {
            is_loading: entry.fetching && entry.fetched_at.is_none(),
            is_fetching: entry.fetching,
            error: entry.last_error,
            data: entry.data,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl<R> Default for ListView<R> {
    fn default() -> Self {
        Self {
            data: Arc::new(Vec::new()),
            is_loading: false,
            is_fetching: false,
            error: None,
        }
    }
}

struct PendingGuard(Arc<AtomicUsize>);

impl PendingGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// List/create/update/remove for one resource key and base URL.
pub struct CrudBinder<R> {
    key: ResourceKey,
    base_url: String,
    stale_after: Duration,
    client: HttpClient,
    cache: Arc<ResourceCache<R>>,
    invalidator: Arc<dyn Invalidate>,
    pending: Arc<AtomicUsize>,
}

impl<R> Clone for CrudBinder<R> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            base_url: self.base_url.clone(),
            stale_after: self.stale_after,
            client: self.client.clone(),
            cache: Arc::clone(&self.cache),
            invalidator: Arc::clone(&self.invalidator),
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<R> fmt::Debug for CrudBinder<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrudBinder")
            .field("key", &self.key)
            .field("base_url", &self.base_url)
            .field("stale_after", &self.stale_after)
            .finish_non_exhaustive()
    }
}

impl<R: Record> CrudBinder<R> {
    pub fn new(
        key: impl Into<ResourceKey>,
        base_url: &str,
        client: HttpClient,
        cache: Arc<ResourceCache<R>>,
    ) -> Self {
        Self {
            key: key.into(),
            base_url: base_url.to_string(),
            stale_after: DEFAULT_STALE_AFTER,
            client,
            invalidator: cache.clone(),
            cache,
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Route invalidations somewhere wider than this binder's own cache, so
    /// binders holding the same key under another record type refetch too.
    pub fn with_invalidator(mut self, invalidator: Arc<dyn Invalidate>) -> Self {
        self.invalidator = invalidator;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    /// Number of create/update/remove calls still waiting on the server.
    pub fn pending_mutations(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    fn fetcher(&self) -> impl FnOnce() -> BoxFuture<'static, Result<Vec<R>, ApiError>> {
        let client = self.client.clone();
        let url = self.base_url.clone();
        move || async move { client.get::<Vec<R>>(&url).await }.boxed()
    }

    /// Fresh list for this resource, fetching only if the cached one is
    /// stale or invalidated.
    ///
    /// When a refetch fails but earlier data exists, that data is returned
    /// with `error` set instead of failing the read.
    pub async fn list(&self) -> Result<ListView<R>, ApiError> {
        match self.cache.ensure_fresh(&self.key, self.stale_after, self.fetcher()).await {
            Ok(data) => Ok(ListView {
                data,
                is_loading: false,
                is_fetching: self.cache.is_fetching(&self.key),
                error: None,
            }),
            Err(err) => match self.cache.get(&self.key) {
                Some(entry) if entry.fetched_at.is_some() => {
                    warn!(key = %self.key, error = %err, "refetch failed, serving cached data");
                    let mut view = ListView::from_entry(entry);
                    view.error = Some(err);
                    Ok(view)
                }
                _ => Err(err),
            },
        }
    }

    /// Current list without waiting. Kicks off a background refetch when the
    /// cached data is missing, stale or invalidated.
    pub fn view(&self) -> ListView<R> {
        self.cache
            .refresh_in_background(&self.key, self.stale_after, self.fetcher());
        match self.cache.get(&self.key) {
            Some(entry) => ListView::from_entry(entry),
            None => ListView::default(),
        }
    }

    pub fn state(&self) -> Option<EntryState> {
        self.cache.get(&self.key).map(|entry| entry.state)
    }

    /// Fetch one record. Not cached.
    pub async fn get(&self, id: impl fmt::Display) -> Result<R, ApiError> {
        self.client.get(&normalized_url(&self.base_url, id)).await
    }

    pub async fn create<P>(&self, payload: &P) -> Result<R, ApiError>
    where
        P: Serialize + Sync + ?Sized,
    {
        let _pending = PendingGuard::new(&self.pending);
        let created: R = self.client.post(&self.base_url, payload).await?;
        debug!(key = %self.key, id = %created.id(), "created");
        self.invalidate();
        Ok(created)
    }

    pub async fn update<P>(&self, id: impl fmt::Display, data: &P) -> Result<R, ApiError>
    where
        P: Serialize + Sync + ?Sized,
    {
        let _pending = PendingGuard::new(&self.pending);
        let url = normalized_url(&self.base_url, id);
        let updated: R = self.client.put(&url, data).await?;
        debug!(key = %self.key, id = %updated.id(), "updated");
        self.invalidate();
        Ok(updated)
    }

    pub async fn remove(&self, id: impl fmt::Display) -> Result<(), ApiError> {
        let _pending = PendingGuard::new(&self.pending);
        let url = normalized_url(&self.base_url, id);
        let _: Value = self.client.delete(&url).await?;
        debug!(key = %self.key, url = %url, "removed");
        self.invalidate();
        Ok(())
    }

    /// `PATCH {base}/{id}/{action}`, for the status/result sub-resources.
    pub async fn patch_action<P>(&self, id: impl fmt::Display, action: &str, body: &P) -> Result<Value, ApiError>
    where
        P: Serialize + Sync + ?Sized,
    {
        let _pending = PendingGuard::new(&self.pending);
        let url = format!("{}{}", normalized_url(&self.base_url, id), action.trim_matches('/'));
        let response: Value = self.client.patch(&url, body).await?;
        self.invalidate();
        Ok(response)
    }

    /// Force the next read of this key to refetch.
    pub fn invalidate(&self) {
        self.invalidator.invalidate(&self.key);
    }
}
