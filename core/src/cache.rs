//! Keyed, time-aware store of the most recent successful fetch per resource.
//!
//! # Design
//! Each key owns one slot. A slot holds the last good data wholesale (an
//! `Arc<Vec<R>>` that is swapped, never mutated), when it was fetched, and at
//! most one in-flight fetch. The in-flight fetch is a `Shared` future, so
//! every caller that arrives while it is running awaits the same network
//! call and receives the same `Arc`.
//!
//! Invalidation bumps a per-slot counter instead of dropping data. A fetch
//! records the counter when it starts; when it lands, the slot is fresh only
//! if nobody invalidated in between. Readers therefore keep seeing the last
//! good data while a refetch runs, and an invalidation that races a fetch is
//! never lost.
//!
//! A fetch settles itself: the shared future writes its result into the slot
//! before handing it to waiters, and a spawned task keeps polling it, so a
//! reader that gives up does not strand the slot in `fetching`.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::ApiError;

type FetchResult<R> = Result<Arc<Vec<R>>, ApiError>;
type SharedFetch<R> = Shared<BoxFuture<'static, FetchResult<R>>>;

/// Names one cached collection, e.g. `"patients"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey(Arc<str>);

impl ResourceKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourceKey {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

impl From<String> for ResourceKey {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Idle,
    /// First fetch outstanding, nothing cached yet.
    Loading,
    /// The first fetch failed; `data` is empty.
    Error,
}

/// Point-in-time copy of a slot.
#[derive(Debug, Clone)]
pub struct CacheEntry<R> {
    pub key: ResourceKey,
    pub data: Arc<Vec<R>>,
    pub fetched_at: Option<Instant>,
    pub state: EntryState,
    /// Invalidated, or never fetched successfully.
    pub stale: bool,
    /// A fetch for this key is running.
    pub fetching: bool,
    /// Outcome of the most recent failed fetch, cleared by the next success.
    pub last_error: Option<ApiError>,
}

struct InFlight<R> {
    id: u64,
    invalidations_at_start: u64,
    fetch: SharedFetch<R>,
    /// A task on the runtime owns a clone and polls it to completion.
    driven: bool,
}

struct Slot<R> {
    data: Arc<Vec<R>>,
    fetched_at: Option<Instant>,
    state: EntryState,
    invalidations: u64,
    fresh_as_of: u64,
    last_error: Option<ApiError>,
    in_flight: Option<InFlight<R>>,
    fetches: u64,
}

impl<R> Slot<R> {
    fn new() -> Self {
        Self {
            data: Arc::new(Vec::new()),
            fetched_at: None,
            state: EntryState::Idle,
            invalidations: 0,
            fresh_as_of: 0,
            last_error: None,
            in_flight: None,
            fetches: 0,
        }
    }

    fn is_stale(&self) -> bool {
        self.fetched_at.is_none() || self.invalidations != self.fresh_as_of
    }

    fn fresh_data(&self, now: Instant, stale_after: Duration) -> Option<Arc<Vec<R>>> {
        let fetched_at = self.fetched_at?;
        if self.is_stale() || now.saturating_duration_since(fetched_at) >= stale_after {
            return None;
        }
        Some(Arc::clone(&self.data))
    }

    fn entry(&self, key: &ResourceKey) -> CacheEntry<R> {
        CacheEntry {
            key: key.clone(),
            data: Arc::clone(&self.data),
            fetched_at: self.fetched_at,
            state: self.state,
            stale: self.is_stale(),
            fetching: self.in_flight.is_some(),
            last_error: self.last_error.clone(),
        }
    }
}

type Slots<R> = Mutex<HashMap<ResourceKey, Slot<R>>>;

enum Lookup<R> {
    Fresh(Arc<Vec<R>>),
    Pending(SharedFetch<R>),
}

/// Marks a key stale in whatever cache holds it.
pub trait Invalidate: Send + Sync {
    /// Returns false if the key has never been read.
    fn invalidate(&self, key: &ResourceKey) -> bool;
}

/// Process-wide cache for one record type.
pub struct ResourceCache<R> {
    slots: Arc<Slots<R>>,
    clock: Arc<dyn Clock>,
}

impl<R> fmt::Debug for ResourceCache<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceCache")
            .field("keys", &self.slots.lock().len())
            .finish_non_exhaustive()
    }
}

impl<R> Default for ResourceCache<R>
where
    R: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<R> ResourceCache<R>
where
    R: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    pub fn get(&self, key: &ResourceKey) -> Option<CacheEntry<R>> {
        self.slots.lock().get(key).map(|slot| slot.entry(key))
    }

    pub fn keys(&self) -> Vec<ResourceKey> {
        let mut keys: Vec<_> = self.slots.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn is_fetching(&self, key: &ResourceKey) -> bool {
        self.slots
            .lock()
            .get(key)
            .is_some_and(|slot| slot.in_flight.is_some())
    }

    /// Return cached data if it is younger than `stale_after` and has not been
    /// invalidated; otherwise run `fetcher`, joining a fetch already in flight
    /// for `key` rather than starting a second one.
    ///
    /// A failed fetch leaves previous data in place and is returned to every
    /// caller that joined it. Dropping the returned future does not cancel
    /// the fetch: on a tokio runtime it runs to completion and lands in the
    /// cache regardless.
    pub async fn ensure_fresh<F, Fut>(
        &self,
        key: &ResourceKey,
        stale_after: Duration,
        fetcher: F,
    ) -> Result<Arc<Vec<R>>, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<R>, ApiError>> + Send + 'static,
    {
        match self.join_or_start(key, stale_after, fetcher) {
            Lookup::Fresh(data) => Ok(data),
            Lookup::Pending(fetch) => fetch.await,
        }
    }

    /// Like `ensure_fresh`, but never waits. A needed fetch runs on the
    /// current tokio runtime; its failure is logged and recorded on the entry.
    ///
    /// Returns whether a fetch is now running for `key`.
    pub fn refresh_in_background<F, Fut>(&self, key: &ResourceKey, stale_after: Duration, fetcher: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<R>, ApiError>> + Send + 'static,
    {
        match self.join_or_start(key, stale_after, fetcher) {
            Lookup::Fresh(_) => false,
            Lookup::Pending(_) => {
                if tokio::runtime::Handle::try_current().is_err() {
                    // The fetch stays parked in the slot; the next awaited read drives it.
                    warn!(key = %key, "no tokio runtime, background refetch deferred");
                }
                true
            }
        }
    }

    /// Mark `key` stale without dropping its data. Returns false if the key
    /// has never been read.
    pub fn invalidate(&self, key: &ResourceKey) -> bool {
        let mut slots = self.slots.lock();
        match slots.get_mut(key) {
            Some(slot) => {
                slot.invalidations += 1;
                debug!(key = %key, "invalidated");
                true
            }
            None => false,
        }
    }

    fn join_or_start<F, Fut>(&self, key: &ResourceKey, stale_after: Duration, fetcher: F) -> Lookup<R>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<R>, ApiError>> + Send + 'static,
    {
        let now = self.clock.now();
        let mut slots = self.slots.lock();
        let slot = slots.entry(key.clone()).or_insert_with(Slot::new);

        if let Some(data) = slot.fresh_data(now, stale_after) {
            debug!(key = %key, "cache hit");
            return Lookup::Fresh(data);
        }

        // A fetch that began before the latest invalidation may carry a
        // snapshot from before the mutation; it is superseded, not joined.
        let invalidations = slot.invalidations;
        if let Some(in_flight) = slot
            .in_flight
            .as_mut()
            .filter(|in_flight| in_flight.invalidations_at_start == invalidations)
        {
            debug!(key = %key, fetch = in_flight.id, "joining in-flight fetch");
            if !in_flight.driven {
                in_flight.driven = drive(&in_flight.fetch);
            }
            return Lookup::Pending(in_flight.fetch.clone());
        }
        if let Some(superseded) = &slot.in_flight {
            debug!(key = %key, fetch = superseded.id, "superseding fetch started before invalidation");
        }

        slot.fetches += 1;
        let id = slot.fetches;
        let request = fetcher();
        let fetch = {
            let slots = Arc::clone(&self.slots);
            let clock = Arc::clone(&self.clock);
            let key = key.clone();
            async move {
                let result = request.await.map(Arc::new);
                settle(&slots, clock.now(), &key, id, &result);
                result
            }
            .boxed()
            .shared()
        };
        let driven = drive(&fetch);
        slot.in_flight = Some(InFlight {
            id,
            invalidations_at_start: invalidations,
            fetch: fetch.clone(),
            driven,
        });
        if slot.fetched_at.is_none() {
            slot.state = EntryState::Loading;
        }
        debug!(key = %key, fetch = id, "starting fetch");

        Lookup::Pending(fetch)
    }
}

impl<R> Invalidate for ResourceCache<R>
where
    R: Clone + Send + Sync + 'static,
{
    fn invalidate(&self, key: &ResourceKey) -> bool {
        ResourceCache::invalidate(self, key)
    }
}

/// Hand a clone of `fetch` to the current runtime so it completes even if
/// every reader drops its future. False when there is no runtime.
fn drive<R>(fetch: &SharedFetch<R>) -> bool
where
    R: Send + Sync + 'static,
{
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        return false;
    };
    handle.spawn(fetch.clone().map(drop));
    true
}

/// Record the outcome of fetch `id`. A superseded fetch finds another id in
/// the slot and writes nothing.
fn settle<R>(slots: &Slots<R>, now: Instant, key: &ResourceKey, id: u64, result: &FetchResult<R>) {
    let mut slots = slots.lock();
    let Some(slot) = slots.get_mut(key) else {
        return;
    };
    if slot.in_flight.as_ref().map(|f| f.id) != Some(id) {
        debug!(key = %key, fetch = id, "discarding superseded fetch");
        return;
    }
    let Some(in_flight) = slot.in_flight.take() else {
        return;
    };

    match result {
        Ok(data) => {
            slot.data = Arc::clone(data);
            slot.fetched_at = Some(now);
            slot.state = EntryState::Idle;
            slot.fresh_as_of = in_flight.invalidations_at_start;
            slot.last_error = None;
            debug!(key = %key, fetch = id, rows = data.len(), "fetch stored");
        }
        Err(err) => {
            if slot.fetched_at.is_none() {
                slot.state = EntryState::Error;
            }
            slot.last_error = Some(err.clone());
            warn!(key = %key, fetch = id, error = %err, "fetch failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const WINDOW: Duration = Duration::from_secs(30);

    fn setup() -> (Arc<ResourceCache<u32>>, ManualClock, Arc<AtomicUsize>) {
        let clock = ManualClock::new();
        let cache = Arc::new(ResourceCache::with_clock(Arc::new(clock.clone())));
        (cache, clock, Arc::new(AtomicUsize::new(0)))
    }

    fn counting(
        calls: &Arc<AtomicUsize>,
        rows: Vec<u32>,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<Vec<u32>, ApiError>> {
        let calls = Arc::clone(calls);
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                for _ in 0..3 {
                    tokio::task::yield_now().await;
                }
                Ok(rows)
            }
            .boxed()
        }
    }

    fn failing(calls: &Arc<AtomicUsize>) -> impl FnOnce() -> BoxFuture<'static, Result<Vec<u32>, ApiError>> {
        let calls = Arc::clone(calls);
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::from_response(500, r#"{"message":"db down"}"#))
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn concurrent_reads_share_one_fetch() {
        let (cache, _clock, calls) = setup();
        let key = ResourceKey::from("doctors");

        let reads = (0..5).map(|_| cache.ensure_fresh(&key, WINDOW, counting(&calls, vec![1, 2])));
        let results = futures::future::join_all(reads).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let first = results[0].as_ref().unwrap();
        for result in &results {
            assert!(Arc::ptr_eq(first, result.as_ref().unwrap()));
        }
        assert_eq!(**first, vec![1, 2]);
    }

    #[tokio::test]
    async fn fresh_data_is_served_without_fetching() {
        let (cache, clock, calls) = setup();
        let key = ResourceKey::from("patients");

        cache.ensure_fresh(&key, WINDOW, counting(&calls, vec![1])).await.unwrap();
        clock.advance(Duration::from_secs(29));
        let again = cache.ensure_fresh(&key, WINDOW, counting(&calls, vec![9])).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*again, vec![1]);
    }

    #[tokio::test]
    async fn expired_data_is_refetched() {
        let (cache, clock, calls) = setup();
        let key = ResourceKey::from("patients");

        cache.ensure_fresh(&key, WINDOW, counting(&calls, vec![1])).await.unwrap();
        clock.advance(WINDOW);
        let again = cache.ensure_fresh(&key, WINDOW, counting(&calls, vec![1, 2])).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(*again, vec![1, 2]);
    }

    #[tokio::test]
    async fn invalidation_bypasses_window_and_keeps_data() {
        let (cache, _clock, calls) = setup();
        let key = ResourceKey::from("billing");

        cache.ensure_fresh(&key, WINDOW, counting(&calls, vec![1])).await.unwrap();
        assert!(cache.invalidate(&key));

        let entry = cache.get(&key).unwrap();
        assert!(entry.stale);
        assert_eq!(*entry.data, vec![1]);

        let again = cache.ensure_fresh(&key, WINDOW, counting(&calls, vec![1, 2])).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(*again, vec![1, 2]);
        assert!(!cache.get(&key).unwrap().stale);
    }

    #[tokio::test]
    async fn invalidating_unknown_key_is_a_no_op() {
        let (cache, _clock, _calls) = setup();
        assert!(!cache.invalidate(&ResourceKey::from("nothing")));
        assert!(cache.keys().is_empty());
    }

    #[tokio::test]
    async fn first_failure_sets_error_state() {
        let (cache, _clock, calls) = setup();
        let key = ResourceKey::from("lab");

        let err = cache.ensure_fresh(&key, WINDOW, failing(&calls)).await.unwrap_err();
        assert_eq!(err.message, "db down");

        let entry = cache.get(&key).unwrap();
        assert_eq!(entry.state, EntryState::Error);
        assert!(entry.data.is_empty());
        assert_eq!(entry.last_error, Some(err));
    }

    #[tokio::test]
    async fn errors_are_not_sticky() {
        let (cache, _clock, calls) = setup();
        let key = ResourceKey::from("lab");

        cache.ensure_fresh(&key, WINDOW, failing(&calls)).await.unwrap_err();
        let data = cache.ensure_fresh(&key, WINDOW, counting(&calls, vec![3])).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(*data, vec![3]);
        let entry = cache.get(&key).unwrap();
        assert_eq!(entry.state, EntryState::Idle);
        assert!(entry.last_error.is_none());
    }

    #[tokio::test]
    async fn failed_refetch_keeps_previous_data() {
        let (cache, _clock, calls) = setup();
        let key = ResourceKey::from("records");

        let before = cache.ensure_fresh(&key, WINDOW, counting(&calls, vec![1, 2])).await.unwrap();
        cache.invalidate(&key);
        cache.ensure_fresh(&key, WINDOW, failing(&calls)).await.unwrap_err();

        let entry = cache.get(&key).unwrap();
        assert_eq!(entry.state, EntryState::Idle);
        assert!(Arc::ptr_eq(&entry.data, &before));
        assert!(entry.stale);
    }

    #[tokio::test]
    async fn invalidation_during_fetch_keeps_key_stale() {
        let (cache, _clock, calls) = setup();
        let key = ResourceKey::from("appointments");
        let gate = Arc::new(tokio::sync::Notify::new());

        let fetch = {
            let gate = Arc::clone(&gate);
            let calls = Arc::clone(&calls);
            cache.ensure_fresh(&key, WINDOW, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                gate.notified().await;
                Ok(vec![1])
            })
        };
        let invalidate = async {
            tokio::task::yield_now().await;
            assert!(cache.is_fetching(&key));
            cache.invalidate(&key);
            gate.notify_one();
        };
        let (result, ()) = tokio::join!(fetch, invalidate);
        assert_eq!(*result.unwrap(), vec![1]);
        assert!(cache.get(&key).unwrap().stale);

        cache.ensure_fresh(&key, WINDOW, counting(&calls, vec![1, 2])).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn background_refresh_runs_on_runtime() {
        let (cache, _clock, calls) = setup();
        let key = ResourceKey::from("sales");

        assert!(cache.refresh_in_background(&key, WINDOW, counting(&calls, vec![4])));
        assert_eq!(cache.get(&key).unwrap().state, EntryState::Loading);

        while cache.is_fetching(&key) {
            tokio::task::yield_now().await;
        }
        let entry = cache.get(&key).unwrap();
        assert_eq!(*entry.data, vec![4]);
        assert_eq!(entry.state, EntryState::Idle);
        assert!(!cache.refresh_in_background(&key, WINDOW, counting(&calls, vec![5])));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    fn gated(
        calls: &Arc<AtomicUsize>,
        gate: &Arc<tokio::sync::Notify>,
        rows: Vec<u32>,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<Vec<u32>, ApiError>> {
        let calls = Arc::clone(calls);
        let gate = Arc::clone(gate);
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                gate.notified().await;
                Ok(rows)
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn dropped_reader_does_not_cancel_fetch() {
        let (cache, _clock, calls) = setup();
        let key = ResourceKey::from("doctors");
        let gate = Arc::new(tokio::sync::Notify::new());

        // Poll once so the fetch starts, then walk away.
        let read = cache.ensure_fresh(&key, WINDOW, gated(&calls, &gate, vec![7]));
        assert!(read.now_or_never().is_none());
        assert!(cache.is_fetching(&key));

        gate.notify_one();
        while cache.is_fetching(&key) {
            tokio::task::yield_now().await;
        }

        let entry = cache.get(&key).unwrap();
        assert_eq!(*entry.data, vec![7]);
        assert_eq!(entry.state, EntryState::Idle);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn read_after_invalidation_starts_a_new_fetch() {
        let (cache, _clock, calls) = setup();
        let key = ResourceKey::from("doctors");
        let gate = Arc::new(tokio::sync::Notify::new());

        cache.ensure_fresh(&key, WINDOW, counting(&calls, vec![1])).await.unwrap();
        cache.invalidate(&key);
        assert!(cache.refresh_in_background(&key, WINDOW, gated(&calls, &gate, vec![1])));

        // A mutation lands while that refetch is still out.
        cache.invalidate(&key);
        let fresh = cache.ensure_fresh(&key, WINDOW, counting(&calls, vec![1, 2])).await.unwrap();
        assert_eq!(*fresh, vec![1, 2]);
        assert!(!cache.get(&key).unwrap().stale);

        // The older refetch finishing late does not overwrite newer data.
        gate.notify_one();
        while calls.load(Ordering::SeqCst) < 3 {
            tokio::task::yield_now().await;
        }
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        let entry = cache.get(&key).unwrap();
        assert_eq!(*entry.data, vec![1, 2]);
        assert!(!entry.stale);
        assert!(!entry.fetching);
    }
}
