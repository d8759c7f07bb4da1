//! The process-wide entry point: one HTTP client, one cache per record type.
//!
//! # Design
//! Pages never build caches themselves. They ask a `SyncClient` for a binder
//! and get one backed by the cache registered for that record type, so two
//! pages listing doctors share a single slot and a single in-flight fetch.
//! The client is an ordinary value with an injected transport and clock;
//! nothing here is a global.
//!
//! Binders invalidate through the registry rather than their own cache, so
//! a mutation on `"doctors"` reaches every cache holding that key whatever
//! record type it was read as.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::binder::CrudBinder;
use crate::cache::{Invalidate, ResourceCache, ResourceKey};
use crate::client::HttpClient;
use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::endpoints::Endpoint;
use crate::error::ApiError;
use crate::http::{ReqwestTransport, Transport};
use crate::records::Record;

struct Registered {
    typed: Arc<dyn Any + Send + Sync>,
    erased: Arc<dyn Invalidate>,
}

#[derive(Default)]
struct Registry {
    caches: Mutex<HashMap<TypeId, Registered>>,
}

impl Invalidate for Registry {
    fn invalidate(&self, key: &ResourceKey) -> bool {
        self.caches
            .lock()
            .values()
            .fold(false, |hit, registered| registered.erased.invalidate(key) || hit)
    }
}

pub struct SyncClient {
    config: SyncConfig,
    http: HttpClient,
    clock: Arc<dyn Clock>,
    registry: Arc<Registry>,
}

impl fmt::Debug for SyncClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncClient")
            .field("config", &self.config)
            .field("http", &self.http)
            .finish_non_exhaustive()
    }
}

impl SyncClient {
    pub fn new(config: SyncConfig, transport: Arc<dyn Transport>) -> Self {
        Self::with_clock(config, transport, Arc::new(SystemClock))
    }

    pub fn with_clock(config: SyncConfig, transport: Arc<dyn Transport>, clock: Arc<dyn Clock>) -> Self {
        let http = HttpClient::new(&config.api_base_url, transport);
        Self {
            config,
            http,
            clock,
            registry: Arc::new(Registry::default()),
        }
    }

    /// Client talking to `config.api_base_url` over reqwest.
    pub fn connect(config: SyncConfig) -> Result<Self, ApiError> {
        let transport = ReqwestTransport::new(config.request_timeout())?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    /// The cache shared by every binder for record type `R`.
    pub fn cache<R: Record>(&self) -> Arc<ResourceCache<R>> {
        let type_id = TypeId::of::<R>();
        let mut caches = self.registry.caches.lock();
        if let Some(registered) = caches.get(&type_id) {
            if let Ok(cache) = Arc::clone(&registered.typed).downcast::<ResourceCache<R>>() {
                return cache;
            }
        }

        debug!(record = std::any::type_name::<R>(), "registering cache");
        let cache = Arc::new(ResourceCache::<R>::with_clock(Arc::clone(&self.clock)));
        caches.insert(
            type_id,
            Registered {
                typed: cache.clone(),
                erased: cache.clone(),
            },
        );
        cache
    }

    pub fn resource<R: Record>(&self, key: impl Into<ResourceKey>, base_url: &str) -> CrudBinder<R> {
        let key = key.into();
        let stale_after = self.config.stale_after(&key);
        CrudBinder::new(key, base_url, self.http.clone(), self.cache::<R>())
            .with_stale_after(stale_after)
            .with_invalidator(self.registry.clone())
    }

    pub fn endpoint<R: Record>(&self, endpoint: Endpoint) -> CrudBinder<R> {
        self.resource(endpoint.key(), endpoint.base_url())
    }

    /// Invalidate `key` in every cache, whatever record type it holds.
    pub fn invalidate(&self, key: &ResourceKey) -> bool {
        self.registry.invalidate(key)
    }
}
