//! Client-side data synchronization core for the hospital dashboards.
//!
//! # Overview
//! Every dashboard page does the same thing: list a resource, create, edit
//! or delete a row, and show the list again. This crate owns that loop. A
//! `CrudBinder` gives a page list/create/update/remove for one resource; a
//! `ResourceCache` behind it keeps the last good list per key, serves it
//! while it is fresh, merges concurrent reads into one request, and refetches
//! after any confirmed mutation.
//!
//! # Design
//! - `SyncClient` is the constructible replacement for a global query client:
//!   config, HTTP client and clock are injected, caches are registered per
//!   record type.
//! - The network sits behind the `Transport` trait; `HttpClient` builds
//!   requests and normalizes every failure into `ApiError`.
//! - Records are generic; the core reads nothing but `Record::id`.
//! - No optimistic updates: lists only ever reflect confirmed server state.

pub mod binder;
pub mod cache;
pub mod client;
pub mod clock;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod http;
pub mod lookup;
pub mod records;
pub mod selection;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use binder::{normalized_url, CrudBinder, ListView, DEFAULT_STALE_AFTER};
pub use cache::{CacheEntry, EntryState, Invalidate, ResourceCache, ResourceKey};
pub use client::HttpClient;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, ResourceConfig, SyncConfig};
pub use endpoints::Endpoint;
pub use error::ApiError;
pub use http::{HttpMethod, HttpRequest, HttpResponse, ReqwestTransport, Transport};
pub use lookup::NameLookup;
pub use records::{JsonRecord, Record, RecordId};
pub use selection::{PendingSelection, SelectionBroker, SelectionRequested};
pub use store::SyncClient;
