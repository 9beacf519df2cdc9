#![forbid(unsafe_code, future_incompatible)]
#![deny(
    missing_docs,
    missing_debug_implementations,
    nonstandard_style,
    unused_qualifications,
    unused_import_braces,
    unused_extern_crates,
    trivial_casts,
    trivial_numeric_casts
)]
#![cfg_attr(docsrs, feature(doc_cfg))]
//! A client-side HTTP caching execution engine that follows the caching
//! semantics of RFC 7234, with the `stale-while-revalidate` and
//! `stale-if-error` extensions of RFC 5861.
//!
//! The engine interposes between an HTTP client and its transport: every
//! request flows through [`CachingEngine::execute`], which may satisfy it
//! from stored state, revalidate a stored entry against the origin, or
//! pass through to the origin and store the result. The two external
//! collaborators are deliberately small traits:
//!
//! - [`Transport`] — one `proceed(request) -> response` call.
//! - [`Storage`] — keyed entry storage with compare-and-swap updates.
//!   An in-memory [`MemoryStorage`] backend ships with the crate.
//!
//! What the engine handles for you:
//!
//! - Freshness arithmetic and suitability decisions per RFC 7234
//! - Conditional revalidation (ETag / Last-Modified), including
//!   `Vary`-negotiated variants
//! - Automatic invalidation for unsafe methods (PUT, POST, DELETE, …)
//!   and for `Location`-referenced entries
//! - Collapsing of concurrent identical misses behind one origin fetch
//! - Serving stale entries while revalidating in the background
//!   (`stale-while-revalidate`) or when the origin errors out
//!   (`stale-if-error`)
//!
//! ## Basic usage
//!
//! ```
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use http::{Request, Response};
//! use http_cache_core::{
//!     CacheConfig, CachingEngine, MemoryStorage, Result, Transport,
//! };
//!
//! struct Origin;
//!
//! #[async_trait::async_trait]
//! impl Transport for Origin {
//!     async fn proceed(
//!         &self,
//!         _request: Request<Bytes>,
//!     ) -> Result<Response<Bytes>> {
//!         Ok(Response::builder()
//!             .status(200)
//!             .header("cache-control", "max-age=60")
//!             .body(Bytes::from_static(b"hello"))?)
//!     }
//! }
//!
//! let engine = CachingEngine::new(
//!     CacheConfig::default(),
//!     Arc::new(MemoryStorage::new()),
//!     Arc::new(Origin),
//! );
//! # drop(engine);
//! ```
//!
//! ## Configuration
//!
//! [`CacheConfig`] controls the shared/private perspective, heuristic
//! freshness, object size limits, stale-serving windows and the background
//! revalidation pool:
//!
//! ```
//! use std::time::Duration;
//! use http_cache_core::CacheConfig;
//!
//! let config = CacheConfig {
//!     heuristic_caching_enabled: true,
//!     heuristic_default_lifetime: Duration::from_secs(300),
//!     stale_if_error_default: Some(Duration::from_secs(60)),
//!     ..Default::default()
//! };
//! # drop(config);
//! ```

mod cache_control;
mod cacheability;
mod collapse;
mod conditional;
mod engine;
mod entry;
mod error;
mod freshness;
mod key;
mod revalidate;
mod serialize;
mod storage;
mod store;
mod suitability;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub use cache_control::{RequestCacheControl, ResponseCacheControl};
pub use cacheability::CacheabilityPolicy;
pub use collapse::{Flight, FlightToken, FlightWaiter, RequestCollapser};
pub use conditional::{
    conditional_request, unconditional_request, variant_conditional_request,
};
pub use engine::{CacheExchange, CachingEngine, Transport};
pub use entry::{CacheEntry, Hit, Resource};
pub use error::{BoxError, CacheError, Result};
pub use freshness::{
    apparent_age, corrected_age_value, corrected_initial_age, current_age,
    resident_time, response_delay, ValidityPolicy, MAX_AGE,
};
pub use key::{root_key, variant_discriminator, variant_key};
pub use revalidate::BackgroundRevalidator;
pub use serialize::{
    deserialize_entry, serialize_entry, FORMAT_MAGIC, FORMAT_VERSION,
};
pub use storage::{CasToken, MemoryStorage, Snapshot, Storage};
pub use store::CacheStore;
pub use suitability::{Suitability, SuitabilityChecker};

// Custom headers used to indicate cache status (hit or miss)
/// `x-cache` header: HIT if the response was served from cache, MISS if not
pub const XCACHE: &str = "x-cache";
/// `x-cache-lookup` header: HIT if a response existed in cache, MISS if not
pub const XCACHELOOKUP: &str = "x-cache-lookup";

/// Represents a basic cache status
/// Used in the custom headers `x-cache` and `x-cache-lookup`
#[derive(Debug, Copy, Clone)]
pub enum HitOrMiss {
    /// Yes, there was a hit
    HIT,
    /// No, there was no hit
    MISS,
}

impl fmt::Display for HitOrMiss {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::HIT => write!(f, "HIT"),
            Self::MISS => write!(f, "MISS"),
        }
    }
}

/// How the cache participated in an exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheResponseStatus {
    /// Served from cache without contacting the origin
    CacheHit,
    /// The origin produced the response
    CacheMiss,
    /// A stored entry was revalidated and reused
    Validated,
    /// The cache synthesized the response itself (e.g. `504` for
    /// `only-if-cached`)
    CacheModuleResponse,
    /// Storage failed and the request fell through to the transport
    Failure,
}

/// Configuration of the caching engine.
///
/// The defaults describe a private (single-user) client cache with
/// heuristics disabled.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Evaluate responses from a shared-cache perspective: `private`
    /// responses are not storable, `s-maxage` and `proxy-revalidate`
    /// apply, and authenticated exchanges need an explicit opt-in.
    pub shared: bool,
    /// Permit heuristic freshness for responses without explicit
    /// freshness information.
    pub heuristic_caching_enabled: bool,
    /// Fraction of `Date − Last-Modified` used as the heuristic lifetime.
    pub heuristic_coefficient: f32,
    /// Heuristic lifetime when `Last-Modified` is unusable.
    pub heuristic_default_lifetime: Duration,
    /// Responses whose `Content-Length` exceeds this are not stored.
    pub max_object_size: u64,
    /// Store `303 See Other` responses even without explicit freshness.
    pub allow_303_caching: bool,
    /// Cache query-string GETs from HTTP/1.0 origins that declare
    /// explicit freshness.
    pub allow_http10_query_caching: bool,
    /// `stale-if-error` window applied when neither the request nor the
    /// response names one.
    pub stale_if_error_default: Option<Duration>,
    /// Master switch for hiding origin errors behind stale entries.
    pub serve_stale_on_error: bool,
    /// How many times a lost compare-and-swap update is retried.
    pub cas_update_retries: u32,
    /// Worker pool size for `stale-while-revalidate`; zero disables
    /// background revalidation.
    pub background_revalidation_workers: usize,
    /// Add `x-cache` / `x-cache-lookup` headers to every response.
    pub cache_status_headers: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            shared: false,
            heuristic_caching_enabled: false,
            heuristic_coefficient: 0.1,
            heuristic_default_lifetime: Duration::ZERO,
            max_object_size: 8 * 1024 * 1024,
            allow_303_caching: false,
            allow_http10_query_caching: false,
            stale_if_error_default: None,
            serve_stale_on_error: true,
            cas_update_retries: 3,
            background_revalidation_workers: 1,
            cache_status_headers: true,
        }
    }
}

/// Monotonic cache counters.
///
/// Counters are updated with relaxed atomics; read them through
/// [`CacheStats::snapshot`] for a consistent-enough view.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    updates: AtomicU64,
}

impl CacheStats {
    /// Requests answered from the cache.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Requests that went to the origin for a full response.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Successful `304` merges into stored entries.
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    /// A point-in-time copy of all counters.
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits(),
            misses: self.misses(),
            updates: self.updates(),
        }
    }

    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_update(&self) {
        self.updates.fetch_add(1, Ordering::Relaxed);
    }
}

/// A point-in-time copy of the [`CacheStats`] counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    /// Requests answered from the cache
    pub hits: u64,
    /// Requests that went to the origin for a full response
    pub misses: u64,
    /// Successful `304` merges into stored entries
    pub updates: u64,
}
