//! The per-request execution engine.
//!
//! Each request runs through one state machine: unsafe methods bypass the
//! cache (invalidating what they touched), safe requests are looked up,
//! evaluated for suitability, and then served from cache, revalidated
//! against the origin, or fetched and stored. Concurrent misses for the
//! same key collapse behind a single leader fetch, and sufficiently-stale
//! entries can be served immediately while a bounded worker pool
//! revalidates them in the background.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use http::header::{HeaderValue, AGE, ETAG, WARNING};
use http::{request, Method, Request, Response, StatusCode, Version};

use crate::cache_control::{RequestCacheControl, ResponseCacheControl};
use crate::cacheability::CacheabilityPolicy;
use crate::collapse::{Flight, RequestCollapser};
use crate::conditional::{
    conditional_request, is_client_conditional, unconditional_request,
    variant_conditional_request,
};
use crate::entry::{CacheEntry, Hit};
use crate::error::{CacheError, Result};
use crate::freshness::{current_age, ValidityPolicy};
use crate::key::root_key;
use crate::revalidate::BackgroundRevalidator;
use crate::storage::Storage;
use crate::store::CacheStore;
use crate::suitability::{Suitability, SuitabilityChecker};
use crate::{
    CacheConfig, CacheResponseStatus, CacheStats, HitOrMiss, XCACHE,
    XCACHELOOKUP,
};

/// The transport the cache interposes on: a single call that forwards a
/// request to the origin and produces its response.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Forwards the request to the origin. May suspend; failures surface
    /// as [`CacheError::Transport`].
    async fn proceed(&self, request: Request<Bytes>)
        -> Result<Response<Bytes>>;
}

/// The outcome of one exchange through the cache
#[derive(Debug)]
pub struct CacheExchange {
    /// The response delivered to the caller
    pub response: Response<Bytes>,
    /// How the cache participated
    pub status: CacheResponseStatus,
}

enum HitOutcome {
    Done(CacheExchange),
    TreatAsMiss,
}

/// The caching execution engine.
///
/// Cheap to clone; clones share storage, statistics, the request collapser
/// and the background revalidation pool.
#[derive(Debug)]
pub struct CachingEngine<S, T> {
    config: CacheConfig,
    store: CacheStore<S>,
    transport: Arc<T>,
    collapser: RequestCollapser,
    revalidator: BackgroundRevalidator,
    stats: Arc<CacheStats>,
    suitability: SuitabilityChecker,
    cacheability: CacheabilityPolicy,
}

impl<S, T> Clone for CachingEngine<S, T> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            store: self.store.clone(),
            transport: Arc::clone(&self.transport),
            collapser: self.collapser.clone(),
            revalidator: self.revalidator.clone(),
            stats: Arc::clone(&self.stats),
            suitability: self.suitability,
            cacheability: self.cacheability,
        }
    }
}

impl<S: Storage, T: Transport> CachingEngine<S, T> {
    /// Builds an engine over a storage backend and a transport.
    pub fn new(config: CacheConfig, storage: Arc<S>, transport: Arc<T>) -> Self {
        let validity = ValidityPolicy {
            shared: config.shared,
            heuristic_enabled: config.heuristic_caching_enabled,
            heuristic_coefficient: config.heuristic_coefficient,
            heuristic_default: config.heuristic_default_lifetime,
        };
        Self {
            store: CacheStore::new(storage, config.cas_update_retries),
            transport,
            collapser: RequestCollapser::new(),
            revalidator: BackgroundRevalidator::new(
                config.background_revalidation_workers,
            ),
            stats: Arc::new(CacheStats::default()),
            suitability: SuitabilityChecker { validity },
            cacheability: CacheabilityPolicy {
                shared: config.shared,
                max_object_size: config.max_object_size,
                allow_303_caching: config.allow_303_caching,
                allow_http10_query_caching: config.allow_http10_query_caching,
            },
            config,
        }
    }

    /// The engine's hit/miss/update counters.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// The underlying cache store.
    pub fn store(&self) -> &CacheStore<S> {
        &self.store
    }

    /// Runs one request through the cache.
    pub async fn execute(
        &self,
        request: Request<Bytes>,
    ) -> Result<CacheExchange> {
        let (parts, body) = request.into_parts();

        if parts.method != Method::GET && parts.method != Method::HEAD {
            let mut exchange = self.bypass(parts, body).await?;
            self.apply_cache_status_headers(&mut exchange, false);
            return Ok(exchange);
        }

        let request_cc = RequestCacheControl::from_headers(&parts.headers);

        // a client that brought its own validators is answered end-to-end
        if is_client_conditional(&parts) {
            let mut exchange =
                self.client_conditional(&parts, &request_cc, body).await?;
            self.apply_cache_status_headers(&mut exchange, false);
            return Ok(exchange);
        }

        let looked_up = match self.store.lookup(&parts).await {
            Ok(looked_up) => looked_up,
            Err(CacheError::Storage(err)) => {
                // storage trouble degrades the cache to a passthrough
                log::warn!("cache lookup failed, passing through: {err}");
                let (response, _, _) = self.call_origin(&parts, body).await?;
                return Ok(CacheExchange {
                    response,
                    status: CacheResponseStatus::Failure,
                });
            }
            Err(err) => return Err(err),
        };
        let lookup_hit = looked_up.is_some();

        let mut exchange = match looked_up {
            Some(hit) => {
                match self
                    .on_hit(&parts, &request_cc, body.clone(), hit)
                    .await?
                {
                    HitOutcome::Done(exchange) => exchange,
                    HitOutcome::TreatAsMiss => {
                        self.on_miss(&parts, &request_cc, body).await?
                    }
                }
            }
            None => self.on_miss(&parts, &request_cc, body).await?,
        };
        self.apply_cache_status_headers(&mut exchange, lookup_hit);
        Ok(exchange)
    }

    /// Unsafe methods go straight to the origin; their responses may
    /// invalidate stored entries.
    async fn bypass(
        &self,
        parts: request::Parts,
        body: Bytes,
    ) -> Result<CacheExchange> {
        let (response, _, _) = self.call_origin(&parts, body).await?;
        let (response_parts, response_body) = response.into_parts();
        if let Err(err) =
            self.store.evict_invalidated(&parts, &response_parts).await
        {
            log::warn!(
                "invalidation after {} exchange failed: {err}",
                parts.method
            );
        }
        Ok(CacheExchange {
            response: Response::from_parts(response_parts, response_body),
            status: CacheResponseStatus::CacheMiss,
        })
    }

    /// A request carrying `If-None-Match`/`If-Modified-Since` of its own:
    /// forwarded unchanged so the origin's `304` reaches the client, while
    /// the stored entry still profits from the revalidation.
    async fn client_conditional(
        &self,
        parts: &request::Parts,
        request_cc: &RequestCacheControl,
        body: Bytes,
    ) -> Result<CacheExchange> {
        let hit = self.store.lookup(parts).await.unwrap_or_else(|err| {
            log::warn!("cache lookup failed during client revalidation: {err}");
            None
        });
        let (response, request_instant, response_instant) =
            self.call_origin(parts, body).await?;

        if response.status() == StatusCode::NOT_MODIFIED {
            if let Some(hit) = hit {
                let (response_parts, response_body) = response.into_parts();
                match self
                    .store
                    .update(
                        &hit,
                        &response_parts,
                        request_instant,
                        response_instant,
                    )
                    .await
                {
                    Ok(_) => self.stats.record_update(),
                    Err(err) => log::warn!(
                        "retaining unmerged entry for {:?}: {err}",
                        hit.key
                    ),
                }
                return Ok(CacheExchange {
                    response: Response::from_parts(
                        response_parts,
                        response_body,
                    ),
                    status: CacheResponseStatus::Validated,
                });
            }
            return Ok(CacheExchange {
                response,
                status: CacheResponseStatus::CacheMiss,
            });
        }
        self.handle_full_response(
            parts,
            request_cc,
            response,
            request_instant,
            response_instant,
        )
        .await
    }

    async fn on_hit(
        &self,
        parts: &request::Parts,
        request_cc: &RequestCacheControl,
        body: Bytes,
        hit: Hit,
    ) -> Result<HitOutcome> {
        let response_cc = hit.entry.response_cache_control();
        let now = SystemTime::now();
        let verdict = self.suitability.evaluate(
            parts,
            request_cc,
            &response_cc,
            &hit.entry,
            now,
        );
        log::trace!("suitability of {:?}: {verdict:?}", hit.key);

        match verdict {
            Suitability::Fresh => {
                self.stats.record_hit();
                let response = self.response_from_entry(
                    &hit.entry,
                    &response_cc,
                    parts,
                    now,
                    false,
                )?;
                Ok(HitOutcome::Done(CacheExchange {
                    response,
                    status: CacheResponseStatus::CacheHit,
                }))
            }
            Suitability::FreshEnough => {
                self.stats.record_hit();
                let response = self.response_from_entry(
                    &hit.entry,
                    &response_cc,
                    parts,
                    now,
                    true,
                )?;
                Ok(HitOutcome::Done(CacheExchange {
                    response,
                    status: CacheResponseStatus::CacheHit,
                }))
            }
            Suitability::Mismatch => Ok(HitOutcome::TreatAsMiss),
            Suitability::Stale => {
                if request_cc.only_if_cached {
                    return Ok(HitOutcome::Done(self.gateway_timeout()?));
                }
                if self.may_serve_stale_while_revalidate(
                    &response_cc,
                    &hit.entry,
                    now,
                ) && self.spawn_background_revalidation(
                    parts,
                    &response_cc,
                    &hit,
                    body.clone(),
                ) {
                    self.stats.record_hit();
                    let response = self.response_from_entry(
                        &hit.entry,
                        &response_cc,
                        parts,
                        now,
                        true,
                    )?;
                    return Ok(HitOutcome::Done(CacheExchange {
                        response,
                        status: CacheResponseStatus::CacheHit,
                    }));
                }
                let serve_stale_on_error = self.config.serve_stale_on_error
                    && self.suitability.suitable_if_error(
                        request_cc,
                        &response_cc,
                        &hit.entry,
                        self.config.stale_if_error_default,
                        now,
                    );
                self.revalidate(
                    parts,
                    &response_cc,
                    hit,
                    body,
                    serve_stale_on_error,
                )
                .await
                .map(HitOutcome::Done)
            }
            Suitability::RevalidationRequired => {
                if request_cc.only_if_cached {
                    return Ok(HitOutcome::Done(self.gateway_timeout()?));
                }
                self.revalidate(parts, &response_cc, hit, body, false)
                    .await
                    .map(HitOutcome::Done)
            }
        }
    }

    /// A cache miss: synthesize a `504` for `only-if-cached`, otherwise
    /// fetch from the origin, collapsing concurrent identical misses
    /// behind one leader.
    async fn on_miss(
        &self,
        parts: &request::Parts,
        request_cc: &RequestCacheControl,
        body: Bytes,
    ) -> Result<CacheExchange> {
        if request_cc.only_if_cached {
            return self.gateway_timeout();
        }

        // client conditionals and unsafe methods never reach this point,
        // so every remaining miss joins the collapser
        let key = root_key(parts)?;
        let mut follower_rounds = 0;
        loop {
            match self.collapser.enter(&key) {
                Flight::Leader(token) => {
                    // a previous leader may have filled the cache between
                    // our lookup and winning the slot
                    if let Ok(Some(hit)) = self.store.lookup(parts).await {
                        if let HitOutcome::Done(exchange) = self
                            .on_hit(parts, request_cc, body.clone(), hit)
                            .await?
                        {
                            token.complete();
                            return Ok(exchange);
                        }
                    }
                    let result =
                        self.fetch_and_store(parts, request_cc, body).await;
                    token.complete();
                    return result;
                }
                Flight::Follower(waiter) => {
                    log::trace!("collapsing behind in-flight fetch of {key}");
                    waiter.wait().await;
                    match self.store.lookup(parts).await {
                        Ok(Some(hit)) => {
                            match self
                                .on_hit(
                                    parts,
                                    request_cc,
                                    body.clone(),
                                    hit,
                                )
                                .await?
                            {
                                HitOutcome::Done(exchange) => {
                                    return Ok(exchange)
                                }
                                HitOutcome::TreatAsMiss => {}
                            }
                        }
                        Ok(None) => {}
                        Err(err) => {
                            log::warn!(
                                "lookup after collapse failed: {err}"
                            );
                            return self
                                .fetch_and_store(parts, request_cc, body)
                                .await;
                        }
                    }
                    follower_rounds += 1;
                    if follower_rounds >= 2 {
                        // the leader's response was not cacheable; stop
                        // queueing and fetch directly
                        return self
                            .fetch_and_store(parts, request_cc, body)
                            .await;
                    }
                }
            }
        }
    }

    async fn fetch_and_store(
        &self,
        parts: &request::Parts,
        request_cc: &RequestCacheControl,
        body: Bytes,
    ) -> Result<CacheExchange> {
        self.stats.record_miss();
        if let Some(exchange) = self
            .negotiated_revalidation(parts, request_cc, body.clone())
            .await?
        {
            return Ok(exchange);
        }
        let (response, request_instant, response_instant) =
            self.call_origin(parts, body).await?;
        self.handle_full_response(
            parts,
            request_cc,
            response,
            request_instant,
            response_instant,
        )
        .await
    }

    /// A miss against a variant index: offer the origin every stored
    /// variant's `ETag`; a `304` naming one of them lets the cache reuse
    /// that variant's body for the new request.
    async fn negotiated_revalidation(
        &self,
        parts: &request::Parts,
        request_cc: &RequestCacheControl,
        body: Bytes,
    ) -> Result<Option<CacheExchange>> {
        let candidates = match self.store.negotiation_candidates(parts).await
        {
            Ok(candidates) => candidates,
            Err(err) => {
                log::warn!("variant enumeration failed: {err}");
                None
            }
        };
        let Some((root, variants)) = candidates else {
            return Ok(None);
        };
        if variants.iter().all(|v| v.etag().is_none()) {
            return Ok(None);
        }

        let conditional = variant_conditional_request(parts, &variants)?;
        let (response, request_instant, response_instant) =
            self.call_origin(&conditional, body.clone()).await?;

        if response.status() != StatusCode::NOT_MODIFIED {
            return self
                .handle_full_response(
                    parts,
                    request_cc,
                    response,
                    request_instant,
                    response_instant,
                )
                .await
                .map(Some);
        }

        let (response_parts, _) = response.into_parts();
        let negotiated = response_parts
            .headers
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .and_then(|etag| {
                variants.iter().find(|v| v.etag() == Some(etag))
            });

        if let Some(negotiated) = negotiated {
            match self
                .store
                .store_from_negotiated(
                    &root,
                    negotiated,
                    parts,
                    &response_parts,
                    request_instant,
                    response_instant,
                )
                .await
            {
                Ok(hit) => {
                    self.stats.record_update();
                    let response_cc = hit.entry.response_cache_control();
                    let response = self.response_from_entry(
                        &hit.entry,
                        &response_cc,
                        parts,
                        SystemTime::now(),
                        false,
                    )?;
                    return Ok(Some(CacheExchange {
                        response,
                        status: CacheResponseStatus::Validated,
                    }));
                }
                Err(err) => {
                    log::warn!("negotiated variant store failed: {err}")
                }
            }
        }

        // the origin picked nothing we hold; force an end-to-end refetch
        let refetch = unconditional_request(parts);
        let (response, request_instant, response_instant) =
            self.call_origin(&refetch, body).await?;
        self.handle_full_response(
            parts,
            request_cc,
            response,
            request_instant,
            response_instant,
        )
        .await
        .map(Some)
    }

    /// Conditional revalidation of a stored entry, optionally hiding
    /// origin errors behind the stale entry.
    async fn revalidate(
        &self,
        parts: &request::Parts,
        response_cc: &ResponseCacheControl,
        hit: Hit,
        body: Bytes,
        serve_stale_on_error: bool,
    ) -> Result<CacheExchange> {
        let conditional = conditional_request(
            parts,
            &hit.entry,
            response_cc,
            self.config.shared,
        )?;

        let outcome = self.call_origin(&conditional, body).await;
        let now = SystemTime::now();
        match outcome {
            Err(err) => {
                if serve_stale_on_error {
                    log::debug!("origin unreachable, serving stale: {err}");
                    self.stats.record_hit();
                    let mut response = self.response_from_entry(
                        &hit.entry,
                        response_cc,
                        parts,
                        now,
                        true,
                    )?;
                    add_warning(&mut response, 111, "Revalidation Failed");
                    Ok(CacheExchange {
                        response,
                        status: CacheResponseStatus::CacheHit,
                    })
                } else {
                    Err(err)
                }
            }
            Ok((response, request_instant, response_instant)) => {
                let status = response.status().as_u16();
                if matches!(status, 500 | 502 | 503 | 504)
                    && serve_stale_on_error
                {
                    // the error body must be consumed so its connection is
                    // released before we answer from the cache
                    drop(response);
                    self.stats.record_hit();
                    let response = self.response_from_entry(
                        &hit.entry,
                        response_cc,
                        parts,
                        now,
                        true,
                    )?;
                    return Ok(CacheExchange {
                        response,
                        status: CacheResponseStatus::CacheHit,
                    });
                }
                if response.status() == StatusCode::NOT_MODIFIED {
                    return self
                        .handle_not_modified(
                            parts,
                            hit,
                            response,
                            request_instant,
                            response_instant,
                        )
                        .await;
                }
                self.handle_full_response(
                    parts,
                    &RequestCacheControl::default(),
                    response,
                    request_instant,
                    response_instant,
                )
                .await
            }
        }
    }

    /// A `304` for a cache-initiated revalidation: merge headers into the
    /// stored entry and serve the merged result.
    async fn handle_not_modified(
        &self,
        parts: &request::Parts,
        hit: Hit,
        response: Response<Bytes>,
        request_instant: SystemTime,
        response_instant: SystemTime,
    ) -> Result<CacheExchange> {
        let (response_parts, _) = response.into_parts();
        let updated = match self
            .store
            .update(&hit, &response_parts, request_instant, response_instant)
            .await
        {
            Ok(updated) => {
                self.stats.record_update();
                updated
            }
            Err(
                err @ (CacheError::UpdateExhausted { .. }
                | CacheError::Storage(_)),
            ) => {
                // serve the merged view even when it could not be persisted
                log::warn!("revalidation merge not persisted: {err}");
                Hit {
                    entry: hit.entry.merged_with(
                        &response_parts.headers,
                        request_instant,
                        response_instant,
                    ),
                    ..hit
                }
            }
            Err(err) => return Err(err),
        };

        let response_cc = updated.entry.response_cache_control();
        let response = self.response_from_entry(
            &updated.entry,
            &response_cc,
            parts,
            SystemTime::now(),
            false,
        )?;
        Ok(CacheExchange {
            response,
            status: CacheResponseStatus::Validated,
        })
    }

    /// A full origin response: run invalidation, store it when the
    /// cacheability policy allows, and pass it along.
    async fn handle_full_response(
        &self,
        parts: &request::Parts,
        request_cc: &RequestCacheControl,
        response: Response<Bytes>,
        request_instant: SystemTime,
        response_instant: SystemTime,
    ) -> Result<CacheExchange> {
        let (response_parts, response_body) = response.into_parts();

        if let Err(err) =
            self.store.evict_invalidated(parts, &response_parts).await
        {
            log::warn!("invalidation failed: {err}");
        }

        let response_cc =
            ResponseCacheControl::from_headers(&response_parts.headers);
        if self.cacheability.response_is_storable(
            parts,
            request_cc,
            &response_parts,
            &response_cc,
        ) {
            let resource = if parts.method == Method::HEAD
                || response_parts.status.as_u16() == 204
            {
                None
            } else {
                Some(response_body.clone())
            };
            if let Err(err) = self
                .store
                .store(
                    parts,
                    &response_parts,
                    resource,
                    request_instant,
                    response_instant,
                )
                .await
            {
                log::warn!("failed to store response: {err}");
            }
        }

        Ok(CacheExchange {
            response: Response::from_parts(response_parts, response_body),
            status: CacheResponseStatus::CacheMiss,
        })
    }

    async fn call_origin(
        &self,
        parts: &request::Parts,
        body: Bytes,
    ) -> Result<(Response<Bytes>, SystemTime, SystemTime)> {
        let request = Request::from_parts(parts.clone(), body);
        let request_instant = SystemTime::now();
        let response = self.transport.proceed(request).await?;
        let response_instant = SystemTime::now();
        Ok((response, request_instant, response_instant))
    }

    fn may_serve_stale_while_revalidate(
        &self,
        response_cc: &ResponseCacheControl,
        entry: &CacheEntry,
        now: SystemTime,
    ) -> bool {
        if !self.revalidator.is_enabled() {
            return false;
        }
        if response_cc.must_revalidate
            || (self.config.shared && response_cc.proxy_revalidate)
        {
            return false;
        }
        let Some(window) = response_cc.stale_while_revalidate else {
            return false;
        };
        let age = current_age(entry, now);
        let lifetime = self
            .suitability
            .validity
            .effective_freshness_lifetime(response_cc, entry);
        age.saturating_sub(lifetime) <= Duration::from_secs(window)
    }

    /// Schedules the background leg of stale-while-revalidate. Returns
    /// `false` when the pool refused the task.
    fn spawn_background_revalidation(
        &self,
        parts: &request::Parts,
        response_cc: &ResponseCacheControl,
        hit: &Hit,
        body: Bytes,
    ) -> bool {
        let engine = self.clone();
        let parts = parts.clone();
        let response_cc = response_cc.clone();
        let hit = hit.clone();
        let key = hit.key.clone();
        self.revalidator.try_spawn(&key, async move {
            if let Err(err) = engine
                .revalidate(&parts, &response_cc, hit, body, false)
                .await
            {
                log::debug!("background revalidation failed: {err}");
            }
        })
    }

    /// Rebuilds a client-facing response from a stored entry: qualified
    /// `no-cache` fields are stripped, the `Age` header reflects the
    /// entry's current age, and stale-served responses carry a `110`
    /// warning. HEAD requests get the headers without the body.
    fn response_from_entry(
        &self,
        entry: &CacheEntry,
        response_cc: &ResponseCacheControl,
        parts: &request::Parts,
        now: SystemTime,
        stale: bool,
    ) -> Result<Response<Bytes>> {
        let mut headers = entry.response_header_map()?;
        for field in &response_cc.no_cache_fields {
            headers.remove(field.as_str());
        }
        let age = current_age(entry, now);
        headers
            .insert(AGE, HeaderValue::from_str(&age.as_secs().to_string())?);

        let body = if parts.method == Method::HEAD {
            Bytes::new()
        } else {
            entry
                .resource
                .as_ref()
                .map(|r| r.bytes().clone())
                .unwrap_or_default()
        };
        let mut response = Response::builder()
            .status(entry.status)
            .version(Version::HTTP_11)
            .body(body)?;
        *response.headers_mut() = headers;
        if stale {
            add_warning(&mut response, 110, "Response is Stale");
        }
        Ok(response)
    }

    fn gateway_timeout(&self) -> Result<CacheExchange> {
        let response = Response::builder()
            .status(StatusCode::GATEWAY_TIMEOUT)
            .body(Bytes::from_static(b"GatewayTimeout"))?;
        Ok(CacheExchange {
            response,
            status: CacheResponseStatus::CacheModuleResponse,
        })
    }

    fn apply_cache_status_headers(
        &self,
        exchange: &mut CacheExchange,
        lookup_hit: bool,
    ) {
        if !self.config.cache_status_headers {
            return;
        }
        let served_from_cache = matches!(
            exchange.status,
            CacheResponseStatus::CacheHit | CacheResponseStatus::Validated
        );
        let cache = if served_from_cache {
            HitOrMiss::HIT
        } else {
            HitOrMiss::MISS
        };
        let lookup = if lookup_hit || served_from_cache {
            HitOrMiss::HIT
        } else {
            HitOrMiss::MISS
        };
        let headers = exchange.response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(&cache.to_string()) {
            headers.insert(XCACHE, value);
        }
        if let Ok(value) = HeaderValue::from_str(&lookup.to_string()) {
            headers.insert(XCACHELOOKUP, value);
        }
    }
}

// warning-value: warn-code SP warn-agent SP warn-text; the agent is a
// pseudonym since the cache is not addressable
fn add_warning(response: &mut Response<Bytes>, code: u16, text: &str) {
    if let Ok(value) = HeaderValue::from_str(&format!("{code} - \"{text}\"")) {
        response.headers_mut().append(WARNING, value);
    }
}
