//! The cache store facade.
//!
//! Wraps the [`Storage`] capability with the operations the execution
//! engine needs: variant-aware lookup, storing fresh responses,
//! revalidation merges, negotiated-variant registration and invalidation.
//! Every update that can race (header merges on `304`, variant-set changes
//! on roots) goes through a bounded compare-and-swap loop, and a root entry
//! is always written *after* its variant children so a reader never finds a
//! dangling discriminator.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use http::{request, response, Method};

use crate::entry::{headers_to_vec, CacheEntry, Hit, Resource};
use crate::error::{CacheError, Result};
use crate::key::{
    referenced_root_key, root_key, variant_discriminator, variant_key,
};
use crate::storage::Storage;
use crate::suitability::variant_headers_match;

/// Storage-agnostic cache operations
#[derive(Debug)]
pub struct CacheStore<S> {
    storage: Arc<S>,
    cas_retries: u32,
}

impl<S> Clone for CacheStore<S> {
    fn clone(&self) -> Self {
        Self { storage: Arc::clone(&self.storage), cas_retries: self.cas_retries }
    }
}

impl<S: Storage> CacheStore<S> {
    /// Wraps a storage backend.
    pub fn new(storage: Arc<S>, cas_retries: u32) -> Self {
        Self { storage, cas_retries }
    }

    /// The wrapped backend.
    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// Looks up the stored entry answering a request.
    ///
    /// When the root entry is a variant index, all children are fetched in
    /// one bulk call and the candidates whose selecting headers align with
    /// the request compete on `Date` (ties broken by `response_instant`).
    pub async fn lookup(
        &self,
        parts: &request::Parts,
    ) -> Result<Option<Hit>> {
        let root = root_key(parts)?;
        let Some(root_entry) = self.storage.get(&root).await? else {
            return Ok(None);
        };
        if !root_entry.is_variant_root() {
            return Ok(Some(Hit {
                key: root.clone(),
                root_key: root,
                entry: root_entry,
            }));
        }

        let keys: Vec<String> = root_entry
            .variants
            .iter()
            .flatten()
            .map(|d| variant_key(d, &root))
            .collect();
        let children = self.storage.get_many(&keys).await?;

        let mut best: Option<(String, CacheEntry)> = None;
        for (key, candidate) in children {
            if !variant_headers_match(parts, &candidate) {
                continue;
            }
            let replace = match &best {
                None => true,
                Some((_, current)) => {
                    selection_order(&candidate) > selection_order(current)
                }
            };
            if replace {
                best = Some((key, candidate));
            }
        }
        Ok(best.map(|(key, entry)| Hit { key, root_key: root, entry }))
    }

    /// When a request misses a variant index (no stored variant matches its
    /// selecting headers), returns the root key together with every stored
    /// variant so the engine can attempt a negotiated revalidation.
    pub async fn negotiation_candidates(
        &self,
        parts: &request::Parts,
    ) -> Result<Option<(String, Vec<CacheEntry>)>> {
        let root = root_key(parts)?;
        let Some(root_entry) = self.storage.get(&root).await? else {
            return Ok(None);
        };
        if !root_entry.is_variant_root() {
            return Ok(None);
        }
        let keys: Vec<String> = root_entry
            .variants
            .iter()
            .flatten()
            .map(|d| variant_key(d, &root))
            .collect();
        let children = self.storage.get_many(&keys).await?;
        Ok(Some((root, children.into_values().collect())))
    }

    /// Stores a fresh origin response and returns the resulting hit.
    ///
    /// Responses negotiated via `Vary` are stored under their variant key;
    /// the root index is created or extended afterwards via CAS.
    pub async fn store(
        &self,
        parts: &request::Parts,
        response_parts: &response::Parts,
        body: Option<Bytes>,
        request_instant: SystemTime,
        response_instant: SystemTime,
    ) -> Result<Hit> {
        let root = root_key(parts)?;
        let entry = CacheEntry::new(
            request_instant,
            response_instant,
            parts.method.as_str(),
            root.clone(),
            headers_to_vec(&parts.headers),
            response_parts.status.as_u16(),
            headers_to_vec(&response_parts.headers),
            body.map(Resource::new),
        );

        let vary = entry.vary_fields();
        if vary.is_empty() {
            // replacing a variant index wholesale would orphan its
            // children, so drop them first
            if let Some(existing) = self.storage.get(&root).await? {
                if existing.is_variant_root() {
                    self.remove_children(&root, &existing).await?;
                }
            }
            self.storage.put(&root, entry.clone()).await?;
            return Ok(Hit { key: root.clone(), root_key: root, entry });
        }

        let discriminator = variant_discriminator(&vary, &parts.headers);
        let child_key = variant_key(&discriminator, &root);
        self.storage.put(&child_key, entry.clone()).await?;
        self.register_variant(&root, &entry, &discriminator).await?;
        Ok(Hit { key: child_key, root_key: root, entry })
    }

    /// Applies a `304 Not Modified` to a stored entry: headers are merged,
    /// the body and status survive, and the result is persisted through
    /// the CAS loop.
    pub async fn update(
        &self,
        hit: &Hit,
        not_modified: &response::Parts,
        request_instant: SystemTime,
        response_instant: SystemTime,
    ) -> Result<Hit> {
        let entry = self
            .update_with_retry(&hit.key, |current| {
                current
                    .unwrap_or(&hit.entry)
                    .merged_with(
                        &not_modified.headers,
                        request_instant,
                        response_instant,
                    )
            })
            .await?;
        Ok(Hit {
            key: hit.key.clone(),
            root_key: hit.root_key.clone(),
            entry,
        })
    }

    /// A `304` selected one stored variant for a request that did not map
    /// to it directly: store a new variant entry reusing the negotiated
    /// body under the current request's discriminator, then register the
    /// discriminator on the root.
    pub async fn store_from_negotiated(
        &self,
        root: &str,
        negotiated: &CacheEntry,
        parts: &request::Parts,
        not_modified: &response::Parts,
        request_instant: SystemTime,
        response_instant: SystemTime,
    ) -> Result<Hit> {
        let mut entry = negotiated.merged_with(
            &not_modified.headers,
            request_instant,
            response_instant,
        );
        entry.request_method = parts.method.as_str().to_ascii_uppercase();
        entry.request_uri = root.to_string();
        entry.request_headers = headers_to_vec(&parts.headers);

        let discriminator =
            variant_discriminator(&entry.vary_fields(), &parts.headers);
        let child_key = variant_key(&discriminator, root);
        self.storage.put(&child_key, entry.clone()).await?;
        self.register_variant(root, &entry, &discriminator).await?;
        Ok(Hit {
            key: child_key,
            root_key: root.to_string(),
            entry,
        })
    }

    /// Invalidates entries affected by a side-effecting exchange.
    ///
    /// Unsafe methods flush the exchange's own key. Successful responses
    /// additionally flush same-origin `Content-Location`/`Location`
    /// targets whose stored validators are out of date. Error responses
    /// never invalidate anything.
    pub async fn evict_invalidated(
        &self,
        parts: &request::Parts,
        response_parts: &response::Parts,
    ) -> Result<()> {
        let status = response_parts.status.as_u16();
        if !(200..400).contains(&status) {
            return Ok(());
        }

        if is_unsafe_method(&parts.method) {
            let root = root_key(parts)?;
            self.flush(&root).await?;
        }

        for header in ["content-location", "location"] {
            let Some(reference) = response_parts
                .headers
                .get(header)
                .and_then(|v| v.to_str().ok())
            else {
                continue;
            };
            let Some(target) = referenced_root_key(reference, parts) else {
                // cross-origin references are never flushed
                continue;
            };
            let Some(stored) = self.storage.get(&target).await? else {
                continue;
            };
            if invalidated_by(&stored, response_parts) {
                log::debug!("invalidating {target:?} referenced by exchange");
                self.flush(&target).await?;
            }
        }
        Ok(())
    }

    /// Removes a root entry together with all of its variant children.
    pub async fn flush(&self, root: &str) -> Result<()> {
        if let Some(existing) = self.storage.get(root).await? {
            if existing.is_variant_root() {
                self.remove_children(root, &existing).await?;
            }
        }
        self.storage.remove(root).await
    }

    /// Adds `discriminator` to the root's variant set via CAS. The root is
    /// derived from the concrete entry but carries no body.
    async fn register_variant(
        &self,
        root: &str,
        entry: &CacheEntry,
        discriminator: &str,
    ) -> Result<()> {
        self.update_with_retry(root, |current| {
            let mut variants = current
                .and_then(|e| e.variants.clone())
                .unwrap_or_default();
            variants.insert(discriminator.to_string());
            let mut index = entry.clone();
            index.resource = None;
            index.variants = Some(variants);
            index
        })
        .await?;
        Ok(())
    }

    async fn remove_children(
        &self,
        root: &str,
        entry: &CacheEntry,
    ) -> Result<()> {
        for discriminator in entry.variants.iter().flatten() {
            self.storage.remove(&variant_key(discriminator, root)).await?;
        }
        Ok(())
    }

    /// The CAS loop: read a snapshot, compute the replacement, attempt the
    /// conditional write, retry on conflict up to the configured bound.
    /// When the key is absent the replacement is stored directly.
    pub(crate) async fn update_with_retry<F>(
        &self,
        key: &str,
        mutate: F,
    ) -> Result<CacheEntry>
    where
        F: Fn(Option<&CacheEntry>) -> CacheEntry + Send + Sync,
    {
        let mut attempts = 0;
        loop {
            match self.storage.get_for_update(key).await? {
                Some(snapshot) => {
                    let updated = mutate(Some(&snapshot.entry));
                    if self
                        .storage
                        .update_cas(key, snapshot.token, updated.clone())
                        .await?
                    {
                        return Ok(updated);
                    }
                    attempts += 1;
                    if attempts > self.cas_retries {
                        return Err(CacheError::UpdateExhausted {
                            key: key.to_string(),
                            attempts,
                        });
                    }
                    log::debug!(
                        "compare-and-swap conflict on {key:?} (attempt {attempts}/{})",
                        self.cas_retries
                    );
                }
                None => {
                    let updated = mutate(None);
                    self.storage.put(key, updated.clone()).await?;
                    return Ok(updated);
                }
            }
        }
    }
}

/// Selection key for competing variants: newest `Date` first, then the
/// most recently received.
fn selection_order(entry: &CacheEntry) -> (SystemTime, SystemTime) {
    (entry.date().unwrap_or(UNIX_EPOCH), entry.response_instant)
}

/// Methods whose responses may have changed server state.
pub(crate) fn is_unsafe_method(method: &Method) -> bool {
    !(*method == Method::GET
        || *method == Method::HEAD
        || *method == Method::OPTIONS
        || *method == Method::TRACE)
}

fn invalidated_by(
    stored: &CacheEntry,
    response_parts: &response::Parts,
) -> bool {
    let response_etag = response_parts
        .headers
        .get(http::header::ETAG)
        .and_then(|v| v.to_str().ok())
        .map(str::trim);
    let response_date = response_parts
        .headers
        .get(http::header::DATE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| httpdate::parse_http_date(v).ok());
    match (response_etag, response_date, stored.etag(), stored.date()) {
        (
            Some(response_etag),
            Some(response_date),
            Some(stored_etag),
            Some(stored_date),
        ) => stored_etag != response_etag && stored_date < response_date,
        // missing or unorderable validators invalidate conservatively
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{CasToken, MemoryStorage, Snapshot};
    use http::{Request, Response};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn store() -> CacheStore<MemoryStorage> {
        CacheStore::new(Arc::new(MemoryStorage::new()), 3)
    }

    fn get_parts(uri: &str, headers: &[(&str, &str)]) -> request::Parts {
        let mut builder = Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    fn response_parts(
        status: u16,
        headers: &[(&str, &str)],
    ) -> response::Parts {
        let mut builder = Response::builder().status(status);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    fn now_pair() -> (SystemTime, SystemTime) {
        let now = SystemTime::now();
        (now - Duration::from_millis(50), now)
    }

    #[tokio::test]
    async fn stores_and_finds_plain_entries() {
        let store = store();
        let req = get_parts("http://example.com/x", &[]);
        let resp = response_parts(200, &[("cache-control", "max-age=60")]);
        let (t0, t1) = now_pair();
        store
            .store(&req, &resp, Some(Bytes::from("body")), t0, t1)
            .await
            .unwrap();

        let hit = store.lookup(&req).await.unwrap().unwrap();
        assert_eq!(hit.key, "http://example.com/x");
        assert_eq!(hit.entry.status, 200);
        assert_eq!(
            hit.entry.resource.as_ref().unwrap().bytes().as_ref(),
            b"body"
        );
    }

    #[tokio::test]
    async fn vary_responses_build_a_variant_index() {
        let store = store();
        let (t0, t1) = now_pair();

        let gzip_req = get_parts(
            "http://example.com/y",
            &[("accept-encoding", "gzip")],
        );
        let resp = response_parts(
            200,
            &[
                ("cache-control", "max-age=60"),
                ("vary", "Accept-Encoding"),
                ("etag", "\"a\""),
            ],
        );
        store
            .store(&gzip_req, &resp, Some(Bytes::from("gzip body")), t0, t1)
            .await
            .unwrap();

        // a different encoding misses
        let identity_req = get_parts(
            "http://example.com/y",
            &[("accept-encoding", "identity")],
        );
        assert!(store.lookup(&identity_req).await.unwrap().is_none());

        let resp_b = response_parts(
            200,
            &[
                ("cache-control", "max-age=60"),
                ("vary", "Accept-Encoding"),
                ("etag", "\"b\""),
            ],
        );
        store
            .store(
                &identity_req,
                &resp_b,
                Some(Bytes::from("identity body")),
                t0,
                t1,
            )
            .await
            .unwrap();

        let hit = store.lookup(&gzip_req).await.unwrap().unwrap();
        assert_eq!(hit.entry.etag(), Some("\"a\""));
        let hit = store.lookup(&identity_req).await.unwrap().unwrap();
        assert_eq!(hit.entry.etag(), Some("\"b\""));

        let root = store
            .storage()
            .get("http://example.com/y")
            .await
            .unwrap()
            .unwrap();
        assert!(root.is_variant_root());
        assert_eq!(root.variants.as_ref().unwrap().len(), 2);
        assert!(root.resource.is_none());
    }

    #[tokio::test]
    async fn newest_variant_wins_selection() {
        let store = store();
        let now = SystemTime::now();
        let req =
            get_parts("http://example.com/z", &[("accept-encoding", "gzip")]);

        let older = response_parts(
            200,
            &[
                ("cache-control", "max-age=60"),
                ("vary", "Accept-Encoding"),
                (
                    "date",
                    &httpdate::fmt_http_date(now - Duration::from_secs(100)),
                ),
            ],
        );
        store
            .store(&req, &older, Some(Bytes::from("old")), now, now)
            .await
            .unwrap();

        // a second variant whose wider Vary still matches the bare request
        let newer = response_parts(
            200,
            &[
                ("cache-control", "max-age=60"),
                ("vary", "Accept-Encoding, Accept"),
                ("date", &httpdate::fmt_http_date(now)),
            ],
        );
        store
            .store(&req, &newer, Some(Bytes::from("new")), now, now)
            .await
            .unwrap();

        let root = store
            .storage()
            .get("http://example.com/z")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(root.variants.as_ref().unwrap().len(), 2);

        // both children answer a bare gzip request; the newest Date wins
        let hit = store.lookup(&req).await.unwrap().unwrap();
        assert_eq!(hit.entry.resource.as_ref().unwrap().bytes().as_ref(), b"new");
    }

    #[tokio::test]
    async fn update_merges_headers_in_place() {
        let store = store();
        let req = get_parts("http://example.com/x", &[]);
        let resp = response_parts(
            200,
            &[("cache-control", "max-age=5"), ("etag", "\"v1\"")],
        );
        let (t0, t1) = now_pair();
        let hit = store
            .store(&req, &resp, Some(Bytes::from("body")), t0, t1)
            .await
            .unwrap();

        let not_modified = response_parts(
            304,
            &[
                ("etag", "\"v1\""),
                ("cache-control", "max-age=120"),
                ("date", &httpdate::fmt_http_date(SystemTime::now())),
            ],
        );
        let updated = store
            .update(&hit, &not_modified, t1, SystemTime::now())
            .await
            .unwrap();
        assert_eq!(updated.entry.header("cache-control"), Some("max-age=120"));
        assert_eq!(
            updated.entry.resource.as_ref().unwrap().bytes().as_ref(),
            b"body"
        );

        // the merge was persisted
        let reread = store.lookup(&req).await.unwrap().unwrap();
        assert_eq!(reread.entry.header("cache-control"), Some("max-age=120"));
    }

    #[tokio::test]
    async fn negotiated_store_registers_new_discriminator() {
        let store = store();
        let (t0, t1) = now_pair();
        let gzip_req = get_parts(
            "http://example.com/n",
            &[("accept-encoding", "gzip")],
        );
        let resp = response_parts(
            200,
            &[
                ("cache-control", "max-age=60"),
                ("vary", "Accept-Encoding"),
                ("etag", "\"a\""),
            ],
        );
        let stored = store
            .store(&gzip_req, &resp, Some(Bytes::from("negotiated")), t0, t1)
            .await
            .unwrap();

        // a request with an equivalent-but-differently-spelled header is
        // selected by the origin via 304
        let alias_req = get_parts(
            "http://example.com/n",
            &[("accept-encoding", "gzip, gzip")],
        );
        let not_modified = response_parts(304, &[("etag", "\"a\"")]);
        let hit = store
            .store_from_negotiated(
                &stored.root_key,
                &stored.entry,
                &alias_req,
                &not_modified,
                t0,
                t1,
            )
            .await
            .unwrap();
        assert_eq!(
            hit.entry.resource.as_ref().unwrap().bytes().as_ref(),
            b"negotiated"
        );

        let root = store
            .storage()
            .get("http://example.com/n")
            .await
            .unwrap()
            .unwrap();
        assert!(root
            .variants
            .as_ref()
            .unwrap()
            .contains("{accept-encoding=gzip}"));
    }

    #[tokio::test]
    async fn unsafe_methods_flush_their_key() {
        let store = store();
        let (t0, t1) = now_pair();
        let get_req = get_parts(
            "http://example.com/a",
            &[("accept-encoding", "gzip")],
        );
        let resp = response_parts(
            200,
            &[("cache-control", "max-age=60"), ("vary", "Accept-Encoding")],
        );
        store
            .store(&get_req, &resp, Some(Bytes::from("body")), t0, t1)
            .await
            .unwrap();
        assert_eq!(store.storage().len(), 2);

        let mut put_req = get_parts("http://example.com/a", &[]);
        put_req.method = Method::PUT;
        store
            .evict_invalidated(&put_req, &response_parts(200, &[]))
            .await
            .unwrap();
        assert_eq!(store.storage().len(), 0);
    }

    #[tokio::test]
    async fn content_location_invalidation_compares_validators() {
        let now = SystemTime::now();
        let t1 = now - Duration::from_secs(100);
        let t2 = now;

        for (etag, date, expect_flushed) in [
            // different etag, older stored date: flushed
            ("\"new\"", t2, true),
            // same etag: preserved
            ("\"old\"", t2, false),
            // response missing nothing but stored date newer: preserved
            ("\"new\"", t1 - Duration::from_secs(10), false),
        ] {
            let store = store();
            let target_req = get_parts("http://example.com/q", &[]);
            let target_resp = response_parts(
                200,
                &[
                    ("cache-control", "max-age=60"),
                    ("etag", "\"old\""),
                    ("date", &httpdate::fmt_http_date(t1)),
                ],
            );
            store
                .store(
                    &target_req,
                    &target_resp,
                    Some(Bytes::from("q")),
                    t1,
                    t1,
                )
                .await
                .unwrap();

            let mut put_req = get_parts("http://example.com/p", &[]);
            put_req.method = Method::PUT;
            let put_resp = response_parts(
                200,
                &[
                    ("content-location", "/q"),
                    ("etag", etag),
                    ("date", &httpdate::fmt_http_date(date)),
                ],
            );
            store.evict_invalidated(&put_req, &put_resp).await.unwrap();
            let flushed =
                store.lookup(&target_req).await.unwrap().is_none();
            assert_eq!(flushed, expect_flushed, "etag={etag}");
        }
    }

    #[tokio::test]
    async fn missing_validators_invalidate_conservatively() {
        let store = store();
        let (t0, t1) = now_pair();
        let target_req = get_parts("http://example.com/q", &[]);
        let target_resp =
            response_parts(200, &[("cache-control", "max-age=60")]);
        store
            .store(&target_req, &target_resp, Some(Bytes::from("q")), t0, t1)
            .await
            .unwrap();

        let mut post_req = get_parts("http://example.com/p", &[]);
        post_req.method = Method::POST;
        let post_resp = response_parts(201, &[("location", "/q")]);
        store.evict_invalidated(&post_req, &post_resp).await.unwrap();
        assert!(store.lookup(&target_req).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn error_responses_never_invalidate() {
        let store = store();
        let (t0, t1) = now_pair();
        let target_req = get_parts("http://example.com/a", &[]);
        let target_resp =
            response_parts(200, &[("cache-control", "max-age=60")]);
        store
            .store(&target_req, &target_resp, Some(Bytes::from("a")), t0, t1)
            .await
            .unwrap();

        let mut put_req = get_parts("http://example.com/a", &[]);
        put_req.method = Method::PUT;
        let error_resp =
            response_parts(500, &[("content-location", "/a")]);
        store.evict_invalidated(&put_req, &error_resp).await.unwrap();
        assert!(store.lookup(&target_req).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn cross_origin_references_are_ignored() {
        let store = store();
        let (t0, t1) = now_pair();
        let target_req = get_parts("http://example.com/q", &[]);
        let target_resp =
            response_parts(200, &[("cache-control", "max-age=60")]);
        store
            .store(&target_req, &target_resp, Some(Bytes::from("q")), t0, t1)
            .await
            .unwrap();

        let mut put_req = get_parts("http://example.com/p", &[]);
        put_req.method = Method::PUT;
        let put_resp = response_parts(
            200,
            &[("content-location", "http://other.example.net/q")],
        );
        store.evict_invalidated(&put_req, &put_resp).await.unwrap();
        assert!(store.lookup(&target_req).await.unwrap().is_some());
    }

    /// A backend whose conditional writes always lose.
    #[derive(Default)]
    struct ContendedStorage {
        inner: MemoryStorage,
        cas_calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl Storage for ContendedStorage {
        async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
            self.inner.get(key).await
        }
        async fn put(&self, key: &str, entry: CacheEntry) -> Result<()> {
            self.inner.put(key, entry).await
        }
        async fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key).await
        }
        async fn get_many(
            &self,
            keys: &[String],
        ) -> Result<HashMap<String, CacheEntry>> {
            self.inner.get_many(keys).await
        }
        async fn get_for_update(
            &self,
            key: &str,
        ) -> Result<Option<Snapshot>> {
            self.inner.get_for_update(key).await
        }
        async fn update_cas(
            &self,
            _key: &str,
            _token: CasToken,
            _entry: CacheEntry,
        ) -> Result<bool> {
            self.cas_calls.fetch_add(1, Ordering::Relaxed);
            Ok(false)
        }
    }

    #[tokio::test]
    async fn cas_exhaustion_surfaces_after_bounded_retries() {
        let backend = Arc::new(ContendedStorage::default());
        let store = CacheStore::new(Arc::clone(&backend), 3);
        let req = get_parts("http://example.com/x", &[]);
        let resp = response_parts(
            200,
            &[("cache-control", "max-age=5"), ("etag", "\"v1\"")],
        );
        let (t0, t1) = now_pair();
        let hit = store
            .store(&req, &resp, Some(Bytes::from("body")), t0, t1)
            .await
            .unwrap();

        let not_modified = response_parts(304, &[("etag", "\"v1\"")]);
        let err = store
            .update(&hit, &not_modified, t1, SystemTime::now())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CacheError::UpdateExhausted { attempts: 4, .. }
        ));
        assert_eq!(backend.cas_calls.load(Ordering::Relaxed), 4);
    }
}
