//! The stored cache entry model.

use std::collections::BTreeSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::cache_control::ResponseCacheControl;
use crate::error::Result;

/// Warning codes in the 1xx range are dropped whenever a stored entry is
/// selected for update (RFC 7234 §4.3.4).
const WARNING: &str = "warning";

/// Headers describing the reused body are never overwritten by a `304`,
/// since the stored body itself is kept.
const EXCLUDED_FROM_REVALIDATION_UPDATE: &[&str] = &[
    "content-length",
    "content-encoding",
    "transfer-encoding",
    "content-range",
];

/// An opaque handle to a cached response body.
///
/// Resource materialization (disk spill, mmap, …) belongs to the storage
/// layer; the core only moves the handle around. Each resource is owned by
/// exactly one entry and travels with it on replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    body: Bytes,
}

impl Resource {
    /// Wraps body bytes as a cache resource.
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self { body: body.into() }
    }

    /// The body bytes.
    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// Length of the body in bytes.
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// Whether the body is empty.
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// A single stored cache entry.
///
/// An entry captures the two instants bracketing the origin exchange, the
/// minimal request context needed for variant matching and revalidation,
/// and the response itself. An entry whose `variants` set is non-empty is a
/// *root entry*: an index over concrete variant entries, carrying no body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Wall-clock reading taken just before the origin exchange
    #[serde(with = "epoch_millis")]
    pub request_instant: SystemTime,
    /// Wall-clock reading taken just after the origin exchange
    #[serde(with = "epoch_millis")]
    pub response_instant: SystemTime,
    /// Method of the request that produced the entry (`GET` or `HEAD`)
    pub request_method: String,
    /// Canonical URI of the request that produced the entry
    pub request_uri: String,
    /// Captured request headers, in wire order
    pub request_headers: Vec<(String, String)>,
    /// HTTP status of the stored response
    pub status: u16,
    /// Stored response headers, in wire order
    pub response_headers: Vec<(String, String)>,
    /// The response body, absent for bodyless responses and root entries
    pub resource: Option<Resource>,
    /// Variant discriminators indexed by this root entry, if any
    pub variants: Option<BTreeSet<String>>,
}

impl CacheEntry {
    /// Builds an entry from an origin exchange.
    ///
    /// The instants are clamped so `response_instant >= request_instant`
    /// always holds for stored entries.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        request_instant: SystemTime,
        response_instant: SystemTime,
        request_method: &str,
        request_uri: String,
        request_headers: Vec<(String, String)>,
        status: u16,
        response_headers: Vec<(String, String)>,
        resource: Option<Resource>,
    ) -> Self {
        let response_instant = response_instant.max(request_instant);
        Self {
            request_instant,
            response_instant,
            request_method: request_method.to_ascii_uppercase(),
            request_uri,
            request_headers,
            status,
            response_headers,
            resource,
            variants: None,
        }
    }

    /// The first response header value for `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.response_headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every response header value for `name`, case-insensitively.
    pub fn header_all<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a str> {
        self.response_headers
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The first captured request header value for `name`.
    pub fn request_header(&self, name: &str) -> Option<&str> {
        self.request_headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every captured request header value for `name`, comma-joined, for
    /// variant comparison.
    pub fn request_header_joined(&self, name: &str) -> String {
        self.request_headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// The response `Date`, if present and parseable.
    pub fn date(&self) -> Option<SystemTime> {
        self.header("date").and_then(|v| httpdate::parse_http_date(v).ok())
    }

    /// The response `ETag` verbatim.
    pub fn etag(&self) -> Option<&str> {
        self.header("etag").map(str::trim)
    }

    /// The response `Last-Modified` verbatim.
    pub fn last_modified(&self) -> Option<&str> {
        self.header("last-modified")
    }

    /// Header names listed in `Vary`, comma-split across every instance.
    pub fn vary_fields(&self) -> Vec<String> {
        self.header_all("vary")
            .flat_map(|v| v.split(','))
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect()
    }

    /// Whether this entry acts as a variant index rather than a response.
    pub fn is_variant_root(&self) -> bool {
        self.variants.as_ref().is_some_and(|v| !v.is_empty())
    }

    /// Parses the stored response's `Cache-Control`.
    pub fn response_cache_control(&self) -> ResponseCacheControl {
        ResponseCacheControl::parse(self.header_all("cache-control"))
    }

    /// Produces the entry that results from a `304 Not Modified`
    /// revalidation: headers named by the `304` replace every stored
    /// instance of the same name, other stored headers are kept, and the
    /// body and status survive unchanged. Stored 1xx `Warning` values are
    /// dropped, and body-describing headers are never overwritten since the
    /// body is reused.
    pub fn merged_with(
        &self,
        not_modified_headers: &HeaderMap,
        request_instant: SystemTime,
        response_instant: SystemTime,
    ) -> CacheEntry {
        let mut merged: Vec<(String, String)> = Vec::new();
        for (name, value) in &self.response_headers {
            let lowered = name.to_ascii_lowercase();
            if lowered == WARNING && value.trim_start().starts_with('1') {
                continue;
            }
            let replaced = not_modified_headers.contains_key(lowered.as_str())
                && !EXCLUDED_FROM_REVALIDATION_UPDATE
                    .contains(&lowered.as_str());
            if !replaced {
                merged.push((name.clone(), value.clone()));
            }
        }
        for (name, value) in not_modified_headers {
            if EXCLUDED_FROM_REVALIDATION_UPDATE.contains(&name.as_str()) {
                continue;
            }
            if let Ok(value) = value.to_str() {
                merged.push((name.as_str().to_string(), value.to_string()));
            }
        }

        let mut updated = self.clone();
        updated.request_instant = request_instant;
        updated.response_instant = response_instant.max(request_instant);
        updated.response_headers = merged;
        updated
    }

    /// Rebuilds an [`HeaderMap`] from the stored response headers, skipping
    /// anything that no longer parses.
    pub fn response_header_map(&self) -> Result<HeaderMap> {
        headers_from_vec(&self.response_headers)
    }
}

/// A lookup result: the concrete entry plus the keys it was found under.
#[derive(Debug, Clone)]
pub struct Hit {
    /// Key of the concrete entry (a variant key for negotiated responses)
    pub key: String,
    /// Root key derived from the request
    pub root_key: String,
    /// The stored entry
    pub entry: CacheEntry,
}

/// Flattens a header map into wire-ordered name/value pairs, dropping
/// values that are not valid UTF-8.
pub fn headers_to_vec(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

/// Rebuilds a header map from stored pairs.
pub fn headers_from_vec(pairs: &[(String, String)]) -> Result<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        let name: HeaderName = name.parse()?;
        let value: HeaderValue = value.parse()?;
        headers.append(name, value);
    }
    Ok(headers)
}

pub(crate) mod epoch_millis {
    //! `SystemTime` as milliseconds since the Unix epoch, matching the
    //! `HC-Request-Instant` / `HC-Response-Instant` wire metadata.
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        t: &SystemTime,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u64(to_millis(*t))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<SystemTime, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(from_millis(millis))
    }

    pub fn to_millis(t: SystemTime) -> u64 {
        t.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
    }

    pub fn from_millis(millis: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_with_headers(headers: &[(&str, &str)]) -> CacheEntry {
        CacheEntry::new(
            SystemTime::now(),
            SystemTime::now(),
            "GET",
            "http://example.com/".into(),
            vec![],
            200,
            headers
                .iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
            Some(Resource::new("body")),
        )
    }

    #[test]
    fn instants_are_clamped() {
        let later = SystemTime::now();
        let earlier = later - Duration::from_secs(5);
        let entry = CacheEntry::new(
            later,
            earlier,
            "get",
            "http://example.com/".into(),
            vec![],
            200,
            vec![],
            None,
        );
        assert!(entry.response_instant >= entry.request_instant);
        assert_eq!(entry.request_method, "GET");
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let entry = entry_with_headers(&[("ETag", "\"v1\""), ("Vary", "Accept-Encoding, Accept")]);
        assert_eq!(entry.etag(), Some("\"v1\""));
        assert_eq!(entry.header("etag"), Some("\"v1\""));
        assert_eq!(
            entry.vary_fields(),
            vec!["Accept-Encoding".to_string(), "Accept".to_string()]
        );
    }

    #[test]
    fn merge_replaces_and_keeps_headers() {
        let entry = entry_with_headers(&[
            ("Date", "Mon, 01 Jan 2024 00:00:00 GMT"),
            ("Content-Length", "4"),
            ("X-Custom", "kept"),
            ("Warning", "110 - \"stale\""),
        ]);
        let mut fresh = HeaderMap::new();
        fresh.insert("date", "Tue, 02 Jan 2024 00:00:00 GMT".parse().unwrap());
        fresh.insert("content-length", "999".parse().unwrap());

        let now = SystemTime::now();
        let merged = entry.merged_with(&fresh, now, now);
        assert_eq!(merged.header("date"), Some("Tue, 02 Jan 2024 00:00:00 GMT"));
        // body-describing headers keep their stored values
        assert_eq!(merged.header("content-length"), Some("4"));
        assert_eq!(merged.header("x-custom"), Some("kept"));
        // 1xx warnings are dropped on update
        assert_eq!(merged.header("warning"), None);
        assert_eq!(merged.status, 200);
        assert_eq!(merged.resource, entry.resource);
    }

    #[test]
    fn epoch_millis_round_trip() {
        let t = epoch_millis::from_millis(1_700_000_000_123);
        assert_eq!(epoch_millis::to_millis(t), 1_700_000_000_123);
    }

    /// Structured back-ends persist entries through serde rather than the
    /// byte-oriented wire format; the whole model has to survive that trip.
    #[test]
    fn entries_round_trip_through_serde() {
        let request_instant =
            epoch_millis::from_millis(1_700_000_000_000);
        let mut entry = CacheEntry::new(
            request_instant,
            request_instant + Duration::from_millis(250),
            "GET",
            "http://example.com/".into(),
            vec![("accept-encoding".into(), "gzip".into())],
            200,
            vec![
                ("etag".into(), "\"v1\"".into()),
                ("vary".into(), "Accept-Encoding".into()),
            ],
            Some(Resource::new(&b"body"[..])),
        );
        entry.variants =
            Some(["{accept-encoding=gzip}".to_string()].into_iter().collect());

        let json = serde_json::to_value(&entry).unwrap();
        // instants travel as integer epoch millis
        assert_eq!(
            json["request_instant"].as_u64(),
            Some(1_700_000_000_000)
        );
        assert_eq!(
            json["response_instant"].as_u64(),
            Some(1_700_000_000_250)
        );

        let parsed: CacheEntry = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, entry);
    }
}
