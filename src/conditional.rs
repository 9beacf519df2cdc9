//! Construction of revalidation requests.

use http::header::{HeaderMap, HeaderValue, CACHE_CONTROL, PRAGMA};
use http::{request, Version};

use crate::cache_control::ResponseCacheControl;
use crate::entry::CacheEntry;
use crate::error::Result;

const IF_PREFIXED: &[&str] = &[
    "if-none-match",
    "if-modified-since",
    "if-match",
    "if-unmodified-since",
    "if-range",
];

/// Whether the client supplied its own validators; such conditionals are
/// answered end-to-end and their `304`s pass through unchanged.
pub fn is_client_conditional(parts: &request::Parts) -> bool {
    parts.headers.contains_key("if-none-match")
        || parts.headers.contains_key("if-modified-since")
}

/// Builds the conditional revalidation request for a stored entry.
///
/// The base request's method and URI are kept, prior `If-*` and `Range`
/// headers are dropped, and the entry's validators are injected. When the
/// stored response demands end-to-end revalidation, `Cache-Control:
/// max-age=0` is appended so intermediaries revalidate too.
pub fn conditional_request(
    parts: &request::Parts,
    entry: &CacheEntry,
    response_cc: &ResponseCacheControl,
    shared: bool,
) -> Result<request::Parts> {
    let mut out = parts.clone();
    out.headers = strip_conditional_headers(&parts.headers);

    if let Some(etag) = entry.etag() {
        out.headers
            .insert("if-none-match", HeaderValue::from_str(etag)?);
    }
    if let Some(last_modified) = entry.last_modified() {
        out.headers.insert(
            "if-modified-since",
            HeaderValue::from_str(last_modified)?,
        );
    }
    if response_cc.must_revalidate || (shared && response_cc.proxy_revalidate)
    {
        out.headers
            .append(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
    }
    Ok(out)
}

/// Builds a revalidation request covering every stored variant of a root:
/// the `If-None-Match` lists each variant's `ETag` so the origin can pick
/// one with a `304`.
pub fn variant_conditional_request(
    parts: &request::Parts,
    variants: &[CacheEntry],
) -> Result<request::Parts> {
    let mut out = parts.clone();
    out.headers = strip_conditional_headers(&parts.headers);

    let etags: Vec<&str> =
        variants.iter().filter_map(CacheEntry::etag).collect();
    if !etags.is_empty() {
        out.headers.insert(
            "if-none-match",
            HeaderValue::from_str(&etags.join(", "))?,
        );
    }
    Ok(out)
}

/// Builds the forced-refresh request: no validators, explicit `no-cache`
/// on both header generations, HTTP/1.1.
pub fn unconditional_request(parts: &request::Parts) -> request::Parts {
    let mut out = parts.clone();
    out.headers = strip_conditional_headers(&parts.headers);
    out.headers
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    out.headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    out.version = Version::HTTP_11;
    out
}

fn strip_conditional_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if IF_PREFIXED.contains(&name.as_str()) || name.as_str() == "range" {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}
