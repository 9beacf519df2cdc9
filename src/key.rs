//! Cache key derivation.
//!
//! Every request maps to a canonical *root key*
//! (`scheme://host[:port]/path?query`). Responses negotiated via `Vary`
//! additionally get a *variant key*: a `{field=value&…}` discriminator
//! built from the request headers the origin declared significant,
//! prepended to the root key.

use http::header::HeaderMap;
use http::request;

use crate::error::{CacheError, Result};

/// The discriminator stored for `Vary: *` responses. A literal `*` can
/// never be a header name, so this discriminator matches no request.
pub const NEVER_MATCHING_DISCRIMINATOR: &str = "{*}";

/// Derives the canonical root cache key for a request.
///
/// The host is lowercased, the default port for the scheme is elided, the
/// path and query are preserved verbatim and any fragment is dropped.
/// Relative request targets fall back to the `Host` header with an assumed
/// `http` scheme.
pub fn root_key(parts: &request::Parts) -> Result<String> {
    let uri = &parts.uri;
    let scheme =
        uri.scheme_str().map(str::to_ascii_lowercase).unwrap_or_else(|| "http".into());

    let (host, mut port) = match uri.host() {
        Some(host) => (host.to_ascii_lowercase(), uri.port_u16()),
        None => {
            let raw = parts
                .headers
                .get(http::header::HOST)
                .and_then(|v| v.to_str().ok())
                .ok_or(CacheError::InvalidRequestUri)?;
            split_host_port(raw)?
        }
    };
    if host.is_empty() {
        return Err(CacheError::InvalidRequestUri);
    }
    if port == default_port(&scheme) {
        port = None;
    }

    let path = match uri.path() {
        "" => "/",
        p => p,
    };

    let mut key = String::with_capacity(
        scheme.len() + host.len() + path.len() + 16,
    );
    key.push_str(&scheme);
    key.push_str("://");
    key.push_str(&host);
    if let Some(port) = port {
        key.push(':');
        key.push_str(&port.to_string());
    }
    key.push_str(path);
    if let Some(query) = uri.query() {
        key.push('?');
        key.push_str(query);
    }
    Ok(key)
}

/// Root key for a URI referenced by a response header (e.g.
/// `Content-Location`), resolved against the requesting exchange. Returns
/// `None` when the reference crosses origins or cannot be parsed.
pub fn referenced_root_key(
    reference: &str,
    request_parts: &request::Parts,
) -> Option<String> {
    let base = root_key(request_parts).ok()?;
    let base_url = url::Url::parse(&base).ok()?;
    let resolved = base_url.join(reference.trim()).ok()?;
    if resolved.scheme() != base_url.scheme()
        || resolved.host_str() != base_url.host_str()
        || resolved.port_or_known_default() != base_url.port_or_known_default()
    {
        return None;
    }
    let mut key = format!(
        "{}://{}",
        resolved.scheme(),
        resolved.host_str().unwrap_or_default()
    );
    if let (Some(port), Some(known)) =
        (resolved.port_or_known_default(), default_port(resolved.scheme()))
    {
        if port != known {
            key.push(':');
            key.push_str(&port.to_string());
        }
    } else if let Some(port) = resolved.port() {
        key.push(':');
        key.push_str(&port.to_string());
    }
    key.push_str(resolved.path());
    if let Some(query) = resolved.query() {
        key.push('?');
        key.push_str(query);
    }
    Some(key)
}

fn split_host_port(raw: &str) -> Result<(String, Option<u16>)> {
    let raw = raw.trim();
    match raw.rsplit_once(':') {
        Some((host, port)) if port.bytes().all(|b| b.is_ascii_digit()) => {
            let port =
                port.parse().map_err(|_| CacheError::InvalidRequestUri)?;
            Ok((host.to_ascii_lowercase(), Some(port)))
        }
        _ => Ok((raw.to_ascii_lowercase(), None)),
    }
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

/// Canonicalizes a header field value for variant comparison: the value is
/// split on commas, each element trimmed and lowercased, duplicates
/// removed, and the elements re-joined.
pub fn canonicalize_field_value(raw: &str) -> String {
    let mut seen: Vec<String> = Vec::new();
    for element in raw.split(',') {
        let element = element.trim().to_ascii_lowercase();
        if element.is_empty() || seen.contains(&element) {
            continue;
        }
        seen.push(element);
    }
    seen.join(",")
}

/// Collects every field value of `name` from a header map and
/// canonicalizes the concatenation. Absent headers canonicalize to the
/// empty string.
pub fn canonical_header_value(headers: &HeaderMap, name: &str) -> String {
    let joined = headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect::<Vec<_>>()
        .join(",");
    canonicalize_field_value(&joined)
}

/// Builds the `{field=value&…}` variant discriminator for a request, given
/// the header names listed in a stored response's `Vary`.
///
/// Field names are sorted case-insensitively; each value is canonicalized
/// via [`canonicalize_field_value`]. `Vary: *` yields
/// [`NEVER_MATCHING_DISCRIMINATOR`].
pub fn variant_discriminator(
    vary_fields: &[String],
    request_headers: &HeaderMap,
) -> String {
    if vary_fields.iter().any(|f| f == "*") {
        return NEVER_MATCHING_DISCRIMINATOR.to_string();
    }
    let mut names: Vec<String> =
        vary_fields.iter().map(|f| f.to_ascii_lowercase()).collect();
    names.sort();
    names.dedup();

    let mut out = String::from("{");
    for (i, name) in names.iter().enumerate() {
        if i > 0 {
            out.push('&');
        }
        out.push_str(name);
        out.push('=');
        out.push_str(&canonical_header_value(request_headers, name));
    }
    out.push('}');
    out
}

/// A variant entry lives at its discriminator prepended to the root key.
pub fn variant_key(discriminator: &str, root_key: &str) -> String {
    format!("{discriminator}{root_key}")
}
