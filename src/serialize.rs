//! Byte-oriented cache entry serialization.
//!
//! Back-ends that store raw bytes persist entries in an HTTP-like text
//! format: a magic/version line, `HC-*` metadata headers, the captured
//! request line and headers, the stored status line and headers, then the
//! body. On read, the caller's expected key is compared against the
//! recorded `HC-Key`; a mismatch is reported as a miss rather than an
//! error, which defends against back-ends that hash multiple keys onto one
//! slot.

use std::collections::BTreeSet;

use http::StatusCode;

use crate::entry::{epoch_millis, CacheEntry, Resource};
use crate::error::{CacheError, Result};

/// Magic prefix of every serialized entry.
pub const FORMAT_MAGIC: &str = "HttpClient CacheEntry";

/// Current serialization format version.
pub const FORMAT_VERSION: u32 = 1;

const CRLF: &str = "\r\n";

fn push_line(out: &mut Vec<u8>, line: &str) {
    out.extend_from_slice(line.as_bytes());
    out.extend_from_slice(CRLF.as_bytes());
}

/// Serializes an entry for a byte-oriented backend.
pub fn serialize_entry(key: &str, entry: &CacheEntry) -> Vec<u8> {
    let mut out = Vec::with_capacity(
        256 + entry.resource.as_ref().map_or(0, Resource::len),
    );
    push_line(&mut out, &format!("{FORMAT_MAGIC} {FORMAT_VERSION}"));
    push_line(&mut out, &format!("HC-Key: {key}"));
    if let Some(resource) = &entry.resource {
        push_line(
            &mut out,
            &format!("HC-Resource-Length: {}", resource.len()),
        );
    }
    push_line(
        &mut out,
        &format!(
            "HC-Request-Instant: {}",
            epoch_millis::to_millis(entry.request_instant)
        ),
    );
    push_line(
        &mut out,
        &format!(
            "HC-Response-Instant: {}",
            epoch_millis::to_millis(entry.response_instant)
        ),
    );
    for variant in entry.variants.iter().flatten() {
        push_line(&mut out, &format!("HC-Variant: {variant}"));
    }
    out.extend_from_slice(CRLF.as_bytes());

    push_line(
        &mut out,
        &format!("{} {} HTTP/1.1", entry.request_method, entry.request_uri),
    );
    for (name, value) in &entry.request_headers {
        push_line(&mut out, &format!("{name}: {value}"));
    }
    out.extend_from_slice(CRLF.as_bytes());

    let reason = StatusCode::from_u16(entry.status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("");
    push_line(&mut out, &format!("HTTP/1.1 {} {}", entry.status, reason));
    for (name, value) in &entry.response_headers {
        push_line(&mut out, &format!("{name}: {value}"));
    }
    out.extend_from_slice(CRLF.as_bytes());

    if let Some(resource) = &entry.resource {
        out.extend_from_slice(resource.bytes());
    }
    out
}

/// Deserializes an entry previously written by [`serialize_entry`].
///
/// Returns `Ok(None)` when the recorded `HC-Key` differs from
/// `expected_key` — the slot held somebody else's entry and the lookup is
/// treated as a miss.
pub fn deserialize_entry(
    expected_key: &str,
    bytes: &[u8],
) -> Result<Option<CacheEntry>> {
    let mut cursor = Cursor { bytes, pos: 0 };

    let magic = cursor.line()?;
    let version = magic
        .strip_prefix(FORMAT_MAGIC)
        .map(str::trim)
        .and_then(|v| v.parse::<u32>().ok())
        .ok_or(CacheError::MalformedEntry("bad magic line"))?;
    if version != FORMAT_VERSION {
        return Err(CacheError::MalformedEntry("unsupported format version"));
    }

    let mut key = None;
    let mut resource_length: Option<usize> = None;
    let mut request_instant = None;
    let mut response_instant = None;
    let mut variants: BTreeSet<String> = BTreeSet::new();
    loop {
        let line = cursor.line()?;
        if line.is_empty() {
            break;
        }
        let (name, value) = split_header(&line)?;
        match name.to_ascii_lowercase().as_str() {
            "hc-key" => key = Some(value.to_string()),
            "hc-resource-length" => {
                resource_length = Some(value.parse().map_err(|_| {
                    CacheError::MalformedEntry("bad resource length")
                })?);
            }
            "hc-request-instant" => {
                request_instant = Some(parse_instant(value)?);
            }
            "hc-response-instant" => {
                response_instant = Some(parse_instant(value)?);
            }
            "hc-variant" => {
                variants.insert(value.to_string());
            }
            _ => {}
        }
    }
    let key = key.ok_or(CacheError::MalformedEntry("missing HC-Key"))?;
    if key != expected_key {
        log::debug!(
            "cache entry key collision: expected {expected_key:?}, found {key:?}"
        );
        return Ok(None);
    }
    let request_instant = request_instant
        .ok_or(CacheError::MalformedEntry("missing HC-Request-Instant"))?;
    let response_instant = response_instant
        .ok_or(CacheError::MalformedEntry("missing HC-Response-Instant"))?;

    let request_line = cursor.line()?;
    let mut request_parts = request_line.splitn(3, ' ');
    let request_method = request_parts
        .next()
        .filter(|m| !m.is_empty())
        .ok_or(CacheError::MalformedEntry("bad request line"))?
        .to_string();
    let request_uri = request_parts
        .next()
        .ok_or(CacheError::MalformedEntry("bad request line"))?
        .to_string();
    let request_headers = cursor.header_block()?;

    let status_line = cursor.line()?;
    let status = status_line
        .split(' ')
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or(CacheError::MalformedEntry("bad status line"))?;
    let response_headers = cursor.header_block()?;

    let resource = match resource_length {
        Some(length) => {
            let body = cursor.take(length)?;
            Some(Resource::new(body.to_vec()))
        }
        None => None,
    };

    let mut entry = CacheEntry::new(
        request_instant,
        response_instant,
        &request_method,
        request_uri,
        request_headers,
        status,
        response_headers,
        resource,
    );
    if !variants.is_empty() {
        entry.variants = Some(variants);
    }
    Ok(Some(entry))
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    /// Reads one line, accepting either CRLF or bare LF endings.
    fn line(&mut self) -> Result<String> {
        let rest = &self.bytes[self.pos.min(self.bytes.len())..];
        let end = rest
            .iter()
            .position(|&b| b == b'\n')
            .ok_or(CacheError::MalformedEntry("truncated entry"))?;
        let mut line = &rest[..end];
        if line.last() == Some(&b'\r') {
            line = &line[..line.len() - 1];
        }
        self.pos += end + 1;
        String::from_utf8(line.to_vec())
            .map_err(|_| CacheError::MalformedEntry("non-utf8 line"))
    }

    fn header_block(&mut self) -> Result<Vec<(String, String)>> {
        let mut out = Vec::new();
        loop {
            let line = self.line()?;
            if line.is_empty() {
                return Ok(out);
            }
            let (name, value) = split_header(&line)?;
            out.push((name.to_string(), value.to_string()));
        }
    }

    fn take(&mut self, length: usize) -> Result<&[u8]> {
        let end = self
            .pos
            .checked_add(length)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(CacheError::MalformedEntry("truncated body"))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }
}

fn split_header(line: &str) -> Result<(&str, &str)> {
    let (name, value) = line
        .split_once(':')
        .ok_or(CacheError::MalformedEntry("bad header line"))?;
    Ok((name.trim(), value.trim()))
}

fn parse_instant(value: &str) -> Result<std::time::SystemTime> {
    value
        .parse::<u64>()
        .map(epoch_millis::from_millis)
        .map_err(|_| CacheError::MalformedEntry("bad instant"))
}
