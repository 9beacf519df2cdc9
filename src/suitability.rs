//! Deciding whether a stored entry satisfies a request.

use std::time::{Duration, SystemTime};

use http::{request, Method};

use crate::cache_control::{RequestCacheControl, ResponseCacheControl};
use crate::entry::CacheEntry;
use crate::freshness::{current_age, ValidityPolicy};
use crate::key::{canonical_header_value, canonicalize_field_value, root_key};

/// The verdict on a stored entry for a particular request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suitability {
    /// Serve from cache as-is
    Fresh,
    /// Stale, but within the request's `max-stale` tolerance; serve with a
    /// `110` warning
    FreshEnough,
    /// Past freshness; the caller decides between revalidation and the
    /// stale-serving escape hatches
    Stale,
    /// Request or response directives force end-to-end revalidation
    RevalidationRequired,
    /// The entry does not answer this request at all
    Mismatch,
}

/// Evaluates stored entries against requests
#[derive(Debug, Clone, Copy)]
pub struct SuitabilityChecker {
    /// Freshness arithmetic configuration
    pub validity: ValidityPolicy,
}

impl SuitabilityChecker {
    /// Runs the suitability decision for `entry` against the request.
    pub fn evaluate(
        &self,
        parts: &request::Parts,
        request_cc: &RequestCacheControl,
        response_cc: &ResponseCacheControl,
        entry: &CacheEntry,
        now: SystemTime,
    ) -> Suitability {
        if !self.request_matches(parts, entry) {
            return Suitability::Mismatch;
        }

        // a no-store request is never answered from the cache
        if request_cc.no_store {
            return Suitability::Mismatch;
        }
        if response_cc.no_cache {
            return Suitability::RevalidationRequired;
        }
        // a qualified no-cache only disqualifies entries actually carrying
        // one of the named fields
        if response_cc
            .no_cache_fields
            .iter()
            .any(|field| entry.header(field).is_some())
        {
            return Suitability::Mismatch;
        }
        if request_cc.no_cache {
            return Suitability::RevalidationRequired;
        }

        let age = current_age(entry, now);
        let lifetime =
            self.validity.effective_freshness_lifetime(response_cc, entry);

        if let Some(min_fresh) = request_cc.min_fresh {
            let remaining = lifetime.saturating_sub(age);
            if Duration::from_secs(min_fresh) > remaining {
                return Suitability::RevalidationRequired;
            }
        }
        if let Some(max_age) = request_cc.max_age {
            if Duration::from_secs(max_age) < age {
                return Suitability::RevalidationRequired;
            }
        }

        if age < lifetime {
            return Suitability::Fresh;
        }

        if response_cc.must_revalidate
            || (self.validity.shared && response_cc.proxy_revalidate)
        {
            return Suitability::RevalidationRequired;
        }
        if let Some(max_stale) = request_cc.max_stale {
            let staleness = age.saturating_sub(lifetime);
            if Duration::from_secs(max_stale) >= staleness {
                return Suitability::FreshEnough;
            }
        }
        Suitability::Stale
    }

    /// Whether the entry may stand in for an origin error (RFC 5861
    /// `stale-if-error`): true while the entry's staleness is within the
    /// applicable window. The request directive takes precedence over the
    /// response directive, which takes precedence over the configured
    /// default; a request `min-fresh` disables the escape hatch entirely.
    pub fn suitable_if_error(
        &self,
        request_cc: &RequestCacheControl,
        response_cc: &ResponseCacheControl,
        entry: &CacheEntry,
        default_window: Option<Duration>,
        now: SystemTime,
    ) -> bool {
        if request_cc.min_fresh.is_some() {
            return false;
        }
        let window = request_cc
            .stale_if_error
            .or(response_cc.stale_if_error)
            .map(Duration::from_secs)
            .or(default_window);
        let Some(window) = window else {
            return false;
        };
        let age = current_age(entry, now);
        let lifetime =
            self.validity.effective_freshness_lifetime(response_cc, entry);
        age.saturating_sub(lifetime) <= window
    }

    /// The request/entry matching contract: method, canonical URI and
    /// `Vary`-selected headers all have to line up.
    fn request_matches(
        &self,
        parts: &request::Parts,
        entry: &CacheEntry,
    ) -> bool {
        let method_ok = if parts.method == Method::GET {
            entry.request_method == "GET"
        } else if parts.method == Method::HEAD {
            entry.request_method == "GET" || entry.request_method == "HEAD"
        } else {
            false
        };
        if !method_ok {
            return false;
        }

        match root_key(parts) {
            Ok(key) if key == entry.request_uri => {}
            _ => return false,
        }

        self.vary_matches(parts, entry)
    }

    fn vary_matches(&self, parts: &request::Parts, entry: &CacheEntry) -> bool {
        variant_headers_match(parts, entry)
    }
}

/// Selecting-header comparison: every field named by the stored `Vary`
/// must canonicalize identically on both sides; `Vary: *` never matches;
/// an empty `Vary` matches everything.
pub(crate) fn variant_headers_match(
    parts: &request::Parts,
    entry: &CacheEntry,
) -> bool {
    for field in entry.vary_fields() {
        if field == "*" {
            return false;
        }
        let presented = canonical_header_value(&parts.headers, &field);
        let stored =
            canonicalize_field_value(&entry.request_header_joined(&field));
        if presented != stored {
            return false;
        }
    }
    true
}
