//! Freshness arithmetic (RFC 7234 §4.2).
//!
//! The age calculation follows the RFC formula, including
//! `corrected_initial_age = max(apparent_age, corrected_age_value) +
//! response_delay`. The arithmetic is exposed as free functions over a
//! [`CacheEntry`], with the configurable pieces gathered on
//! [`ValidityPolicy`], so tests can exercise each step in isolation.

use std::time::{Duration, SystemTime};

use crate::cache_control::ResponseCacheControl;
use crate::entry::CacheEntry;

/// Sentinel age used when a response carries no `Date` header: the entry is
/// treated as maximally old rather than freshly minted.
pub const MAX_AGE: Duration = Duration::from_secs(i32::MAX as u64);

/// `max(0, response_instant − Date)`; [`MAX_AGE`] when `Date` is absent or
/// unparseable.
pub fn apparent_age(entry: &CacheEntry) -> Duration {
    match entry.date() {
        Some(date) => entry
            .response_instant
            .duration_since(date)
            .unwrap_or(Duration::ZERO),
        None => MAX_AGE,
    }
}

/// The `Age` header in seconds. Parse failures and negative values count as
/// zero; when a single `Age` value contains multiple well-formed
/// comma-separated values, the first wins.
pub fn corrected_age_value(entry: &CacheEntry) -> Duration {
    let secs = entry
        .header("age")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    Duration::from_secs(secs)
}

/// How long the origin exchange itself took.
pub fn response_delay(entry: &CacheEntry) -> Duration {
    entry
        .response_instant
        .duration_since(entry.request_instant)
        .unwrap_or(Duration::ZERO)
}

/// `max(apparent_age, corrected_age_value) + response_delay`, saturating at
/// [`MAX_AGE`].
pub fn corrected_initial_age(entry: &CacheEntry) -> Duration {
    apparent_age(entry)
        .max(corrected_age_value(entry))
        .saturating_add(response_delay(entry))
        .min(MAX_AGE)
}

/// Time the entry has been resident in this cache.
pub fn resident_time(entry: &CacheEntry, now: SystemTime) -> Duration {
    now.duration_since(entry.response_instant).unwrap_or(Duration::ZERO)
}

/// The entry's estimated current age.
pub fn current_age(entry: &CacheEntry, now: SystemTime) -> Duration {
    corrected_initial_age(entry)
        .saturating_add(resident_time(entry, now))
        .min(MAX_AGE)
}

/// Configuration for freshness evaluation
#[derive(Debug, Clone, Copy)]
pub struct ValidityPolicy {
    /// Evaluate from a shared-cache perspective (`s-maxage` applies)
    pub shared: bool,
    /// Whether heuristic freshness may substitute for explicit freshness
    pub heuristic_enabled: bool,
    /// Fraction of `Date − Last-Modified` used as heuristic lifetime
    pub heuristic_coefficient: f32,
    /// Heuristic lifetime when `Last-Modified` is unusable
    pub heuristic_default: Duration,
}

impl Default for ValidityPolicy {
    fn default() -> Self {
        Self {
            shared: false,
            heuristic_enabled: false,
            heuristic_coefficient: 0.1,
            heuristic_default: Duration::ZERO,
        }
    }
}

impl ValidityPolicy {
    /// Whether the response declares an explicit freshness lifetime.
    pub fn has_explicit_freshness(
        &self,
        cc: &ResponseCacheControl,
        entry: &CacheEntry,
    ) -> bool {
        (self.shared && cc.shared_max_age.is_some())
            || cc.max_age.is_some()
            || entry.header("expires").is_some()
    }

    /// The server-declared freshness lifetime, in priority order:
    /// `s-maxage` (shared caches), `max-age`, then `Expires − Date`
    /// clamped to zero. Absent all three, zero.
    pub fn freshness_lifetime(
        &self,
        cc: &ResponseCacheControl,
        entry: &CacheEntry,
    ) -> Duration {
        if self.shared {
            if let Some(secs) = cc.shared_max_age {
                return Duration::from_secs(secs);
            }
        }
        if let Some(secs) = cc.max_age {
            return Duration::from_secs(secs);
        }
        if let (Some(expires), Some(date)) = (
            entry
                .header("expires")
                .and_then(|v| httpdate::parse_http_date(v).ok()),
            entry.date(),
        ) {
            return expires.duration_since(date).unwrap_or(Duration::ZERO);
        }
        Duration::ZERO
    }

    /// Heuristic freshness: `coefficient × (Date − Last-Modified)` floored
    /// at zero, falling back to the configured default. `None` when
    /// heuristics are disabled or the response has explicit freshness.
    pub fn heuristic_freshness(
        &self,
        cc: &ResponseCacheControl,
        entry: &CacheEntry,
    ) -> Option<Duration> {
        if !self.heuristic_enabled || self.has_explicit_freshness(cc, entry) {
            return None;
        }
        let from_validator = entry
            .last_modified()
            .and_then(|v| httpdate::parse_http_date(v).ok())
            .zip(entry.date())
            .and_then(|(last_modified, date)| {
                date.duration_since(last_modified).ok()
            })
            .map(|age| {
                let secs =
                    age.as_secs_f64() * f64::from(self.heuristic_coefficient);
                Duration::from_secs(secs.max(0.0) as u64)
            });
        Some(from_validator.unwrap_or(self.heuristic_default))
    }

    /// The lifetime actually used for suitability: explicit freshness when
    /// declared, the heuristic candidate otherwise.
    pub fn effective_freshness_lifetime(
        &self,
        cc: &ResponseCacheControl,
        entry: &CacheEntry,
    ) -> Duration {
        if self.has_explicit_freshness(cc, entry) {
            self.freshness_lifetime(cc, entry)
        } else {
            self.heuristic_freshness(cc, entry).unwrap_or(Duration::ZERO)
        }
    }

    /// An entry is fresh while its current age is below its lifetime.
    pub fn is_fresh(
        &self,
        cc: &ResponseCacheControl,
        entry: &CacheEntry,
        now: SystemTime,
    ) -> bool {
        current_age(entry, now) < self.effective_freshness_lifetime(cc, entry)
    }
}
