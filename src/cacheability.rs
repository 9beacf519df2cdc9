//! Deciding whether a response may enter the cache at all.

use http::header::{AUTHORIZATION, VIA};
use http::{request, response, Method, Version};

use crate::cache_control::{RequestCacheControl, ResponseCacheControl};

// rfc7231 6.1, minus 206: partial content is never stored by this cache
const STATUS_CACHEABLE_BY_DEFAULT: &[u16] =
    &[200, 203, 204, 300, 301, 404, 405, 410, 414, 501];

/// Decides whether a request/response exchange is storable
#[derive(Debug, Clone, Copy)]
pub struct CacheabilityPolicy {
    /// Evaluate from a shared-cache perspective
    pub shared: bool,
    /// `Content-Length` ceiling for stored bodies
    pub max_object_size: u64,
    /// Permit storing `303 See Other` responses without explicit freshness
    pub allow_303_caching: bool,
    /// Permit caching query-string GETs from HTTP/1.0 origins that declare
    /// explicit freshness
    pub allow_http10_query_caching: bool,
}

impl CacheabilityPolicy {
    /// Returns `true` when the response may be stored.
    pub fn response_is_storable(
        &self,
        request_parts: &request::Parts,
        request_cc: &RequestCacheControl,
        response_parts: &response::Parts,
        response_cc: &ResponseCacheControl,
    ) -> bool {
        if request_parts.method != Method::GET
            && request_parts.method != Method::HEAD
        {
            return false;
        }
        // no-store on either side forbids storing any part of the exchange
        if request_cc.no_store || response_cc.no_store {
            return false;
        }
        if self.shared && response_cc.cache_private {
            return false;
        }

        let has_freshness = self.has_explicit_freshness(response_cc, response_parts);
        let explicit_signal = has_freshness
            || response_cc.has_explicit_cache_signal();

        if !self.status_is_storable(
            response_parts.status.as_u16(),
            explicit_signal,
        ) {
            return false;
        }

        let authorized =
            request_parts.headers.contains_key(AUTHORIZATION);
        if self.shared && authorized {
            // only these directives re-permit storing authenticated
            // exchanges in a shared cache
            if !(response_cc.must_revalidate
                || response_cc.cache_public
                || response_cc.shared_max_age.is_some())
            {
                return false;
            }
            if is_vary_star(response_parts) {
                return false;
            }
        }

        if !self.header_multiplicity_ok(response_parts) {
            return false;
        }

        if let Some(length) = response_parts
            .headers
            .get(http::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
        {
            match length.trim().parse::<u64>() {
                Ok(length) if length <= self.max_object_size => {}
                _ => return false,
            }
        }

        if self.via_http10(response_parts)
            && request_parts.method == Method::GET
            && request_parts.uri.query().is_some()
            && !(has_freshness && self.allow_http10_query_caching)
        {
            return false;
        }

        true
    }

    fn has_explicit_freshness(
        &self,
        cc: &ResponseCacheControl,
        parts: &response::Parts,
    ) -> bool {
        (self.shared && cc.shared_max_age.is_some())
            || cc.max_age.is_some()
            || parts.headers.contains_key(http::header::EXPIRES)
    }

    fn status_is_storable(&self, status: u16, explicit_signal: bool) -> bool {
        if status == 206 {
            return false;
        }
        if STATUS_CACHEABLE_BY_DEFAULT.contains(&status) {
            return true;
        }
        if status == 303 && self.allow_303_caching {
            return true;
        }
        explicit_signal
    }

    /// A response with conflicting metadata headers is disqualified:
    /// more than one `Date` or `Expires`, more than one `Age`, or a `Date`
    /// that does not parse.
    fn header_multiplicity_ok(&self, parts: &response::Parts) -> bool {
        let dates = parts.headers.get_all(http::header::DATE).iter().count();
        if dates > 1 {
            return false;
        }
        if let Some(date) = parts.headers.get(http::header::DATE) {
            let parses = date
                .to_str()
                .ok()
                .and_then(|v| httpdate::parse_http_date(v).ok())
                .is_some();
            if !parses {
                return false;
            }
        }
        if parts.headers.get_all(http::header::EXPIRES).iter().count() > 1 {
            return false;
        }
        if parts.headers.get_all(http::header::AGE).iter().count() > 1 {
            return false;
        }
        true
    }

    /// HTTP/1.0 origins, directly or through a 1.0 proxy advertised in
    /// `Via`, get the conservative query-string treatment.
    fn via_http10(&self, parts: &response::Parts) -> bool {
        if parts.version == Version::HTTP_10 {
            return true;
        }
        parts
            .headers
            .get_all(VIA)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|hop| {
                let proto =
                    hop.trim().split_whitespace().next().unwrap_or_default();
                proto == "1.0" || proto.eq_ignore_ascii_case("HTTP/1.0")
            })
    }
}

fn is_vary_star(parts: &response::Parts) -> bool {
    parts
        .headers
        .get_all(http::header::VARY)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|f| f.trim() == "*")
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Request, Response};

    fn policy() -> CacheabilityPolicy {
        CacheabilityPolicy {
            shared: false,
            max_object_size: 8 * 1024 * 1024,
            allow_303_caching: false,
            allow_http10_query_caching: false,
        }
    }

    fn get(uri: &str) -> request::Parts {
        Request::builder().uri(uri).body(()).unwrap().into_parts().0
    }

    fn response(build: impl FnOnce(response::Builder) -> response::Builder) -> response::Parts {
        build(Response::builder()).body(()).unwrap().into_parts().0
    }

    fn storable(
        req: &request::Parts,
        resp: &response::Parts,
        policy: &CacheabilityPolicy,
    ) -> bool {
        policy.response_is_storable(
            req,
            &RequestCacheControl::from_headers(&req.headers),
            resp,
            &ResponseCacheControl::from_headers(&resp.headers),
        )
    }

    #[test]
    fn plain_200_get_is_storable() {
        let req = get("http://example.com/");
        let resp = response(|b| b.status(200));
        assert!(storable(&req, &resp, &policy()));
    }

    #[test]
    fn unsafe_methods_never_store() {
        let mut req = get("http://example.com/");
        req.method = Method::POST;
        let resp = response(|b| b.status(200).header("cache-control", "max-age=60"));
        assert!(!storable(&req, &resp, &policy()));
    }

    #[test]
    fn no_store_disqualifies() {
        let req = get("http://example.com/");
        let resp = response(|b| b.status(200).header("cache-control", "no-store"));
        assert!(!storable(&req, &resp, &policy()));

        let mut req = get("http://example.com/");
        req.headers.insert("cache-control", "no-store".parse().unwrap());
        let resp = response(|b| b.status(200));
        assert!(!storable(&req, &resp, &policy()));
    }

    #[test]
    fn partial_content_is_never_storable() {
        let req = get("http://example.com/");
        let resp = response(|b| {
            b.status(206).header("cache-control", "max-age=3600, public")
        });
        assert!(!storable(&req, &resp, &policy()));
    }

    #[test]
    fn redirects_need_explicit_freshness() {
        let req = get("http://example.com/");
        for status in [302, 303, 307] {
            let bare = response(|b| b.status(status));
            assert!(!storable(&req, &bare, &policy()), "{status} bare");
            let fresh = response(|b| {
                b.status(status).header("cache-control", "max-age=60")
            });
            assert!(storable(&req, &fresh, &policy()), "{status} with freshness");
        }
        // 303 can be opted in by configuration
        let resp = response(|b| b.status(303));
        let permissive =
            CacheabilityPolicy { allow_303_caching: true, ..policy() };
        assert!(storable(&req, &resp, &permissive));
    }

    #[test]
    fn authorized_shared_requests_need_opt_in() {
        let shared = CacheabilityPolicy { shared: true, ..policy() };
        let mut req = get("http://example.com/");
        req.headers.insert(AUTHORIZATION, "Bearer x".parse().unwrap());

        let resp = response(|b| b.status(200).header("cache-control", "max-age=60"));
        assert!(!storable(&req, &resp, &shared));

        for directive in ["public", "must-revalidate", "s-maxage=10"] {
            let resp = response(|b| {
                b.status(200)
                    .header("cache-control", format!("max-age=60, {directive}"))
            });
            assert!(storable(&req, &resp, &shared), "{directive}");
        }

        // private cache does not care
        assert!(storable(&req, &resp, &policy()));

        // Vary: * blocks authorized shared storage outright
        let resp = response(|b| {
            b.status(200)
                .header("cache-control", "max-age=60, public")
                .header("vary", "*")
        });
        assert!(!storable(&req, &resp, &shared));
    }

    #[test]
    fn private_responses_skip_shared_caches() {
        let shared = CacheabilityPolicy { shared: true, ..policy() };
        let req = get("http://example.com/");
        let resp = response(|b| {
            b.status(200).header("cache-control", "private, max-age=60")
        });
        assert!(!storable(&req, &resp, &shared));
        assert!(storable(&req, &resp, &policy()));
    }

    #[test]
    fn conflicting_metadata_headers_disqualify() {
        let req = get("http://example.com/");
        let now = httpdate::fmt_http_date(std::time::SystemTime::now());
        let resp = response(|b| {
            b.status(200).header("date", &now).header("date", &now)
        });
        assert!(!storable(&req, &resp, &policy()));

        let resp = response(|b| {
            b.status(200).header("age", "1").header("age", "2")
        });
        assert!(!storable(&req, &resp, &policy()));

        let resp = response(|b| b.status(200).header("date", "not a date"));
        assert!(!storable(&req, &resp, &policy()));

        let resp = response(|b| b.status(200).header("date", &now));
        assert!(storable(&req, &resp, &policy()));
    }

    #[test]
    fn oversized_bodies_are_rejected() {
        let small = CacheabilityPolicy { max_object_size: 10, ..policy() };
        let req = get("http://example.com/");
        let resp = response(|b| b.status(200).header("content-length", "11"));
        assert!(!storable(&req, &resp, &small));
        let resp = response(|b| b.status(200).header("content-length", "10"));
        assert!(storable(&req, &resp, &small));
        let resp = response(|b| b.status(200).header("content-length", "junk"));
        assert!(!storable(&req, &resp, &small));
    }

    #[test]
    fn http10_query_strings_are_conservative() {
        let req = get("http://example.com/search?q=x");
        let mut resp = response(|b| b.status(200).header("cache-control", "max-age=60"));
        resp.version = Version::HTTP_10;
        assert!(!storable(&req, &resp, &policy()));

        let permissive = CacheabilityPolicy {
            allow_http10_query_caching: true,
            ..policy()
        };
        assert!(storable(&req, &resp, &permissive));

        // a 1.0 hop advertised in Via triggers the same rule
        let resp = response(|b| {
            b.status(200)
                .header("cache-control", "max-age=60")
                .header("via", "1.0 fred")
        });
        assert!(!storable(&req, &resp, &policy()));

        // without a query string the rule does not apply
        let plain = get("http://example.com/search");
        assert!(storable(&plain, &resp, &policy()));
    }

    #[test]
    fn uncacheable_status_with_freshness_is_storable() {
        let req = get("http://example.com/");
        let resp = response(|b| b.status(418).header("cache-control", "max-age=60"));
        assert!(storable(&req, &resp, &policy()));
        let resp = response(|b| b.status(418));
        assert!(!storable(&req, &resp, &policy()));
    }
}
