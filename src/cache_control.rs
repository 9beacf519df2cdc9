//! `Cache-Control` directive parsing.
//!
//! Directives are parsed across every instance of the header into typed
//! records. Unknown directives are ignored, malformed values degrade the
//! affected field to unset, and a later well-formed occurrence of a
//! directive wins over an earlier one.

use http::header::{HeaderMap, CACHE_CONTROL, PRAGMA};

/// Directives parsed from a request `Cache-Control` header
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestCacheControl {
    /// `max-age=<seconds>`: the client refuses responses older than this
    pub max_age: Option<u64>,
    /// `max-stale=<seconds>`: the client tolerates this much staleness
    pub max_stale: Option<u64>,
    /// `min-fresh=<seconds>`: the client wants this much remaining freshness
    pub min_fresh: Option<u64>,
    /// `stale-if-error=<seconds>` (RFC 5861)
    pub stale_if_error: Option<u64>,
    /// `no-cache`: force end-to-end revalidation
    pub no_cache: bool,
    /// `no-store`: neither serve this request from cache nor store its response
    pub no_store: bool,
    /// `only-if-cached`: never contact the origin
    pub only_if_cached: bool,
}

impl RequestCacheControl {
    /// Parses the request directives out of a header map.
    ///
    /// A `Pragma: no-cache` on a request without any `Cache-Control` header
    /// is honored as `no-cache`.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut parsed = Self::parse(
            headers.get_all(CACHE_CONTROL).iter().filter_map(|v| v.to_str().ok()),
        );
        if !headers.contains_key(CACHE_CONTROL)
            && headers
                .get(PRAGMA)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.to_ascii_lowercase().contains("no-cache"))
        {
            parsed.no_cache = true;
        }
        parsed
    }

    /// Parses request directives out of raw header values.
    pub fn parse<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        let mut cc = Self::default();
        for directive in scan_directives(values) {
            match directive.name.as_str() {
                "max-age" => cc.max_age = directive.seconds(),
                "max-stale" => cc.max_stale = directive.seconds(),
                "min-fresh" => cc.min_fresh = directive.seconds(),
                "stale-if-error" => cc.stale_if_error = directive.seconds(),
                "no-cache" => cc.no_cache = true,
                "no-store" => cc.no_store = true,
                "only-if-cached" => cc.only_if_cached = true,
                _ => {}
            }
        }
        cc
    }
}

/// Directives parsed from a response `Cache-Control` header
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseCacheControl {
    /// `max-age=<seconds>`
    pub max_age: Option<u64>,
    /// `s-maxage=<seconds>`: overrides `max-age` for shared caches
    pub shared_max_age: Option<u64>,
    /// `stale-while-revalidate=<seconds>` (RFC 5861)
    pub stale_while_revalidate: Option<u64>,
    /// `stale-if-error=<seconds>` (RFC 5861)
    pub stale_if_error: Option<u64>,
    /// Unqualified `no-cache`: revalidate before every reuse
    pub no_cache: bool,
    /// `no-store`
    pub no_store: bool,
    /// `must-revalidate`
    pub must_revalidate: bool,
    /// `proxy-revalidate`
    pub proxy_revalidate: bool,
    /// `private`
    pub cache_private: bool,
    /// `public`
    pub cache_public: bool,
    /// `immutable`
    pub immutable: bool,
    /// Field names from a qualified `no-cache="f1, f2"`; these fields are
    /// stripped from responses served out of cache
    pub no_cache_fields: Vec<String>,
}

impl ResponseCacheControl {
    /// Parses the response directives out of a header map.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self::parse(
            headers.get_all(CACHE_CONTROL).iter().filter_map(|v| v.to_str().ok()),
        )
    }

    /// Parses response directives out of raw header values.
    ///
    /// A malformed `max-age` value forces `Some(0)` rather than unset, so a
    /// garbled lifetime renders the response immediately stale instead of
    /// freshness-less.
    pub fn parse<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        let mut cc = Self::default();
        for directive in scan_directives(values) {
            match directive.name.as_str() {
                "max-age" => cc.max_age = directive.seconds().or(Some(0)),
                "s-maxage" => cc.shared_max_age = directive.seconds(),
                "stale-while-revalidate" => {
                    cc.stale_while_revalidate = directive.seconds();
                }
                "stale-if-error" => cc.stale_if_error = directive.seconds(),
                "no-cache" => match directive.value.as_deref() {
                    // a quoted list supplies the complete field set
                    Some(fields) if directive.quoted => {
                        cc.no_cache_fields = fields
                            .split(',')
                            .map(|f| f.trim().to_ascii_lowercase())
                            .filter(|f| !f.is_empty())
                            .collect();
                    }
                    // an unquoted value names a single field; anything after
                    // a comma already re-entered the directive stream
                    Some(field) if !field.is_empty() => {
                        cc.no_cache_fields =
                            vec![field.to_ascii_lowercase()];
                    }
                    _ => cc.no_cache = true,
                },
                "no-store" => cc.no_store = true,
                "must-revalidate" => cc.must_revalidate = true,
                "proxy-revalidate" => cc.proxy_revalidate = true,
                "private" => cc.cache_private = true,
                "public" => cc.cache_public = true,
                "immutable" => cc.immutable = true,
                _ => {}
            }
        }
        cc
    }

    /// Whether the response carries any explicit freshness or cacheability
    /// signal (used by the cacheability policy for otherwise-uncacheable
    /// status codes).
    pub fn has_explicit_cache_signal(&self) -> bool {
        self.max_age.is_some()
            || self.shared_max_age.is_some()
            || self.must_revalidate
            || self.proxy_revalidate
            || self.cache_public
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Directive {
    name: String,
    value: Option<String>,
    quoted: bool,
}

impl Directive {
    /// Non-negative integer seconds; only pure digit strings are accepted.
    /// On unexpected separators (e.g. `max-age=100 200`) only the first
    /// whitespace-separated token counts.
    fn seconds(&self) -> Option<u64> {
        let raw = self.value.as_deref()?;
        let first = raw.split_ascii_whitespace().next()?;
        if first.is_empty() || !first.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        first.parse().ok()
    }
}

/// Splits one or more raw `Cache-Control` values into directives.
///
/// Grammar: `directive *( "," directive )` where each directive is `token`
/// or `token "=" ( token / quoted-string )`. Quoted strings may contain
/// commas and `\`-escaped quotes.
fn scan_directives<'a>(
    values: impl IntoIterator<Item = &'a str>,
) -> Vec<Directive> {
    let mut out = Vec::new();
    for raw in values {
        let mut chars = raw.chars().peekable();
        loop {
            // skip separators
            while matches!(chars.peek(), Some(c) if *c == ',' || c.is_ascii_whitespace())
            {
                chars.next();
            }
            if chars.peek().is_none() {
                break;
            }
            let mut name = String::new();
            while let Some(&c) = chars.peek() {
                if c == '=' || c == ',' {
                    break;
                }
                name.push(c);
                chars.next();
            }
            let name = name.trim().to_ascii_lowercase();
            let mut value = None;
            let mut quoted = false;
            if chars.peek() == Some(&'=') {
                chars.next();
                if chars.peek() == Some(&'"') {
                    chars.next();
                    quoted = true;
                    let mut v = String::new();
                    while let Some(c) = chars.next() {
                        match c {
                            '\\' => {
                                if let Some(escaped) = chars.next() {
                                    v.push(escaped);
                                }
                            }
                            '"' => break,
                            _ => v.push(c),
                        }
                    }
                    value = Some(v);
                } else {
                    let mut v = String::new();
                    while let Some(&c) = chars.peek() {
                        if c == ',' {
                            break;
                        }
                        v.push(c);
                        chars.next();
                    }
                    value = Some(v.trim().to_string());
                }
            }
            if !name.is_empty() {
                out.push(Directive { name, value, quoted });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(raw: &str) -> RequestCacheControl {
        RequestCacheControl::parse([raw])
    }

    fn res(raw: &str) -> ResponseCacheControl {
        ResponseCacheControl::parse([raw])
    }

    #[test]
    fn parses_request_directives() {
        let cc = req("max-age=60, min-fresh=5, no-store, only-if-cached");
        assert_eq!(cc.max_age, Some(60));
        assert_eq!(cc.min_fresh, Some(5));
        assert!(cc.no_store);
        assert!(cc.only_if_cached);
        assert!(!cc.no_cache);
        assert_eq!(cc.max_stale, None);
    }

    #[test]
    fn unknown_directives_are_ignored() {
        let cc = res("max-age=10, x-fancy=yes, frobnicate");
        assert_eq!(cc.max_age, Some(10));
        assert_eq!(cc, res("max-age=10"));
    }

    #[test]
    fn last_well_formed_duplicate_wins() {
        assert_eq!(req("max-age=10, max-age=20").max_age, Some(20));
        // malformed later occurrence degrades the field
        assert_eq!(req("max-age=10, max-age=abc").max_age, None);
        assert_eq!(res("max-age=10, max-age=abc").max_age, Some(0));
    }

    #[test]
    fn malformed_seconds_degrade() {
        assert_eq!(req("max-age=").max_age, None);
        assert_eq!(req("max-age=;").max_age, None);
        assert_eq!(req("max-age=-5").max_age, None);
        assert_eq!(req("max-age=1.5").max_age, None);
        // response max-age is special-cased to immediate staleness
        assert_eq!(res("max-age=").max_age, Some(0));
        assert_eq!(res("max-age=;").max_age, Some(0));
        assert_eq!(res("s-maxage=bogus").shared_max_age, None);
    }

    #[test]
    fn space_separated_numerics_take_first() {
        assert_eq!(req("max-age=100 200").max_age, Some(100));
        assert_eq!(res("max-age=100 200").max_age, Some(100));
    }

    #[test]
    fn qualified_no_cache_yields_field_set() {
        let cc = res("no-cache=\"Set-Cookie, WWW-Authenticate\"");
        assert!(!cc.no_cache);
        assert_eq!(cc.no_cache_fields, vec!["set-cookie", "www-authenticate"]);
    }

    #[test]
    fn unquoted_no_cache_list_takes_first_field_only() {
        // the second token re-enters the stream as an unknown directive
        let cc = res("no-cache=set-cookie,age");
        assert!(!cc.no_cache);
        assert_eq!(cc.no_cache_fields, vec!["set-cookie"]);
        let bare = res("no-cache");
        assert!(bare.no_cache);
        assert!(bare.no_cache_fields.is_empty());
        // an empty value degrades to the unqualified form
        assert!(res("no-cache=").no_cache);
    }

    #[test]
    fn quoted_strings_handle_escapes() {
        let cc = res("no-cache=\"a\\\"b\"");
        assert_eq!(cc.no_cache_fields, vec!["a\"b"]);
    }

    #[test]
    fn multiple_header_instances_accumulate() {
        let cc =
            ResponseCacheControl::parse(["max-age=30", "must-revalidate"]);
        assert_eq!(cc.max_age, Some(30));
        assert!(cc.must_revalidate);
    }

    #[test]
    fn response_flags() {
        let cc = res(
            "private, public, immutable, proxy-revalidate, no-store, \
             stale-while-revalidate=30, stale-if-error=60",
        );
        assert!(cc.cache_private);
        assert!(cc.cache_public);
        assert!(cc.immutable);
        assert!(cc.proxy_revalidate);
        assert!(cc.no_store);
        assert_eq!(cc.stale_while_revalidate, Some(30));
        assert_eq!(cc.stale_if_error, Some(60));
    }

    #[test]
    fn pragma_no_cache_applies_without_cache_control() {
        let mut headers = HeaderMap::new();
        headers.insert(PRAGMA, "no-cache".parse().unwrap());
        assert!(RequestCacheControl::from_headers(&headers).no_cache);

        headers.insert(CACHE_CONTROL, "max-age=1".parse().unwrap());
        assert!(!RequestCacheControl::from_headers(&headers).no_cache);
    }

    #[test]
    fn empty_input_is_all_unset() {
        let cc = req("");
        assert_eq!(cc, RequestCacheControl::default());
        let cc = res(",,  ,");
        assert_eq!(cc, ResponseCacheControl::default());
    }
}
