//! `Cache-Control`/`Pragma` directive parsing (spec §4.6 step 3, §6 "honored
//! directives").

use std::time::Duration;

use http::HeaderMap;

/// Request-side cache directives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RequestCacheControl {
    pub(crate) no_cache: bool,
    pub(crate) no_store: bool,
    pub(crate) max_age: Option<Duration>,
    pub(crate) min_fresh: Option<Duration>,
    pub(crate) max_stale: Option<Duration>,
    pub(crate) max_stale_unbounded: bool,
    pub(crate) only_if_cached: bool,
    pub(crate) immutable: bool,
}

impl RequestCacheControl {
    pub(crate) fn parse(headers: &HeaderMap) -> RequestCacheControl {
        let mut out = RequestCacheControl::default();
        for token in directive_tokens(headers) {
            apply_token(&mut out, &token);
        }
        if headers
            .get(http::header::PRAGMA)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase().contains("no-cache"))
            .unwrap_or(false)
        {
            out.no_cache = true;
        }
        out
    }
}

fn apply_token(out: &mut RequestCacheControl, token: &DirectiveToken) {
    match token.name.as_str() {
        "no-cache" => out.no_cache = true,
        "no-store" => out.no_store = true,
        "only-if-cached" => out.only_if_cached = true,
        "immutable" => out.immutable = true,
        "max-age" => out.max_age = token.seconds(),
        "min-fresh" => out.min_fresh = token.seconds(),
        "max-stale" => {
            if let Some(d) = token.seconds() {
                out.max_stale = Some(d);
            } else {
                out.max_stale_unbounded = true;
            }
        }
        _ => {}
    }
}

/// Response-side cache directives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ResponseCacheControl {
    pub(crate) no_cache: bool,
    pub(crate) no_store: bool,
    pub(crate) must_revalidate: bool,
    pub(crate) public: bool,
    pub(crate) private: bool,
    pub(crate) immutable: bool,
    pub(crate) max_age: Option<Duration>,
    pub(crate) s_maxage: Option<Duration>,
}

impl ResponseCacheControl {
    pub(crate) fn parse(headers: &HeaderMap) -> ResponseCacheControl {
        let mut out = ResponseCacheControl::default();
        for token in directive_tokens(headers) {
            match token.name.as_str() {
                "no-cache" => out.no_cache = true,
                "no-store" => out.no_store = true,
                "must-revalidate" => out.must_revalidate = true,
                "public" => out.public = true,
                "private" => out.private = true,
                "immutable" => out.immutable = true,
                "max-age" => out.max_age = token.seconds(),
                "s-maxage" => out.s_maxage = token.seconds(),
                _ => {}
            }
        }
        out
    }

    /// Whether the RFC-cacheable set or an explicit opt-in permits storing
    /// this response (spec §4.6 write path).
    pub(crate) fn explicitly_cacheable(&self) -> bool {
        self.public || self.must_revalidate || self.max_age.is_some() || self.s_maxage.is_some()
    }
}

struct DirectiveToken {
    name: String,
    value: Option<String>,
}

impl DirectiveToken {
    fn seconds(&self) -> Option<Duration> {
        self.value.as_ref().and_then(|v| v.parse::<u64>().ok()).map(Duration::from_secs)
    }
}

fn directive_tokens(headers: &HeaderMap) -> Vec<DirectiveToken> {
    let mut tokens = Vec::new();
    for value in headers.get_all(http::header::CACHE_CONTROL) {
        let Ok(value) = value.to_str() else { continue };
        for part in value.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let mut split = part.splitn(2, '=');
            let name = split.next().unwrap_or("").trim().to_ascii_lowercase();
            let value = split.next().map(|v| v.trim().trim_matches('"').to_string());
            tokens.push(DirectiveToken { name, value });
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_max_age_and_no_cache() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::CACHE_CONTROL, "no-cache, max-age=30".parse().unwrap());
        let directives = RequestCacheControl::parse(&headers);
        assert!(directives.no_cache);
        assert_eq!(directives.max_age, Some(Duration::from_secs(30)));
    }

    #[test]
    fn max_stale_without_value_is_unbounded() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::CACHE_CONTROL, "max-stale".parse().unwrap());
        let directives = RequestCacheControl::parse(&headers);
        assert!(directives.max_stale_unbounded);
        assert_eq!(directives.max_stale, None);
    }

    #[test]
    fn pragma_no_cache_is_honored_as_legacy_equivalent() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::PRAGMA, "no-cache".parse().unwrap());
        let directives = RequestCacheControl::parse(&headers);
        assert!(directives.no_cache);
    }

    #[test]
    fn response_explicit_cacheable_requires_opt_in_directive() {
        let headers = HeaderMap::new();
        let directives = ResponseCacheControl::parse(&headers);
        assert!(!directives.explicitly_cacheable());
    }
}
