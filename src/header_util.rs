//! Header-adjacent helpers shared by the cache and connection layers.
//!
//! Per spec §1 these are the "header-parsing utilities" contracted as an
//! external collaborator in the original system; here they are small enough
//! that the crate may as well own them, but they carry no novel logic beyond
//! what RFC 7230/7234 already dictate.

use http::{HeaderMap, HeaderValue, header::HeaderName};

/// Headers that are meaningful only for a single connection hop and must
/// never be copied across a cache merge or a proxy tunnel (spec Glossary
/// "Hop-by-hop header").
pub(crate) const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

pub(crate) fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.iter().any(|h| name.as_str().eq_ignore_ascii_case(h))
}

/// Headers for which a `304` response's value must win outright rather than
/// being combined with the cached value (spec §4.6 "the RFC combined set").
const NEVER_OVERRIDDEN_BY_304: &[&str] = &["content-length", "content-encoding", "content-type"];

pub(crate) fn is_end_to_end(name: &HeaderName) -> bool {
    !is_hop_by_hop(name)
}

/// Merges a conditional `304` response's headers onto a cached response's
/// headers per spec §4.6: start from the cached end-to-end headers, overlay
/// each network header except those that describe the (unchanged) entity
/// body, drop stale `Warning: 1xx`, keep `Warning: 2xx`.
pub(crate) fn merge_304_headers(cached: &HeaderMap<HeaderValue>, network: &HeaderMap<HeaderValue>) -> HeaderMap<HeaderValue> {
    let mut merged = HeaderMap::new();
    for (name, value) in cached.iter() {
        if is_end_to_end(name) && !is_stale_warning(name, value) {
            merged.append(name.clone(), value.clone());
        }
    }
    for name in NEVER_OVERRIDDEN_BY_304 {
        merged.remove(*name);
    }
    for (name, value) in network.iter() {
        if NEVER_OVERRIDDEN_BY_304.iter().any(|n| name.as_str().eq_ignore_ascii_case(n)) {
            continue;
        }
        if is_stale_warning(name, value) {
            continue;
        }
        if !merged.contains_key(name) {
            merged.insert(name.clone(), value.clone());
        } else {
            merged.remove(name);
            merged.insert(name.clone(), value.clone());
        }
    }
    merged
}

fn is_stale_warning(name: &HeaderName, value: &HeaderValue) -> bool {
    if !name.as_str().eq_ignore_ascii_case("warning") {
        return false;
    }
    value
        .to_str()
        .ok()
        .map(|v| v.trim_start().starts_with('1'))
        .unwrap_or(false)
}

/// Whether two header values should be considered equal for `Vary` matching
/// purposes: exact byte match of all values present for the header name.
pub(crate) fn values_equal(a: &HeaderMap<HeaderValue>, b: &HeaderMap<HeaderValue>, name: &HeaderName) -> bool {
    let mut a_values: Vec<&HeaderValue> = a.get_all(name).iter().collect();
    let mut b_values: Vec<&HeaderValue> = b.get_all(name).iter().collect();
    a_values.sort_by_key(|v| v.as_bytes());
    b_values.sort_by_key(|v| v.as_bytes());
    a_values == b_values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hop_by_hop_is_recognized_case_insensitively() {
        assert!(is_hop_by_hop(&HeaderName::from_static("connection")));
        assert!(is_hop_by_hop(&"Transfer-Encoding".parse::<HeaderName>().unwrap()));
        assert!(!is_hop_by_hop(&HeaderName::from_static("content-type")));
    }

    #[test]
    fn merge_304_keeps_cached_body_describing_headers() {
        let mut cached = HeaderMap::new();
        cached.insert("content-type", HeaderValue::from_static("text/plain"));
        cached.insert("etag", HeaderValue::from_static("v1"));

        let mut network = HeaderMap::new();
        network.insert("etag", HeaderValue::from_static("v1"));
        network.insert("content-type", HeaderValue::from_static("application/json"));

        let merged = merge_304_headers(&cached, &network);
        assert_eq!(merged.get("content-type").unwrap(), "text/plain");
        assert_eq!(merged.get("etag").unwrap(), "v1");
    }

    #[test]
    fn merge_304_drops_stale_1xx_warning_keeps_2xx() {
        let mut cached = HeaderMap::new();
        cached.append("warning", HeaderValue::from_static("112 - \"disconnected\""));
        cached.append("warning", HeaderValue::from_static("214 - \"transform\""));

        let network = HeaderMap::new();
        let merged = merge_304_headers(&cached, &network);
        let warnings: Vec<_> = merged.get_all("warning").iter().collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].to_str().unwrap().starts_with("214"));
    }
}
