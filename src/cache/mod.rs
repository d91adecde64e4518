//! RFC 7234 HTTP response cache (spec §3 HttpCache, §4.6).
//!
//! Ties together directive parsing ([`directive`]), the freshness/validation
//! decision ([`strategy`]), the on-disk entry format ([`entry`]), and the
//! crash-safe blob store ([`disk_lru`]). [`interceptor`] wires the whole
//! thing into the call pipeline as an [`crate::interceptor::Interceptor`].

pub(crate) mod directive;
pub(crate) mod disk_lru;
pub(crate) mod entry;
pub(crate) mod interceptor;
pub(crate) mod strategy;

use std::{
    path::Path,
    sync::atomic::{AtomicU64, Ordering},
};

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, StatusCode, header::HeaderName};
use md5::{Digest, Md5};
use url::Url;

use crate::{error::Result, header_util, request::Request, response::Response};
use directive::ResponseCacheControl;
use disk_lru::DiskLruCache;
use entry::CacheEntry;

const METADATA_STREAM: usize = 0;
const BODY_STREAM: usize = 1;

/// Statuses the cache may store without an explicit cache-control opt-in
/// (spec §4.6, the "RFC-cacheable default set").
const DEFAULT_CACHEABLE_STATUSES: &[StatusCode] = &[
    StatusCode::OK,
    StatusCode::NON_AUTHORITATIVE_INFORMATION,
    StatusCode::NO_CONTENT,
    StatusCode::MULTIPLE_CHOICES,
    StatusCode::MOVED_PERMANENTLY,
    StatusCode::NOT_FOUND,
    StatusCode::METHOD_NOT_ALLOWED,
    StatusCode::GONE,
    StatusCode::URI_TOO_LONG,
    StatusCode::NOT_IMPLEMENTED,
];

/// Read-only call counters exposed for diagnostics/testing (spec §8
/// testable properties reference `hitCount` directly).
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Total cache lookups performed.
    pub request_count: u64,
    /// Lookups that required a network round-trip (miss or conditional).
    pub network_count: u64,
    /// Lookups fully satisfied from the cache with no network round-trip.
    pub hit_count: u64,
    /// Completed writes (new entry or 304 header merge).
    pub write_success_count: u64,
    /// Writes aborted due to a stream error.
    pub write_abort_count: u64,
}

/// A fully materialized cached response, ready to be served or revalidated.
pub(crate) struct CachedResponse {
    pub(crate) entry: CacheEntry,
    pub(crate) body: Bytes,
}

/// The disk-backed HTTP cache.
pub(crate) struct HttpCache {
    store: DiskLruCache,
    request_count: AtomicU64,
    network_count: AtomicU64,
    hit_count: AtomicU64,
    write_success_count: AtomicU64,
    write_abort_count: AtomicU64,
}

impl HttpCache {
    /// Opens (or creates) a cache directory with the given byte budget.
    pub(crate) fn open(dir: &Path, max_size: u64) -> Result<HttpCache> {
        Ok(HttpCache {
            store: DiskLruCache::open(dir, max_size)?,
            request_count: AtomicU64::new(0),
            network_count: AtomicU64::new(0),
            hit_count: AtomicU64::new(0),
            write_success_count: AtomicU64::new(0),
            write_abort_count: AtomicU64::new(0),
        })
    }

    /// The cache key for `url`: an MD5 hex digest of its canonical string
    /// form (spec §3 CacheEntry Key: "MD5(canonical URL)").
    pub(crate) fn key_for(url: &Url) -> String {
        let mut hasher = Md5::new();
        hasher.update(url.as_str().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub(crate) fn stats(&self) -> CacheStats {
        CacheStats {
            request_count: self.request_count.load(Ordering::Relaxed),
            network_count: self.network_count.load(Ordering::Relaxed),
            hit_count: self.hit_count.load(Ordering::Relaxed),
            write_success_count: self.write_success_count.load(Ordering::Relaxed),
            write_abort_count: self.write_abort_count.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn note_network(&self) {
        self.network_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_hit(&self) {
        self.hit_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Looks up a stored entry for `request`, returning `None` on a full
    /// miss or a `Vary` mismatch (the latter is treated the same as a miss
    /// per spec §4.6: a mismatched entry cannot satisfy the request).
    pub(crate) async fn get(&self, request: &Request) -> Result<Option<CachedResponse>> {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        let key = Self::key_for(request.cache_url());
        if !self.store.contains(&key) {
            return Ok(None);
        }

        let [meta_path, body_path] = self.store.stream_paths(&key);
        let meta_bytes = match tokio::fs::read(&meta_path).await {
            Ok(b) => b,
            Err(_) => return Ok(None),
        };
        let body_bytes = tokio::fs::read(&body_path).await.unwrap_or_default();
        let entry = match CacheEntry::decode(&meta_bytes) {
            Ok(e) => e,
            Err(_) => return Ok(None),
        };

        if !vary_matches(&entry, request.headers()) {
            return Ok(None);
        }

        let _ = self.store.note_read(&key);
        Ok(Some(CachedResponse { entry, body: Bytes::from(body_bytes) }))
    }

    /// Stores `response` for `request`, subject to RFC 7234's write-path
    /// gates (spec §4.6). A no-op (not an error) when the response isn't
    /// cacheable.
    pub(crate) async fn put(&self, request: &Request, response: &Response, body: &Bytes) -> Result<()> {
        if !is_cacheable_write(request, response) {
            return Ok(());
        }

        let key = Self::key_for(request.cache_url());
        let varied_request_headers = capture_varied_headers(response.headers(), request.headers());

        let entry = CacheEntry {
            request_url: request.cache_url().clone(),
            request_method: request.method().clone(),
            varied_request_headers,
            version: response.version(),
            status: response.status(),
            response_headers: response.headers().clone(),
            sent_at: response.sent_at().unwrap_or(std::time::SystemTime::now()),
            received_at: response.received_at().unwrap_or(std::time::SystemTime::now()),
            tls_info: response.tls_info().cloned(),
        };

        let mut editor = self.store.edit(&key)?;
        let write_result = async {
            editor.write_stream(METADATA_STREAM, &entry.encode()).await?;
            editor.write_stream(BODY_STREAM, body).await?;
            Ok::<(), crate::error::Error>(())
        }
        .await;

        match write_result {
            Ok(()) => {
                editor.commit()?;
                self.write_success_count.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                drop(editor);
                self.write_abort_count.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Merges a `304`'s headers into the stored entry without touching the
    /// stored body bytes (spec §8 "a 304 does not replace stored body
    /// bytes; headers are merged").
    pub(crate) async fn merge_304(&self, request: &Request, cached: &CacheEntry, network_headers: &HeaderMap<HeaderValue>) -> Result<()> {
        let key = Self::key_for(request.cache_url());
        let [_, body_path] = self.store.stream_paths(&key);
        let body_bytes = tokio::fs::read(&body_path).await.unwrap_or_default();

        let merged_headers = header_util::merge_304_headers(&cached.response_headers, network_headers);
        let entry = CacheEntry {
            request_url: cached.request_url.clone(),
            request_method: cached.request_method.clone(),
            varied_request_headers: cached.varied_request_headers.clone(),
            version: cached.version,
            status: cached.status,
            response_headers: merged_headers,
            sent_at: std::time::SystemTime::now(),
            received_at: std::time::SystemTime::now(),
            tls_info: cached.tls_info.clone(),
        };

        let mut editor = self.store.edit(&key)?;
        editor.write_stream(METADATA_STREAM, &entry.encode()).await?;
        editor.write_stream(BODY_STREAM, &body_bytes).await?;
        editor.commit()?;
        self.write_success_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Removes any stored entry for `url` (spec §4.6 invalidation: "POST,
    /// PUT, DELETE with 2xx/3xx status invalidate the cache entry for the
    /// effective request URL and any `Location`/`Content-Location`").
    pub(crate) fn invalidate(&self, url: &Url) -> Result<()> {
        let key = Self::key_for(url);
        self.store.remove(&key)?;
        Ok(())
    }

    /// Total on-disk size of all stored entries, for the LRU budget
    /// invariant (spec §8 "Cache LRU: total on-disk size ≤ maxSize").
    pub(crate) fn size(&self) -> u64 {
        self.store.size()
    }

    pub(crate) fn max_size(&self) -> u64 {
        self.store.max_size()
    }

    /// Number of entries currently stored, for iteration/introspection
    /// (spec §4.6 "Iteration").
    pub(crate) fn entry_count(&self) -> usize {
        self.store.len()
    }
}

pub(crate) fn is_cacheable_write(request: &Request, response: &Response) -> bool {
    if request.method() != Method::GET && !request.is_cache_override_enabled() {
        return false;
    }
    if request.cache_control().no_store {
        return false;
    }
    let response_directives = ResponseCacheControl::parse(response.headers());
    if response_directives.no_store {
        return false;
    }
    if response.status() == StatusCode::PARTIAL_CONTENT {
        return false;
    }
    DEFAULT_CACHEABLE_STATUSES.contains(&response.status()) || response_directives.explicitly_cacheable()
}

/// Captures the subset of `request_headers` named by the response's `Vary`
/// header, for later comparison on lookup.
fn capture_varied_headers(response_headers: &HeaderMap<HeaderValue>, request_headers: &HeaderMap<HeaderValue>) -> HeaderMap<HeaderValue> {
    let mut out = HeaderMap::new();
    for name in vary_header_names(response_headers) {
        for value in request_headers.get_all(&name) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

/// Whether `entry` still satisfies `request_headers` given its stored
/// `Vary` header (spec §4.6 "Vary matching").
fn vary_matches(entry: &CacheEntry, request_headers: &HeaderMap<HeaderValue>) -> bool {
    let names = vary_header_names(&entry.response_headers);
    if names.iter().any(|n| n.as_str() == "*") {
        return false;
    }
    names.iter().all(|name| {
        let Ok(name) = name.parse::<HeaderName>() else { return true };
        header_util::values_equal(&entry.varied_request_headers, request_headers, &name)
    })
}

fn vary_header_names(response_headers: &HeaderMap<HeaderValue>) -> Vec<String> {
    response_headers
        .get_all(http::header::VARY)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::Body;

    fn get(url: &str) -> Request {
        Request::new(Method::GET, Url::parse(url).unwrap())
    }

    fn ok_response(request: Request, headers: HeaderMap<HeaderValue>) -> Response {
        let body = crate::body::boxed(http_body_util::Full::new(Bytes::new()).map_err(Into::into));
        let mut response = Response::new(request, http::Version::HTTP_11, StatusCode::OK, None, headers, body);
        response.set_sent_at(std::time::SystemTime::now());
        response.set_received_at(std::time::SystemTime::now());
        response
    }

    #[tokio::test]
    async fn miss_then_hit_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HttpCache::open(dir.path(), 1024 * 1024).unwrap();

        let req = get("https://example.com/a");
        assert!(cache.get(&req).await.unwrap().is_none());

        let mut headers = HeaderMap::new();
        headers.insert(http::header::CACHE_CONTROL, HeaderValue::from_static("max-age=300"));
        let body = Bytes::from_static(b"hello");
        let response = ok_response(get("https://example.com/a"), headers);
        cache.put(&req, &response, &body).await.unwrap();

        let cached = cache.get(&req).await.unwrap().expect("should now hit");
        assert_eq!(cached.body, body);
        assert_eq!(cached.entry.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn no_store_response_is_never_written() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HttpCache::open(dir.path(), 1024 * 1024).unwrap();
        let req = get("https://example.com/a");
        let mut headers = HeaderMap::new();
        headers.insert(http::header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        let response = ok_response(get("https://example.com/a"), headers);
        cache.put(&req, &response, &Bytes::new()).await.unwrap();
        assert!(cache.get(&req).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn post_without_cacheable_override_is_never_written() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HttpCache::open(dir.path(), 1024 * 1024).unwrap();
        let req = Request::new(Method::POST, Url::parse("https://example.com/a").unwrap());
        let mut headers = HeaderMap::new();
        headers.insert(http::header::CACHE_CONTROL, HeaderValue::from_static("max-age=300"));
        let response = ok_response(Request::new(Method::POST, Url::parse("https://example.com/a").unwrap()), headers);
        cache.put(&req, &response, &Bytes::new()).await.unwrap();
        assert_eq!(cache.entry_count(), 0);
    }

    #[tokio::test]
    async fn mismatched_vary_header_is_treated_as_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HttpCache::open(dir.path(), 1024 * 1024).unwrap();

        let mut req = get("https://example.com/a");
        req.headers_mut().insert("accept-encoding", HeaderValue::from_static("gzip"));

        let mut headers = HeaderMap::new();
        headers.insert(http::header::CACHE_CONTROL, HeaderValue::from_static("max-age=300"));
        headers.insert(http::header::VARY, HeaderValue::from_static("accept-encoding"));
        let response = ok_response(get("https://example.com/a"), headers);
        cache.put(&req, &response, &Bytes::new()).await.unwrap();

        let mut other = get("https://example.com/a");
        other.headers_mut().insert("accept-encoding", HeaderValue::from_static("br"));
        assert!(cache.get(&other).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalidate_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HttpCache::open(dir.path(), 1024 * 1024).unwrap();
        let req = get("https://example.com/a");
        let mut headers = HeaderMap::new();
        headers.insert(http::header::CACHE_CONTROL, HeaderValue::from_static("max-age=300"));
        let response = ok_response(get("https://example.com/a"), headers);
        cache.put(&req, &response, &Bytes::new()).await.unwrap();

        cache.invalidate(req.cache_url()).unwrap();
        assert!(cache.get(&req).await.unwrap().is_none());
    }
}
