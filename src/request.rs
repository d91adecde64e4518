//! The immutable [`Request`] value and its [`RequestBuilder`].

use std::time::Duration;

use http::{Extensions, HeaderMap, HeaderValue, Method, header::HeaderName};
use url::Url;

use crate::{
    Body, Error, Result,
    cache::directive::RequestCacheControl,
    client::{Client, Pending},
    config::{RequestCacheUrlOverride, RequestCacheableOverride, RequestConfig, RequestTimeout},
};

/// A request which can be executed with [`Client::execute`].
///
/// Immutable once built, per spec §3: headers are an ordered multimap with
/// case-insensitive name comparisons (`http::HeaderMap`'s own semantics),
/// and the body may declare itself one-shot or duplex (see [`Body`]).
#[derive(Debug)]
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap<HeaderValue>,
    extensions: Extensions,
    body: Option<Body>,
}

/// A builder to construct the properties of a [`Request`].
#[must_use = "RequestBuilder does nothing until you 'send' it"]
pub struct RequestBuilder {
    client: Client,
    request: Result<Request>,
}

impl Request {
    /// Constructs a new request with an empty body.
    pub fn new(method: Method, url: Url) -> Self {
        Request {
            method,
            url,
            headers: HeaderMap::new(),
            extensions: Extensions::new(),
            body: None,
        }
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Mutable access to the request method.
    pub fn method_mut(&mut self) -> &mut Method {
        &mut self.method
    }

    /// The request URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Mutable access to the request URL.
    pub fn url_mut(&mut self) -> &mut Url {
        &mut self.url
    }

    /// The request headers.
    pub fn headers(&self) -> &HeaderMap<HeaderValue> {
        &self.headers
    }

    /// Mutable access to the request headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap<HeaderValue> {
        &mut self.headers
    }

    /// The request body, if any.
    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// Mutable access to the request body.
    pub fn body_mut(&mut self) -> &mut Option<Body> {
        &mut self.body
    }

    /// The request's type-keyed tag/config extensions (spec §9 "Dynamic
    /// cast / type-keyed tags").
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Mutable access to the request's extensions.
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// The effective cache key URL: `cache_url_override()` if set, else
    /// `url()` (spec §4.6 Key).
    pub fn cache_url(&self) -> &Url {
        RequestConfig::<RequestCacheUrlOverride>::get(&self.extensions).unwrap_or(&self.url)
    }

    /// Whether this request opts a non-`GET` method into caching (spec
    /// §4.6 write path override hook).
    pub fn is_cache_override_enabled(&self) -> bool {
        RequestConfig::<RequestCacheableOverride>::get(&self.extensions).copied() == Some(true)
    }

    /// Parsed `Cache-Control`/`Pragma` request directives (spec §4.6 step 3).
    pub(crate) fn cache_control(&self) -> RequestCacheControl {
        RequestCacheControl::parse(&self.headers)
    }

    /// Per-call timeout override, if set via [`RequestBuilder::timeout`].
    pub fn timeout(&self) -> Option<Duration> {
        RequestConfig::<RequestTimeout>::get(&self.extensions).copied()
    }

    /// Attempts to clone this request, including its body.
    ///
    /// Returns `None` if the body is not replayable (one-shot stream),
    /// matching the spec's body-replay precondition (§4.3).
    pub fn try_clone(&self) -> Option<Request> {
        let body = match &self.body {
            Some(b) => Some(b.try_clone()?),
            None => None,
        };
        let mut req = Request::new(self.method.clone(), self.url.clone());
        *req.headers_mut() = self.headers.clone();
        *req.body_mut() = body;
        req.extensions = self.extensions.clone();
        Some(req)
    }

    pub(crate) fn pieces(self) -> (Method, Url, HeaderMap<HeaderValue>, Extensions, Option<Body>) {
        (self.method, self.url, self.headers, self.extensions, self.body)
    }
}

impl RequestBuilder {
    pub(crate) fn new(client: Client, request: Result<Request>) -> RequestBuilder {
        RequestBuilder { client, request }
    }

    /// Add a header to this request.
    pub fn header<K, V>(self, key: K, value: V) -> RequestBuilder
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        self.header_sensitive(key, value, false)
    }

    fn header_sensitive<K, V>(mut self, key: K, value: V, sensitive: bool) -> RequestBuilder
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        let mut error = None;
        if let Ok(mut req) = self.request {
            match <HeaderName as TryFrom<K>>::try_from(key) {
                Ok(key) => match <HeaderValue as TryFrom<V>>::try_from(value) {
                    Ok(mut value) => {
                        value.set_sensitive(sensitive);
                        req.headers_mut().append(key, value);
                    }
                    Err(e) => error = Some(Error::builder(e.into())),
                },
                Err(e) => error = Some(Error::builder(e.into())),
            };
            self.request = Ok(req);
        }
        if let Some(err) = error {
            self.request = Err(err);
        }
        self
    }

    /// Replace all headers with the given map.
    pub fn headers(mut self, headers: HeaderMap<HeaderValue>) -> RequestBuilder {
        if let Ok(ref mut req) = self.request {
            std::mem::replace(req.headers_mut(), headers);
        }
        self
    }

    /// Set the request body.
    pub fn body<T: Into<Body>>(mut self, body: T) -> RequestBuilder {
        if let Ok(ref mut req) = self.request {
            *req.body_mut() = Some(body.into());
        }
        self
    }

    /// Set a per-call timeout override (spec §5 deadline narrowing).
    pub fn timeout(mut self, timeout: Duration) -> RequestBuilder {
        if let Ok(ref mut req) = self.request {
            *RequestConfig::<RequestTimeout>::get_mut(req.extensions_mut()) = Some(timeout);
        }
        self
    }

    /// Override the URL used for cache keying (spec §4.6 Key).
    pub fn cache_url_override(mut self, url: Url) -> RequestBuilder {
        if let Ok(ref mut req) = self.request {
            *RequestConfig::<RequestCacheUrlOverride>::get_mut(req.extensions_mut()) = Some(url);
        }
        self
    }

    /// Opt a non-`GET` request into caching (spec §4.6 write-path override).
    pub fn cacheable(mut self) -> RequestBuilder {
        if let Ok(ref mut req) = self.request {
            *RequestConfig::<RequestCacheableOverride>::get_mut(req.extensions_mut()) = Some(true);
        }
        self
    }

    /// Insert a typed tag, keyed by `T`'s type id (spec §9).
    pub fn tag<T: Clone + Send + Sync + 'static>(mut self, tag: T) -> RequestBuilder {
        if let Ok(ref mut req) = self.request {
            req.extensions_mut().insert(tag);
        }
        self
    }

    /// Build the [`Request`] without sending it.
    pub fn build(self) -> Result<Request> {
        self.request
    }

    /// Clone this builder, if the underlying request body is replayable.
    pub fn try_clone(&self) -> Option<RequestBuilder> {
        self.request
            .as_ref()
            .ok()
            .and_then(Request::try_clone)
            .map(|req| RequestBuilder {
                client: self.client.clone(),
                request: Ok(req),
            })
    }

    /// Executes this request, returning a Future that resolves to a
    /// [`Response`](crate::Response).
    pub fn send(self) -> Pending {
        match self.request {
            Ok(req) => self.client.execute_request(req),
            Err(err) => Pending::error(err),
        }
    }
}

impl std::fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut builder = f.debug_struct("RequestBuilder");
        match &self.request {
            Ok(req) => {
                builder.field("method", req.method()).field("url", req.url());
                builder.field("headers", req.headers());
            }
            Err(err) => {
                builder.field("error", err);
            }
        }
        builder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_url_defaults_to_request_url() {
        let url = Url::parse("https://example.com/a").unwrap();
        let req = Request::new(Method::GET, url.clone());
        assert_eq!(req.cache_url(), &url);
    }

    #[test]
    fn try_clone_fails_for_one_shot_body() {
        let url = Url::parse("https://example.com/a").unwrap();
        let mut req = Request::new(Method::POST, url);
        *req.body_mut() = Some(Body::wrap_stream(futures_util::stream::iter(vec![
            Ok::<_, std::io::Error>("x"),
        ])));
        assert!(req.try_clone().is_none());
    }

    #[test]
    fn try_clone_succeeds_for_bytes_body_and_copies_headers() {
        let url = Url::parse("https://example.com/a").unwrap();
        let mut req = Request::new(Method::POST, url);
        req.headers_mut().insert("x-test", HeaderValue::from_static("1"));
        *req.body_mut() = Some(Body::from("payload"));
        let cloned = req.try_clone().unwrap();
        assert_eq!(cloned.headers().get("x-test").unwrap(), "1");
        assert_eq!(cloned.body().unwrap().as_bytes(), Some(&b"payload"[..]));
    }
}
