//! The immutable [`Response`] value.

use std::time::SystemTime;

use http::{HeaderMap, HeaderValue, StatusCode, Version};
use url::Url;

use crate::{
    Error, Result,
    body::ResponseBody,
    request::Request,
    tls::TlsInfo,
};

/// A response to a submitted [`Request`](crate::Request).
///
/// Immutable per spec §3. Carries the originating request snapshot,
/// negotiated protocol, status, headers, a single-reader body, optional TLS
/// handshake info, and optional cache/network sub-responses forming the
/// conditional-revalidation chain (spec §4.6).
pub struct Response {
    request: Request,
    version: Version,
    status: StatusCode,
    reason: Option<String>,
    headers: HeaderMap<HeaderValue>,
    body: Option<ResponseBody>,
    tls_info: Option<TlsInfo>,
    prior_responses: Vec<ResponseSummary>,
    cache_response: Option<Box<ResponseSummary>>,
    network_response: Option<Box<ResponseSummary>>,
    sent_at: Option<SystemTime>,
    received_at: Option<SystemTime>,
    trailers: Option<HeaderMap<HeaderValue>>,
}

/// A lightweight snapshot of a `Response`'s metadata, used to populate
/// `prior_responses` (the redirect chain) and the cache/network
/// sub-responses without keeping a second live body reader around.
#[derive(Debug, Clone)]
pub struct ResponseSummary {
    /// The request URL this response answered.
    pub url: Url,
    /// Negotiated protocol version.
    pub version: Version,
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap<HeaderValue>,
    /// Millis timestamp when the request was sent on the wire.
    pub sent_at: Option<SystemTime>,
    /// Millis timestamp when headers were fully received.
    pub received_at: Option<SystemTime>,
}

impl Response {
    pub(crate) fn new(
        request: Request,
        version: Version,
        status: StatusCode,
        reason: Option<String>,
        headers: HeaderMap<HeaderValue>,
        body: ResponseBody,
    ) -> Response {
        Response {
            request,
            version,
            status,
            reason,
            headers,
            body: Some(body),
            tls_info: None,
            prior_responses: Vec::new(),
            cache_response: None,
            network_response: None,
            sent_at: None,
            received_at: None,
            trailers: None,
        }
    }

    /// The request this response answers.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// The negotiated protocol version (HTTP/1.1 or HTTP/2).
    pub fn version(&self) -> Version {
        self.version
    }

    /// The status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The server-supplied reason phrase, if the wire protocol carried one
    /// (HTTP/2 has none; falls back to the canonical reason for the code).
    pub fn reason_phrase(&self) -> &str {
        self.reason
            .as_deref()
            .unwrap_or_else(|| self.status.canonical_reason().unwrap_or(""))
    }

    /// The response headers.
    pub fn headers(&self) -> &HeaderMap<HeaderValue> {
        &self.headers
    }

    /// Mutable access to headers — used by the cache interceptor to merge a
    /// `304` response's headers into a cached entry (spec §4.6 write path).
    pub(crate) fn headers_mut(&mut self) -> &mut HeaderMap<HeaderValue> {
        &mut self.headers
    }

    /// The response's effective URL (the request's URL; redirects are
    /// already resolved into `prior_responses`).
    pub fn url(&self) -> &Url {
        self.request.url()
    }

    /// TLS handshake info, if the connection was HTTPS.
    pub fn tls_info(&self) -> Option<&TlsInfo> {
        self.tls_info.as_ref()
    }

    pub(crate) fn set_tls_info(&mut self, info: TlsInfo) {
        self.tls_info = Some(info);
    }

    /// The chain of responses that preceded this one via redirects, oldest
    /// first (spec §3 Response "optional prior responses").
    pub fn prior_responses(&self) -> &[ResponseSummary] {
        &self.prior_responses
    }

    pub(crate) fn push_prior(&mut self, prior: ResponseSummary) {
        self.prior_responses.push(prior);
    }

    /// If this response was served (fully or conditionally) from the cache,
    /// a summary of the cached entry it was built from.
    pub fn cache_response(&self) -> Option<&ResponseSummary> {
        self.cache_response.as_deref()
    }

    pub(crate) fn set_cache_response(&mut self, s: ResponseSummary) {
        self.cache_response = Some(Box::new(s));
    }

    /// If a network round-trip occurred (full miss or conditional
    /// revalidation), a summary of that network response.
    pub fn network_response(&self) -> Option<&ResponseSummary> {
        self.network_response.as_deref()
    }

    pub(crate) fn set_network_response(&mut self, s: ResponseSummary) {
        self.network_response = Some(Box::new(s));
    }

    /// Millis timestamp when the request was sent on the wire.
    pub fn sent_at(&self) -> Option<SystemTime> {
        self.sent_at
    }

    pub(crate) fn set_sent_at(&mut self, t: SystemTime) {
        self.sent_at = Some(t);
    }

    /// Millis timestamp when the response headers were fully received.
    pub fn received_at(&self) -> Option<SystemTime> {
        self.received_at
    }

    pub(crate) fn set_received_at(&mut self, t: SystemTime) {
        self.received_at = Some(t);
    }

    /// Summarizes this response for use as a `prior_response` /
    /// `cache_response` / `network_response` entry.
    pub(crate) fn summarize(&self) -> ResponseSummary {
        ResponseSummary {
            url: self.url().clone(),
            version: self.version,
            status: self.status,
            headers: self.headers.clone(),
            sent_at: self.sent_at,
            received_at: self.received_at,
        }
    }

    /// Takes the response body's byte stream. A `Response` body is a
    /// single-reader stream (spec §3 invariant); calling this a second time
    /// returns `None`.
    pub fn take_body(&mut self) -> Option<ResponseBody> {
        self.body.take()
    }

    /// Replaces the response body, e.g. after the cache interceptor buffers
    /// it to write a copy to disk and must hand the caller a fresh reader.
    pub(crate) fn set_body(&mut self, body: ResponseBody) {
        self.body = Some(body);
    }

    /// Buffers and returns the full response body as bytes.
    pub async fn bytes(&mut self) -> Result<bytes::Bytes> {
        use http_body_util::BodyExt;
        let body = self.body.take().ok_or_else(|| Error::body("body already consumed"))?;
        let collected = body.collect().await.map_err(Error::body)?;
        if let Some(trailers) = collected.trailers() {
            self.trailers = Some(trailers.clone());
        }
        Ok(collected.to_bytes())
    }

    /// Trailing headers sent after the body (HTTP/2 trailers, or `Trailer`
    /// chunked-encoding trailers on HTTP/1.1). Only populated once the body
    /// has been fully read via [`Response::bytes`] or [`Response::text`] —
    /// `None` beforehand, even on a response that does carry trailers.
    pub fn trailers(&self) -> Option<&HeaderMap<HeaderValue>> {
        self.trailers.as_ref()
    }

    /// Buffers and decodes the full response body as UTF-8 text.
    pub async fn text(&mut self) -> Result<String> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(Error::decode)
    }

    /// Turns a non-2xx status into an `Err`, leaving 2xx responses as `Ok`.
    pub fn error_for_status(self) -> Result<Self> {
        if self.status.is_client_error() || self.status.is_server_error() {
            let url = self.url().clone();
            Err(Error::status_code(url, self.status))
        } else {
            Ok(self)
        }
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("url", self.url())
            .field("status", &self.status)
            .field("version", &self.version)
            .field("headers", &self.headers)
            .finish()
    }
}
