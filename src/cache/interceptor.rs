//! Wires [`super::HttpCache`] into the call pipeline (spec §4.2 ordering:
//! `[application-user]* -> [cache, connect, network-user*, call-server]`).

use std::sync::Arc;
use std::time::SystemTime;

use http::{
    Method, StatusCode,
    header::{IF_MODIFIED_SINCE, IF_NONE_MATCH, LOCATION},
};
use http_body_util::Full;
use url::Url;

use crate::{
    body::boxed,
    error::Result,
    interceptor::{Chain, Interceptor},
    request::Request,
    response::Response,
};

use super::{
    CachedResponse, HttpCache,
    entry::CacheEntry,
    is_cacheable_write,
    strategy::{self, CachedMeta, Decision},
};

/// The cache interceptor: an application-level interceptor positioned just
/// before `ConnectInterceptor` in the chain.
pub(crate) struct CacheInterceptor {
    cache: Arc<HttpCache>,
}

impl CacheInterceptor {
    pub(crate) fn new(cache: Arc<HttpCache>) -> CacheInterceptor {
        CacheInterceptor { cache }
    }
}

#[async_trait::async_trait]
impl Interceptor for CacheInterceptor {
    async fn intercept(&self, mut request: Request, chain: Chain<'_>) -> Result<Response> {
        let candidate = self.cache.get(&request).await?;

        let decision = match &candidate {
            Some(cached) => {
                let meta = CachedMeta {
                    request_url: &cached.entry.request_url,
                    response_headers: &cached.entry.response_headers,
                    sent_at: cached.entry.sent_at,
                    received_at: cached.entry.received_at,
                };
                strategy::evaluate(&request.cache_control(), request.headers(), &meta, SystemTime::now())
            }
            None if request.cache_control().only_if_cached => Decision::Unsatisfiable,
            None => Decision::Network,
        };

        let listener = chain.context().listener();
        match decision {
            Decision::UseCache { add_warning_113 } => {
                self.cache.note_hit();
                listener.cache_hit();
                let cached = candidate.expect("UseCache decision always carries a candidate");
                Ok(build_cached_response(request, cached, add_warning_113))
            }
            Decision::Unsatisfiable => {
                listener.satisfaction_failure();
                Ok(synthetic_gateway_timeout(request))
            }
            Decision::Conditional { if_none_match, if_modified_since } => {
                self.cache.note_network();
                listener.cache_conditional_hit();
                let cached = candidate.expect("Conditional decision always carries a candidate");
                if let Some(v) = if_none_match {
                    request.headers_mut().insert(IF_NONE_MATCH, v);
                }
                if let Some(v) = if_modified_since {
                    request.headers_mut().insert(IF_MODIFIED_SINCE, v);
                }
                let network_response = chain.proceed(request).await?;
                self.handle_network_response(network_response, Some(cached.entry)).await
            }
            Decision::Network => {
                self.cache.note_network();
                listener.cache_miss();
                let network_response = chain.proceed(request).await?;
                self.handle_network_response(network_response, None).await
            }
        }
    }

    fn is_application_level(&self) -> bool {
        true
    }
}

impl CacheInterceptor {
    async fn handle_network_response(&self, response: Response, revalidated: Option<CacheEntry>) -> Result<Response> {
        let method = response.request().method().clone();
        if matches!(method, Method::POST | Method::PUT | Method::DELETE)
            && (response.status().is_success() || response.status().is_redirection())
        {
            self.invalidate_for(&response);
        }

        if response.status() == StatusCode::NOT_MODIFIED {
            if let Some(cached) = revalidated {
                return self.serve_conditional_hit(response, cached).await;
            }
            return Ok(response);
        }

        if revalidated.is_some() {
            // The server answered a conditional request with a full body;
            // the previously stored entry no longer applies as-is.
            let _ = self.cache.invalidate(response.request().cache_url());
        }

        self.maybe_store(response).await
    }

    async fn serve_conditional_hit(&self, network_response: Response, cached: CacheEntry) -> Result<Response> {
        self.cache.note_hit();
        let request_for_lookup = network_response
            .request()
            .try_clone()
            .unwrap_or_else(|| Request::new(network_response.request().method().clone(), network_response.request().url().clone()));

        self.cache.merge_304(network_response.request(), &cached, network_response.headers()).await?;

        match self.cache.get(&request_for_lookup).await? {
            Some(merged) => Ok(build_cached_response(request_for_lookup, merged, false)),
            // The merge just committed a fresh entry; a lookup miss here
            // would mean the disk write itself failed silently, which
            // `merge_304` already surfaces as an `Err`. Fall back to the
            // network response's own (304, bodyless) shape defensively.
            None => Ok(network_response),
        }
    }

    async fn maybe_store(&self, mut response: Response) -> Result<Response> {
        if !is_cacheable_write(response.request(), &response) {
            return Ok(response);
        }
        let bytes = response.bytes().await?;
        self.cache.put(response.request(), &response, &bytes).await?;
        let replayed = boxed(Full::new(bytes).map_err(Into::into));
        response.set_body(replayed);
        Ok(response)
    }

    fn invalidate_for(&self, response: &Response) {
        let request_url = response.request().cache_url();
        let _ = self.cache.invalidate(request_url);

        for header_name in [LOCATION, http::header::CONTENT_LOCATION] {
            if let Some(value) = response.headers().get(header_name) {
                if let Ok(value) = value.to_str() {
                    if let Ok(resolved) = request_url.join(value) {
                        if same_origin(request_url, &resolved) {
                            let _ = self.cache.invalidate(&resolved);
                        }
                    }
                }
            }
        }
    }
}

fn build_cached_response(request: Request, cached: CachedResponse, add_warning_113: bool) -> Response {
    let body = boxed(Full::new(cached.body).map_err(Into::into));
    let mut response = Response::new(
        request,
        cached.entry.version,
        cached.entry.status,
        None,
        cached.entry.response_headers,
        body,
    );
    if add_warning_113 {
        response
            .headers_mut()
            .append(http::header::WARNING, http::HeaderValue::from_static("113 - \"Heuristic Expiration\""));
    }
    response.set_sent_at(cached.entry.sent_at);
    response.set_received_at(cached.entry.received_at);
    if let Some(tls_info) = cached.entry.tls_info {
        response.set_tls_info(tls_info);
    }
    response
}

fn synthetic_gateway_timeout(request: Request) -> Response {
    let body = boxed(Full::new(bytes::Bytes::new()).map_err(Into::into));
    Response::new(request, http::Version::HTTP_11, StatusCode::GATEWAY_TIMEOUT, None, http::HeaderMap::new(), body)
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme() && a.host_str() == b.host_str() && a.port_or_known_default() == b.port_or_known_default()
}
