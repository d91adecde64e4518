//! The terminal interceptor: writes the request and reads the response off
//! the acquired connection (spec §4.7 — the Connection/Exchange wire turn).

use std::time::SystemTime;

use http::{HeaderMap, HeaderValue, Request as HttpRequest, Version};

use crate::{
    body::{boxed, Body},
    conn::{exchange::ExchangeBody, Protocol},
    error::{Error, Result},
    request::Request,
    response::Response,
};

use super::{Chain, Interceptor};

pub(crate) struct CallServerInterceptor;

#[async_trait::async_trait]
impl Interceptor for CallServerInterceptor {
    async fn intercept(&self, request: Request, chain: Chain<'_>) -> Result<Response> {
        let connection = chain
            .connection()
            .cloned()
            .ok_or_else(|| Error::request("call-server interceptor reached with no connection attached"))?;

        let is_duplex = request.body().map(|b| b.is_duplex()).unwrap_or(false);
        if is_duplex && connection.protocol() == Protocol::Http1 {
            return Err(Error::request("HTTP/1.1 does not support duplex request bodies"));
        }

        let mut exchange = connection
            .new_exchange()
            .ok_or_else(|| Error::connect("connection could not host a new exchange"))?;

        let request_snapshot = request.try_clone().unwrap_or_else(|| {
            Request::new(request.method().clone(), request.url().clone())
        });

        let (method, url, headers, _extensions, body) = request.pieces();
        let mut builder = HttpRequest::builder().method(method.clone()).uri(url.as_str());
        {
            let header_map = builder.headers_mut().expect("builder has no error before headers are set");
            copy_headers(&headers, header_map);
        }
        let http_request = builder.body(body.unwrap_or_else(Body::empty)).map_err(Error::request)?;

        let version = match connection.protocol() {
            Protocol::Http1 => Version::HTTP_11,
            Protocol::Http2 => Version::HTTP_2,
        };

        let listener = chain.context().listener();
        listener.request_headers_start();
        listener.request_headers_end();

        let sent_at = SystemTime::now();
        listener.response_headers_start();
        let raw_response = match exchange.send(http_request).await {
            Ok(r) => r,
            Err(e) => {
                exchange.finish(false);
                listener.connection_released();
                return Err(e);
            }
        };
        let received_at = SystemTime::now();
        listener.response_headers_end(raw_response.status().as_u16());

        let (mut parts, incoming) = raw_response.into_parts();
        // The exchange is NOT released here: it stays bound to the response
        // body until that body reaches end-of-stream or is dropped (spec §3
        // "closing [the body] releases the Exchange"; §4.7 "only after the
        // previous body is fully consumed (or discarded) can the next
        // begin"). `ExchangeBody` calls `exchange.finish`/`connection_released`
        // at that point instead of here, at header-parse time.
        let body = boxed(ExchangeBody::new(incoming, exchange, listener.clone()));

        #[cfg(feature = "gzip")]
        let body = {
            let content_encoding = parts.headers.get(http::header::CONTENT_ENCODING);
            if crate::decode::is_gzip(content_encoding) {
                parts.headers.remove(http::header::CONTENT_ENCODING);
                parts.headers.remove(http::header::CONTENT_LENGTH);
                crate::decode::gzip_decode(body)
            } else {
                body
            }
        };

        let mut response = Response::new(request_snapshot, version, parts.status, None, parts.headers, body);
        response.set_sent_at(sent_at);
        response.set_received_at(received_at);
        if let Some(info) = connection.tls_info() {
            response.set_tls_info(info.clone());
        }
        Ok(response)
    }
}

fn copy_headers(src: &HeaderMap<HeaderValue>, dst: &mut HeaderMap<HeaderValue>) {
    for (name, value) in src.iter() {
        dst.append(name, value.clone());
    }
}
