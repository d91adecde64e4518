//! One request/response turn on a [`super::Connection`] (spec §3 Exchange).

use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, ready},
};

use bytes::Bytes;
use http::{Request as HttpRequest, Response as HttpResponse};
use http_body::Body as HttpBody;
use hyper::body::Incoming;

use crate::{
    body::Body,
    error::{BoxError, Error, Result},
    observer::EventListener,
};

use super::Connection;

/// A short-lived handle bound to one `(Connection, Call)` pairing. Tracks
/// whether the request body has been fully written and whether the call is
/// done, so the owning connection can be released exactly once.
pub(crate) struct Exchange {
    connection: Arc<Connection>,
    has_full_request_body: bool,
    call_done: bool,
    released: bool,
}

impl Exchange {
    pub(crate) fn new(connection: Arc<Connection>) -> Exchange {
        Exchange {
            connection,
            has_full_request_body: false,
            call_done: false,
            released: false,
        }
    }

    pub(crate) fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Writes the request and reads the response headers. The response
    /// body remains a live stream bound to this exchange until drained.
    pub(crate) async fn send(&mut self, req: HttpRequest<Body>) -> Result<HttpResponse<Incoming>> {
        let result = self.connection.send_request(req).await;
        self.has_full_request_body = true;
        result
    }

    /// Call-done notification: the body has been fully read/closed, or the
    /// call failed before that point. Releases the exchange's slot on the
    /// connection exactly once.
    pub(crate) fn finish(&mut self, success: bool) {
        if self.released {
            return;
        }
        self.released = true;
        self.call_done = true;
        let now_nanos = crate::util::monotonic_nanos();
        self.connection.release_exchange(success, now_nanos);
    }

    pub(crate) fn is_done(&self) -> bool {
        self.call_done
    }
}

impl Drop for Exchange {
    fn drop(&mut self) {
        if !self.released {
            // A dropped-without-finishing exchange indicates the call
            // failed abnormally (cancellation, panic unwinding); treat the
            // connection as no longer trustworthy.
            self.finish(false);
        }
    }
}

pin_project_lite::pin_project! {
    /// Wraps a response body so the bound [`Exchange`] is released only
    /// once the body is fully consumed (end of stream) or dropped — never
    /// at header-parse time. This is what makes "a Response body is a
    /// single-reader stream; closing it releases the Exchange" (spec §3)
    /// and the HTTP/1.1 "only after the previous body is fully consumed
    /// (or discarded) can the next begin" (spec §4.7) hold: until this
    /// wrapper's last poll or its `Drop`, the connection still reports
    /// itself as hosting this exchange, so the pool/stream-count
    /// accounting can't hand it to a second call.
    pub(crate) struct ExchangeBody<B> {
        #[pin]
        inner: B,
        // Plain (unpinned) field: dropping it when the whole body drops —
        // whether from normal scope exit or being discarded mid-stream —
        // runs `Exchange`'s own `Drop` impl, which releases the connection
        // as a failed exchange if `finish` was never called explicitly.
        exchange: Option<Exchange>,
        listener: Arc<dyn EventListener>,
        released: bool,
    }

    impl<B> PinnedDrop for ExchangeBody<B> {
        fn drop(this: Pin<&mut Self>) {
            // Covers the "discarded" half of spec §3's "closing [the body]
            // releases the Exchange": a caller that drops the response
            // (or its body) before EOF still needs `connectionReleased` to
            // fire exactly once, matching the `Exchange`'s own release on
            // its `Drop` just below in field order.
            let this = this.project();
            if !*this.released {
                *this.released = true;
                this.listener.connection_released();
            }
        }
    }
}

impl<B> ExchangeBody<B> {
    pub(crate) fn new(inner: B, exchange: Exchange, listener: Arc<dyn EventListener>) -> ExchangeBody<B> {
        ExchangeBody { inner, exchange: Some(exchange), listener, released: false }
    }
}

impl<B> HttpBody for ExchangeBody<B>
where
    B: HttpBody<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    type Data = Bytes;
    type Error = Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<std::result::Result<http_body::Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();
        let frame = ready!(this.inner.as_mut().poll_frame(cx));
        match frame {
            Some(Ok(frame)) => Poll::Ready(Some(Ok(frame))),
            Some(Err(err)) => {
                // A mid-body read failure still ends this exchange's life;
                // release it as unsuccessful rather than waiting for drop.
                if let Some(exchange) = this.exchange.as_mut() {
                    exchange.finish(false);
                }
                if !*this.released {
                    *this.released = true;
                    this.listener.connection_released();
                }
                Poll::Ready(Some(Err(Error::body(err.into()))))
            }
            None => {
                if let Some(exchange) = this.exchange.as_mut() {
                    exchange.finish(true);
                }
                if !*this.released {
                    *this.released = true;
                    this.listener.connection_released();
                }
                Poll::Ready(None)
            }
        }
    }

    fn size_hint(&self) -> http_body::SizeHint {
        self.inner.size_hint()
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }
}
