//! Connections and exchanges (spec §3 Connection/Exchange, §4.4 steps 5-7).
//!
//! A [`Connection`] owns one socket (plus optional TLS session) and speaks
//! either HTTP/1.1 or HTTP/2, wrapping `hyper`'s low-level
//! `client::conn::{http1,http2}` handshake rather than reimplementing the
//! wire codec — the pooling/multiplexing/lifecycle bookkeeping around it is
//! this crate's own.

pub(crate) mod exchange;

use std::{
    sync::{
        atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU8, Ordering},
        Arc,
    },
    time::Instant,
};

use bytes::Bytes;
use http::{Request as HttpRequest, Response as HttpResponse};
use hyper::{body::Incoming, client::conn::http1, client::conn::http2};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use tokio::{io::{AsyncRead, AsyncWrite}, net::TcpStream};

use crate::{
    body::Body,
    error::{Error, Result},
    route::Route,
    tls::{AlpnProtocol, BoxedTlsStream, TlsInfo},
};

pub(crate) use exchange::Exchange;

/// The negotiated wire protocol for a [`Connection`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Protocol {
    Http1,
    Http2,
}

impl From<AlpnProtocol> for Protocol {
    fn from(p: AlpnProtocol) -> Self {
        match p {
            AlpnProtocol::Http11 => Protocol::Http1,
            AlpnProtocol::Http2 => Protocol::Http2,
        }
    }
}

/// Lifecycle states of a [`Connection`] (spec §3: "Connecting → Idle →
/// InUse[n] → Draining → Closed").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum State {
    Connecting = 0,
    Idle = 1,
    InUse = 2,
    Draining = 3,
    Closed = 4,
}

impl State {
    fn from_u8(v: u8) -> State {
        match v {
            0 => State::Connecting,
            1 => State::Idle,
            2 => State::InUse,
            3 => State::Draining,
            _ => State::Closed,
        }
    }
}

enum SendRequestHandle {
    Http1(Mutex<http1::SendRequest<Body>>),
    Http2(http2::SendRequest<Body>),
}

/// An erased, boxed stream that is both async-readable and -writable —
/// either a plain `TcpStream` or a TLS-wrapped stream from [`crate::tls`].
pub(crate) enum Io {
    Plain(TcpStream),
    Tls(BoxedTlsStream),
}

impl AsyncRead for Io {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            Io::Plain(s) => std::pin::Pin::new(s).poll_read(cx, buf),
            Io::Tls(s) => std::pin::Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Io {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Io::Plain(s) => std::pin::Pin::new(s).poll_write(cx, buf),
            Io::Tls(s) => std::pin::Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            Io::Plain(s) => std::pin::Pin::new(s).poll_flush(cx),
            Io::Tls(s) => std::pin::Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            Io::Plain(s) => std::pin::Pin::new(s).poll_shutdown(cx),
            Io::Tls(s) => std::pin::Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// One pooled connection: exclusive owner of a socket, speaking HTTP/1.1 or
/// HTTP/2 (spec §3 Connection).
pub(crate) struct Connection {
    pub(crate) route: Route,
    protocol: Protocol,
    send_request: SendRequestHandle,
    driver: tokio::task::JoinHandle<()>,
    state: AtomicU8,
    /// Number of exchanges currently open on this connection.
    exchange_count: AtomicU32,
    /// For HTTP/2: the peer's advertised concurrency limit.
    peer_max_concurrent_streams: AtomicU32,
    /// Sticky flag: once set, the connection must never host another
    /// exchange (spec §3 invariant).
    no_new_exchanges: AtomicBool,
    /// Monotonic nanos timestamp of when this connection last became idle.
    idle_at_nanos: AtomicI64,
    success_count: AtomicU32,
    failure_count: AtomicU32,
    tls_info: Option<TlsInfo>,
    created_at: Instant,
}

impl Connection {
    /// Performs the HTTP/1.1 or HTTP/2 handshake over an already-connected
    /// (and, for HTTPS, already TLS-wrapped) stream, spawning the
    /// background task that drives the connection's I/O loop.
    ///
    /// `ping_interval`, if set, enables HTTP/2's keep-alive PING frames
    /// (spec §6 `pingInterval`); it has no effect on an HTTP/1.1 handshake.
    pub(crate) async fn handshake(
        route: Route,
        io: Io,
        protocol: Protocol,
        tls_info: Option<TlsInfo>,
        ping_interval: Option<std::time::Duration>,
    ) -> Result<Connection> {
        let io = TokioIo::new(io);
        let (send_request, state) = match protocol {
            Protocol::Http1 => {
                let (sr, conn) = http1::Builder::new()
                    .handshake::<_, Body>(io)
                    .await
                    .map_err(Error::connect)?;
                let driver = tokio::spawn(async move {
                    let _ = conn.await;
                });
                (SendRequestHandle::Http1(Mutex::new(sr)), driver)
            }
            Protocol::Http2 => {
                let mut builder = http2::Builder::new(TokioExecutor);
                if let Some(interval) = ping_interval {
                    builder.keep_alive_interval(interval).keep_alive_while_idle(true);
                }
                let (sr, conn) = builder
                    .handshake::<_, Body>(io)
                    .await
                    .map_err(Error::connect)?;
                let driver = tokio::spawn(async move {
                    let _ = conn.await;
                });
                (SendRequestHandle::Http2(sr), driver)
            }
        };

        Ok(Connection {
            route,
            protocol,
            send_request,
            driver: state,
            state: AtomicU8::new(State::Idle as u8),
            exchange_count: AtomicU32::new(0),
            peer_max_concurrent_streams: AtomicU32::new(1),
            no_new_exchanges: AtomicBool::new(false),
            idle_at_nanos: AtomicI64::new(0),
            success_count: AtomicU32::new(0),
            failure_count: AtomicU32::new(0),
            tls_info,
            created_at: Instant::now(),
        })
    }

    pub(crate) fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub(crate) fn tls_info(&self) -> Option<&TlsInfo> {
        self.tls_info.as_ref()
    }

    pub(crate) fn state(&self) -> State {
        State::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Whether this connection may currently host another exchange (spec
    /// §4.4 step 4: "idle & !noNewExchanges" for HTTP/1, "stream-count <
    /// limit" for HTTP/2).
    pub(crate) fn can_host_new_exchange(&self) -> bool {
        if self.no_new_exchanges.load(Ordering::Acquire) || self.state() == State::Closed || self.state() == State::Draining {
            return false;
        }
        match self.protocol {
            Protocol::Http1 => self.exchange_count.load(Ordering::Acquire) == 0,
            Protocol::Http2 => {
                self.exchange_count.load(Ordering::Acquire) < self.peer_max_concurrent_streams.load(Ordering::Acquire)
            }
        }
    }

    pub(crate) fn no_new_exchanges(&self) -> bool {
        self.no_new_exchanges.load(Ordering::Acquire)
    }

    /// Marks this connection as never to be given another exchange (spec
    /// §4.4: "On I/O failure mid-exchange, mark the connection
    /// noNewExchanges").
    pub(crate) fn set_no_new_exchanges(&self) {
        self.no_new_exchanges.store(true, Ordering::Release);
    }

    pub(crate) fn set_peer_max_concurrent_streams(&self, n: u32) {
        self.peer_max_concurrent_streams.store(n.max(1), Ordering::Release);
    }

    pub(crate) fn idle_at_nanos(&self) -> i64 {
        self.idle_at_nanos.load(Ordering::Acquire)
    }

    /// Opens a new exchange if this connection can currently host one.
    pub(crate) fn new_exchange(self: &Arc<Self>) -> Option<Exchange> {
        if !self.can_host_new_exchange() {
            return None;
        }
        self.exchange_count.fetch_add(1, Ordering::AcqRel);
        self.state.store(State::InUse as u8, Ordering::Release);
        Some(Exchange::new(self.clone()))
    }

    /// Called by an [`Exchange`] when it completes, decrementing the count
    /// and, if now idle, recording the idle timestamp (spec §4.5 "Put").
    pub(crate) fn release_exchange(&self, success: bool, now_nanos: i64) {
        let remaining = self.exchange_count.fetch_sub(1, Ordering::AcqRel) - 1;
        if success {
            self.success_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failure_count.fetch_add(1, Ordering::Relaxed);
            self.set_no_new_exchanges();
        }
        if remaining == 0 {
            self.idle_at_nanos.store(now_nanos, Ordering::Release);
            if self.state() != State::Closed {
                self.state.store(State::Idle as u8, Ordering::Release);
            }
        }
    }

    /// Sends one request on this connection, returning the raw hyper
    /// response. Callers (the `call-server` interceptor via [`Exchange`])
    /// wrap the body into the crate's own `ResponseBody`.
    pub(crate) async fn send_request(&self, req: HttpRequest<Body>) -> Result<HttpResponse<Incoming>> {
        match &self.send_request {
            SendRequestHandle::Http1(sr) => {
                let mut sr = sr.lock();
                sr.ready().await.map_err(Error::connect)?;
                sr.send_request(req).await.map_err(Error::connect)
            }
            SendRequestHandle::Http2(sr) => {
                let mut sr = sr.clone();
                sr.ready().await.map_err(Error::connect)?;
                sr.send_request(req).await.map_err(Error::connect)
            }
        }
    }

    /// Transitions this connection directly to `Closed`, aborting its
    /// background I/O driver. Idempotent.
    pub(crate) fn close(&self) {
        self.set_no_new_exchanges();
        self.state.store(State::Closed as u8, Ordering::Release);
        self.driver.abort();
    }

    pub(crate) fn mark_draining(&self) {
        self.state.store(State::Draining as u8, Ordering::Release);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Adapts `tokio`'s runtime to hyper's `Executor` trait for HTTP/2's
/// internal tasks (ping/pong, stream management).
#[derive(Clone, Copy)]
struct TokioExecutor;

impl<F> hyper::rt::Executor<F> for TokioExecutor
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    fn execute(&self, fut: F) {
        tokio::spawn(fut);
    }
}
