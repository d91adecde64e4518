//! Dialing: turning a [`Route`] into a live [`Connection`] (spec §4.4 step
//! 5, "Connect").

use std::{sync::Arc, time::Duration};

use tokio::net::TcpStream;

use crate::{
    conn::{Connection, Io, Protocol},
    error::{Error, Result},
    proxy::ProxyKind,
    route::Route,
    tls::{AlpnProtocol, BoxedTlsStream, TlsConnector, TlsInfo},
};

/// Turns a [`Route`] into a handshaken [`Connection`]. The default
/// implementation performs TCP connect (with fast-fallback across multiple
/// addresses left to the route planner's ordering), an HTTP `CONNECT`
/// tunnel when routing through an HTTP proxy for HTTPS, and a TLS
/// handshake via the configured [`TlsConnector`] when the target scheme is
/// `https`.
#[async_trait::async_trait]
pub(crate) trait Dialer: Send + Sync {
    async fn connect(&self, route: &Route) -> Result<Connection>;
}

pub(crate) struct DefaultDialer {
    tls_connector: Arc<dyn TlsConnector>,
    connect_timeout: Duration,
    ping_interval: Option<Duration>,
}

impl DefaultDialer {
    pub(crate) fn new(tls_connector: Arc<dyn TlsConnector>, connect_timeout: Duration, ping_interval: Option<Duration>) -> DefaultDialer {
        DefaultDialer { tls_connector, connect_timeout, ping_interval }
    }

    async fn tcp_connect(&self, route: &Route) -> Result<TcpStream> {
        tokio::time::timeout(self.connect_timeout, TcpStream::connect(route.socket_addr))
            .await
            .map_err(|_| Error::connect("connect timed out"))?
            .map_err(Error::connect)
    }

    async fn connect_tunnel(&self, mut stream: TcpStream, route: &Route) -> Result<TcpStream> {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        let host = &route.address.host;
        let port = route.address.port;
        let request = format!(
            "CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\nProxy-Connection: Keep-Alive\r\n\r\n"
        );
        stream.write_all(request.as_bytes()).await.map_err(Error::connect)?;

        let mut buf = Vec::with_capacity(512);
        let mut chunk = [0u8; 512];
        loop {
            let n = stream.read(&mut chunk).await.map_err(Error::connect)?;
            if n == 0 {
                return Err(Error::connect("proxy closed connection during CONNECT"));
            }
            buf.extend_from_slice(&chunk[..n]);
            if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                break;
            }
            if buf.len() > 64 * 1024 {
                return Err(Error::connect("proxy CONNECT response too large"));
            }
        }

        let status_line = buf.split(|&b| b == b'\n').next().unwrap_or(&[]);
        let status_line = String::from_utf8_lossy(status_line);
        if !status_line.contains(" 200") {
            return Err(Error::connect(format!("proxy CONNECT failed: {}", status_line.trim())));
        }
        Ok(stream)
    }
}

#[async_trait::async_trait]
impl Dialer for DefaultDialer {
    async fn connect(&self, route: &Route) -> Result<Connection> {
        let tcp = self.tcp_connect(route).await?;

        let tcp = if route.proxy_kind == ProxyKind::HttpTunnel {
            self.connect_tunnel(tcp, route).await?
        } else {
            tcp
        };

        let is_https = route.address.is_https;
        let (io, protocol, tls_info) = if is_https {
            if route.address.tls.specs.is_empty() {
                return Err(Error::tls("no TLS connection specs configured"));
            }
            // Try each connection spec in order, falling back to a wider
            // version floor only after the stricter one fails the handshake
            // (spec §4.4 step 5, "TLS fallback"). Each attempt needs its own
            // TCP socket since a failed TLS handshake leaves the stream
            // unusable.
            let mut last_err = None;
            let mut attempted: Option<(BoxedTlsStream, AlpnProtocol, TlsInfo)> = None;
            let mut next_tcp = Some(tcp);
            for (i, spec) in route.address.tls.specs.iter().enumerate() {
                let Some(tcp) = next_tcp.take() else {
                    break;
                };
                match self.tls_connector.connect(&route.address.host, spec, &route.address.alpn, tcp).await {
                    Ok(result) => {
                        attempted = Some(result);
                        break;
                    }
                    Err(e) => {
                        last_err = Some(e);
                        let is_last = i + 1 == route.address.tls.specs.len();
                        if is_last {
                            break;
                        }
                        next_tcp = Some(self.tcp_connect(route).await?);
                        if route.proxy_kind == ProxyKind::HttpTunnel {
                            next_tcp = Some(self.connect_tunnel(next_tcp.take().unwrap(), route).await?);
                        }
                    }
                }
            }
            let (stream, alpn, info) = attempted.ok_or_else(|| last_err.unwrap_or_else(|| Error::tls("TLS handshake failed")))?;
            let protocol = match alpn {
                AlpnProtocol::Http2 => Protocol::Http2,
                AlpnProtocol::Http11 => Protocol::Http1,
            };
            (Io::Tls(stream), protocol, Some(info))
        } else {
            (Io::Plain(tcp), Protocol::Http1, None)
        };

        Connection::handshake(route.clone(), io, protocol, tls_info, self.ping_interval).await
    }
}
