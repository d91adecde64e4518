//! TLS configuration and the connector contract.
//!
//! TLS primitives themselves — certificate parsing, the trust verifier, the
//! handshake implementation — are an external collaborator per spec §1; the
//! socket/TLS factory is contracted via the [`TlsConnector`] trait. A
//! default implementation backed by `rustls`/`tokio-rustls` is provided
//! behind the `rustls-tls` feature (on by default), mirroring the teacher
//! crate's own TLS-backend-as-a-feature design.

use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Error;

/// The protocol a connection negotiated via ALPN.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AlpnProtocol {
    /// HTTP/1.1.
    Http11,
    /// HTTP/2.
    Http2,
}

/// An ordered list of ALPN protocols to offer during the handshake (spec
/// §4.4 step 6: "Negotiate protocol via ALPN").
#[derive(Clone, Debug)]
pub struct AlpnProtos(pub(crate) Vec<AlpnProtocol>);

impl AlpnProtos {
    /// Offer both HTTP/2 and HTTP/1.1, preferring HTTP/2.
    pub fn all() -> AlpnProtos {
        AlpnProtos(vec![AlpnProtocol::Http2, AlpnProtocol::Http11])
    }

    /// Offer only HTTP/1.1.
    pub fn http1() -> AlpnProtos {
        AlpnProtos(vec![AlpnProtocol::Http11])
    }

    /// Offer only HTTP/2.
    pub fn http2() -> AlpnProtos {
        AlpnProtos(vec![AlpnProtocol::Http2])
    }
}

impl Default for AlpnProtos {
    fn default() -> Self {
        AlpnProtos::all()
    }
}

/// One fallback step in the TLS connection-spec list (spec §4.4 step 5,
/// "TLS fallback"): a minimum version floor paired with whether it is the
/// informational "fallback SCSV" step.
#[derive(Clone, Debug)]
pub struct ConnectionSpec {
    pub(crate) min_version: TlsVersion,
    pub(crate) is_fallback: bool,
}

/// TLS protocol version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    /// TLS 1.2.
    Tls1_2,
    /// TLS 1.3.
    Tls1_3,
}

impl TlsVersion {
    /// The token used in the cache entry's metadata stream (spec §6).
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            TlsVersion::Tls1_2 => "TLSv1.2",
            TlsVersion::Tls1_3 => "TLSv1.3",
        }
    }

    pub(crate) fn from_str(s: &str) -> Option<TlsVersion> {
        match s {
            "TLSv1.2" => Some(TlsVersion::Tls1_2),
            "TLSv1.3" => Some(TlsVersion::Tls1_3),
            _ => None,
        }
    }
}

/// TLS-related `ClientBuilder` configuration, plus the ordered fallback
/// list consulted on handshake failure.
#[derive(Clone)]
pub struct TlsConfig {
    pub(crate) alpn: AlpnProtos,
    pub(crate) specs: Vec<ConnectionSpec>,
    pub(crate) cert_verification: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        TlsConfig {
            alpn: AlpnProtos::all(),
            specs: vec![
                ConnectionSpec { min_version: TlsVersion::Tls1_3, is_fallback: false },
                ConnectionSpec { min_version: TlsVersion::Tls1_2, is_fallback: true },
            ],
            cert_verification: true,
        }
    }
}

/// Handshake metadata captured for a completed TLS connection (spec §3
/// CacheEntry / Connection: "optional TLS handshake info").
#[derive(Clone, Debug)]
pub struct TlsInfo {
    /// The negotiated cipher suite name.
    pub cipher_suite: Option<String>,
    /// The negotiated TLS protocol version, if known (absent for legacy
    /// cache entries predating version recording — spec §6).
    pub version: Option<TlsVersion>,
    /// The peer's certificate chain, DER-encoded.
    pub peer_certificates: Vec<Vec<u8>>,
    /// The local certificate chain presented during the handshake (client
    /// certificate authentication), DER-encoded.
    pub local_certificates: Vec<Vec<u8>>,
}

/// A boxed, erased async TLS stream, as handed back by a [`TlsConnector`].
pub type BoxedTlsStream = Box<dyn AsyncReadWrite + Send + Unpin>;

/// Combined marker for a type that is both `AsyncRead` and `AsyncWrite`.
pub trait AsyncReadWrite: AsyncRead + AsyncWrite {}
impl<T: AsyncRead + AsyncWrite> AsyncReadWrite for T {}

/// Contract for wrapping a plain TCP stream in TLS. External collaborator
/// per spec §1 ("TLS primitives... socket/TLS factories").
#[async_trait::async_trait]
pub trait TlsConnector: Send + Sync {
    /// Performs the TLS handshake against `server_name`, returning the
    /// negotiated ALPN protocol and handshake info alongside the stream.
    async fn connect(
        &self,
        server_name: &str,
        spec: &ConnectionSpec,
        alpn: &AlpnProtos,
        stream: tokio::net::TcpStream,
    ) -> Result<(BoxedTlsStream, AlpnProtocol, TlsInfo), Error>;
}

impl fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConfig")
            .field("cert_verification", &self.cert_verification)
            .finish()
    }
}

#[cfg(feature = "rustls-tls")]
pub(crate) mod rustls_connector {
    use std::sync::Arc;

    use rustls::pki_types::ServerName;
    use tokio_rustls::TlsConnector as RustlsTlsConnector;

    use super::*;

    /// Default [`TlsConnector`] backed by `rustls` with the `webpki-roots`
    /// trust bundle, matching the teacher crate's `rustls-tls-webpki-roots`
    /// feature.
    pub struct DefaultTlsConnector {
        cert_verification: bool,
        root_store: Arc<rustls::RootCertStore>,
    }

    impl DefaultTlsConnector {
        pub fn new(cert_verification: bool) -> Result<DefaultTlsConnector, Error> {
            let root_store = rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            Ok(DefaultTlsConnector { cert_verification, root_store: Arc::new(root_store) })
        }

        /// Builds a `ClientConfig` restricted to the versions permitted by
        /// `spec`'s floor (spec §4.4 step 5, TLS fallback: each successive
        /// spec in the list widens the allowed version range downward).
        fn config_for(&self, spec: &ConnectionSpec) -> Result<rustls::ClientConfig, Error> {
            let versions: &[&'static rustls::SupportedProtocolVersion] = match spec.min_version {
                TlsVersion::Tls1_3 => &[&rustls::version::TLS13],
                TlsVersion::Tls1_2 => &[&rustls::version::TLS12, &rustls::version::TLS13],
            };
            let builder = rustls::ClientConfig::builder_with_protocol_versions(versions)
                .with_root_certificates((*self.root_store).clone());
            let mut config = builder.with_no_client_auth();
            if !self.cert_verification {
                config
                    .dangerous()
                    .set_certificate_verifier(Arc::new(NoVerifier));
            }
            config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
            Ok(config)
        }
    }

    #[derive(Debug)]
    struct NoVerifier;

    impl rustls::client::danger::ServerCertVerifier for NoVerifier {
        fn verify_server_cert(
            &self,
            _end_entity: &rustls::pki_types::CertificateDer<'_>,
            _intermediates: &[rustls::pki_types::CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: rustls::pki_types::UnixTime,
        ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
            Ok(rustls::client::danger::ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            _message: &[u8],
            _cert: &rustls::pki_types::CertificateDer<'_>,
            _dss: &rustls::DigitallySignedStruct,
        ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
            Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
        }

        fn verify_tls13_signature(
            &self,
            _message: &[u8],
            _cert: &rustls::pki_types::CertificateDer<'_>,
            _dss: &rustls::DigitallySignedStruct,
        ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
            Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
        }

        fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
            rustls::crypto::ring::default_provider().signature_verification_algorithms.supported_schemes()
        }
    }

    #[async_trait::async_trait]
    impl TlsConnector for DefaultTlsConnector {
        async fn connect(
            &self,
            server_name: &str,
            spec: &ConnectionSpec,
            alpn: &AlpnProtos,
            stream: tokio::net::TcpStream,
        ) -> Result<(BoxedTlsStream, AlpnProtocol, TlsInfo), Error> {
            let config = self.config_for(spec)?;
            let connector = RustlsTlsConnector::from(Arc::new(config));
            let name = ServerName::try_from(server_name.to_owned()).map_err(Error::tls)?;
            let tls_stream = connector.connect(name, stream).await.map_err(Error::tls)?;

            let (_, conn_state) = tls_stream.get_ref();
            let negotiated = conn_state
                .alpn_protocol()
                .map(|p| if p == b"h2" { AlpnProtocol::Http2 } else { AlpnProtocol::Http11 })
                .unwrap_or(if alpn.0.contains(&AlpnProtocol::Http2) {
                    AlpnProtocol::Http11
                } else {
                    AlpnProtocol::Http11
                });

            let peer_certificates = conn_state
                .peer_certificates()
                .map(|certs| certs.iter().map(|c| c.as_ref().to_vec()).collect())
                .unwrap_or_default();

            let info = TlsInfo {
                cipher_suite: conn_state.negotiated_cipher_suite().map(|cs| format!("{:?}", cs.suite())),
                version: conn_state.protocol_version().map(|v| match v {
                    rustls::ProtocolVersion::TLSv1_3 => TlsVersion::Tls1_3,
                    _ => TlsVersion::Tls1_2,
                }),
                peer_certificates,
                local_certificates: Vec::new(),
            };

            Ok((Box::new(tls_stream), negotiated, info))
        }
    }
}

#[cfg(feature = "rustls-tls")]
pub(crate) use rustls_connector::DefaultTlsConnector;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpn_all_prefers_http2() {
        let protos = AlpnProtos::all();
        assert_eq!(protos.0.first(), Some(&AlpnProtocol::Http2));
    }

    #[test]
    fn default_connection_specs_fall_back_to_tls12() {
        let cfg = TlsConfig::default();
        assert_eq!(cfg.specs.len(), 2);
        assert!(cfg.specs[1].is_fallback);
        assert_eq!(cfg.specs[1].min_version, TlsVersion::Tls1_2);
    }
}
