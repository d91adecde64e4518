//! The crate's unified error type.

use std::{error::Error as StdError, fmt, io};

use url::Url;

/// A `Result` alias where the `Err` case is `corehttp::Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// A boxed error type used internally to erase the concrete source error.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// The error type for all fallible operations exposed by this crate.
///
/// Mirrors the error taxonomy of the call pipeline: builder-time mistakes,
/// connect/transport failures, cache faults, policy violations (too many
/// redirects, pin failures), and cancellation are all represented as
/// distinct [`Kind`]s so callers can match on them without string-parsing
/// messages.
pub struct Error {
    inner: Box<Inner>,
}

struct Inner {
    kind: Kind,
    source: Option<BoxError>,
    url: Option<Url>,
}

#[derive(Debug)]
pub(crate) enum Kind {
    Builder,
    Request,
    Connect,
    Tls,
    Redirect,
    Body,
    Decode,
    Cache,
    Policy,
    Cancelled,
    Status(http::StatusCode),
}

impl Error {
    pub(crate) fn new<E>(kind: Kind, source: Option<E>) -> Error
    where
        E: Into<BoxError>,
    {
        Error {
            inner: Box::new(Inner {
                kind,
                source: source.map(Into::into),
                url: None,
            }),
        }
    }

    pub(crate) fn builder<E: Into<BoxError>>(e: E) -> Error {
        Error::new(Kind::Builder, Some(e))
    }

    pub(crate) fn request<E: Into<BoxError>>(e: E) -> Error {
        Error::new(Kind::Request, Some(e))
    }

    pub(crate) fn connect<E: Into<BoxError>>(e: E) -> Error {
        Error::new(Kind::Connect, Some(e))
    }

    pub(crate) fn tls<E: Into<BoxError>>(e: E) -> Error {
        Error::new(Kind::Tls, Some(e))
    }

    pub(crate) fn redirect<E: Into<BoxError>>(e: E, url: Url) -> Error {
        Error::new(Kind::Redirect, Some(e)).with_url(url)
    }

    pub(crate) fn body<E: Into<BoxError>>(e: E) -> Error {
        Error::new(Kind::Body, Some(e))
    }

    pub(crate) fn decode<E: Into<BoxError>>(e: E) -> Error {
        Error::new(Kind::Decode, Some(e))
    }

    pub(crate) fn cache<E: Into<BoxError>>(e: E) -> Error {
        Error::new(Kind::Cache, Some(e))
    }

    pub(crate) fn policy<E: Into<BoxError>>(e: E) -> Error {
        Error::new(Kind::Policy, Some(e))
    }

    pub(crate) fn cancelled() -> Error {
        Error::new(Kind::Cancelled, None::<BoxError>)
    }

    pub(crate) fn status_code(url: Url, status: http::StatusCode) -> Error {
        Error::new(Kind::Status(status), None::<BoxError>).with_url(url)
    }

    /// Returns the URL related to this error, if any.
    pub fn url(&self) -> Option<&Url> {
        self.inner.url.as_ref()
    }

    /// Strips the URL from this error, e.g. to avoid leaking a query string
    /// that carries sensitive data.
    pub fn without_url(mut self) -> Self {
        self.inner.url = None;
        self
    }

    pub(crate) fn with_url(mut self, url: Url) -> Self {
        self.inner.url = Some(url);
        self
    }

    /// True if the error originated while building a `Client` or `Request`.
    pub fn is_builder(&self) -> bool {
        matches!(self.inner.kind, Kind::Builder)
    }

    /// True if the error is a redirect-policy violation (e.g. too many hops).
    pub fn is_redirect(&self) -> bool {
        matches!(self.inner.kind, Kind::Redirect)
    }

    /// True if the error carries a non-2xx/3xx status surfaced via
    /// `Response::error_for_status`.
    pub fn is_status(&self) -> bool {
        matches!(self.inner.kind, Kind::Status(_))
    }

    /// True if the error is a connect-time failure (DNS, TCP, TLS handshake).
    pub fn is_connect(&self) -> bool {
        matches!(self.inner.kind, Kind::Connect)
    }

    /// True if the error is related to TLS (handshake, pinning, verifier).
    pub fn is_tls(&self) -> bool {
        matches!(self.inner.kind, Kind::Tls)
    }

    /// True if the error is related to the request or response body.
    pub fn is_body(&self) -> bool {
        matches!(self.inner.kind, Kind::Body)
    }

    /// True if the error is related to decoding the response body
    /// (e.g. a malformed gzip stream).
    pub fn is_decode(&self) -> bool {
        matches!(self.inner.kind, Kind::Decode)
    }

    /// True if the error originated in the HTTP cache (journal corruption,
    /// write abort).
    pub fn is_cache(&self) -> bool {
        matches!(self.inner.kind, Kind::Cache)
    }

    /// True if the error is a policy violation: too many follow-ups,
    /// certificate pin failure, hostname verification failure.
    pub fn is_policy(&self) -> bool {
        matches!(self.inner.kind, Kind::Policy)
    }

    /// True if the call was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.inner.kind, Kind::Cancelled)
    }

    /// True if this error, or any error in its source chain, represents a
    /// timed-out operation.
    pub fn is_timeout(&self) -> bool {
        let mut source = self.source();
        while let Some(err) = source {
            if err.downcast_ref::<TimedOut>().is_some() {
                return true;
            }
            if let Some(io) = err.downcast_ref::<io::Error>() {
                if io.kind() == io::ErrorKind::TimedOut {
                    return true;
                }
            }
            source = err.source();
        }
        false
    }

    /// Returns the status code, if the error was generated from a response.
    pub fn status(&self) -> Option<http::StatusCode> {
        match self.inner.kind {
            Kind::Status(code) => Some(code),
            _ => None,
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = f.debug_struct("corehttp::Error");
        builder.field("kind", &self.inner.kind);
        if let Some(ref url) = self.inner.url {
            builder.field("url", url);
        }
        if let Some(ref source) = self.inner.source {
            builder.field("source", source);
        }
        builder.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.kind {
            Kind::Builder => f.write_str("builder error")?,
            Kind::Request => f.write_str("error sending request")?,
            Kind::Connect => f.write_str("error connecting")?,
            Kind::Tls => f.write_str("tls error")?,
            Kind::Redirect => f.write_str("error following redirect")?,
            Kind::Body => f.write_str("request or response body error")?,
            Kind::Decode => f.write_str("error decoding response body")?,
            Kind::Cache => f.write_str("http cache error")?,
            Kind::Policy => f.write_str("policy violation")?,
            Kind::Cancelled => f.write_str("call was cancelled")?,
            Kind::Status(code) => write!(f, "http status error ({code})")?,
        }
        if let Some(url) = &self.inner.url {
            write!(f, " for url ({url})")?;
        }
        if let Some(e) = &self.inner.source {
            write!(f, ": {e}")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source.as_ref().map(|e| &**e as _)
    }
}

#[derive(Debug)]
pub(crate) struct TimedOut;

impl fmt::Display for TimedOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("operation timed out")
    }
}

impl StdError for TimedOut {}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn error_is_send_sync() {
        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn source_chain() {
        let root = Error::new(Kind::Request, None::<Error>);
        assert!(root.source().is_none());

        let wrapped = Error::body(root);
        assert!(wrapped.source().is_some());
        assert!(wrapped.is_body());
    }

    #[test]
    fn is_timeout_through_io_error() {
        let io = io::Error::from(io::ErrorKind::TimedOut);
        let err = Error::connect(io);
        assert!(err.is_timeout());
    }

    #[test]
    fn without_url_strips_sensitive_query() {
        let url = Url::parse("https://example.com/?api_key=secret").unwrap();
        let err = Error::redirect(TimedOut, url).without_url();
        assert!(err.url().is_none());
    }
}
