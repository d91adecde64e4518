//! Request/response body types.
//!
//! A [`Body`] is either a reusable in-memory chunk (always replayable) or an
//! opaque byte stream. Streams are one-shot by default: the call engine's
//! retry/follow-up logic (spec §4.3) may only replay a body that is not
//! one-shot and has not already been transmitted — in practice that means
//! only [`Inner::Bytes`] bodies are replayed. A body may additionally be
//! marked *duplex*, meaning its bytes may be written while the response body
//! is concurrently read on the same exchange; HTTP/1.1 rejects duplex bodies
//! with a protocol error (spec §4.7).

use std::{
    fmt,
    pin::Pin,
    task::{Context, Poll, ready},
};

use bytes::Bytes;
use http_body::Body as HttpBody;
use http_body_util::combinators::BoxBody;

use crate::error::{BoxError, Error};

/// A request or response body.
pub struct Body {
    inner: Inner,
    one_shot: bool,
    duplex: bool,
}

enum Inner {
    Bytes(Bytes),
    Streaming(BoxBody<Bytes, BoxError>),
}

pub(crate) type ResponseBody = BoxBody<Bytes, BoxError>;

impl Body {
    /// An empty, replayable body.
    pub fn empty() -> Body {
        Body::bytes(Bytes::new())
    }

    /// A reusable in-memory body. Always replayable.
    pub fn bytes(chunk: Bytes) -> Body {
        Body {
            inner: Inner::Bytes(chunk),
            one_shot: false,
            duplex: false,
        }
    }

    /// Wraps a `futures` stream of byte chunks as a one-shot streaming body.
    pub fn wrap_stream<S>(stream: S) -> Body
    where
        S: futures_util::stream::TryStream + Send + 'static,
        S::Error: Into<BoxError>,
        Bytes: From<S::Ok>,
    {
        use futures_util::TryStreamExt;
        use http_body::Frame;
        use http_body_util::StreamBody;

        let body = http_body_util::BodyExt::boxed(StreamBody::new(
            stream
                .map_ok(|d| Frame::data(Bytes::from(d)))
                .map_err(Into::into),
        ));
        Body {
            inner: Inner::Streaming(body),
            one_shot: true,
            duplex: false,
        }
    }

    /// Wraps an arbitrary [`http_body::Body`] as a one-shot streaming body.
    pub fn wrap<B>(inner: B) -> Body
    where
        B: HttpBody + Send + Sync + 'static,
        B::Data: Into<Bytes>,
        B::Error: Into<BoxError>,
    {
        use http_body_util::BodyExt;
        let boxed = IntoBytesBody { inner }.map_err(Into::into).boxed();
        Body {
            inner: Inner::Streaming(boxed),
            one_shot: true,
            duplex: false,
        }
    }

    /// Marks this body as duplex: its bytes may be written while the
    /// response body is concurrently read on the same exchange.
    ///
    /// Only meaningful over HTTP/2; HTTP/1.1 connections reject a duplex
    /// body outright (spec §4.7).
    pub fn duplex(mut self) -> Body {
        self.duplex = true;
        self
    }

    /// Explicitly marks a streaming body as one-shot (not replayable even if
    /// the caller could in principle reconstruct the stream). This is the
    /// default for any non-`bytes` body.
    pub fn one_shot(mut self) -> Body {
        self.one_shot = true;
        self
    }

    pub(crate) fn is_one_shot(&self) -> bool {
        match self.inner {
            Inner::Bytes(_) => false,
            Inner::Streaming(_) => self.one_shot,
        }
    }

    pub(crate) fn is_duplex(&self) -> bool {
        self.duplex
    }

    /// Returns the raw bytes backing this body, if it is the in-memory
    /// variant (`None` for a stream).
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.inner {
            Inner::Bytes(b) => Some(b.as_ref()),
            Inner::Streaming(_) => None,
        }
    }

    /// Attempts to clone this body for a retry/follow-up replay. Only
    /// in-memory bodies are replayable; see [`Body::is_one_shot`].
    pub(crate) fn try_clone(&self) -> Option<Body> {
        match &self.inner {
            Inner::Bytes(b) => Some(Body::bytes(b.clone())),
            Inner::Streaming(_) => None,
        }
    }

    pub(crate) fn content_length(&self) -> Option<u64> {
        match &self.inner {
            Inner::Bytes(b) => Some(b.len() as u64),
            Inner::Streaming(b) => b.size_hint().exact(),
        }
    }

    pub(crate) fn into_boxed(self) -> BoxBody<Bytes, BoxError> {
        use http_body_util::BodyExt;
        match self.inner {
            Inner::Bytes(b) => http_body_util::Full::new(b).map_err(Into::into).boxed(),
            Inner::Streaming(b) => b,
        }
    }
}

impl Default for Body {
    fn default() -> Body {
        Body::empty()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body")
            .field("one_shot", &self.is_one_shot())
            .field("duplex", &self.duplex)
            .field("content_length", &self.content_length())
            .finish()
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Body {
        Body::bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(vec: Vec<u8>) -> Body {
        Body::bytes(vec.into())
    }
}

impl From<String> for Body {
    fn from(s: String) -> Body {
        Body::bytes(s.into())
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Body {
        Body::bytes(Bytes::from_static(s.as_bytes()))
    }
}

impl From<&'static [u8]> for Body {
    fn from(s: &'static [u8]) -> Body {
        Body::bytes(Bytes::from_static(s))
    }
}

impl HttpBody for Body {
    type Data = Bytes;
    type Error = Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<http_body::Frame<Self::Data>, Self::Error>>> {
        match &mut self.inner {
            Inner::Bytes(bytes) => {
                let out = bytes.split_off(0);
                if out.is_empty() {
                    Poll::Ready(None)
                } else {
                    Poll::Ready(Some(Ok(http_body::Frame::data(out))))
                }
            }
            Inner::Streaming(body) => {
                Poll::Ready(ready!(Pin::new(body).poll_frame(cx)).map(|opt| {
                    opt.map_err(|err| match err.downcast::<Error>() {
                        Ok(err) => *err,
                        Err(err) => Error::body(err),
                    })
                }))
            }
        }
    }

    fn size_hint(&self) -> http_body::SizeHint {
        match &self.inner {
            Inner::Bytes(b) => http_body::SizeHint::with_exact(b.len() as u64),
            Inner::Streaming(b) => b.size_hint(),
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.inner {
            Inner::Bytes(b) => b.is_empty(),
            Inner::Streaming(b) => b.is_end_stream(),
        }
    }
}

pub(crate) fn boxed<B>(body: B) -> ResponseBody
where
    B: HttpBody<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<BoxError>,
{
    use http_body_util::BodyExt;
    body.map_err(Into::into).boxed()
}

pin_project_lite::pin_project! {
    struct IntoBytesBody<B> {
        #[pin]
        inner: B,
    }
}

impl<B> HttpBody for IntoBytesBody<B>
where
    B: HttpBody,
    B::Data: Into<Bytes>,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<http_body::Frame<Self::Data>, Self::Error>>> {
        match ready!(self.project().inner.poll_frame(cx)) {
            Some(Ok(f)) => Poll::Ready(Some(Ok(f.map_data(Into::into)))),
            Some(Err(e)) => Poll::Ready(Some(Err(e))),
            None => Poll::Ready(None),
        }
    }

    fn size_hint(&self) -> http_body::SizeHint {
        self.inner.size_hint()
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }
}

#[cfg(test)]
mod tests {
    use http_body::Body as _;

    use super::Body;

    #[test]
    fn bytes_body_is_replayable() {
        let body = Body::from("hello");
        assert!(!body.is_one_shot());
        assert!(body.try_clone().is_some());
    }

    #[test]
    fn streaming_body_is_one_shot_by_default() {
        let chunks: Vec<Result<_, std::io::Error>> = vec![Ok("a"), Ok("b")];
        let body = Body::wrap_stream(futures_util::stream::iter(chunks));
        assert!(body.is_one_shot());
        assert!(body.try_clone().is_none());
    }

    #[test]
    fn duplex_flag_is_independent_of_one_shot() {
        let body = Body::empty().duplex();
        assert!(body.is_duplex());
        assert!(!body.is_one_shot());
    }

    #[test]
    fn exact_length_reported_for_bytes() {
        let body = Body::from("abc");
        assert_eq!(body.size_hint().exact(), Some(3));
        assert!(!body.is_end_stream());

        let empty = Body::empty();
        assert!(empty.is_end_stream());
        assert_eq!(empty.size_hint().exact(), Some(0));
    }
}
