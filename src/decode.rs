//! Transparent gzip response decoding, behind the `gzip` feature.
//!
//! Content decoding beyond gzip is an explicit spec Non-goal; gzip itself
//! is in scope and decoded transparently (never exposed to the caller as
//! compressed bytes), matching the teacher crate's `Accepts`/decoder split
//! between "what we advertise" (`Accept-Encoding`, written by the call
//! engine) and "what we decode" (here).

use async_compression::tokio::bufread::GzipDecoder;
use futures_util::TryStreamExt;
use http::HeaderValue;
use http_body_util::{BodyDataStream, StreamBody};
use tokio_util::io::{ReaderStream, StreamReader};

use crate::{
    body::ResponseBody,
    error::BoxError,
};

/// Whether a `Content-Encoding` header value names gzip.
pub(crate) fn is_gzip(content_encoding: Option<&HeaderValue>) -> bool {
    content_encoding
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("gzip"))
        .unwrap_or(false)
}

/// Wraps `body` in a streaming gzip decoder. The decompressed length is not
/// knowable up front, so callers must drop any `Content-Length` they copied
/// from the wire response alongside the `Content-Encoding` header.
pub(crate) fn gzip_decode(body: ResponseBody) -> ResponseBody {
    let byte_stream = BodyDataStream::new(body).map_err(std::io::Error::other);
    let reader = StreamReader::new(byte_stream);
    let decoder = GzipDecoder::new(reader);
    let decoded = ReaderStream::new(decoder).map_err(|e| Box::new(e) as BoxError);
    crate::body::boxed(StreamBody::new(decoded.map_ok(http_body::Frame::data)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_gzip_case_insensitively() {
        assert!(is_gzip(Some(&HeaderValue::from_static("GZIP"))));
        assert!(!is_gzip(Some(&HeaderValue::from_static("br"))));
        assert!(!is_gzip(None));
    }
}
