//! The cache entry metadata format (spec §6 "Metadata stream (`.0`) format").
//!
//! Stream 0 holds everything needed to rebuild a [`Response`]'s headers
//! without touching the network; stream 1 (handled by [`super::disk_lru`])
//! holds the raw, still-content-encoded body bytes.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use http::{HeaderMap, HeaderValue, StatusCode, Version, header::HeaderName};
use url::Url;

use crate::{
    error::Error,
    tls::{TlsInfo, TlsVersion},
};

/// The durable record for one cached response.
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry {
    pub(crate) request_url: Url,
    pub(crate) request_method: http::Method,
    /// The subset of the original request's headers named by the stored
    /// response's `Vary` header, captured at write time (spec §4.6 "Vary
    /// matching").
    pub(crate) varied_request_headers: HeaderMap<HeaderValue>,
    pub(crate) version: Version,
    pub(crate) status: StatusCode,
    pub(crate) response_headers: HeaderMap<HeaderValue>,
    pub(crate) sent_at: SystemTime,
    pub(crate) received_at: SystemTime,
    pub(crate) tls_info: Option<TlsInfo>,
}

impl CacheEntry {
    /// Serializes the metadata stream exactly per spec §6.
    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut out = String::new();
        out.push_str(self.request_url.as_str());
        out.push('\n');
        out.push_str(self.request_method.as_str());
        out.push('\n');

        out.push_str(&self.varied_request_headers.len().to_string());
        out.push('\n');
        for (name, value) in self.varied_request_headers.iter() {
            push_header_line(&mut out, name, value);
        }

        out.push_str(&format!("{:?} {} {}\n", self.version, self.status.as_u16(), self.status.canonical_reason().unwrap_or("")));

        out.push_str(&self.response_headers.len().to_string());
        out.push('\n');
        for (name, value) in self.response_headers.iter() {
            push_header_line(&mut out, name, value);
        }

        out.push_str(&millis_since_epoch(self.sent_at).to_string());
        out.push('\n');
        out.push_str(&millis_since_epoch(self.received_at).to_string());
        out.push('\n');
        out.push('\n');

        if let Some(tls) = &self.tls_info {
            out.push_str(tls.cipher_suite.as_deref().unwrap_or(""));
            out.push('\n');
            out.push_str(&tls.peer_certificates.len().to_string());
            out.push('\n');
            for cert in &tls.peer_certificates {
                out.push_str(&base64::Engine::encode(&base64::engine::general_purpose::STANDARD, cert));
                out.push('\n');
            }
            out.push_str(&tls.local_certificates.len().to_string());
            out.push('\n');
            for cert in &tls.local_certificates {
                out.push_str(&base64::Engine::encode(&base64::engine::general_purpose::STANDARD, cert));
                out.push('\n');
            }
            if let Some(version) = tls.version {
                out.push_str(version.as_str());
                out.push('\n');
            }
        }

        out.into_bytes()
    }

    /// Parses the metadata stream, accepting legacy variants (spec §6
    /// "Legacy formats ... are accepted on read"): a missing trailing TLS
    /// version line, and response header lines using a leading `:status`
    /// pseudo-header instead of the status line it otherwise duplicates.
    pub(crate) fn decode(bytes: &[u8]) -> Result<CacheEntry, Error> {
        let text = std::str::from_utf8(bytes).map_err(Error::cache)?;
        let mut lines = text.lines();

        let request_url = next_line(&mut lines)?;
        let request_url = Url::parse(&request_url).map_err(Error::cache)?;
        let request_method_str = next_line(&mut lines)?;
        let request_method = request_method_str.parse::<http::Method>().map_err(Error::cache)?;

        let varied_count: usize = next_line(&mut lines)?.trim().parse().map_err(Error::cache)?;
        let mut varied_request_headers = HeaderMap::new();
        for _ in 0..varied_count {
            let line = next_line(&mut lines)?;
            if let Some((name, value)) = parse_header_line(&line) {
                varied_request_headers.append(name, value);
            }
        }

        let status_line = next_line(&mut lines)?;
        let (version, status) = parse_status_line(&status_line)?;

        let header_count: usize = next_line(&mut lines)?.trim().parse().map_err(Error::cache)?;
        let mut response_headers = HeaderMap::new();
        for _ in 0..header_count {
            let line = next_line(&mut lines)?;
            // Legacy lenient ":status"-prefixed lines are accepted but
            // carry no information beyond what `status_line` already gave.
            if line.starts_with(':') {
                continue;
            }
            if let Some((name, value)) = parse_header_line(&line) {
                response_headers.append(name, value);
            }
        }

        let sent_at = millis_to_time(next_line(&mut lines)?.trim().parse().map_err(Error::cache)?);
        let received_at = millis_to_time(next_line(&mut lines)?.trim().parse().map_err(Error::cache)?);
        let _blank = lines.next();

        let tls_info = if let Some(cipher_line) = lines.next() {
            let cipher_suite = if cipher_line.is_empty() { None } else { Some(cipher_line.to_string()) };
            let peer_count: usize = next_line(&mut lines)?.trim().parse().unwrap_or(0);
            let mut peer_certificates = Vec::with_capacity(peer_count);
            for _ in 0..peer_count {
                peer_certificates.push(decode_base64(&next_line(&mut lines)?)?);
            }
            let local_count: usize = next_line(&mut lines)?.trim().parse().unwrap_or(0);
            let mut local_certificates = Vec::with_capacity(local_count);
            for _ in 0..local_count {
                local_certificates.push(decode_base64(&next_line(&mut lines)?)?);
            }
            // Legacy entries predate the trailing TLS-version line.
            let version = lines.next().and_then(TlsVersion::from_str);
            Some(TlsInfo { cipher_suite, version, peer_certificates, local_certificates })
        } else {
            None
        };

        Ok(CacheEntry {
            request_url,
            request_method,
            varied_request_headers,
            version,
            status,
            response_headers,
            sent_at,
            received_at,
            tls_info,
        })
    }
}

fn push_header_line(out: &mut String, name: &HeaderName, value: &HeaderValue) {
    out.push_str(name.as_str());
    out.push_str(": ");
    out.push_str(value.to_str().unwrap_or(""));
    out.push('\n');
}

fn parse_header_line(line: &str) -> Option<(HeaderName, HeaderValue)> {
    let (name, value) = line.split_once(':')?;
    let name = name.trim().parse::<HeaderName>().ok()?;
    let value = HeaderValue::from_str(value.trim()).ok()?;
    Some((name, value))
}

fn parse_status_line(line: &str) -> Result<(Version, StatusCode), Error> {
    let mut parts = line.splitn(3, ' ');
    let version_str = parts.next().unwrap_or("");
    let code_str = parts.next().unwrap_or("");
    let version = match version_str {
        "HTTP/1.1" => Version::HTTP_11,
        "HTTP/2.0" => Version::HTTP_2,
        other => {
            // `{:?}` formatting of `http::Version` (used by `encode`)
            // yields e.g. "HTTP/1.1"; fall back permissively for anything
            // else rather than failing a legacy read.
            let _ = other;
            Version::HTTP_11
        }
    };
    let status = code_str.trim().parse::<u16>().ok().and_then(|c| StatusCode::from_u16(c).ok()).ok_or_else(|| Error::cache("malformed status line"))?;
    Ok((version, status))
}

fn next_line(lines: &mut std::str::Lines<'_>) -> Result<String, Error> {
    lines.next().map(str::to_string).ok_or_else(|| Error::cache("truncated cache entry metadata"))
}

fn decode_base64(s: &str) -> Result<Vec<u8>, Error> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(s.trim()).map_err(Error::cache)
}

fn millis_since_epoch(t: SystemTime) -> u128 {
    t.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO).as_millis()
}

fn millis_to_time(millis: u128) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(millis as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> CacheEntry {
        let mut response_headers = HeaderMap::new();
        response_headers.insert(http::header::CACHE_CONTROL, HeaderValue::from_static("max-age=60"));
        response_headers.insert(http::header::ETAG, HeaderValue::from_static("\"v1\""));

        let mut varied = HeaderMap::new();
        varied.insert(http::header::ACCEPT_ENCODING, HeaderValue::from_static("gzip"));

        CacheEntry {
            request_url: Url::parse("https://example.com/a").unwrap(),
            request_method: http::Method::GET,
            varied_request_headers: varied,
            version: Version::HTTP_11,
            status: StatusCode::OK,
            response_headers,
            sent_at: UNIX_EPOCH + Duration::from_secs(1000),
            received_at: UNIX_EPOCH + Duration::from_secs(1001),
            tls_info: None,
        }
    }

    #[test]
    fn round_trips_through_encode_decode() {
        let entry = sample_entry();
        let bytes = entry.encode();
        let decoded = CacheEntry::decode(&bytes).unwrap();
        assert_eq!(decoded.request_url, entry.request_url);
        assert_eq!(decoded.status, entry.status);
        assert_eq!(decoded.response_headers.get("etag"), entry.response_headers.get("etag"));
        assert_eq!(decoded.varied_request_headers.get("accept-encoding"), Some(&HeaderValue::from_static("gzip")));
        assert_eq!(decoded.sent_at, entry.sent_at);
    }

    #[test]
    fn round_trips_tls_info() {
        let mut entry = sample_entry();
        entry.tls_info = Some(TlsInfo {
            cipher_suite: Some("TLS_AES_128_GCM_SHA256".to_string()),
            version: Some(TlsVersion::Tls1_3),
            peer_certificates: vec![vec![1, 2, 3]],
            local_certificates: vec![],
        });
        let bytes = entry.encode();
        let decoded = CacheEntry::decode(&bytes).unwrap();
        let tls = decoded.tls_info.unwrap();
        assert_eq!(tls.cipher_suite.as_deref(), Some("TLS_AES_128_GCM_SHA256"));
        assert_eq!(tls.version, Some(TlsVersion::Tls1_3));
        assert_eq!(tls.peer_certificates, vec![vec![1, 2, 3]]);
    }

    #[test]
    fn legacy_entry_without_tls_version_line_still_decodes() {
        let mut entry = sample_entry();
        entry.tls_info = Some(TlsInfo {
            cipher_suite: Some("TLS_AES_128_GCM_SHA256".to_string()),
            version: None,
            peer_certificates: vec![],
            local_certificates: vec![],
        });
        let bytes = entry.encode();
        let decoded = CacheEntry::decode(&bytes).unwrap();
        assert!(decoded.tls_info.unwrap().version.is_none());
    }
}
