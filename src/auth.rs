//! 401/407 authentication follow-up (spec §4.3 step 4).
//!
//! Credential material and challenge-scheme parsing are an external
//! collaborator per spec §1; the crate only contracts the shape of the
//! follow-up ("given the unauthorized response, produce a request to retry
//! with, or decline"). Mirrors the teacher crate's own split between "what
//! we orchestrate" and "what the application supplies" (TLS connector,
//! DNS resolver).

use crate::{error::Result, request::Request, response::Response};

/// Produces a retry request for a `401 Unauthorized` response, e.g. by
/// attaching an `Authorization` header.
///
/// Returning `Ok(None)` declines to authenticate, and the call engine
/// returns the `401` response as-is.
#[async_trait::async_trait]
pub trait Authenticator: Send + Sync {
    /// Consulted once per `401` response, up to the call engine's total
    /// hop cap. Implementations that cannot produce new credentials (e.g.
    /// the same challenge repeated) should return `Ok(None)` rather than
    /// loop forever — the call engine does not deduplicate challenges.
    async fn authenticate(&self, response: &Response) -> Result<Option<Request>>;
}

/// Like [`Authenticator`], for a `407 Proxy Authentication Required`
/// response from a forward proxy.
#[async_trait::async_trait]
pub trait ProxyAuthenticator: Send + Sync {
    /// Consulted once per `407` response.
    async fn authenticate(&self, response: &Response) -> Result<Option<Request>>;
}
