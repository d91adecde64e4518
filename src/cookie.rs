//! Cookie persistence (external collaborator per spec §1/§6).
//!
//! Parsing `Set-Cookie` attributes, matching domains/paths, and expiry are
//! all left to the implementation; the call engine only needs somewhere to
//! deposit response `Set-Cookie` values and retrieve the `Cookie` header to
//! send for a given URL, mirroring the teacher crate's `CookieStore` trait
//! seam (renamed here since this crate carries no bundled implementation).

use http::HeaderValue;
use url::Url;

/// A pluggable cookie store, consulted by the call engine before sending a
/// request and after receiving a response (spec §4.3 step 1 and step 5).
pub trait CookieJar: Send + Sync {
    /// Stores the `Set-Cookie` header values from a response for `url`.
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url);

    /// Returns the `Cookie` header value(s) to send for a request to `url`,
    /// or `None` if there are none stored.
    fn cookies(&self, url: &Url) -> Option<Vec<HeaderValue>>;
}
