//! Redirect policy (spec §4.3 step 4: 3xx follow-up rules).
//!
//! By default a [`Client`](crate::Client) follows redirects up to the
//! standard cap; use [`Policy`] to customize or disable this.

use std::sync::Arc;

use http::{
    HeaderMap,
    header::{AUTHORIZATION, COOKIE, PROXY_AUTHORIZATION, WWW_AUTHENTICATE},
    StatusCode,
};
use url::Url;

/// Maximum redirect hops the default policy allows (spec §4.3: "cap 20
/// hops"; combined with retries the call engine caps total hops at 21).
pub const DEFAULT_MAX_REDIRECTS: usize = 20;

/// Controls how a [`Client`](crate::Client) follows 3xx responses.
#[derive(Clone)]
pub struct Policy {
    inner: Kind,
}

#[derive(Clone)]
enum Kind {
    Limited(usize),
    None,
    Custom(Arc<dyn Fn(&Attempt<'_>) -> Action + Send + Sync>),
}

/// Information about the next redirect hop, passed to a custom policy
/// closure.
#[derive(Debug)]
pub struct Attempt<'a> {
    /// The status code that triggered this redirect decision.
    pub status: StatusCode,
    /// The URL the response asked to redirect to.
    pub next: &'a Url,
    /// The chain of URLs visited so far, oldest first.
    pub previous: &'a [Url],
    /// The response headers of the redirecting response.
    pub headers: &'a HeaderMap,
}

/// What to do about a pending redirect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Follow the redirect.
    Follow,
    /// Stop, returning the redirecting response as-is.
    Stop,
    /// Stop with an error (too many redirects / policy-rejected).
    Error,
}

impl Policy {
    /// Follow up to `max` redirects, then error.
    pub fn limited(max: usize) -> Policy {
        Policy { inner: Kind::Limited(max) }
    }

    /// Never follow redirects.
    pub fn none() -> Policy {
        Policy { inner: Kind::None }
    }

    /// A fully custom policy. The closure does not get automatic loop/cap
    /// protection — build that in if desired.
    pub fn custom<F>(f: F) -> Policy
    where
        F: Fn(&Attempt<'_>) -> Action + Send + Sync + 'static,
    {
        Policy { inner: Kind::Custom(Arc::new(f)) }
    }

    pub(crate) fn decide(&self, attempt: &Attempt<'_>) -> Action {
        match &self.inner {
            Kind::None => Action::Stop,
            Kind::Limited(max) => {
                if attempt.previous.len() >= *max {
                    Action::Error
                } else {
                    Action::Follow
                }
            }
            Kind::Custom(f) => f(attempt),
        }
    }

    /// Whether this policy ever follows a redirect at all — used by the call
    /// engine to skip the 3xx follow-up path entirely for `Policy::none()`.
    pub(crate) fn is_none(&self) -> bool {
        matches!(self.inner, Kind::None)
    }
}

impl Default for Policy {
    fn default() -> Policy {
        Policy::none()
    }
}

impl std::fmt::Debug for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            Kind::None => f.write_str("Policy::none"),
            Kind::Limited(max) => write!(f, "Policy::limited({max})"),
            Kind::Custom(_) => f.write_str("Policy::custom"),
        }
    }
}

/// Whether a 3xx status code is one the call engine follows automatically
/// (spec §4.3: 301/302/303/307/308).
pub(crate) fn is_redirect_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

/// Whether a redirect with this status should downgrade the method to GET
/// and drop the body (303 always; 301/302 for non-HEAD historically, but
/// this crate keeps the method for 307/308 which are spec'd to preserve it).
pub(crate) fn strips_body(status: StatusCode, method: &http::Method) -> bool {
    match status {
        StatusCode::SEE_OTHER => method != http::Method::HEAD,
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND => method == http::Method::POST,
        _ => false,
    }
}

/// Strips headers that must not cross to a different host on redirect (spec
/// §4.3 step 4: follow-up rebuilds the request; credentials targeting the
/// original host have no business reaching a new one).
pub(crate) fn remove_sensitive_headers(headers: &mut HeaderMap, next: &Url, previous: &[Url]) {
    let Some(previous) = previous.last() else { return };
    let cross_host = next.host_str() != previous.host_str()
        || next.port_or_known_default() != previous.port_or_known_default()
        || next.scheme() != previous.scheme();
    if cross_host {
        headers.remove(AUTHORIZATION);
        headers.remove(COOKIE);
        headers.remove("cookie2");
        headers.remove(PROXY_AUTHORIZATION);
        headers.remove(WWW_AUTHENTICATE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limited_policy_errors_past_cap() {
        let policy = Policy::limited(2);
        let prev = vec![Url::parse("http://a").unwrap(), Url::parse("http://b").unwrap()];
        let next = Url::parse("http://c").unwrap();
        let headers = HeaderMap::new();
        let attempt = Attempt {
            status: StatusCode::FOUND,
            next: &next,
            previous: &prev,
            headers: &headers,
        };
        assert_eq!(policy.decide(&attempt), Action::Error);
    }

    #[test]
    fn none_policy_always_stops() {
        let policy = Policy::none();
        let next = Url::parse("http://c").unwrap();
        let headers = HeaderMap::new();
        let attempt = Attempt {
            status: StatusCode::FOUND,
            next: &next,
            previous: &[],
            headers: &headers,
        };
        assert_eq!(policy.decide(&attempt), Action::Stop);
    }

    #[test]
    fn sensitive_headers_dropped_crossing_host() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer secret".parse().unwrap());
        headers.insert(COOKIE, "session=1".parse().unwrap());
        let previous = vec![Url::parse("https://a.example").unwrap()];
        let next = Url::parse("https://b.example").unwrap();
        remove_sensitive_headers(&mut headers, &next, &previous);
        assert!(headers.get(AUTHORIZATION).is_none());
        assert!(headers.get(COOKIE).is_none());
    }

    #[test]
    fn sensitive_headers_kept_on_same_host() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer secret".parse().unwrap());
        let previous = vec![Url::parse("https://a.example/x").unwrap()];
        let next = Url::parse("https://a.example/y").unwrap();
        remove_sensitive_headers(&mut headers, &next, &previous);
        assert!(headers.get(AUTHORIZATION).is_some());
    }

    #[test]
    fn see_other_strips_body_except_for_head() {
        assert!(strips_body(StatusCode::SEE_OTHER, &http::Method::POST));
        assert!(!strips_body(StatusCode::SEE_OTHER, &http::Method::HEAD));
    }
}
