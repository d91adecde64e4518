//! The call engine: drives one logical call through the interceptor chain,
//! building the effective request, then deciding retries (on connect
//! failure) and follow-ups (redirects, authentication, 408/503) up to the
//! combined hop cap (spec §4.3).
//!
//! Kept deliberately thin: the *rules* for what counts as a retry-eligible
//! failure or a follow-up-worthy status live in [`crate::interceptor::retry`]
//! and [`crate::redirect`] as pure functions, so this module is mostly
//! sequencing and request-rebuilding.

use std::sync::Arc;
use std::time::Instant;

use http::{HeaderValue, Method, StatusCode, header};
use url::Url;

use crate::{
    client::{Client, run_chain},
    error::{Error, Result},
    interceptor::retry::{self, FollowUp},
    observer::EventListener,
    redirect,
    request::Request,
    response::Response,
};

/// Total hops (retries + follow-ups combined) before giving up (spec §4.3
/// step 5: "Maximum 21 hops including retries").
const MAX_HOPS: u32 = 21;

pub(crate) struct Call {
    client: Client,
    request: Request,
}

impl Call {
    pub(crate) fn new(client: Client, request: Request) -> Call {
        Call { client, request }
    }

    pub(crate) async fn execute(self) -> Result<Response> {
        let Call { client, request } = self;
        let listener = client.event_listener_factory().create(request.url());
        listener.call_start(request.url());

        let deadline = call_deadline(&client, &request);
        let result = drive(&client, request, &listener, deadline).await;

        match &result {
            Ok(_) => listener.call_end(),
            Err(err) => listener.call_failed(&err.to_string()),
        }
        result
    }
}

fn call_deadline(client: &Client, request: &Request) -> Option<Instant> {
    let timeout = request.timeout().unwrap_or_else(|| client.call_timeout());
    if timeout.is_zero() { None } else { Some(Instant::now() + timeout) }
}

/// Runs the retry/follow-up loop for one call (spec §4.3).
async fn drive(
    client: &Client,
    mut request: Request,
    listener: &Arc<dyn EventListener>,
    deadline: Option<Instant>,
) -> Result<Response> {
    let mut visited_urls: Vec<Url> = vec![request.url().clone()];
    let mut prior_summaries = Vec::new();
    let mut hops: u32 = 0;
    let mut silent_408_used = false;

    loop {
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                return Err(Error::request("call timed out"));
            }
        }

        // Clone the undecorated request *before* building the effective one,
        // so a connect-time retry starts clean instead of re-appending
        // cookies/default headers onto an already-decorated copy (spec §4.3
        // step 3 requires the body not to have been transmitted yet; a
        // streaming, one-shot body can never satisfy this, so `try_clone`
        // is the single source of truth for replayability here, matching
        // `Body::is_one_shot`).
        let retry_clone = request.try_clone();
        let mut attempt = request;
        apply_effective_request(client, &mut attempt);

        match run_chain(client, attempt, listener.clone()).await {
            Err(err) => {
                let body_replayable = retry_clone.is_some();
                // The connect interceptor's route planner tracks per-address
                // failure state internally and already exhausts every planned
                // route before surfacing a connect error, so from here
                // "another route remains" is always true for the purposes of
                // this decision.
                if hops < MAX_HOPS
                    && retry::should_retry_after_failure(&err, client.retry_on_connection_failure(), body_replayable, true)
                {
                    hops += 1;
                    request = retry_clone.expect("body_replayable implies a clone exists");
                    continue;
                }
                return Err(err);
            }
            Ok(mut response) => {
                deliver_cookies(client, &mut response);

                if hops >= MAX_HOPS {
                    listener.follow_up_decision(false);
                    return Err(Error::policy(format!("stopped after {MAX_HOPS} hops")));
                }

                match follow_up_request(client, &response, &mut visited_urls, &mut silent_408_used).await? {
                    Some(next) => {
                        listener.follow_up_decision(true);
                        hops += 1;
                        prior_summaries.push(response.summarize());
                        request = next;
                        continue;
                    }
                    None => {
                        listener.follow_up_decision(false);
                        for summary in prior_summaries.drain(..) {
                            response.push_prior(summary);
                        }
                        return Ok(response);
                    }
                }
            }
        }
    }
}

/// Builds the "effective" request sent on the wire for one attempt: default
/// headers not already present, the `Host` header, transparent
/// `Accept-Encoding: gzip` (spec §4.3 step 1), and any cookies the jar has
/// stored for this URL (spec §4.3 step 1, §9.2 cookie-jar contract).
fn apply_effective_request(client: &Client, request: &mut Request) {
    for (name, value) in client.default_headers().iter() {
        if !request.headers().contains_key(name) {
            request.headers_mut().insert(name.clone(), value.clone());
        }
    }

    if !request.headers().contains_key(header::HOST) {
        if let Some(host) = host_header_value(request.url()) {
            request.headers_mut().insert(header::HOST, host);
        }
    }

    #[cfg(feature = "gzip")]
    if !request.headers().contains_key(header::ACCEPT_ENCODING) {
        request
            .headers_mut()
            .insert(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip"));
    }

    if let Some(jar) = client.cookie_jar() {
        if let Some(values) = jar.cookies(request.url()) {
            for value in values {
                request.headers_mut().append(header::COOKIE, value);
            }
        }
    }
}

fn host_header_value(url: &Url) -> Option<HeaderValue> {
    let host = url.host()?;
    let rendered = match host {
        url::Host::Ipv6(addr) => format!("[{addr}]"),
        other => other.to_string(),
    };
    let value = match url.port() {
        Some(port) => format!("{rendered}:{port}"),
        None => rendered,
    };
    HeaderValue::from_str(&value).ok()
}

fn deliver_cookies(client: &Client, response: &mut Response) {
    let Some(jar) = client.cookie_jar() else { return };
    let mut values = response.headers().get_all(header::SET_COOKIE).iter();
    jar.set_cookies(&mut values, response.url());
}

/// Decides the follow-up for a completed response (spec §4.3 step 4):
/// 401/407 consult the configured authenticators, 3xx follows the redirect
/// policy, 408/503 get the pure status-based decision from
/// [`crate::interceptor::retry::followup_for_status`]. Returns the request
/// to retry with, or `None` to surface `response` as the final result.
async fn follow_up_request(
    client: &Client,
    response: &Response,
    visited_urls: &mut Vec<Url>,
    silent_408_used: &mut bool,
) -> Result<Option<Request>> {
    let status = response.status();

    if status == StatusCode::UNAUTHORIZED {
        if let Some(authenticator) = client.authenticator() {
            return authenticator.authenticate(response).await;
        }
        return Ok(None);
    }

    if status == StatusCode::PROXY_AUTHENTICATION_REQUIRED {
        if let Some(authenticator) = client.proxy_authenticator() {
            return authenticator.authenticate(response).await;
        }
        return Ok(None);
    }

    if redirect::is_redirect_status(status) {
        if !client.follow_redirects() {
            return Ok(None);
        }
        return redirect_request(client, response, visited_urls);
    }

    let base = response.request();
    let is_one_shot = base.body().map(|b| b.is_one_shot()).unwrap_or(false);
    match retry::followup_for_status(status, response.headers(), base.method(), true, is_one_shot, *silent_408_used) {
        FollowUp::None => Ok(None),
        FollowUp::Retry { drop_body } => {
            if status == StatusCode::REQUEST_TIMEOUT {
                *silent_408_used = true;
            }
            Ok(Some(rebuild_request(base, base.url().clone(), base.method().clone(), drop_body)))
        }
    }
}

/// Builds the redirected request per spec §4.3 step 4: resolves `Location`
/// against the current URL, applies the redirect policy's hop cap, enforces
/// `followSslRedirects` on a scheme change, strips the body for 303-style
/// redirects, and drops credentials that must not cross to a new host.
fn redirect_request(client: &Client, response: &Response, visited_urls: &mut Vec<Url>) -> Result<Option<Request>> {
    let Some(location) = response.headers().get(header::LOCATION) else {
        return Ok(None);
    };
    let location = match location.to_str() {
        Ok(l) => l,
        Err(_) => return Ok(None),
    };
    let base = response.request();
    let next_url = match base.url().join(location) {
        Ok(u) => u,
        Err(_) => return Ok(None),
    };

    if (next_url.scheme() == "http" || next_url.scheme() == "https") && next_url.scheme() != base.url().scheme() && !client.follow_ssl_redirects()
    {
        return Ok(None);
    }

    let attempt = redirect::Attempt {
        status: response.status(),
        next: &next_url,
        previous: visited_urls,
        headers: response.headers(),
    };
    match client.redirect_policy().decide(&attempt) {
        redirect::Action::Stop => return Ok(None),
        redirect::Action::Error => {
            return Err(Error::redirect(format!("exceeded redirect cap following {next_url}"), next_url));
        }
        redirect::Action::Follow => {}
    }

    let drop_body = redirect::strips_body(response.status(), base.method());
    if !drop_body && base.body().map(|b| b.is_one_shot()).unwrap_or(false) {
        // The redirect preserves the method/body (307/308) but the body is a
        // one-shot stream that has already been transmitted once; it cannot
        // be replayed, so the redirect cannot be followed.
        return Ok(None);
    }

    let method = if drop_body { Method::GET } else { base.method().clone() };
    let mut next = rebuild_request(base, next_url.clone(), method, drop_body);
    redirect::remove_sensitive_headers(next.headers_mut(), &next_url, visited_urls);
    visited_urls.push(next_url);
    Ok(Some(next))
}

/// Clones `base` onto a new URL/method, optionally dropping its body (used
/// by both the redirect and the 408/503 retry paths).
fn rebuild_request(base: &Request, url: Url, method: Method, drop_body: bool) -> Request {
    let mut next = Request::new(method, url);
    *next.headers_mut() = base.headers().clone();
    if drop_body {
        for header in [header::CONTENT_LENGTH, header::CONTENT_TYPE, header::CONTENT_ENCODING, header::TRANSFER_ENCODING] {
            next.headers_mut().remove(header);
        }
    } else if let Some(body) = base.body().and_then(|b| b.try_clone()) {
        *next.body_mut() = Some(body);
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_header_includes_non_default_port() {
        let url = Url::parse("http://example.com:8080/a").unwrap();
        let value = host_header_value(&url).unwrap();
        assert_eq!(value, "example.com:8080");
    }

    #[test]
    fn host_header_omits_default_port() {
        let url = Url::parse("https://example.com/a").unwrap();
        let value = host_header_value(&url).unwrap();
        assert_eq!(value, "example.com");
    }

    #[test]
    fn host_header_brackets_ipv6() {
        let url = Url::parse("http://[::1]:9000/a").unwrap();
        let value = host_header_value(&url).unwrap();
        assert_eq!(value, "[::1]:9000");
    }

    #[test]
    fn apply_effective_request_sets_default_user_agent_and_host() {
        let client = Client::new();
        let mut request = Request::new(Method::GET, Url::parse("http://example.com/a").unwrap());
        apply_effective_request(&client, &mut request);
        assert!(request.headers().contains_key(header::USER_AGENT));
        assert_eq!(request.headers().get(header::HOST).unwrap(), "example.com");
    }

    #[test]
    fn apply_effective_request_does_not_override_existing_header() {
        let client = Client::new();
        let mut request = Request::new(Method::GET, Url::parse("http://example.com/a").unwrap());
        request.headers_mut().insert(header::USER_AGENT, HeaderValue::from_static("custom/1"));
        apply_effective_request(&client, &mut request);
        assert_eq!(request.headers().get(header::USER_AGENT).unwrap(), "custom/1");
    }
}
