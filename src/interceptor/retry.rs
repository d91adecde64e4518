//! Pure decision functions for the call engine's retry/follow-up logic
//! (spec §4.3). Kept separate from [`crate::call`] so the rules themselves
//! — independent of scheduling/IO — can be unit-tested directly.

use http::{HeaderMap, StatusCode};

use crate::{error::Error, redirect};

/// Whether a same-route retry should be attempted after an I/O error that
/// occurred before any response was received (spec §4.3 step 3).
pub(crate) fn should_retry_after_failure(
    error: &Error,
    retry_on_connection_failure: bool,
    body_is_replayable: bool,
    another_route_remains: bool,
) -> bool {
    if !retry_on_connection_failure || !body_is_replayable || !another_route_remains {
        return false;
    }
    error.is_connect() || error.is_timeout()
}

/// The follow-up action the call engine should take for a completed
/// response (spec §4.3 step 4). `None` means "return this response as-is".
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FollowUp {
    /// Re-run the call with a fresh request built from auth/redirect rules.
    Retry { drop_body: bool },
    /// Return the response as the final result.
    None,
}

/// Decides whether `status` warrants a follow-up, independent of auth
/// (401/407 are handled by the caller consulting the `Authenticator`/
/// `ProxyAuthenticator`, which this function doesn't have access to).
pub(crate) fn followup_for_status(
    status: StatusCode,
    headers: &HeaderMap,
    method: &http::Method,
    follow_redirects: bool,
    is_one_shot_body: bool,
    silent_408_retry_used: bool,
) -> FollowUp {
    match status {
        StatusCode::MOVED_PERMANENTLY
        | StatusCode::FOUND
        | StatusCode::SEE_OTHER
        | StatusCode::TEMPORARY_REDIRECT
        | StatusCode::PERMANENT_REDIRECT => {
            if !follow_redirects {
                return FollowUp::None;
            }
            FollowUp::Retry { drop_body: redirect::strips_body(status, method) }
        }
        StatusCode::REQUEST_TIMEOUT => {
            if silent_408_retry_used {
                return FollowUp::None;
            }
            let declares_close = headers
                .get(http::header::CONNECTION)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.eq_ignore_ascii_case("close"))
                .unwrap_or(false);
            if declares_close && is_one_shot_body {
                return FollowUp::None;
            }
            FollowUp::Retry { drop_body: false }
        }
        StatusCode::SERVICE_UNAVAILABLE => {
            let retry_after = retry_after_seconds(headers);
            match retry_after {
                Some(secs) if secs <= 120 => FollowUp::Retry { drop_body: false },
                _ => FollowUp::None,
            }
        }
        _ => FollowUp::None,
    }
}

/// Parses a small, capped `Retry-After` value in seconds (spec §4.3 step 4,
/// "408 ... honor Retry-After up to a small cap", "503 with Retry-After:
/// 0..N").
pub(crate) fn retry_after_seconds(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(http::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_followup_strips_body_for_see_other_post() {
        let headers = HeaderMap::new();
        let action = followup_for_status(StatusCode::SEE_OTHER, &headers, &http::Method::POST, true, false, false);
        assert_eq!(action, FollowUp::Retry { drop_body: true });
    }

    #[test]
    fn redirect_followup_respects_follow_redirects_flag() {
        let headers = HeaderMap::new();
        let action = followup_for_status(StatusCode::FOUND, &headers, &http::Method::GET, false, false, false);
        assert_eq!(action, FollowUp::None);
    }

    #[test]
    fn service_unavailable_retries_within_small_retry_after() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::RETRY_AFTER, "5".parse().unwrap());
        let action = followup_for_status(StatusCode::SERVICE_UNAVAILABLE, &headers, &http::Method::GET, true, false, false);
        assert_eq!(action, FollowUp::Retry { drop_body: false });
    }

    #[test]
    fn request_timeout_with_close_and_one_shot_body_does_not_retry() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::CONNECTION, "close".parse().unwrap());
        let action = followup_for_status(StatusCode::REQUEST_TIMEOUT, &headers, &http::Method::POST, true, true, false);
        assert_eq!(action, FollowUp::None);
    }
}
