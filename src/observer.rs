//! Timing and lifecycle callbacks (spec §4.8).
//!
//! Events fire in the well-ordered sequence `callStart → proxySelect* →
//! dns* → connect* → connectionAcquired → requestHeaders* →
//! requestBody* → responseHeaders* → followUpDecision → responseBody* →
//! connectionReleased → callEnd` (or the matching `*Failed` variant). The
//! cache path additionally emits `cacheMiss`/`cacheHit`/
//! `cacheConditionalHit`/`satisfactionFailure`.
//!
//! Implementations must never take a lock the core holds — callbacks run
//! synchronously on the caller's task, so a blocking or lock-reentrant
//! listener can stall a call.

use std::sync::Arc;

use url::Url;

/// A call-scoped sequence of lifecycle callbacks.
///
/// All methods have no-op default bodies so implementors only override
/// what they care about, matching the teacher crate's `EventListener`
/// shape.
pub trait EventListener: Send + Sync {
    fn call_start(&self, url: &Url) {
        let _ = url;
    }
    fn proxy_select_start(&self, url: &Url) {
        let _ = url;
    }
    fn proxy_select_end(&self, url: &Url) {
        let _ = url;
    }
    fn dns_start(&self, domain: &str) {
        let _ = domain;
    }
    fn dns_end(&self, domain: &str, addr_count: usize) {
        let _ = (domain, addr_count);
    }
    fn connect_start(&self, addr: std::net::SocketAddr) {
        let _ = addr;
    }
    fn secure_connect_start(&self) {}
    fn secure_connect_end(&self) {}
    fn connect_end(&self, addr: std::net::SocketAddr) {
        let _ = addr;
    }
    fn connect_failed(&self, addr: std::net::SocketAddr, error: &str) {
        let _ = (addr, error);
    }
    fn connection_acquired(&self) {}
    fn connection_released(&self) {}
    fn request_headers_start(&self) {}
    fn request_headers_end(&self) {}
    fn request_body_start(&self) {}
    fn request_body_end(&self, byte_count: u64) {
        let _ = byte_count;
    }
    fn response_headers_start(&self) {}
    fn response_headers_end(&self, status: u16) {
        let _ = status;
    }
    fn follow_up_decision(&self, will_follow: bool) {
        let _ = will_follow;
    }
    fn response_body_start(&self) {}
    fn response_body_end(&self, byte_count: u64) {
        let _ = byte_count;
    }
    fn call_end(&self) {}
    fn call_failed(&self, error: &str) {
        let _ = error;
    }
    fn cache_miss(&self) {}
    fn cache_hit(&self) {}
    fn cache_conditional_hit(&self) {}
    fn satisfaction_failure(&self) {}
}

/// An [`EventListener`] that does nothing; the default for a `Client` that
/// does not configure one.
pub(crate) struct NoopEventListener;

impl EventListener for NoopEventListener {}

/// A factory producing a fresh [`EventListener`] per call, mirroring the
/// teacher crate's factory-per-call pattern (so listeners may carry
/// call-scoped mutable state without synchronization).
pub trait EventListenerFactory: Send + Sync {
    fn create(&self, url: &Url) -> Arc<dyn EventListener>;
}

impl<F> EventListenerFactory for F
where
    F: Fn(&Url) -> Arc<dyn EventListener> + Send + Sync,
{
    fn create(&self, url: &Url) -> Arc<dyn EventListener> {
        self(url)
    }
}

pub(crate) struct NoopEventListenerFactory;

impl EventListenerFactory for NoopEventListenerFactory {
    fn create(&self, _url: &Url) -> Arc<dyn EventListener> {
        Arc::new(NoopEventListener)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingListener {
        calls: AtomicUsize,
    }

    impl EventListener for CountingListener {
        fn call_start(&self, _url: &Url) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
        fn call_end(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn default_methods_are_all_no_ops() {
        let listener = NoopEventListener;
        let url = Url::parse("http://example.com").unwrap();
        listener.call_start(&url);
        listener.call_end();
        // No panic, no observable state — this just documents the
        // contract's default is inert.
    }

    #[test]
    fn overridden_methods_fire() {
        let listener = CountingListener { calls: AtomicUsize::new(0) };
        let url = Url::parse("http://example.com").unwrap();
        listener.call_start(&url);
        listener.call_end();
        assert_eq!(listener.calls.load(Ordering::SeqCst), 2);
    }
}
