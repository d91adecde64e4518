#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # corehttp
//!
//! A uniform client-side HTTP/1.1 and HTTP/2 stack: a call execution
//! pipeline (retries, redirects, authentication follow-up), connection
//! pooling and route planning, an async dispatcher with global/per-host
//! concurrency caps, a conforming RFC 7234 disk cache, and a re-entrant
//! interceptor chain applications can extend.
//!
//! ## Making a request
//!
//! ```rust,no_run
//! # async fn run() -> Result<(), corehttp::Error> {
//! let client = corehttp::Client::new();
//! let body = client
//!     .get("https://www.rust-lang.org")
//!     .send()
//!     .await?
//!     .text()
//!     .await?;
//! println!("body = {body}");
//! # Ok(())
//! # }
//! ```
//!
//! **NOTE**: a [`Client`] holds a connection pool internally; create one and
//! reuse it across requests rather than building a fresh client per call.
//!
//! ## Redirects
//!
//! By default a client follows redirects up to [`redirect::DEFAULT_MAX_REDIRECTS`]
//! hops. Customize this with [`ClientBuilder::redirect_policy`] or
//! [`ClientBuilder::follow_redirects`].
//!
//! ## Caching
//!
//! [`ClientBuilder::cache`] enables an RFC 7234-conforming disk cache shared
//! across requests made with that client.
//!
//! ## Proxies
//!
//! Unlike some clients, no proxy is consulted unless configured: call
//! [`ClientBuilder::proxy`] with a [`Proxy`] built from [`Proxy::system`],
//! [`Proxy::http`], [`Proxy::https`], or [`Proxy::all`].
//!
//! ## Optional Cargo features
//!
//! - **rustls-tls** *(enabled by default)*: the default [`tls::TlsConnector`],
//!   backed by `rustls` with the `webpki-roots` trust bundle.
//! - **gzip** *(enabled by default)*: transparent gzip response decoding.
//! - **hickory-dns**: pulls in `hickory-resolver` for applications that want
//!   to plug in an async DNS resolver via [`ClientBuilder::dns_resolver`]
//!   instead of the default blocking `getaddrinfo`-backed one.
//! - **socks**: SOCKS4/4a/5/5h proxy support in [`Proxy`].

pub use http::Method;
pub use http::header;
pub use http::{StatusCode, Version};
pub use url::Url;

mod auth;
mod body;
mod cache;
mod call;
mod client;
mod config;
mod conn;
mod cookie;
#[cfg(feature = "gzip")]
mod decode;
mod dial;
mod dispatcher;
mod dns;
mod error;
mod header_util;
mod interceptor;
mod observer;
mod pool;
mod proxy;
pub mod redirect;
mod request;
mod response;
mod route;
pub mod tls;

pub use self::auth::{Authenticator, ProxyAuthenticator};
pub use self::body::Body;
pub use self::cache::CacheStats;
pub use self::client::{Client, ClientBuilder, IntoUrl, Pending};
pub use self::cookie::CookieJar;
pub use self::dispatcher::Dispatcher;
pub use self::dns::{Name, Resolve};
pub use self::error::{Error, Result};
pub use self::interceptor::{Chain, ChainContext, Interceptor};
pub use self::observer::{EventListener, EventListenerFactory};
pub use self::proxy::{NoProxy, Proxy, ProxyEndpoint, ProxyKind};
pub use self::request::{Request, RequestBuilder};
pub use self::response::{Response, ResponseSummary};

fn _assert_impls() {
    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}
    fn assert_clone<T: Clone>() {}

    assert_send::<Client>();
    assert_sync::<Client>();
    assert_clone::<Client>();

    assert_send::<Request>();
    assert_send::<RequestBuilder>();

    assert_send::<Response>();

    assert_send::<Error>();
    assert_sync::<Error>();
}
