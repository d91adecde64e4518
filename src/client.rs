//! [`Client`], [`ClientBuilder`], and the [`Pending`] future returned by
//! [`RequestBuilder::send`](crate::request::RequestBuilder::send) (spec §1,
//! §6 "ClientBuilder configuration").
//!
//! Assembles every other module into one call pipeline: a connection pool,
//! a route planner, a dialer, an optional HTTP cache, a dispatcher, and the
//! ordered interceptor chain `[app interceptors* -> cache? -> connect ->
//! network interceptors* -> call-server]` (spec §4.2).

use std::{
    collections::HashMap,
    future::Future,
    net::IpAddr,
    path::Path,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use http::{HeaderMap, HeaderValue, Method, header::HeaderName};
use url::Url;

use crate::{
    auth::{Authenticator, ProxyAuthenticator},
    cache::{HttpCache, interceptor::CacheInterceptor},
    cookie::CookieJar,
    dial::{DefaultDialer, Dialer},
    dispatcher::Dispatcher,
    dns::{DnsResolverWithOverrides, GaiResolver, Resolve},
    error::{Error, Result},
    interceptor::{Chain, ChainContext, Interceptor, call_server::CallServerInterceptor, connect::ConnectInterceptor},
    observer::{EventListener, EventListenerFactory, NoopEventListenerFactory},
    pool::ConnectionPool,
    proxy::Proxy,
    redirect,
    request::{Request, RequestBuilder},
    route::{Address, RouteDatabase, RoutePlanner},
    tls::{AlpnProtos, ConnectionSpec, TlsConfig, TlsConnector},
};

/// The default connect/read/write timeout, matching the teacher crate's
/// OkHttp-derived defaults.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// An HTTP client: a reusable, `Clone`-cheap handle onto a shared
/// connection pool, dispatcher, and interceptor chain.
///
/// Per spec §1, a `Client` should be constructed once and reused — it owns
/// the pool of keep-alive connections that makes reuse worthwhile.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    default_headers: HeaderMap<HeaderValue>,
    connect_timeout: Duration,
    read_timeout: Duration,
    write_timeout: Duration,
    call_timeout: Duration,
    redirect_policy: redirect::Policy,
    follow_ssl_redirects: bool,
    retry_on_connection_failure: bool,
    authenticator: Option<Arc<dyn Authenticator>>,
    proxy_authenticator: Option<Arc<dyn ProxyAuthenticator>>,
    cookie_jar: Option<Arc<dyn CookieJar>>,
    event_listener_factory: Arc<dyn EventListenerFactory>,
    dispatcher: Arc<Dispatcher>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    cache: Option<Arc<HttpCache>>,
}

impl Client {
    /// Creates a new `Client` with default settings.
    ///
    /// # Panics
    ///
    /// Panics if the default TLS backend could not be initialized (e.g. the
    /// `rustls-tls` feature is disabled and no [`ClientBuilder::tls_connector`]
    /// override was supplied). Use [`Client::builder`] and
    /// [`ClientBuilder::build`] to handle that case as a `Result` instead.
    pub fn new() -> Client {
        ClientBuilder::new().build().expect("default client configuration is always valid")
    }

    /// Starts building a `Client` with custom configuration.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Convenience for `Client::builder().build().unwrap()`-free access to
    /// the shared [`Dispatcher`], for tests/introspection that want to wait
    /// on [`Dispatcher::idle`].
    pub(crate) fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.inner.dispatcher
    }

    /// Starts a `GET` request builder for `url`.
    pub fn get<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    /// Starts a `POST` request builder for `url`.
    pub fn post<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    /// Starts a `PUT` request builder for `url`.
    pub fn put<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.request(Method::PUT, url)
    }

    /// Starts a `PATCH` request builder for `url`.
    pub fn patch<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.request(Method::PATCH, url)
    }

    /// Starts a `DELETE` request builder for `url`.
    pub fn delete<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.request(Method::DELETE, url)
    }

    /// Starts a `HEAD` request builder for `url`.
    pub fn head<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.request(Method::HEAD, url)
    }

    /// Starts a request builder for an arbitrary method.
    pub fn request<U: IntoUrl>(&self, method: Method, url: U) -> RequestBuilder {
        let request = url.into_url().map(|url| Request::new(method, url));
        RequestBuilder::new(self.clone(), request)
    }

    /// Executes a request synchronously with respect to the dispatcher's
    /// concurrency accounting (spec §4.1 `runningSync`), but still runs the
    /// interceptor chain asynchronously under the hood. Prefer
    /// [`RequestBuilder::send`] for the common async path.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        let guard = self.inner.dispatcher.begin_sync();
        let result = crate::call::Call::new(self.clone(), request).execute().await;
        drop(guard);
        result
    }

    pub(crate) fn execute_request(&self, request: Request) -> Pending {
        let host = request.url().host_str().unwrap_or_default().to_string();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let client = self.clone();
        self.inner.dispatcher.enqueue(host, false, move |token| {
            tokio::spawn(async move {
                let result = crate::call::Call::new(client, request).execute().await;
                let _ = tx.send(result);
                token.finish();
            });
        });
        Pending { inner: PendingInner::Queued(rx) }
    }

    pub(crate) fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        &self.inner.interceptors
    }

    pub(crate) fn default_headers(&self) -> &HeaderMap<HeaderValue> {
        &self.inner.default_headers
    }

    pub(crate) fn connect_timeout(&self) -> Duration {
        self.inner.connect_timeout
    }

    pub(crate) fn read_timeout(&self) -> Duration {
        self.inner.read_timeout
    }

    pub(crate) fn write_timeout(&self) -> Duration {
        self.inner.write_timeout
    }

    pub(crate) fn call_timeout(&self) -> Duration {
        self.inner.call_timeout
    }

    pub(crate) fn redirect_policy(&self) -> &redirect::Policy {
        &self.inner.redirect_policy
    }

    pub(crate) fn follow_redirects(&self) -> bool {
        !self.inner.redirect_policy.is_none()
    }

    pub(crate) fn follow_ssl_redirects(&self) -> bool {
        self.inner.follow_ssl_redirects
    }

    pub(crate) fn retry_on_connection_failure(&self) -> bool {
        self.inner.retry_on_connection_failure
    }

    pub(crate) fn authenticator(&self) -> Option<&Arc<dyn Authenticator>> {
        self.inner.authenticator.as_ref()
    }

    pub(crate) fn proxy_authenticator(&self) -> Option<&Arc<dyn ProxyAuthenticator>> {
        self.inner.proxy_authenticator.as_ref()
    }

    pub(crate) fn cookie_jar(&self) -> Option<&Arc<dyn CookieJar>> {
        self.inner.cookie_jar.as_ref()
    }

    pub(crate) fn event_listener_factory(&self) -> &Arc<dyn EventListenerFactory> {
        &self.inner.event_listener_factory
    }

    /// Snapshot of the HTTP cache's counters, or `None` if this client was
    /// built without a cache (spec §8 testable properties: `hitCount` etc).
    pub fn cache_stats(&self) -> Option<crate::cache::CacheStats> {
        self.inner.cache.as_ref().map(|c| c.stats())
    }
}

impl Default for Client {
    fn default() -> Client {
        Client::new()
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("connect_timeout", &self.inner.connect_timeout)
            .field("read_timeout", &self.inner.read_timeout)
            .field("write_timeout", &self.inner.write_timeout)
            .finish()
    }
}

/// Per-call context handed to the interceptor chain, bridging [`Client`]'s
/// configuration to the [`ChainContext`] trait the `interceptor` module
/// depends on without a cyclic dependency on `Client` itself.
pub(crate) struct CallContext {
    pub(crate) client: Client,
    pub(crate) listener: Arc<dyn EventListener>,
}

impl ChainContext for CallContext {
    fn connect_timeout(&self) -> Duration {
        self.client.connect_timeout()
    }

    fn read_timeout(&self) -> Duration {
        self.client.read_timeout()
    }

    fn write_timeout(&self) -> Duration {
        self.client.write_timeout()
    }

    fn listener(&self) -> &dyn EventListener {
        &*self.listener
    }
}

pub(crate) async fn run_chain(client: &Client, request: Request, listener: Arc<dyn EventListener>) -> Result<Response> {
    let context = CallContext { client: client.clone(), listener };
    Chain::run(client.interceptors(), request, &context).await
}

/// A builder to construct a [`Client`] (spec §6 "ClientBuilder configuration").
pub struct ClientBuilder {
    default_headers: HeaderMap<HeaderValue>,
    connect_timeout: Duration,
    read_timeout: Duration,
    write_timeout: Duration,
    call_timeout: Duration,
    redirect_policy: redirect::Policy,
    follow_ssl_redirects: bool,
    retry_on_connection_failure: bool,
    authenticator: Option<Arc<dyn Authenticator>>,
    proxy_authenticator: Option<Arc<dyn ProxyAuthenticator>>,
    cookie_jar: Option<Arc<dyn CookieJar>>,
    event_listener_factory: Arc<dyn EventListenerFactory>,
    dns: Arc<dyn Resolve>,
    dns_overrides: HashMap<String, Vec<IpAddr>>,
    proxy: Option<Arc<Proxy>>,
    tls_connector: Option<Arc<dyn TlsConnector>>,
    alpn: AlpnProtos,
    connection_specs: Vec<ConnectionSpec>,
    cert_verification: bool,
    pool_keep_alive: Duration,
    pool_max_idle: usize,
    dispatcher: Option<Arc<Dispatcher>>,
    fast_fallback: bool,
    ping_interval: Option<Duration>,
    cache: Option<Arc<HttpCache>>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    network_interceptors: Vec<Arc<dyn Interceptor>>,
}

impl ClientBuilder {
    /// Creates a new builder with the default configuration.
    pub fn new() -> ClientBuilder {
        let default_tls = TlsConfig::default();
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            http::header::USER_AGENT,
            HeaderValue::from_static(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"))),
        );
        ClientBuilder {
            default_headers,
            connect_timeout: DEFAULT_TIMEOUT,
            read_timeout: DEFAULT_TIMEOUT,
            write_timeout: DEFAULT_TIMEOUT,
            call_timeout: Duration::ZERO,
            redirect_policy: redirect::Policy::limited(redirect::DEFAULT_MAX_REDIRECTS),
            follow_ssl_redirects: true,
            retry_on_connection_failure: true,
            authenticator: None,
            proxy_authenticator: None,
            cookie_jar: None,
            event_listener_factory: Arc::new(NoopEventListenerFactory),
            dns: Arc::new(GaiResolver::new()),
            dns_overrides: HashMap::new(),
            proxy: None,
            tls_connector: None,
            alpn: default_tls.alpn.clone(),
            connection_specs: default_tls.specs.clone(),
            cert_verification: default_tls.cert_verification,
            pool_keep_alive: crate::pool::DEFAULT_KEEP_ALIVE,
            pool_max_idle: crate::pool::DEFAULT_MAX_IDLE_CONNECTIONS,
            dispatcher: None,
            fast_fallback: false,
            ping_interval: None,
            cache: None,
            interceptors: Vec::new(),
            network_interceptors: Vec::new(),
        }
    }

    /// Sets a header sent on every request unless the request itself
    /// overrides it.
    pub fn default_header<K, V>(mut self, key: K, value: V) -> ClientBuilder
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        if let (Ok(key), Ok(value)) = (<HeaderName as TryFrom<K>>::try_from(key), <HeaderValue as TryFrom<V>>::try_from(value)) {
            self.default_headers.insert(key, value);
        }
        self
    }

    /// Overrides the default `User-Agent` header.
    pub fn user_agent<V>(self, value: V) -> ClientBuilder
    where
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        self.default_header(http::header::USER_AGENT, value)
    }

    /// Sets the connect timeout (spec §6 `connectTimeout`).
    pub fn connect_timeout(mut self, timeout: Duration) -> ClientBuilder {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the per-read timeout (spec §6 `readTimeout`).
    pub fn read_timeout(mut self, timeout: Duration) -> ClientBuilder {
        self.read_timeout = timeout;
        self
    }

    /// Sets the per-write timeout (spec §6 `writeTimeout`).
    pub fn write_timeout(mut self, timeout: Duration) -> ClientBuilder {
        self.write_timeout = timeout;
        self
    }

    /// Sets the whole-call timeout, covering every redirect/retry hop.
    /// `Duration::ZERO` (the default) disables it (spec §6 `callTimeout`).
    pub fn call_timeout(mut self, timeout: Duration) -> ClientBuilder {
        self.call_timeout = timeout;
        self
    }

    /// Sets the redirect policy (spec §6 `followRedirects`; defaults to
    /// following up to [`redirect::DEFAULT_MAX_REDIRECTS`] hops).
    pub fn redirect_policy(mut self, policy: redirect::Policy) -> ClientBuilder {
        self.redirect_policy = policy;
        self
    }

    /// Enables or disables following redirects at all, replacing the
    /// current policy with either the default cap or `Policy::none()`.
    pub fn follow_redirects(mut self, follow: bool) -> ClientBuilder {
        self.redirect_policy = if follow {
            redirect::Policy::limited(redirect::DEFAULT_MAX_REDIRECTS)
        } else {
            redirect::Policy::none()
        };
        self
    }

    /// Whether a redirect may cross between `http`/`https` (spec §6
    /// `followSslRedirects`). Defaults to `true`.
    pub fn follow_ssl_redirects(mut self, follow: bool) -> ClientBuilder {
        self.follow_ssl_redirects = follow;
        self
    }

    /// Whether to retry a request once after a connect/timeout failure if
    /// the body is replayable and another route remains (spec §6
    /// `retryOnConnectionFailure`). Defaults to `true`.
    pub fn retry_on_connection_failure(mut self, retry: bool) -> ClientBuilder {
        self.retry_on_connection_failure = retry;
        self
    }

    /// Installs a `401` response authenticator (spec §6 `authenticator`).
    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> ClientBuilder {
        self.authenticator = Some(authenticator);
        self
    }

    /// Installs a `407` response authenticator for a forward proxy (spec §6
    /// `proxyAuthenticator`).
    pub fn proxy_authenticator(mut self, authenticator: Arc<dyn ProxyAuthenticator>) -> ClientBuilder {
        self.proxy_authenticator = Some(authenticator);
        self
    }

    /// Installs a cookie jar (spec §6 `cookieJar`).
    pub fn cookie_jar(mut self, jar: Arc<dyn CookieJar>) -> ClientBuilder {
        self.cookie_jar = Some(jar);
        self
    }

    /// Installs a custom DNS resolver (spec §6 `dns`).
    pub fn dns_resolver(mut self, resolver: Arc<dyn Resolve>) -> ClientBuilder {
        self.dns = resolver;
        self
    }

    /// Overrides resolution for a specific host to a fixed set of
    /// addresses, bypassing the configured resolver for that host only.
    pub fn resolve(mut self, host: &str, addr: IpAddr) -> ClientBuilder {
        self.dns_overrides.entry(host.to_string()).or_default().push(addr);
        self
    }

    /// Configures an explicit proxy (spec §6 `proxy`/`proxySelector`).
    pub fn proxy(mut self, proxy: Proxy) -> ClientBuilder {
        self.proxy = Some(Arc::new(proxy));
        self
    }

    /// Disables proxying, undoing a previous [`ClientBuilder::proxy`] call.
    pub fn no_proxy(mut self) -> ClientBuilder {
        self.proxy = None;
        self
    }

    /// Overrides the TLS connector, e.g. for certificate pinning, a custom
    /// trust manager, or a non-default socket factory (spec §6
    /// `sslSocketFactory`/`trustManager`/`certificatePinner`/
    /// `hostnameVerifier`/`socketFactory` are all expressed through this
    /// single seam rather than five separate knobs).
    pub fn tls_connector(mut self, connector: Arc<dyn TlsConnector>) -> ClientBuilder {
        self.tls_connector = Some(connector);
        self
    }

    /// Disables certificate verification on the default TLS connector.
    /// Has no effect if [`ClientBuilder::tls_connector`] was also called.
    pub fn danger_accept_invalid_certs(mut self, accept_invalid: bool) -> ClientBuilder {
        self.cert_verification = !accept_invalid;
        self
    }

    /// Sets the ALPN protocols to offer (spec §6 `protocols`).
    pub fn alpn_protos(mut self, alpn: AlpnProtos) -> ClientBuilder {
        self.alpn = alpn;
        self
    }

    /// Sets the ordered TLS connection-spec fallback list (spec §6
    /// `connectionSpecs`).
    pub fn connection_specs(mut self, specs: Vec<ConnectionSpec>) -> ClientBuilder {
        self.connection_specs = specs;
        self
    }

    /// Sets the connection pool's keep-alive duration and max idle
    /// connections (spec §6 `connectionPool`).
    pub fn connection_pool(mut self, keep_alive: Duration, max_idle: usize) -> ClientBuilder {
        self.pool_keep_alive = keep_alive;
        self.pool_max_idle = max_idle;
        self
    }

    /// Installs a pre-built [`Dispatcher`] (spec §6 `dispatcher`), e.g. to
    /// share one dispatcher's concurrency caps across multiple clients.
    pub fn dispatcher(mut self, dispatcher: Arc<Dispatcher>) -> ClientBuilder {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Enables `fastFallback`: race the first two planned routes instead of
    /// trying them strictly in sequence (spec §6 `fastFallback`).
    pub fn fast_fallback(mut self, enabled: bool) -> ClientBuilder {
        self.fast_fallback = enabled;
        self
    }

    /// Sets the HTTP/2 keep-alive PING interval (spec §6 `pingInterval`).
    /// Has no effect on HTTP/1.1 connections.
    pub fn ping_interval(mut self, interval: Duration) -> ClientBuilder {
        self.ping_interval = Some(interval);
        self
    }

    /// Installs an event listener factory for call lifecycle callbacks
    /// (spec §6 `eventListenerFactory`).
    pub fn event_listener_factory(mut self, factory: Arc<dyn EventListenerFactory>) -> ClientBuilder {
        self.event_listener_factory = factory;
        self
    }

    /// Adds an application-level interceptor, run before the cache and
    /// connect interceptors (spec §6 `interceptors`). Must return `true`
    /// from [`Interceptor::is_application_level`].
    pub fn interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> ClientBuilder {
        self.interceptors.push(interceptor);
        self
    }

    /// Adds a network-level interceptor, run once a connection has been
    /// acquired, just before the call-server interceptor writes the
    /// request on the wire (spec §6 `networkInterceptors`).
    pub fn network_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> ClientBuilder {
        self.network_interceptors.push(interceptor);
        self
    }

    /// Enables the RFC 7234 disk cache at `dir` with a `max_size`-byte
    /// budget (spec §6 `cache`).
    pub fn cache(mut self, dir: impl AsRef<Path>, max_size: u64) -> Result<ClientBuilder> {
        self.cache = Some(Arc::new(HttpCache::open(dir.as_ref(), max_size)?));
        Ok(self)
    }

    /// Builds the [`Client`].
    pub fn build(self) -> Result<Client> {
        for interceptor in &self.interceptors {
            if !interceptor.is_application_level() {
                return Err(Error::builder(
                    "ClientBuilder::interceptor() requires an application-level interceptor; use network_interceptor() instead",
                ));
            }
        }

        let tls_connector: Arc<dyn TlsConnector> = match self.tls_connector {
            Some(connector) => connector,
            None => default_tls_connector(self.cert_verification)?,
        };

        let dns: Arc<dyn Resolve> = if self.dns_overrides.is_empty() {
            self.dns
        } else {
            Arc::new(DnsResolverWithOverrides::new(self.dns, self.dns_overrides, 0))
        };

        let tls_config = Arc::new(TlsConfig {
            alpn: self.alpn.clone(),
            specs: self.connection_specs,
            cert_verification: self.cert_verification,
        });
        let alpn_for_address = self.alpn;
        let proxy = self.proxy;

        let address_for: Box<dyn Fn(&Url) -> Result<Arc<Address>> + Send + Sync> = Box::new(move |url: &Url| {
            let host = url.host_str().ok_or_else(|| Error::builder("request URL has no host"))?.to_string();
            let port = url.port_or_known_default().ok_or_else(|| Error::builder("request URL has no resolvable port"))?;
            Ok(Arc::new(Address {
                host,
                port,
                is_https: url.scheme() == "https",
                dns: dns.clone(),
                proxy: proxy.clone(),
                tls: tls_config.clone(),
                alpn: alpn_for_address.clone(),
            }))
        });

        let pool = ConnectionPool::new(self.pool_keep_alive, self.pool_max_idle);
        let planner = Arc::new(RoutePlanner::new(Arc::new(RouteDatabase::new())));
        let dialer: Arc<dyn Dialer> = Arc::new(DefaultDialer::new(tls_connector, self.connect_timeout, self.ping_interval));
        let dispatcher = self.dispatcher.unwrap_or_else(Dispatcher::new);

        let mut interceptors: Vec<Arc<dyn Interceptor>> = Vec::new();
        interceptors.extend(self.interceptors);
        if let Some(cache) = &self.cache {
            interceptors.push(Arc::new(CacheInterceptor::new(cache.clone())));
        }
        interceptors.push(Arc::new(ConnectInterceptor::new(pool, planner, address_for, dialer, self.fast_fallback)));
        interceptors.extend(self.network_interceptors);
        interceptors.push(Arc::new(CallServerInterceptor));

        Ok(Client {
            inner: Arc::new(ClientInner {
                default_headers: self.default_headers,
                connect_timeout: self.connect_timeout,
                read_timeout: self.read_timeout,
                write_timeout: self.write_timeout,
                call_timeout: self.call_timeout,
                redirect_policy: self.redirect_policy,
                follow_ssl_redirects: self.follow_ssl_redirects,
                retry_on_connection_failure: self.retry_on_connection_failure,
                authenticator: self.authenticator,
                proxy_authenticator: self.proxy_authenticator,
                cookie_jar: self.cookie_jar,
                event_listener_factory: self.event_listener_factory,
                dispatcher,
                interceptors,
                cache: self.cache,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> ClientBuilder {
        ClientBuilder::new()
    }
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .finish()
    }
}

#[cfg(feature = "rustls-tls")]
fn default_tls_connector(cert_verification: bool) -> Result<Arc<dyn TlsConnector>> {
    Ok(Arc::new(crate::tls::DefaultTlsConnector::new(cert_verification)?))
}

#[cfg(not(feature = "rustls-tls"))]
fn default_tls_connector(_cert_verification: bool) -> Result<Arc<dyn TlsConnector>> {
    Err(Error::builder(
        "no TLS connector configured: enable the `rustls-tls` feature or call ClientBuilder::tls_connector",
    ))
}

/// A `Future` that resolves to the final [`Response`] of a sent request,
/// returned by [`RequestBuilder::send`].
#[must_use = "futures do nothing unless polled or awaited"]
pub struct Pending {
    inner: PendingInner,
}

enum PendingInner {
    Ready(Option<Result<Response>>),
    Queued(tokio::sync::oneshot::Receiver<Result<Response>>),
}

impl Pending {
    pub(crate) fn error(err: Error) -> Pending {
        Pending { inner: PendingInner::Ready(Some(Err(err))) }
    }
}

impl Future for Pending {
    type Output = Result<Response>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.inner {
            PendingInner::Ready(slot) => Poll::Ready(slot.take().expect("Pending polled again after completion")),
            PendingInner::Queued(rx) => Pin::new(rx).poll(cx).map(|r| r.unwrap_or_else(|_| Err(Error::cancelled()))),
        }
    }
}

impl std::fmt::Debug for Pending {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pending").finish()
    }
}

/// Conversion to a [`Url`], accepting both `Url` and `&str`/`String` (spec
/// §3: request construction accepts either form).
pub trait IntoUrl: IntoUrlSealed {}

impl IntoUrl for Url {}
impl IntoUrl for &str {}
impl IntoUrl for String {}
impl IntoUrl for &String {}

pub trait IntoUrlSealed {
    fn into_url(self) -> Result<Url>;
}

impl IntoUrlSealed for Url {
    fn into_url(self) -> Result<Url> {
        Ok(self)
    }
}

impl IntoUrlSealed for &str {
    fn into_url(self) -> Result<Url> {
        Url::parse(self).map_err(Error::builder)
    }
}

impl IntoUrlSealed for String {
    fn into_url(self) -> Result<Url> {
        self.as_str().into_url()
    }
}

impl IntoUrlSealed for &String {
    fn into_url(self) -> Result<Url> {
        self.as_str().into_url()
    }
}

use crate::response::Response;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_redirect_policy_follows_up_to_the_standard_cap() {
        let client = ClientBuilder::new().build().unwrap();
        assert!(client.follow_redirects());
    }

    #[test]
    fn follow_redirects_false_installs_none_policy() {
        let client = ClientBuilder::new().follow_redirects(false).build().unwrap();
        assert!(!client.follow_redirects());
    }

    #[test]
    fn rejects_a_non_application_level_interceptor() {
        struct NetworkOnly;
        #[async_trait::async_trait]
        impl Interceptor for NetworkOnly {
            async fn intercept(&self, request: Request, chain: Chain<'_>) -> Result<Response> {
                chain.proceed(request).await
            }
        }
        let err = ClientBuilder::new().interceptor(Arc::new(NetworkOnly)).build().unwrap_err();
        assert!(err.is_builder());
    }
}
