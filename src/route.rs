//! Route enumeration and the route planner (spec §4.4).
//!
//! `Address` identifies everything that distinguishes one logical
//! destination from another for pooling purposes; `Route` is one concrete
//! `(proxy, IP)` pairing the planner may attempt; `RouteDatabase` remembers
//! which routes recently failed so the planner can de-prioritize them.

use std::{
    collections::HashSet,
    net::SocketAddr,
    sync::Arc,
};

use parking_lot::Mutex;

use crate::{
    dns::{Name, Resolve},
    error::{Error, Result},
    proxy::{Proxy, ProxyEndpoint, ProxyKind},
    tls::{AlpnProtos, TlsConfig},
};

/// Everything that distinguishes one logical destination from another for
/// pooling and route-planning purposes (spec §4.4: "host, port, scheme,
/// dns, socketFactory, TLS config, proxy strategy, connection specs,
/// protocols").
#[derive(Clone)]
pub(crate) struct Address {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) is_https: bool,
    pub(crate) dns: Arc<dyn Resolve>,
    pub(crate) proxy: Option<Arc<Proxy>>,
    pub(crate) tls: Arc<TlsConfig>,
    pub(crate) alpn: AlpnProtos,
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host
            && self.port == other.port
            && self.is_https == other.is_https
            && Arc::ptr_eq(&self.dns, &other.dns)
            && match (&self.proxy, &other.proxy) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            }
    }
}
impl Eq for Address {}

impl std::hash::Hash for Address {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.port.hash(state);
        self.is_https.hash(state);
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Address")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("is_https", &self.is_https)
            .finish()
    }
}

impl Address {
    /// A string key stable across clones, used by the connection pool's
    /// hash map (spec §4.5: "Keyed structure. Hash of address").
    pub(crate) fn pool_key(&self) -> String {
        format!("{}://{}:{}", if self.is_https { "https" } else { "http" }, self.host, self.port)
    }
}

/// One concrete route the planner may attempt: an address, the kind of
/// proxy used (if any), the proxy endpoint, and the resolved socket
/// address (spec §3: "Route: (Address, ProxyKind, ProxyEndpoint?,
/// InetEndpoint)").
#[derive(Clone)]
pub(crate) struct Route {
    pub(crate) address: Arc<Address>,
    pub(crate) proxy_kind: ProxyKind,
    pub(crate) proxy_endpoint: Option<ProxyEndpoint>,
    pub(crate) socket_addr: SocketAddr,
}

impl PartialEq for Route {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
            && self.proxy_kind == other.proxy_kind
            && self.proxy_endpoint == other.proxy_endpoint
            && self.socket_addr == other.socket_addr
    }
}
impl Eq for Route {}

impl std::hash::Hash for Route {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.address.pool_key().hash(state);
        self.socket_addr.hash(state);
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("host", &self.address.host)
            .field("proxy_kind", &self.proxy_kind)
            .field("socket_addr", &self.socket_addr)
            .finish()
    }
}

/// A routing key stable enough to use as a `HashSet` member for failure
/// bookkeeping, independent of which particular `Arc<Address>` produced it.
#[derive(Clone, PartialEq, Eq, Hash)]
struct RouteKey {
    address: String,
    socket_addr: SocketAddr,
}

impl From<&Route> for RouteKey {
    fn from(r: &Route) -> Self {
        RouteKey { address: r.address.pool_key(), socket_addr: r.socket_addr }
    }
}

/// Remembers recently failed routes so the planner can de-prioritize them
/// (spec §3: "A Route DB remembers recently failed routes"; spec §4.4
/// "Failure bookkeeping").
#[derive(Default)]
pub(crate) struct RouteDatabase {
    failed: Mutex<HashSet<RouteKey>>,
}

impl RouteDatabase {
    pub(crate) fn new() -> Self {
        RouteDatabase::default()
    }

    /// Records `route` as having just failed to connect.
    pub(crate) fn failed(&self, route: &Route) {
        self.failed.lock().insert(RouteKey::from(route));
    }

    /// Clears the failure record for `route` after a successful connect
    /// against that exact route (spec §4.4: "only success against that same
    /// route clears it").
    pub(crate) fn connected(&self, route: &Route) {
        self.failed.lock().remove(&RouteKey::from(route));
    }

    fn has_failed(&self, route: &Route) -> bool {
        self.failed.lock().contains(&RouteKey::from(route))
    }
}

/// Enumerates and orders routes for an [`Address`] (spec §4.4 steps 1-3):
/// proxy selection, DNS resolution, and the proxy × IP cartesian product,
/// with previously-failed routes moved to the back.
pub(crate) struct RoutePlanner {
    route_db: Arc<RouteDatabase>,
}

impl RoutePlanner {
    pub(crate) fn new(route_db: Arc<RouteDatabase>) -> Self {
        RoutePlanner { route_db }
    }

    /// Produces the ordered list of routes to attempt for `address` and
    /// `url_host`/`url_port` (the original, pre-proxy target).
    pub(crate) async fn plan(&self, address: Arc<Address>, url_host: &str, url_port: u16) -> Result<Vec<Route>> {
        let proxy_endpoint = match &address.proxy {
            Some(p) => {
                let url = url_for(url_host, url_port, address.is_https);
                p.for_url(&url)
            }
            None => None,
        };

        let (resolve_host, resolve_port, proxy_kind, proxy_endpoint) = match &proxy_endpoint {
            Some(ep) => {
                let (host, port) = host_port_of(ep.uri());
                (host, port, ep.kind(), Some(ep.clone()))
            }
            None => (url_host.to_string(), url_port, ProxyKind::Direct, None),
        };

        let addrs = address
            .dns
            .resolve(Name::new(resolve_host))
            .await
            .map_err(Error::connect)?;

        let mut routes: Vec<Route> = addrs
            .map(|resolved| {
                let port = if resolve_port == 0 { resolved.port() } else { resolve_port };
                let socket_addr = SocketAddr::new(resolved.ip(), port);
                Route {
                    address: address.clone(),
                    proxy_kind,
                    proxy_endpoint: proxy_endpoint.clone(),
                    socket_addr,
                }
            })
            .collect();

        if routes.is_empty() {
            return Err(Error::connect("no routes resolved"));
        }

        // Move previously-failed routes to the back, preserving relative
        // order otherwise (spec §4.4: "Routes known to have failed recently
        // are attempted last").
        routes.sort_by_key(|r| self.route_db.has_failed(r));
        Ok(routes)
    }

    pub(crate) fn route_db(&self) -> &Arc<RouteDatabase> {
        &self.route_db
    }
}

fn host_port_of(url: &url::Url) -> (String, u16) {
    let host = url.host_str().unwrap_or("").to_string();
    let port = url.port_or_known_default().unwrap_or(0);
    (host, port)
}

fn url_for(host: &str, port: u16, https: bool) -> url::Url {
    let scheme = if https { "https" } else { "http" };
    url::Url::parse(&format!("{scheme}://{host}:{port}")).expect("host/port always produce a valid authority")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::GaiResolver;

    fn test_address() -> Arc<Address> {
        Arc::new(Address {
            host: "example.com".to_string(),
            port: 443,
            is_https: true,
            dns: Arc::new(GaiResolver::new()),
            proxy: None,
            tls: Arc::new(TlsConfig::default()),
            alpn: AlpnProtos::all(),
        })
    }

    #[test]
    fn route_database_clears_only_on_matching_route_success() {
        let db = RouteDatabase::new();
        let addr = test_address();
        let route = Route {
            address: addr.clone(),
            proxy_kind: ProxyKind::Direct,
            proxy_endpoint: None,
            socket_addr: "127.0.0.1:443".parse().unwrap(),
        };
        let other_route = Route {
            address: addr,
            proxy_kind: ProxyKind::Direct,
            proxy_endpoint: None,
            socket_addr: "127.0.0.2:443".parse().unwrap(),
        };

        db.failed(&route);
        assert!(db.has_failed(&route));

        db.connected(&other_route);
        assert!(db.has_failed(&route), "success on a different route must not clear the failure");

        db.connected(&route);
        assert!(!db.has_failed(&route));
    }

    #[test]
    fn pool_key_distinguishes_scheme() {
        let mut addr = Address {
            host: "example.com".to_string(),
            port: 443,
            is_https: true,
            dns: Arc::new(GaiResolver::new()),
            proxy: None,
            tls: Arc::new(TlsConfig::default()),
            alpn: AlpnProtos::all(),
        };
        let https_key = addr.pool_key();
        addr.is_https = false;
        addr.port = 80;
        let http_key = addr.pool_key();
        assert_ne!(https_key, http_key);
    }
}
