//! Proxy configuration and selection (spec §4.4 step 1: "Proxy selection").

use std::{env, net::IpAddr, sync::Arc};

use ipnet::IpNet;
use url::Url;

use crate::error::{BoxError, Error};

/// The kind of proxy a [`ProxyEndpoint`] speaks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProxyKind {
    /// No proxy; connect directly.
    Direct,
    /// Plain HTTP proxy (requests are sent with an absolute-form URI).
    Http,
    /// HTTP proxy used to establish a `CONNECT` tunnel for HTTPS traffic.
    HttpTunnel,
    /// SOCKS4 proxy.
    Socks4,
    /// SOCKS4a proxy.
    Socks4a,
    /// SOCKS5 proxy.
    Socks5,
    /// SOCKS5 proxy that also resolves hostnames remotely.
    Socks5h,
}

/// One concrete proxy to try, as produced by proxy selection (spec §3
/// Route: `ProxyEndpoint?`).
#[derive(Clone, Debug)]
pub struct ProxyEndpoint {
    pub(crate) kind: ProxyKind,
    pub(crate) uri: Url,
}

impl ProxyEndpoint {
    /// The kind of proxy this endpoint speaks.
    pub fn kind(&self) -> ProxyKind {
        self.kind
    }

    /// The proxy's own URL (scheme, host, port, optional userinfo).
    pub fn uri(&self) -> &Url {
        &self.uri
    }
}

impl PartialEq for ProxyEndpoint {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.uri == other.uri
    }
}
impl Eq for ProxyEndpoint {}

/// Configuration of a proxy a `Client` should route matching requests
/// through.
///
/// Mirrors the teacher crate's `Proxy`: an intercept rule (which requests
/// this applies to) plus a `NoProxy` exclusion list.
#[derive(Clone)]
pub struct Proxy {
    intercept: Intercept,
    no_proxy: Option<NoProxy>,
}

#[derive(Clone)]
enum Intercept {
    All(Url),
    Http(Url),
    Https(Url),
    System(Arc<SystemProxyMap>),
}

impl std::fmt::Debug for Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.intercept {
            Intercept::All(_) => "all",
            Intercept::Http(_) => "http",
            Intercept::Https(_) => "https",
            Intercept::System(_) => "system",
        };
        f.debug_struct("Proxy").field("intercept", &kind).finish()
    }
}

struct SystemProxyMap {
    http: Option<Url>,
    https: Option<Url>,
}

impl Proxy {
    /// Proxy all traffic to the target URL.
    pub fn all<U: AsRef<str>>(url: U) -> Result<Proxy, Error> {
        Ok(Proxy {
            intercept: Intercept::All(parse_proxy_url(url.as_ref())?),
            no_proxy: None,
        })
    }

    /// Proxy only `http://` traffic to the target URL.
    pub fn http<U: AsRef<str>>(url: U) -> Result<Proxy, Error> {
        Ok(Proxy {
            intercept: Intercept::Http(parse_proxy_url(url.as_ref())?),
            no_proxy: None,
        })
    }

    /// Proxy only `https://` traffic to the target URL.
    pub fn https<U: AsRef<str>>(url: U) -> Result<Proxy, Error> {
        Ok(Proxy {
            intercept: Intercept::Https(parse_proxy_url(url.as_ref())?),
            no_proxy: None,
        })
    }

    /// Read proxy configuration from the conventional environment variables
    /// (`HTTP_PROXY`/`http_proxy`, `HTTPS_PROXY`/`https_proxy`,
    /// `ALL_PROXY`/`all_proxy`), more-specific taking precedence.
    pub fn system() -> Proxy {
        let http = env_proxy("HTTPS_PROXY", "https_proxy").or_else(|| env_proxy("ALL_PROXY", "all_proxy"));
        let https = env_proxy("HTTP_PROXY", "http_proxy").or_else(|| env_proxy("ALL_PROXY", "all_proxy"));
        Proxy {
            intercept: Intercept::System(Arc::new(SystemProxyMap { http: https, https: http })),
            no_proxy: NoProxy::from_env(),
        }
    }

    /// Exclude the given hosts/CIDRs from this proxy's interception.
    pub fn no_proxy(mut self, no_proxy: Option<NoProxy>) -> Proxy {
        self.no_proxy = no_proxy;
        self
    }

    /// Selects a proxy endpoint for the given request URL, honoring the
    /// no-proxy exclusion list. Returns `None` when this `Proxy` does not
    /// intercept the given scheme/host.
    pub(crate) fn for_url(&self, url: &Url) -> Option<ProxyEndpoint> {
        if let Some(no_proxy) = &self.no_proxy {
            if no_proxy.matches(url.host_str().unwrap_or("")) {
                return None;
            }
        }
        let https = url.scheme() == "https";
        let proxy_url = match &self.intercept {
            Intercept::All(u) => Some(u.clone()),
            Intercept::Http(u) if !https => Some(u.clone()),
            Intercept::Https(u) if https => Some(u.clone()),
            Intercept::Http(_) | Intercept::Https(_) => None,
            Intercept::System(map) => {
                if https {
                    map.https.clone()
                } else {
                    map.http.clone()
                }
            }
        }?;
        Some(make_endpoint(proxy_url, https))
    }
}

fn make_endpoint(uri: Url, tunnel_for_https: bool) -> ProxyEndpoint {
    let kind = match uri.scheme() {
        "socks4" => ProxyKind::Socks4,
        "socks4a" => ProxyKind::Socks4a,
        "socks5" => ProxyKind::Socks5,
        "socks5h" => ProxyKind::Socks5h,
        _ if tunnel_for_https => ProxyKind::HttpTunnel,
        _ => ProxyKind::Http,
    };
    ProxyEndpoint { kind, uri }
}

fn parse_proxy_url(s: &str) -> Result<Url, Error> {
    Url::parse(s).map_err(Error::builder)
}

fn env_proxy(upper: &str, lower: &str) -> Option<Url> {
    env::var(upper)
        .ok()
        .or_else(|| env::var(lower).ok())
        .filter(|s| !s.is_empty())
        .and_then(|s| Url::parse(&s).ok())
}

/// Hosts and networks that should never be proxied, as read from
/// `NO_PROXY`/`no_proxy`.
#[derive(Clone, Debug, Default)]
pub struct NoProxy {
    ips: IpMatcher,
    domains: DomainMatcher,
}

impl NoProxy {
    /// Parses a comma-separated `NO_PROXY` value.
    pub fn from_string(s: &str) -> NoProxy {
        let mut ips = Vec::new();
        let mut domains = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            if let Ok(net) = part.parse::<IpNet>() {
                ips.push(Ip::Network(net));
            } else if let Ok(addr) = part.parse::<IpAddr>() {
                ips.push(Ip::Address(addr));
            } else {
                domains.push(part.trim_start_matches('.').to_ascii_lowercase());
            }
        }
        NoProxy {
            ips: IpMatcher(ips),
            domains: DomainMatcher(domains),
        }
    }

    fn from_env() -> Option<NoProxy> {
        env::var("NO_PROXY")
            .ok()
            .or_else(|| env::var("no_proxy").ok())
            .map(|s| NoProxy::from_string(&s))
    }

    fn matches(&self, host: &str) -> bool {
        if let Ok(ip) = host.parse::<IpAddr>() {
            self.ips.contains(ip)
        } else {
            self.domains.contains(host)
        }
    }
}

#[derive(Clone, Debug)]
enum Ip {
    Address(IpAddr),
    Network(IpNet),
}

#[derive(Clone, Debug, Default)]
struct IpMatcher(Vec<Ip>);

impl IpMatcher {
    fn contains(&self, addr: IpAddr) -> bool {
        self.0.iter().any(|ip| match ip {
            Ip::Address(a) => *a == addr,
            Ip::Network(net) => net.contains(&addr),
        })
    }
}

#[derive(Clone, Debug, Default)]
struct DomainMatcher(Vec<String>);

impl DomainMatcher {
    fn contains(&self, domain: &str) -> bool {
        let domain = domain.to_ascii_lowercase();
        self.0.iter().any(|d| domain == *d || domain.ends_with(&format!(".{d}")))
    }
}

pub(crate) fn connect_error(e: impl Into<BoxError>) -> Error {
    Error::connect(e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_proxy_intercepts_both_schemes() {
        let proxy = Proxy::all("http://proxy.local:8080").unwrap();
        let http = Url::parse("http://example.com").unwrap();
        let https = Url::parse("https://example.com").unwrap();
        assert!(proxy.for_url(&http).is_some());
        assert!(proxy.for_url(&https).is_some());
    }

    #[test]
    fn https_only_proxy_skips_http_urls() {
        let proxy = Proxy::https("http://proxy.local:8080").unwrap();
        let http = Url::parse("http://example.com").unwrap();
        assert!(proxy.for_url(&http).is_none());
    }

    #[test]
    fn no_proxy_excludes_matching_domain_suffix() {
        let proxy = Proxy::all("http://proxy.local:8080")
            .unwrap()
            .no_proxy(Some(NoProxy::from_string("example.com")));
        let url = Url::parse("https://api.example.com").unwrap();
        assert!(proxy.for_url(&url).is_none());
    }

    #[test]
    fn no_proxy_cidr_matches_ip_literal() {
        let proxy = Proxy::all("http://proxy.local:8080")
            .unwrap()
            .no_proxy(Some(NoProxy::from_string("10.0.0.0/8")));
        let url = Url::parse("http://10.1.2.3").unwrap();
        assert!(proxy.for_url(&url).is_none());
    }

    #[test]
    fn https_endpoint_is_tunneled_through_http_proxy() {
        let proxy = Proxy::all("http://proxy.local:8080").unwrap();
        let url = Url::parse("https://example.com").unwrap();
        let endpoint = proxy.for_url(&url).unwrap();
        assert_eq!(endpoint.kind(), ProxyKind::HttpTunnel);
    }
}
