//! Pluggable DNS resolution.
//!
//! DNS resolution is an external collaborator per spec §1: the crate only
//! defines the contract ([`Resolve`]) and a default implementation backed
//! by the system resolver (`getaddrinfo` via a blocking task, matching the
//! teacher crate's `GaiResolver`). Applications may plug in their own, e.g.
//! a `hickory-dns` async resolver.

use std::{
    future::Future,
    net::{IpAddr, SocketAddr},
    pin::Pin,
    sync::Arc,
};

use crate::error::BoxError;

/// The host name a [`Resolve`] implementation is asked to look up.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Name(String);

impl Name {
    pub(crate) fn new(host: String) -> Name {
        Name(host)
    }

    /// The host name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An iterator over resolved addresses, in the order the resolver produced
/// them (spec §4.4 step 2: "Produce an ordered list of IPs").
pub type Addrs = Box<dyn Iterator<Item = SocketAddr> + Send>;

/// The future returned by [`Resolve::resolve`].
pub type Resolving = Pin<Box<dyn Future<Output = Result<Addrs, BoxError>> + Send>>;

/// A DNS resolver contract. Implementations must be cheaply `Clone`-able
/// (typically an `Arc` around shared state) since the route planner calls
/// it once per connect attempt.
pub trait Resolve: Send + Sync {
    /// Resolve `name` to a non-empty, ordered set of addresses.
    fn resolve(&self, name: Name) -> Resolving;
}

/// The default resolver: system `getaddrinfo`, run on a blocking task so it
/// never stalls the async runtime (spec §5 suspension points: "DNS lookup").
#[derive(Clone, Default)]
pub struct GaiResolver {
    _priv: (),
}

impl GaiResolver {
    /// Creates a new system resolver.
    pub fn new() -> GaiResolver {
        GaiResolver::default()
    }
}

impl Resolve for GaiResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(async move {
            let host = name.0.clone();
            let addrs = tokio::task::spawn_blocking(move || {
                std::net::ToSocketAddrs::to_socket_addrs(&(host.as_str(), 0))
            })
            .await
            .map_err(|e| Box::new(e) as BoxError)?
            .map_err(|e| Box::new(e) as BoxError)?;
            let addrs: Vec<SocketAddr> = addrs.collect();
            if addrs.is_empty() {
                return Err(format!("no addresses found for {host}").into());
            }
            Ok(Box::new(addrs.into_iter()) as Addrs)
        })
    }
}

/// A resolver that serves a fixed, user-supplied mapping before falling
/// back to an inner resolver — used to implement per-host DNS overrides.
#[derive(Clone)]
pub struct DnsResolverWithOverrides {
    inner: Arc<dyn Resolve>,
    overrides: Arc<std::collections::HashMap<String, Vec<SocketAddr>>>,
}

impl DnsResolverWithOverrides {
    pub(crate) fn new(
        inner: Arc<dyn Resolve>,
        overrides: std::collections::HashMap<String, Vec<IpAddr>>,
        default_port: u16,
    ) -> Self {
        let overrides = overrides
            .into_iter()
            .map(|(host, ips)| {
                let addrs = ips.into_iter().map(|ip| SocketAddr::new(ip, default_port)).collect();
                (host, addrs)
            })
            .collect();
        DnsResolverWithOverrides {
            inner,
            overrides: Arc::new(overrides),
        }
    }
}

impl Resolve for DnsResolverWithOverrides {
    fn resolve(&self, name: Name) -> Resolving {
        if let Some(addrs) = self.overrides.get(name.as_str()).cloned() {
            return Box::pin(async move { Ok(Box::new(addrs.into_iter()) as Addrs) });
        }
        self.inner.resolve(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn overrides_short_circuit_inner_resolver() {
        let inner = Arc::new(GaiResolver::new());
        let mut map = std::collections::HashMap::new();
        map.insert("pinned.example".to_string(), vec!["127.0.0.1".parse().unwrap()]);
        let resolver = DnsResolverWithOverrides::new(inner, map, 443);

        let addrs: Vec<_> = resolver
            .resolve(Name::new("pinned.example".to_string()))
            .await
            .unwrap()
            .collect();
        assert_eq!(addrs, vec!["127.0.0.1:443".parse().unwrap()]);
    }
}
