//! The connect interceptor: route planning + pool lookup + connection
//! acquisition (spec §4.4).

use std::sync::Arc;

use crate::{
    dial::Dialer,
    error::{Error, Result},
    pool::ConnectionPool,
    request::Request,
    route::{Address, RoutePlanner},
};

use super::{Chain, Interceptor};

/// Acquires a [`crate::conn::Connection`] for the chain's request — either
/// an existing pooled one or a freshly dialed one — and attaches it to the
/// chain before calling `proceed`.
pub(crate) struct ConnectInterceptor {
    pool: Arc<ConnectionPool>,
    planner: Arc<RoutePlanner>,
    address_for: Box<dyn Fn(&url::Url) -> Result<Arc<Address>> + Send + Sync>,
    dialer: Arc<dyn Dialer>,
    /// Spec §6 `fastFallback`: race the first two planned routes instead of
    /// trying them strictly in sequence (a happy-eyeballs-style shortcut for
    /// dual-stack hosts where one address family is slow or blackholed).
    fast_fallback: bool,
}

impl ConnectInterceptor {
    pub(crate) fn new(
        pool: Arc<ConnectionPool>,
        planner: Arc<RoutePlanner>,
        address_for: Box<dyn Fn(&url::Url) -> Result<Arc<Address>> + Send + Sync>,
        dialer: Arc<dyn Dialer>,
        fast_fallback: bool,
    ) -> ConnectInterceptor {
        ConnectInterceptor { pool, planner, address_for, dialer, fast_fallback }
    }

    async fn dial_racing(&self, routes: &[crate::route::Route]) -> std::result::Result<(usize, crate::conn::Connection), Error> {
        let first = self.dialer.connect(&routes[0]);
        let second = self.dialer.connect(&routes[1]);
        tokio::pin!(first, second);
        tokio::select! {
            res = &mut first => match res {
                Ok(conn) => Ok((0, conn)),
                Err(_) => second.await.map(|conn| (1, conn)),
            },
            res = &mut second => match res {
                Ok(conn) => Ok((1, conn)),
                Err(_) => first.await.map(|conn| (0, conn)),
            },
        }
    }
}

#[async_trait::async_trait]
impl Interceptor for ConnectInterceptor {
    async fn intercept(&self, request: Request, chain: Chain<'_>) -> Result<crate::response::Response> {
        let url = request.url().clone();
        let address = (self.address_for)(&url)?;

        if let Some(connection) = self.pool.take(&address) {
            chain.context().listener().connection_acquired();
            return chain.proceed_with_connection(request, Some(connection)).await;
        }

        let host = url.host_str().ok_or_else(|| Error::builder("request URL has no host"))?.to_string();
        let port = url.port_or_known_default().ok_or_else(|| Error::builder("request URL has no resolvable port"))?;
        let routes = self.planner.plan(address.clone(), &host, port).await?;

        let mut last_err: Option<Error> = None;
        let mut remaining = routes.as_slice();

        // Fast fallback: race the first two routes with neither a pooled
        // nor a coalescing candidate available, instead of dialing them one
        // at a time (spec §6 `fastFallback`).
        if self.fast_fallback
            && remaining.len() >= 2
            && self.pool.find_coalescing_candidate(&remaining[0]).is_none()
            && self.pool.find_coalescing_candidate(&remaining[1]).is_none()
        {
            chain.context().listener().connect_start(remaining[0].socket_addr);
            chain.context().listener().connect_start(remaining[1].socket_addr);
            match self.dial_racing(&remaining[..2]).await {
                Ok((winner, connection)) => {
                    let route = &remaining[winner];
                    self.planner.route_db().connected(route);
                    let connection = Arc::new(connection);
                    self.pool.put(connection.clone());
                    chain.context().listener().connect_end(route.socket_addr);
                    chain.context().listener().connection_acquired();
                    return chain.proceed_with_connection(request, Some(connection)).await;
                }
                Err(e) => {
                    for route in &remaining[..2] {
                        self.planner.route_db().failed(route);
                        chain.context().listener().connect_failed(route.socket_addr, &e.to_string());
                    }
                    last_err = Some(e);
                    remaining = &remaining[2..];
                }
            }
        }

        for route in remaining {
            if let Some(coalesced) = self.pool.find_coalescing_candidate(route) {
                chain.context().listener().connection_acquired();
                return chain.proceed_with_connection(request, Some(coalesced)).await;
            }
            chain.context().listener().connect_start(route.socket_addr);
            match self.dialer.connect(route).await {
                Ok(connection) => {
                    self.planner.route_db().connected(route);
                    let connection = Arc::new(connection);
                    self.pool.put(connection.clone());
                    chain.context().listener().connect_end(route.socket_addr);
                    chain.context().listener().connection_acquired();
                    return chain.proceed_with_connection(request, Some(connection)).await;
                }
                Err(e) => {
                    self.planner.route_db().failed(route);
                    chain.context().listener().connect_failed(route.socket_addr, &e.to_string());
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::connect("no routes available")))
    }

    fn is_application_level(&self) -> bool {
        true
    }
}
