//! The ordered, re-entrant interceptor chain (spec §4.2).
//!
//! A call proceeds through `[application-user]* → [cache, connect,
//! network-user*, call-server]`. Each interceptor receives the in-flight
//! request directly and a [`Chain`] handle whose [`Chain::proceed`] hands a
//! (possibly modified) request to the next interceptor. An interceptor may
//! call `proceed` more than once (e.g. the cache interceptor retrying after
//! a conditional revalidation), but a second call must close the first
//! response first.

pub(crate) mod call_server;
pub(crate) mod connect;
pub(crate) mod retry;

use std::sync::Arc;

use crate::{conn::Connection, error::Result, observer::EventListener, request::Request, response::Response};

/// One link in the interceptor chain.
///
/// Application code may implement this directly to install a custom
/// interceptor via `ClientBuilder::interceptor`/`network_interceptor` (spec
/// §6 "interceptors", "networkInterceptors").
#[async_trait::async_trait]
pub trait Interceptor: Send + Sync {
    async fn intercept(&self, request: Request, chain: Chain<'_>) -> Result<Response>;

    /// Whether this interceptor is permitted to override application-level
    /// collaborators (dispatcher, cache, pool, TLS factory, DNS, ...).
    /// Only application interceptors (those installed before the cache
    /// interceptor) may; a network interceptor attempting to do so is a
    /// configuration error caught at `ClientBuilder` build time, not here —
    /// this flag exists so the chain can assert it at construction.
    fn is_application_level(&self) -> bool {
        false
    }
}

/// Shared, read-only context every interceptor needs: the owning client's
/// timeouts and its call-scoped event listener. Kept as a trait object
/// boundary so `interceptor` does not need to depend on the concrete
/// `Client` type, avoiding a module cycle.
pub trait ChainContext: Send + Sync {
    fn connect_timeout(&self) -> std::time::Duration;
    fn read_timeout(&self) -> std::time::Duration;
    fn write_timeout(&self) -> std::time::Duration;
    fn listener(&self) -> &dyn EventListener;
}

/// The handle passed to each [`Interceptor::intercept`] call.
pub struct Chain<'a> {
    interceptors: &'a [Arc<dyn Interceptor>],
    index: usize,
    connection: Option<Arc<Connection>>,
    context: &'a dyn ChainContext,
}

impl std::fmt::Debug for Chain<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("index", &self.index)
            .field("remaining", &(self.interceptors.len().saturating_sub(self.index)))
            .field("has_connection", &self.connection.is_some())
            .finish()
    }
}

impl<'a> Chain<'a> {
    /// Runs the whole chain from the start for one call iteration (spec
    /// §4.3 step 2: "Dispatch through interceptor chain").
    pub(crate) async fn run(interceptors: &'a [Arc<dyn Interceptor>], request: Request, context: &'a dyn ChainContext) -> Result<Response> {
        let chain = Chain { interceptors, index: 0, connection: None, context };
        chain.proceed(request).await
    }

    pub(crate) fn connection(&self) -> Option<&Arc<Connection>> {
        self.connection.as_ref()
    }

    /// The call's shared timeouts and event listener.
    pub fn context(&self) -> &dyn ChainContext {
        self.context
    }

    /// Hands `request` to the next interceptor, preserving whatever
    /// connection is currently attached. Custom interceptors installed via
    /// `ClientBuilder::interceptor`/`network_interceptor` call this to
    /// continue the chain.
    pub async fn proceed(&self, request: Request) -> Result<Response> {
        self.proceed_with_connection(request, self.connection.clone()).await
    }

    /// Like [`Chain::proceed`], additionally attaching the connection that
    /// downstream interceptors (call-server) should use — set by the
    /// connect interceptor once a connection has been acquired.
    pub(crate) async fn proceed_with_connection(&self, request: Request, connection: Option<Arc<Connection>>) -> Result<Response> {
        let next = self
            .interceptors
            .get(self.index)
            .ok_or_else(|| crate::error::Error::request("interceptor chain exhausted without a terminal interceptor"))?;
        let chain = Chain {
            interceptors: self.interceptors,
            index: self.index + 1,
            connection,
            context: self.context,
        };
        next.intercept(request, chain).await
    }
}
