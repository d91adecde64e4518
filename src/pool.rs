//! The shared connection pool (spec §4.5).

use std::{
    collections::HashMap,
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::{
    conn::Connection,
    route::{Address, Route},
    util::monotonic_nanos,
};

/// Default keep-alive budget for an idle pooled connection, matching the
/// teacher crate's HTTP keep-alive defaults.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(5 * 60);

/// Default ceiling on the number of idle connections kept around.
pub const DEFAULT_MAX_IDLE_CONNECTIONS: usize = 5;

struct Bucket {
    connections: Vec<Arc<Connection>>,
}

/// Shares and evicts idle keep-alive connections, keyed by [`Address`]
/// (spec §4.5).
pub(crate) struct ConnectionPool {
    buckets: Mutex<HashMap<String, Bucket>>,
    keep_alive: Duration,
    max_idle: usize,
    notify: Notify,
}

impl ConnectionPool {
    pub(crate) fn new(keep_alive: Duration, max_idle: usize) -> Arc<ConnectionPool> {
        let pool = Arc::new(ConnectionPool {
            buckets: Mutex::new(HashMap::new()),
            keep_alive,
            max_idle,
            notify: Notify::new(),
        });
        pool.clone().spawn_cleanup_task();
        pool
    }

    /// Searches the pool for a connection matching any of `routes`'
    /// address that can host another exchange (spec §4.4 step 4(a)).
    /// Coalescing (step 4(b)) is handled by the caller consulting
    /// certificate info separately; this only matches by address identity.
    pub(crate) fn take(&self, address: &Address) -> Option<Arc<Connection>> {
        let key = address.pool_key();
        let buckets = self.buckets.lock();
        let bucket = buckets.get(&key)?;
        bucket
            .connections
            .iter()
            .find(|c| c.can_host_new_exchange())
            .cloned()
    }

    /// Looks for an HTTP/2 connection to any address whose route resolves
    /// to the same socket address as `route` and whose negotiated protocol
    /// is HTTP/2 — the starting point for connection coalescing (spec §4.4
    /// step 4(b)); SAN/pinning verification against `requested_host` is the
    /// route planner's responsibility once a candidate is found here.
    pub(crate) fn find_coalescing_candidate(&self, route: &Route) -> Option<Arc<Connection>> {
        let buckets = self.buckets.lock();
        buckets
            .values()
            .flat_map(|b| b.connections.iter())
            .find(|c| {
                c.protocol() == crate::conn::Protocol::Http2
                    && c.route.socket_addr == route.socket_addr
                    && c.can_host_new_exchange()
            })
            .cloned()
    }

    /// Inserts a freshly connected connection into the pool (spec §4.4
    /// step 7: "Insert into pool").
    pub(crate) fn put(&self, connection: Arc<Connection>) {
        let key = connection.route.address.pool_key();
        let mut buckets = self.buckets.lock();
        buckets.entry(key).or_insert_with(|| Bucket { connections: Vec::new() }).connections.push(connection);
        self.notify.notify_one();
    }

    /// Total number of pooled connections across all addresses.
    pub(crate) fn connection_count(&self) -> usize {
        self.buckets.lock().values().map(|b| b.connections.len()).sum()
    }

    fn evict_once(&self) -> Option<Duration> {
        let now = monotonic_nanos();
        let keep_alive_nanos = self.keep_alive.as_nanos() as i64;
        let mut buckets = self.buckets.lock();

        let mut idle_count = 0usize;
        let mut oldest: Option<(String, usize, i64)> = None;

        for (key, bucket) in buckets.iter() {
            for (i, conn) in bucket.connections.iter().enumerate() {
                if conn.state() == crate::conn::State::Closed {
                    continue;
                }
                if conn.can_host_new_exchange() {
                    continue;
                }
                idle_count += 1;
                let idle_at = conn.idle_at_nanos();
                if oldest.as_ref().map(|(_, _, t)| idle_at < *t).unwrap_or(true) {
                    oldest = Some((key.clone(), i, idle_at));
                }
            }
        }

        // Evict anything over its keep-alive budget.
        let mut next_wake: Option<Duration> = None;
        for bucket in buckets.values_mut() {
            bucket.connections.retain(|conn| {
                if conn.state() == crate::conn::State::Closed {
                    return false;
                }
                if !conn.can_host_new_exchange() {
                    let age = now - conn.idle_at_nanos();
                    if age >= keep_alive_nanos {
                        conn.close();
                        return false;
                    }
                    let remaining = Duration::from_nanos((keep_alive_nanos - age).max(0) as u64);
                    next_wake = Some(next_wake.map_or(remaining, |w| w.min(remaining)));
                }
                true
            });
        }

        // Evict the oldest idle connection if we're still over the cap.
        idle_count = buckets
            .values()
            .flat_map(|b| b.connections.iter())
            .filter(|c| !c.can_host_new_exchange() && c.state() != crate::conn::State::Closed)
            .count();
        if idle_count > self.max_idle {
            if let Some((key, _, _)) = oldest {
                if let Some(bucket) = buckets.get_mut(&key) {
                    if let Some(pos) = bucket
                        .connections
                        .iter()
                        .position(|c| !c.can_host_new_exchange() && c.state() != crate::conn::State::Closed)
                    {
                        let conn = bucket.connections.remove(pos);
                        conn.close();
                    }
                }
            }
            next_wake = Some(Duration::from_secs(0));
        }

        buckets.retain(|_, b| !b.connections.is_empty());
        next_wake
    }

    fn spawn_cleanup_task(self: Arc<Self>) {
        tokio::spawn(async move {
            loop {
                let wake_after = self.evict_once().unwrap_or(self.keep_alive);
                tokio::select! {
                    _ = tokio::time::sleep(wake_after) => {}
                    _ = self.notify.notified() => {}
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_budgets_are_sane() {
        assert!(DEFAULT_KEEP_ALIVE.as_secs() > 0);
        assert!(DEFAULT_MAX_IDLE_CONNECTIONS > 0);
    }
}
