//! Async concurrency caps, global and per-host (spec §4.1).

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Default ceiling on concurrently running async calls.
pub const DEFAULT_MAX_REQUESTS: usize = 64;

/// Default ceiling on concurrently running async calls per host.
pub const DEFAULT_MAX_REQUESTS_PER_HOST: usize = 5;

struct QueuedCall {
    host: String,
    is_websocket: bool,
    runner: Box<dyn FnOnce(DispatchToken) + Send>,
}

/// Handed to a promoted call's runner so it can report completion. Dropping
/// it without calling [`DispatchToken::finish`] also frees the slot (e.g.
/// on panic unwinding).
pub(crate) struct DispatchToken {
    dispatcher: Arc<Dispatcher>,
    id: u64,
    finished: bool,
}

impl DispatchToken {
    /// Reports that this call has finished, freeing its running slot.
    pub(crate) fn finish(mut self) {
        self.finished = true;
        self.dispatcher.clone().finish_async(self.id);
    }
}

impl Drop for DispatchToken {
    fn drop(&mut self) {
        if !self.finished {
            self.dispatcher.clone().finish_async(self.id);
        }
    }
}

struct RunningCall {
    host: String,
}

struct Inner {
    max_requests: usize,
    max_requests_per_host: usize,
    queue: VecDeque<QueuedCall>,
    running_async: HashMap<u64, RunningCall>,
    running_sync: usize,
    next_id: u64,
    idle_callback: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl Inner {
    fn per_host_count(&self, host: &str) -> usize {
        self.running_async.values().filter(|r| r.host == host).count()
    }

    fn is_idle(&self) -> bool {
        self.running_async.is_empty() && self.running_sync == 0
    }
}

/// Accepts async calls via [`Dispatcher::enqueue`], tracks sync calls via
/// [`Dispatcher::begin_sync`]/[`Dispatcher::end_sync`], and promotes queued
/// calls as capacity frees up (spec §4.1).
pub struct Dispatcher {
    inner: Mutex<Inner>,
    idle_notify: Notify,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Dispatcher")
            .field("max_requests", &inner.max_requests)
            .field("max_requests_per_host", &inner.max_requests_per_host)
            .field("queued", &inner.queue.len())
            .field("running", &(inner.running_async.len() + inner.running_sync))
            .finish()
    }
}

impl Dispatcher {
    /// Creates a dispatcher with the default request caps.
    pub fn new() -> Arc<Dispatcher> {
        Dispatcher::with_limits(DEFAULT_MAX_REQUESTS, DEFAULT_MAX_REQUESTS_PER_HOST)
    }

    /// Creates a dispatcher with explicit request caps.
    pub fn with_limits(max_requests: usize, max_requests_per_host: usize) -> Arc<Dispatcher> {
        Arc::new(Dispatcher {
            inner: Mutex::new(Inner {
                max_requests: max_requests.max(1),
                max_requests_per_host: max_requests_per_host.max(1),
                queue: VecDeque::new(),
                running_async: HashMap::new(),
                running_sync: 0,
                next_id: 0,
                idle_callback: None,
            }),
            idle_notify: Notify::new(),
        })
    }

    /// Sets (or clears) the idle callback, invoked outside any lock exactly
    /// when both `runningAsync` and `runningSync` become empty (spec §4.1).
    pub fn set_idle_callback<F>(&self, callback: Option<F>)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        inner.idle_callback = callback.map(|f| Arc::new(f) as Arc<dyn Fn() + Send + Sync>);
    }

    /// Updates `maxRequests`; applies immediately and may promote queued
    /// calls.
    pub fn set_max_requests(self: &Arc<Self>, max: usize) {
        {
            let mut inner = self.inner.lock();
            inner.max_requests = max.max(1);
        }
        self.promote();
    }

    /// Updates `maxRequestsPerHost`; applies immediately and may promote
    /// queued calls.
    pub fn set_max_requests_per_host(self: &Arc<Self>, max: usize) {
        {
            let mut inner = self.inner.lock();
            inner.max_requests_per_host = max.max(1);
        }
        self.promote();
    }

    pub fn max_requests(&self) -> usize {
        self.inner.lock().max_requests
    }

    pub fn max_requests_per_host(&self) -> usize {
        self.inner.lock().max_requests_per_host
    }

    pub fn queued_calls(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn running_calls(&self) -> usize {
        let inner = self.inner.lock();
        inner.running_async.len() + inner.running_sync
    }

    /// Enqueues an async call. `runner` is invoked (outside the dispatcher's
    /// lock) once a slot is available, either immediately or after a later
    /// promotion.
    pub(crate) fn enqueue<F>(self: &Arc<Self>, host: String, is_websocket: bool, runner: F)
    where
        F: FnOnce(DispatchToken) + Send + 'static,
    {
        {
            let mut inner = self.inner.lock();
            inner.queue.push_back(QueuedCall { host, is_websocket, runner: Box::new(runner) });
        }
        self.promote();
    }

    /// Registers a synchronous call as running (spec §3: `runningSync`).
    /// Returns a guard that, when dropped, ends the sync call and may
    /// trigger promotion/idle notification.
    pub(crate) fn begin_sync(self: &Arc<Self>) -> SyncGuard {
        self.inner.lock().running_sync += 1;
        SyncGuard { dispatcher: self.clone() }
    }

    fn end_sync(self: &Arc<Self>) {
        {
            let mut inner = self.inner.lock();
            inner.running_sync = inner.running_sync.saturating_sub(1);
        }
        self.check_idle_and_promote();
    }

    /// Called by the runner closure once its call finishes, freeing its
    /// slot and promoting the next eligible queued call.
    pub(crate) fn finish_async(self: &Arc<Self>, id: u64) {
        {
            let mut inner = self.inner.lock();
            inner.running_async.remove(&id);
        }
        self.check_idle_and_promote();
    }

    fn check_idle_and_promote(self: &Arc<Self>) {
        let (idle, callback) = {
            let inner = self.inner.lock();
            (inner.is_idle(), inner.idle_callback.clone())
        };
        if idle {
            self.idle_notify.notify_waiters();
            if let Some(cb) = callback {
                cb();
            }
        }
        self.promote();
    }

    /// The promotion algorithm (spec §4.1): scan the queue in FIFO order,
    /// skipping hosts already at their per-host cap (WebSocket upgrades are
    /// exempt from that cap), and run selected entries until `max_requests`
    /// is reached or no more entries are eligible.
    fn promote(self: &Arc<Self>) {
        loop {
            let (id, runner) = {
                let mut inner = self.inner.lock();
                if inner.running_async.len() + inner.running_sync >= inner.max_requests {
                    return;
                }
                let max_per_host = inner.max_requests_per_host;
                let idx = inner.queue.iter().position(|q| {
                    q.is_websocket || inner.per_host_count(&q.host) < max_per_host
                });
                let Some(idx) = idx else { return };
                let call = inner.queue.remove(idx).expect("index came from position()");
                let id = inner.next_id;
                inner.next_id += 1;
                inner.running_async.insert(id, RunningCall { host: call.host });
                (id, call.runner)
            };
            let token = DispatchToken { dispatcher: self.clone(), id, finished: false };
            runner(token);
        }
    }

    /// Cancels every queued and running call. Queued calls are dropped
    /// without running; running calls are left to the caller's own
    /// cancellation plumbing (the dispatcher only owns scheduling, not
    /// socket ownership) — spec §4.1 "Cancellation".
    pub(crate) fn cancel_all(&self) {
        let mut inner = self.inner.lock();
        inner.queue.clear();
    }

    /// Awaits the next idle transition (both `runningAsync` and
    /// `runningSync` empty). Used by tests and by `Client::shutdown`-style
    /// drains.
    pub async fn idle(&self) {
        loop {
            if self.inner.lock().is_idle() {
                return;
            }
            self.idle_notify.notified().await;
        }
    }
}

/// RAII guard for a synchronous call's `runningSync` membership.
pub(crate) struct SyncGuard {
    dispatcher: Arc<Dispatcher>,
}

impl Drop for SyncGuard {
    fn drop(&mut self) {
        self.dispatcher.end_sync();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn per_host_cap_blocks_extra_calls_same_host_until_first_finishes() {
        let dispatcher = Dispatcher::with_limits(10, 1);
        let ran = Arc::new(AtomicUsize::new(0));

        // First call for "a" runs immediately; hold its token open to keep
        // the per-host slot occupied.
        let ran1 = ran.clone();
        let held = Arc::new(Mutex::new(None));
        let held_slot = held.clone();
        dispatcher.enqueue("a".into(), false, move |token| {
            ran1.fetch_add(1, Ordering::SeqCst);
            *held_slot.lock() = Some(token);
        });
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.running_calls(), 1);

        let ran2 = ran.clone();
        dispatcher.enqueue("a".into(), false, move |token| {
            ran2.fetch_add(1, Ordering::SeqCst);
            token.finish();
        });
        // Second call for the same host stays queued: the first hasn't
        // finished yet.
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.queued_calls(), 1);

        // Releasing the held token frees the per-host slot and promotes
        // the queued call.
        held.lock().take().unwrap().finish();
        assert_eq!(ran.load(Ordering::SeqCst), 2);
        assert_eq!(dispatcher.queued_calls(), 0);
    }

    #[test]
    fn global_cap_is_respected_for_queue_size() {
        let dispatcher = Dispatcher::with_limits(1, 10);
        assert_eq!(dispatcher.max_requests(), 1);
    }
}
