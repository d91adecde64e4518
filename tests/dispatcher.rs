mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use corehttp::{Body, Client, Dispatcher};
use support::server;
use tokio::sync::Notify;

#[tokio::test]
async fn per_host_cap_serializes_requests_to_the_same_host() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = Arc::new(AtomicUsize::new(0));
    let release = Arc::new(Notify::new());

    let in_flight2 = in_flight.clone();
    let max2 = max_in_flight.clone();
    let release2 = release.clone();
    let server = server::http(move |_req| {
        let in_flight = in_flight2.clone();
        let max_in_flight = max2.clone();
        let release = release2.clone();
        async move {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            max_in_flight.fetch_max(now, Ordering::SeqCst);
            release.notified().await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
            http::Response::builder().body(Body::default()).unwrap()
        }
    });

    let dispatcher = Dispatcher::with_limits(10, 1);
    let client = Client::builder().dispatcher(dispatcher.clone()).build().unwrap();

    let url = server.url("/a");
    let first = client.get(&url).send();
    let second = client.get(&url).send();
    let (first, second) = tokio::join!(first, async {
        // Give the first request time to reach the server and occupy the
        // per-host slot before releasing both.
        tokio::time::sleep(Duration::from_millis(50)).await;
        release.notify_waiters();
        second.await
    });

    assert!(first.unwrap().status().is_success());
    assert!(second.unwrap().status().is_success());
    assert_eq!(max_in_flight.load(Ordering::SeqCst), 1, "per-host cap of 1 should serialize the two requests");
}

#[tokio::test]
async fn idle_callback_fires_once_all_calls_complete() {
    let server = server::http(|_req| async move { http::Response::builder().body(Body::default()).unwrap() });
    let dispatcher = Dispatcher::new();
    let fired = Arc::new(AtomicUsize::new(0));
    let fired2 = fired.clone();
    dispatcher.set_idle_callback(Some(move || {
        fired2.fetch_add(1, Ordering::SeqCst);
    }));

    let client = Client::builder().dispatcher(dispatcher.clone()).build().unwrap();
    client.get(server.url("/a")).send().await.unwrap();
    dispatcher.idle().await;
    assert!(fired.load(Ordering::SeqCst) >= 1);
}
