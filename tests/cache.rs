mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use corehttp::{Body, Client};
use support::server;

#[tokio::test]
async fn freshness_hit_serves_without_a_second_round_trip() {
    let hits = Arc::new(AtomicUsize::new(0));
    let hits2 = hits.clone();
    let server = server::http(move |_req| {
        let hits = hits2.clone();
        async move {
            hits.fetch_add(1, Ordering::SeqCst);
            http::Response::builder()
                .header("cache-control", "max-age=300")
                .body(Body::from("fresh"))
                .unwrap()
        }
    });

    let dir = tempfile::tempdir().unwrap();
    let client = Client::builder().cache(dir.path(), 10 * 1024 * 1024).unwrap().build().unwrap();

    let url = server.url("/a");
    let first = client.get(&url).send().await.unwrap();
    assert_eq!(first.status(), corehttp::StatusCode::OK);

    let mut second = client.get(&url).send().await.unwrap();
    assert_eq!(second.text().await.unwrap(), "fresh");

    assert_eq!(hits.load(Ordering::SeqCst), 1, "second request should be served entirely from cache");
    let stats = client.cache_stats().unwrap();
    assert_eq!(stats.hit_count, 1);
}

#[tokio::test]
async fn conditional_hit_revalidates_with_etag() {
    let hits = Arc::new(AtomicUsize::new(0));
    let hits2 = hits.clone();
    let server = server::http(move |req| {
        let hits = hits2.clone();
        async move {
            hits.fetch_add(1, Ordering::SeqCst);
            if req.headers().get("if-none-match").map(|v| v == "\"v1\"").unwrap_or(false) {
                return http::Response::builder()
                    .status(304)
                    .header("etag", "\"v1\"")
                    .body(Body::default())
                    .unwrap();
            }
            http::Response::builder()
                .header("cache-control", "no-cache")
                .header("etag", "\"v1\"")
                .body(Body::from("body"))
                .unwrap()
        }
    });

    let dir = tempfile::tempdir().unwrap();
    let client = Client::builder().cache(dir.path(), 10 * 1024 * 1024).unwrap().build().unwrap();
    let url = server.url("/a");

    let mut first = client.get(&url).send().await.unwrap();
    assert_eq!(first.text().await.unwrap(), "body");

    let mut second = client.get(&url).send().await.unwrap();
    assert_eq!(second.text().await.unwrap(), "body");
    assert_eq!(hits.load(Ordering::SeqCst), 2, "no-cache forces revalidation on every request");
}

#[tokio::test]
async fn post_invalidates_the_cached_entry() {
    let revision = Arc::new(AtomicUsize::new(0));
    let revision2 = revision.clone();
    let server = server::http(move |req| {
        let revision = revision2.clone();
        async move {
            if req.method() == http::Method::POST {
                revision.fetch_add(1, Ordering::SeqCst);
                return http::Response::builder().body(Body::default()).unwrap();
            }
            let n = revision.load(Ordering::SeqCst);
            http::Response::builder()
                .header("cache-control", "max-age=300")
                .body(Body::from(format!("v{n}")))
                .unwrap()
        }
    });

    let dir = tempfile::tempdir().unwrap();
    let client = Client::builder().cache(dir.path(), 10 * 1024 * 1024).unwrap().build().unwrap();
    let url = server.url("/a");

    let mut first = client.get(&url).send().await.unwrap();
    assert_eq!(first.text().await.unwrap(), "v0");

    client.post(&url).send().await.unwrap();

    let mut second = client.get(&url).send().await.unwrap();
    assert_eq!(second.text().await.unwrap(), "v1", "POST should invalidate the prior GET's cache entry");
}
