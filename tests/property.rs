//! Property-based fuzz-style tests (spec §8 "Property-based fuzzing
//! targets"), driven by a seeded xorshift PRNG rather than `proptest`/
//! `quickcheck` (see `SPEC_FULL.md`'s "Test tooling" note).

mod support;

use bytes::Bytes;
use corehttp::{Body, Client};
use http_body_util::BodyExt;
use support::{prng::Xorshift64, server};

/// Round-trip: cache-store then cache-load yields byte-identical response
/// bytes, for a random body on each run of the seeded generator.
#[tokio::test]
async fn cache_round_trip_preserves_random_body_bytes() {
    let mut rng = Xorshift64::new(0xC0FFEE_u64);
    let body_bytes = rng.bytes(rng.next_range(1, 8192));
    let body_for_server = body_bytes.clone();

    let server = server::http(move |_req| {
        let body = body_for_server.clone();
        async move {
            http::Response::builder()
                .header("cache-control", "max-age=300")
                .body(Body::from(body))
                .unwrap()
        }
    });

    let dir = tempfile::tempdir().unwrap();
    let client = Client::builder().cache(dir.path(), 10 * 1024 * 1024).unwrap().build().unwrap();
    let url = server.url("/random");

    let mut first = client.get(&url).send().await.unwrap();
    let first_bytes = first.bytes().await.unwrap();
    assert_eq!(first_bytes.as_ref(), body_bytes.as_slice());

    // Second request is satisfied entirely from the on-disk cache; its
    // bytes must be identical to what the first response stored.
    let mut second = client.get(&url).send().await.unwrap();
    let second_bytes = second.bytes().await.unwrap();
    assert_eq!(second_bytes.as_ref(), body_bytes.as_slice());

    let stats = client.cache_stats().unwrap();
    assert_eq!(stats.hit_count, 1);
}

/// Chunked encoding: a body up to 1 MiB, split into random chunk sizes and
/// sent with no `Content-Length` (forcing HTTP/1.1 `Transfer-Encoding:
/// chunked`), decodes byte-for-byte identical on the far end — exercised
/// both request→server and server→response to cover both codec directions.
#[tokio::test]
async fn chunked_body_round_trips_with_random_chunk_sizes() {
    let mut rng = Xorshift64::new(0xFACADE_u64);
    let payload = rng.bytes(rng.next_range(1, 1024 * 1024));
    let chunks = split_into_random_chunks(&payload, &mut rng);

    let payload_for_server = payload.clone();
    let server = server::http(move |req| {
        let expected = payload_for_server.clone();
        async move {
            let received = req.into_body().collect().await.unwrap().to_bytes();
            assert_eq!(received.as_ref(), expected.as_slice(), "server must receive the exact request body bytes");
            http::Response::builder().body(Body::from(expected)).unwrap()
        }
    });

    let client = Client::new();
    let url = server.url("/echo");
    let stream = futures_util::stream::iter(chunks.into_iter().map(Ok::<Bytes, std::io::Error>));
    let request_body = Body::wrap_stream(stream);

    let mut response = client.post(&url).body(request_body).send().await.unwrap();
    let response_bytes = response.bytes().await.unwrap();
    assert_eq!(response_bytes.as_ref(), payload.as_slice());
}

fn split_into_random_chunks(payload: &[u8], rng: &mut Xorshift64) -> Vec<Bytes> {
    let mut chunks = Vec::new();
    let mut offset = 0;
    while offset < payload.len() {
        let remaining = payload.len() - offset;
        let take = rng.next_range(1, remaining.min(4096));
        chunks.push(Bytes::copy_from_slice(&payload[offset..offset + take]));
        offset += take;
    }
    if chunks.is_empty() {
        chunks.push(Bytes::new());
    }
    chunks
}
