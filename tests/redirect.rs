mod support;

use corehttp::{Body, Client};
use support::server;

#[tokio::test]
async fn redirect_301_changes_post_to_get() {
    let server = server::http(|req| async move {
        if req.method() == http::Method::POST {
            assert_eq!(req.uri().path(), "/redirect");
            http::Response::builder()
                .status(301)
                .header("location", "/dst")
                .body(Body::default())
                .unwrap()
        } else {
            assert_eq!(req.method(), http::Method::GET);
            assert_eq!(req.uri().path(), "/dst");
            http::Response::builder().header("server", "dst").body(Body::default()).unwrap()
        }
    });

    let client = Client::new();
    let res = client.post(server.url("/redirect")).body("hi").send().await.unwrap();
    assert_eq!(res.status(), corehttp::StatusCode::OK);
    assert_eq!(res.url().path(), "/dst");
    assert_eq!(res.headers().get("server").unwrap(), "dst");
    assert_eq!(res.prior_responses().len(), 1);
    assert_eq!(res.prior_responses()[0].status, corehttp::StatusCode::MOVED_PERMANENTLY);
}

#[tokio::test]
async fn redirect_307_preserves_method_and_body() {
    let server = server::http(|mut req| async move {
        use http_body_util::BodyExt;
        if req.uri().path() == "/redirect" {
            assert_eq!(req.method(), http::Method::POST);
            let data = req.body_mut().frame().await.unwrap().unwrap().into_data().unwrap();
            assert_eq!(&*data, b"payload");
            http::Response::builder()
                .status(307)
                .header("location", "/dst")
                .body(Body::default())
                .unwrap()
        } else {
            assert_eq!(req.method(), http::Method::POST);
            http::Response::builder().body(Body::default()).unwrap()
        }
    });

    let client = Client::new();
    let res = client.post(server.url("/redirect")).body("payload").send().await.unwrap();
    assert_eq!(res.status(), corehttp::StatusCode::OK);
}

#[tokio::test]
async fn too_many_redirects_is_a_policy_error() {
    let server = server::http(|req| async move {
        let n: u32 = req.uri().path().trim_start_matches('/').parse().unwrap_or(0);
        http::Response::builder()
            .status(302)
            .header("location", format!("/{}", n + 1))
            .body(Body::default())
            .unwrap()
    });

    let client = Client::builder().redirect_policy(corehttp::redirect::Policy::limited(3)).build().unwrap();
    let err = client.get(server.url("/0")).send().await.unwrap_err();
    assert!(err.is_redirect());
}

#[tokio::test]
async fn follow_redirects_false_returns_the_3xx_as_is() {
    let server = server::http(|_req| async move {
        http::Response::builder()
            .status(302)
            .header("location", "/dst")
            .body(Body::default())
            .unwrap()
    });

    let client = Client::builder().follow_redirects(false).build().unwrap();
    let res = client.get(server.url("/start")).send().await.unwrap();
    assert_eq!(res.status(), corehttp::StatusCode::FOUND);
}
