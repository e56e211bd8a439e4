//! E2E tests for discovery endpoints

mod common;

use common::schema_validator::assert_matches_schema;
use common::{FakeBackend, HOSTNAME, TestServer};

async fn webfinger(server: &TestServer, resource: &str) -> reqwest::Response {
    server
        .client
        .get(&server.url("/.well-known/webfinger"))
        .query(&[("resource", resource)])
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_webfinger_local_user() {
    let server = TestServer::new().await;

    let response = webfinger(&server, "acct:alice@myhost.example").await;

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/jrd+json"
    );

    let body: serde_json::Value = response.json().await.unwrap();
    assert_matches_schema(&body, "webfinger");
    assert_eq!(body["subject"], format!("acct:alice@{}", HOSTNAME));
    assert_eq!(
        body["links"][0]["rel"],
        "http://webfinger.net/rel/profile-page"
    );
    assert_eq!(body["links"][0]["href"], "https://myhost.example/#/@alice");
    assert_eq!(body["links"][1]["rel"], "self");
    assert_eq!(body["links"][1]["type"], "application/activity+json");
    assert_eq!(body["links"][1]["href"], "https://myhost.example/ap/@alice");
}

#[tokio::test]
async fn test_webfinger_foreign_host_not_found() {
    let server = TestServer::new().await;

    let response = webfinger(&server, "acct:bob@otherhost.example").await;

    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_webfinger_unknown_and_malformed_are_indistinguishable() {
    let server = TestServer::new().await;

    let unknown = webfinger(&server, "acct:ghost@myhost.example").await;
    let unknown_status = unknown.status();
    let unknown_body = unknown.text().await.unwrap();

    for resource in ["garbage", "acct:", "https://myhost.example/ap/@alice"] {
        let response = webfinger(&server, resource).await;
        assert_eq!(response.status(), unknown_status, "resource {resource}");
        assert_eq!(response.text().await.unwrap(), unknown_body);
    }

    assert_eq!(unknown_status, 404);
}

#[tokio::test]
async fn test_webfinger_missing_resource_not_found() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(&server.url("/.well-known/webfinger"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_webfinger_without_users_finds_nobody() {
    let server = TestServer::with_backend(FakeBackend::default()).await;

    let response = webfinger(&server, "acct:alice@myhost.example").await;

    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_webfinger_directory_failure_is_server_error() {
    let server = TestServer::with_backend(FakeBackend {
        directory_down: true,
        ..FakeBackend::with_users(&["alice"])
    })
    .await;

    let response = webfinger(&server, "acct:alice@myhost.example").await;

    assert_eq!(response.status(), 500);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Internal server error");
}

#[tokio::test]
async fn test_host_meta() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(&server.url("/.well-known/host-meta"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/xrd+xml"
    );
    let body = response.text().await.unwrap();
    assert!(body.contains(
        "https://myhost.example/.well-known/webfinger?resource={uri}"
    ));
}

#[tokio::test]
async fn test_nodeinfo_discovery() {
    let server = TestServer::new().await;

    let links: serde_json::Value = server
        .client
        .get(&server.url("/.well-known/nodeinfo"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        links["links"][0]["href"],
        "https://myhost.example/nodeinfo/2.0"
    );

    let nodeinfo: serde_json::Value = server
        .client
        .get(&server.url("/nodeinfo/2.0"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(nodeinfo["version"], "2.0");
    assert_eq!(nodeinfo["software"]["name"], "fedinbox");
    assert_eq!(nodeinfo["protocols"][0], "activitypub");
}
