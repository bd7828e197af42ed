//! End-to-end tests for push subscription registration endpoints.

mod common;

use common::{TestClient, TestServer, SELLER_1, SELLER_2};
use reqwest::StatusCode;
use vitrina_seller_server::push::SubscriptionStore;

#[tokio::test]
async fn test_put_push_subscription() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let response = client
        .put_push_subscription(SELLER_1, "https://push.example/sub-1")
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let stored = server
        .notification_store
        .get_subscription(SELLER_1)
        .unwrap()
        .expect("Subscription not stored");
    assert_eq!(stored.endpoint, "https://push.example/sub-1");
}

#[tokio::test]
async fn test_put_push_subscription_overwrites_previous() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    client
        .put_push_subscription(SELLER_1, "https://push.example/old")
        .await;
    let response = client
        .put_push_subscription(SELLER_1, "https://push.example/new")
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let stored = server
        .notification_store
        .get_subscription(SELLER_1)
        .unwrap()
        .unwrap();
    assert_eq!(stored.endpoint, "https://push.example/new");
}

#[tokio::test]
async fn test_delete_push_subscription() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    client
        .put_push_subscription(SELLER_1, "https://push.example/sub-1")
        .await;

    let response = client.delete_push_subscription(SELLER_1).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    assert!(server
        .notification_store
        .get_subscription(SELLER_1)
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_delete_missing_push_subscription_returns_not_found() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let response = client.delete_push_subscription(SELLER_1).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_subscriptions_are_per_seller() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    client
        .put_push_subscription(SELLER_1, "https://push.example/sub-1")
        .await;

    assert!(server
        .notification_store
        .get_subscription(SELLER_2)
        .unwrap()
        .is_none());
}
