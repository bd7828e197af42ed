//! End-to-end tests for notification listing, stats and mark-read endpoints.

mod common;

use common::{seed_notifications, TestClient, TestServer, SELLER_1, SELLER_2};
use reqwest::StatusCode;
use serde_json::Value;

#[tokio::test]
async fn test_list_notifications_empty() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let response = client.list_notifications(SELLER_1).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_list_notifications_ascending_by_id() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let ids = seed_notifications(server.notification_store.as_ref(), SELLER_1, 3);

    let response = client.list_notifications(SELLER_1).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    let listed: Vec<i64> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["id"].as_i64().unwrap())
        .collect();
    assert_eq!(listed, ids);
}

#[tokio::test]
async fn test_list_notifications_after_id_cursor() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let ids = seed_notifications(server.notification_store.as_ref(), SELLER_1, 5);

    let response = client
        .list_notifications_with_query(SELLER_1, &format!("after_id={}", ids[1]))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    let listed: Vec<i64> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["id"].as_i64().unwrap())
        .collect();
    assert_eq!(listed, ids[2..].to_vec());
}

#[tokio::test]
async fn test_list_notifications_respects_limit() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    seed_notifications(server.notification_store.as_ref(), SELLER_1, 5);

    let response = client
        .list_notifications_with_query(SELLER_1, "limit=2")
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_list_notifications_does_not_leak_across_sellers() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    seed_notifications(server.notification_store.as_ref(), SELLER_1, 2);

    let response = client.list_notifications(SELLER_2).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_unread_filter_excludes_read_notifications() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let ids = seed_notifications(server.notification_store.as_ref(), SELLER_1, 3);

    let response = client.mark_notifications_read(SELLER_1, &ids[..1]).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = client
        .list_notifications_with_query(SELLER_1, "unread=true")
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    let listed: Vec<i64> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["id"].as_i64().unwrap())
        .collect();
    assert_eq!(listed, ids[1..].to_vec());
}

#[tokio::test]
async fn test_replay_endpoint_returns_everything_after_cursor() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let ids = seed_notifications(server.notification_store.as_ref(), SELLER_1, 4);

    let response = client
        .replay_notifications(SELLER_1, ids[2])
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    let listed: Vec<i64> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["id"].as_i64().unwrap())
        .collect();
    assert_eq!(listed, ids[3..].to_vec());
}

#[tokio::test]
async fn test_mark_read_returns_updated_count() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let ids = seed_notifications(server.notification_store.as_ref(), SELLER_1, 3);

    let response = client.mark_notifications_read(SELLER_1, &ids[..2]).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["updated"].as_u64().unwrap(), 2);

    // Marking the same ids again updates nothing
    let response = client.mark_notifications_read(SELLER_1, &ids[..2]).await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["updated"].as_u64().unwrap(), 0);
}

#[tokio::test]
async fn test_mark_all_read() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    seed_notifications(server.notification_store.as_ref(), SELLER_1, 4);

    let response = client.mark_all_notifications_read(SELLER_1).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["updated"].as_u64().unwrap(), 4);

    let response = client
        .list_notifications_with_query(SELLER_1, "unread=true")
        .await;
    let body: Value = response.json().await.unwrap();
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_mark_read_ignores_other_sellers_notifications() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let ids = seed_notifications(server.notification_store.as_ref(), SELLER_1, 2);

    // SELLER_2 cannot mark SELLER_1's notifications
    let response = client.mark_notifications_read(SELLER_2, &ids).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["updated"].as_u64().unwrap(), 0);
}

#[tokio::test]
async fn test_stats_counts_by_kind() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let ids = seed_notifications(server.notification_store.as_ref(), SELLER_1, 3);
    client.mark_notifications_read(SELLER_1, &ids[..1]).await;

    let response = client.get_notification_stats(SELLER_1).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    let by_kind = body["by_kind"].as_array().unwrap();
    assert_eq!(by_kind.len(), 1);

    let (kind, stats) = (&by_kind[0][0], &by_kind[0][1]);
    assert_eq!(kind.as_str().unwrap(), "system");
    assert_eq!(stats["total"].as_u64().unwrap(), 3);
    assert_eq!(stats["unread"].as_u64().unwrap(), 2);
    assert_eq!(stats["delivered"].as_u64().unwrap(), 0);
}

#[tokio::test]
async fn test_home_reports_queue_stats() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let response = client.get_home().await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert!(body.get("uptime").is_some());
    assert_eq!(body["queue"]["pending"].as_u64().unwrap(), 0);
    assert_eq!(body["connected_sellers"].as_u64().unwrap(), 0);
}
