//! HTTP client for end-to-end tests
//!
//! This module provides a high-level HTTP client that wraps reqwest
//! and provides methods for all seller-server endpoints.
//!
//! When API routes or request formats change, update only this file.

use super::constants::*;
use reqwest::Response;
use serde_json::{json, Value};
use std::time::Duration;

/// HTTP test client
pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    // ========================================================================
    // Notification Endpoints
    // ========================================================================

    /// GET /v1/sellers/{seller_id}/notifications
    pub async fn list_notifications(&self, seller_id: &str) -> Response {
        self.client
            .get(format!(
                "{}/v1/sellers/{}/notifications",
                self.base_url, seller_id
            ))
            .send()
            .await
            .expect("List notifications request failed")
    }

    /// GET /v1/sellers/{seller_id}/notifications with query parameters
    pub async fn list_notifications_with_query(&self, seller_id: &str, query: &str) -> Response {
        self.client
            .get(format!(
                "{}/v1/sellers/{}/notifications?{}",
                self.base_url, seller_id, query
            ))
            .send()
            .await
            .expect("List notifications request failed")
    }

    /// GET /v1/sellers/{seller_id}/notifications/replay
    pub async fn replay_notifications(&self, seller_id: &str, after: i64) -> Response {
        self.client
            .get(format!(
                "{}/v1/sellers/{}/notifications/replay?after={}",
                self.base_url, seller_id, after
            ))
            .send()
            .await
            .expect("Replay request failed")
    }

    /// GET /v1/sellers/{seller_id}/notifications/stats
    pub async fn get_notification_stats(&self, seller_id: &str) -> Response {
        self.client
            .get(format!(
                "{}/v1/sellers/{}/notifications/stats",
                self.base_url, seller_id
            ))
            .send()
            .await
            .expect("Get notification stats request failed")
    }

    /// POST /v1/sellers/{seller_id}/notifications/read with specific ids
    pub async fn mark_notifications_read(&self, seller_id: &str, ids: &[i64]) -> Response {
        self.client
            .post(format!(
                "{}/v1/sellers/{}/notifications/read",
                self.base_url, seller_id
            ))
            .json(&json!({ "ids": ids }))
            .send()
            .await
            .expect("Mark read request failed")
    }

    /// POST /v1/sellers/{seller_id}/notifications/read marking everything
    pub async fn mark_all_notifications_read(&self, seller_id: &str) -> Response {
        self.client
            .post(format!(
                "{}/v1/sellers/{}/notifications/read",
                self.base_url, seller_id
            ))
            .json(&json!({}))
            .send()
            .await
            .expect("Mark all read request failed")
    }

    // ========================================================================
    // Push Subscription Endpoints
    // ========================================================================

    /// PUT /v1/sellers/{seller_id}/push-subscription
    pub async fn put_push_subscription(&self, seller_id: &str, endpoint: &str) -> Response {
        self.client
            .put(format!(
                "{}/v1/sellers/{}/push-subscription",
                self.base_url, seller_id
            ))
            .json(&json!({
                "endpoint": endpoint,
                "p256dh_key": "test-p256dh-key",
                "auth_key": "test-auth-key",
            }))
            .send()
            .await
            .expect("Put push subscription request failed")
    }

    /// DELETE /v1/sellers/{seller_id}/push-subscription
    pub async fn delete_push_subscription(&self, seller_id: &str) -> Response {
        self.client
            .delete(format!(
                "{}/v1/sellers/{}/push-subscription",
                self.base_url, seller_id
            ))
            .send()
            .await
            .expect("Delete push subscription request failed")
    }

    // ========================================================================
    // Internal Endpoints
    // ========================================================================

    /// POST /v1/internal/dispatch
    pub async fn dispatch(&self, seller_id: &str, payload: Value) -> Response {
        self.client
            .post(format!("{}/v1/internal/dispatch", self.base_url))
            .json(&json!({
                "seller_id": seller_id,
                "payload": payload,
            }))
            .send()
            .await
            .expect("Dispatch request failed")
    }

    /// GET /
    pub async fn get_home(&self) -> Response {
        self.client
            .get(format!("{}/", self.base_url))
            .send()
            .await
            .expect("Home request failed")
    }
}
