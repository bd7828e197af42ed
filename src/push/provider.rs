//! HTTP client for the external push provider.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::models::{PushError, PushSubscription};

/// Message handed to the push provider for one subscription.
#[derive(Debug, Clone, Serialize)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
}

/// Transport towards the push provider. The HTTP implementation is the only
/// one used in production; tests swap in fakes.
#[async_trait]
pub trait PushProvider: Send + Sync {
    async fn send(
        &self,
        subscription: &PushSubscription,
        message: &PushMessage,
    ) -> Result<(), PushError>;
}

#[derive(Debug, Serialize)]
struct ProviderRequest<'a> {
    endpoint: &'a str,
    p256dh_key: &'a str,
    auth_key: &'a str,
    #[serde(flatten)]
    message: &'a PushMessage,
    ttl_secs: u64,
}

/// Client for the push relay service that performs the actual web push
/// encryption and delivery.
#[derive(Clone)]
pub struct HttpPushProvider {
    client: Client,
    base_url: String,
    ttl_secs: u64,
}

impl HttpPushProvider {
    pub fn new(base_url: String, timeout_secs: u64, ttl_secs: u64) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url,
            ttl_secs,
        })
    }
}

#[async_trait]
impl PushProvider for HttpPushProvider {
    async fn send(
        &self,
        subscription: &PushSubscription,
        message: &PushMessage,
    ) -> Result<(), PushError> {
        let url = format!("{}/send", self.base_url);
        let request = ProviderRequest {
            endpoint: &subscription.endpoint,
            p256dh_key: &subscription.p256dh_key,
            auth_key: &subscription.auth_key,
            message,
            ttl_secs: self.ttl_secs,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| PushError::Unreachable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        match status.as_u16() {
            404 | 410 => Err(PushError::SubscriptionGone),
            code => Err(PushError::Rejected(code)),
        }
    }
}
