//! Webhook Transport
//!
//! Posts each notification as JSON to a provider webhook. Response status
//! decides the attempt outcome:
//! - 2xx: delivered
//! - 408, 429: transient (provider throttling)
//! - other 4xx: bounced (the provider rejected the recipient)
//! - 5xx, timeouts, connection errors: transient, eligible for retry

use crate::domain::entities::Recipient;
use crate::domain::ports::{Delivery, DeliveryError, DeliveryTransport};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload<'a> {
    campaign_id: Uuid,
    campaign_name: &'a str,
    #[serde(flatten)]
    recipient: &'a Recipient,
    attempt: u32,
}

pub struct WebhookTransport {
    url: String,
    client: reqwest::Client,
}

impl WebhookTransport {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl DeliveryTransport for WebhookTransport {
    async fn deliver(&self, delivery: Delivery<'_>) -> Result<(), DeliveryError> {
        let payload = WebhookPayload {
            campaign_id: delivery.campaign_id,
            campaign_name: delivery.campaign_name,
            recipient: delivery.recipient,
            attempt: delivery.attempt,
        };

        let resp = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| DeliveryError::Transient(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::REQUEST_TIMEOUT {
            Err(DeliveryError::Transient(format!("provider throttled: {}", status)))
        } else if status.is_client_error() {
            Err(DeliveryError::Bounced(format!("provider returned {}", status)))
        } else {
            Err(DeliveryError::Transient(format!("provider returned {}", status)))
        }
    }
}
