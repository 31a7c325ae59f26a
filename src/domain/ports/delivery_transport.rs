//! Delivery Transport Port
//!
//! Outbound email/SMS delivery used by the notification dispatcher.

use crate::domain::entities::Recipient;
use async_trait::async_trait;
use uuid::Uuid;

/// Outcome of a single failed delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// Worth retrying (provider 5xx, network error, throttling)
    #[error("transient delivery failure: {0}")]
    Transient(String),
    /// Provider rejected the address; retrying will not help
    #[error("recipient bounced: {0}")]
    Bounced(String),
    /// Non-retryable failure not attributable to the address
    #[error("permanent delivery failure: {0}")]
    Permanent(String),
}

impl DeliveryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// A message handed to a transport.
#[derive(Debug, Clone)]
pub struct Delivery<'a> {
    pub campaign_id: Uuid,
    pub campaign_name: &'a str,
    pub recipient: &'a Recipient,
    /// 1-based attempt number for this recipient
    pub attempt: u32,
}

#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    async fn deliver(&self, delivery: Delivery<'_>) -> Result<(), DeliveryError>;
}
