//! Log Transport
//!
//! Delivery transport that records each message in the log and always
//! succeeds. Used when no provider webhook is configured.

use crate::domain::ports::{Delivery, DeliveryError, DeliveryTransport};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct LogTransport {
    delivered: AtomicU64,
}

impl LogTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DeliveryTransport for LogTransport {
    async fn deliver(&self, delivery: Delivery<'_>) -> Result<(), DeliveryError> {
        tracing::info!(
            campaign = %delivery.campaign_id,
            recipient = %delivery.recipient.address,
            channel = ?delivery.recipient.channel,
            attempt = delivery.attempt,
            "notification delivered (log transport)"
        );
        self.delivered.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
