//! Domain Entities - Core business objects
//!
//! These entities represent the state the guards read and the dispatcher
//! maintains. They carry no I/O and contain only business logic.

use crate::domain::value_objects::{CampaignStatus, Channel, DeliveryOutcome, HealthMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Published connectivity state of the primary store.
///
/// `mode` is derived from `is_healthy` by every constructor and the fields
/// are private, so the two can never disagree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    is_healthy: bool,
    mode: HealthMode,
    retry_attempts: u32,
    last_checked_at: Option<DateTime<Utc>>,
}

impl HealthStatus {
    /// State at process start: unhealthy until the first successful probe.
    pub fn initial() -> Self {
        Self {
            is_healthy: false,
            mode: HealthMode::Degraded,
            retry_attempts: 0,
            last_checked_at: None,
        }
    }

    /// State after a successful probe.
    pub fn after_success(checked_at: DateTime<Utc>) -> Self {
        Self {
            is_healthy: true,
            mode: HealthMode::Healthy,
            retry_attempts: 0,
            last_checked_at: Some(checked_at),
        }
    }

    /// State after a failed probe, carrying the retry counter forward.
    pub fn after_failure(&self, checked_at: DateTime<Utc>) -> Self {
        Self {
            is_healthy: false,
            mode: HealthMode::Degraded,
            retry_attempts: self.retry_attempts.saturating_add(1),
            last_checked_at: Some(checked_at),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }

    pub fn mode(&self) -> HealthMode {
        self.mode
    }

    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    pub fn last_checked_at(&self) -> Option<DateTime<Utc>> {
        self.last_checked_at
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::initial()
    }
}

/// Registration of an external credential. Identity is fixed once registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialDefinition {
    /// Environment variable holding the credential
    pub key: String,
    /// Human-readable provider name
    pub service_name: String,
    /// What the application uses the provider for
    pub purpose: String,
    /// Required credentials block dependent routes when absent
    pub required: bool,
    /// Where an operator obtains the credential
    pub setup_url: Option<String>,
}

impl CredentialDefinition {
    pub fn new(
        key: impl Into<String>,
        service_name: impl Into<String>,
        purpose: impl Into<String>,
        required: bool,
    ) -> Self {
        Self {
            key: key.into(),
            service_name: service_name.into(),
            purpose: purpose.into(),
            required,
            setup_url: None,
        }
    }

    pub fn with_setup_url(mut self, url: impl Into<String>) -> Self {
        self.setup_url = Some(url.into());
        self
    }

    /// Snapshot this definition with a freshly evaluated availability.
    pub fn record(&self, is_available: bool) -> CredentialRecord {
        CredentialRecord {
            key: self.key.clone(),
            service_name: self.service_name.clone(),
            purpose: self.purpose.clone(),
            required: self.required,
            setup_url: self.setup_url.clone(),
            is_available,
        }
    }
}

/// A credential definition together with its availability at check time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    pub key: String,
    pub service_name: String,
    pub purpose: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup_url: Option<String>,
    pub is_available: bool,
}

/// A single addressee of a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Recipient {
    /// Email address or phone number, depending on channel
    pub address: String,
    #[serde(default)]
    pub channel: Channel,
}

impl Recipient {
    pub fn email(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            channel: Channel::Email,
        }
    }

    pub fn sms(number: impl Into<String>) -> Self {
        Self {
            address: number.into(),
            channel: Channel::Sms,
        }
    }
}

/// Per-recipient dispatch progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientStatus {
    /// Waiting for a dispatch slot
    Queued,
    /// Owned by a delivery task (attempting or backing off)
    Processing,
    /// Final outcome recorded
    Done(DeliveryOutcome),
}

/// Recipient-level state the campaign statistics are derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientState {
    pub recipient: Recipient,
    pub status: RecipientStatus,
    /// Delivery attempts made so far, across pauses
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl RecipientState {
    pub fn queued(recipient: Recipient) -> Self {
        Self {
            recipient,
            status: RecipientStatus::Queued,
            attempts: 0,
            last_error: None,
        }
    }

    pub fn outcome(&self) -> Option<DeliveryOutcome> {
        match self.status {
            RecipientStatus::Done(outcome) => Some(outcome),
            _ => None,
        }
    }
}

/// Read-only view of a campaign.
///
/// Totals are recomputed from recipient state each time a view is taken:
/// `total_sent` counts recipients with a recorded outcome, so
/// `total_sent == total_delivered + total_failed` holds for every view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationCampaign {
    pub id: Uuid,
    pub name: String,
    pub status: CampaignStatus,
    /// Maximum deliveries per minute
    pub rate_limit: u32,
    /// Retries allowed per recipient after the first attempt
    pub retry_attempts: u32,
    pub estimated_recipients: usize,
    pub total_sent: usize,
    pub total_delivered: usize,
    pub total_failed: usize,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Derived queue statistics for a campaign.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    /// Delivered share of recipients with an outcome, in percent
    pub success_rate: f64,
}

impl QueueStats {
    pub fn from_states<'a>(states: impl IntoIterator<Item = &'a RecipientState>) -> Self {
        let mut stats = QueueStats {
            queued: 0,
            processing: 0,
            completed: 0,
            failed: 0,
            success_rate: 0.0,
        };
        for state in states {
            match state.status {
                RecipientStatus::Queued => stats.queued += 1,
                RecipientStatus::Processing => stats.processing += 1,
                RecipientStatus::Done(DeliveryOutcome::Delivered) => stats.completed += 1,
                RecipientStatus::Done(_) => stats.failed += 1,
            }
        }
        let finished = stats.completed + stats.failed;
        if finished > 0 {
            stats.success_rate = stats.completed as f64 * 100.0 / finished as f64;
        }
        stats
    }
}
