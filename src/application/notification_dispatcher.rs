//! Notification Dispatcher - campaign lifecycle and delivery workers
//!
//! Each campaign in `sending` state has one driver task. The driver pulls
//! queued recipients, holding the campaign to its per-minute rate limit and
//! the process-wide concurrency cap, and hands each recipient to its own
//! delivery task. A delivery task owns its recipient until it records an
//! outcome, so retries of one recipient never overlap.
//!
//! Campaign totals and queue statistics are always recomputed from
//! recipient state; there are no separately maintained counters.

use crate::domain::entities::{
    NotificationCampaign, QueueStats, Recipient, RecipientState, RecipientStatus,
};
use crate::domain::ports::{Delivery, DeliveryError, DeliveryTransport};
use crate::domain::value_objects::{CampaignStatus, DeliveryOutcome};
use crate::infrastructure::{RateLimitConfig, RateLimiter, ShutdownController};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use uuid::Uuid;

/// Dispatcher tuning.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Maximum deliveries in flight across all campaigns
    pub concurrency: usize,
    /// Delay before the first retry; doubles per attempt
    pub backoff_base: Duration,
    /// Upper bound on a single retry delay
    pub backoff_max: Duration,
    /// How often the scheduler looks for due campaigns
    pub scheduler_interval: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
            scheduler_interval: Duration::from_secs(15),
        }
    }
}

fn default_rate_limit() -> u32 {
    60
}

fn default_retry_attempts() -> u32 {
    3
}

/// Request to create a campaign.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCampaign {
    pub name: String,
    /// Deliveries per minute
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,
    /// Retries per recipient after the first attempt
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    pub recipients: Vec<Recipient>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("campaign {0} not found")]
    CampaignNotFound(Uuid),

    #[error("cannot move campaign from {from} to {to}")]
    InvalidTransition {
        from: CampaignStatus,
        to: CampaignStatus,
    },

    #[error("rate limit must be at least 1 delivery per minute")]
    InvalidRateLimit,

    #[error("campaign has no recipients")]
    EmptyCampaign,
}

struct CampaignInner {
    status: CampaignStatus,
    scheduled_at: Option<DateTime<Utc>>,
    recipients: Vec<RecipientState>,
    driver_running: bool,
}

struct CampaignEntry {
    id: Uuid,
    name: String,
    rate_limit: u32,
    retry_attempts: u32,
    created_at: DateTime<Utc>,
    inner: Mutex<CampaignInner>,
    status_tx: watch::Sender<CampaignStatus>,
}

impl CampaignEntry {
    fn status(&self) -> CampaignStatus {
        self.inner.lock().status
    }

    fn view(&self) -> NotificationCampaign {
        let inner = self.inner.lock();
        let mut delivered = 0;
        let mut failed = 0;
        for state in &inner.recipients {
            match state.outcome() {
                Some(DeliveryOutcome::Delivered) => delivered += 1,
                Some(_) => failed += 1,
                None => {}
            }
        }
        NotificationCampaign {
            id: self.id,
            name: self.name.clone(),
            status: inner.status,
            rate_limit: self.rate_limit,
            retry_attempts: self.retry_attempts,
            estimated_recipients: inner.recipients.len(),
            total_sent: delivered + failed,
            total_delivered: delivered,
            total_failed: failed,
            created_at: self.created_at,
            scheduled_at: inner.scheduled_at,
        }
    }

    /// Put a recipient back in the queue without touching its attempt count.
    fn requeue(&self, idx: usize) {
        let mut inner = self.inner.lock();
        if let Some(state) = inner.recipients.get_mut(idx) {
            if state.status == RecipientStatus::Processing {
                state.status = RecipientStatus::Queued;
            }
        }
    }

    fn record(&self, idx: usize, outcome: DeliveryOutcome, error: Option<String>) {
        let mut inner = self.inner.lock();
        if let Some(state) = inner.recipients.get_mut(idx) {
            state.status = RecipientStatus::Done(outcome);
            if error.is_some() {
                state.last_error = error;
            }
        }
    }
}

/// Resolves once the watched campaign is no longer `sending`.
async fn left_sending(rx: &mut watch::Receiver<CampaignStatus>) {
    loop {
        if *rx.borrow_and_update() != CampaignStatus::Sending {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

enum DriverStep {
    Stop,
    Idle,
    Claim,
}

struct DispatcherInner {
    campaigns: DashMap<Uuid, Arc<CampaignEntry>>,
    transport: Arc<dyn DeliveryTransport>,
    limiter: RateLimiter<Uuid>,
    permits: Arc<Semaphore>,
    config: DispatchConfig,
    shutdown: ShutdownController,
}

/// Rate-limited, retrying campaign dispatcher.
#[derive(Clone)]
pub struct NotificationDispatcher {
    inner: Arc<DispatcherInner>,
}

impl NotificationDispatcher {
    pub fn new(
        transport: Arc<dyn DeliveryTransport>,
        config: DispatchConfig,
        shutdown: ShutdownController,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.concurrency.max(1)));
        Self {
            inner: Arc::new(DispatcherInner {
                campaigns: DashMap::new(),
                transport,
                limiter: RateLimiter::new(),
                permits,
                config,
                shutdown,
            }),
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.inner.config
    }

    /// Create a campaign in `draft` state.
    pub fn create_campaign(&self, request: NewCampaign) -> Result<NotificationCampaign, DispatchError> {
        if request.rate_limit == 0 {
            return Err(DispatchError::InvalidRateLimit);
        }
        if request.recipients.is_empty() {
            return Err(DispatchError::EmptyCampaign);
        }

        let id = Uuid::new_v4();
        let (status_tx, _) = watch::channel(CampaignStatus::Draft);
        let entry = Arc::new(CampaignEntry {
            id,
            name: request.name,
            rate_limit: request.rate_limit,
            retry_attempts: request.retry_attempts,
            created_at: Utc::now(),
            inner: Mutex::new(CampaignInner {
                status: CampaignStatus::Draft,
                scheduled_at: None,
                recipients: request
                    .recipients
                    .into_iter()
                    .map(RecipientState::queued)
                    .collect(),
                driver_running: false,
            }),
            status_tx,
        });

        self.inner
            .limiter
            .configure(id, &RateLimitConfig::per_minute(request.rate_limit));
        let view = entry.view();
        self.inner.campaigns.insert(id, entry);

        tracing::info!(
            campaign = %id,
            name = %view.name,
            recipients = view.estimated_recipients,
            rate_limit = view.rate_limit,
            "campaign created"
        );
        Ok(view)
    }

    fn entry(&self, id: Uuid) -> Result<Arc<CampaignEntry>, DispatchError> {
        self.inner
            .campaigns
            .get(&id)
            .map(|e| Arc::clone(e.value()))
            .ok_or(DispatchError::CampaignNotFound(id))
    }

    pub fn campaign(&self, id: Uuid) -> Result<NotificationCampaign, DispatchError> {
        Ok(self.entry(id)?.view())
    }

    /// All campaigns, oldest first.
    pub fn list(&self) -> Vec<NotificationCampaign> {
        let mut views: Vec<_> = self.inner.campaigns.iter().map(|e| e.value().view()).collect();
        views.sort_by_key(|v| v.created_at);
        views
    }

    pub fn stats(&self, id: Uuid) -> Result<QueueStats, DispatchError> {
        let entry = self.entry(id)?;
        let inner = entry.inner.lock();
        Ok(QueueStats::from_states(&inner.recipients))
    }

    /// Watch a campaign's status.
    pub fn subscribe(&self, id: Uuid) -> Result<watch::Receiver<CampaignStatus>, DispatchError> {
        Ok(self.entry(id)?.status_tx.subscribe())
    }

    /// Wait until the campaign reaches `target` or a terminal state.
    pub async fn wait_for_status(
        &self,
        id: Uuid,
        target: CampaignStatus,
    ) -> Result<CampaignStatus, DispatchError> {
        let mut rx = self.subscribe(id)?;
        let status = rx
            .wait_for(|s| *s == target || s.is_terminal())
            .await
            .map(|s| *s)
            .map_err(|_| DispatchError::CampaignNotFound(id))?;
        Ok(status)
    }

    /// Apply a status change. Returns true when the caller must spawn a driver.
    fn transition(
        &self,
        entry: &CampaignEntry,
        to: CampaignStatus,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<bool, DispatchError> {
        let spawn_driver = {
            let mut inner = entry.inner.lock();
            let from = inner.status;
            if !from.can_transition_to(to) {
                return Err(DispatchError::InvalidTransition { from, to });
            }
            inner.status = to;
            if scheduled_at.is_some() {
                inner.scheduled_at = scheduled_at;
            }
            entry.status_tx.send_replace(to);
            tracing::info!(campaign = %entry.id, %from, %to, "campaign status changed");

            let spawn = to == CampaignStatus::Sending && !inner.driver_running;
            if spawn {
                inner.driver_running = true;
            }
            spawn
        };

        if to.is_terminal() {
            self.inner.limiter.clear(&entry.id);
        }
        Ok(spawn_driver)
    }

    fn change_status(
        &self,
        id: Uuid,
        to: CampaignStatus,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<NotificationCampaign, DispatchError> {
        let entry = self.entry(id)?;
        if self.transition(&entry, to, scheduled_at)? {
            tokio::spawn(self.clone().drive(Arc::clone(&entry)));
        }
        Ok(entry.view())
    }

    /// Schedule a draft campaign to start at `at`.
    pub fn schedule(&self, id: Uuid, at: DateTime<Utc>) -> Result<NotificationCampaign, DispatchError> {
        self.change_status(id, CampaignStatus::Scheduled, Some(at))
    }

    /// Begin sending a draft or scheduled campaign.
    pub fn start(&self, id: Uuid) -> Result<NotificationCampaign, DispatchError> {
        self.change_status(id, CampaignStatus::Sending, None)
    }

    /// Stop handing out new deliveries. In-flight deliveries still record
    /// their outcome; recipients waiting for a retry go back to the queue.
    pub fn pause(&self, id: Uuid) -> Result<NotificationCampaign, DispatchError> {
        self.change_status(id, CampaignStatus::Paused, None)
    }

    pub fn resume(&self, id: Uuid) -> Result<NotificationCampaign, DispatchError> {
        let entry = self.entry(id)?;
        let from = entry.status();
        if from != CampaignStatus::Paused {
            return Err(DispatchError::InvalidTransition {
                from,
                to: CampaignStatus::Sending,
            });
        }
        self.change_status(id, CampaignStatus::Sending, None)
    }

    pub fn cancel(&self, id: Uuid) -> Result<NotificationCampaign, DispatchError> {
        self.change_status(id, CampaignStatus::Cancelled, None)
    }

    /// Start every scheduled campaign whose start time is at or before `now`.
    pub fn start_due(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        let due: Vec<Uuid> = self
            .inner
            .campaigns
            .iter()
            .filter(|e| {
                let inner = e.value().inner.lock();
                inner.status == CampaignStatus::Scheduled
                    && inner.scheduled_at.map_or(false, |at| at <= now)
            })
            .map(|e| *e.key())
            .collect();

        due.into_iter()
            .filter(|id| match self.start(*id) {
                Ok(_) => true,
                Err(e) => {
                    tracing::debug!(campaign = %id, error = %e, "scheduled start skipped");
                    false
                }
            })
            .collect()
    }

    /// Periodically start due campaigns until shutdown.
    pub fn start_scheduler(&self) -> JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(dispatcher.inner.config.scheduler_interval);
            loop {
                tokio::select! {
                    _ = dispatcher.inner.shutdown.cancelled() => {
                        tracing::debug!("campaign scheduler stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        let started = dispatcher.start_due(Utc::now());
                        if !started.is_empty() {
                            tracing::info!(count = started.len(), "scheduled campaigns started");
                        }
                    }
                }
            }
        })
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let cfg = &self.inner.config;
        let exp = attempt.saturating_sub(1).min(16);
        let delay = cfg.backoff_base.saturating_mul(1u32 << exp).min(cfg.backoff_max);
        let jitter = rand::thread_rng().gen_range(0.75..=1.25);
        delay.mul_f64(jitter).min(cfg.backoff_max)
    }

    async fn acquire_slot(&self, id: Uuid) -> Option<OwnedSemaphorePermit> {
        self.inner.limiter.acquire(&id).await;
        Arc::clone(&self.inner.permits).acquire_owned().await.ok()
    }

    fn next_step(entry: &CampaignEntry) -> DriverStep {
        let inner = entry.inner.lock();
        if inner.status != CampaignStatus::Sending {
            DriverStep::Stop
        } else if inner
            .recipients
            .iter()
            .any(|r| r.status == RecipientStatus::Queued)
        {
            DriverStep::Claim
        } else {
            DriverStep::Idle
        }
    }

    async fn drive(self, entry: Arc<CampaignEntry>) {
        let mut tasks = JoinSet::new();
        let mut status_rx = entry.status_tx.subscribe();
        tracing::debug!(campaign = %entry.id, "campaign driver started");

        loop {
            let step = if self.inner.shutdown.is_shutdown() {
                DriverStep::Stop
            } else {
                Self::next_step(&entry)
            };

            match step {
                DriverStep::Stop | DriverStep::Idle => {
                    while let Some(res) = tasks.join_next().await {
                        if let Err(e) = res {
                            tracing::error!(campaign = %entry.id, error = %e, "delivery task failed");
                        }
                    }

                    let mut inner = entry.inner.lock();
                    // No task is alive, so anything still processing was orphaned
                    for state in inner.recipients.iter_mut() {
                        if state.status == RecipientStatus::Processing {
                            state.status = RecipientStatus::Done(DeliveryOutcome::Failed);
                            state.last_error = Some("delivery task aborted".to_string());
                        }
                    }
                    if inner.status == CampaignStatus::Sending && !self.inner.shutdown.is_shutdown() {
                        let pending = inner
                            .recipients
                            .iter()
                            .any(|r| r.status == RecipientStatus::Queued);
                        if pending {
                            // Recipients were requeued by a pause/resume cycle
                            continue;
                        }
                        inner.status = CampaignStatus::Completed;
                        entry.status_tx.send_replace(CampaignStatus::Completed);
                        tracing::info!(
                            campaign = %entry.id,
                            from = %CampaignStatus::Sending,
                            to = %CampaignStatus::Completed,
                            "campaign status changed"
                        );
                        self.inner.limiter.clear(&entry.id);
                    }
                    inner.driver_running = false;
                    tracing::debug!(campaign = %entry.id, status = %inner.status, "campaign driver stopped");
                    return;
                }
                DriverStep::Claim => {}
            }

            let permit = tokio::select! {
                _ = self.inner.shutdown.cancelled() => continue,
                _ = left_sending(&mut status_rx) => continue,
                permit = self.acquire_slot(entry.id) => permit,
            };
            let Some(permit) = permit else { continue };

            let claimed = {
                let mut inner = entry.inner.lock();
                if inner.status != CampaignStatus::Sending {
                    None
                } else {
                    inner
                        .recipients
                        .iter_mut()
                        .enumerate()
                        .find(|(_, r)| r.status == RecipientStatus::Queued)
                        .map(|(idx, r)| {
                            r.status = RecipientStatus::Processing;
                            (idx, r.recipient.clone())
                        })
                }
            };

            if let Some((idx, recipient)) = claimed {
                tasks.spawn(self.clone().deliver(Arc::clone(&entry), idx, recipient, permit));
            }
        }
    }

    async fn deliver(
        self,
        entry: Arc<CampaignEntry>,
        idx: usize,
        recipient: Recipient,
        permit: OwnedSemaphorePermit,
    ) {
        let _guard = self.inner.shutdown.delivery_guard();
        let mut status_rx = entry.status_tx.subscribe();
        let mut permit = permit;

        loop {
            let attempt = {
                let mut inner = entry.inner.lock();
                match inner.recipients.get_mut(idx) {
                    Some(state) => {
                        state.attempts += 1;
                        state.attempts
                    }
                    None => return,
                }
            };

            let result = self
                .inner
                .transport
                .deliver(Delivery {
                    campaign_id: entry.id,
                    campaign_name: &entry.name,
                    recipient: &recipient,
                    attempt,
                })
                .await;
            drop(permit);

            let err = match result {
                Ok(()) => {
                    entry.record(idx, DeliveryOutcome::Delivered, None);
                    return;
                }
                Err(e) => e,
            };

            if !err.is_retryable() || attempt > entry.retry_attempts {
                let outcome = match err {
                    DeliveryError::Bounced(_) => DeliveryOutcome::Bounced,
                    _ => DeliveryOutcome::Failed,
                };
                tracing::warn!(
                    campaign = %entry.id,
                    recipient = %recipient.address,
                    attempts = attempt,
                    error = %err,
                    "delivery failed"
                );
                entry.record(idx, outcome, Some(err.to_string()));
                return;
            }

            if let Some(state) = entry.inner.lock().recipients.get_mut(idx) {
                state.last_error = Some(err.to_string());
            }
            let delay = self.backoff_delay(attempt);
            tracing::debug!(
                campaign = %entry.id,
                recipient = %recipient.address,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "delivery failed, retrying"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = left_sending(&mut status_rx) => {
                    entry.requeue(idx);
                    return;
                }
                _ = self.inner.shutdown.cancelled() => {
                    entry.requeue(idx);
                    return;
                }
            }

            let next = tokio::select! {
                _ = left_sending(&mut status_rx) => None,
                _ = self.inner.shutdown.cancelled() => None,
                permit = self.acquire_slot(entry.id) => permit,
            };
            match next {
                Some(p) => permit = p,
                None => {
                    entry.requeue(idx);
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails each address a scripted number of times before succeeding.
    #[derive(Default)]
    struct ScriptedTransport {
        transient_failures: DashMap<String, u32>,
        bounced: HashSet<String>,
        calls: AtomicU32,
    }

    impl ScriptedTransport {
        fn fail_times(self, address: &str, times: u32) -> Self {
            self.transient_failures.insert(address.to_string(), times);
            self
        }

        fn bounce(mut self, address: &str) -> Self {
            self.bounced.insert(address.to_string());
            self
        }
    }

    #[async_trait]
    impl DeliveryTransport for ScriptedTransport {
        async fn deliver(&self, delivery: Delivery<'_>) -> Result<(), DeliveryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let address = &delivery.recipient.address;
            if self.bounced.contains(address) {
                return Err(DeliveryError::Bounced("unknown mailbox".into()));
            }
            if let Some(mut remaining) = self.transient_failures.get_mut(address) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(DeliveryError::Transient("provider 503".into()));
                }
            }
            Ok(())
        }
    }

    fn recipients(n: usize) -> Vec<Recipient> {
        (0..n)
            .map(|i| Recipient::email(format!("voter{}@example.org", i)))
            .collect()
    }

    fn new_campaign(n: usize, rate_limit: u32, retry_attempts: u32) -> NewCampaign {
        NewCampaign {
            name: "early voting reminder".to_string(),
            rate_limit,
            retry_attempts,
            recipients: recipients(n),
        }
    }

    fn dispatcher(transport: ScriptedTransport) -> (NotificationDispatcher, Arc<ScriptedTransport>) {
        let transport = Arc::new(transport);
        let dispatcher = NotificationDispatcher::new(
            transport.clone(),
            DispatchConfig::default(),
            ShutdownController::new(),
        );
        (dispatcher, transport)
    }

    #[test]
    fn test_create_campaign_validation() {
        let (dispatcher, _) = dispatcher(ScriptedTransport::default());

        assert_eq!(
            dispatcher.create_campaign(new_campaign(3, 0, 1)).unwrap_err(),
            DispatchError::InvalidRateLimit
        );
        assert_eq!(
            dispatcher.create_campaign(new_campaign(0, 10, 1)).unwrap_err(),
            DispatchError::EmptyCampaign
        );

        let campaign = dispatcher.create_campaign(new_campaign(3, 10, 1)).unwrap();
        assert_eq!(campaign.status, CampaignStatus::Draft);
        assert_eq!(campaign.estimated_recipients, 3);
        assert_eq!(campaign.total_sent, 0);
        assert_eq!(dispatcher.list().len(), 1);
    }

    #[test]
    fn test_new_campaign_deserialize_defaults() {
        let request: NewCampaign = serde_json::from_value(serde_json::json!({
            "name": "polls open",
            "recipients": [{"address": "+15550100", "channel": "sms"}]
        }))
        .unwrap();
        assert_eq!(request.rate_limit, 60);
        assert_eq!(request.retry_attempts, 3);
        assert_eq!(request.recipients[0], Recipient::sms("+15550100"));
    }

    #[test]
    fn test_unknown_campaign() {
        let (dispatcher, _) = dispatcher(ScriptedTransport::default());
        let id = Uuid::new_v4();
        assert_eq!(
            dispatcher.campaign(id).unwrap_err(),
            DispatchError::CampaignNotFound(id)
        );
        assert!(dispatcher.stats(id).is_err());
        assert!(dispatcher.pause(id).is_err());
    }

    #[tokio::test]
    async fn test_invalid_transitions() {
        let (dispatcher, _) = dispatcher(ScriptedTransport::default());
        let id = dispatcher.create_campaign(new_campaign(2, 10, 0)).unwrap().id;

        assert_eq!(
            dispatcher.pause(id).unwrap_err(),
            DispatchError::InvalidTransition {
                from: CampaignStatus::Draft,
                to: CampaignStatus::Paused
            }
        );
        assert!(dispatcher.resume(id).is_err());

        dispatcher.cancel(id).unwrap();
        assert!(dispatcher.start(id).is_err());
        assert!(dispatcher.cancel(id).is_err());
        assert_eq!(dispatcher.campaign(id).unwrap().status, CampaignStatus::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_campaign_completes() {
        let (dispatcher, transport) = dispatcher(ScriptedTransport::default());
        let id = dispatcher.create_campaign(new_campaign(20, 600, 1)).unwrap().id;

        dispatcher.start(id).unwrap();
        let status = dispatcher
            .wait_for_status(id, CampaignStatus::Completed)
            .await
            .unwrap();

        assert_eq!(status, CampaignStatus::Completed);
        let campaign = dispatcher.campaign(id).unwrap();
        assert_eq!(campaign.total_sent, 20);
        assert_eq!(campaign.total_delivered, 20);
        assert_eq!(campaign.total_failed, 0);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 20);

        let stats = dispatcher.stats(id).unwrap();
        assert_eq!(stats.completed, 20);
        assert_eq!(stats.queued, 0);
        assert_eq!(stats.processing, 0);
        assert_eq!(stats.success_rate, 100.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let transport = ScriptedTransport::default().fail_times("voter1@example.org", 2);
        let (dispatcher, transport) = dispatcher(transport);
        let id = dispatcher.create_campaign(new_campaign(3, 600, 3)).unwrap().id;

        dispatcher.start(id).unwrap();
        dispatcher
            .wait_for_status(id, CampaignStatus::Completed)
            .await
            .unwrap();

        let campaign = dispatcher.campaign(id).unwrap();
        assert_eq!(campaign.total_delivered, 3);
        // 3 first attempts + 2 retries
        assert_eq!(transport.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted_and_bounces() {
        let transport = ScriptedTransport::default()
            .fail_times("voter0@example.org", 10)
            .bounce("voter1@example.org");
        let (dispatcher, transport) = dispatcher(transport);
        let id = dispatcher.create_campaign(new_campaign(3, 600, 2)).unwrap().id;

        dispatcher.start(id).unwrap();
        dispatcher
            .wait_for_status(id, CampaignStatus::Completed)
            .await
            .unwrap();

        let campaign = dispatcher.campaign(id).unwrap();
        assert_eq!(campaign.total_sent, 3);
        assert_eq!(campaign.total_delivered, 1);
        assert_eq!(campaign.total_failed, 2);
        // voter0: 1 + 2 retries, voter1: bounced once, voter2: once
        assert_eq!(transport.calls.load(Ordering::SeqCst), 5);

        let entry = dispatcher.entry(id).unwrap();
        let inner = entry.inner.lock();
        assert_eq!(inner.recipients[0].attempts, 3);
        assert_eq!(
            inner.recipients[0].status,
            RecipientStatus::Done(DeliveryOutcome::Failed)
        );
        assert!(inner.recipients[0].last_error.is_some());
        assert_eq!(
            inner.recipients[1].status,
            RecipientStatus::Done(DeliveryOutcome::Bounced)
        );
        assert_eq!(inner.recipients[1].attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_and_start_due() {
        let (dispatcher, _) = dispatcher(ScriptedTransport::default());
        let id = dispatcher.create_campaign(new_campaign(2, 600, 0)).unwrap().id;
        let at = Utc::now() + chrono::Duration::minutes(5);

        let campaign = dispatcher.schedule(id, at).unwrap();
        assert_eq!(campaign.status, CampaignStatus::Scheduled);
        assert_eq!(campaign.scheduled_at, Some(at));

        assert!(dispatcher.start_due(Utc::now()).is_empty());
        assert_eq!(dispatcher.start_due(at), vec![id]);

        let status = dispatcher
            .wait_for_status(id, CampaignStatus::Completed)
            .await
            .unwrap();
        assert_eq!(status, CampaignStatus::Completed);
    }

    #[test]
    fn test_backoff_delay_bounds() {
        let (dispatcher, _) = dispatcher(ScriptedTransport::default());

        for _ in 0..50 {
            let first = dispatcher.backoff_delay(1);
            assert!(first >= Duration::from_millis(375) && first <= Duration::from_millis(625));

            let third = dispatcher.backoff_delay(3);
            assert!(third >= Duration::from_millis(1500) && third <= Duration::from_millis(2500));

            assert!(dispatcher.backoff_delay(40) <= Duration::from_secs(30));
        }
    }
}
