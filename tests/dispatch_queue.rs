//! Integration tests for the notification dispatch queue.
//!
//! All tests run on a paused tokio clock, so per-minute rate limits and
//! retry backoff are exercised without real waiting.

use async_trait::async_trait;
use dashmap::DashMap;
use election_guard::application::{DispatchConfig, NewCampaign, NotificationDispatcher};
use election_guard::domain::entities::Recipient;
use election_guard::domain::ports::{Delivery, DeliveryError, DeliveryTransport};
use election_guard::domain::value_objects::CampaignStatus;
use election_guard::infrastructure::ShutdownController;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Transport that records every attempt and can fail first attempts.
#[derive(Default)]
struct RecordingTransport {
    latency: Duration,
    /// Transient failures to return per address before succeeding
    fail_first: u32,
    attempts: DashMap<String, u32>,
    in_flight_per_address: DashMap<String, usize>,
    overlapping: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingTransport {
    fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    fn total_attempts(&self) -> u32 {
        self.attempts.iter().map(|e| *e.value()).sum()
    }
}

#[async_trait]
impl DeliveryTransport for RecordingTransport {
    async fn deliver(&self, delivery: Delivery<'_>) -> Result<(), DeliveryError> {
        let address = delivery.recipient.address.clone();
        let attempt = {
            let mut entry = self.attempts.entry(address.clone()).or_insert(0);
            *entry += 1;
            *entry
        };

        {
            let mut per_address = self.in_flight_per_address.entry(address.clone()).or_insert(0);
            *per_address += 1;
            if *per_address > 1 {
                self.overlapping.fetch_add(1, Ordering::SeqCst);
            }
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if let Some(mut per_address) = self.in_flight_per_address.get_mut(&address) {
            *per_address -= 1;
        }

        if attempt <= self.fail_first {
            Err(DeliveryError::Transient("provider returned 503".into()))
        } else {
            Ok(())
        }
    }
}

fn campaign(recipients: usize, rate_limit: u32, retry_attempts: u32) -> NewCampaign {
    NewCampaign {
        name: "general election reminder".to_string(),
        rate_limit,
        retry_attempts,
        recipients: (0..recipients)
            .map(|i| Recipient::email(format!("voter{}@example.org", i)))
            .collect(),
    }
}

fn dispatcher(
    transport: Arc<RecordingTransport>,
    config: DispatchConfig,
) -> NotificationDispatcher {
    NotificationDispatcher::new(transport, config, ShutdownController::new())
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_campaign_completes_with_consistent_totals() {
    let transport = Arc::new(RecordingTransport::default());
    let dispatcher = dispatcher(transport.clone(), DispatchConfig::default());
    let id = dispatcher.create_campaign(campaign(250, 100, 2)).unwrap().id;

    // Sample totals while the campaign runs
    let sampler = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            let mut samples = 0;
            loop {
                let view = dispatcher.campaign(id).unwrap();
                assert_eq!(view.total_sent, view.total_delivered + view.total_failed);
                assert!(view.total_sent <= view.estimated_recipients);
                if view.status.is_terminal() {
                    assert_eq!(view.total_sent, 250);
                    return samples;
                }
                samples += 1;
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        })
    };

    let started = Instant::now();
    dispatcher.start(id).unwrap();
    let status = dispatcher
        .wait_for_status(id, CampaignStatus::Completed)
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(status, CampaignStatus::Completed);
    // One delivery every 600ms: the 250th goes out just before 150s
    assert!(elapsed >= Duration::from_secs(120), "finished in {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(160), "finished in {:?}", elapsed);

    let view = dispatcher.campaign(id).unwrap();
    assert_eq!(view.total_sent, 250);
    assert_eq!(view.total_delivered, 250);
    assert_eq!(view.total_failed, 0);
    assert_eq!(transport.total_attempts(), 250);

    let samples = sampler.await.unwrap();
    assert!(samples > 100);

    let stats = dispatcher.stats(id).unwrap();
    assert_eq!(stats.completed, 250);
    assert_eq!(stats.queued + stats.processing + stats.failed, 0);
}

#[tokio::test(start_paused = true)]
async fn test_no_minute_exceeds_campaign_rate_limit() {
    let transport = Arc::new(RecordingTransport::default());
    let dispatcher = dispatcher(transport.clone(), DispatchConfig::default());
    let id = dispatcher.create_campaign(campaign(250, 100, 0)).unwrap().id;

    let started = Instant::now();
    dispatcher.start(id).unwrap();

    tokio::time::sleep(Duration::from_secs(59)).await;
    let first_minute = dispatcher.campaign(id).unwrap().total_sent;
    assert!(first_minute <= 100, "sent {} in the first minute", first_minute);
    assert!(first_minute >= 90, "sent {} in the first minute", first_minute);

    tokio::time::sleep_until(started + Duration::from_secs(119)).await;
    let two_minutes = dispatcher.campaign(id).unwrap().total_sent;
    assert!(two_minutes <= 200, "sent {} in two minutes", two_minutes);
    assert!(two_minutes - first_minute <= 100);

    dispatcher.cancel(id).unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_pause_keeps_outcomes_and_resume_does_not_redeliver() {
    let transport = Arc::new(RecordingTransport::with_latency(Duration::from_millis(200)));
    let dispatcher = dispatcher(transport.clone(), DispatchConfig::default());
    let id = dispatcher.create_campaign(campaign(60, 30, 1)).unwrap().id;

    dispatcher.start(id).unwrap();
    // 30 per minute paces one delivery every 2s
    tokio::time::sleep(Duration::from_secs(10)).await;
    dispatcher.pause(id).unwrap();

    // Let in-flight deliveries finish, then confirm nothing else goes out
    tokio::time::sleep(Duration::from_secs(1)).await;
    let paused = dispatcher.campaign(id).unwrap();
    assert_eq!(paused.status, CampaignStatus::Paused);
    assert!(paused.total_sent >= 4 && paused.total_sent <= 6);
    let attempts_at_pause = transport.total_attempts();

    tokio::time::sleep(Duration::from_secs(120)).await;
    let still_paused = dispatcher.campaign(id).unwrap();
    assert_eq!(still_paused.total_sent, paused.total_sent);
    assert_eq!(transport.total_attempts(), attempts_at_pause);

    dispatcher.resume(id).unwrap();
    let status = dispatcher
        .wait_for_status(id, CampaignStatus::Completed)
        .await
        .unwrap();
    assert_eq!(status, CampaignStatus::Completed);

    let view = dispatcher.campaign(id).unwrap();
    assert_eq!(view.total_delivered, 60);
    // Every recipient was delivered exactly once across the pause
    assert_eq!(transport.attempts.len(), 60);
    assert!(transport.attempts.iter().all(|e| *e.value() == 1));
}

#[tokio::test(start_paused = true)]
async fn test_failed_deliveries_retried_without_overlap() {
    let transport = Arc::new(RecordingTransport {
        latency: Duration::from_millis(50),
        fail_first: 2,
        ..RecordingTransport::default()
    });
    let dispatcher = dispatcher(transport.clone(), DispatchConfig::default());
    let id = dispatcher.create_campaign(campaign(20, 600, 3)).unwrap().id;

    dispatcher.start(id).unwrap();
    dispatcher
        .wait_for_status(id, CampaignStatus::Completed)
        .await
        .unwrap();

    let view = dispatcher.campaign(id).unwrap();
    assert_eq!(view.total_delivered, 20);
    assert_eq!(view.total_failed, 0);
    assert_eq!(transport.total_attempts(), 60);
    assert_eq!(transport.overlapping.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_partial_failure_does_not_fail_campaign() {
    let transport = Arc::new(RecordingTransport {
        fail_first: 5,
        ..RecordingTransport::default()
    });
    let dispatcher = dispatcher(transport.clone(), DispatchConfig::default());
    let id = dispatcher.create_campaign(campaign(10, 600, 1)).unwrap().id;

    dispatcher.start(id).unwrap();
    let status = dispatcher
        .wait_for_status(id, CampaignStatus::Completed)
        .await
        .unwrap();

    assert_eq!(status, CampaignStatus::Completed);
    let view = dispatcher.campaign(id).unwrap();
    assert_eq!(view.total_sent, 10);
    assert_eq!(view.total_failed, 10);
    assert_eq!(transport.total_attempts(), 20);
    assert_eq!(dispatcher.stats(id).unwrap().success_rate, 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_cap() {
    let transport = Arc::new(RecordingTransport::with_latency(Duration::from_secs(1)));
    let config = DispatchConfig {
        concurrency: 3,
        ..DispatchConfig::default()
    };
    let dispatcher = dispatcher(transport.clone(), config);

    let first = dispatcher.create_campaign(campaign(12, 600, 0)).unwrap().id;
    let second = dispatcher.create_campaign(campaign(12, 600, 0)).unwrap().id;
    dispatcher.start(first).unwrap();
    dispatcher.start(second).unwrap();

    dispatcher
        .wait_for_status(first, CampaignStatus::Completed)
        .await
        .unwrap();
    dispatcher
        .wait_for_status(second, CampaignStatus::Completed)
        .await
        .unwrap();

    assert!(transport.max_in_flight.load(Ordering::SeqCst) <= 3);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_dispatch() {
    let transport = Arc::new(RecordingTransport::default());
    let dispatcher = dispatcher(transport.clone(), DispatchConfig::default());
    let id = dispatcher.create_campaign(campaign(50, 10, 0)).unwrap().id;

    dispatcher.start(id).unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    dispatcher.cancel(id).unwrap();

    let status = dispatcher
        .wait_for_status(id, CampaignStatus::Completed)
        .await
        .unwrap();
    assert_eq!(status, CampaignStatus::Cancelled);

    tokio::time::sleep(Duration::from_secs(120)).await;
    let view = dispatcher.campaign(id).unwrap();
    assert_eq!(view.status, CampaignStatus::Cancelled);
    assert!(view.total_sent < 50);
    assert_eq!(transport.total_attempts() as usize, view.total_sent);
}
