//! Store Health Monitor
//!
//! Periodically probes the primary store and publishes a health snapshot.
//! Readers clone an `Arc` out of the snapshot slot and never wait on a probe;
//! the prober is the only writer.

use crate::domain::entities::HealthStatus;
use crate::domain::errors::StoreError;
use crate::domain::ports::{HealthMonitor, StoreProbe};
use crate::infrastructure::shutdown::ShutdownController;
use chrono::Utc;
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Health monitor configuration.
#[derive(Debug, Clone)]
pub struct HealthMonitorConfig {
    /// Interval between probes
    pub interval: Duration,
    /// Upper bound on a single probe
    pub timeout: Duration,
    /// Poll interval used by `with_healthy_database`
    pub wait_poll_interval: Duration,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(5),
            wait_poll_interval: Duration::from_secs(1),
        }
    }
}

/// Returned by `with_healthy_database` when the store never became healthy.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HealthGateError {
    #[error("operation blocked by health: database unavailable after waiting {waited:?} ({retry_attempts} failed probes)")]
    BlockedByHealth {
        waited: Duration,
        retry_attempts: u32,
    },
}

type HealthCallback = Arc<dyn Fn(&HealthStatus) + Send + Sync>;

/// Health monitor for the primary store.
pub struct StoreHealthMonitor {
    config: HealthMonitorConfig,
    snapshot: RwLock<Arc<HealthStatus>>,
    /// Callback when health flips
    on_health_change: Option<HealthCallback>,
}

impl StoreHealthMonitor {
    /// Create a monitor. It reports degraded until the first successful probe.
    pub fn new(config: HealthMonitorConfig) -> Self {
        Self {
            config,
            snapshot: RwLock::new(Arc::new(HealthStatus::initial())),
            on_health_change: None,
        }
    }

    /// Set callback for health transitions.
    pub fn on_health_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(&HealthStatus) + Send + Sync + 'static,
    {
        self.on_health_change = Some(Arc::new(callback));
        self
    }

    pub fn config(&self) -> &HealthMonitorConfig {
        &self.config
    }

    /// Current snapshot without cloning the status itself.
    pub fn snapshot(&self) -> Arc<HealthStatus> {
        self.snapshot.read().clone()
    }

    /// Fold a probe result into the published snapshot and return the new state.
    pub fn apply_probe_result(&self, result: Result<(), StoreError>) -> HealthStatus {
        let now = Utc::now();
        let (previous, next) = {
            let mut slot = self.snapshot.write();
            let previous = slot.clone();
            let next = match &result {
                Ok(()) => HealthStatus::after_success(now),
                Err(_) => previous.after_failure(now),
            };
            *slot = Arc::new(next.clone());
            (previous, next)
        };

        match (&result, previous.is_healthy(), next.is_healthy()) {
            (Err(e), true, false) => {
                tracing::warn!(error = %e, "database became unavailable; entering degraded mode")
            }
            (Err(e), _, _) => tracing::debug!(
                error = %e,
                retry_attempts = next.retry_attempts(),
                "database probe failed"
            ),
            (Ok(()), false, true) => tracing::info!(
                after_attempts = previous.retry_attempts(),
                "database connection healthy"
            ),
            _ => {}
        }

        if previous.is_healthy() != next.is_healthy() {
            if let Some(callback) = &self.on_health_change {
                callback(&next);
            }
        }

        next
    }

    /// Run one probe, bounded by the configured timeout, and publish the result.
    pub async fn check_once(&self, probe: &dyn StoreProbe) -> HealthStatus {
        let result = match tokio::time::timeout(self.config.timeout, probe.probe()).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::timeout(format!(
                "probe of {} exceeded {:?}",
                probe.target(),
                self.config.timeout
            ))),
        };
        self.apply_probe_result(result)
    }

    /// Start the probe loop. It stops when `shutdown` fires.
    #[cfg_attr(coverage_nightly, coverage(off))]
    pub fn start(
        self: &Arc<Self>,
        probe: Arc<dyn StoreProbe>,
        shutdown: ShutdownController,
    ) -> JoinHandle<()> {
        let monitor = self.clone();
        tracing::info!(probe = %probe.target(), interval = ?monitor.config.interval, "starting database health monitor");

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(monitor.config.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        monitor.check_once(probe.as_ref()).await;
                    }
                    _ = shutdown.cancelled() => {
                        tracing::debug!("health monitor stopped");
                        break;
                    }
                }
            }
        })
    }

    /// Wait (polling, not spinning) for the store to become healthy, then run
    /// `action`. Meant for batch utilities, never for request handling.
    pub async fn with_healthy_database<F, Fut, T>(
        &self,
        timeout: Duration,
        action: F,
    ) -> Result<T, HealthGateError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let started = Instant::now();
        let deadline = started + timeout;

        loop {
            if self.is_available() {
                return Ok(action().await);
            }

            let now = Instant::now();
            if now >= deadline {
                let retry_attempts = self.snapshot().retry_attempts();
                tracing::warn!(waited = ?timeout, retry_attempts, "operation blocked: database never became healthy");
                return Err(HealthGateError::BlockedByHealth {
                    waited: now - started,
                    retry_attempts,
                });
            }

            let pause = self.config.wait_poll_interval.min(deadline - now);
            tokio::time::sleep(pause).await;
        }
    }
}

impl HealthMonitor for StoreHealthMonitor {
    fn is_available(&self) -> bool {
        self.snapshot.read().is_healthy()
    }

    fn status(&self) -> HealthStatus {
        self.snapshot.read().as_ref().clone()
    }
}
