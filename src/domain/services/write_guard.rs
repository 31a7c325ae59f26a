//! Write Guard
//!
//! Gates state-mutating requests on store health. The decision is a pure
//! function of `(method, path)` and the current health snapshot.

use crate::domain::errors::DegradedModeError;
use crate::domain::ports::HealthMonitor;
use serde::Serialize;
use std::sync::Arc;

/// Paths exempt from write blocking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardPaths {
    /// Telemetry ingestion: always acknowledged with 202
    pub telemetry_path: String,
    /// Internal health probe: always passed through
    pub health_path: String,
}

impl Default for GuardPaths {
    fn default() -> Self {
        Self {
            telemetry_path: "/api/telemetry".to_string(),
            health_path: "/health".to_string(),
        }
    }
}

/// Acknowledgement sent for telemetry ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryAck {
    pub message: String,
    pub status: &'static str,
    pub db_healthy: bool,
}

/// Outcome of the write guard for a single request.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteDecision {
    /// Hand the request to route logic
    Continue,
    /// Answer 202 with the acknowledgement; route logic is skipped
    AcceptTelemetry(TelemetryAck),
    /// Answer 503; route logic is skipped
    Block(DegradedModeError),
}

/// Request-pipeline stage blocking writes while the store is degraded.
pub struct WriteGuard {
    monitor: Arc<dyn HealthMonitor>,
    paths: GuardPaths,
    retry_after_secs: u64,
}

impl WriteGuard {
    pub fn new(monitor: Arc<dyn HealthMonitor>, paths: GuardPaths, retry_after_secs: u64) -> Self {
        Self {
            monitor,
            paths,
            retry_after_secs,
        }
    }

    pub fn paths(&self) -> &GuardPaths {
        &self.paths
    }

    /// Decide what happens to a request. Method comparison ignores case.
    pub fn check(&self, method: &str, path: &str) -> WriteDecision {
        if method.eq_ignore_ascii_case("GET") || method.eq_ignore_ascii_case("OPTIONS") {
            return WriteDecision::Continue;
        }

        if path == self.paths.telemetry_path {
            return WriteDecision::AcceptTelemetry(self.telemetry_ack());
        }

        if path == self.paths.health_path {
            return WriteDecision::Continue;
        }

        if !self.monitor.is_available() {
            tracing::warn!(method, path, "write blocked: database in degraded mode");
            return WriteDecision::Block(DegradedModeError::writes_disabled(
                self.allowed_operations(),
                self.retry_after_secs,
            ));
        }

        WriteDecision::Continue
    }

    /// Telemetry acknowledgement reflecting current store health.
    pub fn telemetry_ack(&self) -> TelemetryAck {
        TelemetryAck {
            message: "Telemetry accepted for processing".to_string(),
            status: "queued",
            db_healthy: self.monitor.is_available(),
        }
    }

    fn allowed_operations(&self) -> Vec<String> {
        vec![
            "GET requests".to_string(),
            "OPTIONS requests".to_string(),
            format!("{} (202)", self.paths.telemetry_path),
            self.paths.health_path.clone(),
        ]
    }
}
