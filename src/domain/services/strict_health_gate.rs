//! Strict Health Gate
//!
//! Requires a fully healthy store for every method, reads included.

use crate::domain::errors::DegradedModeError;
use crate::domain::ports::HealthMonitor;
use std::sync::Arc;

pub struct StrictHealthGate {
    monitor: Arc<dyn HealthMonitor>,
}

impl StrictHealthGate {
    pub fn new(monitor: Arc<dyn HealthMonitor>) -> Self {
        Self { monitor }
    }

    /// Decision and response body come from one snapshot.
    pub fn check(&self, path: &str) -> Result<(), DegradedModeError> {
        let status = self.monitor.status();
        if status.is_healthy() {
            return Ok(());
        }
        tracing::warn!(path, "operation refused: requires a healthy database");
        Err(DegradedModeError::database_required(path, status))
    }
}
