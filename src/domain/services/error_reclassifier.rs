//! Degraded-Error Reclassifier
//!
//! Turns connectivity failures raised by route logic into the degraded-mode
//! response, but only when the health monitor independently confirms the
//! store is down. Classification reads the structured tag attached where the
//! error was raised; message text is never inspected.

use crate::domain::errors::DegradedModeError;
use crate::domain::ports::HealthMonitor;
use crate::domain::value_objects::ConnectivityKind;
use std::sync::Arc;

/// What to do with a route failure.
#[derive(Debug, Clone, PartialEq)]
pub enum Reclassification {
    /// Pass the original error on unchanged
    Forward,
    /// Replace it with a 503 degraded-mode response
    Degraded(DegradedModeError),
}

pub struct ErrorReclassifier {
    monitor: Arc<dyn HealthMonitor>,
}

impl ErrorReclassifier {
    pub fn new(monitor: Arc<dyn HealthMonitor>) -> Self {
        Self { monitor }
    }

    /// Classify a failure by its tag. `None` means no error, or an error
    /// that carries no classification, and is always forwarded.
    pub fn classify(
        &self,
        kind: Option<ConnectivityKind>,
        method: &str,
        path: &str,
    ) -> Reclassification {
        let Some(kind) = kind else {
            return Reclassification::Forward;
        };

        if !kind.is_connectivity_failure() {
            return Reclassification::Forward;
        }

        // A connectivity error while the monitor reports healthy is passed
        // through as an ordinary failure (see DESIGN.md, open question).
        if self.monitor.is_available() {
            tracing::debug!(%kind, method, path, "connectivity error while store reports healthy");
            return Reclassification::Forward;
        }

        tracing::warn!(%kind, method, path, "connectivity error reclassified as degraded mode");
        Reclassification::Degraded(DegradedModeError::connection_lost(path, method))
    }
}
