//! Health Monitor Port
//!
//! Read-only view of primary-store connectivity consumed by every guard.

use crate::domain::entities::HealthStatus;

/// Source of truth for whether the primary store is reachable.
///
/// Guards take this as `Arc<dyn HealthMonitor>` so each one can be exercised
/// against a monitor driven by the test. Both calls must return without
/// waiting on the prober.
pub trait HealthMonitor: Send + Sync {
    /// Whether the store is currently healthy.
    fn is_available(&self) -> bool;

    /// The last published health snapshot.
    fn status(&self) -> HealthStatus;
}
