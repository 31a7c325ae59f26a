//! Infrastructure Layer
//!
//! Cross-cutting concerns and infrastructure components.

pub mod health_monitor;
pub mod rate_limiter;
pub mod shutdown;

pub use health_monitor::{HealthGateError, HealthMonitorConfig, StoreHealthMonitor};
pub use rate_limiter::{RateLimitConfig, RateLimitResult, RateLimiter};
pub use shutdown::{shutdown_signal, DeliveryGuard, ShutdownController};
