//! election-guard Library
//!
//! Dependency health guard for the election-tracking service: store health
//! monitoring, degraded-mode request guards, credential gates and the
//! notification dispatch queue. Exposed as a library for the binary and for
//! integration tests.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use adapters::inbound::{with_dependency_guards, ApiError, ApiServer, AppState};
pub use application::{DispatchConfig, DispatchError, NewCampaign, NotificationDispatcher};
pub use config::load_config;
pub use domain::entities::{HealthStatus, NotificationCampaign, QueueStats, Recipient};
pub use domain::errors::{DegradedModeError, StoreError};
pub use domain::ports::{CredentialSource, DeliveryTransport, HealthMonitor, StoreProbe};
pub use domain::services::{
    CredentialGate, CredentialRegistry, ErrorReclassifier, StrictHealthGate, WriteGuard,
};
pub use domain::value_objects::{CampaignStatus, ConnectivityKind};
pub use infrastructure::{ShutdownController, StoreHealthMonitor};
