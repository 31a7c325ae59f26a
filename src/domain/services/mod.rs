pub mod credential_gate;
pub mod credential_registry;
pub mod error_reclassifier;
pub mod strict_health_gate;
pub mod write_guard;

pub use credential_gate::{CredentialGate, CredentialPolicy, GateDecision};
pub use credential_registry::{
    keys, CredentialRegistry, CriticalServiceStatus, KeyCheckReport, NotificationSummary,
};
pub use error_reclassifier::{ErrorReclassifier, Reclassification};
pub use strict_health_gate::StrictHealthGate;
pub use write_guard::{GuardPaths, TelemetryAck, WriteDecision, WriteGuard};
