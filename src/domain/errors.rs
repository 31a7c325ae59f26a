//! Error value objects
//!
//! Structured, machine-parseable bodies returned by the guards, plus the
//! tagged store error raised by the data-access layer.

use crate::domain::entities::HealthStatus;
use crate::domain::value_objects::{ConnectivityKind, HealthMode};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

/// Stable `error` field of a degraded-mode response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedReason {
    ServiceUnavailable,
    DatabaseUnavailable,
}

/// Body of every health-related 503.
///
/// Which optional fields are present depends on the producer: the write
/// guard sets `allowed_operations`/`retry_after`, the reclassifier sets
/// `path`/`method`, the strict gate sets `path`/`health_status` and omits `mode`.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct DegradedModeError {
    pub error: DegradedReason,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<HealthMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_operations: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_status: Option<HealthStatus>,
}

impl DegradedModeError {
    /// Write refused while the store is degraded.
    pub fn writes_disabled(allowed_operations: Vec<String>, retry_after_secs: u64) -> Self {
        Self {
            error: DegradedReason::ServiceUnavailable,
            message: "Database is currently unavailable. The system is running in degraded \
                      mode and write operations are disabled for system safety."
                .to_string(),
            mode: Some(HealthMode::Degraded),
            allowed_operations: Some(allowed_operations),
            retry_after: Some(retry_after_secs),
            path: None,
            method: None,
            health_status: None,
        }
    }

    /// Connectivity failure raised by a route while the store is degraded.
    pub fn connection_lost(path: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            error: DegradedReason::ServiceUnavailable,
            message: "Database connection lost. System is in degraded mode.".to_string(),
            mode: Some(HealthMode::Degraded),
            allowed_operations: None,
            retry_after: None,
            path: Some(path.into()),
            method: Some(method.into()),
            health_status: None,
        }
    }

    /// Operation that must only run against a fully healthy store.
    pub fn database_required(path: impl Into<String>, health_status: HealthStatus) -> Self {
        Self {
            error: DegradedReason::DatabaseUnavailable,
            message: "This operation requires a healthy database connection".to_string(),
            mode: None,
            allowed_operations: None,
            retry_after: None,
            path: Some(path.into()),
            method: None,
            health_status: Some(health_status),
        }
    }
}

/// Stable `reason` field of a credential rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialFailureReason {
    MissingApiKey,
}

/// Missing credential as reported by the registry. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct MissingCredentialError {
    pub service: String,
    pub reason: CredentialFailureReason,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup_url: Option<String>,
    pub status: u16,
}

/// Missing-credential error augmented with the request it rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingCredentialsResponse {
    #[serde(flatten)]
    pub error: MissingCredentialError,
    pub path: String,
    pub method: String,
    pub missing_keys: Vec<String>,
    pub timestamp: String,
}

/// Rejection of an any-of-N gate where none of the alternatives is configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoAlternativeResponse {
    pub service: String,
    pub reason: CredentialFailureReason,
    pub message: String,
    pub path: String,
    pub method: String,
    pub available_services: Vec<String>,
    pub required_services: Vec<String>,
    pub timestamp: String,
}

/// Body sent by a credential gate that refused a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CredentialRejection {
    Missing(MissingCredentialsResponse),
    NoAlternative(NoAlternativeResponse),
}

/// Failure raised by the data-access layer, classified where it is raised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("store error ({kind}): {message}")]
pub struct StoreError {
    pub kind: ConnectivityKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: ConnectivityKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn connection_refused(message: impl Into<String>) -> Self {
        Self::new(ConnectivityKind::ConnectionRefused, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ConnectivityKind::Timeout, message)
    }

    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(ConnectivityKind::Generic, message)
    }

    pub fn is_connectivity_failure(&self) -> bool {
        self.kind.is_connectivity_failure()
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::new(ConnectivityKind::from_io_error(&err), err.to_string())
    }
}

/// ISO-8601 timestamp as placed in response bodies.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_writes_disabled_shape() {
        let err = DegradedModeError::writes_disabled(vec!["GET requests".to_string()], 30);
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["error"], "service_unavailable");
        assert_eq!(json["mode"], "degraded");
        assert_eq!(json["retryAfter"], 30);
        assert_eq!(json["allowedOperations"][0], "GET requests");
        assert!(json.get("path").is_none());
        assert!(err.message.contains("write operations are disabled for system safety."));
    }

    #[test]
    fn test_connection_lost_shape() {
        let json = serde_json::to_value(DegradedModeError::connection_lost("/api/x", "POST")).unwrap();
        assert_eq!(json["message"], "Database connection lost. System is in degraded mode.");
        assert_eq!(json["path"], "/api/x");
        assert_eq!(json["method"], "POST");
        assert!(json.get("retryAfter").is_none());
    }

    #[test]
    fn test_database_required_shape() {
        let json =
            serde_json::to_value(DegradedModeError::database_required("/bulk", HealthStatus::initial()))
                .unwrap();
        assert_eq!(json["error"], "database_unavailable");
        assert_eq!(json["healthStatus"]["isHealthy"], false);
        assert!(json.get("mode").is_none());
    }

    #[test]
    fn test_missing_credentials_response_flattens() {
        let response = MissingCredentialsResponse {
            error: MissingCredentialError {
                service: "OpenFEC".to_string(),
                reason: CredentialFailureReason::MissingApiKey,
                message: "missing".to_string(),
                setup_url: None,
                status: 503,
            },
            path: "/p".to_string(),
            method: "GET".to_string(),
            missing_keys: vec!["FEC_API_KEY".to_string()],
            timestamp: iso_timestamp(Utc::now()),
        };
        let json = serde_json::to_value(CredentialRejection::Missing(response)).unwrap();
        assert_eq!(json["service"], "OpenFEC");
        assert_eq!(json["reason"], "missing_api_key");
        assert_eq!(json["status"], 503);
        assert_eq!(json["missingKeys"][0], "FEC_API_KEY");
        assert!(json.get("setupUrl").is_none());
    }

    #[test]
    fn test_store_error_from_io() {
        let err: StoreError = std::io::Error::from(std::io::ErrorKind::ConnectionRefused).into();
        assert!(err.is_connectivity_failure());
        assert!(!StoreError::generic("unique violation").is_connectivity_failure());
    }
}
