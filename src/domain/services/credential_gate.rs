//! Credential Gate
//!
//! Immutable per-route policies over the credential registry, built once at
//! router construction and evaluated on every request.

use crate::domain::errors::{
    iso_timestamp, CredentialFailureReason, CredentialRejection, MissingCredentialsResponse,
    NoAlternativeResponse,
};
use crate::domain::services::credential_registry::CredentialRegistry;
use chrono::Utc;

/// Which credentials a route depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialPolicy {
    /// Every key must be present. When `optional`, absence is only logged.
    AllOf { keys: Vec<String>, optional: bool },
    /// At least one of several interchangeable keys must be present.
    AnyOf {
        keys: Vec<String>,
        service_label: String,
        alternative_labels: Vec<String>,
    },
}

/// Result of evaluating a gate against the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    Continue,
    Reject(CredentialRejection),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialGate {
    policy: CredentialPolicy,
}

impl CredentialGate {
    /// Gate requiring all `keys`; with `optional` set it never blocks.
    pub fn require_credentials<I, S>(keys: I, optional: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            policy: CredentialPolicy::AllOf {
                keys: keys.into_iter().map(Into::into).collect(),
                optional,
            },
        }
    }

    /// Gate satisfied by any one of `keys`.
    pub fn require_any_of<I, S, L, A>(keys: I, service_label: impl Into<String>, alternative_labels: L) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        L: IntoIterator<Item = A>,
        A: Into<String>,
    {
        Self {
            policy: CredentialPolicy::AnyOf {
                keys: keys.into_iter().map(Into::into).collect(),
                service_label: service_label.into(),
                alternative_labels: alternative_labels.into_iter().map(Into::into).collect(),
            },
        }
    }

    pub fn policy(&self) -> &CredentialPolicy {
        &self.policy
    }

    pub fn evaluate(&self, registry: &CredentialRegistry, method: &str, path: &str) -> GateDecision {
        match &self.policy {
            CredentialPolicy::AllOf { keys, optional } => {
                Self::evaluate_all_of(registry, keys, *optional, method, path)
            }
            CredentialPolicy::AnyOf {
                keys,
                service_label,
                alternative_labels,
            } => Self::evaluate_any_of(registry, keys, service_label, alternative_labels, method, path),
        }
    }

    fn evaluate_all_of(
        registry: &CredentialRegistry,
        keys: &[String],
        optional: bool,
        method: &str,
        path: &str,
    ) -> GateDecision {
        let missing: Vec<String> = keys
            .iter()
            .filter(|k| !registry.is_key_available(k))
            .cloned()
            .collect();

        let Some(first) = missing.first() else {
            return GateDecision::Continue;
        };

        if optional {
            tracing::warn!(
                path,
                missing = %missing.join(", "),
                "optional credentials missing; continuing with reduced functionality"
            );
            return GateDecision::Continue;
        }

        let mut error = registry.generate_missing_key_error(first);
        let others = missing.len() - 1;
        if others > 0 {
            error.message = format!(
                "{} ({} other required key{} also missing)",
                error.message,
                others,
                if others == 1 { "" } else { "s" }
            );
        }

        tracing::warn!(
            service = %error.service,
            method,
            path,
            missing = %missing.join(", "),
            "request rejected: required credentials missing"
        );

        GateDecision::Reject(CredentialRejection::Missing(MissingCredentialsResponse {
            error,
            path: path.to_string(),
            method: method.to_string(),
            missing_keys: missing,
            timestamp: iso_timestamp(Utc::now()),
        }))
    }

    fn evaluate_any_of(
        registry: &CredentialRegistry,
        keys: &[String],
        service_label: &str,
        alternative_labels: &[String],
        method: &str,
        path: &str,
    ) -> GateDecision {
        let available = keys.iter().filter(|k| registry.is_key_available(k)).count();
        if available > 0 {
            tracing::debug!(service = service_label, available, total = keys.len(), "credential gate satisfied");
            return GateDecision::Continue;
        }

        tracing::warn!(
            service = service_label,
            method,
            path,
            "request rejected: no alternative credential configured"
        );

        GateDecision::Reject(CredentialRejection::NoAlternative(NoAlternativeResponse {
            service: service_label.to_string(),
            reason: CredentialFailureReason::MissingApiKey,
            message: format!("At least one of: {} is required", alternative_labels.join(", ")),
            path: path.to_string(),
            method: method.to_string(),
            available_services: Vec::new(),
            required_services: alternative_labels.to_vec(),
            timestamp: iso_timestamp(Utc::now()),
        }))
    }
}
