//! Credential Registry
//!
//! Process-wide table of external credentials. Definitions are registered at
//! bootstrap; availability is re-evaluated against the credential source on
//! every check, so a key set after startup is picked up without a restart.

use crate::domain::entities::{CredentialDefinition, CredentialRecord};
use crate::domain::errors::{CredentialFailureReason, MissingCredentialError};
use crate::domain::ports::CredentialSource;
use serde::Serialize;
use std::sync::Arc;

/// Environment variable names of the default catalog.
pub mod keys {
    pub const GOOGLE_CIVIC: &str = "GOOGLE_CIVIC_API_KEY";
    pub const BALLOTPEDIA: &str = "BALLOTPEDIA_API_KEY";
    pub const OPEN_STATES: &str = "OPENSTATES_API_KEY";
    pub const OPEN_FEC: &str = "FEC_API_KEY";
    pub const GEOCODIO: &str = "GEOCODIO_API_KEY";
    pub const SENDGRID: &str = "SENDGRID_API_KEY";
    pub const TWILIO: &str = "TWILIO_AUTH_TOKEN";
}

/// Result of checking every registered credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyCheckReport {
    /// Every required credential is available
    pub all_required: bool,
    /// Missing required credentials
    pub critical: Vec<CredentialRecord>,
    /// All missing credentials, required and optional
    pub missing: Vec<CredentialRecord>,
}

/// Banner data for the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSummary {
    pub show: bool,
    pub critical: usize,
    pub optional: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CriticalServiceStatus {
    pub healthy: bool,
    pub critical: usize,
    pub optional: usize,
    pub summary: String,
}

pub struct CredentialRegistry {
    definitions: Vec<CredentialDefinition>,
    source: Arc<dyn CredentialSource>,
}

impl CredentialRegistry {
    /// Empty registry reading from `source`.
    pub fn new(source: Arc<dyn CredentialSource>) -> Self {
        Self {
            definitions: Vec::new(),
            source,
        }
    }

    /// Registry preloaded with the election application's providers.
    pub fn with_defaults(source: Arc<dyn CredentialSource>) -> Self {
        let mut registry = Self::new(source);
        for definition in default_catalog() {
            registry.register(definition);
        }
        registry
    }

    /// Register a credential. Re-registering a key replaces the definition.
    pub fn register(&mut self, definition: CredentialDefinition) {
        match self.definitions.iter_mut().find(|d| d.key == definition.key) {
            Some(existing) => *existing = definition,
            None => self.definitions.push(definition),
        }
    }

    pub fn definition(&self, key: &str) -> Option<&CredentialDefinition> {
        self.definitions.iter().find(|d| d.key == key)
    }

    /// Whether `key` is registered and currently set. Unknown keys are unavailable.
    pub fn is_key_available(&self, key: &str) -> bool {
        self.definition(key).is_some() && self.source.is_set(key)
    }

    /// Current record for every registered credential, in registration order.
    pub fn records(&self) -> Vec<CredentialRecord> {
        self.definitions
            .iter()
            .map(|d| d.record(self.source.is_set(&d.key)))
            .collect()
    }

    /// Build the error reported when `key` is missing.
    pub fn generate_missing_key_error(&self, key: &str) -> MissingCredentialError {
        match self.definition(key) {
            Some(def) => MissingCredentialError {
                service: def.service_name.clone(),
                reason: CredentialFailureReason::MissingApiKey,
                message: format!(
                    "{} API key ({}) is not configured. Required for: {}.",
                    def.service_name, def.key, def.purpose
                ),
                setup_url: def.setup_url.clone(),
                status: 503,
            },
            None => MissingCredentialError {
                service: key.to_string(),
                reason: CredentialFailureReason::MissingApiKey,
                message: format!("{} is not configured.", key),
                setup_url: None,
                status: 503,
            },
        }
    }

    pub fn check_all_keys(&self) -> KeyCheckReport {
        let missing: Vec<CredentialRecord> =
            self.records().into_iter().filter(|r| !r.is_available).collect();
        let critical: Vec<CredentialRecord> =
            missing.iter().filter(|r| r.required).cloned().collect();
        KeyCheckReport {
            all_required: critical.is_empty(),
            critical,
            missing,
        }
    }

    pub fn get_notification_summary(&self) -> NotificationSummary {
        let report = self.check_all_keys();
        let critical = report.critical.len();
        let optional = report.missing.len() - critical;

        let message = if critical > 0 {
            let names: Vec<&str> = report
                .critical
                .iter()
                .map(|r| r.service_name.as_str())
                .collect();
            format!(
                "{} critical service{} not configured: {}. Dependent features are unavailable.",
                critical,
                plural(critical),
                names.join(", ")
            )
        } else if optional > 0 {
            let names: Vec<&str> = report
                .missing
                .iter()
                .map(|r| r.service_name.as_str())
                .collect();
            format!(
                "{} optional service{} not configured: {}. Some data may be incomplete.",
                optional,
                plural(optional),
                names.join(", ")
            )
        } else {
            "All external services are configured.".to_string()
        };

        NotificationSummary {
            show: critical + optional > 0,
            critical,
            optional,
            message,
        }
    }

    pub fn get_critical_service_status(&self) -> CriticalServiceStatus {
        let report = self.check_all_keys();
        let summary = self.get_notification_summary();
        CriticalServiceStatus {
            healthy: report.all_required,
            critical: report.critical.len(),
            optional: report.missing.len() - report.critical.len(),
            summary: summary.message,
        }
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

fn default_catalog() -> Vec<CredentialDefinition> {
    vec![
        CredentialDefinition::new(
            keys::GOOGLE_CIVIC,
            "Google Civic Information",
            "election, polling place and representative lookups",
            true,
        )
        .with_setup_url("https://console.cloud.google.com/apis/library/civicinfo.googleapis.com"),
        CredentialDefinition::new(
            keys::BALLOTPEDIA,
            "Ballotpedia",
            "candidate profiles and ballot measures",
            false,
        )
        .with_setup_url("https://ballotpedia.org/API-documentation"),
        CredentialDefinition::new(
            keys::OPEN_STATES,
            "Open States",
            "state legislative bills and votes",
            false,
        )
        .with_setup_url("https://open.pluralpolicy.com/accounts/profile/"),
        CredentialDefinition::new(
            keys::OPEN_FEC,
            "OpenFEC",
            "campaign finance filings for candidate comparison",
            false,
        )
        .with_setup_url("https://api.open.fec.gov/developers/"),
        CredentialDefinition::new(
            keys::GEOCODIO,
            "Geocodio",
            "address to district matching",
            false,
        )
        .with_setup_url("https://dash.geocod.io/apikey"),
        CredentialDefinition::new(
            keys::SENDGRID,
            "SendGrid",
            "email notification delivery",
            false,
        )
        .with_setup_url("https://app.sendgrid.com/settings/api_keys"),
        CredentialDefinition::new(keys::TWILIO, "Twilio", "SMS notification delivery", false)
            .with_setup_url("https://console.twilio.com/"),
    ]
}
