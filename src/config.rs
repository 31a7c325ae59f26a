use crate::application::DispatchConfig;
use crate::domain::services::GuardPaths;
use crate::infrastructure::HealthMonitorConfig;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

/// How the primary store is probed.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    /// TCP connect to `store_addr`
    Tcp,
    /// HTTP GET against `store_health_url`, 2xx is healthy
    Http,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    // HTTP server
    pub listen_addr: String,
    pub debug: bool,

    // Store health probing
    pub probe_kind: ProbeKind,
    pub store_addr: String,
    pub store_health_url: Option<String>,
    pub probe_interval_secs: u64,
    pub probe_timeout_secs: u64,

    // Request pipeline
    pub telemetry_path: String,
    pub health_path: String,
    pub retry_after_secs: u64,

    // Notification dispatch
    pub dispatch_concurrency: usize,
    pub retry_backoff_base_ms: u64,
    pub retry_backoff_max_ms: u64,
    pub scheduler_interval_secs: u64,
    pub delivery_webhook_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            debug: false,
            probe_kind: ProbeKind::Tcp,
            store_addr: "127.0.0.1:5432".to_string(),
            store_health_url: None,
            probe_interval_secs: 10,
            probe_timeout_secs: 5,
            telemetry_path: "/api/telemetry".to_string(),
            health_path: "/health".to_string(),
            retry_after_secs: 30,
            dispatch_concurrency: 10,
            retry_backoff_base_ms: 500,
            retry_backoff_max_ms: 30_000,
            scheduler_interval_secs: 15,
            delivery_webhook_url: None,
        }
    }
}

impl Config {
    pub fn health_monitor_config(&self) -> HealthMonitorConfig {
        HealthMonitorConfig {
            interval: Duration::from_secs(self.probe_interval_secs.max(1)),
            timeout: Duration::from_secs(self.probe_timeout_secs.max(1)),
            ..HealthMonitorConfig::default()
        }
    }

    pub fn guard_paths(&self) -> GuardPaths {
        GuardPaths {
            telemetry_path: self.telemetry_path.clone(),
            health_path: self.health_path.clone(),
        }
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            concurrency: self.dispatch_concurrency.max(1),
            backoff_base: Duration::from_millis(self.retry_backoff_base_ms),
            backoff_max: Duration::from_millis(self.retry_backoff_max_ms),
            scheduler_interval: Duration::from_secs(self.scheduler_interval_secs.max(1)),
        }
    }
}

/// Numeric setting from the environment; unset or unparsable values use the default.
fn env_number<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub fn load_config() -> anyhow::Result<Config> {
    let defaults = Config::default();

    let listen_addr = env_string("ELECTION_GUARD_LISTEN_ADDR", &defaults.listen_addr);
    let debug = std::env::var("DEBUG").is_ok();

    let probe_kind = match std::env::var("ELECTION_GUARD_PROBE_KIND")
        .map(|v| v.to_lowercase())
        .as_deref()
    {
        Err(_) | Ok("tcp") => ProbeKind::Tcp,
        Ok("http") => ProbeKind::Http,
        Ok(other) => anyhow::bail!("unknown ELECTION_GUARD_PROBE_KIND: {} (expected tcp or http)", other),
    };

    let store_addr = env_string("ELECTION_GUARD_STORE_ADDR", &defaults.store_addr);
    let store_health_url = env_optional("ELECTION_GUARD_STORE_HEALTH_URL");
    if probe_kind == ProbeKind::Http && store_health_url.is_none() {
        anyhow::bail!("ELECTION_GUARD_STORE_HEALTH_URL is required when the probe kind is http");
    }

    let probe_interval_secs =
        env_number("ELECTION_GUARD_PROBE_INTERVAL_SECS", defaults.probe_interval_secs);
    let probe_timeout_secs =
        env_number("ELECTION_GUARD_PROBE_TIMEOUT_SECS", defaults.probe_timeout_secs);

    let telemetry_path = env_string("ELECTION_GUARD_TELEMETRY_PATH", &defaults.telemetry_path);
    let health_path = env_string("ELECTION_GUARD_HEALTH_PATH", &defaults.health_path);
    let retry_after_secs = env_number("ELECTION_GUARD_RETRY_AFTER_SECS", defaults.retry_after_secs);

    let dispatch_concurrency =
        env_number("ELECTION_GUARD_DISPATCH_CONCURRENCY", defaults.dispatch_concurrency);
    let retry_backoff_base_ms =
        env_number("ELECTION_GUARD_RETRY_BACKOFF_BASE_MS", defaults.retry_backoff_base_ms);
    let retry_backoff_max_ms =
        env_number("ELECTION_GUARD_RETRY_BACKOFF_MAX_MS", defaults.retry_backoff_max_ms);
    let scheduler_interval_secs =
        env_number("ELECTION_GUARD_SCHEDULER_INTERVAL_SECS", defaults.scheduler_interval_secs);
    let delivery_webhook_url = env_optional("ELECTION_GUARD_DELIVERY_WEBHOOK_URL");

    Ok(Config {
        listen_addr,
        debug,
        probe_kind,
        store_addr,
        store_health_url,
        probe_interval_secs,
        probe_timeout_secs,
        telemetry_path,
        health_path,
        retry_after_secs,
        dispatch_concurrency,
        retry_backoff_base_ms,
        retry_backoff_max_ms,
        scheduler_interval_secs,
        delivery_webhook_url,
    })
}
