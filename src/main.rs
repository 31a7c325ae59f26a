//! election-guard - dependency health guard service
//!
//! This is the composition root that wires together all the components.

use anyhow::Context;
use election_guard::adapters::inbound::{ApiServer, AppState};
use election_guard::adapters::outbound::{
    EnvCredentialSource, HttpStoreProbe, LogTransport, TcpStoreProbe, WebhookTransport,
};
use election_guard::application::NotificationDispatcher;
use election_guard::config::{load_config, ProbeKind};
use election_guard::domain::ports::{DeliveryTransport, StoreProbe};
use election_guard::domain::services::CredentialRegistry;
use election_guard::infrastructure::{shutdown_signal, ShutdownController, StoreHealthMonitor};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment
    let cfg = load_config()?;

    // Setup logging
    let log_level = if cfg.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    tracing::info!(
        "starting election-guard listen={} probe={:?}",
        cfg.listen_addr,
        cfg.probe_kind
    );

    let shutdown = ShutdownController::new();

    // ===== COMPOSITION ROOT =====

    // 1. Outbound adapters
    let probe_timeout = Duration::from_secs(cfg.probe_timeout_secs.max(1));
    let probe: Arc<dyn StoreProbe> = match cfg.probe_kind {
        ProbeKind::Tcp => Arc::new(TcpStoreProbe::new(cfg.store_addr.clone(), probe_timeout)),
        ProbeKind::Http => {
            let url = cfg
                .store_health_url
                .clone()
                .context("store health URL is required for http probes")?;
            Arc::new(HttpStoreProbe::new(url, probe_timeout)?)
        }
    };

    let transport: Arc<dyn DeliveryTransport> = match &cfg.delivery_webhook_url {
        Some(url) => {
            tracing::info!("delivering notifications via webhook {}", url);
            Arc::new(WebhookTransport::new(url.clone(), WEBHOOK_TIMEOUT)?)
        }
        None => {
            tracing::warn!("no delivery webhook configured; notifications are only logged");
            Arc::new(LogTransport::new())
        }
    };

    // 2. Store health monitor
    let monitor = Arc::new(
        StoreHealthMonitor::new(cfg.health_monitor_config()).on_health_change(|status| {
            tracing::info!(mode = %status.mode(), retry_attempts = status.retry_attempts(), "store health changed");
        }),
    );
    let prober = monitor.start(probe, shutdown.clone());

    // 3. Credential registry
    let registry = Arc::new(CredentialRegistry::with_defaults(Arc::new(
        EnvCredentialSource::new(),
    )));
    let report = registry.check_all_keys();
    if !report.all_required {
        let keys: Vec<&str> = report.critical.iter().map(|r| r.key.as_str()).collect();
        tracing::warn!(?keys, "required credentials missing; dependent routes will refuse requests");
    }
    let summary = registry.get_notification_summary();
    if summary.show {
        tracing::warn!("{}", summary.message);
    }

    // 4. Notification dispatcher
    let dispatcher = NotificationDispatcher::new(transport, cfg.dispatch_config(), shutdown.clone());
    let scheduler = dispatcher.start_scheduler();

    // 5. Inbound adapter
    let state = AppState::new(
        monitor.clone(),
        registry,
        dispatcher,
        cfg.guard_paths(),
        cfg.retry_after_secs,
    );
    let server = ApiServer::new(cfg.listen_addr.clone(), state);

    tokio::spawn(shutdown_signal(shutdown.clone()));
    let served = server.run(shutdown.clone()).await;

    // Stop background tasks even if the server failed
    shutdown.shutdown();
    if !shutdown.wait_for_drain(DRAIN_TIMEOUT).await {
        tracing::warn!("exiting with deliveries still in flight");
    }
    let _ = prober.await;
    let _ = scheduler.await;

    tracing::info!("shutdown complete");
    served
}
