//! HTTP API Server
//!
//! Hosts the health probe, the telemetry ingestion endpoint, the system
//! status endpoints and the campaign administration API, all behind the
//! write guard and the degraded-error reclassifier.

use super::api_error::ApiError;
use super::guards::{require_credentials, require_healthy_database, with_dependency_guards};
use crate::application::{NewCampaign, NotificationDispatcher};
use crate::domain::entities::{CredentialRecord, HealthStatus, NotificationCampaign, QueueStats};
use crate::domain::ports::HealthMonitor;
use crate::domain::services::{
    keys, CredentialGate, CredentialRegistry, CriticalServiceStatus, ErrorReclassifier,
    GuardPaths, NotificationSummary, StrictHealthGate, WriteGuard,
};
use crate::infrastructure::ShutdownController;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{any, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Health probe response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: HealthStatus,
}

/// System status response.
#[derive(Debug, Serialize)]
pub struct SystemStatusResponse {
    pub services: CriticalServiceStatus,
    pub database: HealthStatus,
}

/// Credential overview for UI banners.
#[derive(Debug, Serialize)]
pub struct CredentialsResponse {
    pub summary: NotificationSummary,
    pub credentials: Vec<CredentialRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    pub scheduled_at: DateTime<Utc>,
}

/// Shared state for all routes.
#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<dyn HealthMonitor>,
    pub registry: Arc<CredentialRegistry>,
    pub dispatcher: NotificationDispatcher,
    pub write_guard: Arc<WriteGuard>,
    pub reclassifier: Arc<ErrorReclassifier>,
    pub strict_gate: Arc<StrictHealthGate>,
}

impl AppState {
    pub fn new(
        monitor: Arc<dyn HealthMonitor>,
        registry: Arc<CredentialRegistry>,
        dispatcher: NotificationDispatcher,
        paths: GuardPaths,
        retry_after_secs: u64,
    ) -> Self {
        Self {
            write_guard: Arc::new(WriteGuard::new(monitor.clone(), paths, retry_after_secs)),
            reclassifier: Arc::new(ErrorReclassifier::new(monitor.clone())),
            strict_gate: Arc::new(StrictHealthGate::new(monitor.clone())),
            monitor,
            registry,
            dispatcher,
        }
    }
}

/// Gate for routes that hand work to a delivery provider.
fn delivery_gate() -> CredentialGate {
    CredentialGate::require_any_of(
        [keys::SENDGRID, keys::TWILIO],
        "Notification delivery",
        ["SendGrid", "Twilio"],
    )
}

/// Build the full router for `state`.
pub fn router(state: AppState) -> Router {
    let paths = state.write_guard.paths().clone();

    let delivery = require_credentials(
        Router::new()
            .route("/api/campaigns/:id/start", post(start_campaign_handler))
            .route("/api/campaigns/:id/resume", post(resume_campaign_handler)),
        delivery_gate(),
        state.registry.clone(),
    );

    let campaigns = require_healthy_database(
        Router::new()
            .route(
                "/api/campaigns",
                get(list_campaigns_handler).post(create_campaign_handler),
            )
            .route("/api/campaigns/:id", get(get_campaign_handler))
            .route("/api/campaigns/:id/stats", get(campaign_stats_handler))
            .route("/api/campaigns/:id/schedule", post(schedule_campaign_handler))
            .route("/api/campaigns/:id/pause", post(pause_campaign_handler))
            .route("/api/campaigns/:id/cancel", post(cancel_campaign_handler))
            .merge(delivery),
        state.strict_gate.clone(),
    );

    let app = Router::new()
        .route(&paths.health_path, get(health_handler))
        .route(&paths.telemetry_path, any(telemetry_handler))
        .route("/api/system/status", get(system_status_handler))
        .route("/api/system/credentials", get(credentials_handler))
        .merge(campaigns);

    with_dependency_guards(app, state.write_guard.clone(), state.reclassifier.clone())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// HTTP API server.
pub struct ApiServer {
    listen_addr: String,
    state: AppState,
}

impl ApiServer {
    pub fn new(listen_addr: String, state: AppState) -> Self {
        Self { listen_addr, state }
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Serve until `shutdown` fires.
    #[cfg_attr(coverage_nightly, coverage(off))]
    pub async fn run(&self, shutdown: ShutdownController) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.listen_addr).await?;
        tracing::info!("API listening on {}", self.listen_addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;
        tracing::info!("API server stopped");
        Ok(())
    }
}

// Handler functions

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let database = state.monitor.status();
    Json(HealthResponse {
        status: if database.is_healthy() { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        database,
    })
}

async fn telemetry_handler(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::ACCEPTED, Json(state.write_guard.telemetry_ack()))
}

async fn system_status_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(SystemStatusResponse {
        services: state.registry.get_critical_service_status(),
        database: state.monitor.status(),
    })
}

async fn credentials_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(CredentialsResponse {
        summary: state.registry.get_notification_summary(),
        credentials: state.registry.records(),
    })
}

async fn list_campaigns_handler(State(state): State<AppState>) -> Json<Vec<NotificationCampaign>> {
    Json(state.dispatcher.list())
}

async fn create_campaign_handler(
    State(state): State<AppState>,
    Json(req): Json<NewCampaign>,
) -> Result<(StatusCode, Json<NotificationCampaign>), ApiError> {
    let campaign = state.dispatcher.create_campaign(req)?;
    Ok((StatusCode::CREATED, Json(campaign)))
}

async fn get_campaign_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<NotificationCampaign>, ApiError> {
    Ok(Json(state.dispatcher.campaign(id)?))
}

async fn campaign_stats_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<QueueStats>, ApiError> {
    Ok(Json(state.dispatcher.stats(id)?))
}

async fn schedule_campaign_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ScheduleRequest>,
) -> Result<Json<NotificationCampaign>, ApiError> {
    if req.scheduled_at <= Utc::now() {
        return Err(ApiError::BadRequest("scheduledAt must be in the future".into()));
    }
    Ok(Json(state.dispatcher.schedule(id, req.scheduled_at)?))
}

async fn start_campaign_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<NotificationCampaign>, ApiError> {
    Ok(Json(state.dispatcher.start(id)?))
}

async fn pause_campaign_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<NotificationCampaign>, ApiError> {
    Ok(Json(state.dispatcher.pause(id)?))
}

async fn resume_campaign_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<NotificationCampaign>, ApiError> {
    Ok(Json(state.dispatcher.resume(id)?))
}

async fn cancel_campaign_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<NotificationCampaign>, ApiError> {
    Ok(Json(state.dispatcher.cancel(id)?))
}
