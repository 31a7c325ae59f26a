//! Request-pipeline guards.
//!
//! Thin axum middleware around the domain guards. Each stage only maps a
//! domain decision to a response; all decisions live in `domain::services`.
//!
//! Pipeline order for a request, outermost first:
//! write guard, route-level gates (strict health, credentials), handler,
//! then the reclassifier on the way back out.

use super::api_error::RouteFailure;
use crate::domain::services::{
    CredentialGate, CredentialRegistry, ErrorReclassifier, GateDecision, Reclassification,
    StrictHealthGate, WriteDecision, WriteGuard,
};
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Json, Router,
};
use std::sync::Arc;

/// Block writes while the store is degraded; acknowledge telemetry.
pub async fn write_guard(
    State(guard): State<Arc<WriteGuard>>,
    request: Request,
    next: Next,
) -> Response {
    match guard.check(request.method().as_str(), request.uri().path()) {
        WriteDecision::Continue => next.run(request).await,
        WriteDecision::AcceptTelemetry(ack) => (StatusCode::ACCEPTED, Json(ack)).into_response(),
        WriteDecision::Block(err) => {
            let retry_after = err.retry_after;
            let mut response = (StatusCode::SERVICE_UNAVAILABLE, Json(err)).into_response();
            if let Some(secs) = retry_after {
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(secs));
            }
            response
        }
    }
}

/// Turn connectivity failures into a degraded-mode response when the store
/// is known to be down.
pub async fn reclassify_errors(
    State(reclassifier): State<Arc<ErrorReclassifier>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;
    let kind = response
        .extensions()
        .get::<RouteFailure>()
        .and_then(|failure| failure.kind);

    match reclassifier.classify(kind, &method, &path) {
        Reclassification::Forward => response,
        Reclassification::Degraded(err) => {
            (StatusCode::SERVICE_UNAVAILABLE, Json(err)).into_response()
        }
    }
}

/// Require a healthy store for every method.
pub async fn strict_health_gate(
    State(gate): State<Arc<StrictHealthGate>>,
    request: Request,
    next: Next,
) -> Response {
    match gate.check(request.uri().path()) {
        Ok(()) => next.run(request).await,
        Err(err) => (StatusCode::SERVICE_UNAVAILABLE, Json(err)).into_response(),
    }
}

/// State for a credential gate layer.
#[derive(Clone)]
pub struct GateState {
    pub gate: Arc<CredentialGate>,
    pub registry: Arc<CredentialRegistry>,
}

pub async fn credential_gate(
    State(state): State<GateState>,
    request: Request,
    next: Next,
) -> Response {
    let decision = state.gate.evaluate(
        &state.registry,
        request.method().as_str(),
        request.uri().path(),
    );
    match decision {
        GateDecision::Continue => next.run(request).await,
        GateDecision::Reject(body) => (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response(),
    }
}

/// Wrap every route of `router` in the write guard and the reclassifier.
pub fn with_dependency_guards<S>(
    router: Router<S>,
    write: Arc<WriteGuard>,
    reclassifier: Arc<ErrorReclassifier>,
) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(middleware::from_fn_with_state(reclassifier, reclassify_errors))
        .layer(middleware::from_fn_with_state(write, write_guard))
}

/// Put the routes of `router` behind the strict health gate.
pub fn require_healthy_database<S>(router: Router<S>, gate: Arc<StrictHealthGate>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.route_layer(middleware::from_fn_with_state(gate, strict_health_gate))
}

/// Put the routes of `router` behind a credential gate.
pub fn require_credentials<S>(
    router: Router<S>,
    gate: CredentialGate,
    registry: Arc<CredentialRegistry>,
) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let state = GateState {
        gate: Arc::new(gate),
        registry,
    };
    router.route_layer(middleware::from_fn_with_state(state, credential_gate))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::adapters::inbound::api_error::ApiError;
    use crate::adapters::outbound::StaticCredentialSource;
    use crate::domain::errors::StoreError;
    use crate::domain::services::testing::FixedHealth;
    use crate::domain::services::GuardPaths;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use axum::routing::{any, get, post};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn request(method: &str, uri: &str) -> HttpRequest<Body> {
        HttpRequest::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn refused() -> Result<&'static str, ApiError> {
        Err(StoreError::connection_refused("connect ECONNREFUSED 10.0.0.5:5432").into())
    }

    async fn bug() -> Result<&'static str, ApiError> {
        Err(StoreError::generic("column \"foo\" does not exist").into())
    }

    fn app(healthy: bool) -> Router {
        let monitor = Arc::new(FixedHealth(healthy));
        let router = Router::new()
            .route("/api/elections", get(|| async { "elections" }).post(|| async { "created" }))
            .route("/api/telemetry", any(|| async { "unreachable" }))
            .route("/health", post(|| async { "probe" }))
            .route("/api/refused", get(refused))
            .route("/api/bug", get(bug));
        with_dependency_guards(
            router,
            Arc::new(WriteGuard::new(monitor.clone(), GuardPaths::default(), 30)),
            Arc::new(ErrorReclassifier::new(monitor)),
        )
    }

    #[tokio::test]
    async fn test_write_guard_blocks_when_degraded() {
        let response = app(false).oneshot(request("POST", "/api/elections")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "30");

        let body = body_json(response).await;
        assert_eq!(body["error"], "service_unavailable");
        assert_eq!(body["mode"], "degraded");
        assert_eq!(body["retryAfter"], 30);
        assert_eq!(body["allowedOperations"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_write_guard_passes_reads_and_health() {
        let response = app(false).oneshot(request("GET", "/api/elections")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app(false).oneshot(request("POST", "/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app(true).oneshot(request("POST", "/api/elections")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_telemetry_acknowledged() {
        let response = app(false).oneshot(request("POST", "/api/telemetry")).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let body = body_json(response).await;
        assert_eq!(body["status"], "queued");
        assert_eq!(body["dbHealthy"], false);
    }

    #[tokio::test]
    async fn test_reclassifier() {
        let response = app(false).oneshot(request("GET", "/api/refused")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Database connection lost. System is in degraded mode.");
        assert_eq!(body["path"], "/api/refused");
        assert_eq!(body["method"], "GET");

        // Healthy store: forwarded unchanged
        let response = app(true).oneshot(request("GET", "/api/refused")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        // Unclassified failures are never masked
        let response = app(false).oneshot(request("GET", "/api/bug")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["error"], "internal_error");
    }

    #[tokio::test]
    async fn test_strict_gate() {
        let router: Router = Router::new().route("/api/admin/import", get(|| async { "ok" }));
        let gated = require_healthy_database(router, Arc::new(StrictHealthGate::new(Arc::new(FixedHealth(false)))));

        let response = gated.oneshot(request("GET", "/api/admin/import")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["error"], "database_unavailable");
        assert_eq!(body["healthStatus"]["isHealthy"], false);
    }

    #[tokio::test]
    async fn test_credential_gate_layer() {
        let source = Arc::new(StaticCredentialSource::new());
        let registry = Arc::new(CredentialRegistry::with_defaults(source.clone()));
        let router: Router = Router::new().route("/api/candidates", get(|| async { "ok" }));
        let gated = require_credentials(
            router,
            CredentialGate::require_credentials(["GOOGLE_CIVIC_API_KEY"], false),
            registry,
        );

        let response = gated.clone().oneshot(request("GET", "/api/candidates")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["reason"], "missing_api_key");
        assert_eq!(body["missingKeys"], serde_json::json!(["GOOGLE_CIVIC_API_KEY"]));

        source.insert("GOOGLE_CIVIC_API_KEY", "key");
        let response = gated.oneshot(request("GET", "/api/candidates")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
