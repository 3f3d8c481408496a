// HTTP server for the gate
//
// Routes:
// - GET  /usage      usage stats JSON
// - GET  /dashboard  usage stats plus recent requests
// - GET  /health     200 when the usage ledger is ready, 503 otherwise
// - GET  /metrics    Prometheus text (when enabled)
// - POST /generate   gated generateContent call

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::client::{GatedClient, GenerateContentRequest};
use crate::error::GateError;
use crate::metrics;
use crate::rate_limit::LedgerState;

/// Shared handler state
#[derive(Debug, Clone)]
pub struct AppState {
    client: GatedClient,
}

impl AppState {
    /// Create handler state around a gated client
    pub fn new(client: GatedClient) -> Self {
        Self { client }
    }
}

/// Build the router
pub fn router(state: AppState, metrics_enabled: bool) -> Router {
    let mut app = Router::new()
        .route("/usage", get(usage_handler))
        .route("/dashboard", get(dashboard_handler))
        .route("/health", get(health_handler))
        .route("/generate", post(generate_handler));

    if metrics_enabled {
        app = app.route("/metrics", get(metrics_handler));
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Serve `app` on `addr` until `shutdown` resolves
pub async fn serve<F>(addr: SocketAddr, app: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    metrics::init().context("Failed to initialize metrics")?;

    info!("Starting genai-gate server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind server to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")?;

    Ok(())
}

/// Usage stats endpoint
async fn usage_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.client.limiter().usage_stats())
}

/// Dashboard endpoint
async fn dashboard_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.client.limiter().dashboard())
}

/// Health check endpoint
async fn health_handler(State(state): State<AppState>) -> Response {
    let ledger = state.client.limiter().state();
    let status = if ledger == LedgerState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(json!({ "status": ledger }))).into_response()
}

/// Metrics endpoint handler
async fn metrics_handler() -> Response {
    match metrics::gather_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text).into_response(),
        Err(e) => {
            error!("Failed to gather metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error gathering metrics: {}", e),
            )
                .into_response()
        }
    }
}

/// Gated generation endpoint
async fn generate_handler(
    State(state): State<AppState>,
    Json(request): Json<GenerateContentRequest>,
) -> Result<Response, ApiError> {
    let response = state.client.generate_content(request).await?;
    Ok(Json(response.raw).into_response())
}

/// Gate error rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub GateError);

impl From<GateError> for ApiError {
    fn from(error: GateError) -> Self {
        Self(error)
    }
}

impl ApiError {
    /// HTTP status for the wrapped error
    pub fn status(&self) -> StatusCode {
        match self.0 {
            GateError::DailyLimitReached => StatusCode::TOO_MANY_REQUESTS,
            GateError::Unavailable(_) | GateError::PersistFailed | GateError::ShuttingDown => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GateError::Execution(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::BAD_GATEWAY {
            error!("Provider call failed: {:#}", self.0);
        }
        let body = json!({
            "error": self.0.to_string(),
            "reason": self.0.reason(),
            "fallback": self.0.is_quota_related(),
        });
        (status, Json(body)).into_response()
    }
}
