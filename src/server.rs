//! HTTP transport for the orchestrator.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/v1/query` | Run one query; body is a `QueryRequest` |
//! | `GET`  | `/api/v1/analytics` | Aggregate query analytics |
//! | `GET`  | `/health` | Status, version, environment and mock-mode map |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "validation_error", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `validation_error` (422), `adapter_failure` (502),
//! `cancelled` (503).
//!
//! A client that disconnects mid-query drops the handler future, which
//! cancels the run without touching the analytics counters.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::error::OrchestrationError;
use crate::metrics::MetricsSnapshot;
use crate::models::{QueryRequest, QueryResponse};
use crate::orchestrator::Orchestrator;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    environment: Arc<str>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, environment: &str) -> Self {
        Self {
            orchestrator,
            environment: Arc::from(environment),
        }
    }
}

/// Routes and CORS, without binding a socket.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/query", post(handle_query))
        .route("/api/v1/analytics", get(handle_analytics))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until the process ends.
pub async fn run_server(config: &Config, orchestrator: Arc<Orchestrator>) -> anyhow::Result<()> {
    let app = build_router(AppState::new(orchestrator, &config.app.environment));

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    tracing::info!(addr = %config.server.bind, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<OrchestrationError> for AppError {
    fn from(err: OrchestrationError) -> Self {
        let status = match err {
            OrchestrationError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            OrchestrationError::AdapterFailure { .. } => StatusCode::BAD_GATEWAY,
            OrchestrationError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        };
        AppError {
            status,
            code: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

// ============ POST /api/v1/query ============

async fn handle_query(
    State(state): State<AppState>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, AppError> {
    let Json(request) = body.map_err(|rejection| AppError {
        status: StatusCode::UNPROCESSABLE_ENTITY,
        code: "validation_error".to_string(),
        message: rejection.body_text(),
    })?;

    let response = state.orchestrator.run(&request).await?;
    Ok(Json(response))
}

// ============ GET /api/v1/analytics ============

async fn handle_analytics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.orchestrator.snapshot())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    environment: String,
    /// Dependency name → whether it is simulated.
    mock_mode: BTreeMap<String, bool>,
    timestamp: DateTime<Utc>,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.environment.to_string(),
        mock_mode: state.orchestrator.capabilities().mock_status(),
        timestamp: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdapterError;
    use crate::models::Source;

    #[test]
    fn test_error_status_mapping() {
        let e: AppError = OrchestrationError::Validation("query must not be empty".into()).into();
        assert_eq!(e.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(e.code, "validation_error");

        let e: AppError = OrchestrationError::AdapterFailure {
            source_name: Source::Wikipedia,
            error: AdapterError::Timeout(10_000),
        }
        .into();
        assert_eq!(e.status, StatusCode::BAD_GATEWAY);
        assert_eq!(e.code, "adapter_failure");
        assert!(e.message.contains("wikipedia"));

        let e: AppError = OrchestrationError::Cancelled.into();
        assert_eq!(e.status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
