//! REST API server for the filing analyst
//!
//! Exposes the workflow controller and the run log over HTTP.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use uuid::Uuid;

use crate::agent::WorkflowController;
use crate::audit::RunLog;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AnalyzeRequest {
    pub question: String,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub controller: Arc<WorkflowController>,
    pub run_log: RunLog,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Analysis Endpoint
/// =============================

async fn analyze(
    State(state): State<ApiState>,
    Json(req): Json<AnalyzeRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    if req.question.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("question must not be empty".into())),
        );
    }

    info!(question = %req.question, "Received analysis request");

    // Ambiguous and aborted runs are still answers, so every run is a 200.
    let result = state.controller.run(&req.question).await;

    (StatusCode::OK, Json(ApiResponse::success(result)))
}

/// =============================
/// Run Log Endpoints
/// =============================

async fn get_run(
    State(state): State<ApiState>,
    Path(run_id): Path<String>,
) -> (StatusCode, Json<ApiResponse>) {
    let Ok(run_id) = Uuid::parse_str(&run_id) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error(format!("invalid run id: {}", run_id))),
        );
    };

    match state.run_log.get(run_id).await {
        Some(record) => {
            let intact = state.run_log.verify_integrity(run_id).await;
            (
                StatusCode::OK,
                Json(ApiResponse::success(serde_json::json!({
                    "run": record,
                    "integrity_verified": intact,
                }))),
            )
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("run {} not found", run_id))),
        ),
    }
}

async fn list_tools(State(state): State<ApiState>) -> Json<ApiResponse> {
    Json(ApiResponse::success(state.controller.tools()))
}

/// =============================
/// Router
/// =============================

pub fn create_router(controller: Arc<WorkflowController>, run_log: RunLog) -> Router {
    let state = ApiState {
        controller,
        run_log,
    };

    Router::new()
        .route("/health", get(health))
        .route("/api/analyze", post(analyze))
        .route("/api/runs/:run_id", get(get_run))
        .route("/api/tools", get(list_tools))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    controller: Arc<WorkflowController>,
    run_log: RunLog,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(controller, run_log);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
