//! HTTP API server implementation

use axum::{
    extract::{Json, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::config::GatewayConfig;
use crate::core::gateway::AiGateway;
use crate::core::models::{DispatchResult, UsageStats};
use crate::core::store::{FileStore, MemoryStore, OptionStore};

/// Application state
#[derive(Clone)]
pub struct AppState {
    gateway: Arc<AiGateway>,
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    service: String,
    version: String,
}

/// Generation request
#[derive(Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    /// Per-call-site daily ceiling; the configured default applies if absent
    pub max_calls: Option<u32>,
}

/// Generation response
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub result: DispatchResult,
    pub cached: bool,
    /// Free calls left under this request's ceiling; null for premium
    pub calls_remaining: Option<u32>,
    pub is_premium: bool,
}

/// Reset response
#[derive(Serialize)]
pub struct ResetResponse {
    pub success: bool,
    pub stats: UsageStats,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Health check handler
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "ai-guardian".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// AI generation handler
async fn generate(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, (StatusCode, Json<ErrorResponse>)> {
    let max_calls = payload
        .max_calls
        .unwrap_or(state.gateway.config().default_max_calls);

    let result = state
        .gateway
        .generate_with_limit(&payload.prompt, max_calls)
        .await
        .map_err(|e| {
            warn!("generate rejected: {}", e);
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: ErrorDetail {
                        message: e.to_string(),
                        code: Some("invalid_request".to_string()),
                    },
                }),
            )
        })?;

    let is_premium = state.gateway.is_premium();
    let calls_remaining = if is_premium {
        None
    } else {
        Some(max_calls.saturating_sub(state.gateway.usage_stats().calls_today))
    };

    Ok(Json(GenerateResponse {
        success: true,
        cached: result.is_cached(),
        result,
        calls_remaining,
        is_premium,
    }))
}

/// Usage snapshot handler
async fn usage(State(state): State<Arc<AppState>>) -> Json<UsageStats> {
    Json(state.gateway.usage_stats())
}

/// Daily counter reset handler, called by the external scheduler
async fn reset(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ResetResponse>, (StatusCode, Json<ErrorResponse>)> {
    state.gateway.reset_quota().map_err(|e| {
        warn!("quota reset failed: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: ErrorDetail {
                    message: e.to_string(),
                    code: Some("store_error".to_string()),
                },
            }),
        )
    })?;

    Ok(Json(ResetResponse {
        success: true,
        stats: state.gateway.usage_stats(),
    }))
}

/// Build the router over a ready gateway
pub fn router(gateway: Arc<AiGateway>) -> Router {
    let state = Arc::new(AppState { gateway });

    Router::new()
        .route("/", get(health_check))
        .route("/v1/generate", post(generate))
        .route("/v1/usage", get(usage))
        .route("/v1/reset", post(reset))
        .with_state(state)
}

/// Run the HTTP server
pub async fn run_server(
    host: String,
    port: u16,
    state_file: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut config = GatewayConfig::from_env()?;
    if config.deployment_host.is_empty() {
        config.deployment_host = host.clone();
    }

    let store: Arc<dyn OptionStore> = match state_file {
        Some(path) => Arc::new(FileStore::open(path)?),
        None => Arc::new(MemoryStore::new()),
    };
    let gateway = Arc::new(AiGateway::with_store(config, store)?);

    let app = router(gateway);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
