// Transfer Gateway - HTTP entry point for the transfer engine
// Translates JSON requests into producer-façade calls and replies back

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use transfer_core::{AccountId, AccountOperations, Metrics, ServerConfig};

pub mod error;
pub mod metrics;

pub use error::GatewayError;
use metrics::HttpMetrics;

#[derive(Clone)]
pub struct AppState {
    pub operations: AccountOperations,
    pub metrics: Metrics,
    pub service: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub amount: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateResponse {
    pub account: AccountId,
}

#[derive(Debug, Deserialize)]
pub struct InfoParams {
    pub account: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InfoResponse {
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub from_account: AccountId,
    pub to_account: AccountId,
    pub amount: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
    pub version: String,
}

/// Build the HTTP router over `state`.
///
/// HTTP collectors are registered into the engine's registry so `/metrics`
/// serves both.
pub fn router(state: AppState, config: &ServerConfig) -> prometheus::Result<Router> {
    let http_metrics = HttpMetrics::new(state.metrics.registry())?;

    Ok(Router::new()
        .route("/account/create", post(create_account))
        .route("/account/info", get(account_info))
        .route("/account/transfer", post(transfer))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(http_metrics, metrics::track))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_secs,
        )))
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

// POST /account/create
async fn create_account(
    State(state): State<AppState>,
    payload: Result<Json<CreateRequest>, JsonRejection>,
) -> Result<Json<CreateResponse>, GatewayError> {
    let Json(request) = payload?;
    let account = state.operations.create(request.amount).await?;
    Ok(Json(CreateResponse { account }))
}

// GET /account/info?account=<uuid>
async fn account_info(
    State(state): State<AppState>,
    params: Option<Query<InfoParams>>,
) -> Result<Json<InfoResponse>, GatewayError> {
    let account = params
        .and_then(|Query(params)| params.account)
        .and_then(|raw| raw.parse::<AccountId>().ok())
        .ok_or(GatewayError::InvalidParameter("account"))?;

    let amount = state.operations.info(account).await?;
    Ok(Json(InfoResponse { amount }))
}

// POST /account/transfer
async fn transfer(
    State(state): State<AppState>,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, GatewayError> {
    let Json(request) = payload?;
    state
        .operations
        .transfer(request.from_account, request.to_account, request.amount)
        .await?;
    Ok(Json(StatusResponse {
        status: "success".to_string(),
    }))
}

// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let accepting = state.operations.is_accepting();
    let status = if accepting {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if accepting { "healthy" } else { "draining" },
            service: state.service.clone(),
            version: state.version.clone(),
        }),
    )
}

// Prometheus metrics endpoint
async fn metrics_handler(State(state): State<AppState>) -> Result<String, GatewayError> {
    state
        .metrics
        .export()
        .map_err(|e| GatewayError::Internal(format!("Failed to export metrics: {}", e)))
}

async fn not_found() -> GatewayError {
    GatewayError::NotFound
}
