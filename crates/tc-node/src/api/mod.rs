//! # HTTP API
//!
//! | Method | Path | Purpose |
//! |--------|------|---------|
//! | POST | `/timestamps` | queue a fingerprint (`{"hash": "<hex>"}`) |
//! | GET | `/{hash}/validationChain` | membership state and proof |
//! | GET | `/status` | tip, queue length, halt state |
//! | POST | `/admin/reset-halt` | re-verify the chain, then clear a halt |
//! | GET | `/health` | liveness |

mod error;

pub use error::ApiError;

use crate::runtime::{EnqueueError, IngestQueue};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tc_hash_chain::{Fingerprint, HashChainApi, LedgerStatus, ValidationResult};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 16 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub api: Arc<dyn HashChainApi>,
    pub queue: IngestQueue,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub hash: String,
}

/// Build the HTTP router.
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/timestamps", post(submit_timestamp))
        .route("/:hash/validationChain", get(validation_chain))
        .route("/status", get(status))
        .route("/admin/reset-halt", post(reset_halt))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

/// Validate synchronously, chain asynchronously.
async fn submit_timestamp(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let canonical = Fingerprint::decode(request.hash.trim())?.encode();

    match state.queue.enqueue(canonical.clone()) {
        Ok(()) => Ok((
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "hash": canonical, "status": "queued" })),
        )),
        Err(EnqueueError::Full) | Err(EnqueueError::Closed) => Ok((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "hash": canonical, "status": "queue unavailable" })),
        )),
    }
}

async fn validation_chain(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<ValidationResult>, ApiError> {
    Ok(Json(state.api.get_validation_chain(&hash).await?))
}

async fn status(State(state): State<AppState>) -> Result<Json<LedgerStatus>, ApiError> {
    Ok(Json(state.api.status().await?))
}

async fn reset_halt(State(state): State<AppState>) -> Result<Json<LedgerStatus>, ApiError> {
    state.api.reset_halt().await?;
    Ok(Json(state.api.status().await?))
}

async fn health_check() -> &'static str {
    "OK"
}
