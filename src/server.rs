use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::StorageConfig;
use crate::delivery::types::{Recipient, RecipientSettings};
use crate::pipeline::{bounded, Pipeline};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub history_limit: usize,
    pub history_max: usize,
}

impl AppState {
    pub fn new(pipeline: Pipeline, storage: &StorageConfig) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            history_limit: storage.history_limit,
            history_max: storage.history_max,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .route("/webhook", post(webhook))
        .route("/register", post(register))
        .route("/signals", get(signals))
        .with_state(state)
}

/// Always acknowledges. Malformed bodies, including invalid UTF-8, degrade to
/// fallback extraction.
pub async fn webhook(State(state): State<AppState>, body: Bytes) -> (StatusCode, Json<Value>) {
    let body = String::from_utf8_lossy(&body);
    let outcome = state.pipeline.handle_webhook(&body, Utc::now()).await;

    let status = if outcome.signal.is_some() {
        "success"
    } else {
        "unclassified"
    };

    (
        StatusCode::OK,
        Json(json!({
            "status": status,
            "signal": outcome.signal,
            "signalId": outcome.signal_id,
            "persisted": outcome.persisted,
            "queued": outcome.report.queued,
            "skipped": outcome.report.skipped(),
            "chunksFailed": outcome.report.chunks_failed,
        })),
    )
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub token: String,
    #[serde(default)]
    pub settings: RecipientSettings,
}

/// Any unreadable body or bad token is a 400 with a JSON error.
pub async fn register(State(state): State<AppState>, body: Bytes) -> (StatusCode, Json<Value>) {
    let request: RegisterRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("invalid registration: {}", e) })),
            );
        }
    };

    let pipeline = &state.pipeline;
    if !pipeline.provider().is_valid_token(&request.token) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid push token" })),
        );
    }

    let recipient = Recipient {
        token: request.token,
        settings: request.settings,
    };

    match bounded(pipeline.store_timeout(), pipeline.store().upsert_recipient(&recipient)).await {
        Ok(()) => {
            info!("Registered recipient (pro={})", recipient.settings.is_pro);
            (StatusCode::OK, Json(json!({ "status": "registered" })))
        }
        Err(e) => {
            warn!("Failed to register recipient: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "failed to save registration" })),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// Newest first.
pub async fn signals(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> (StatusCode, Json<Value>) {
    let limit = query
        .limit
        .unwrap_or(state.history_limit)
        .clamp(1, state.history_max);
    let pipeline = &state.pipeline;

    match bounded(pipeline.store_timeout(), pipeline.store().recent_signals(limit)).await {
        Ok(signals) => (StatusCode::OK, Json(json!(signals))),
        Err(e) => {
            warn!("Failed to read signal history: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "failed to read signals" })),
            )
        }
    }
}
