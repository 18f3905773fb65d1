//! HTTP request handlers.

use std::time::Instant;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use omnirace_core::RaceRequest;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::{error::ApiError, extractors::JsonBody, state::AppState, streamer};

/// Health check response body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Version
    pub version: String,
}

/// Health check endpoint.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check endpoint. Ready means at least one provider currently has
/// a resolvable credential.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.scheduler.any_provider_available() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "no providers available")
    }
}

/// The racing chat endpoint.
///
/// Fans the prompt out to every configured provider, streams the first
/// successful backend's output, and aggregates failures when no backend
/// succeeds.
#[instrument(skip(state, body))]
pub async fn race_completion(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<RaceRequest>,
) -> Result<Response, ApiError> {
    let received_at = Instant::now();

    body.validate().map_err(|e| match e {
        omnirace_core::RaceError::Configuration { message } => ApiError::bad_request(message),
        other => ApiError::Race(other),
    })?;

    let messages = body.build_messages();
    debug!(messages = messages.len(), "Race request accepted");

    let outcome = state.scheduler.run(&messages).await?;

    info!(
        provider = %outcome.provider,
        key = %outcome.masked_key,
        latency_ms = outcome.latency.as_millis() as u64,
        "Streaming winner to client"
    );

    Ok(streamer::stream_response(outcome, received_at))
}
