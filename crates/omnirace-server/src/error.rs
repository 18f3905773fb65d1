//! Client-facing error responses.
//!
//! Success bodies and error bodies never mix: a race that fails before any
//! provider acquires a stream produces exactly one JSON error body here,
//! while a stream that breaks mid-response is handled by the streamer with a
//! terminal envelope and no status change.

use axum::{
    http::{header::HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use omnirace_core::{RaceError, RaceFailure};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// Header carrying the machine-readable failure class on 5xx responses.
pub const FAILURE_CLASS_HEADER: &str = "x-failure-class";

/// Errors surfaced to HTTP clients.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or invalid request body.
    #[error("bad request: {message}")]
    BadRequest {
        /// What was wrong with the request
        message: String,
    },

    /// A race that failed before any provider acquired a stream.
    #[error(transparent)]
    Race(#[from] RaceError),
}

impl ApiError {
    /// Create a bad-request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }
}

/// Render an aggregate failure list as one human-readable line per provider.
fn describe_failures(failures: &[RaceFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.provider, f.cause))
        .collect::<Vec<_>>()
        .join("; ")
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest { message } => {
                warn!(%message, "Rejected request");
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "text": message, "error": true })),
                )
                    .into_response()
            }
            Self::Race(race) => race_error_response(&race),
        }
    }
}

fn race_error_response(race: &RaceError) -> Response {
    let class = race.failure_class();
    match race {
        RaceError::Configuration { message } => {
            error!(%message, "No provider could be raced");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "text": message }))).into_response()
        }
        RaceError::AllProvidersFailed { failures } => {
            error!(failures = failures.len(), "All providers failed");
            aggregate_response(
                class,
                format!(
                    "All {} providers failed: {}",
                    failures.len(),
                    describe_failures(failures)
                ),
            )
        }
        RaceError::Timeout { elapsed, failures } => {
            error!(elapsed_ms = elapsed.as_millis() as u64, "Race timed out");
            let mut text = format!("Race timed out after {}ms", elapsed.as_millis());
            if !failures.is_empty() {
                text.push_str(&format!(
                    "; {} providers had already failed: {}",
                    failures.len(),
                    describe_failures(failures)
                ));
            }
            aggregate_response(class, text)
        }
        // Upstream and Stream never reach the client as statuses: the
        // scheduler demotes the former to failure records and the streamer
        // converts the latter into a terminal envelope. This arm exists so
        // a future variant cannot silently fall through.
        RaceError::Upstream { .. } | RaceError::Stream { .. } => aggregate_response(
            class,
            "Race failed before a response could be streamed".to_string(),
        ),
    }
}

fn aggregate_response(class: &'static str, text: String) -> Response {
    let mut response = (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({
            "text": text,
            "error": true,
            "timestamp": Utc::now(),
        })),
    )
        .into_response();
    response.headers_mut().insert(
        HeaderName::from_static(FAILURE_CLASS_HEADER),
        HeaderValue::from_static(class),
    );
    response
}
