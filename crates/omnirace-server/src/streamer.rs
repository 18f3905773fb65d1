//! Response streaming for the winning provider.
//!
//! The body is a sequence of concatenated JSON envelopes written as they are
//! produced; each envelope is the client's parsing unit and no SSE framing is
//! layered on top. Frames are size-bounded, so a client can allocate per
//! frame without fearing a pathological upstream delta.

use std::convert::Infallible;
use std::time::Instant;

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::Response,
};
use bytes::Bytes;
use futures::StreamExt;
use omnirace_core::StreamFrame;
use omnirace_scheduler::RaceOutcome;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Upper bound on the text carried by a single outgoing frame, in bytes.
pub const MAX_FRAME_TEXT: usize = 8 * 1024;

/// Cancels the winner's upstream read when the response body is dropped,
/// whether the stream completed, broke, or the client disconnected.
struct CancelOnDrop(CancellationToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Split delta text into chunks no larger than [`MAX_FRAME_TEXT`] bytes,
/// breaking only on char boundaries. The final partial chunk is kept.
fn split_frame_text(text: &str) -> Vec<String> {
    if text.len() <= MAX_FRAME_TEXT {
        if text.is_empty() {
            return Vec::new();
        }
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::with_capacity(MAX_FRAME_TEXT);
    for ch in text.chars() {
        if current.len() + ch.len_utf8() > MAX_FRAME_TEXT {
            chunks.push(std::mem::take(&mut current));
        }
        current.push(ch);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Build the streaming 200 response for a resolved race.
pub fn stream_response(outcome: RaceOutcome, received_at: Instant) -> Response {
    let RaceOutcome {
        provider,
        masked_key,
        mut stream,
        cancel,
        latency,
    } = outcome;

    let first_byte_ms = received_at.elapsed().as_millis() as u64;
    let latency_ms = latency.as_millis() as u64;

    let frame_provider = provider.clone();
    let frame_key = masked_key.clone();

    // Constructed before the generator so the token is cancelled even when
    // the body is dropped without ever being polled.
    let guard = CancelOnDrop(cancel);

    let body = async_stream::stream! {
        let _guard = guard;

        while let Some(item) = stream.next().await {
            match item {
                Ok(delta) => {
                    for piece in split_frame_text(&delta.text) {
                        let frame =
                            StreamFrame::text(piece, &frame_provider, &frame_key, delta.kind);
                        match serde_json::to_vec(&frame) {
                            Ok(bytes) => yield Ok::<Bytes, Infallible>(Bytes::from(bytes)),
                            Err(e) => warn!(error = %e, "Failed to serialize frame, skipped"),
                        }
                    }
                }
                Err(e) => {
                    // The response already started, so the status cannot
                    // change; the terminal envelope is the error signal.
                    warn!(
                        provider = %frame_provider,
                        error = %e,
                        "Winner stream interrupted mid-response"
                    );
                    let frame = StreamFrame::interrupted(&frame_provider, &frame_key);
                    if let Ok(bytes) = serde_json::to_vec(&frame) {
                        yield Ok(Bytes::from(bytes));
                    }
                    return;
                }
            }
        }

        debug!(provider = %frame_provider, "Winner stream completed");
    };

    let mut response = Response::new(Body::from_stream(body));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    if let Ok(value) = HeaderValue::from_str(&provider) {
        headers.insert("x-race-provider", value);
    }
    if let Ok(value) = HeaderValue::from_str(&masked_key) {
        headers.insert("x-race-key", value);
    }
    if let Ok(value) = HeaderValue::from_str(&latency_ms.to_string()) {
        headers.insert("x-race-latency-ms", value);
    }
    if let Ok(value) = HeaderValue::from_str(&first_byte_ms.to_string()) {
        headers.insert("x-first-byte-ms", value);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use futures::stream;
    use http_body_util::BodyExt;
    use omnirace_core::{RaceError, TextDelta};

    fn outcome_from(
        deltas: Vec<Result<TextDelta, RaceError>>,
    ) -> (RaceOutcome, CancellationToken) {
        let cancel = CancellationToken::new();
        let outcome = RaceOutcome {
            provider: "openai".to_string(),
            masked_key: "sk-t***56".to_string(),
            stream: stream::iter(deltas).boxed(),
            cancel: cancel.clone(),
            latency: Duration::from_millis(42),
        };
        (outcome, cancel)
    }

    async fn collect_frames(response: Response) -> Vec<StreamFrame> {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::Deserializer::from_slice(&bytes)
            .into_iter::<StreamFrame>()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_split_short_text_single_chunk() {
        assert_eq!(split_frame_text("hello"), vec!["hello".to_string()]);
        assert!(split_frame_text("").is_empty());
    }

    #[test]
    fn test_split_long_text_bounded_chunks() {
        let text = "x".repeat(MAX_FRAME_TEXT * 2 + 100);
        let chunks = split_frame_text(&text);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() <= MAX_FRAME_TEXT));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_split_respects_char_boundaries() {
        // Multi-byte chars positioned so a byte-based split would land
        // inside a code point.
        let text = "é".repeat(MAX_FRAME_TEXT);
        let chunks = split_frame_text(&text);
        assert!(chunks.iter().all(|c| c.len() <= MAX_FRAME_TEXT));
        assert_eq!(chunks.concat(), text);
    }

    #[tokio::test]
    async fn test_success_frames_and_headers() {
        let (outcome, _cancel) = outcome_from(vec![
            Ok(TextDelta::content("Hello")),
            Ok(TextDelta::content(" world")),
        ]);
        let response = stream_response(outcome, Instant::now());

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("x-race-provider").unwrap(), "openai");
        assert_eq!(response.headers().get("x-race-key").unwrap(), "sk-t***56");
        assert_eq!(response.headers().get("x-race-latency-ms").unwrap(), "42");
        assert_eq!(response.headers().get("cache-control").unwrap(), "no-cache");
        assert_eq!(response.headers().get("x-accel-buffering").unwrap(), "no");

        let frames = collect_frames(response).await;
        let text: String = frames.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(text, "Hello world");
        assert!(frames.iter().all(|f| !f.error));
    }

    #[tokio::test]
    async fn test_interruption_emits_terminal_envelope() {
        let (outcome, _cancel) = outcome_from(vec![
            Ok(TextDelta::content("partial")),
            Err(RaceError::stream("connection reset")),
            Ok(TextDelta::content("never seen")),
        ]);
        let response = stream_response(outcome, Instant::now());
        assert_eq!(response.status(), StatusCode::OK);

        let frames = collect_frames(response).await;
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].text, "partial");
        assert_eq!(frames[1].text, "[Connection Interrupted]");
        assert!(frames[1].error);
    }

    #[tokio::test]
    async fn test_body_drop_cancels_winner() {
        let (outcome, cancel) = outcome_from(vec![Ok(TextDelta::content("Hello"))]);
        let response = stream_response(outcome, Instant::now());

        assert!(!cancel.is_cancelled());
        drop(response);
        // Dropping the body drops the stream closure and its guard.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_oversized_delta_split_across_frames() {
        let big = "a".repeat(MAX_FRAME_TEXT + 10);
        let (outcome, _cancel) = outcome_from(vec![Ok(TextDelta::content(big.clone()))]);
        let response = stream_response(outcome, Instant::now());

        let frames = collect_frames(response).await;
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.text.len() <= MAX_FRAME_TEXT));
        let text: String = frames.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(text, big);
    }
}
