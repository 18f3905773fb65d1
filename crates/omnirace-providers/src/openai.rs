//! OpenAI-compatible SSE adapter.
//!
//! Covers every backend speaking the OpenAI chat-completions wire format:
//! newline-delimited `data: {json}` frames terminated by `data: [DONE]`.
//! Incremental text is `choices[0].delta.content`; a secondary reasoning
//! field, when present, is surfaced as a distinctly tagged delta.

use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use omnirace_core::{mask_secret, ChatMessage, DeltaStream, RaceError, TextDelta};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{client_for, ProviderAdapter, ProviderSpec, MAX_DECODE_BUFFER};

/// Adapter for OpenAI-compatible streaming endpoints.
pub struct OpenAiAdapter {
    spec: ProviderSpec,
    client: Client,
}

impl OpenAiAdapter {
    /// Create an adapter for one spec.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(spec: ProviderSpec) -> Result<Self, RaceError> {
        let client = client_for(&spec)?;
        Ok(Self { spec, client })
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn spec(&self) -> &ProviderSpec {
        &self.spec
    }

    async fn open_stream(
        &self,
        messages: &[ChatMessage],
        api_key: &SecretString,
        cancel: CancellationToken,
    ) -> Result<DeltaStream, RaceError> {
        let provider = self.spec.name.clone();
        let masked = mask_secret(api_key);

        let body = OpenAiRequest {
            model: &self.spec.model,
            messages,
            stream: true,
        };

        debug!(provider = %provider, key = %masked, "Opening OpenAI-compatible stream");

        let request = self
            .client
            .post(&self.spec.endpoint)
            .bearer_auth(api_key.expose_secret())
            .json(&body);

        let response = tokio::select! {
            () = cancel.cancelled() => {
                return Err(RaceError::upstream(&provider, "cancelled before dispatch", None));
            }
            result = request.send() => result.map_err(|e| {
                RaceError::upstream(&provider, format!("key {masked}: request failed: {e}"), None)
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RaceError::upstream(
                &provider,
                format!("key {masked}: HTTP {status}: {body}"),
                Some(status.as_u16()),
            ));
        }

        if response.content_length() == Some(0) {
            return Err(RaceError::upstream(
                &provider,
                format!("key {masked}: response has no body"),
                Some(status.as_u16()),
            ));
        }

        let stream = try_stream! {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();

            loop {
                let chunk = tokio::select! {
                    () = cancel.cancelled() => {
                        trace!(provider = %provider, "Stream cancelled, tearing down");
                        break;
                    }
                    next = byte_stream.next() => match next {
                        Some(chunk) => chunk,
                        None => break,
                    },
                };

                let chunk = chunk.map_err(|e| {
                    RaceError::stream(format!("{provider}: upstream read failed: {e}"))
                })?;

                buffer.push_str(&String::from_utf8_lossy(&chunk));
                trim_to_cap(&mut buffer, MAX_DECODE_BUFFER);

                // Process complete lines; a partial line stays buffered for
                // the next chunk.
                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].trim().to_string();
                    buffer.drain(..=pos);

                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();

                    if data == "[DONE]" {
                        return;
                    }

                    match deltas_from_data(data) {
                        Some(deltas) => {
                            for delta in deltas {
                                yield delta;
                            }
                        }
                        None => {
                            warn!(provider = %provider, data = %data, "Skipping malformed SSE frame");
                        }
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Extract the text deltas carried by one `data:` payload.
///
/// Returns `None` when the payload is not valid chunk JSON. Reasoning text is
/// emitted before content, each as its own tagged delta.
fn deltas_from_data(data: &str) -> Option<Vec<TextDelta>> {
    let chunk: OpenAiChunk = serde_json::from_str(data).ok()?;
    let mut deltas = Vec::new();

    if let Some(choice) = chunk.choices.into_iter().next() {
        if let Some(reasoning) = choice.delta.reasoning_content.filter(|t| !t.is_empty()) {
            deltas.push(TextDelta::reasoning(reasoning));
        }
        if let Some(content) = choice.delta.content.filter(|t| !t.is_empty()) {
            deltas.push(TextDelta::content(content));
        }
    }

    Some(deltas)
}

/// Drop the oldest bytes of `buffer` until it fits in `cap`, respecting char
/// boundaries.
fn trim_to_cap(buffer: &mut String, cap: usize) {
    if buffer.len() <= cap {
        return;
    }
    let mut cut = buffer.len() - cap;
    while !buffer.is_char_boundary(cut) {
        cut += 1;
    }
    buffer.drain(..cut);
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OpenAiChunk {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    #[serde(default)]
    delta: OpenAiDelta,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default, alias = "reasoning")]
    reasoning_content: Option<String>,
}
