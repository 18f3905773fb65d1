//! Gemini streamed-JSON adapter.
//!
//! Gemini's `streamGenerateContent` endpoint transmits one large JSON array
//! that is not valid JSON until the stream completes. Incremental text is
//! recovered by a structural scanner that walks the byte stream looking for
//! `"text"` string fields and unescaping their values as they arrive. The
//! scanner carries string/escape state across chunk boundaries, so an escape
//! sequence split between two network reads still decodes correctly.

use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use omnirace_core::{mask_secret, ChatMessage, DeltaStream, MessageRole, RaceError, TextDelta};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{client_for, ProviderAdapter, ProviderSpec};

/// Adapter for Gemini-style streamed-JSON endpoints.
pub struct GeminiAdapter {
    spec: ProviderSpec,
    client: Client,
}

impl GeminiAdapter {
    /// Create an adapter for one spec.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(spec: ProviderSpec) -> Result<Self, RaceError> {
        let client = client_for(&spec)?;
        Ok(Self { spec, client })
    }

    fn transform_request(messages: &[ChatMessage]) -> GeminiRequest {
        let mut contents = Vec::new();
        let mut system_parts: Vec<String> = Vec::new();

        for message in messages {
            match message.role {
                MessageRole::System => system_parts.push(message.content.clone()),
                MessageRole::User => contents.push(GeminiContent {
                    role: "user",
                    parts: vec![GeminiPart {
                        text: message.content.clone(),
                    }],
                }),
                MessageRole::Assistant => contents.push(GeminiContent {
                    role: "model",
                    parts: vec![GeminiPart {
                        text: message.content.clone(),
                    }],
                }),
            }
        }

        let system_instruction = if system_parts.is_empty() {
            None
        } else {
            Some(GeminiSystemInstruction {
                parts: vec![GeminiPart {
                    text: system_parts.join("\n\n"),
                }],
            })
        };

        GeminiRequest {
            contents,
            system_instruction,
        }
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
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
        let body = Self::transform_request(messages);

        debug!(provider = %provider, key = %masked, "Opening Gemini stream");

        // Gemini authenticates through a query parameter, not a header.
        let request = self
            .client
            .post(&self.spec.endpoint)
            .query(&[("key", api_key.expose_secret().as_str())])
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
            let mut scanner = TextScanner::new();

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

                let text = scanner.push(&String::from_utf8_lossy(&chunk));
                if !text.is_empty() {
                    yield TextDelta::content(text);
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Longest key the scanner compares against; anything longer cannot be
/// `"text"`, so accumulation stops there and memory use stays constant.
const MAX_TOKEN: usize = 16;

/// Incremental scanner extracting the values of `"text"` fields from a
/// partially transmitted JSON document.
///
/// All state fits in a handful of bytes, so no accumulation buffer can grow
/// with upstream output. Values are emitted as they arrive, not when they
/// close, which keeps token latency at one network read.
pub(crate) struct TextScanner {
    state: ScanState,
}

enum ScanState {
    /// Outside any string
    Idle,
    /// Inside a string that is not (yet known to be) a text value
    InToken {
        buf: String,
        oversize: bool,
        escape: bool,
    },
    /// Just closed a `"text"` token, expecting `:`
    AwaitColon,
    /// Saw `"text":`, expecting the opening quote of the value
    AwaitValue,
    /// Inside a text value, emitting unescaped characters
    InValue {
        escape: bool,
        /// Collected hex digits of a pending `\uXXXX` escape
        unicode: Option<String>,
    },
}

impl TextScanner {
    pub(crate) fn new() -> Self {
        Self {
            state: ScanState::Idle,
        }
    }

    /// Feed a chunk and return all text-value characters it completed.
    pub(crate) fn push(&mut self, input: &str) -> String {
        let mut out = String::new();
        for c in input.chars() {
            self.step(c, &mut out);
        }
        out
    }

    fn step(&mut self, c: char, out: &mut String) {
        match &mut self.state {
            ScanState::Idle => {
                if c == '"' {
                    self.state = ScanState::InToken {
                        buf: String::new(),
                        oversize: false,
                        escape: false,
                    };
                }
            }
            ScanState::InToken {
                buf,
                oversize,
                escape,
            } => {
                if *escape {
                    *escape = false;
                } else if c == '\\' {
                    *escape = true;
                } else if c == '"' {
                    let is_text = !*oversize && buf == "text";
                    self.state = if is_text {
                        ScanState::AwaitColon
                    } else {
                        ScanState::Idle
                    };
                } else if buf.len() < MAX_TOKEN {
                    buf.push(c);
                } else {
                    *oversize = true;
                    buf.clear();
                }
            }
            ScanState::AwaitColon => {
                if c == ':' {
                    self.state = ScanState::AwaitValue;
                } else if !c.is_whitespace() {
                    // `"text"` was a value, not a key.
                    self.state = ScanState::Idle;
                    self.step(c, out);
                }
            }
            ScanState::AwaitValue => {
                if c == '"' {
                    self.state = ScanState::InValue {
                        escape: false,
                        unicode: None,
                    };
                } else if !c.is_whitespace() {
                    // Non-string value; not a text field we care about.
                    self.state = ScanState::Idle;
                    self.step(c, out);
                }
            }
            ScanState::InValue { escape, unicode } => {
                if let Some(hex) = unicode {
                    if c.is_ascii_hexdigit() {
                        hex.push(c);
                        if hex.len() == 4 {
                            let code = u32::from_str_radix(hex, 16).unwrap_or(0xFFFD);
                            out.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
                            self.state = ScanState::InValue {
                                escape: false,
                                unicode: None,
                            };
                        }
                    } else {
                        // Malformed unicode escape; emit a replacement and
                        // reprocess the character normally.
                        out.push('\u{FFFD}');
                        self.state = ScanState::InValue {
                            escape: false,
                            unicode: None,
                        };
                        self.step(c, out);
                    }
                } else if *escape {
                    match c {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        'b' => out.push('\u{8}'),
                        'f' => out.push('\u{c}'),
                        '"' => out.push('"'),
                        '\\' => out.push('\\'),
                        '/' => out.push('/'),
                        'u' => {
                            *unicode = Some(String::with_capacity(4));
                            return;
                        }
                        other => {
                            // Unknown escape: pass through verbatim.
                            out.push('\\');
                            out.push(other);
                        }
                    }
                    *escape = false;
                } else if c == '\\' {
                    *escape = true;
                } else if c == '"' {
                    self.state = ScanState::Idle;
                } else {
                    out.push(c);
                }
            }
        }
    }
}

// Gemini API types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystemInstruction>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: &'static str,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}
