//! # OmniRace Providers
//!
//! Provider adapters for OmniRace. Each adapter issues the upstream streaming
//! HTTP call for one wire-format family and normalizes the native protocol
//! into the canonical [`TextDelta`](omnirace_core::TextDelta) stream:
//!
//! - OpenAI-compatible SSE (`data: {json}` frames, `data: [DONE]` terminator)
//! - Gemini streamed-JSON (one incrementally transmitted JSON array)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod gemini;
pub mod openai;
pub mod spec;

use std::sync::Arc;

use async_trait::async_trait;
use omnirace_core::{ChatMessage, DeltaStream, RaceError};
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;
pub use spec::{default_providers, ProviderSpec, WireFamily};

/// Upper bound on any adapter's internal accumulation buffer.
pub const MAX_DECODE_BUFFER: usize = 50 * 1024;

/// One concurrent attempt to acquire a streaming response from a backend.
///
/// `open_stream` resolves as soon as the upstream has accepted the call and
/// returned a readable 2xx stream — not when generation has finished. A
/// cancelled adapter tears its connection down promptly and ends its stream
/// silently; cancellation is never surfaced as an error.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// The static spec this adapter was built from.
    fn spec(&self) -> &ProviderSpec;

    /// Open the upstream stream and return the normalized text-delta stream.
    async fn open_stream(
        &self,
        messages: &[ChatMessage],
        api_key: &SecretString,
        cancel: CancellationToken,
    ) -> Result<DeltaStream, RaceError>;
}

/// Build the adapter matching a spec's wire family.
///
/// # Errors
/// Returns an error when the HTTP client cannot be constructed.
pub fn build_adapter(spec: ProviderSpec) -> Result<Arc<dyn ProviderAdapter>, RaceError> {
    Ok(match spec.family {
        WireFamily::OpenAiSse => Arc::new(OpenAiAdapter::new(spec)?),
        WireFamily::GeminiJson => Arc::new(GeminiAdapter::new(spec)?),
    })
}

/// Build adapters for every entry of a provider table, in priority order.
///
/// # Errors
/// Returns the first adapter construction error.
pub fn build_adapters(
    mut specs: Vec<ProviderSpec>,
) -> Result<Vec<Arc<dyn ProviderAdapter>>, RaceError> {
    specs.sort_by_key(|s| s.priority);
    specs.into_iter().map(build_adapter).collect()
}

pub(crate) fn client_for(spec: &ProviderSpec) -> Result<reqwest::Client, RaceError> {
    reqwest::Client::builder()
        .timeout(spec.timeout)
        .build()
        .map_err(|e| {
            RaceError::configuration(format!("failed to create HTTP client for {}: {e}", spec.name))
        })
}
