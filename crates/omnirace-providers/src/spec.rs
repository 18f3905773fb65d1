//! Declarative provider table.
//!
//! Each supported backend is one [`ProviderSpec`] entry paired with a wire
//! format family. Adding a provider means adding a table row; the scheduler
//! never changes.

use std::time::Duration;

/// Wire-format family a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFamily {
    /// Newline-delimited `data: {json}` SSE frames ending in `data: [DONE]`
    OpenAiSse,
    /// One streamed JSON array, invalid until complete
    GeminiJson,
}

/// Static description of one backend.
#[derive(Debug, Clone)]
pub struct ProviderSpec {
    /// Provider name, used in envelopes, headers, and failure records
    pub name: String,
    /// Streaming chat-completion endpoint
    pub endpoint: String,
    /// Model requested from this backend
    pub model: String,
    /// Environment variable holding the comma-separated credential pool
    pub credential_env: String,
    /// Per-provider request timeout
    pub timeout: Duration,
    /// Wire format family
    pub family: WireFamily,
    /// Launch order. Lower starts its connection attempt first; arbitration
    /// stays strictly first-successful-stream-wins.
    pub priority: u8,
}

impl ProviderSpec {
    /// Create a spec with the default timeout and priority.
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        credential_env: impl Into<String>,
        family: WireFamily,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            model: model.into(),
            credential_env: credential_env.into(),
            timeout: Duration::from_secs(120),
            family,
            priority: 100,
        }
    }

    /// Set the per-provider timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the launch priority.
    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }
}

/// The default deployment table.
#[must_use]
pub fn default_providers() -> Vec<ProviderSpec> {
    vec![
        ProviderSpec::new(
            "openai",
            "https://api.openai.com/v1/chat/completions",
            "gpt-4o-mini",
            "OPENAI_API_KEYS",
            WireFamily::OpenAiSse,
        )
        .with_priority(10),
        ProviderSpec::new(
            "groq",
            "https://api.groq.com/openai/v1/chat/completions",
            "llama-3.3-70b-versatile",
            "GROQ_API_KEYS",
            WireFamily::OpenAiSse,
        )
        .with_priority(20),
        ProviderSpec::new(
            "gemini",
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:streamGenerateContent",
            "gemini-1.5-flash",
            "GEMINI_API_KEYS",
            WireFamily::GeminiJson,
        )
        .with_priority(30),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let providers = default_providers();

        assert_eq!(providers.len(), 3);
        assert!(providers.iter().any(|p| p.family == WireFamily::GeminiJson));
        assert!(providers.iter().any(|p| p.family == WireFamily::OpenAiSse));
    }

    #[test]
    fn test_distinct_credential_vars() {
        let providers = default_providers();
        let mut vars: Vec<&str> = providers.iter().map(|p| p.credential_env.as_str()).collect();
        vars.sort_unstable();
        vars.dedup();
        assert_eq!(vars.len(), providers.len());
    }

    #[test]
    fn test_builder_overrides() {
        let spec = ProviderSpec::new(
            "local",
            "http://localhost:8080/v1/chat/completions",
            "test-model",
            "LOCAL_KEYS",
            WireFamily::OpenAiSse,
        )
        .with_timeout(Duration::from_secs(5))
        .with_priority(1);

        assert_eq!(spec.timeout, Duration::from_secs(5));
        assert_eq!(spec.priority, 1);
    }
}
