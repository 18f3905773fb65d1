//! Error taxonomy for the race engine.
//!
//! Individual adapter failures are demoted to [`RaceFailure`] records and only
//! surface in aggregate once the whole race has failed; they never abort a
//! race that still has live contenders.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Maximum number of upstream body characters carried in a failure record.
pub const CAUSE_LIMIT: usize = 200;

/// Result alias used throughout OmniRace.
pub type RaceResult<T> = Result<T, RaceError>;

/// Errors produced while racing providers.
#[derive(Debug, Error)]
pub enum RaceError {
    /// No provider had a usable credential; nothing could be raced.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem
        message: String,
    },

    /// One upstream rejected or mishandled the call. Recorded per provider,
    /// never surfaced to the client while the race is still open.
    #[error("upstream {provider} failed: {message}")]
    Upstream {
        /// Provider that failed
        provider: String,
        /// Truncated cause, never containing a raw credential
        message: String,
        /// Upstream HTTP status, when one was received
        status: Option<u16>,
    },

    /// The global race ceiling expired before any provider acquired a stream.
    #[error("race timed out after {elapsed:?} ({} failures so far)", failures.len())]
    Timeout {
        /// Time the race was allowed to run
        elapsed: Duration,
        /// Failures accumulated before expiry
        failures: Vec<RaceFailure>,
    },

    /// Every racer failed before any acquired a stream.
    #[error("all {} providers failed", failures.len())]
    AllProvidersFailed {
        /// One record per failed provider
        failures: Vec<RaceFailure>,
    },

    /// The winner's stream broke after the response had already started.
    #[error("stream error: {message}")]
    Stream {
        /// Description of the interruption
        message: String,
    },
}

impl RaceError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an upstream failure, truncating the cause to [`CAUSE_LIMIT`].
    pub fn upstream(
        provider: impl Into<String>,
        message: impl Into<String>,
        status: Option<u16>,
    ) -> Self {
        Self::Upstream {
            provider: provider.into(),
            message: truncate_cause(&message.into()),
            status,
        }
    }

    /// Create a mid-stream error.
    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream {
            message: message.into(),
        }
    }

    /// Failure class label, used for the `X-Failure-Class` response header.
    #[must_use]
    pub fn failure_class(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration_error",
            Self::Upstream { .. } => "upstream_rejection",
            Self::Timeout { .. } => "race_timeout",
            Self::AllProvidersFailed { .. } => "all_providers_failed",
            Self::Stream { .. } => "stream_interrupted",
        }
    }
}

/// One provider's failure inside a race, with its cause truncated so error
/// bodies stay bounded no matter what the upstream returned.
#[derive(Debug, Clone, Serialize)]
pub struct RaceFailure {
    /// Provider that failed
    pub provider: String,
    /// Truncated failure cause
    pub cause: String,
}

impl RaceFailure {
    /// Create a failure record, truncating the cause to [`CAUSE_LIMIT`].
    pub fn new(provider: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            cause: truncate_cause(&cause.into()),
        }
    }
}

impl From<RaceError> for RaceFailure {
    fn from(err: RaceError) -> Self {
        match err {
            RaceError::Upstream {
                provider, message, ..
            } => Self {
                provider,
                cause: message,
            },
            other => Self::new("unknown", other.to_string()),
        }
    }
}

/// Truncate a cause string to [`CAUSE_LIMIT`] characters on a char boundary.
fn truncate_cause(cause: &str) -> String {
    if cause.chars().count() <= CAUSE_LIMIT {
        cause.to_string()
    } else {
        let truncated: String = cause.chars().take(CAUSE_LIMIT).collect();
        format!("{truncated}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_truncates_cause() {
        let long_body = "x".repeat(1000);
        let err = RaceError::upstream("groq", long_body, Some(500));

        if let RaceError::Upstream { message, .. } = err {
            assert!(message.chars().count() <= CAUSE_LIMIT + 1);
            assert!(message.ends_with('…'));
        } else {
            panic!("expected upstream error");
        }
    }

    #[test]
    fn test_short_cause_unchanged() {
        let failure = RaceFailure::new("openai", "HTTP 429: rate limited");
        assert_eq!(failure.cause, "HTTP 429: rate limited");
    }

    #[test]
    fn test_failure_from_upstream_error() {
        let err = RaceError::upstream("gemini", "bad key", Some(401));
        let failure = RaceFailure::from(err);

        assert_eq!(failure.provider, "gemini");
        assert_eq!(failure.cause, "bad key");
    }

    #[test]
    fn test_failure_classes() {
        assert_eq!(
            RaceError::configuration("no keys").failure_class(),
            "configuration_error"
        );
        assert_eq!(
            RaceError::AllProvidersFailed { failures: vec![] }.failure_class(),
            "all_providers_failed"
        );
        assert_eq!(
            RaceError::Timeout {
                elapsed: Duration::from_secs(30),
                failures: vec![],
            }
            .failure_class(),
            "race_timeout"
        );
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        let cause = "é".repeat(300);
        let truncated = truncate_cause(&cause);
        assert_eq!(truncated.chars().count(), CAUSE_LIMIT + 1);
    }
}
