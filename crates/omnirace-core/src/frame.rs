//! Canonical stream units.
//!
//! Adapters normalize every provider's native wire format into a stream of
//! [`TextDelta`] values; the response streamer re-frames those into
//! [`StreamFrame`] envelopes for the client. The envelope itself is the
//! client's parsing unit — no SSE framing is layered on top.

use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::RaceError;

/// A provider-agnostic stream of text deltas.
pub type DeltaStream = BoxStream<'static, Result<TextDelta, RaceError>>;

/// Kind of text carried by a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaKind {
    /// Regular completion text
    #[default]
    Content,
    /// Model reasoning, surfaced as a distinctly tagged segment
    Reasoning,
}

/// One normalized text delta from an upstream provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDelta {
    /// The text fragment
    pub text: String,
    /// Content or reasoning
    pub kind: DeltaKind,
}

impl TextDelta {
    /// Create a content delta.
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: DeltaKind::Content,
        }
    }

    /// Create a reasoning delta.
    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: DeltaKind::Reasoning,
        }
    }
}

/// The JSON envelope written to the client for each outgoing frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamFrame {
    /// Frame text
    pub text: String,

    /// Winning provider name
    pub provider: String,

    /// Masked credential identifier
    #[serde(rename = "keyId")]
    pub key_id: String,

    /// Time the frame was produced
    pub timestamp: DateTime<Utc>,

    /// Set on the single terminal envelope emitted after a mid-stream failure
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub error: bool,

    /// Tag for reasoning segments; absent for regular content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<DeltaKind>,
}

impl StreamFrame {
    /// Create a frame for a text segment.
    #[must_use]
    pub fn text(text: String, provider: &str, key_id: &str, kind: DeltaKind) -> Self {
        Self {
            text,
            provider: provider.to_string(),
            key_id: key_id.to_string(),
            timestamp: Utc::now(),
            error: false,
            kind: match kind {
                DeltaKind::Content => None,
                DeltaKind::Reasoning => Some(DeltaKind::Reasoning),
            },
        }
    }

    /// Create the terminal envelope emitted after a mid-stream interruption.
    #[must_use]
    pub fn interrupted(provider: &str, key_id: &str) -> Self {
        Self {
            text: "[Connection Interrupted]".to_string(),
            provider: provider.to_string(),
            key_id: key_id.to_string(),
            timestamp: Utc::now(),
            error: true,
            kind: None,
        }
    }
}
