//! Request types for the racing endpoint.

use serde::{Deserialize, Serialize};

use crate::error::RaceError;

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System instructions
    System,
    /// End-user input
    User,
    /// Model output
    Assistant,
}

/// A single chat message, built once per request and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message role
    pub role: MessageRole,
    /// Message text
    pub content: String,
}

impl ChatMessage {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Body of a `POST /v1/race` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RaceRequest {
    /// The user prompt (required)
    pub prompt: String,

    /// Optional system instructions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Optional retrieved context, prepended as an extra system message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl RaceRequest {
    /// Validate the request body.
    ///
    /// # Errors
    /// Returns a configuration error when the prompt is missing or blank.
    pub fn validate(&self) -> Result<(), RaceError> {
        if self.prompt.trim().is_empty() {
            return Err(RaceError::configuration("prompt is required"));
        }
        Ok(())
    }

    /// Assemble the immutable message list sent to every racer.
    ///
    /// Order: system instructions, retrieved context, then the user prompt.
    #[must_use]
    pub fn build_messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(3);

        if let Some(system) = self.system.as_deref().filter(|s| !s.trim().is_empty()) {
            messages.push(ChatMessage::system(system));
        }

        if let Some(context) = self.context.as_deref().filter(|s| !s.trim().is_empty()) {
            messages.push(ChatMessage::system(format!("Context:\n{context}")));
        }

        messages.push(ChatMessage::user(self.prompt.clone()));
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_blank_prompt() {
        let request = RaceRequest {
            prompt: "   ".to_string(),
            ..Default::default()
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_prompt() {
        let request = RaceRequest {
            prompt: "Hello".to_string(),
            ..Default::default()
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_build_messages_prompt_only() {
        let request = RaceRequest {
            prompt: "Hello".to_string(),
            ..Default::default()
        };

        let messages = request.build_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[0].content, "Hello");
    }

    #[test]
    fn test_build_messages_full() {
        let request = RaceRequest {
            prompt: "Hello".to_string(),
            system: Some("Be terse.".to_string()),
            context: Some("The sky is blue.".to_string()),
        };

        let messages = request.build_messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, MessageRole::System);
        assert_eq!(messages[0].content, "Be terse.");
        assert!(messages[1].content.contains("The sky is blue."));
        assert_eq!(messages[2].role, MessageRole::User);
    }

    #[test]
    fn test_blank_system_and_context_skipped() {
        let request = RaceRequest {
            prompt: "Hello".to_string(),
            system: Some(" ".to_string()),
            context: Some(String::new()),
        };

        assert_eq!(request.build_messages().len(), 1);
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_string(&ChatMessage::user("hi")).unwrap();
        assert!(json.contains(r#""role":"user""#));
    }
}
