use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Conversation message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    /// Any role the relay does not act on (`tool`, `data`, ...).
    #[serde(other)]
    Other,
}

/// One entry of the client's conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
}

impl ConversationMessage {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
        }
    }
}

/// Inbound chat request body. Fields other than `messages` are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ConversationMessage>,
}

/// Payload sent to the agent backend's streaming endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendRequest {
    pub message: String,
}

/// Decode the inbound JSON body.
///
/// # Errors
///
/// Returns [`RelayError::InvalidRequest`] when the body is not a JSON object
/// with a `messages` array of `{role, content}` entries.
pub fn parse_chat_request(body: &[u8]) -> Result<ChatRequest, RelayError> {
    serde_json::from_slice(body).map_err(|e| RelayError::InvalidRequest(e.to_string()))
}

/// Build the backend payload from the most recent user-authored message.
///
/// # Errors
///
/// Returns [`RelayError::Validation`] when there is no `user` message or the
/// last one has empty content.
pub fn extract_backend_request(
    messages: &[ConversationMessage],
) -> Result<BackendRequest, RelayError> {
    let content = messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .and_then(|m| m.content.as_deref())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| RelayError::Validation("No user message found.".to_string()))?;

    Ok(BackendRequest {
        message: content.to_string(),
    })
}
