//! Typed payloads for the chat completions endpoint.
//!
//! Responses are decoded once, at the client boundary, into
//! [`CompletionPayload`]. Nothing past this module inspects raw JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use parley_types::{SamplingParams, Turn};

/// Error `type` values the server uses for its own transient failures.
const TRANSIENT_ERROR_TYPES: &[&str] = &["server_error"];

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    pub messages: &'a [Turn],
    #[serde(flatten)]
    pub params: &'a SamplingParams,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorInfo,
}

#[derive(Debug, Deserialize)]
struct ErrorInfo {
    #[serde(default, rename = "type")]
    error_type: Option<String>,
}

/// Classification of a decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionPayload {
    /// `choices[0].message.content` was present.
    Success(String),
    /// The server reported one of its own transient errors.
    TransientError(Value),
    /// Neither a result nor a recognised transient error.
    Malformed(Value),
}

impl CompletionPayload {
    #[must_use]
    pub fn classify(payload: Value) -> Self {
        if let Ok(response) = ChatResponse::deserialize(&payload)
            && let Some(choice) = response.choices.into_iter().next()
        {
            return Self::Success(choice.message.content);
        }

        if let Ok(envelope) = ErrorEnvelope::deserialize(&payload)
            && envelope
                .error
                .error_type
                .as_deref()
                .is_some_and(|t| TRANSIENT_ERROR_TYPES.contains(&t))
        {
            return Self::TransientError(payload);
        }

        Self::Malformed(payload)
    }
}
