//! Core domain types for Parley.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Conversation Types
// ============================================================================

/// Speaker role of a conversation turn, as understood by the completion API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One role-tagged message unit.
///
/// Serializes to the `{role, content}` shape the chat completions endpoint
/// expects, so a slice of turns can be sent as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    content: String,
}

impl Turn {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Builds a turn whose content carries the speaker and time inline:
    /// `"<speaker> (<timestamp>): <text>"`.
    #[must_use]
    pub fn spoken(role: Role, speaker: &str, at: DateTime<Utc>, text: &str) -> Self {
        Self::new(role, format!("{speaker} ({}): {text}", format_timestamp(at)))
    }

    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// ISO-8601 with microseconds and an explicit `+00:00` offset.
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, false)
}

// ============================================================================
// Transport Types
// ============================================================================

/// A message received from the chat transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Stable identity of the author (used to recognise the bot's own messages).
    pub author_id: String,
    /// Human-readable name; this is the key facts are stored under.
    pub author_name: String,
    pub channel: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// API Key Types
// ============================================================================

/// Bearer token for the completion API.
///
/// Note: `Debug` is manually implemented to redact the key value, preventing accidental
/// credential disclosure in logs or error messages.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ApiKey(<redacted>)")
    }
}

impl ApiKey {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Sampling Parameters
// ============================================================================

/// Model selection and sampling knobs sent with every completion request.
///
/// Penalties are optional: the librarian never sends them, the chat path does.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SamplingParams {
    pub model: String,
    pub temperature: f64,
    pub top_p: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
}

impl SamplingParams {
    #[must_use]
    pub fn new(model: impl Into<String>, temperature: f64, top_p: f64) -> Self {
        Self {
            model: model.into(),
            temperature,
            top_p,
            presence_penalty: None,
            frequency_penalty: None,
        }
    }

    #[must_use]
    pub fn with_penalties(mut self, presence: f64, frequency: f64) -> Self {
        self.presence_penalty = Some(presence);
        self.frequency_penalty = Some(frequency);
        self
    }
}

// ============================================================================
// Typing Indicator
// ============================================================================

/// When the chat pipeline shows a typing indicator during a completion call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypingPolicy {
    /// Only if the call is still running after a short deadline.
    #[default]
    Delayed,
    /// Immediately, held for at least a minimum duration.
    Always,
}

impl TypingPolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TypingPolicy::Delayed => "delayed",
            TypingPolicy::Always => "always",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
