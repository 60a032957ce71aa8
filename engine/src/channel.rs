//! The chat transport seam.

use std::future::Future;

use parley_types::InboundMessage;

/// Outbound side of a chat transport: one fixed channel.
///
/// Implementations must be cheap to call concurrently with a completion
/// request; the typing indicator is fired while a call is in flight.
pub trait ChatChannel: Send + Sync {
    /// Post one message (at most [`MAX_CHUNK_CHARS`](crate::MAX_CHUNK_CHARS) characters).
    fn send(&self, text: &str) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Show the typing indicator.
    fn typing(&self) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Decides which inbound messages the bot responds to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFilter {
    bot_id: String,
    channel: String,
}

impl MessageFilter {
    #[must_use]
    pub fn new(bot_id: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            bot_id: bot_id.into(),
            channel: channel.into(),
        }
    }

    /// Not the bot's own message, and posted in the designated channel.
    #[must_use]
    pub fn accepts(&self, message: &InboundMessage) -> bool {
        message.author_id != self.bot_id && message.channel == self.channel
    }

    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }
}
