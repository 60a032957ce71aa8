//! Line-based console transport.
//!
//! Each stdin line `name: text` becomes an inbound message from `name` on the
//! configured channel. Replies are printed as `bot: text`.

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use anyhow::Context;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

use parley_engine::ChatChannel;
use parley_engine::parley_types::InboundMessage;

/// Console users have no numeric ids; the display name doubles as one.
#[must_use]
pub fn author_id(name: &str) -> String {
    format!("console:{name}")
}

/// Parse one `name: text` line. Blank names or texts are rejected.
#[must_use]
pub fn parse_line(line: &str, channel: &str, now: DateTime<Utc>) -> Option<InboundMessage> {
    let (name, text) = line.split_once(':')?;
    let (name, text) = (name.trim(), text.trim());
    if name.is_empty() || text.is_empty() {
        return None;
    }

    Some(InboundMessage {
        author_id: author_id(name),
        author_name: name.to_string(),
        channel: channel.to_string(),
        content: text.to_string(),
        created_at: now,
    })
}

/// Forward lines from `input` until EOF. Dropping `inbox` on return closes
/// the chat pipeline's queue.
pub async fn forward_lines<R>(
    input: R,
    inbox: mpsc::UnboundedSender<InboundMessage>,
    channel: &str,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await.context("failed to read console input")? {
        if line.trim().is_empty() {
            continue;
        }
        let Some(message) = parse_line(&line, channel, Utc::now()) else {
            tracing::warn!("Expected `name: text`, ignoring line");
            continue;
        };
        if inbox.send(message).is_err() {
            tracing::warn!("Chat pipeline stopped; no longer reading input");
            break;
        }
    }
    tracing::info!("Console input closed");
    Ok(())
}

/// Writes the bot's side of the conversation.
pub struct ConsoleChannel<W> {
    bot_name: String,
    out: Mutex<W>,
}

impl<W: Write + Send> ConsoleChannel<W> {
    pub fn new(bot_name: impl Into<String>, out: W) -> Self {
        Self {
            bot_name: bot_name.into(),
            out: Mutex::new(out),
        }
    }

    fn write_line(&self, line: &str) -> anyhow::Result<()> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(out, "{line}").context("failed to write to console")?;
        out.flush().context("failed to flush console")?;
        Ok(())
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> ChatChannel for ConsoleChannel<W> {
    async fn send(&self, text: &str) -> anyhow::Result<()> {
        self.write_line(&format!("{}: {text}", self.bot_name))
    }

    async fn typing(&self) -> anyhow::Result<()> {
        self.write_line(&format!("{} is typing...", self.bot_name))
    }
}
