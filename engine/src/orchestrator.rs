//! Per-message chat pipeline.
//!
//! ```text
//! inbound ─> filter ─> !facts? ──────────────────────────────> report
//!                  └─> append user turn ─> notify librarian
//!                      ─> enforce budget ─> inject facts
//!                      ─> [system] + window ─> complete (typing policy)
//!                      ─> strip ─> chunk ─> send + append each chunk
//!                                        └─ on failure: apology
//! ```
//!
//! The orchestrator is the only owner of the conversation window. Messages are
//! handled one at a time in arrival order.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use parley_context::{
    ConversationWindow, CountTokens, FactReader, LibrarianHandle, TokenCounter, fact_turn,
};
use parley_providers::ChatCompletion;
use parley_types::{InboundMessage, Role, SamplingParams, Turn, TypingPolicy};

use crate::channel::{ChatChannel, MessageFilter};
use crate::reply::{APOLOGY, FACTS_COMMAND, MAX_CHUNK_CHARS, chunk_text, strip_reply_prefix};
use crate::typing::{TypingTiming, with_typing};

pub const DEFAULT_MESSAGE_INTERVAL: Duration = Duration::from_secs(1);

/// Everything the chat pipeline needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    /// Name recorded on the bot's own turns.
    pub bot_name: String,
    pub system_message: String,
    pub params: SamplingParams,
    /// Token budget for the conversation window.
    pub max_tokens: u32,
    /// Pause after each handled message.
    pub message_interval: Duration,
    pub typing: TypingPolicy,
    pub typing_timing: TypingTiming,
}

impl ChatSettings {
    #[must_use]
    pub fn new(
        bot_name: impl Into<String>,
        system_message: impl Into<String>,
        params: SamplingParams,
        max_tokens: u32,
    ) -> Self {
        Self {
            bot_name: bot_name.into(),
            system_message: system_message.into(),
            params,
            max_tokens,
            message_interval: DEFAULT_MESSAGE_INTERVAL,
            typing: TypingPolicy::default(),
            typing_timing: TypingTiming::default(),
        }
    }
}

/// What [`ChatOrchestrator::handle`] did with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    /// Own message or wrong channel.
    Ignored,
    /// `!facts` answered from the fact store.
    FactsReport,
    /// Completion succeeded; `chunks` messages were sent.
    Replied { chunks: usize },
    /// Completion gave up; the apology was sent.
    Apologized,
}

pub struct ChatOrchestrator<C, O, K = TokenCounter> {
    client: C,
    channel: O,
    filter: MessageFilter,
    settings: ChatSettings,
    window: ConversationWindow<K>,
    facts: FactReader,
    librarian: Option<LibrarianHandle>,
}

impl<C, O, K> std::fmt::Debug for ChatOrchestrator<C, O, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatOrchestrator")
            .field("filter", &self.filter)
            .field("settings", &self.settings)
            .field("librarian_attached", &self.librarian.is_some())
            .finish_non_exhaustive()
    }
}

impl<C, O> ChatOrchestrator<C, O, TokenCounter>
where
    C: ChatCompletion,
    O: ChatChannel,
{
    /// Window token costs use the chat model's encoding.
    #[must_use]
    pub fn new(
        client: C,
        channel: O,
        filter: MessageFilter,
        settings: ChatSettings,
        facts: FactReader,
    ) -> Self {
        let counter = TokenCounter::for_model(&settings.params.model);
        Self::with_counter(client, channel, filter, settings, facts, counter)
    }
}

impl<C, O, K> ChatOrchestrator<C, O, K>
where
    C: ChatCompletion,
    O: ChatChannel,
    K: CountTokens,
{
    #[must_use]
    pub fn with_counter(
        client: C,
        channel: O,
        filter: MessageFilter,
        settings: ChatSettings,
        facts: FactReader,
        counter: K,
    ) -> Self {
        Self {
            client,
            channel,
            filter,
            settings,
            window: ConversationWindow::new(counter),
            facts,
            librarian: None,
        }
    }

    /// Publish a window snapshot to this librarian after every user turn.
    #[must_use]
    pub fn with_librarian(mut self, librarian: LibrarianHandle) -> Self {
        self.librarian = Some(librarian);
        self
    }

    #[must_use]
    pub fn window(&self) -> &ConversationWindow<K> {
        &self.window
    }

    #[must_use]
    pub fn channel(&self) -> &O {
        &self.channel
    }

    /// Run one inbound message through the pipeline.
    ///
    /// Errors come only from the channel; window changes made before the
    /// failure are kept.
    pub async fn handle(&mut self, message: &InboundMessage) -> anyhow::Result<HandleOutcome> {
        if !self.filter.accepts(message) {
            return Ok(HandleOutcome::Ignored);
        }

        if message.content.trim() == FACTS_COMMAND {
            self.send_facts_report().await?;
            return Ok(HandleOutcome::FactsReport);
        }

        let user_turn = Turn::spoken(
            Role::User,
            &message.author_name,
            message.created_at,
            &message.content,
        );
        tracing::debug!(content = user_turn.content(), "Received message");
        self.window.append(user_turn);
        self.publish_snapshot();

        self.window.enforce_budget(self.settings.max_tokens);
        self.inject_facts(&message.author_name);
        tracing::debug!(
            turns = self.window.len(),
            total_tokens = self.window.total_tokens(),
            "Current window"
        );

        let prompt = self.build_prompt();
        let result = with_typing(
            &self.channel,
            self.settings.typing,
            self.settings.typing_timing,
            self.client.complete(&prompt, &self.settings.params),
        )
        .await;

        match result {
            Ok(completion) => {
                let chunks = self.deliver_reply(&completion.content).await?;
                Ok(HandleOutcome::Replied { chunks })
            }
            Err(exhausted) => {
                tracing::warn!(
                    attempts = exhausted.attempts,
                    error = %exhausted.last,
                    "Completion failed; sending apology"
                );
                self.channel.send(APOLOGY).await?;
                Ok(HandleOutcome::Apologized)
            }
        }
    }

    async fn send_facts_report(&self) -> anyhow::Result<()> {
        let report = self.facts.get_all();
        for chunk in chunk_text(&report, MAX_CHUNK_CHARS) {
            self.channel.send(chunk).await?;
        }
        Ok(())
    }

    fn publish_snapshot(&mut self) {
        let Some(librarian) = &self.librarian else {
            return;
        };
        if !librarian.notify(self.window.snapshot()) {
            tracing::warn!("Librarian has stopped; no longer publishing snapshots");
            self.librarian = None;
        }
    }

    /// Append the sender's facts unless the newest turn already carries them.
    fn inject_facts(&mut self, username: &str) {
        let facts = self.facts.get_for_user(username);
        let Some(turn) = fact_turn(username, &facts) else {
            return;
        };
        if self.window.last() == Some(&turn) {
            return;
        }
        tracing::debug!(username, facts = facts.len(), "Injecting facts");
        self.window.append(turn);
        self.window.enforce_budget(self.settings.max_tokens);
    }

    fn build_prompt(&self) -> Vec<Turn> {
        let mut prompt = Vec::with_capacity(self.window.len() + 1);
        prompt.push(Turn::system(self.settings.system_message.as_str()));
        prompt.extend(self.window.snapshot());
        prompt
    }

    async fn deliver_reply(&mut self, content: &str) -> anyhow::Result<usize> {
        let reply = strip_reply_prefix(content);
        let chunks = chunk_text(reply, MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            tracing::warn!("Completion produced an empty reply; nothing sent");
        }

        for chunk in &chunks {
            self.channel.send(chunk).await?;
            tracing::debug!(chars = chunk.chars().count(), "Posted reply chunk");
            self.window.append(Turn::spoken(
                Role::Assistant,
                &self.settings.bot_name,
                Utc::now(),
                chunk,
            ));
        }
        self.window.enforce_budget(self.settings.max_tokens);

        Ok(chunks.len())
    }

    /// Handle messages until every sender is dropped, pausing
    /// `message_interval` after each handled message.
    ///
    /// Dropping the orchestrator at the end also drops its librarian handle.
    pub async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<InboundMessage>) {
        tracing::info!(channel = self.filter.channel(), "Chat pipeline started");
        while let Some(message) = inbox.recv().await {
            match self.handle(&message).await {
                Ok(HandleOutcome::Ignored) => continue,
                Ok(outcome) => tracing::debug!(?outcome, "Handled message"),
                Err(err) => tracing::warn!("Failed to deliver to channel: {err:#}"),
            }
            if !self.settings.message_interval.is_zero() {
                tokio::time::sleep(self.settings.message_interval).await;
            }
        }
        tracing::info!("Inbound queue closed; chat pipeline stopping");
    }
}

impl<C, O, K> ChatOrchestrator<C, O, K>
where
    C: ChatCompletion + 'static,
    O: ChatChannel + 'static,
    K: CountTokens + Send + Sync + 'static,
{
    /// Spawn [`run`](Self::run) on the current runtime. Returns the inbound queue.
    pub fn spawn(self) -> (mpsc::UnboundedSender<InboundMessage>, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(rx));
        (tx, task)
    }
}
