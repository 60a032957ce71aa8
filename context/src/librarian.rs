//! The Librarian - background fact extraction.
//!
//! The Librarian watches the conversation through snapshots published by the
//! chat pipeline. Every `batch_size` notifications it sends the latest
//! (filtered) snapshot to a completion model with an extraction prompt, parses
//! lines of the form `user:<username>:<fact>`, and merges them into its
//! [`FactStore`]. The chat pipeline reads those facts back through a
//! [`FactReader`] and injects them into future prompts.
//!
//! ```text
//! Idle ──(N-th snapshot)──> Extracting ──(parsed | dropped)──> Idle
//! ```
//!
//! The Librarian runs as its own task and never blocks the chat path. A failed
//! extraction drops the batch: no partial facts, counters reset.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use parley_providers::ChatCompletion;
use parley_types::{Role, SamplingParams, Turn};

use crate::fact_store::{FactEntry, FactReader, FactStore};

pub const DEFAULT_BATCH_SIZE: usize = 3;
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Leading text of an injected fact turn: `Facts about <username>:`.
pub const FACT_TURN_PREFIX: &str = "Facts about ";

/// Prefix of an extracted fact line.
const FACT_LINE_PREFIX: &str = "user:";

/// Extraction prompt loaded from assets/extraction_prompt.md
const EXTRACTION_PROMPT: &str = include_str!("../assets/extraction_prompt.md");

const EXTRACTION_REQUEST_HEADER: &str = "Extract facts from this conversation:\n\n";

/// Format a user's facts as the body of a fact-injection turn.
#[must_use]
pub fn format_facts_for_context(username: &str, facts: &[String]) -> String {
    format!("{FACT_TURN_PREFIX}{username}:\n{}", facts.join("\n"))
}

/// Synthetic assistant turn carrying a user's facts, or `None` if there are none.
#[must_use]
pub fn fact_turn(username: &str, facts: &[String]) -> Option<Turn> {
    if facts.is_empty() {
        return None;
    }
    Some(Turn::assistant(format_facts_for_context(username, facts)))
}

/// True for assistant turns produced by [`fact_turn`].
#[must_use]
pub fn is_fact_turn(turn: &Turn) -> bool {
    turn.role() == Role::Assistant
        && turn
            .content()
            .strip_prefix(FACT_TURN_PREFIX)
            .and_then(|rest| rest.lines().next())
            .is_some_and(|header| header.len() > 1 && header.ends_with(':'))
}

/// Drop fact-injection turns so the Librarian never re-extracts its own output.
#[must_use]
pub fn filter_fact_turns(snapshot: Vec<Turn>) -> Vec<Turn> {
    snapshot
        .into_iter()
        .filter(|turn| !is_fact_turn(turn))
        .collect()
}

/// Build the system + user messages for one extraction call.
#[must_use]
pub fn build_extraction_prompt(turns: &[Turn]) -> Vec<Turn> {
    let transcript: Vec<&str> = turns.iter().map(Turn::content).collect();
    vec![
        Turn::system(EXTRACTION_PROMPT),
        Turn::user(format!("{EXTRACTION_REQUEST_HEADER}{}", transcript.join("\n"))),
    ]
}

/// Parse `user:<username>:<fact>` lines. Anything else is ignored.
#[must_use]
pub fn parse_extracted_facts(text: &str) -> Vec<FactEntry> {
    text.lines()
        .filter_map(|line| {
            let rest = line.trim().strip_prefix(FACT_LINE_PREFIX)?;
            let (username, fact) = rest.split_once(':')?;
            let (username, fact) = (username.trim(), fact.trim());
            if username.is_empty() || fact.is_empty() {
                return None;
            }
            Some(FactEntry::new(username, fact))
        })
        .collect()
}

/// Librarian tuning.
#[derive(Debug, Clone)]
pub struct LibrarianSettings {
    /// Model and sampling used for extraction calls.
    pub params: SamplingParams,
    /// Snapshot notifications to wait for before extracting.
    pub batch_size: usize,
    /// Pause after each extraction before reading the inbox again.
    pub settle_delay: Duration,
}

impl LibrarianSettings {
    #[must_use]
    pub fn new(params: SamplingParams) -> Self {
        Self {
            params,
            batch_size: DEFAULT_BATCH_SIZE,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

/// What happened to one snapshot notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Below the threshold; `notifications` seen so far in this batch.
    Accumulating { notifications: usize },
    /// Extraction ran; `parsed` lines were found, `added` of them were new.
    Extracted { parsed: usize, added: usize },
    /// Extraction failed or there was nothing to extract; batch discarded.
    Dropped,
}

/// Sending side of the Librarian inbox. Cloneable and never blocks.
#[derive(Debug, Clone)]
pub struct LibrarianHandle {
    tx: mpsc::UnboundedSender<Vec<Turn>>,
}

impl LibrarianHandle {
    /// A handle plus the inbox it feeds, for driving [`Librarian::run`] directly.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Vec<Turn>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Publish a conversation snapshot. Returns `false` if the Librarian has stopped.
    pub fn notify(&self, snapshot: Vec<Turn>) -> bool {
        self.tx.send(snapshot).is_ok()
    }
}

/// Background fact extractor. Sole writer of its [`FactStore`].
pub struct Librarian<C> {
    client: C,
    settings: LibrarianSettings,
    store: FactStore,
    pending: Vec<Turn>,
    notifications: usize,
}

impl<C> std::fmt::Debug for Librarian<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Librarian")
            .field("settings", &self.settings)
            .field("notifications", &self.notifications)
            .field("pending_turns", &self.pending.len())
            .field("fact_count", &self.store.fact_count())
            .finish_non_exhaustive()
    }
}

impl<C: ChatCompletion> Librarian<C> {
    #[must_use]
    pub fn new(client: C, settings: LibrarianSettings) -> Self {
        Self::with_store(client, settings, FactStore::new())
    }

    #[must_use]
    pub fn with_store(client: C, settings: LibrarianSettings, store: FactStore) -> Self {
        Self {
            client,
            settings,
            store,
            pending: Vec::new(),
            notifications: 0,
        }
    }

    /// Read handle for the chat pipeline.
    #[must_use]
    pub fn reader(&self) -> FactReader {
        self.store.reader()
    }

    #[must_use]
    pub fn store(&self) -> &FactStore {
        &self.store
    }

    /// Record one snapshot notification, extracting once the batch is full.
    pub async fn observe(&mut self, snapshot: Vec<Turn>) -> BatchOutcome {
        self.notifications += 1;
        self.pending = filter_fact_turns(snapshot);

        if self.notifications < self.settings.batch_size.max(1) {
            return BatchOutcome::Accumulating {
                notifications: self.notifications,
            };
        }

        let batch = std::mem::take(&mut self.pending);
        self.notifications = 0;
        self.extract(&batch).await
    }

    async fn extract(&mut self, batch: &[Turn]) -> BatchOutcome {
        if batch.is_empty() {
            tracing::debug!("Librarian batch empty after filtering; skipping extraction");
            return BatchOutcome::Dropped;
        }

        let messages = build_extraction_prompt(batch);
        let completion = match self.client.complete(&messages, &self.settings.params).await {
            Ok(completion) => completion,
            Err(exhausted) => {
                tracing::warn!(
                    attempts = exhausted.attempts,
                    error = %exhausted.last,
                    "Couldn't extract facts from the conversation; dropping batch"
                );
                return BatchOutcome::Dropped;
            }
        };

        let entries = parse_extracted_facts(&completion.content);
        let parsed = entries.len();
        let added = self.store.merge(entries);
        tracing::info!(
            turns = batch.len(),
            parsed,
            added,
            total = self.store.fact_count(),
            "Librarian extracted facts"
        );

        BatchOutcome::Extracted { parsed, added }
    }

    /// Consume snapshots until every [`LibrarianHandle`] is dropped.
    ///
    /// Returns the store so callers can inspect what was learned.
    pub async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Vec<Turn>>) -> FactStore {
        tracing::debug!("Starting librarian loop");
        while let Some(snapshot) = inbox.recv().await {
            let outcome = self.observe(snapshot).await;
            if !matches!(outcome, BatchOutcome::Accumulating { .. })
                && !self.settings.settle_delay.is_zero()
            {
                tokio::time::sleep(self.settings.settle_delay).await;
            }
        }
        tracing::debug!("Librarian inbox closed");
        self.store
    }
}

impl<C: ChatCompletion + 'static> Librarian<C> {
    /// Spawn the Librarian on the current tokio runtime.
    pub fn spawn(self) -> (LibrarianHandle, JoinHandle<FactStore>) {
        let (handle, inbox) = LibrarianHandle::channel();
        let task = tokio::spawn(self.run(inbox));
        (handle, task)
    }
}
