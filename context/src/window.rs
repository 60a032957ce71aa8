//! Token-budgeted conversation window.
//!
//! The window is the active context sent to the completion API. Turns are kept
//! in insertion order and evicted oldest-first until the summed token cost fits
//! the budget. A turn is never truncated: when the newest turn alone exceeds the
//! budget it stays as the sole remainder.

use std::collections::VecDeque;

use parley_types::Turn;

use crate::token_counter::{CountTokens, TokenCounter};

#[derive(Debug, Clone)]
struct WindowEntry {
    turn: Turn,
    token_count: u32,
}

/// Ordered, FIFO-evictable history of turns.
#[derive(Debug, Clone)]
pub struct ConversationWindow<C = TokenCounter> {
    entries: VecDeque<WindowEntry>,
    counter: C,
}

impl<C: CountTokens> ConversationWindow<C> {
    #[must_use]
    pub fn new(counter: C) -> Self {
        Self {
            entries: VecDeque::new(),
            counter,
        }
    }

    /// Append a turn at the newest end. Callers must follow up with
    /// [`enforce_budget`](Self::enforce_budget) before building a prompt.
    pub fn append(&mut self, turn: Turn) {
        let token_count = self.counter.count(turn.content());
        self.entries.push_back(WindowEntry { turn, token_count });
    }

    /// Evict oldest turns until the total token cost is at most `max_tokens`.
    ///
    /// Returns the number of turns evicted.
    pub fn enforce_budget(&mut self, max_tokens: u32) -> usize {
        let budget = u64::from(max_tokens);
        let mut total = self.total_tokens();
        let mut evicted = 0;

        while total > budget && self.entries.len() > 1 {
            let Some(oldest) = self.entries.pop_front() else {
                break;
            };
            total -= u64::from(oldest.token_count);
            evicted += 1;
        }

        if evicted > 0 {
            tracing::debug!(evicted, total_tokens = total, max_tokens, "Evicted turns to fit budget");
        }
        if total > budget {
            tracing::warn!(
                total_tokens = total,
                max_tokens,
                "Single remaining turn exceeds the token budget"
            );
        }

        evicted
    }

    /// Remove and return the oldest turn.
    pub fn evict_oldest(&mut self) -> Option<Turn> {
        self.entries.pop_front().map(|entry| entry.turn)
    }

    /// Copy of the current turns, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Turn> {
        self.entries.iter().map(|entry| entry.turn.clone()).collect()
    }

    /// Sum of the token costs of every turn in the window.
    #[must_use]
    pub fn total_tokens(&self) -> u64 {
        self.entries
            .iter()
            .map(|entry| u64::from(entry.token_count))
            .sum()
    }

    #[must_use]
    pub fn last(&self) -> Option<&Turn> {
        self.entries.back().map(|entry| &entry.turn)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ConversationWindow<TokenCounter> {
    fn default() -> Self {
        Self::new(TokenCounter::default())
    }
}
