//! Conversation memory for the chat pipeline.
//!
//! This crate provides:
//! - Token counting via tiktoken
//! - The token-budgeted conversation window
//! - The fact store (single writer, shared readers)
//! - The Librarian, which extracts facts in the background
//!
//! # Architecture
//!
//! ```text
//! ChatOrchestrator
//! ├── window: ConversationWindow (owned, FIFO eviction)
//! ├── facts: FactReader (read-only)
//! └── librarian: LibrarianHandle ──snapshots──> Librarian
//!                                               └── store: FactStore (sole writer)
//! ```

mod fact_store;
mod librarian;
mod token_counter;
mod window;

pub use fact_store::{FactEntry, FactReader, FactStore, NO_FACTS_REPORT};
pub use librarian::{
    BatchOutcome, DEFAULT_BATCH_SIZE, DEFAULT_SETTLE_DELAY, FACT_TURN_PREFIX, Librarian,
    LibrarianHandle, LibrarianSettings, build_extraction_prompt, fact_turn, filter_fact_turns,
    format_facts_for_context, is_fact_turn, parse_extracted_facts,
};
pub use token_counter::{CountTokens, DEFAULT_ENCODING, Encoding, TokenCounter, count_tokens};
pub use window::ConversationWindow;
