//! Chat orchestration for Parley.
//!
//! This crate wires the conversation window, the fact reader, and a completion
//! client into the per-message pipeline. The transport is abstracted behind
//! [`ChatChannel`].

mod channel;
mod orchestrator;
mod reply;
mod typing;

pub use channel::{ChatChannel, MessageFilter};
pub use orchestrator::{ChatOrchestrator, ChatSettings, DEFAULT_MESSAGE_INTERVAL, HandleOutcome};
pub use reply::{APOLOGY, FACTS_COMMAND, MAX_CHUNK_CHARS, chunk_text, strip_reply_prefix};
pub use typing::{DEFAULT_MIN_TYPING, DEFAULT_TYPING_DEADLINE, TypingTiming, with_typing};

pub use parley_context;
pub use parley_providers;
pub use parley_types;
