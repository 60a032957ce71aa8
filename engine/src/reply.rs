//! Shaping completion output into channel messages.

/// Largest message the channel accepts, in characters.
pub const MAX_CHUNK_CHARS: usize = 2000;

/// Sent in place of a reply when the completion call gives up.
pub const APOLOGY: &str =
    "I'm sorry, I'm experiencing some technical difficulties at the moment. Please try again later.";

/// Command that returns the fact report instead of a completion.
pub const FACTS_COMMAND: &str = "!facts";

/// Remove a speaker prefix the model copied from the transcript format.
///
/// Everything up to and including the first `"):"` is dropped; text without
/// that marker only loses its leading whitespace.
#[must_use]
pub fn strip_reply_prefix(text: &str) -> &str {
    match text.find("):") {
        Some(index) => &text[index + 2..],
        None => text.trim_start(),
    }
}

/// Split `text` into consecutive pieces of at most `max_chars` characters.
///
/// Splits fall on `char` boundaries, so concatenating the chunks gives back
/// `text` exactly. Empty input yields no chunks.
#[must_use]
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<&str> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    for (n, (index, _)) in text.char_indices().enumerate() {
        if n > 0 && n % max_chars == 0 {
            chunks.push(&text[start..index]);
            start = index;
        }
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }

    chunks
}
