//! Token counting using tiktoken.
//!
//! The encoding is chosen from the model name: `gpt-4o`/`o1` style models use
//! `o200k_base`, `gpt-3.5`/`gpt-4` use `cl100k_base`, older completion models use
//! the `p50k`/`r50k` families. Unrecognized models fall back to `cl100k_base`.
//!
//! Counts are for message *content* only. Per-message role overhead is not
//! included; the window budget is defined over content tokens.

use std::sync::OnceLock;

use tiktoken_rs::tokenizer::{Tokenizer, get_tokenizer};
use tiktoken_rs::{CoreBPE, cl100k_base, o200k_base, p50k_base, p50k_edit, r50k_base};

/// The encoding used when the model is unknown.
pub const DEFAULT_ENCODING: Encoding = Encoding::Cl100k;

/// Something that can price a span of text in tokens.
///
/// The window is generic over this so budgets can be exercised with fixed costs.
pub trait CountTokens {
    fn count(&self, text: &str) -> u32;
}

/// tiktoken encodings supported by the counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    O200k,
    Cl100k,
    P50k,
    P50kEdit,
    R50k,
}

impl Encoding {
    /// Resolve the encoding for a model name, falling back to [`DEFAULT_ENCODING`].
    #[must_use]
    pub fn for_model(model: &str) -> Self {
        match get_tokenizer(model) {
            Some(Tokenizer::O200kBase) => Encoding::O200k,
            Some(Tokenizer::Cl100kBase) => Encoding::Cl100k,
            Some(Tokenizer::P50kBase) => Encoding::P50k,
            Some(Tokenizer::P50kEdit) => Encoding::P50kEdit,
            Some(Tokenizer::R50kBase | Tokenizer::Gpt2) => Encoding::R50k,
            _ => DEFAULT_ENCODING,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Encoding::O200k => "o200k_base",
            Encoding::Cl100k => "cl100k_base",
            Encoding::P50k => "p50k_base",
            Encoding::P50kEdit => "p50k_edit",
            Encoding::R50k => "r50k_base",
        }
    }

    /// Each encoder loads its vocabulary once per process and is shared by
    /// every counter using it.
    fn encoder(self) -> Option<&'static CoreBPE> {
        static O200K: OnceLock<Option<CoreBPE>> = OnceLock::new();
        static CL100K: OnceLock<Option<CoreBPE>> = OnceLock::new();
        static P50K: OnceLock<Option<CoreBPE>> = OnceLock::new();
        static P50K_EDIT: OnceLock<Option<CoreBPE>> = OnceLock::new();
        static R50K: OnceLock<Option<CoreBPE>> = OnceLock::new();

        let cell = match self {
            Encoding::O200k => O200K.get_or_init(|| o200k_base().ok()),
            Encoding::Cl100k => CL100K.get_or_init(|| cl100k_base().ok()),
            Encoding::P50k => P50K.get_or_init(|| p50k_base().ok()),
            Encoding::P50kEdit => P50K_EDIT.get_or_init(|| p50k_edit().ok()),
            Encoding::R50k => R50K.get_or_init(|| r50k_base().ok()),
        };
        cell.as_ref()
    }
}

/// Thread-safe token counter bound to one model's encoding.
///
/// # Example
///
/// ```
/// use parley_context::TokenCounter;
///
/// let counter = TokenCounter::for_model("gpt-3.5-turbo");
/// let tokens = counter.count_str("Hello, world!");
/// assert!(tokens > 0);
/// ```
#[derive(Clone, Copy)]
pub struct TokenCounter {
    encoding: Encoding,
    encoder: Option<&'static CoreBPE>,
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCounter")
            .field("encoding", &self.encoding.as_str())
            .field("encoder", &self.encoder.as_ref().map(|_| "<CoreBPE>"))
            .finish()
    }
}

impl TokenCounter {
    #[must_use]
    pub fn for_model(model: &str) -> Self {
        Self::with_encoding(Encoding::for_model(model))
    }

    #[must_use]
    pub fn with_encoding(encoding: Encoding) -> Self {
        let encoder = encoding.encoder();
        if encoder.is_none() {
            tracing::error!(
                encoding = encoding.as_str(),
                "Failed to initialize tiktoken encoder. Falling back to byte-length estimates."
            );
        }

        Self { encoding, encoder }
    }

    #[must_use]
    pub const fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Counts the number of tokens in a string.
    #[must_use]
    pub fn count_str(&self, text: &str) -> u32 {
        let len = match self.encoder {
            Some(encoder) => encoder.encode_ordinary(text).len(),
            None => text.len(),
        };

        u32::try_from(len).unwrap_or(u32::MAX)
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::with_encoding(DEFAULT_ENCODING)
    }
}

impl CountTokens for TokenCounter {
    fn count(&self, text: &str) -> u32 {
        self.count_str(text)
    }
}

/// Token cost of `text` under `model`'s encoding.
#[must_use]
pub fn count_tokens(text: &str, model: &str) -> u32 {
    TokenCounter::for_model(model).count_str(text)
}
