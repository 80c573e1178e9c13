//! Token accounting for chat completion requests
//!
//! Counts are computed locally with the model's tokenizer, following the
//! chat format convention:
//!
//! ```text
//! 3 + Σ messages (per_message + Σ tokens(field value) [+ per_name if named])
//! ```
//!
//! The trailing 3 tokens prime the assistant reply. Counts are advisory and are
//! only recorded in the call log.

use tiktoken_rs::CoreBPE;

use crate::config::TokenOverheads;
use crate::message::ChatMessage;
use crate::{Error, Result};

/// Tokens the model always consumes to prime its reply
pub const REPLY_PRIMING_TOKENS: usize = 3;

/// Something that can count the tokens of a piece of text
pub trait Tokenizer {
    /// Number of tokens `text` encodes to
    fn count(&self, text: &str) -> usize;
}

/// BPE tokenizer backed by `tiktoken-rs`
pub struct TiktokenTokenizer {
    bpe: CoreBPE,
}

impl TiktokenTokenizer {
    /// Load the tokenizer used by the given model
    pub fn for_model(model: &str) -> Result<Self> {
        let bpe = tiktoken_rs::get_bpe_from_model(model).map_err(|e| {
            Error::Tokenizer(format!("no tokenizer for model '{}': {}", model, e))
        })?;
        Ok(Self { bpe })
    }
}

impl Tokenizer for TiktokenTokenizer {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }
}

impl std::fmt::Debug for TiktokenTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiktokenTokenizer").finish_non_exhaustive()
    }
}

/// Computes request and response token counts
pub struct TokenAccountant {
    tokenizer: Box<dyn Tokenizer>,
    overheads: TokenOverheads,
}

impl TokenAccountant {
    pub fn new(tokenizer: impl Tokenizer + 'static, overheads: TokenOverheads) -> Self {
        Self {
            tokenizer: Box::new(tokenizer),
            overheads,
        }
    }

    /// Build an accountant using the tiktoken encoding of `model`
    pub fn for_model(model: &str, overheads: TokenOverheads) -> Result<Self> {
        Ok(Self::new(TiktokenTokenizer::for_model(model)?, overheads))
    }

    pub fn overheads(&self) -> TokenOverheads {
        self.overheads
    }

    /// Tokens a list of messages occupies when submitted as a request
    pub fn count_messages(&self, messages: &[ChatMessage]) -> usize {
        let body: usize = messages.iter().map(|m| self.count_message(m)).sum();
        body + REPLY_PRIMING_TOKENS
    }

    /// Tokens of plain text, e.g. a completion
    pub fn count_text(&self, text: &str) -> usize {
        self.tokenizer.count(text)
    }

    fn count_message(&self, message: &ChatMessage) -> usize {
        let fields: usize = message
            .field_values()
            .map(|value| self.tokenizer.count(value))
            .sum();
        let name = if message.name.is_some() {
            self.overheads.per_name
        } else {
            0
        };
        self.overheads.per_message + fields + name
    }
}

impl std::fmt::Debug for TokenAccountant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAccountant")
            .field("overheads", &self.overheads)
            .finish_non_exhaustive()
    }
}
