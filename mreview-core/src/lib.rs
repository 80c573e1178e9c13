//! mreview core - Core library for LLM-assisted merge request reviews
//!
//! This crate provides configuration, token accounting, prompt rendering, the
//! chat completion client and the review session that ties them together.

pub mod calllog;
pub mod chat;
pub mod config;
pub mod diff;
pub mod error;
pub mod message;
pub mod prompt;
pub mod review;
pub mod secrets;
pub mod tokens;

pub use calllog::{ApiParams, CallLog, CallLogEntry};
pub use chat::{ChatClient, ChatRequest, OpenAiClient};
pub use config::{Config, TokenOverheads};
pub use diff::DiffRecord;
pub use error::{Error, Result};
pub use message::{ChatMessage, Role};
pub use prompt::{load_perspectives, PromptTemplate};
pub use review::{ReviewDocument, ReviewSession, ReviewSummary, RunPaths};
pub use secrets::Secrets;
pub use tokens::{TiktokenTokenizer, TokenAccountant, Tokenizer};
