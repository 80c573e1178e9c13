//! mreview GitLab - GitLab integration for mreview
//!
//! This crate provides the GitLab REST client and the paginated retrieval of
//! merge request diffs.

mod client;
mod diffs;
mod error;

pub use client::GitLabClient;
pub use diffs::{DiffCollection, FetchFailure, PageOutcome};
pub use error::{Error, Result};
