//! Review session: runs every changed file through every perspective
//!
//! For each diff with textual changes the session writes a file heading to the
//! review document, then for each perspective builds the system/user message
//! pair, counts its tokens, calls the model, appends the call to the call log
//! and writes the response under a perspective heading.
//!
//! A failed model call does not stop the session. It is logged, a failure note
//! is written in place of the response, no call log entry is recorded, and the
//! failure is counted in the [`ReviewSummary`]. Call log write failures do stop
//! the session.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{error, info};

use crate::calllog::{format_timestamp, ApiParams, CallLog, CallLogEntry};
use crate::chat::{ChatClient, ChatRequest};
use crate::config::OpenAiConfig;
use crate::diff::DiffRecord;
use crate::message::ChatMessage;
use crate::prompt::PromptTemplate;
use crate::tokens::TokenAccountant;
use crate::{Error, Result};

/// Output locations of one run, stamped with its start time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub review_document: PathBuf,
    pub call_log: PathBuf,
}

impl RunPaths {
    pub fn new(output_dir: &Path, started_at: DateTime<Local>) -> Self {
        let stamp = started_at.format("%Y%m%d%H%M%S");
        Self {
            review_document: output_dir.join(format!("review_results_{}.md", stamp)),
            call_log: output_dir.join(format!("api_call_logs_{}.json", stamp)),
        }
    }
}

/// Markdown review document
#[derive(Debug)]
pub struct ReviewDocument<W: Write> {
    out: W,
}

impl ReviewDocument<File> {
    /// Open (or create) a document in append mode
    pub fn open_append(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(Error::Io)?;
        Ok(Self::new(file))
    }
}

impl<W: Write> ReviewDocument<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn file_heading(&mut self, file_name: &str) -> Result<()> {
        self.line(&format!("# Review target: {}", file_name))
    }

    pub fn perspective_heading(&mut self, perspective: &str) -> Result<()> {
        self.line(&format!("## Review perspective: {}", perspective))
    }

    pub fn body(&mut self, text: &str) -> Result<()> {
        self.line(text)
    }

    pub fn failure(&mut self, err: &Error) -> Result<()> {
        self.line(&format!("_Review failed: {}_", err))
    }

    fn line(&mut self, text: &str) -> Result<()> {
        writeln!(self.out, "{}", text).map_err(Error::Io)?;
        self.out.flush().map_err(Error::Io)
    }
}

/// Totals for one session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReviewSummary {
    pub files_reviewed: usize,
    pub files_skipped: usize,
    pub calls: usize,
    pub failed_calls: usize,
    pub request_tokens: usize,
    pub response_tokens: usize,
}

impl ReviewSummary {
    pub fn has_failures(&self) -> bool {
        self.failed_calls > 0
    }
}

/// Everything a session needs, borrowed from process entry
pub struct ReviewSession<'a> {
    model: &'a OpenAiConfig,
    template: &'a PromptTemplate,
    perspectives: &'a [String],
    accountant: &'a TokenAccountant,
    client: &'a dyn ChatClient,
    call_log: &'a CallLog,
}

impl<'a> ReviewSession<'a> {
    pub fn new(
        model: &'a OpenAiConfig,
        template: &'a PromptTemplate,
        perspectives: &'a [String],
        accountant: &'a TokenAccountant,
        client: &'a dyn ChatClient,
        call_log: &'a CallLog,
    ) -> Self {
        Self {
            model,
            template,
            perspectives,
            accountant,
            client,
            call_log,
        }
    }

    /// Review every diff, writing results to `document` in diff then perspective order
    pub async fn run<W: Write>(
        &self,
        diffs: &[DiffRecord],
        document: &mut ReviewDocument<W>,
    ) -> Result<ReviewSummary> {
        let mut summary = ReviewSummary::default();

        for record in diffs {
            if !record.has_changes() {
                info!(file = %record.new_path, "Skipping file without textual changes");
                summary.files_skipped += 1;
                continue;
            }

            document.file_heading(&record.new_path)?;
            for perspective in self.perspectives {
                document.perspective_heading(perspective)?;
                summary.calls += 1;

                match self.review(record, perspective).await {
                    Ok(entry) => {
                        summary.request_tokens += entry.request_tokens;
                        summary.response_tokens += entry.response_tokens;
                        document.body(&entry.response)?;
                        self.call_log.append(entry)?;
                    }
                    Err(e) => {
                        error!(file = %record.new_path, perspective = %perspective, error = %e, "Review call failed");
                        summary.failed_calls += 1;
                        document.failure(&e)?;
                    }
                }
            }
            summary.files_reviewed += 1;
        }

        Ok(summary)
    }

    /// Messages sent for one file and perspective
    pub fn messages(&self, record: &DiffRecord, perspective: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.template.render(&record.new_path, &record.diff)),
            ChatMessage::user(perspective),
        ]
    }

    /// Call the model once and build the log entry for it
    async fn review(&self, record: &DiffRecord, perspective: &str) -> Result<CallLogEntry> {
        let messages = self.messages(record, perspective);
        let request_tokens = self.accountant.count_messages(&messages);
        let request = ChatRequest::from_config(self.model, messages);

        let start_time = format_timestamp(Local::now());
        let response = self.client.complete(&request).await?;
        let end_time = format_timestamp(Local::now());

        let response_tokens = self.accountant.count_text(&response);
        info!(
            file = %record.new_path,
            perspective = %perspective,
            request_tokens,
            response_tokens,
            "Review call completed"
        );

        Ok(CallLogEntry {
            file_name: record.new_path.clone(),
            diff_content: record.diff.clone(),
            review_perspective: perspective.to_string(),
            request_tokens,
            api_params: ApiParams {
                model: self.model.model.clone(),
                temperature: self.model.temperature,
            },
            response,
            response_tokens,
            start_time,
            end_time,
        })
    }
}
