//! Review command - review every changed file of a merge request

use chrono::Local;
use clap::Args;
use mreview_core::{
    load_perspectives, CallLog, Config, OpenAiClient, PromptTemplate, ReviewDocument,
    ReviewSession, RunPaths, Secrets, TokenAccountant,
};
use mreview_gitlab::GitLabClient;

/// Arguments for the review command
#[derive(Args, Debug)]
pub struct ReviewArgs {
    /// IID of the merge request to review
    #[arg(long = "mr-iid", alias = "mr_iid")]
    pub mr_iid: u64,
}

impl ReviewArgs {
    /// Execute the review
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let started_at = Local::now();

        let perspectives = load_perspectives(&config.paths.perspectives)?;
        let template = PromptTemplate::load(&config.paths.system_prompt)?;
        let accountant =
            TokenAccountant::for_model(config.openai.tokenizer_model(), config.tokens)?;

        let api_key = Secrets::load()?.openai_api_key().ok_or_else(|| {
            anyhow::anyhow!(
                "OpenAI API key not found. Set OPENAI_API_KEY environment variable \
                 or add api_key to ~/.config/mreview/secrets.toml"
            )
        })?;
        let chat = OpenAiClient::new(&config.openai.base_url, api_key);
        let gitlab = GitLabClient::from_config(&config.gitlab)?;

        tracing::info!(
            mr_iid = self.mr_iid,
            perspectives = perspectives.len(),
            "Starting merge request review"
        );

        let collection = gitlab.collect_mr_diffs(self.mr_iid).await;
        if !collection.is_complete() {
            tracing::warn!(
                outcome = ?collection.outcome,
                count = collection.diffs.len(),
                "Diff listing incomplete; reviewing the files that were fetched"
            );
        }

        std::fs::create_dir_all(&config.paths.output_dir)?;
        let paths = RunPaths::new(&config.paths.output_dir, started_at);
        let call_log = CallLog::new(&paths.call_log);
        let mut document = ReviewDocument::open_append(&paths.review_document)?;

        let session = ReviewSession::new(
            &config.openai,
            &template,
            &perspectives,
            &accountant,
            &chat,
            &call_log,
        );
        let summary = session.run(&collection.diffs, &mut document).await?;

        tracing::info!(
            files_reviewed = summary.files_reviewed,
            files_skipped = summary.files_skipped,
            calls = summary.calls,
            failed_calls = summary.failed_calls,
            request_tokens = summary.request_tokens,
            response_tokens = summary.response_tokens,
            "Review finished"
        );

        println!("Review written to {}", paths.review_document.display());
        println!("Call log written to {}", paths.call_log.display());

        if summary.has_failures() {
            anyhow::bail!(
                "{} of {} review calls failed",
                summary.failed_calls,
                summary.calls
            );
        }

        Ok(())
    }
}
