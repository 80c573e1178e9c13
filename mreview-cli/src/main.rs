//! mreview CLI - LLM-assisted review of GitLab merge requests
//!
//! Fetches the diffs of one merge request, asks the configured model for
//! feedback from every review perspective and writes a Markdown review plus a
//! JSON call log.

mod commands;

use clap::Parser;
use mreview_core::Config;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::ReviewArgs;

/// mreview: review a GitLab merge request with a language model
#[derive(Parser, Debug)]
#[command(name = "mreview")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    review: ReviewArgs,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config = Config::load_with_overrides()?;
    config.validate()?;

    tracing::debug!(
        gitlab = %config.gitlab.url,
        project_id = config.gitlab.project_id,
        model = %config.openai.model,
        "Configuration loaded"
    );

    cli.review.execute(&config).await
}
