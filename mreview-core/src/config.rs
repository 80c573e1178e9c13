//! Configuration management for mreview
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Environment variables (MREVIEW_*)
//! 2. Config file (~/.config/mreview/config.toml, or $MREVIEW_CONFIG)
//! 3. Default values
//!
//! The resulting [`Config`] is built once at process entry and passed by
//! reference to everything that needs it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// GitLab endpoint configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GitLabConfig {
    /// Base URL of the GitLab instance, without the `/api/v4` suffix
    pub url: String,

    /// Numeric project id the merge requests belong to
    pub project_id: u64,

    /// Page size used when listing merge request diffs
    pub per_page: u32,
}

impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            url: "https://gitlab.com".to_string(),
            project_id: 0,
            per_page: 20,
        }
    }
}

/// Chat completion model configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OpenAiConfig {
    /// Base URL of the OpenAI-compatible API
    pub base_url: String,

    /// Model name sent with every request
    pub model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Maximum number of tokens the model may generate per review
    pub max_tokens: u32,

    /// Model whose tokenizer is used for token accounting (defaults to `model`)
    pub tokenizer_model: Option<String>,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            max_tokens: 1024,
            tokenizer_model: None,
        }
    }
}

impl OpenAiConfig {
    /// Model name used to select the tokenizer
    pub fn tokenizer_model(&self) -> &str {
        self.tokenizer_model.as_deref().unwrap_or(&self.model)
    }
}

/// Per-message token overheads of the chat format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenOverheads {
    /// Tokens added for every message
    pub per_message: usize,

    /// Extra tokens added when a message carries a `name`
    pub per_name: usize,
}

impl Default for TokenOverheads {
    fn default() -> Self {
        Self {
            per_message: 3,
            per_name: 1,
        }
    }
}

/// Input and output locations
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    /// JSON array of review perspectives
    pub perspectives: PathBuf,

    /// System prompt template
    pub system_prompt: PathBuf,

    /// Directory receiving the review document and the call log
    pub output_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            perspectives: PathBuf::from("review_perspectives.json"),
            system_prompt: PathBuf::from("system_prompt.txt"),
            output_dir: PathBuf::from("."),
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// GitLab configuration
    pub gitlab: GitLabConfig,

    /// Chat model configuration
    pub openai: OpenAiConfig,

    /// Token accounting constants
    pub tokens: TokenOverheads,

    /// File locations
    pub paths: PathsConfig,
}

impl Config {
    /// Load configuration from the default config file location
    ///
    /// Returns default config if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();

        if let Some(path) = config_path {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Get the default config file path
    ///
    /// `MREVIEW_CONFIG` wins; otherwise `~/.config/mreview/config.toml` on Unix
    pub fn default_config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("MREVIEW_CONFIG") {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }
        dirs::config_dir().map(|p| p.join("mreview").join("config.toml"))
    }

    /// Apply environment variable overrides
    ///
    /// Supported variables:
    /// - MREVIEW_GITLAB_URL: GitLab base URL
    /// - MREVIEW_PROJECT_ID: GitLab project id
    /// - MREVIEW_MODEL: Chat model name
    /// - MREVIEW_OUTPUT_DIR: Output directory
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(url) = lookup("MREVIEW_GITLAB_URL") {
            self.gitlab.url = url;
        }

        if let Some(project_id) = lookup("MREVIEW_PROJECT_ID") {
            self.gitlab.project_id = project_id.trim().parse().map_err(|_| {
                Error::Config(format!("MREVIEW_PROJECT_ID is not a number: {}", project_id))
            })?;
        }

        if let Some(model) = lookup("MREVIEW_MODEL") {
            self.openai.model = model;
        }

        if let Some(dir) = lookup("MREVIEW_OUTPUT_DIR") {
            self.paths.output_dir = PathBuf::from(dir);
        }

        Ok(self)
    }

    /// Check values that have no usable default
    pub fn validate(&self) -> Result<()> {
        if self.gitlab.project_id == 0 {
            return Err(Error::Config(
                "gitlab.project_id is not set (config file or MREVIEW_PROJECT_ID)".to_string(),
            ));
        }
        if self.gitlab.per_page == 0 {
            return Err(Error::Config("gitlab.per_page must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Load configuration with all overrides applied
    ///
    /// Priority: env > config file > defaults
    pub fn load_with_overrides() -> Result<Self> {
        Self::load()?.with_env_overrides()
    }
}
