//! GitLab token and OpenAI key
//!
//! Credentials live in `~/.config/mreview/secrets.toml`, apart from
//! `config.toml`. On Unix the file must not be readable by group or others.
//! `GITLAB_TOKEN` and `OPENAI_API_KEY` win over the file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

/// Credentials for both remote services
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Secrets {
    /// GitLab configuration
    pub gitlab: GitLabSecrets,

    /// OpenAI configuration
    pub openai: OpenAiSecrets,
}

/// GitLab-related secrets
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GitLabSecrets {
    /// GitLab personal access token, sent as `PRIVATE-TOKEN`
    pub token: Option<String>,
}

/// OpenAI-related secrets
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct OpenAiSecrets {
    /// API key sent as a bearer token
    pub api_key: Option<String>,
}

impl Secrets {
    /// Read `secrets.toml` from the config directory, or nothing if absent
    pub fn load() -> Result<Self> {
        let secrets_path = Self::default_secrets_path();

        if let Some(path) = secrets_path {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Read a secrets file, rejecting one with group or world access
    pub fn load_from_file(path: &Path) -> Result<Self> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let metadata = std::fs::metadata(path).map_err(Error::Io)?;
            let mode = metadata.permissions().mode();

            if mode & 0o077 != 0 {
                return Err(Error::Config(format!(
                    "Secrets file {} has insecure permissions {:o}. \
                     Please run: chmod 600 {}",
                    path.display(),
                    mode & 0o777,
                    path.display()
                )));
            }

            debug!(path = %path.display(), mode = format!("{:o}", mode & 0o777), "Secrets file permissions OK");
        }

        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        let mut secrets: Secrets = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse secrets: {}", e)))?;

        for value in [&mut secrets.gitlab.token, &mut secrets.openai.api_key]
            .into_iter()
            .flatten()
        {
            *value = value.trim().to_string();
        }

        Ok(secrets)
    }

    /// `secrets.toml` next to `config.toml`
    pub fn default_secrets_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("mreview").join("secrets.toml"))
    }

    /// Get the GitLab token
    ///
    /// Priority: GITLAB_TOKEN env var > secrets file
    pub fn gitlab_token(&self) -> Option<String> {
        resolve("GITLAB_TOKEN", self.gitlab.token.as_deref())
    }

    /// Get the OpenAI API key
    ///
    /// Priority: OPENAI_API_KEY env var > secrets file
    pub fn openai_api_key(&self) -> Option<String> {
        resolve("OPENAI_API_KEY", self.openai.api_key.as_deref())
    }
}

fn resolve(env_var: &str, from_file: Option<&str>) -> Option<String> {
    if let Ok(value) = std::env::var(env_var) {
        let value = value.trim().to_string();
        if !value.is_empty() {
            debug!(env_var, "Using secret from environment variable");
            return Some(value);
        }
    }

    match from_file {
        Some(value) if !value.is_empty() => {
            debug!(env_var, "Using secret from secrets file");
            Some(value.to_string())
        }
        _ => None,
    }
}
