//! GitLab API client using reqwest

use mreview_core::config::GitLabConfig;
use mreview_core::Secrets;
use tracing::info;
use url::Url;

use crate::{Error, Result};

/// Header GitLab reads personal access tokens from
pub(crate) const PRIVATE_TOKEN_HEADER: &str = "PRIVATE-TOKEN";

/// GitLab API client for one project
pub struct GitLabClient {
    client: reqwest::Client,
    api_base: Url,
    project_id: u64,
    per_page: u32,
    token: String,
}

impl GitLabClient {
    /// Create a client for the project described by `config`
    ///
    /// `url` is the instance root, e.g. `https://gitlab.example.com`; the
    /// `/api/v4` prefix is appended here.
    pub fn new(config: &GitLabConfig, token: impl Into<String>) -> Result<Self> {
        let api_base = Url::parse(&format!("{}/api/v4/", config.url.trim_end_matches('/')))?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("mreview/", env!("CARGO_PKG_VERSION")))
            .build()?;

        info!(api = %api_base, project_id = config.project_id, "Created GitLab client");

        Ok(Self {
            client,
            api_base,
            project_id: config.project_id,
            per_page: config.per_page,
            token: token.into(),
        })
    }

    /// Create a client with the token from the environment or secrets file
    ///
    /// Token is loaded from (in priority order):
    /// 1. GITLAB_TOKEN environment variable
    /// 2. ~/.config/mreview/secrets.toml
    pub fn from_config(config: &GitLabConfig) -> Result<Self> {
        let secrets = Secrets::load()?;
        let token = secrets.gitlab_token().ok_or_else(|| {
            Error::Auth(
                "GitLab token not found. Set GITLAB_TOKEN environment variable \
                 or add token to ~/.config/mreview/secrets.toml"
                    .to_string(),
            )
        })?;
        Self::new(config, token)
    }

    pub fn project_id(&self) -> u64 {
        self.project_id
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.client
    }

    pub(crate) fn token(&self) -> &str {
        &self.token
    }

    /// URL of the diff listing of a merge request
    pub fn mr_diffs_url(&self, mr_iid: u64) -> Result<Url> {
        Ok(self.api_base.join(&format!(
            "projects/{}/merge_requests/{}/diffs",
            self.project_id, mr_iid
        ))?)
    }
}

impl std::fmt::Debug for GitLabClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitLabClient")
            .field("api_base", &self.api_base.as_str())
            .field("project_id", &self.project_id)
            .field("per_page", &self.per_page)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> GitLabConfig {
        GitLabConfig {
            url: url.to_string(),
            project_id: 12,
            per_page: 50,
        }
    }

    #[test]
    fn test_diffs_url() {
        let client = GitLabClient::new(&config("https://gitlab.example.com"), "t").unwrap();
        assert_eq!(
            client.mr_diffs_url(34).unwrap().as_str(),
            "https://gitlab.example.com/api/v4/projects/12/merge_requests/34/diffs"
        );
    }

    #[test]
    fn test_diffs_url_with_trailing_slash_and_subpath() {
        let client = GitLabClient::new(&config("https://example.com/gitlab/"), "t").unwrap();
        assert_eq!(
            client.mr_diffs_url(1).unwrap().as_str(),
            "https://example.com/gitlab/api/v4/projects/12/merge_requests/1/diffs"
        );
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(
            GitLabClient::new(&config("not a url"), "t"),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_debug_hides_token() {
        let client = GitLabClient::new(&config("https://gitlab.com"), "glpat-secret").unwrap();
        let debug = format!("{:?}", client);
        assert!(!debug.contains("glpat-secret"));
        assert!(debug.contains("project_id: 12"));
    }
}
