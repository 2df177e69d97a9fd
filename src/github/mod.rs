pub mod types;

pub use types::{Comparison, RepoId};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, instrument};

/// Suffix appended to a version to name its patches branch.
pub const PATCHES_SUFFIX: &str = "-patches";

const USER_AGENT: &str = "apply-patches";

#[derive(Debug, Error)]
pub enum CompareError {
    #[error("GitHub API request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("GitHub API returned {status} comparing {base}...{head}: {message}")]
    Status {
        status: u16,
        base: String,
        head: String,
        message: String,
    },
}

/// Name of the branch holding the patches for `version`.
///
/// Plain concatenation: no trimming and no ref-name validation.
pub fn patches_ref(version: &str) -> String {
    format!("{version}{PATCHES_SUFFIX}")
}

/// Compares two references of a repository on the hosting service.
#[async_trait]
pub trait CompareRefs: Send + Sync {
    async fn compare(
        &self,
        repo: &RepoId,
        base: &str,
        head: &str,
    ) -> Result<Comparison, CompareError>;
}

/// REST client for GitHub's "compare two commits" endpoint.
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(api_url: &str, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn compare_url(&self, repo: &RepoId, base: &str, head: &str) -> String {
        format!(
            "{}/repos/{}/{}/compare/{}...{}",
            self.api_url, repo.owner, repo.name, base, head
        )
    }
}

#[async_trait]
impl CompareRefs for GitHubClient {
    #[instrument(skip(self, repo), fields(repo = %repo))]
    async fn compare(
        &self,
        repo: &RepoId,
        base: &str,
        head: &str,
    ) -> Result<Comparison, CompareError> {
        let url = self.compare_url(repo, base, head);
        debug!(%url, authenticated = self.token.is_some(), "requesting comparison");

        let mut request = self
            .http
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompareError::Status {
                status: status.as_u16(),
                base: base.to_string(),
                head: head.to_string(),
                message: error_message(&body, status.canonical_reason()),
            });
        }

        let comparison = response.json::<Comparison>().await?;
        debug!(
            diff_url = %comparison.diff_url,
            ahead_by = comparison.ahead_by,
            behind_by = comparison.behind_by,
            "received comparison"
        );
        Ok(comparison)
    }
}

/// Pull GitHub's `message` field out of an error body, falling back to the
/// HTTP reason phrase.
fn error_message(body: &str, reason: Option<&str>) -> String {
    #[derive(serde::Deserialize)]
    struct ApiError {
        message: String,
    }

    match serde_json::from_str::<ApiError>(body) {
        Ok(err) => err.message,
        Err(_) if !body.trim().is_empty() => body.trim().to_string(),
        Err(_) => reason.unwrap_or("unknown error").to_string(),
    }
}
