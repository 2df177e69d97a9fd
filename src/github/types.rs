use serde::Deserialize;

/// Identifies a repository on the hosting service as `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl RepoId {
    /// Split an `owner/name` input on `/`.
    ///
    /// Nothing is validated here. Input without a separator yields an empty
    /// name, and anything after a second `/` is dropped; the compare request
    /// is what ends up rejecting such values.
    pub fn parse(input: &str) -> RepoId {
        let mut parts = input.split('/');
        let owner = parts.next().unwrap_or_default().to_string();
        let name = parts.next().unwrap_or_default().to_string();
        RepoId { owner, name }
    }
}

impl std::fmt::Display for RepoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// The parts of GitHub's compare response this tool reads.
///
/// Only `diff_url` drives the run; the rest is carried into logs and the
/// job summary.
#[derive(Debug, Clone, Deserialize)]
pub struct Comparison {
    /// Direct URL to the unified diff between base and head
    pub diff_url: String,
    /// Browser URL of the comparison
    #[serde(default)]
    pub html_url: Option<String>,
    /// "ahead", "behind", "diverged" or "identical"
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub ahead_by: u64,
    #[serde(default)]
    pub behind_by: u64,
    #[serde(default)]
    pub total_commits: u64,
}
