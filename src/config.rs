use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::github::RepoId;

/// Settings file looked up in the current directory when `--config` is not given.
pub const DEFAULT_SETTINGS_FILE: &str = ".apply-patches.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Everything a run needs, assembled once at the CLI boundary.
///
/// The orchestrator only ever sees this value; it never reads the
/// environment on its own.
#[derive(Debug, Clone)]
pub struct Config {
    /// Repository holding the version tag and its patches branch
    pub repo: RepoId,
    /// Base reference, usually a release tag
    pub version: String,
    /// Optional sub-path of the workspace to patch
    pub path: Option<String>,
    /// Workspace root provided by the CI runner
    pub workspace: PathBuf,
    /// Token from the environment; wins over `settings.github.token`
    pub token: Option<String>,
    pub settings: Settings,
}

impl Config {
    pub fn new(
        repo: &str,
        version: &str,
        path: Option<String>,
        workspace: PathBuf,
        token: Option<String>,
        settings: Settings,
    ) -> Self {
        Self {
            repo: RepoId::parse(repo),
            version: version.to_string(),
            // Runners hand unset inputs over as empty strings.
            path: path.filter(|p| !p.is_empty()),
            workspace,
            token: token.filter(|t| !t.is_empty()),
            settings,
        }
    }

    /// Resolve the API token: the environment value takes precedence,
    /// then the settings file.
    pub fn token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| self.settings.github.token.clone())
    }
}

/// Optional tuning read from `.apply-patches.toml`.
/// All fields are optional; the tool works with no file at all.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub github: GitHubSettings,

    #[serde(default)]
    pub commands: CommandSettings,

    #[serde(default)]
    pub cleanup: CleanupSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubSettings {
    /// Base URL of the REST API (GitHub Enterprise installs differ)
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Used only when GITHUB_TOKEN is not set
    pub token: Option<String>,
}

impl Default for GitHubSettings {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token: None,
        }
    }
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CommandSettings {
    pub fetch: String,
    pub patch: String,
    pub remove: String,
    /// Leading path components `patch` strips from each file name
    pub strip: u32,
    pub patch_file: String,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            fetch: "curl".to_string(),
            patch: "patch".to_string(),
            remove: "rm".to_string(),
            strip: 1,
            patch_file: "patch.diff".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CleanupSettings {
    #[serde(default)]
    pub policy: CleanupPolicy,
}

/// When the downloaded diff file gets removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CleanupPolicy {
    /// Remove it after `patch` ran, whether or not it succeeded
    #[default]
    Always,
    /// Remove it only when `patch` succeeded; a failed run leaves it behind
    OnSuccess,
}

impl Settings {
    /// Load settings from an explicit path, or from `.apply-patches.toml`
    /// in the current directory. Only the implicit file may be missing.
    pub fn load(path: Option<&Path>) -> Result<Settings, ConfigError> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let path = Path::new(DEFAULT_SETTINGS_FILE);
                if path.exists() {
                    Self::load_from(path)
                } else {
                    Ok(Settings::default())
                }
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Settings, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = toml::from_str(&contents)?;
        Ok(settings)
    }
}
