mod config;
mod github;
mod orchestrator;
mod patch;
mod report;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info_span, warn, Instrument};
use tracing_subscriber::EnvFilter;

use crate::github::GitHubClient;
use crate::patch::SystemRunner;
use crate::report::RunStatus;

/// Applies the diff between a release tag and its
/// `<version>-patches` branch to the CI workspace.
///
/// Every input can also come from the environment variable a GitHub Actions
/// runner sets for it.
#[derive(Parser, Debug)]
#[command(name = "apply-patches", about, disable_version_flag = true)]
struct Cli {
    /// Repository holding the tag and patches branch, as owner/name
    #[arg(long, env = "INPUT_REPO")]
    repo: String,

    /// Base reference (e.g. a release tag); the patches branch is <version>-patches
    #[arg(long, env = "INPUT_VERSION")]
    version: String,

    /// Sub-path of the workspace to apply the patch in
    #[arg(long, env = "INPUT_PATH")]
    path: Option<String>,

    /// Workspace root provided by the runner
    #[arg(long, env = "GITHUB_WORKSPACE")]
    workspace: PathBuf,

    /// GitHub API token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Settings file (defaults to .apply-patches.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Job summary file to append a markdown report to
    #[arg(long, env = "GITHUB_STEP_SUMMARY")]
    summary: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let settings = match config::Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(err) => {
            println!("{}", report::error_command(&err.to_string()));
            return Ok(ExitCode::FAILURE);
        }
    };
    debug!(
        api_url = %settings.github.api_url,
        cleanup = ?settings.cleanup.policy,
        "loaded settings"
    );

    let config = config::Config::new(
        &cli.repo,
        &cli.version,
        cli.path,
        cli.workspace,
        cli.token,
        settings,
    );

    let client = GitHubClient::new(&config.settings.github.api_url, config.token());
    let result = orchestrator::run(&config, &client, &SystemRunner)
        .instrument(info_span!(
            "apply_patches",
            repo = %config.repo,
            version = %config.version
        ))
        .await;

    let status = match &result {
        Ok(outcome) => RunStatus::Success(outcome),
        Err(err) => RunStatus::Failure(err),
    };
    report::output(&status);

    if let Some(path) = cli.summary.filter(|p| !p.as_os_str().is_empty()) {
        if let Err(err) = report::write_summary(&status, &path) {
            warn!(error = %err, "could not write job summary");
        }
    }

    Ok(if status.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
