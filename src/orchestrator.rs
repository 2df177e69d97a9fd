use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, info_span, Instrument};

use crate::config::Config;
use crate::github::{self, CompareError, CompareRefs, Comparison, RepoId};
use crate::patch::{self, CommandRunner, PatchCommands, PatchError};

/// Progress of a run. Stages only move forward; any of them can end in failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Start,
    ReferencesResolved,
    DiffUrlObtained,
    DiffDownloaded,
    PatchApplied,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Start => write!(f, "start"),
            Stage::ReferencesResolved => write!(f, "references resolved"),
            Stage::DiffUrlObtained => write!(f, "diff URL obtained"),
            Stage::DiffDownloaded => write!(f, "diff downloaded"),
            Stage::PatchApplied => write!(f, "patch applied"),
        }
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Compare(#[from] CompareError),

    #[error(transparent)]
    Patch(#[from] PatchError),
}

impl RunError {
    /// Last stage the run completed before failing.
    pub fn stage(&self) -> Stage {
        match self {
            RunError::Compare(_) => Stage::ReferencesResolved,
            RunError::Patch(PatchError::Fetch { .. }) => Stage::DiffUrlObtained,
            RunError::Patch(PatchError::Apply { .. }) => Stage::DiffDownloaded,
            RunError::Patch(PatchError::Cleanup { .. }) => Stage::PatchApplied,
        }
    }
}

/// What a successful run did.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub repo: RepoId,
    pub base: String,
    pub head: String,
    pub workdir: PathBuf,
    pub comparison: Comparison,
}

/// Compare `version` with `<version>-patches`, then download and apply the
/// resulting diff in the working directory.
pub async fn run(
    config: &Config,
    client: &dyn CompareRefs,
    runner: &dyn CommandRunner,
) -> Result<Outcome, RunError> {
    info!(stage = %Stage::Start, repo = %config.repo, version = %config.version, "starting");
    let base = config.version.clone();
    let head = github::patches_ref(&base);
    info!(stage = %Stage::ReferencesResolved, %base, %head, "comparing references");

    let comparison = client
        .compare(&config.repo, &base, &head)
        .instrument(info_span!("compare", repo = %config.repo))
        .await?;
    info!(
        stage = %Stage::DiffUrlObtained,
        diff_url = %comparison.diff_url,
        commits = comparison.total_commits,
        "comparison ready"
    );

    let workdir = patch::working_dir(&config.workspace, config.path.as_deref());
    let commands = PatchCommands::new(&config.settings.commands, workdir.clone());
    patch::apply_patch(
        runner,
        &commands,
        &comparison.diff_url,
        config.settings.cleanup.policy,
    )
    .await?;
    info!(stage = %Stage::PatchApplied, workdir = %workdir.display(), "done");

    Ok(Outcome {
        repo: config.repo.clone(),
        base,
        head,
        workdir,
        comparison,
    })
}
