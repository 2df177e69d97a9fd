use crate::orchestrator::{Outcome, RunError, Stage};

/// Final state of a run, as shown to the CI runner.
#[derive(Debug)]
pub enum RunStatus<'a> {
    Success(&'a Outcome),
    Failure(&'a RunError),
}

impl RunStatus<'_> {
    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Success(_))
    }

    /// Furthest stage reached.
    pub fn stage(&self) -> Stage {
        match self {
            RunStatus::Success(_) => Stage::PatchApplied,
            RunStatus::Failure(err) => err.stage(),
        }
    }
}

impl std::fmt::Display for RunStatus<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Success(_) => write!(f, "SUCCESS"),
            RunStatus::Failure(_) => write!(f, "FAILED"),
        }
    }
}
