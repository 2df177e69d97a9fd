pub mod types;

pub use types::RunStatus;

use colored::Colorize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write job summary: {0}")]
    FileWrite(#[from] std::io::Error),
}

/// Tell the CI runner how the run ended.
///
/// Failures become an `::error::` workflow command on stdout, which the
/// runner turns into the job's failure annotation. A colored line for
/// humans goes to stderr either way.
pub fn output(status: &RunStatus<'_>) {
    match status {
        RunStatus::Success(outcome) => {
            eprintln!(
                "{} applied {}...{} to {}",
                "✔".green().bold(),
                outcome.base,
                outcome.head,
                outcome.workdir.display()
            );
        }
        RunStatus::Failure(err) => {
            println!("{}", error_command(&err.to_string()));
            eprintln!(
                "{} failed after {}: {}",
                "✘".red().bold(),
                status.stage(),
                err
            );
        }
    }
}

/// Format `message` as a GitHub Actions `::error::` workflow command.
pub fn error_command(message: &str) -> String {
    format!("::error::{}", escape_data(message))
}

/// Escape a workflow command payload so multi-line messages survive.
fn escape_data(message: &str) -> String {
    message
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Append a markdown section describing the run to the job summary file.
#[instrument(skip(status), fields(status = %status))]
pub fn write_summary(status: &RunStatus<'_>, path: &Path) -> Result<(), ReportError> {
    debug!(path = %path.display(), "appending job summary");
    let md = summary_markdown(status);
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(md.as_bytes())?;
    Ok(())
}

fn summary_markdown(status: &RunStatus<'_>) -> String {
    let mut md = String::new();
    match status {
        RunStatus::Success(outcome) => {
            let comparison = &outcome.comparison;
            md.push_str(&format!(
                "## Patches applied: `{}...{}`\n\n",
                outcome.base, outcome.head
            ));
            md.push_str(&format!("**Repository:** {}\n\n", outcome.repo));
            md.push_str(&format!(
                "**Working directory:** `{}`\n\n",
                outcome.workdir.display()
            ));
            md.push_str(&format!(
                "**Commits:** {} (ahead {}, behind {})\n\n",
                comparison.total_commits, comparison.ahead_by, comparison.behind_by
            ));
            if let Some(state) = &comparison.status {
                md.push_str(&format!("**Status:** {state}\n\n"));
            }
            match &comparison.html_url {
                Some(url) => md.push_str(&format!("[View comparison]({url})\n\n")),
                None => md.push_str(&format!("[Diff]({})\n\n", comparison.diff_url)),
            }
        }
        RunStatus::Failure(err) => {
            md.push_str("## Patches not applied\n\n");
            md.push_str(&format!("**Failed after:** {}\n\n", status.stage()));
            md.push_str(&format!("```\n{err}\n```\n\n"));
        }
    }
    md
}
