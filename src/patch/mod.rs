pub mod runner;

pub use runner::{CommandRunner, CommandSpec, SystemRunner};

use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::{CleanupPolicy, CommandSettings};

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("Failed to download diff with `{command}`: {detail}")]
    Fetch { command: String, detail: String },

    #[error("Failed to apply patch with `{command}`: {detail}")]
    Apply { command: String, detail: String },

    #[error("Failed to remove diff file with `{command}`: {detail}")]
    Cleanup { command: String, detail: String },
}

/// Directory the patch is applied in.
///
/// The workspace root is made absolute without touching the filesystem. A
/// sub-path is glued on with the platform separator as-is, even when it is
/// itself absolute; a directory that does not exist only shows up once the
/// first command runs in it.
pub fn working_dir(workspace: &Path, sub_path: Option<&str>) -> PathBuf {
    let root = std::path::absolute(workspace).unwrap_or_else(|_| workspace.to_path_buf());
    match sub_path {
        None | Some("") => root,
        Some(sub) => PathBuf::from(format!("{}{}{}", root.display(), MAIN_SEPARATOR, sub)),
    }
}

/// Builds the fetch, apply and cleanup invocations for one working directory.
pub struct PatchCommands<'a> {
    settings: &'a CommandSettings,
    workdir: PathBuf,
}

impl<'a> PatchCommands<'a> {
    pub fn new(settings: &'a CommandSettings, workdir: PathBuf) -> Self {
        Self { settings, workdir }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Path of the downloaded diff once fetched.
    pub fn patch_file(&self) -> PathBuf {
        self.workdir.join(&self.settings.patch_file)
    }

    /// `curl -Ls <url> -o patch.diff`: follow redirects, no progress output.
    pub fn fetch(&self, diff_url: &str) -> CommandSpec {
        CommandSpec::new(
            &self.settings.fetch,
            &["-Ls", diff_url, "-o", &self.settings.patch_file],
            self.workdir.clone(),
        )
    }

    /// `patch -p1 -i patch.diff`
    pub fn apply(&self) -> CommandSpec {
        let strip = format!("-p{}", self.settings.strip);
        CommandSpec::new(
            &self.settings.patch,
            &[&strip, "-i", &self.settings.patch_file],
            self.workdir.clone(),
        )
    }

    /// `rm patch.diff`
    pub fn cleanup(&self) -> CommandSpec {
        CommandSpec::new(
            &self.settings.remove,
            &[&self.settings.patch_file],
            self.workdir.clone(),
        )
    }
}

/// Run `spec`, turning a spawn error or a non-zero exit into a short
/// description of what went wrong.
async fn run_checked(runner: &dyn CommandRunner, spec: &CommandSpec) -> Result<(), String> {
    debug!(command = %spec, "running");
    match runner.run(spec).await {
        Ok(output) if output.success() => Ok(()),
        Ok(output) => {
            let code = output
                .code
                .map_or_else(|| "a signal".to_string(), |c| format!("code {c}"));
            let stderr = output.stderr.trim();
            if stderr.is_empty() {
                Err(format!("exited with {code}"))
            } else {
                Err(format!("exited with {code}: {stderr}"))
            }
        }
        Err(err) => Err(format!("could not start `{}`: {err}", spec.program)),
    }
}

/// Download the diff at `diff_url` into the working directory, apply it and
/// remove the downloaded file.
///
/// A failed download stops before `patch` is invoked. When `patch` fails the
/// cleanup policy decides whether the diff file is removed; the patch error
/// is returned either way.
#[instrument(skip(runner, commands), fields(workdir = %commands.workdir().display()))]
pub async fn apply_patch(
    runner: &dyn CommandRunner,
    commands: &PatchCommands<'_>,
    diff_url: &str,
    policy: CleanupPolicy,
) -> Result<(), PatchError> {
    let fetch = commands.fetch(diff_url);
    run_checked(runner, &fetch)
        .await
        .map_err(|detail| PatchError::Fetch {
            command: fetch.to_string(),
            detail,
        })?;
    info!(file = %commands.patch_file().display(), "diff downloaded");

    let apply = commands.apply();
    if let Err(detail) = run_checked(runner, &apply).await {
        match policy {
            CleanupPolicy::Always => {
                let cleanup = commands.cleanup();
                if let Err(cleanup_detail) = run_checked(runner, &cleanup).await {
                    warn!(command = %cleanup, detail = %cleanup_detail, "could not remove diff file after failed patch");
                }
            }
            CleanupPolicy::OnSuccess => {
                debug!(file = %commands.patch_file().display(), "leaving diff file in place");
            }
        }
        return Err(PatchError::Apply {
            command: apply.to_string(),
            detail,
        });
    }
    info!("patch applied");

    let cleanup = commands.cleanup();
    run_checked(runner, &cleanup)
        .await
        .map_err(|detail| PatchError::Cleanup {
            command: cleanup.to_string(),
            detail,
        })?;
    debug!("diff file removed");
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::runner::CommandOutput;
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    pub const DIFF_BODY: &str = "diff --git a/README.md b/README.md\n";

    /// Records every invocation and mimics curl/patch/rm on a real directory.
    ///
    /// `curl` writes [`DIFF_BODY`] to the `-o` target, `rm` deletes its
    /// argument, anything else just succeeds. Programs listed in `failing`
    /// exit with code 1 and leave the filesystem alone; programs in
    /// `missing` cannot be started.
    #[derive(Default)]
    pub struct FakeRunner {
        pub calls: Mutex<Vec<CommandSpec>>,
        pub failing: HashSet<String>,
        pub missing: HashSet<String>,
    }

    impl FakeRunner {
        pub fn failing(program: &str) -> Self {
            Self {
                failing: HashSet::from([program.to_string()]),
                ..Default::default()
            }
        }

        pub fn programs(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|c| c.program.clone())
                .collect()
        }
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, std::io::Error> {
            self.calls.lock().unwrap().push(spec.clone());
            if self.missing.contains(&spec.program) {
                return Err(std::io::Error::new(std::io::ErrorKind::NotFound, "not found"));
            }
            if self.failing.contains(&spec.program) {
                return Ok(CommandOutput {
                    code: Some(1),
                    stdout: String::new(),
                    stderr: format!("{} failed\n", spec.program),
                });
            }
            match spec.program.as_str() {
                "curl" => {
                    let target = spec
                        .args
                        .iter()
                        .skip_while(|a| a.as_str() != "-o")
                        .nth(1)
                        .expect("fetch command has an -o target");
                    std::fs::write(spec.cwd.join(target), DIFF_BODY)?;
                }
                "rm" => {
                    for arg in &spec.args {
                        std::fs::remove_file(spec.cwd.join(arg))?;
                    }
                }
                _ => {}
            }
            Ok(CommandOutput {
                code: Some(0),
                ..Default::default()
            })
        }
    }

    const URL: &str = "https://host/acme/widget/compare/2.3.0...2.3.0-patches.diff";

    #[test]
    fn test_working_dir_without_sub_path_is_workspace() {
        assert_eq!(working_dir(Path::new("/ws/root"), None), PathBuf::from("/ws/root"));
        assert_eq!(working_dir(Path::new("/ws/root"), Some("")), PathBuf::from("/ws/root"));
    }

    #[test]
    fn test_working_dir_appends_sub_path() {
        let dir = working_dir(Path::new("/ws/root"), Some("packages/app"));
        assert_eq!(
            dir.to_str().unwrap(),
            format!("/ws/root{MAIN_SEPARATOR}packages/app")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_working_dir_concatenates_absolute_sub_path() {
        let dir = working_dir(Path::new("/ws/root"), Some("/abs"));
        assert_eq!(dir.to_str().unwrap(), "/ws/root//abs");
    }

    #[test]
    fn test_working_dir_makes_relative_workspace_absolute() {
        let dir = working_dir(Path::new("ws"), None);
        assert!(dir.is_absolute());
        assert!(dir.ends_with("ws"));
    }

    #[test]
    fn test_default_commands() {
        let settings = CommandSettings::default();
        let commands = PatchCommands::new(&settings, PathBuf::from("/ws"));

        let fetch = commands.fetch(URL);
        assert_eq!(fetch.to_string(), format!("curl -Ls {URL} -o patch.diff"));
        assert_eq!(fetch.cwd, PathBuf::from("/ws"));
        assert_eq!(commands.apply().to_string(), "patch -p1 -i patch.diff");
        assert_eq!(commands.cleanup().to_string(), "rm patch.diff");
        assert_eq!(commands.patch_file(), PathBuf::from("/ws/patch.diff"));
    }

    #[tokio::test]
    async fn test_apply_patch_success_removes_diff_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = CommandSettings::default();
        let commands = PatchCommands::new(&settings, dir.path().to_path_buf());
        let runner = FakeRunner::default();

        apply_patch(&runner, &commands, URL, CleanupPolicy::Always)
            .await
            .unwrap();

        assert_eq!(runner.programs(), vec!["curl", "patch", "rm"]);
        assert!(!dir.path().join("patch.diff").exists());
        assert!(runner
            .calls
            .lock()
            .unwrap()
            .iter()
            .all(|c| c.cwd == dir.path()));
    }

    #[tokio::test]
    async fn test_fetch_failure_skips_patch() {
        let dir = tempfile::tempdir().unwrap();
        let settings = CommandSettings::default();
        let commands = PatchCommands::new(&settings, dir.path().to_path_buf());
        let runner = FakeRunner::failing("curl");

        let err = apply_patch(&runner, &commands, URL, CleanupPolicy::Always)
            .await
            .unwrap_err();

        assert!(matches!(err, PatchError::Fetch { .. }));
        assert_eq!(runner.programs(), vec!["curl"]);
        assert!(err.to_string().contains("exited with code 1: curl failed"));
    }

    #[tokio::test]
    async fn test_missing_fetch_tool_is_a_fetch_error() {
        let dir = tempfile::tempdir().unwrap();
        let settings = CommandSettings::default();
        let commands = PatchCommands::new(&settings, dir.path().to_path_buf());
        let runner = FakeRunner {
            missing: HashSet::from(["curl".to_string()]),
            ..Default::default()
        };

        let err = apply_patch(&runner, &commands, URL, CleanupPolicy::Always)
            .await
            .unwrap_err();

        assert!(matches!(err, PatchError::Fetch { .. }));
        assert!(err.to_string().contains("could not start `curl`"));
        assert_eq!(runner.programs(), vec!["curl"]);
    }

    #[tokio::test]
    async fn test_patch_failure_always_policy_removes_diff_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = CommandSettings::default();
        let commands = PatchCommands::new(&settings, dir.path().to_path_buf());
        let runner = FakeRunner::failing("patch");

        let err = apply_patch(&runner, &commands, URL, CleanupPolicy::Always)
            .await
            .unwrap_err();

        assert!(matches!(err, PatchError::Apply { .. }));
        assert_eq!(runner.programs(), vec!["curl", "patch", "rm"]);
        assert!(!dir.path().join("patch.diff").exists());
    }

    #[tokio::test]
    async fn test_patch_failure_on_success_policy_keeps_diff_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = CommandSettings::default();
        let commands = PatchCommands::new(&settings, dir.path().to_path_buf());
        let runner = FakeRunner::failing("patch");

        let err = apply_patch(&runner, &commands, URL, CleanupPolicy::OnSuccess)
            .await
            .unwrap_err();

        assert!(matches!(err, PatchError::Apply { .. }));
        assert_eq!(runner.programs(), vec!["curl", "patch"]);
        let kept = std::fs::read_to_string(dir.path().join("patch.diff")).unwrap();
        assert_eq!(kept, DIFF_BODY);
    }

    #[tokio::test]
    async fn test_patch_error_survives_failed_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let settings = CommandSettings::default();
        let commands = PatchCommands::new(&settings, dir.path().to_path_buf());
        let runner = FakeRunner {
            failing: HashSet::from(["patch".to_string(), "rm".to_string()]),
            ..Default::default()
        };

        let err = apply_patch(&runner, &commands, URL, CleanupPolicy::Always)
            .await
            .unwrap_err();

        assert!(matches!(err, PatchError::Apply { .. }));
    }

    #[tokio::test]
    async fn test_cleanup_failure_after_success_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let settings = CommandSettings::default();
        let commands = PatchCommands::new(&settings, dir.path().to_path_buf());
        let runner = FakeRunner::failing("rm");

        let err = apply_patch(&runner, &commands, URL, CleanupPolicy::Always)
            .await
            .unwrap_err();

        assert!(matches!(err, PatchError::Cleanup { .. }));
        assert_eq!(err.to_string(), "Failed to remove diff file with `rm patch.diff`: exited with code 1: rm failed");
    }

    #[tokio::test]
    async fn test_nonexistent_workdir_fails_at_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let settings = CommandSettings::default();
        let commands = PatchCommands::new(&settings, dir.path().join("missing"));
        let runner = FakeRunner::default();

        let err = apply_patch(&runner, &commands, URL, CleanupPolicy::Always)
            .await
            .unwrap_err();

        assert!(matches!(err, PatchError::Fetch { .. }));
        assert_eq!(runner.programs(), vec!["curl"]);
    }
}
