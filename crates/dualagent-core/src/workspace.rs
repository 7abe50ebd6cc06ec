use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::time::Duration;

use crate::errors::{ApplyError, CoreError};
use crate::guard::{AllowList, validate_patch};

/// Fixed dotfile used to stage patches for `git apply`. Living inside the
/// workspace keeps cleanup to a single known target even on crash paths.
pub const TEMP_PATCH_FILE: &str = ".dualagent.patch";

const COMMAND_TIMEOUT: Duration = Duration::from_secs(600);

/// Outcome of one sub-process run. A spawn failure is reported in-band with
/// `exit_code = 1` rather than as an error; callers treat it like any other
/// failing command.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl RunResult {
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }

    fn spawn_failure(message: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: message.into(),
            exit_code: 1,
        }
    }
}

/// The cycle's exclusive view of the user workspace: guarded reads, patch
/// application, and sub-process execution rooted at `root`.
pub struct Workspace {
    root: PathBuf,
    allow_list: AllowList,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>, allow_list: AllowList) -> Self {
        Self {
            root: root.into(),
            allow_list,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    pub fn is_path_allowed(&self, path: &str) -> bool {
        self.allow_list.is_allowed(path)
    }

    pub async fn read_file(&self, path: &str) -> Result<String, CoreError> {
        let resolved = self.root.join(path);
        tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|error| {
                CoreError::Workspace(format!("failed to read '{}': {}", resolved.display(), error))
            })
    }

    /// Validate a patch against the allow-list, then apply it with
    /// `git apply --whitespace=nowarn`. The staged temp file is removed on
    /// every exit path.
    pub async fn apply_patch(&self, patch: &str) -> Result<(), CoreError> {
        validate_patch(patch, &self.allow_list)?;

        let temp_path = self.root.join(TEMP_PATCH_FILE);
        let mut payload = patch.to_string();
        if !payload.ends_with('\n') {
            payload.push('\n');
        }
        tokio::fs::write(&temp_path, payload)
            .await
            .map_err(|error| ApplyError::TempFile(error.to_string()))?;

        let applied = self.git_apply(&temp_path).await;
        let _ = tokio::fs::remove_file(&temp_path).await;
        applied
    }

    async fn git_apply(&self, temp_path: &Path) -> Result<(), CoreError> {
        let output = Command::new("git")
            .arg("apply")
            .arg("--whitespace=nowarn")
            .arg(temp_path)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|error| ApplyError::GitApply(format!("failed to spawn git: {}", error)))?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(ApplyError::GitApply(stderr).into())
    }

    /// Run `program argv...` with no shell, cwd at the workspace root, both
    /// pipes captured in full.
    pub async fn run_argv(&self, program: &str, args: &[String]) -> RunResult {
        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(COMMAND_TIMEOUT, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(error)) => {
                return RunResult::spawn_failure(format!(
                    "failed to spawn '{}': {}",
                    program, error
                ));
            }
            Err(_) => {
                return RunResult {
                    stdout: String::new(),
                    stderr: format!(
                        "command '{}' timed out after {}s",
                        program,
                        COMMAND_TIMEOUT.as_secs()
                    ),
                    exit_code: 124,
                };
            }
        };

        RunResult {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        }
    }

    /// Run an agent-emitted command line. Splitting is on spaces only:
    /// quoted arguments are a known restriction of the run and diagnostics
    /// channels, not something to paper over with shell parsing.
    pub async fn run_line(&self, line: &str) -> RunResult {
        let mut parts = line.split_whitespace();
        let Some(program) = parts.next() else {
            return RunResult::spawn_failure("empty command");
        };
        let args: Vec<String> = parts.map(str::to_string).collect();
        self.run_argv(program, &args).await
    }
}
