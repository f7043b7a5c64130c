//! Deterministic helper scripts (project analyzer, context discovery,
//! planner) run as subprocesses with a timeout.

use crate::error::{AutobuildError, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Outcome of one script run. `output` is stdout on success and stderr
/// (or stdout when stderr is empty) on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptResult {
    pub success: bool,
    pub output: String,
}

impl ScriptResult {
    fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScriptRunner {
    project_dir: PathBuf,
    timeout: Duration,
}

impl ScriptRunner {
    pub fn new(project_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            project_dir: project_dir.into(),
            timeout,
        }
    }

    /// Run `script` from the project directory. Never errors: a missing
    /// script, spawn failure or timeout is reported in the result.
    pub async fn run(&self, script: &Path, args: &[String]) -> ScriptResult {
        if !script.is_file() {
            return ScriptResult::failed(format!("Script not found: {}", script.display()));
        }
        let mut cmd = match command_for(script) {
            Ok(c) => c,
            Err(e) => return ScriptResult::failed(e.to_string()),
        };
        cmd.args(args)
            .current_dir(&self.project_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(script = %script.display(), ?args, "running script");
        let child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                return ScriptResult::failed(format!(
                    "failed to spawn '{}': {e}",
                    script.display()
                ))
            }
        };

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Err(_) => {
                tracing::warn!(script = %script.display(), timeout = ?self.timeout, "script timed out");
                ScriptResult::failed("Script timed out")
            }
            Ok(Err(e)) => ScriptResult::failed(e.to_string()),
            Ok(Ok(out)) => {
                let stdout = String::from_utf8_lossy(&out.stdout).into_owned();
                if out.status.success() {
                    ScriptResult {
                        success: true,
                        output: stdout,
                    }
                } else {
                    let stderr = String::from_utf8_lossy(&out.stderr).into_owned();
                    ScriptResult::failed(if stderr.trim().is_empty() { stdout } else { stderr })
                }
            }
        }
    }
}

/// Python scripts go through the first interpreter on PATH, shell scripts
/// through `sh`, anything else is executed directly.
fn command_for(script: &Path) -> Result<Command> {
    match script.extension().and_then(|e| e.to_str()) {
        Some("py") => {
            let python = which::which("python3")
                .or_else(|_| which::which("python"))
                .map_err(|_| AutobuildError::ScriptSpawnFailed("python interpreter not found".into()))?;
            let mut cmd = Command::new(python);
            cmd.arg(script);
            Ok(cmd)
        }
        Some("sh") => {
            let mut cmd = Command::new("sh");
            cmd.arg(script);
            Ok(cmd)
        }
        _ => Ok(Command::new(script)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn missing_script_is_reported() {
        let dir = TempDir::new().unwrap();
        let runner = ScriptRunner::new(dir.path(), DEFAULT_TIMEOUT);
        let r = runner.run(&dir.path().join("nope.py"), &[]).await;
        assert!(!r.success);
        assert!(r.output.starts_with("Script not found:"));
    }

    #[tokio::test]
    async fn shell_script_output_and_failure() {
        let dir = TempDir::new().unwrap();
        let runner = ScriptRunner::new(dir.path(), DEFAULT_TIMEOUT);
        let ok = write_script(dir.path(), "ok.sh", "echo \"hello $1\"\n");
        let r = runner.run(&ok, &["world".into()]).await;
        assert!(r.success);
        assert_eq!(r.output.trim(), "hello world");

        let bad = write_script(dir.path(), "bad.sh", "echo out\necho boom >&2\nexit 3\n");
        let r = runner.run(&bad, &[]).await;
        assert!(!r.success);
        assert_eq!(r.output.trim(), "boom");
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let dir = TempDir::new().unwrap();
        let runner = ScriptRunner::new(dir.path(), Duration::from_millis(100));
        let slow = write_script(dir.path(), "slow.sh", "sleep 5\n");
        let r = runner.run(&slow, &[]).await;
        assert_eq!(r, ScriptResult::failed("Script timed out"));
    }
}
