//! Thin wrapper around `git` subprocess calls.

use crate::error::{AutobuildError, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::{debug, instrument};

#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// True when `workdir` is inside a git work tree.
    pub fn is_repo(&self) -> bool {
        self.run(&["rev-parse", "--is-inside-work-tree"])
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    pub fn current_branch(&self) -> Result<String> {
        Ok(self
            .run_capture(&["rev-parse", "--abbrev-ref", "HEAD"])?
            .trim()
            .to_string())
    }

    pub fn branch_exists(&self, branch: &str) -> Result<bool> {
        let out = self.run(&[
            "show-ref",
            "--verify",
            "--quiet",
            &format!("refs/heads/{branch}"),
        ])?;
        Ok(out.status.success())
    }

    /// Paths staged for commit (added, copied or modified).
    pub fn staged_files(&self) -> Result<Vec<String>> {
        let out = self.run_capture(&["diff", "--cached", "--name-only", "--diff-filter=ACM"])?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    pub fn has_changes(&self) -> Result<bool> {
        let out = self.run_capture(&["status", "--porcelain"])?;
        Ok(!out.trim().is_empty())
    }

    pub fn add_all(&self) -> Result<()> {
        self.run_checked(&["add", "-A"])?;
        Ok(())
    }

    /// Commit staged changes. Returns false when nothing was staged.
    #[instrument(skip_all)]
    pub fn commit(&self, message: &str) -> Result<bool> {
        let staged = self.run(&["diff", "--cached", "--quiet"])?;
        if staged.status.success() {
            debug!("nothing staged, skipping commit");
            return Ok(false);
        }
        self.run_checked(&["commit", "-m", message])?;
        Ok(true)
    }

    /// Number of commits on `branch` that are not on `base`.
    pub fn commit_count(&self, base: &str, branch: &str) -> Result<usize> {
        let out = self.run_capture(&["rev-list", "--count", &format!("{base}..{branch}")])?;
        Ok(out.trim().parse().unwrap_or(0))
    }

    /// `git diff --stat base...branch`.
    pub fn diff_stat(&self, base: &str, branch: &str) -> Result<String> {
        self.run_capture(&["diff", "--stat", &format!("{base}...{branch}")])
    }

    /// Files changed on `branch` since it forked from `base`.
    pub fn changed_files(&self, base: &str, branch: &str) -> Result<Vec<String>> {
        let out = self.run_capture(&["diff", "--name-only", &format!("{base}...{branch}")])?;
        Ok(out
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    #[instrument(skip_all, fields(branch))]
    pub fn worktree_add(&self, path: &Path, branch: &str, create_branch: bool) -> Result<()> {
        let path_str = path.to_string_lossy();
        if create_branch {
            self.run_checked(&["worktree", "add", "-b", branch, &path_str])?;
        } else {
            self.run_checked(&["worktree", "add", &path_str, branch])?;
        }
        Ok(())
    }

    pub fn worktree_remove(&self, path: &Path) -> Result<()> {
        let path_str = path.to_string_lossy();
        self.run_checked(&["worktree", "remove", "--force", &path_str])?;
        Ok(())
    }

    pub fn worktree_prune(&self) -> Result<()> {
        self.run_checked(&["worktree", "prune"])?;
        Ok(())
    }

    pub fn delete_branch(&self, branch: &str) -> Result<()> {
        self.run_checked(&["branch", "-D", branch])?;
        Ok(())
    }

    /// Merge `branch` into the current branch. With `no_commit` the result
    /// is left staged for the user to review.
    #[instrument(skip_all, fields(branch))]
    pub fn merge(&self, branch: &str, message: &str, no_commit: bool) -> Result<()> {
        if no_commit {
            self.run_checked(&["merge", "--no-ff", "--no-commit", branch])?;
        } else {
            self.run_checked(&["merge", "--no-ff", "-m", message, branch])?;
        }
        Ok(())
    }

    pub(crate) fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            return Err(AutobuildError::Git {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        debug!(args = %args.join(" "), "git");
        Ok(Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn non_repo_is_detected() {
        let dir = TempDir::new().unwrap();
        let git = Git::new(dir.path());
        // Either git is missing or the directory is not a work tree.
        if git.is_repo() {
            return;
        }
        assert!(git.staged_files().is_err());
    }
}
