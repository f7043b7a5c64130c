//! Isolated build workspaces.
//!
//! Each spec builds in its own git worktree at
//! `.auto-claude/worktrees/<spec>` on branch `auto-claude/<spec>`, so the
//! user's checkout is untouched until they merge. `.auto-claude/` is
//! ignored by git, which means the spec directory has to be copied into
//! the worktree and progress copied back.

use crate::error::{AutobuildError, Result};
use crate::git::Git;
use crate::paths;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Spec artifacts the build or QA loop changes inside the worktree.
const SYNCED_ARTIFACTS: &[&str] = &[
    paths::PLAN_JSON,
    paths::TASK_LOGS_JSON,
    paths::QA_REPORT_MD,
    paths::QA_FIX_REQUEST_MD,
    paths::QA_ESCALATION_MD,
    paths::MANUAL_TEST_PLAN_MD,
];

#[derive(Debug, Clone, Serialize)]
pub struct WorktreeInfo {
    pub spec_name: String,
    pub branch: String,
    pub path: PathBuf,
    pub base_branch: String,
    pub commit_count: usize,
    pub files_changed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorktreeReview {
    pub info: WorktreeInfo,
    pub changed_files: Vec<String>,
    pub diff_stat: String,
}

pub struct WorktreeManager {
    project_dir: PathBuf,
    git: Git,
}

impl WorktreeManager {
    pub fn new(project_dir: &Path) -> Self {
        Self {
            project_dir: project_dir.to_path_buf(),
            git: Git::new(project_dir),
        }
    }

    pub fn is_available(&self) -> bool {
        self.git.is_repo()
    }

    pub fn path_for(&self, spec_name: &str) -> PathBuf {
        paths::worktree_path(&self.project_dir, spec_name)
    }

    pub fn get(&self, spec_name: &str) -> Option<WorktreeInfo> {
        let path = self.path_for(spec_name);
        if !path.is_dir() {
            return None;
        }
        let branch = paths::branch_name(spec_name);
        let base_branch = self.git.current_branch().unwrap_or_else(|_| "HEAD".to_string());
        let commit_count = self.git.commit_count(&base_branch, &branch).unwrap_or(0);
        let files_changed = self
            .git
            .changed_files(&base_branch, &branch)
            .map(|f| f.len())
            .unwrap_or(0);
        Some(WorktreeInfo {
            spec_name: spec_name.to_string(),
            branch,
            path,
            base_branch,
            commit_count,
            files_changed,
        })
    }

    fn require(&self, spec_name: &str) -> Result<WorktreeInfo> {
        self.get(spec_name)
            .ok_or_else(|| AutobuildError::WorktreeNotFound(spec_name.to_string()))
    }

    /// Create the worktree (reusing the branch if it survived a discard of
    /// the directory) or return the existing one.
    pub fn ensure(&self, spec_name: &str) -> Result<WorktreeInfo> {
        paths::validate_spec_name(spec_name)?;
        if let Some(info) = self.get(spec_name) {
            return Ok(info);
        }
        let path = self.path_for(spec_name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let branch = paths::branch_name(spec_name);
        let create = !self.git.branch_exists(&branch)?;
        self.git.worktree_add(&path, &branch, create)?;
        tracing::info!(spec = spec_name, branch = %branch, "created worktree");
        self.require(spec_name)
    }

    /// Copy the spec directory into the worktree; returns the copy's path.
    pub fn localize_spec(&self, spec_name: &str, source_spec_dir: &Path) -> Result<PathBuf> {
        let target = paths::spec_dir(&self.path_for(spec_name), spec_name);
        copy_dir(source_spec_dir, &target)?;
        Ok(target)
    }

    pub fn list(&self) -> Vec<WorktreeInfo> {
        let Ok(entries) = std::fs::read_dir(paths::worktrees_dir(&self.project_dir)) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .flatten()
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names.iter().filter_map(|n| self.get(n)).collect()
    }

    pub fn review(&self, spec_name: &str) -> Result<WorktreeReview> {
        let info = self.require(spec_name)?;
        let changed_files = self.git.changed_files(&info.base_branch, &info.branch)?;
        let diff_stat = self.git.diff_stat(&info.base_branch, &info.branch)?;
        Ok(WorktreeReview {
            info,
            changed_files,
            diff_stat,
        })
    }

    /// Merge the spec branch into the current branch. With `no_commit` the
    /// merge is left staged and the branch kept; otherwise the worktree and
    /// branch are removed afterwards.
    pub fn merge(&self, spec_name: &str, no_commit: bool) -> Result<WorktreeInfo> {
        let info = self.require(spec_name)?;
        let worktree_git = Git::new(&info.path);
        if worktree_git.has_changes()? {
            worktree_git.add_all()?;
            worktree_git.commit(&format!("auto-claude: {spec_name} (uncommitted work)"))?;
        }
        self.git.merge(
            &info.branch,
            &format!("auto-claude: merge {spec_name}"),
            no_commit,
        )?;
        tracing::info!(spec = spec_name, no_commit, "merged worktree branch");
        self.git.worktree_remove(&info.path)?;
        if !no_commit {
            self.git.delete_branch(&info.branch)?;
        }
        Ok(info)
    }

    /// Remove the worktree and its branch. Nothing is merged.
    pub fn discard(&self, spec_name: &str) -> Result<()> {
        let info = self.require(spec_name)?;
        self.git.worktree_remove(&info.path)?;
        if self.git.branch_exists(&info.branch)? {
            self.git.delete_branch(&info.branch)?;
        }
        tracing::info!(spec = spec_name, "discarded worktree");
        Ok(())
    }

    /// Discard every spec worktree; returns the names removed.
    pub fn cleanup_all(&self) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        for info in self.list() {
            self.discard(&info.spec_name)?;
            removed.push(info.spec_name);
        }
        self.git.worktree_prune()?;
        Ok(removed)
    }
}

/// Copy build progress from the worktree's spec copy back to the source
/// spec directory. Returns the names copied.
pub fn sync_spec_back(localized: &Path, source: &Path) -> Result<Vec<String>> {
    if localized == source {
        return Ok(Vec::new());
    }
    let mut synced = Vec::new();
    for name in SYNCED_ARTIFACTS {
        let from = localized.join(name);
        if from.is_file() {
            std::fs::copy(&from, source.join(name))?;
            synced.push(name.to_string());
        }
    }
    Ok(synced)
}

fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::TempDir;

    fn git(dir: &Path, args: &[&str]) -> bool {
        Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Repo with one commit, or `None` when git is unavailable.
    fn repo() -> Option<TempDir> {
        let dir = TempDir::new().unwrap();
        let p = dir.path();
        let ok = git(p, &["init", "-q"])
            && git(p, &["config", "user.email", "dev@example.com"])
            && git(p, &["config", "user.name", "Dev"]);
        if !ok {
            return None;
        }
        std::fs::write(p.join(".gitignore"), ".auto-claude/\n").unwrap();
        std::fs::write(p.join("README.md"), "hello\n").unwrap();
        if !(git(p, &["add", "-A"]) && git(p, &["commit", "-q", "-m", "init"])) {
            return None;
        }
        Some(dir)
    }

    #[test]
    fn sync_copies_progress_only() {
        let dir = TempDir::new().unwrap();
        let (src, copy) = (dir.path().join("src"), dir.path().join("copy"));
        std::fs::create_dir_all(&src).unwrap();
        std::fs::create_dir_all(&copy).unwrap();
        std::fs::write(copy.join(paths::PLAN_JSON), "{}").unwrap();
        std::fs::write(copy.join(paths::SPEC_MD), "edited in worktree").unwrap();
        let synced = sync_spec_back(&copy, &src).unwrap();
        assert_eq!(synced, [paths::PLAN_JSON]);
        assert!(!src.join(paths::SPEC_MD).exists());
        assert!(sync_spec_back(&src, &src).unwrap().is_empty());
    }

    #[test]
    fn missing_worktree_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mgr = WorktreeManager::new(dir.path());
        assert!(mgr.list().is_empty());
        assert!(matches!(
            mgr.discard("001-x"),
            Err(AutobuildError::WorktreeNotFound(_))
        ));
    }

    #[test]
    fn create_commit_merge() {
        let Some(dir) = repo() else { return };
        let mgr = WorktreeManager::new(dir.path());
        let info = mgr.ensure("001-export").unwrap();
        assert_eq!(info.branch, "auto-claude/001-export");
        assert!(info.path.join("README.md").exists());

        let spec = paths::spec_dir(dir.path(), "001-export");
        std::fs::create_dir_all(&spec).unwrap();
        std::fs::write(spec.join(paths::SPEC_MD), "# Spec").unwrap();
        let local = mgr.localize_spec("001-export", &spec).unwrap();
        assert!(local.join(paths::SPEC_MD).exists());

        std::fs::write(info.path.join("export.txt"), "csv\n").unwrap();
        let review = mgr.review("001-export").unwrap();
        assert!(review.changed_files.is_empty());

        let merged = mgr.merge("001-export", false).unwrap();
        assert_eq!(merged.spec_name, "001-export");
        assert!(dir.path().join("export.txt").exists());
        assert!(mgr.get("001-export").is_none());
        assert!(!Git::new(dir.path()).branch_exists("auto-claude/001-export").unwrap());
    }

    #[test]
    fn cleanup_discards_all() {
        let Some(dir) = repo() else { return };
        let mgr = WorktreeManager::new(dir.path());
        mgr.ensure("001-a").unwrap();
        mgr.ensure("002-b").unwrap();
        assert_eq!(mgr.list().len(), 2);
        let removed = mgr.cleanup_all().unwrap();
        assert_eq!(removed, ["001-a", "002-b"]);
        assert!(mgr.list().is_empty());
    }
}
