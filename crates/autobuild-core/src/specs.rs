//! Spec directory lifecycle: numbering, placeholder creation, orphan
//! cleanup, renaming once the task is known, and listing.

use crate::error::Result;
use crate::plan::ImplementationPlan;
use crate::requirements::Requirements;
use crate::review::review_status_summary;
use crate::{io, paths};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

pub const PENDING_NAME: &str = "pending";

/// Placeholder directories younger than this are left alone by cleanup.
pub const ORPHAN_MIN_AGE: Duration = Duration::from_secs(10 * 60);

const SKIP_WORDS: &[&str] = &[
    "a", "an", "the", "to", "for", "of", "in", "on", "at", "by", "with", "and", "or", "but",
    "is", "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does",
    "did", "will", "would", "could", "should", "may", "might", "must", "can", "this", "that",
    "these", "those", "i", "you", "we", "they", "it", "add", "create", "make", "implement",
    "build", "new", "using", "use", "via", "from",
];

/// Create the specs directory and keep `.auto-claude/` out of git.
pub fn init_specs_dir(root: &Path) -> Result<PathBuf> {
    let dir = paths::specs_dir(root);
    std::fs::create_dir_all(&dir)?;
    io::ensure_gitignore_entry(root, &format!("{}/", paths::AUTO_CLAUDE_DIR))?;
    Ok(dir)
}

/// Highest existing three-digit prefix plus one (1 when there are none).
pub fn next_spec_number(specs_dir: &Path) -> u32 {
    std::fs::read_dir(specs_dir)
        .map(|entries| {
            entries
                .flatten()
                .filter(|e| e.path().is_dir())
                .filter_map(|e| paths::spec_number(&e.file_name().to_string_lossy()))
                .max()
                .unwrap_or(0)
        })
        .unwrap_or(0)
        + 1
}

/// Create `NNN-pending` under the specs directory.
pub fn create_pending_spec_dir(specs_dir: &Path) -> Result<PathBuf> {
    let dir = specs_dir.join(format!("{:03}-{PENDING_NAME}", next_spec_number(specs_dir)));
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn is_pending_name(name: &str) -> bool {
    paths::spec_number(name).is_some() && name.len() == 4 + PENDING_NAME.len() && name.ends_with(PENDING_NAME)
}

fn has_content(dir: &Path) -> bool {
    [paths::REQUIREMENTS_JSON, paths::SPEC_MD, paths::PLAN_JSON]
        .iter()
        .any(|f| dir.join(f).exists())
}

/// Remove placeholder directories with no requirements, spec or plan that
/// are older than [`ORPHAN_MIN_AGE`] at `now`. Returns what was removed.
pub fn cleanup_orphaned_pending(specs_dir: &Path, now: SystemTime) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(specs_dir) else {
        return Vec::new();
    };
    let mut removed = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() || !is_pending_name(&entry.file_name().to_string_lossy()) {
            continue;
        }
        if has_content(&path) {
            continue;
        }
        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };
        let age = now.duration_since(modified).unwrap_or_default();
        if age < ORPHAN_MIN_AGE {
            continue;
        }
        match std::fs::remove_dir_all(&path) {
            Ok(()) => {
                tracing::info!(dir = %path.display(), "removed orphaned pending spec");
                removed.push(path);
            }
            Err(e) => tracing::warn!(dir = %path.display(), error = %e, "could not remove orphan"),
        }
    }
    removed
}

/// Kebab-case name from a task description: the first four meaningful words.
pub fn generate_spec_name(task: &str) -> String {
    let cleaned: String = task
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == ' ' { c } else { ' ' })
        .collect();
    let words: Vec<&str> = cleaned.split_whitespace().collect();
    let meaningful: Vec<&str> = words
        .iter()
        .copied()
        .filter(|w| !SKIP_WORDS.contains(w) && w.chars().count() > 2)
        .take(4)
        .collect();
    let parts = if meaningful.is_empty() {
        words.into_iter().take(4).collect()
    } else {
        meaningful
    };
    if parts.is_empty() {
        "spec".to_string()
    } else {
        parts.join("-")
    }
}

/// Rename a placeholder spec directory after its requirements' task.
///
/// Only directories still named `pending` are renamed, and never onto an
/// existing directory. Returns the directory to use from now on.
pub fn rename_from_requirements(spec_dir: &Path) -> Result<PathBuf> {
    let Some(req) = Requirements::load(spec_dir) else {
        return Ok(spec_dir.to_path_buf());
    };
    if req.task_description.trim().is_empty() {
        return Ok(spec_dir.to_path_buf());
    }
    let current = spec_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if !current.contains(PENDING_NAME) {
        return Ok(spec_dir.to_path_buf());
    }
    let prefix = if paths::spec_number(&current).is_some() {
        &current[..4]
    } else {
        ""
    };
    let target_name = format!("{prefix}{}", generate_spec_name(&req.task_description));
    let Some(parent) = spec_dir.parent() else {
        return Ok(spec_dir.to_path_buf());
    };
    let target = parent.join(&target_name);
    if target.exists() {
        return Ok(spec_dir.to_path_buf());
    }
    std::fs::rename(spec_dir, &target)?;
    tracing::info!(from = %current, to = %target_name, "renamed spec directory");
    Ok(target)
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct SpecSummary {
    pub name: String,
    pub path: PathBuf,
    pub has_spec: bool,
    pub approved: bool,
    pub approval_valid: bool,
    pub chunks_completed: usize,
    pub chunks_total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qa_status: Option<String>,
}

impl SpecSummary {
    pub fn review_label(&self) -> &'static str {
        match (self.approved, self.approval_valid) {
            (true, true) => "approved",
            (true, false) => "stale",
            _ => "unreviewed",
        }
    }
}

pub fn summarize_spec(spec_dir: &Path) -> SpecSummary {
    let review = review_status_summary(spec_dir);
    let plan = ImplementationPlan::load(spec_dir);
    let (chunks_completed, chunks_total) = plan.as_ref().map_or((0, 0), |p| p.chunk_counts());
    SpecSummary {
        name: spec_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        path: spec_dir.to_path_buf(),
        has_spec: spec_dir.join(paths::SPEC_MD).exists(),
        approved: review.approved,
        approval_valid: review.valid,
        chunks_completed,
        chunks_total,
        qa_status: plan.as_ref().and_then(|p| p.qa_status().map(String::from)),
    }
}

/// Every spec directory, sorted by name.
pub fn list_specs(root: &Path) -> Result<Vec<SpecSummary>> {
    let dir = paths::specs_dir(root);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(&dir)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs.iter().map(|d| summarize_spec(d)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn numbering_uses_highest_prefix() {
        let dir = TempDir::new().unwrap();
        assert_eq!(next_spec_number(dir.path()), 1);
        std::fs::create_dir(dir.path().join("001-a")).unwrap();
        std::fs::create_dir(dir.path().join("007-b")).unwrap();
        std::fs::create_dir(dir.path().join("notes")).unwrap();
        assert_eq!(next_spec_number(dir.path()), 8);
        let created = create_pending_spec_dir(dir.path()).unwrap();
        assert!(created.ends_with("008-pending"));
    }

    #[test]
    fn spec_names() {
        assert_eq!(
            generate_spec_name("Add user authentication with OAuth to the API"),
            "user-authentication-oauth-api"
        );
        assert_eq!(generate_spec_name("Fix it!"), "fix");
        assert_eq!(generate_spec_name("do it"), "do-it");
        assert_eq!(generate_spec_name("   "), "spec");
    }

    #[test]
    fn orphan_cleanup_respects_age_and_content() {
        let dir = TempDir::new().unwrap();
        let empty = dir.path().join("001-pending");
        let with_req = dir.path().join("002-pending");
        let named = dir.path().join("003-login");
        for d in [&empty, &with_req, &named] {
            std::fs::create_dir(d).unwrap();
        }
        std::fs::write(with_req.join(paths::REQUIREMENTS_JSON), "{}").unwrap();

        assert!(cleanup_orphaned_pending(dir.path(), SystemTime::now()).is_empty());

        let later = SystemTime::now() + Duration::from_secs(11 * 60);
        let removed = cleanup_orphaned_pending(dir.path(), later);
        assert_eq!(removed, vec![empty.clone()]);
        assert!(!empty.exists());
        assert!(with_req.exists());
        assert!(named.exists());
    }

    #[test]
    fn rename_only_pending_and_never_clobbers() {
        let dir = TempDir::new().unwrap();
        let pending = dir.path().join("004-pending");
        std::fs::create_dir(&pending).unwrap();
        Requirements::from_task("Add dark mode toggle").save(&pending).unwrap();

        let renamed = rename_from_requirements(&pending).unwrap();
        assert!(renamed.ends_with("004-dark-mode-toggle"));
        assert!(renamed.join(paths::REQUIREMENTS_JSON).exists());

        // Already named: unchanged.
        assert_eq!(rename_from_requirements(&renamed).unwrap(), renamed);

        let other = dir.path().join("005-pending");
        std::fs::create_dir(&other).unwrap();
        Requirements::from_task("Add dark mode toggle").save(&other).unwrap();
        std::fs::create_dir(dir.path().join("005-dark-mode-toggle")).unwrap();
        assert_eq!(rename_from_requirements(&other).unwrap(), other);
    }

    #[test]
    fn list_reports_review_and_build_state() {
        let dir = TempDir::new().unwrap();
        let spec = paths::spec_dir(dir.path(), "001-export");
        std::fs::create_dir_all(&spec).unwrap();
        crate::plan::create_minimal_plan(&spec, "Export CSV").unwrap();
        let list = list_specs(dir.path()).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].chunks_total, 1);
        assert_eq!(list[0].review_label(), "unreviewed");
    }
}
