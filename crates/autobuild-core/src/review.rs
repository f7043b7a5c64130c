//! Human approval of a spec.
//!
//! Approval is stored in `review_state.json` together with a content hash of
//! `spec.md` and `implementation_plan.json`. Any later edit to either file
//! changes the hash, so a stale approval is detected lazily the next time
//! [`ReviewState::is_approval_valid`] is asked.

use crate::error::Result;
use crate::{io, paths};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// MD5 of a file's bytes as 32 hex chars; empty string when unreadable.
pub fn compute_file_hash(path: &Path) -> String {
    match std::fs::read(path) {
        Ok(bytes) => hex::encode(Md5::digest(&bytes)),
        Err(_) => String::new(),
    }
}

/// Combined hash of the reviewed artifacts. Never fails: missing files
/// contribute an empty string.
pub fn compute_spec_hash(spec_dir: &Path) -> String {
    let spec = compute_file_hash(&spec_dir.join(paths::SPEC_MD));
    let plan = compute_file_hash(&spec_dir.join(paths::PLAN_JSON));
    hex::encode(Md5::digest(format!("{spec}{plan}").as_bytes()))
}

// ---------------------------------------------------------------------------
// ReviewState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewState {
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub approved_by: String,
    #[serde(default)]
    pub approved_at: String,
    #[serde(default)]
    pub feedback: Vec<String>,
    #[serde(default)]
    pub spec_hash: String,
    /// Bumped by `approve` and `reject` only.
    #[serde(default)]
    pub review_count: u32,
}

impl ReviewState {
    /// Load the state, falling back to defaults when the file is missing,
    /// empty or unparsable.
    pub fn load(spec_dir: &Path) -> Self {
        io::read_json_lenient(&spec_dir.join(paths::REVIEW_STATE_JSON)).unwrap_or_default()
    }

    pub fn save(&self, spec_dir: &Path) -> Result<()> {
        io::write_json(&spec_dir.join(paths::REVIEW_STATE_JSON), self)
    }

    pub fn is_approved(&self) -> bool {
        self.approved
    }

    /// Approved, and either approved before hashing existed (empty hash) or
    /// the reviewed files are unchanged since.
    pub fn is_approval_valid(&self, spec_dir: &Path) -> bool {
        if !self.approved {
            return false;
        }
        self.spec_hash.is_empty() || self.spec_hash == compute_spec_hash(spec_dir)
    }

    pub fn approve(&mut self, spec_dir: &Path, approved_by: &str, auto_save: bool) -> Result<()> {
        self.approved = true;
        self.approved_by = approved_by.to_string();
        self.approved_at = now();
        self.spec_hash = compute_spec_hash(spec_dir);
        self.review_count += 1;
        tracing::info!(spec_dir = %spec_dir.display(), approved_by, "spec approved");
        self.persist(spec_dir, auto_save)
    }

    /// Deliberate rejection: drops the approver along with the approval.
    pub fn reject(&mut self, spec_dir: &Path, auto_save: bool) -> Result<()> {
        self.approved = false;
        self.approved_by.clear();
        self.approved_at.clear();
        self.spec_hash.clear();
        self.review_count += 1;
        tracing::info!(spec_dir = %spec_dir.display(), "spec rejected");
        self.persist(spec_dir, auto_save)
    }

    /// Withdraw approval after the spec changed. `approved_by` is kept as a
    /// record of the earlier approval and `review_count` is left alone.
    pub fn invalidate(&mut self, spec_dir: &Path, auto_save: bool) -> Result<()> {
        self.approved = false;
        self.approved_at.clear();
        self.spec_hash.clear();
        tracing::info!(spec_dir = %spec_dir.display(), "approval invalidated");
        self.persist(spec_dir, auto_save)
    }

    /// Re-record the hash of an approval that is still in force after the
    /// builder itself changed the plan (chunk statuses, QA sign-off).
    /// Counters and approver are untouched; unapproved state is left alone.
    pub fn restamp(&mut self, spec_dir: &Path, auto_save: bool) -> Result<()> {
        if !self.approved {
            return Ok(());
        }
        self.spec_hash = compute_spec_hash(spec_dir);
        self.persist(spec_dir, auto_save)
    }

    pub fn add_feedback(&mut self, text: &str, spec_dir: &Path, auto_save: bool) -> Result<()> {
        let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M");
        self.feedback.push(format!("[{stamp}] {text}"));
        self.persist(spec_dir, auto_save)
    }

    fn persist(&self, spec_dir: &Path, auto_save: bool) -> Result<()> {
        if auto_save {
            self.save(spec_dir)?;
        }
        Ok(())
    }
}

fn now() -> String {
    chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ReviewSummary {
    pub approved: bool,
    pub valid: bool,
    pub approved_by: String,
    pub approved_at: String,
    pub review_count: u32,
    pub feedback_count: usize,
    /// Approved with a hash that no longer matches the files.
    pub spec_changed: bool,
}

pub fn review_status_summary(spec_dir: &Path) -> ReviewSummary {
    let state = ReviewState::load(spec_dir);
    let valid = state.is_approval_valid(spec_dir);
    let spec_changed = state.approved
        && !state.spec_hash.is_empty()
        && state.spec_hash != compute_spec_hash(spec_dir);
    ReviewSummary {
        approved: state.approved,
        valid,
        approved_by: state.approved_by,
        approved_at: state.approved_at,
        review_count: state.review_count,
        feedback_count: state.feedback.len(),
        spec_changed,
    }
}

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewCheckpoint {
    /// A valid approval already exists.
    Approved,
    /// Approved on the spot by `--auto-approve`.
    AutoApproved,
    /// Waiting for a human; `stale` when an earlier approval was invalidated.
    AwaitingReview { stale: bool },
}

/// End-of-pipeline review gate.
pub fn review_checkpoint(spec_dir: &Path, auto_approve: bool) -> Result<ReviewCheckpoint> {
    let mut state = ReviewState::load(spec_dir);
    if state.is_approval_valid(spec_dir) {
        return Ok(ReviewCheckpoint::Approved);
    }
    let stale = state.approved;
    if stale {
        state.invalidate(spec_dir, true)?;
    }
    if auto_approve {
        state.approve(spec_dir, "auto", true)?;
        return Ok(ReviewCheckpoint::AutoApproved);
    }
    Ok(ReviewCheckpoint::AwaitingReview { stale })
}

// ---------------------------------------------------------------------------
// Review choices
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewChoice {
    Approve,
    EditSpec,
    EditPlan,
    Feedback,
    Reject,
}

impl ReviewChoice {
    pub const ALL: [ReviewChoice; 5] = [
        ReviewChoice::Approve,
        ReviewChoice::EditSpec,
        ReviewChoice::EditPlan,
        ReviewChoice::Feedback,
        ReviewChoice::Reject,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReviewChoice::Approve => "approve",
            ReviewChoice::EditSpec => "edit_spec",
            ReviewChoice::EditPlan => "edit_plan",
            ReviewChoice::Feedback => "feedback",
            ReviewChoice::Reject => "reject",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ReviewChoice::Approve => "Approve and continue",
            ReviewChoice::EditSpec => "Edit specification",
            ReviewChoice::EditPlan => "Edit implementation plan",
            ReviewChoice::Feedback => "Add feedback",
            ReviewChoice::Reject => "Reject",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ReviewChoice::Approve => "The plan looks good, proceed with the build",
            ReviewChoice::EditSpec => "Open spec.md in $EDITOR, then review again",
            ReviewChoice::EditPlan => "Open implementation_plan.json in $EDITOR, then review again",
            ReviewChoice::Feedback => "Record a comment without approving",
            ReviewChoice::Reject => "Stop here without starting the build",
        }
    }
}

impl std::fmt::Display for ReviewChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReviewChoice {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.replace('-', "_").as_str() {
            "approve" => Ok(ReviewChoice::Approve),
            "edit_spec" => Ok(ReviewChoice::EditSpec),
            "edit_plan" => Ok(ReviewChoice::EditPlan),
            "feedback" => Ok(ReviewChoice::Feedback),
            "reject" => Ok(ReviewChoice::Reject),
            other => Err(format!(
                "unknown review choice '{other}': expected one of approve, edit_spec, edit_plan, feedback, reject"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Text helpers
// ---------------------------------------------------------------------------

/// Body of the markdown section starting with `header`, up to the next
/// header of the same or higher level. Empty when absent.
pub fn extract_section(content: &str, header: &str) -> String {
    let level = header.chars().take_while(|c| *c == '#').count().max(1);
    let mut lines = content.lines();
    if !lines.any(|l| l.trim_end() == header.trim_end()) {
        return String::new();
    }
    let mut body = Vec::new();
    for line in lines {
        let hashes = line.chars().take_while(|c| *c == '#').count();
        if hashes > 0 && hashes <= level && line[hashes..].starts_with(' ') {
            break;
        }
        body.push(line);
    }
    body.join("\n").trim().to_string()
}

/// Limit `text` to `max_lines` lines and `max_chars` characters, marking
/// any cut with `...`.
pub fn truncate_text(text: &str, max_lines: usize, max_chars: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let mut out = if lines.len() > max_lines {
        format!("{}\n...", lines[..max_lines].join("\n"))
    } else {
        text.to_string()
    };
    if out.chars().count() > max_chars {
        let keep: String = out.chars().take(max_chars.saturating_sub(3)).collect();
        out = format!("{keep}...");
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
