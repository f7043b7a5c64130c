use crate::error::{AutobuildError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const AUTO_CLAUDE_DIR: &str = ".auto-claude";
pub const SPECS_DIR: &str = ".auto-claude/specs";
pub const WORKTREES_DIR: &str = ".auto-claude/worktrees";
pub const PROMPTS_DIR: &str = ".auto-claude/prompts";
pub const CONFIG_FILE: &str = ".auto-claude/config.yaml";
pub const BUILD_STATUS_FILE: &str = ".auto-claude-status";

/// Branch prefix for isolated build worktrees.
pub const BRANCH_PREFIX: &str = "auto-claude/";

// ---------------------------------------------------------------------------
// Spec artifact filenames
// ---------------------------------------------------------------------------

pub const REQUIREMENTS_JSON: &str = "requirements.json";
pub const RESEARCH_JSON: &str = "research.json";
pub const CONTEXT_JSON: &str = "context.json";
pub const SPEC_MD: &str = "spec.md";
pub const CRITIQUE_JSON: &str = "critique_report.json";
pub const PLAN_JSON: &str = "implementation_plan.json";
pub const COMPLEXITY_JSON: &str = "complexity_assessment.json";
pub const GRAPH_HINTS_JSON: &str = "graph_hints.json";
pub const TEST_DISCOVERY_JSON: &str = "test_discovery.json";
pub const PROJECT_INDEX_JSON: &str = "project_index.json";
pub const REVIEW_STATE_JSON: &str = "review_state.json";
pub const TASK_LOGS_JSON: &str = "task_logs.json";
pub const QA_REPORT_MD: &str = "qa_report.md";
pub const QA_FIX_REQUEST_MD: &str = "QA_FIX_REQUEST.md";
pub const QA_ESCALATION_MD: &str = "QA_ESCALATION.md";
pub const MANUAL_TEST_PLAN_MD: &str = "MANUAL_TEST_PLAN.md";
pub const FOLLOWUP_REQUEST_MD: &str = "FOLLOWUP_REQUEST.md";
pub const HUMAN_INPUT_MD: &str = "HUMAN_INPUT.md";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn auto_claude_dir(root: &Path) -> PathBuf {
    root.join(AUTO_CLAUDE_DIR)
}

pub fn specs_dir(root: &Path) -> PathBuf {
    root.join(SPECS_DIR)
}

pub fn spec_dir(root: &Path, name: &str) -> PathBuf {
    specs_dir(root).join(name)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn prompts_dir(root: &Path) -> PathBuf {
    root.join(PROMPTS_DIR)
}

pub fn worktrees_dir(root: &Path) -> PathBuf {
    root.join(WORKTREES_DIR)
}

pub fn worktree_path(root: &Path, spec_name: &str) -> PathBuf {
    worktrees_dir(root).join(spec_name)
}

pub fn build_status_path(root: &Path) -> PathBuf {
    root.join(BUILD_STATUS_FILE)
}

pub fn branch_name(spec_name: &str) -> String {
    format!("{BRANCH_PREFIX}{spec_name}")
}

// ---------------------------------------------------------------------------
// Spec name validation
// ---------------------------------------------------------------------------

static NUMBERED_RE: OnceLock<Regex> = OnceLock::new();

fn numbered_re() -> &'static Regex {
    NUMBERED_RE.get_or_init(|| Regex::new(r"^(\d{3})-").unwrap())
}

/// Reject spec names that could escape the specs directory.
pub fn validate_spec_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
        || name.contains('\0')
    {
        return Err(AutobuildError::InvalidSpecName(name.to_string()));
    }
    Ok(())
}

/// Numeric prefix of a spec directory name (`"007-login"` → `Some(7)`).
pub fn spec_number(name: &str) -> Option<u32> {
    numbered_re()
        .captures(name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Resolve a user-supplied spec reference to its directory.
///
/// Accepts an exact directory name, a bare number (`"3"`, `"003"`) or a
/// unique name prefix (`"003-log"`).
pub fn resolve_spec(root: &Path, reference: &str) -> Result<PathBuf> {
    validate_spec_name(reference)?;
    let specs = specs_dir(root);
    let exact = specs.join(reference);
    if exact.is_dir() {
        return Ok(exact);
    }
    let wanted_number: Option<u32> = reference.parse().ok();
    let mut matches = Vec::new();
    if let Ok(entries) = std::fs::read_dir(&specs) {
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let by_number = wanted_number.is_some() && spec_number(&name) == wanted_number;
            if by_number || name.starts_with(reference) {
                matches.push(path);
            }
        }
    }
    match matches.len() {
        1 => Ok(matches.remove(0)),
        _ => Err(AutobuildError::SpecNotFound(reference.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
