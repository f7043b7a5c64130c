//! Structural checks over the spec directory, run by the validation phase.
//!
//! Each checkpoint returns a [`ValidationResult`] with errors (block the
//! pipeline), warnings (reported only) and suggested fixes that are handed
//! to the fixer agent between attempts.

use crate::error::Result;
use crate::plan::ChunkStatus;
use crate::{io, paths};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

pub const REQUIRED_SPEC_SECTIONS: &[&str] =
    &["Overview", "Workflow Type", "Task Scope", "Success Criteria"];

pub const RECOMMENDED_SPEC_SECTIONS: &[&str] = &[
    "Files to Modify",
    "Files to Reference",
    "Requirements",
    "QA Acceptance Criteria",
];

pub const MIN_SPEC_LENGTH: usize = 100;

pub const PHASE_TYPES: &[&str] = &[
    "setup",
    "implementation",
    "investigation",
    "integration",
    "cleanup",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Checkpoint {
    Prereqs,
    Context,
    SpecDocument,
    ImplementationPlan,
}

impl Checkpoint {
    pub fn as_str(self) -> &'static str {
        match self {
            Checkpoint::Prereqs => "prereqs",
            Checkpoint::Context => "context",
            Checkpoint::SpecDocument => "spec_document",
            Checkpoint::ImplementationPlan => "implementation_plan",
        }
    }
}

impl std::fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub checkpoint: Checkpoint,
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub fixes: Vec<String>,
}

impl ValidationResult {
    fn new(checkpoint: Checkpoint) -> Self {
        Self {
            checkpoint,
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            fixes: Vec::new(),
        }
    }

    fn error(&mut self, message: impl Into<String>, fix: Option<&str>) {
        self.valid = false;
        self.errors.push(message.into());
        if let Some(fix) = fix {
            if !self.fixes.iter().any(|f| f == fix) {
                self.fixes.push(fix.to_string());
            }
        }
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

// ---------------------------------------------------------------------------
// Checkpoints
// ---------------------------------------------------------------------------

pub fn validate_prereqs(spec_dir: &Path) -> ValidationResult {
    let mut r = ValidationResult::new(Checkpoint::Prereqs);
    if !spec_dir.is_dir() {
        r.error(
            format!("Spec directory does not exist: {}", spec_dir.display()),
            Some("Create the spec directory by re-running `autobuild spec create`"),
        );
        return r;
    }
    let index = spec_dir.join(paths::PROJECT_INDEX_JSON);
    if !index.exists() {
        r.error(
            format!("{} not found", paths::PROJECT_INDEX_JSON),
            Some("Re-run the discovery phase to generate the project index"),
        );
    } else if io::read_json_lenient::<Value>(&index).is_none() {
        r.error(
            format!("{} is not valid JSON", paths::PROJECT_INDEX_JSON),
            Some("Delete the project index and re-run discovery"),
        );
    }
    r
}

/// A missing `context.json` is only a warning: the quick path never
/// writes one.
pub fn validate_context(spec_dir: &Path) -> ValidationResult {
    let mut r = ValidationResult::new(Checkpoint::Context);
    let path = spec_dir.join(paths::CONTEXT_JSON);
    if !path.exists() {
        r.warn(format!("{} not found", paths::CONTEXT_JSON));
        return r;
    }
    let Some(ctx) = io::read_json_lenient::<Value>(&path) else {
        r.error(
            format!("{} is not valid JSON", paths::CONTEXT_JSON),
            Some("Rewrite context.json as a JSON object"),
        );
        return r;
    };
    let task = ctx.get("task_description").and_then(Value::as_str).unwrap_or("");
    if task.trim().is_empty() {
        r.error(
            "context.json is missing task_description",
            Some("Add a task_description field to context.json"),
        );
    }
    for key in ["files_to_modify", "files_to_reference"] {
        match ctx.get(key) {
            None => r.warn(format!("context.json has no {key}")),
            Some(v) if !v.is_array() => r.error(
                format!("context.json field {key} must be a list"),
                Some("Make files_to_modify and files_to_reference JSON arrays"),
            ),
            Some(_) => {}
        }
    }
    r
}

pub fn validate_spec_document(spec_dir: &Path) -> ValidationResult {
    let mut r = ValidationResult::new(Checkpoint::SpecDocument);
    let content = match std::fs::read_to_string(spec_dir.join(paths::SPEC_MD)) {
        Ok(c) => c,
        Err(_) => {
            r.error(
                "spec.md not found",
                Some("Run the spec writing phase to create spec.md"),
            );
            return r;
        }
    };

    let headings: Vec<String> = content
        .lines()
        .filter(|l| l.trim_start().starts_with('#'))
        .map(|l| l.trim_start_matches('#').trim().to_lowercase())
        .collect();
    let has_section = |name: &str| {
        let name = name.to_lowercase();
        headings.iter().any(|h| h.contains(&name))
    };

    for section in REQUIRED_SPEC_SECTIONS {
        if !has_section(section) {
            r.error(
                format!("Missing required section: {section}"),
                Some("Add the missing sections as `## <Section>` headings"),
            );
        }
    }
    for section in RECOMMENDED_SPEC_SECTIONS {
        if !has_section(section) {
            r.warn(format!("Missing recommended section: {section}"));
        }
    }
    let len = content.trim().chars().count();
    if len < MIN_SPEC_LENGTH {
        r.error(
            format!("spec.md is too short ({len} chars, minimum {MIN_SPEC_LENGTH})"),
            Some("Expand spec.md with concrete scope and success criteria"),
        );
    }
    r
}

pub fn validate_implementation_plan(spec_dir: &Path) -> ValidationResult {
    let mut r = ValidationResult::new(Checkpoint::ImplementationPlan);
    let path = spec_dir.join(paths::PLAN_JSON);
    if !path.exists() {
        r.error(
            "implementation_plan.json not found",
            Some("Run the planning phase to create the implementation plan"),
        );
        return r;
    }
    let Some(plan) = io::read_json_lenient::<Value>(&path) else {
        r.error(
            "implementation_plan.json is not valid JSON",
            Some("Rewrite implementation_plan.json as a JSON object"),
        );
        return r;
    };

    for key in ["feature", "workflow_type"] {
        if plan.get(key).and_then(Value::as_str).map_or(true, |s| s.trim().is_empty()) {
            r.error(
                format!("Missing required field: {key}"),
                Some("Add feature and workflow_type at the top level of the plan"),
            );
        }
    }

    let phases = match plan.get("phases").and_then(Value::as_array) {
        Some(p) if !p.is_empty() => p,
        _ => {
            r.error(
                "Plan has no phases",
                Some("Add at least one phase with chunks"),
            );
            return r;
        }
    };

    let mut phase_keys: HashSet<String> = HashSet::new();
    for phase in phases {
        if let Some(n) = phase.get("phase").and_then(Value::as_u64) {
            phase_keys.insert(n.to_string());
        }
        if let Some(id) = phase.get("id").and_then(Value::as_str) {
            phase_keys.insert(id.to_string());
        }
    }

    let mut chunk_ids: HashSet<String> = HashSet::new();
    for (i, phase) in phases.iter().enumerate() {
        let label = phase_label(phase, i);
        if phase.get("name").and_then(Value::as_str).map_or(true, |s| s.trim().is_empty()) {
            r.error(format!("{label} has no name"), Some("Give every phase a name"));
        }
        if let Some(t) = phase.get("type").and_then(Value::as_str) {
            if !PHASE_TYPES.contains(&t) {
                r.warn(format!("{label} has unknown type '{t}'"));
            }
        }
        for dep in phase.get("depends_on").and_then(Value::as_array).into_iter().flatten() {
            let key = match dep {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if !phase_keys.contains(&key) {
                r.error(
                    format!("{label} depends on unknown phase '{key}'"),
                    Some("Point depends_on at existing phase numbers or ids"),
                );
            }
        }

        let chunks = phase
            .get("chunks")
            .or_else(|| phase.get("subtasks"))
            .and_then(Value::as_array);
        let Some(chunks) = chunks.filter(|c| !c.is_empty()) else {
            r.error(
                format!("{label} has no chunks"),
                Some("Add at least one chunk to every phase"),
            );
            continue;
        };
        for (j, chunk) in chunks.iter().enumerate() {
            let id = chunk.get("id").and_then(Value::as_str).unwrap_or("").trim();
            if id.is_empty() {
                r.error(
                    format!("{label} chunk {} has no id", j + 1),
                    Some("Give every chunk a unique id"),
                );
            } else if !chunk_ids.insert(id.to_string()) {
                r.error(
                    format!("Duplicate chunk id: {id}"),
                    Some("Give every chunk a unique id"),
                );
            }
            if chunk
                .get("description")
                .and_then(Value::as_str)
                .map_or(true, |s| s.trim().is_empty())
            {
                r.warn(format!("{label} chunk {} has no description", j + 1));
            }
            match chunk.get("status").and_then(Value::as_str) {
                Some(s) if s.parse::<ChunkStatus>().is_ok() => {}
                Some(s) => r.error(
                    format!("Invalid chunk status '{s}'"),
                    Some("Use pending, in_progress, completed or failed as chunk status"),
                ),
                None => r.error(
                    format!("{label} chunk {} has no status", j + 1),
                    Some("Use pending, in_progress, completed or failed as chunk status"),
                ),
            }
        }
    }
    r
}

fn phase_label(phase: &Value, index: usize) -> String {
    match phase.get("name").and_then(Value::as_str) {
        Some(name) if !name.trim().is_empty() => format!("Phase '{name}'"),
        _ => format!("Phase {}", index + 1),
    }
}

pub fn validate_all(spec_dir: &Path) -> Vec<ValidationResult> {
    vec![
        validate_prereqs(spec_dir),
        validate_context(spec_dir),
        validate_spec_document(spec_dir),
        validate_implementation_plan(spec_dir),
    ]
}

// ---------------------------------------------------------------------------
// Auto-fix
// ---------------------------------------------------------------------------

/// Repair mechanical plan defects in place: missing phase names and numbers,
/// `subtasks` spelled instead of `chunks`, missing chunk ids and invalid
/// statuses. Returns whether the file changed.
pub fn auto_fix_plan(spec_dir: &Path) -> Result<bool> {
    let path = spec_dir.join(paths::PLAN_JSON);
    let Some(mut plan) = io::read_json_lenient::<Value>(&path) else {
        return Ok(false);
    };
    let Some(obj) = plan.as_object_mut() else {
        return Ok(false);
    };
    let mut changed = false;

    if !obj.contains_key("workflow_type") {
        obj.insert("workflow_type".into(), Value::from("feature"));
        changed = true;
    }
    let Some(phases) = obj.get_mut("phases").and_then(Value::as_array_mut) else {
        if changed {
            io::write_json(&path, &plan)?;
        }
        return Ok(changed);
    };

    for (i, phase) in phases.iter_mut().enumerate() {
        let Some(p) = phase.as_object_mut() else {
            continue;
        };
        let number = i + 1;
        if p.get("phase").is_none() && p.get("id").is_none() {
            p.insert("phase".into(), Value::from(number));
            changed = true;
        }
        if p.get("name").and_then(Value::as_str).map_or(true, |s| s.trim().is_empty()) {
            p.insert("name".into(), Value::from(format!("Phase {number}")));
            changed = true;
        }
        if !p.get("depends_on").is_some_and(Value::is_array) {
            p.insert("depends_on".into(), Value::Array(Vec::new()));
            changed = true;
        }
        if !p.contains_key("chunks") {
            if let Some(subtasks) = p.remove("subtasks") {
                p.insert("chunks".into(), subtasks);
                changed = true;
            }
        }
        let Some(chunks) = p.get_mut("chunks").and_then(Value::as_array_mut) else {
            continue;
        };
        for (j, chunk) in chunks.iter_mut().enumerate() {
            let Some(c) = chunk.as_object_mut() else {
                continue;
            };
            if c.get("id").and_then(Value::as_str).map_or(true, |s| s.trim().is_empty()) {
                c.insert("id".into(), Value::from(format!("chunk-{number}-{}", j + 1)));
                changed = true;
            }
            let status_ok = c
                .get("status")
                .and_then(Value::as_str)
                .is_some_and(|s| s.parse::<ChunkStatus>().is_ok());
            if !status_ok {
                c.insert("status".into(), Value::from(ChunkStatus::Pending.as_str()));
                changed = true;
            }
        }
    }

    if changed {
        tracing::debug!(path = %path.display(), "auto-fixed implementation plan");
        io::write_json(&path, &plan)?;
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const GOOD_SPEC: &str = "# Dark mode\n\n## Overview\nAdd a dark theme toggle to settings.\n\n\
        ## Workflow Type\nfeature\n\n## Task Scope\nSettings page and theme provider.\n\n\
        ## Success Criteria\n- Toggle persists across reloads\n";

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn prereqs_need_project_index() {
        let dir = TempDir::new().unwrap();
        let r = validate_prereqs(dir.path());
        assert!(!r.valid);
        assert!(r.errors[0].contains("project_index.json"));
        write(dir.path(), paths::PROJECT_INDEX_JSON, "{}");
        assert!(validate_prereqs(dir.path()).valid);
    }

    #[test]
    fn context_requires_task_description() {
        let dir = TempDir::new().unwrap();
        let r = validate_context(dir.path());
        assert!(r.valid);
        assert_eq!(r.warnings.len(), 1);

        write(dir.path(), paths::CONTEXT_JSON, r#"{"files_to_modify": []}"#);
        let r = validate_context(dir.path());
        assert!(!r.valid);
        assert!(r.errors[0].contains("task_description"));
    }

    #[test]
    fn spec_document_sections() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), paths::SPEC_MD, GOOD_SPEC);
        let r = validate_spec_document(dir.path());
        assert!(r.valid, "{:?}", r.errors);
        assert!(!r.warnings.is_empty());

        write(dir.path(), paths::SPEC_MD, "# Title\n\n## Overview\nshort\n");
        let r = validate_spec_document(dir.path());
        assert!(!r.valid);
        assert!(r.errors.iter().any(|e| e == "Missing required section: Task Scope"));
        assert!(r.errors.iter().any(|e| e.contains("too short")));
    }

    #[test]
    fn plan_structure_errors() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            paths::PLAN_JSON,
            r#"{"feature": "x", "workflow_type": "feature", "phases": [
                {"phase": 1, "name": "A", "depends_on": [], "chunks": [
                    {"id": "c1", "description": "d", "status": "pending"},
                    {"id": "c1", "description": "d", "status": "done"}
                ]},
                {"phase": 2, "name": "B", "depends_on": [7], "chunks": []}
            ]}"#,
        );
        let r = validate_implementation_plan(dir.path());
        assert!(!r.valid);
        assert!(r.errors.contains(&"Duplicate chunk id: c1".to_string()));
        assert!(r.errors.contains(&"Invalid chunk status 'done'".to_string()));
        assert!(r.errors.iter().any(|e| e.contains("unknown phase '7'")));
        assert!(r.errors.iter().any(|e| e == "Phase 'B' has no chunks"));
    }

    #[test]
    fn auto_fix_repairs_ids_statuses_and_names() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            paths::PLAN_JSON,
            r#"{"feature": "x", "phases": [
                {"subtasks": [{"description": "a"}, {"id": "", "description": "b", "status": "todo"}]}
            ]}"#,
        );
        assert!(!validate_implementation_plan(dir.path()).valid);
        assert!(auto_fix_plan(dir.path()).unwrap());
        let r = validate_implementation_plan(dir.path());
        assert!(r.valid, "{:?}", r.errors);
        // Second pass has nothing left to fix.
        assert!(!auto_fix_plan(dir.path()).unwrap());
    }

    #[test]
    fn minimal_plan_validates() {
        let dir = TempDir::new().unwrap();
        crate::plan::create_minimal_plan(dir.path(), "Fix typo in README").unwrap();
        assert!(validate_implementation_plan(dir.path()).valid);
    }
}
