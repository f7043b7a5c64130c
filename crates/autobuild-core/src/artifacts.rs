//! Placeholder artifacts for enrichment phases.
//!
//! When an optional phase cannot produce its artifact it still writes one,
//! carrying `reason` (and `enabled` for hints), so later phases and readers
//! can rely on the file existing and can tell that the data is degraded.

use crate::error::Result;
use crate::{io, paths};
use serde_json::json;
use std::path::{Path, PathBuf};

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn create_empty_hints(spec_dir: &Path, enabled: bool, reason: &str) -> Result<PathBuf> {
    let path = spec_dir.join(paths::GRAPH_HINTS_JSON);
    io::write_json(
        &path,
        &json!({
            "enabled": enabled,
            "reason": reason,
            "hints": [],
            "hint_count": 0,
            "created_at": now(),
        }),
    )?;
    Ok(path)
}

pub fn write_hints(spec_dir: &Path, query: &str, hints: &[serde_json::Value]) -> Result<PathBuf> {
    let path = spec_dir.join(paths::GRAPH_HINTS_JSON);
    io::write_json(
        &path,
        &json!({
            "enabled": true,
            "query": query,
            "hints": hints,
            "hint_count": hints.len(),
            "created_at": now(),
        }),
    )?;
    Ok(path)
}

pub fn create_minimal_research(spec_dir: &Path, reason: &str) -> Result<PathBuf> {
    let path = spec_dir.join(paths::RESEARCH_JSON);
    io::write_json(
        &path,
        &json!({
            "integrations_researched": [],
            "research_skipped": true,
            "reason": reason,
            "created_at": now(),
        }),
    )?;
    Ok(path)
}

pub fn create_minimal_critique(spec_dir: &Path, reason: &str) -> Result<PathBuf> {
    let path = spec_dir.join(paths::CRITIQUE_JSON);
    io::write_json(
        &path,
        &json!({
            "issues_found": [],
            "issues_fixed": false,
            "no_issues_found": true,
            "critique_summary": reason,
            "reason": reason,
            "created_at": now(),
        }),
    )?;
    Ok(path)
}

pub fn create_minimal_context(
    spec_dir: &Path,
    task: &str,
    services: &[String],
    reason: &str,
) -> Result<PathBuf> {
    let path = spec_dir.join(paths::CONTEXT_JSON);
    io::write_json(
        &path,
        &json!({
            "task_description": task,
            "scoped_services": services,
            "files_to_modify": [],
            "files_to_reference": [],
            "reason": reason,
            "created_at": now(),
        }),
    )?;
    Ok(path)
}

/// True when a critique report says the critique already ran to completion.
pub fn critique_is_complete(spec_dir: &Path) -> bool {
    io::read_json_lenient::<serde_json::Value>(&spec_dir.join(paths::CRITIQUE_JSON))
        .map(|v| {
            v.get("issues_fixed").and_then(|b| b.as_bool()).unwrap_or(false)
                || v.get("no_issues_found").and_then(|b| b.as_bool()).unwrap_or(false)
        })
        .unwrap_or(false)
}

/// Research findings that parse as JSON; a truncated file does not count.
pub fn research_is_readable(spec_dir: &Path) -> bool {
    io::read_json_lenient::<serde_json::Value>(&spec_dir.join(paths::RESEARCH_JSON)).is_some()
}

/// Number of files recorded in a project index, when present.
pub fn project_file_count(spec_dir: &Path) -> Option<u64> {
    let index: serde_json::Value =
        io::read_json_lenient(&spec_dir.join(paths::PROJECT_INDEX_JSON))?;
    index
        .get("file_count")
        .and_then(|v| v.as_u64())
        .or_else(|| index.get("files").and_then(|f| f.as_array()).map(|a| a.len() as u64))
}

/// `(files_to_modify, files_to_reference)` counts of a context file.
pub fn context_stats(spec_dir: &Path) -> Option<(usize, usize)> {
    let ctx: serde_json::Value = io::read_json_lenient(&spec_dir.join(paths::CONTEXT_JSON))?;
    let count = |key: &str| ctx.get(key).and_then(|v| v.as_array()).map_or(0, |a| a.len());
    Some((count("files_to_modify"), count("files_to_reference")))
}
