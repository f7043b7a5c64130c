//! Per-spec task log.
//!
//! Every phase, agent session and tool call of a spec is recorded in
//! `task_logs.json` inside the spec directory. The log is a user-facing
//! artifact, separate from the `tracing` diagnostics, and is reached through
//! an explicit [`TaskLogger`] handle that callers thread through the
//! pipeline, build and QA loop.

use crate::{io, paths};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogPhase {
    Planning,
    Coding,
    Validation,
}

impl LogPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            LogPhase::Planning => "planning",
            LogPhase::Coding => "coding",
            LogPhase::Validation => "validation",
        }
    }
}

impl std::fmt::Display for LogPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEntryKind {
    Text,
    Info,
    Success,
    Error,
    PhaseStart,
    PhaseEnd,
    ToolStart,
    ToolEnd,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub kind: LogEntryKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

impl LogEntry {
    fn new(kind: LogEntryKind, content: &str) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            kind,
            content: content.to_string(),
            tool_name: None,
            tool_input: None,
            detail: None,
            success: None,
        }
    }
}

/// "pending" | "active" | "completed" | "failed"
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseLog {
    #[serde(default = "default_phase_status")]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub entries: Vec<LogEntry>,
}

fn default_phase_status() -> String {
    "pending".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskLog {
    #[serde(default)]
    pub spec_id: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    /// Keyed by [`LogPhase::as_str`].
    #[serde(default)]
    pub phases: BTreeMap<String, PhaseLog>,
}

impl TaskLog {
    fn phase_mut(&mut self, phase: LogPhase) -> &mut PhaseLog {
        self.phases
            .entry(phase.as_str().to_string())
            .or_insert_with(|| PhaseLog {
                status: default_phase_status(),
                ..PhaseLog::default()
            })
    }
}

// ---------------------------------------------------------------------------
// TaskLogger
// ---------------------------------------------------------------------------

/// Sink for the user-facing task log. Logging never fails the caller.
pub trait TaskLogger: Send + Sync {
    fn log(&self, phase: LogPhase, kind: LogEntryKind, message: &str);
    fn start_phase(&self, phase: LogPhase, message: &str);
    fn end_phase(&self, phase: LogPhase, success: bool, message: &str);
    fn tool_start(&self, phase: LogPhase, tool: &str, input: Option<&str>);
    fn tool_end(&self, phase: LogPhase, tool: &str, success: bool, detail: Option<&str>);
    /// Follow the spec directory after a rename.
    fn relocate(&self, spec_dir: &Path);
}

pub type SharedLogger = Arc<dyn TaskLogger>;

/// Writes `task_logs.json` in the spec directory after every entry.
pub struct JsonTaskLogger {
    state: Mutex<JsonLoggerState>,
}

struct JsonLoggerState {
    path: PathBuf,
    log: TaskLog,
}

impl JsonTaskLogger {
    /// Open the log for `spec_dir`, continuing an existing file if present.
    pub fn open(spec_dir: &Path) -> Self {
        let path = spec_dir.join(paths::TASK_LOGS_JSON);
        let log = io::read_json_lenient::<TaskLog>(&path).unwrap_or_else(|| {
            let now = chrono::Utc::now().to_rfc3339();
            TaskLog {
                spec_id: spec_id(spec_dir),
                created_at: now.clone(),
                updated_at: now,
                phases: BTreeMap::new(),
            }
        });
        Self {
            state: Mutex::new(JsonLoggerState { path, log }),
        }
    }

    pub fn shared(spec_dir: &Path) -> SharedLogger {
        Arc::new(Self::open(spec_dir))
    }

    /// Snapshot of the current log.
    pub fn snapshot(&self) -> TaskLog {
        self.lock().log.clone()
    }

    fn lock(&self) -> MutexGuard<'_, JsonLoggerState> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn update(&self, phase: LogPhase, f: impl FnOnce(&mut PhaseLog)) {
        let mut state = self.lock();
        f(state.log.phase_mut(phase));
        state.log.updated_at = chrono::Utc::now().to_rfc3339();
        if let Err(e) = io::write_json(&state.path, &state.log) {
            tracing::warn!(path = %state.path.display(), error = %e, "failed to persist task log");
        }
    }
}

fn spec_id(spec_dir: &Path) -> String {
    spec_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl TaskLogger for JsonTaskLogger {
    fn log(&self, phase: LogPhase, kind: LogEntryKind, message: &str) {
        match kind {
            LogEntryKind::Error => tracing::warn!(phase = %phase, "{message}"),
            _ => tracing::debug!(phase = %phase, "{message}"),
        }
        self.update(phase, |p| p.entries.push(LogEntry::new(kind, message)));
    }

    fn start_phase(&self, phase: LogPhase, message: &str) {
        tracing::info!(phase = %phase, "{message}");
        self.update(phase, |p| {
            p.status = "active".to_string();
            p.started_at = Some(chrono::Utc::now().to_rfc3339());
            p.entries
                .push(LogEntry::new(LogEntryKind::PhaseStart, message));
        });
    }

    fn end_phase(&self, phase: LogPhase, success: bool, message: &str) {
        tracing::info!(phase = %phase, success, "{message}");
        self.update(phase, |p| {
            p.status = if success { "completed" } else { "failed" }.to_string();
            p.completed_at = Some(chrono::Utc::now().to_rfc3339());
            let mut entry = LogEntry::new(LogEntryKind::PhaseEnd, message);
            entry.success = Some(success);
            p.entries.push(entry);
        });
    }

    fn tool_start(&self, phase: LogPhase, tool: &str, input: Option<&str>) {
        tracing::debug!(phase = %phase, tool, "tool start");
        self.update(phase, |p| {
            let mut entry = LogEntry::new(LogEntryKind::ToolStart, &format!("[{tool}]"));
            entry.tool_name = Some(tool.to_string());
            entry.tool_input = input.map(str::to_string);
            p.entries.push(entry);
        });
    }

    fn tool_end(&self, phase: LogPhase, tool: &str, success: bool, detail: Option<&str>) {
        tracing::debug!(phase = %phase, tool, success, "tool end");
        self.update(phase, |p| {
            let mut entry = LogEntry::new(LogEntryKind::ToolEnd, &format!("[{tool}] done"));
            entry.tool_name = Some(tool.to_string());
            entry.success = Some(success);
            entry.detail = detail.map(str::to_string);
            p.entries.push(entry);
        });
    }

    fn relocate(&self, spec_dir: &Path) {
        let mut state = self.lock();
        state.path = spec_dir.join(paths::TASK_LOGS_JSON);
        state.log.spec_id = spec_id(spec_dir);
    }
}

// ---------------------------------------------------------------------------
// Tool input display
// ---------------------------------------------------------------------------

/// Short, single-line description of a tool call's input for the log.
pub fn summarize_tool_input(input: &serde_json::Value) -> Option<String> {
    if let Some(p) = input.get("pattern").and_then(|v| v.as_str()) {
        return Some(p.to_string());
    }
    if let Some(fp) = input.get("file_path").and_then(|v| v.as_str()) {
        let chars: Vec<char> = fp.chars().collect();
        if chars.len() > 50 {
            let tail: String = chars[chars.len() - 47..].iter().collect();
            return Some(format!("...{tail}"));
        }
        return Some(fp.to_string());
    }
    if let Some(cmd) = input.get("command").and_then(|v| v.as_str()) {
        let chars: Vec<char> = cmd.chars().collect();
        if chars.len() > 50 {
            let head: String = chars[..47].iter().collect();
            return Some(format!("{head}..."));
        }
        return Some(cmd.to_string());
    }
    input
        .get("path")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// In-memory logger for tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[derive(Default)]
pub(crate) struct MemoryLogger {
    pub entries: Mutex<Vec<(LogPhase, LogEntryKind, String)>>,
}

#[cfg(test)]
impl MemoryLogger {
    pub fn shared() -> Arc<MemoryLogger> {
        Arc::new(Self::default())
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .any(|(_, _, m)| m.contains(needle))
    }
}

#[cfg(test)]
impl TaskLogger for MemoryLogger {
    fn log(&self, phase: LogPhase, kind: LogEntryKind, message: &str) {
        self.entries
            .lock()
            .unwrap()
            .push((phase, kind, message.to_string()));
    }

    fn start_phase(&self, phase: LogPhase, message: &str) {
        self.log(phase, LogEntryKind::PhaseStart, message);
    }

    fn end_phase(&self, phase: LogPhase, _success: bool, message: &str) {
        self.log(phase, LogEntryKind::PhaseEnd, message);
    }

    fn tool_start(&self, phase: LogPhase, tool: &str, _input: Option<&str>) {
        self.log(phase, LogEntryKind::ToolStart, tool);
    }

    fn tool_end(&self, phase: LogPhase, tool: &str, _success: bool, _detail: Option<&str>) {
        self.log(phase, LogEntryKind::ToolEnd, tool);
    }

    fn relocate(&self, _spec_dir: &Path) {}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn json_logger_persists_phases() {
        let dir = TempDir::new().unwrap();
        let logger = JsonTaskLogger::open(dir.path());
        logger.start_phase(LogPhase::Planning, "Starting spec creation");
        logger.tool_start(LogPhase::Planning, "Read", Some("spec.md"));
        logger.tool_end(LogPhase::Planning, "Read", true, None);
        logger.end_phase(LogPhase::Planning, true, "Spec created");

        let saved: TaskLog =
            io::read_json_lenient(&dir.path().join(paths::TASK_LOGS_JSON)).unwrap();
        let planning = &saved.phases["planning"];
        assert_eq!(planning.status, "completed");
        assert_eq!(planning.entries.len(), 4);
        assert_eq!(planning.entries[1].tool_name.as_deref(), Some("Read"));
    }

    #[test]
    fn json_logger_resumes_existing_log() {
        let dir = TempDir::new().unwrap();
        JsonTaskLogger::open(dir.path()).log(LogPhase::Coding, LogEntryKind::Info, "first");
        let logger = JsonTaskLogger::open(dir.path());
        logger.log(LogPhase::Coding, LogEntryKind::Info, "second");
        assert_eq!(logger.snapshot().phases["coding"].entries.len(), 2);
    }

    #[test]
    fn relocate_follows_rename() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("001-pending");
        let new = dir.path().join("001-user-login");
        std::fs::create_dir_all(&old).unwrap();
        let logger = JsonTaskLogger::open(&old);
        logger.log(LogPhase::Planning, LogEntryKind::Info, "before");
        std::fs::rename(&old, &new).unwrap();
        logger.relocate(&new);
        logger.log(LogPhase::Planning, LogEntryKind::Info, "after");
        assert!(new.join(paths::TASK_LOGS_JSON).exists());
        assert!(!old.exists());
        assert_eq!(logger.snapshot().spec_id, "001-user-login");
    }

    #[test]
    fn summarize_tool_input_truncates() {
        let long_path = format!("/{}", "a".repeat(80));
        let s = summarize_tool_input(&serde_json::json!({ "file_path": long_path })).unwrap();
        assert!(s.starts_with("..."));
        assert_eq!(s.chars().count(), 50);

        let long_cmd = "x".repeat(60);
        let s = summarize_tool_input(&serde_json::json!({ "command": long_cmd })).unwrap();
        assert!(s.ends_with("..."));
        assert_eq!(s.chars().count(), 50);

        assert_eq!(
            summarize_tool_input(&serde_json::json!({ "pattern": "*.rs" })).as_deref(),
            Some("*.rs")
        );
        assert!(summarize_tool_input(&serde_json::json!({})).is_none());
    }
}
