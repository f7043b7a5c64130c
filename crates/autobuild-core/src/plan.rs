//! `implementation_plan.json`: phases of chunks plus QA sign-off state.
//!
//! The planner (script or agent) creates the file, coder sessions flip
//! chunk statuses, and the QA loop owns `qa_signoff`,
//! `qa_iteration_history` and `qa_stats`. Fields this crate does not model
//! are kept in `extra` so a rewrite never drops them.

use crate::error::Result;
use crate::{io, paths};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub(crate) fn null_as_default<'de, D, T>(d: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Chunk status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl ChunkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ChunkStatus::Pending => "pending",
            ChunkStatus::InProgress => "in_progress",
            ChunkStatus::Completed => "completed",
            ChunkStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ChunkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChunkStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ChunkStatus::Pending),
            "in_progress" => Ok(ChunkStatus::InProgress),
            "completed" => Ok(ChunkStatus::Completed),
            "failed" => Ok(ChunkStatus::Failed),
            other => Err(format!("unknown chunk status '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Plan types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Chunk {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// Kept as text so an agent-written typo survives until validation.
    #[serde(default = "default_chunk_status")]
    pub status: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_to_create: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_to_modify: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_chunk_status() -> String {
    ChunkStatus::Pending.as_str().to_string()
}

impl Chunk {
    pub fn status(&self) -> Option<ChunkStatus> {
        self.status.parse().ok()
    }

    pub fn set_status(&mut self, status: ChunkStatus) {
        self.status = status.as_str().to_string();
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanPhase {
    /// Phase number; `depends_on` entries refer to it or to `id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub phase_type: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<serde_json::Value>,
    #[serde(default, alias = "subtasks")]
    pub chunks: Vec<Chunk>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PlanPhase {
    /// Identifiers other phases may use in `depends_on`.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        if let Some(n) = self.phase {
            keys.push(n.to_string());
        }
        if let Some(id) = &self.id {
            keys.push(id.clone());
        }
        keys
    }
}

/// Line reference as written by the reviewer: a number or free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LineRef {
    Number(u64),
    Text(String),
}

impl std::fmt::Display for LineRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LineRef::Number(n) => write!(f, "{n}"),
            LineRef::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QaIssue {
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<LineRef>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub issue_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl QaIssue {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Reviewer verdict. `status` is "pending" | "approved" | "rejected".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QaSignoff {
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default)]
    pub qa_session: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues_found: Vec<QaIssue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationStatus {
    Approved,
    Rejected,
    Error,
}

impl IterationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            IterationStatus::Approved => "approved",
            IterationStatus::Rejected => "rejected",
            IterationStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for IterationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of `qa_iteration_history`. Never modified once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaIterationRecord {
    pub iteration: u32,
    pub status: IterationStatus,
    #[serde(default)]
    pub issues: Vec<QaIssue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QaStats {
    pub total_iterations: u32,
    pub last_iteration: u32,
    pub last_status: String,
    #[serde(default)]
    pub issues_by_type: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImplementationPlan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_type: Option<String>,
    #[serde(default)]
    pub phases: Vec<PlanPhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qa_signoff: Option<QaSignoff>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub qa_iteration_history: Vec<QaIterationRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qa_stats: Option<QaStats>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// ImplementationPlan
// ---------------------------------------------------------------------------

impl ImplementationPlan {
    /// The plan in `spec_dir`; `None` when missing or unparsable.
    pub fn load(spec_dir: &Path) -> Option<Self> {
        io::read_json_lenient(&spec_dir.join(paths::PLAN_JSON))
    }

    pub fn save(&self, spec_dir: &Path) -> Result<()> {
        io::write_json(&spec_dir.join(paths::PLAN_JSON), self)
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.phases.iter().flat_map(|p| p.chunks.iter())
    }

    /// `(completed, total)` chunk counts.
    pub fn chunk_counts(&self) -> (usize, usize) {
        let total = self.chunks().count();
        let completed = self
            .chunks()
            .filter(|c| c.status() == Some(ChunkStatus::Completed))
            .count();
        (completed, total)
    }

    /// Every chunk completed (and there is at least one).
    pub fn is_build_complete(&self) -> bool {
        let (completed, total) = self.chunk_counts();
        total > 0 && completed == total
    }

    /// First chunk that still needs work, in plan order.
    pub fn next_chunk(&self) -> Option<&Chunk> {
        self.chunks().find(|c| {
            !matches!(c.status(), Some(ChunkStatus::Completed))
        })
    }

    pub fn qa_status(&self) -> Option<&str> {
        self.qa_signoff
            .as_ref()
            .map(|s| s.status.as_str())
            .filter(|s| !s.is_empty())
    }

    pub fn is_qa_approved(&self) -> bool {
        self.qa_status() == Some("approved")
    }

    /// Clear the QA verdict so the loop runs again. History is kept.
    pub fn reset_qa(&mut self) {
        self.qa_signoff = None;
    }

    /// Highest phase number in use.
    pub fn max_phase_number(&self) -> u32 {
        self.phases.iter().filter_map(|p| p.phase).max().unwrap_or(0)
    }
}

/// Fallback plan for the quick path: one phase, one chunk covering the task.
pub fn create_minimal_plan(spec_dir: &Path, task: &str) -> Result<ImplementationPlan> {
    let plan = ImplementationPlan {
        feature: Some(first_line(task)),
        workflow_type: Some("simple".to_string()),
        phases: vec![PlanPhase {
            phase: Some(1),
            id: Some("phase-1".to_string()),
            name: "Implementation".to_string(),
            phase_type: Some("implementation".to_string()),
            chunks: vec![Chunk {
                id: "chunk-1-1".to_string(),
                description: task.trim().to_string(),
                status: default_chunk_status(),
                ..Chunk::default()
            }],
            ..PlanPhase::default()
        }],
        ..ImplementationPlan::default()
    };
    plan.save(spec_dir)?;
    Ok(plan)
}

fn first_line(text: &str) -> String {
    let line = text.lines().next().unwrap_or("").trim();
    if line.is_empty() {
        "Unknown task".to_string()
    } else {
        line.chars().take(80).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
