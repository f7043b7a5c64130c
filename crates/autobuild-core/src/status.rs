//! Project-level build status file (`.auto-claude-status`), read by editor
//! integrations and shell prompts to show what the builder is doing.

use crate::error::Result;
use crate::{io, paths};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildState {
    Building,
    Qa,
    Paused,
    Complete,
}

impl BuildState {
    pub fn as_str(self) -> &'static str {
        match self {
            BuildState::Building => "building",
            BuildState::Qa => "qa",
            BuildState::Paused => "paused",
            BuildState::Complete => "complete",
        }
    }
}

impl std::fmt::Display for BuildState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildStatus {
    pub active: bool,
    pub spec: String,
    pub state: BuildState,
    #[serde(default)]
    pub chunks_completed: usize,
    #[serde(default)]
    pub chunks_total: usize,
    pub updated_at: String,
}

pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    pub fn new(project_dir: &Path) -> Self {
        Self {
            path: paths::build_status_path(project_dir),
        }
    }

    pub fn load(&self) -> Option<BuildStatus> {
        io::read_json_lenient(&self.path)
    }

    pub fn update(&self, spec: &str, state: BuildState, progress: (usize, usize)) -> Result<()> {
        let status = BuildStatus {
            active: state != BuildState::Complete,
            spec: spec.to_string(),
            state,
            chunks_completed: progress.0,
            chunks_total: progress.1,
            updated_at: chrono::Utc::now().to_rfc3339(),
        };
        tracing::debug!(spec, state = %state, "build status");
        io::write_json(&self.path, &status)
    }

    /// Keep the last state but mark nothing as running.
    pub fn set_inactive(&self) -> Result<()> {
        match self.load() {
            Some(mut status) => {
                status.active = false;
                status.updated_at = chrono::Utc::now().to_rfc3339();
                io::write_json(&self.path, &status)
            }
            None => Ok(()),
        }
    }
}
