use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AutobuildError {
    #[error("spec not found: {0}")]
    SpecNotFound(String),

    #[error("invalid spec name '{0}': must not be empty or contain path separators")]
    InvalidSpecName(String),

    #[error("missing required artifact '{artifact}' for phase '{phase}'")]
    MissingArtifact { artifact: String, phase: String },

    #[error("implementation plan not found in {0}")]
    PlanNotFound(PathBuf),

    #[error("build is not complete: {completed}/{total} chunks completed")]
    BuildIncomplete { completed: usize, total: usize },

    #[error("unknown complexity '{0}': must be simple, standard, or complex")]
    InvalidComplexity(String),

    #[error("unknown phase '{0}'")]
    UnknownPhase(String),

    #[error("script not found: {0}")]
    ScriptNotFound(PathBuf),

    #[error("script failed to start: {0}")]
    ScriptSpawnFailed(String),

    #[error("prompt not found: {0}")]
    PromptNotFound(String),

    #[error("agent error: {0}")]
    Agent(String),

    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    #[error("worktree not found for spec '{0}'")]
    WorktreeNotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AutobuildError>;
