use crate::error::Result;
use crate::{io, paths};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Requirements {
    pub task_description: String,
    #[serde(default = "default_workflow_type")]
    pub workflow_type: String,
    #[serde(default)]
    pub services_involved: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_workflow_type() -> String {
    "feature".to_string()
}

impl Requirements {
    /// Requirements derived from a bare task description.
    pub fn from_task(task: &str) -> Self {
        Self {
            task_description: task.trim().to_string(),
            workflow_type: infer_workflow_type(task).to_string(),
            services_involved: Vec::new(),
            acceptance_criteria: Vec::new(),
            created_at: chrono::Utc::now().to_rfc3339(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn load(spec_dir: &Path) -> Option<Self> {
        io::read_json_lenient(&spec_dir.join(paths::REQUIREMENTS_JSON))
    }

    pub fn save(&self, spec_dir: &Path) -> Result<()> {
        io::write_json(&spec_dir.join(paths::REQUIREMENTS_JSON), self)
    }
}

/// Rough workflow classification from the task wording.
pub fn infer_workflow_type(task: &str) -> &'static str {
    let lower = task.to_lowercase();
    let has = |words: &[&str]| {
        lower
            .split(|c: char| !c.is_alphanumeric())
            .any(|w| words.contains(&w))
    };
    if has(&["fix", "bug", "broken", "crash", "regression", "error"]) {
        "bugfix"
    } else if has(&["refactor", "cleanup", "rename", "restructure", "simplify"]) {
        "refactor"
    } else if has(&["investigate", "research", "spike", "explore"]) {
        "investigation"
    } else if has(&["migrate", "migration", "upgrade"]) {
        "migration"
    } else {
        "feature"
    }
}

/// Interactive source of requirements. `Ok(None)` means the user cancelled.
pub trait RequirementsPrompter: Send + Sync {
    fn gather(&self) -> Result<Option<Requirements>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn from_task_infers_workflow() {
        assert_eq!(Requirements::from_task("Fix the login crash").workflow_type, "bugfix");
        assert_eq!(
            Requirements::from_task("Refactor the payment module").workflow_type,
            "refactor"
        );
        assert_eq!(Requirements::from_task("Add dark mode").workflow_type, "feature");
        // Substrings do not count: "prefix" is not "fix".
        assert_eq!(infer_workflow_type("Add a prefix option"), "feature");
    }

    #[test]
    fn roundtrip_keeps_extra_fields() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(paths::REQUIREMENTS_JSON),
            r#"{"task_description":"Add export","user_requirements":["csv"]}"#,
        )
        .unwrap();
        let req = Requirements::load(dir.path()).unwrap();
        assert_eq!(req.workflow_type, "feature");
        req.save(dir.path()).unwrap();
        let raw = std::fs::read_to_string(dir.path().join(paths::REQUIREMENTS_JSON)).unwrap();
        assert!(raw.contains("user_requirements"));
    }
}
