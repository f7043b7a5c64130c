use crate::error::Result;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// AgentConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,
    #[serde(default = "default_permission_mode")]
    pub permission_mode: String,
    #[serde(default = "default_allowed_tools")]
    pub allowed_tools: Vec<String>,
    /// Path to the `claude` binary; `None` resolves it from `PATH`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<String>,
    /// Install `autobuild check --hook` as the agent's pre-tool-use hook.
    #[serde(default = "default_true")]
    pub command_hook: bool,
}

fn default_model() -> String {
    "claude-opus-4-5".to_string()
}

fn default_permission_mode() -> String {
    "acceptEdits".to_string()
}

fn default_allowed_tools() -> Vec<String> {
    ["Read", "Write", "Edit", "Glob", "Grep", "Bash"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_turns: None,
            permission_mode: default_permission_mode(),
            allowed_tools: default_allowed_tools(),
            executable: None,
            command_hook: true,
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeGraphConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Command run as `<command> --query <text> --kind <kind>`; prints a JSON array of hints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_script_timeout")]
    pub script_timeout_seconds: u64,
    #[serde(default = "default_analyzer_script")]
    pub analyzer_script: PathBuf,
    #[serde(default = "default_context_script")]
    pub context_script: PathBuf,
    #[serde(default = "default_planner_script")]
    pub planner_script: PathBuf,
    /// Directory holding prompt overrides; relative paths resolve against the project root.
    #[serde(default = "default_prompts_dir")]
    pub prompts_dir: PathBuf,
    #[serde(default)]
    pub knowledge_graph: KnowledgeGraphConfig,
    /// Use the assessor agent before falling back to heuristics.
    #[serde(default = "default_true")]
    pub ai_complexity_assessment: bool,
}

fn default_max_retries() -> u32 {
    3
}

fn default_script_timeout() -> u64 {
    300
}

fn default_analyzer_script() -> PathBuf {
    PathBuf::from(".auto-claude/scripts/analyzer.py")
}

fn default_context_script() -> PathBuf {
    PathBuf::from(".auto-claude/scripts/context.py")
}

fn default_planner_script() -> PathBuf {
    PathBuf::from(".auto-claude/scripts/planner.py")
}

fn default_prompts_dir() -> PathBuf {
    PathBuf::from(paths::PROMPTS_DIR)
}

fn default_true() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            script_timeout_seconds: default_script_timeout(),
            analyzer_script: default_analyzer_script(),
            context_script: default_context_script(),
            planner_script: default_planner_script(),
            prompts_dir: default_prompts_dir(),
            knowledge_graph: KnowledgeGraphConfig::default(),
            ai_complexity_assessment: true,
        }
    }
}

// ---------------------------------------------------------------------------
// QaConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Occurrences (current + history) at which an issue counts as recurring.
    #[serde(default = "default_recurrence_threshold")]
    pub recurrence_threshold: usize,
    /// Normalized-key similarity at which two issues are treated as the same.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

fn default_max_iterations() -> u32 {
    50
}

fn default_recurrence_threshold() -> usize {
    3
}

fn default_similarity_threshold() -> f64 {
    0.8
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            recurrence_threshold: default_recurrence_threshold(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub qa: QaConfig,
}

impl Config {
    /// Load `.auto-claude/config.yaml`; a missing or empty file yields defaults.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&data)?)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    /// Resolve a configured path against the project root.
    pub fn resolve(root: &Path, configured: &Path) -> PathBuf {
        if configured.is_absolute() {
            configured.to_path_buf()
        } else {
            root.join(configured)
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.pipeline.max_retries == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "pipeline.max_retries must be at least 1".to_string(),
            });
        }

        if self.qa.max_iterations == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "qa.max_iterations must be at least 1".to_string(),
            });
        }

        if self.qa.recurrence_threshold < 2 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "qa.recurrence_threshold={} escalates on the first rejection",
                    self.qa.recurrence_threshold
                ),
            });
        }

        if !(0.0..=1.0).contains(&self.qa.similarity_threshold) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "qa.similarity_threshold={} must be between 0.0 and 1.0",
                    self.qa.similarity_threshold
                ),
            });
        }

        if self.pipeline.knowledge_graph.enabled && self.pipeline.knowledge_graph.command.is_none()
        {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "knowledge_graph.enabled is set but no command is configured"
                    .to_string(),
            });
        }

        if self.pipeline.script_timeout_seconds > 3600 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "pipeline.script_timeout_seconds={} (>1h is unusual)",
                    self.pipeline.script_timeout_seconds
                ),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::load(dir.path()).unwrap();
        assert_eq!(cfg.qa.max_iterations, 50);
        assert_eq!(cfg.qa.recurrence_threshold, 3);
        assert!((cfg.qa.similarity_threshold - 0.8).abs() < f64::EPSILON);
        assert_eq!(cfg.pipeline.max_retries, 3);
        assert_eq!(cfg.pipeline.script_timeout_seconds, 300);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".auto-claude")).unwrap();
        std::fs::write(
            paths::config_path(dir.path()),
            "qa:\n  recurrence_threshold: 5\nagent:\n  model: claude-sonnet-4-5\n",
        )
        .unwrap();
        let cfg = Config::load(dir.path()).unwrap();
        assert_eq!(cfg.qa.recurrence_threshold, 5);
        assert_eq!(cfg.qa.max_iterations, 50);
        assert_eq!(cfg.agent.model, "claude-sonnet-4-5");
        assert_eq!(cfg.agent.permission_mode, "acceptEdits");
        assert!(cfg.agent.command_hook);
    }

    #[test]
    fn roundtrip_through_save() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::default();
        cfg.qa.max_iterations = 7;
        cfg.save(dir.path()).unwrap();
        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.qa.max_iterations, 7);
    }

    #[test]
    fn validate_flags_bad_thresholds() {
        let mut cfg = Config::default();
        assert!(cfg.validate().is_empty());
        cfg.qa.similarity_threshold = 1.5;
        cfg.qa.recurrence_threshold = 1;
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().any(|w| w.level == WarnLevel::Error));
    }
}
