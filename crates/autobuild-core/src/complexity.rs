//! Task complexity tiers and the phase list each tier runs.
//!
//! An assessment comes from a manual override, the assessor agent (which
//! writes `complexity_assessment.json` itself) or the keyword heuristic in
//! [`ComplexityAnalyzer`], in that order of preference.

use crate::error::{AutobuildError, Result};
use crate::{io, paths};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Standard,
    Complex,
}

impl Complexity {
    pub fn as_str(self) -> &'static str {
        match self {
            Complexity::Simple => "simple",
            Complexity::Standard => "standard",
            Complexity::Complex => "complex",
        }
    }
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Complexity {
    type Err = AutobuildError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "simple" => Ok(Complexity::Simple),
            "standard" => Ok(Complexity::Standard),
            "complex" => Ok(Complexity::Complex),
            other => Err(AutobuildError::InvalidComplexity(other.to_string())),
        }
    }
}

/// Phase names, in execution order.
pub const SIMPLE_PHASES: &[&str] = &["discovery", "historical_context", "quick_spec", "validation"];
pub const COMPLEX_PHASES: &[&str] = &[
    "discovery",
    "historical_context",
    "requirements",
    "research",
    "context",
    "spec_writing",
    "self_critique",
    "planning",
    "validation",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplexityAssessment {
    pub complexity: Complexity,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub estimated_files: u32,
    #[serde(default)]
    pub estimated_services: u32,
    #[serde(default)]
    pub external_integrations: Vec<String>,
    #[serde(default)]
    pub infrastructure_changes: bool,
    #[serde(default)]
    pub needs_research: bool,
    #[serde(default)]
    pub needs_self_critique: bool,
    /// Explicit phase list from the assessor agent; overrides the tier list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommended_phases: Vec<String>,
}

impl ComplexityAssessment {
    pub fn new(complexity: Complexity, confidence: f64, reasoning: impl Into<String>) -> Self {
        Self {
            complexity,
            confidence,
            reasoning: reasoning.into(),
            estimated_files: 0,
            estimated_services: 0,
            external_integrations: Vec::new(),
            infrastructure_changes: false,
            needs_research: complexity == Complexity::Complex,
            needs_self_critique: complexity == Complexity::Complex,
            recommended_phases: Vec::new(),
        }
    }

    /// Phases this assessment runs, discovery first and validation last.
    pub fn phases_to_run(&self) -> Vec<String> {
        if !self.recommended_phases.is_empty() {
            return self.recommended_phases.clone();
        }
        let names: Vec<&str> = match self.complexity {
            Complexity::Simple => SIMPLE_PHASES.to_vec(),
            Complexity::Standard => {
                let mut v = vec!["discovery", "historical_context", "requirements"];
                if self.needs_research {
                    v.push("research");
                }
                v.extend(["context", "spec_writing", "planning", "validation"]);
                v
            }
            Complexity::Complex => COMPLEX_PHASES.to_vec(),
        };
        names.into_iter().map(String::from).collect()
    }

    /// Parse the assessor agent's output. Accepts flags either at the top
    /// level or nested under `flags`.
    pub fn from_agent_json(value: &Value) -> Option<Self> {
        let complexity: Complexity = value.get("complexity")?.as_str()?.parse().ok()?;
        let flag = |name: &str| {
            value
                .get("flags")
                .and_then(|f| f.get(name))
                .or_else(|| value.get(name))
                .and_then(Value::as_bool)
        };
        let mut a = ComplexityAssessment::new(
            complexity,
            value.get("confidence").and_then(Value::as_f64).unwrap_or(0.5),
            value.get("reasoning").and_then(Value::as_str).unwrap_or(""),
        );
        if let Some(b) = flag("needs_research") {
            a.needs_research = b;
        }
        if let Some(b) = flag("needs_self_critique") {
            a.needs_self_critique = b;
        }
        if let Some(list) = value.get("recommended_phases").and_then(Value::as_array) {
            a.recommended_phases = list
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect();
        }
        Some(a)
    }

    pub fn load(spec_dir: &Path) -> Option<Self> {
        let value: Value = io::read_json_lenient(&spec_dir.join(paths::COMPLEXITY_JSON))?;
        Self::from_agent_json(&value)
    }

    pub fn save(&self, spec_dir: &Path) -> Result<()> {
        let mut value = serde_json::to_value(self)?;
        if let Some(obj) = value.as_object_mut() {
            obj.insert("phases_to_run".into(), serde_json::json!(self.phases_to_run()));
            obj.insert("created_at".into(), Value::from(chrono::Utc::now().to_rfc3339()));
        }
        io::write_json(&spec_dir.join(paths::COMPLEXITY_JSON), &value)
    }
}

// ---------------------------------------------------------------------------
// Heuristic analyzer
// ---------------------------------------------------------------------------

const SIMPLE_KEYWORDS: &[&str] = &[
    "fix", "typo", "update", "change", "rename", "remove", "delete", "adjust", "tweak",
    "correct", "modify", "style", "color", "colour", "text", "label", "button", "margin",
    "padding", "font", "size", "hide", "show", "wording", "copy",
];

const COMPLEX_KEYWORDS: &[&str] = &[
    "integrate", "integration", "api", "sdk", "library", "package", "database", "migrate",
    "migration", "docker", "kubernetes", "deploy", "authentication", "oauth", "graphql",
    "websocket", "queue", "cache", "redis", "postgres", "mongo", "elasticsearch", "kafka",
    "rabbitmq", "microservice", "refactor", "architecture", "infrastructure", "realtime",
];

const MULTI_SERVICE_KEYWORDS: &[&str] = &[
    "backend", "frontend", "worker", "service", "client", "server", "database", "proxy",
    "mobile", "cli",
];

const INTEGRATIONS: &[&str] = &[
    "stripe", "twilio", "sendgrid", "openai", "anthropic", "aws", "s3", "gcp", "azure",
    "firebase", "supabase", "auth0", "github", "slack", "discord", "paypal", "algolia",
    "sentry", "datadog", "mailgun", "shopify", "graphiti",
];

const INFRA_KEYWORDS: &[&str] = &[
    "docker", "kubernetes", "k8s", "terraform", "helm", "deploy", "deployment", "ci",
    "pipeline", "nginx", "infrastructure", "env", "environment",
];

/// Keyword and scope heuristic over the task text plus an optional project
/// index (used for the service names it lists).
pub struct ComplexityAnalyzer {
    service_names: Vec<String>,
}

impl ComplexityAnalyzer {
    pub fn new(project_index: Option<&Value>) -> Self {
        let service_names = project_index
            .and_then(|i| i.get("services"))
            .and_then(Value::as_object)
            .map(|m| m.keys().map(|k| k.to_lowercase()).collect())
            .unwrap_or_default();
        Self { service_names }
    }

    pub fn analyze(&self, task: &str) -> ComplexityAssessment {
        let lower = task.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric() && c != '-')
            .filter(|w| !w.is_empty())
            .collect();
        let count = |list: &[&str]| words.iter().filter(|w| list.contains(w)).count();

        let simple_hits = count(SIMPLE_KEYWORDS);
        let complex_hits = count(COMPLEX_KEYWORDS);
        let mut integrations: Vec<String> = INTEGRATIONS
            .iter()
            .filter(|name| words.contains(*name))
            .map(|s| s.to_string())
            .collect();
        integrations.dedup();
        let infra = count(INFRA_KEYWORDS) > 0;

        let services = if self.service_names.is_empty() {
            count(MULTI_SERVICE_KEYWORDS).max(1)
        } else {
            self.service_names
                .iter()
                .filter(|s| words.contains(&s.as_str()))
                .count()
                .max(1)
        };
        let estimated_files = (1 + complex_hits * 2 + services.saturating_sub(1) * 3
            + integrations.len() * 2) as u32;

        let (complexity, confidence, reasoning) = if integrations.len() >= 2
            || complex_hits >= 3
            || (infra && services >= 2)
        {
            (
                Complexity::Complex,
                0.8,
                format!(
                    "{} integrations, {complex_hits} complex signals, {services} services",
                    integrations.len()
                ),
            )
        } else if simple_hits > 0 && complex_hits == 0 && integrations.is_empty() && services <= 1 {
            (
                Complexity::Simple,
                0.8,
                format!("{simple_hits} simple-change signals and a single service"),
            )
        } else if complex_hits == 0 && integrations.is_empty() && services <= 1 && words.len() <= 6 {
            (Complexity::Simple, 0.6, "Short single-service task".to_string())
        } else {
            (
                Complexity::Standard,
                0.7,
                format!("{complex_hits} complex signals, {services} services"),
            )
        };

        let mut a = ComplexityAssessment::new(complexity, confidence, reasoning);
        a.estimated_files = estimated_files;
        a.estimated_services = services as u32;
        a.needs_research = complexity == Complexity::Complex || !integrations.is_empty();
        a.external_integrations = integrations;
        a.infrastructure_changes = infra;
        a
    }
}
