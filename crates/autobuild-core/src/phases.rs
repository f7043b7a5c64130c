//! Spec-creation phases.
//!
//! Every phase is idempotent: when its artifact already exists (and passes
//! validation, where validation applies) it returns success with zero
//! retries and does no work. Otherwise it retries up to `max_retries`
//! times. Soft phases (historical context, research, context, self
//! critique) never fail: they degrade to a placeholder artifact carrying a
//! `reason`. Required phases fail with the per-attempt errors.

use crate::agent::{run_session, AgentRequest, SharedAgent};
use crate::artifacts;
use crate::config::{Config, PipelineConfig};
use crate::error::{AutobuildError, Result};
use crate::knowledge::{gather_hints, CommandHintProvider, HintProvider, HINT_KINDS};
use crate::logger::{LogEntryKind, LogPhase, SharedLogger};
use crate::plan::{create_minimal_plan, ImplementationPlan};
use crate::prompts::{self, PromptLibrary};
use crate::requirements::{Requirements, RequirementsPrompter};
use crate::script::ScriptRunner;
use crate::spec_validator::{self, auto_fix_plan, ValidationResult};
use crate::paths;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const MAX_RETRIES: u32 = 3;

// ---------------------------------------------------------------------------
// Phase names
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Discovery,
    HistoricalContext,
    Requirements,
    Research,
    Context,
    QuickSpec,
    SpecWriting,
    SelfCritique,
    Planning,
    Validation,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Discovery => "discovery",
            Phase::HistoricalContext => "historical_context",
            Phase::Requirements => "requirements",
            Phase::Research => "research",
            Phase::Context => "context",
            Phase::QuickSpec => "quick_spec",
            Phase::SpecWriting => "spec_writing",
            Phase::SelfCritique => "self_critique",
            Phase::Planning => "planning",
            Phase::Validation => "validation",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Phase::Discovery => "PROJECT DISCOVERY",
            Phase::HistoricalContext => "HISTORICAL CONTEXT",
            Phase::Requirements => "REQUIREMENTS GATHERING",
            Phase::Research => "INTEGRATION RESEARCH",
            Phase::Context => "CONTEXT DISCOVERY",
            Phase::QuickSpec => "QUICK SPEC",
            Phase::SpecWriting => "SPEC DOCUMENT CREATION",
            Phase::SelfCritique => "SPEC SELF-CRITIQUE",
            Phase::Planning => "IMPLEMENTATION PLANNING",
            Phase::Validation => "FINAL VALIDATION",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = AutobuildError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "discovery" => Phase::Discovery,
            "historical_context" => Phase::HistoricalContext,
            "requirements" => Phase::Requirements,
            "research" => Phase::Research,
            "context" => Phase::Context,
            "quick_spec" => Phase::QuickSpec,
            "spec_writing" => Phase::SpecWriting,
            "self_critique" => Phase::SelfCritique,
            "planning" => Phase::Planning,
            "validation" => Phase::Validation,
            other => return Err(AutobuildError::UnknownPhase(other.to_string())),
        })
    }
}

// ---------------------------------------------------------------------------
// PhaseResult
// ---------------------------------------------------------------------------

/// Outcome of one phase. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseResult {
    pub phase: String,
    pub success: bool,
    pub output_files: Vec<PathBuf>,
    pub errors: Vec<String>,
    pub retries: u32,
}

impl PhaseResult {
    fn ok(phase: Phase, files: Vec<PathBuf>, retries: u32) -> Self {
        Self {
            phase: phase.as_str().to_string(),
            success: true,
            output_files: files,
            errors: Vec::new(),
            retries,
        }
    }

    fn failed(phase: Phase, errors: Vec<String>, retries: u32) -> Self {
        Self {
            phase: phase.as_str().to_string(),
            success: false,
            output_files: Vec::new(),
            errors,
            retries,
        }
    }

    /// Success that still carries the errors it recovered from.
    fn degraded(phase: Phase, files: Vec<PathBuf>, errors: Vec<String>, retries: u32) -> Self {
        Self {
            phase: phase.as_str().to_string(),
            success: true,
            output_files: files,
            errors,
            retries,
        }
    }

    pub fn new(phase: &str, success: bool, output_files: Vec<PathBuf>) -> Self {
        Self {
            phase: phase.to_string(),
            success,
            output_files,
            errors: Vec::new(),
            retries: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// PhaseExecutor
// ---------------------------------------------------------------------------

pub struct PhaseExecutor {
    project_dir: PathBuf,
    spec_dir: PathBuf,
    task_description: Option<String>,
    interactive: bool,
    agent: SharedAgent,
    logger: SharedLogger,
    prompts: PromptLibrary,
    scripts: ScriptRunner,
    analyzer_script: PathBuf,
    context_script: PathBuf,
    planner_script: PathBuf,
    hints: Option<Arc<dyn HintProvider>>,
    prompter: Option<Arc<dyn RequirementsPrompter>>,
    model: Option<String>,
    max_retries: u32,
}

impl PhaseExecutor {
    pub fn new(
        project_dir: &Path,
        spec_dir: &Path,
        task_description: Option<String>,
        agent: SharedAgent,
        logger: SharedLogger,
        config: &Config,
    ) -> Self {
        let pipeline: &PipelineConfig = &config.pipeline;
        let resolve = |p: &Path| Config::resolve(project_dir, p);
        let hints = hint_provider(project_dir, config);
        Self {
            project_dir: project_dir.to_path_buf(),
            spec_dir: spec_dir.to_path_buf(),
            task_description,
            interactive: false,
            agent,
            logger,
            prompts: PromptLibrary::new(resolve(&pipeline.prompts_dir)),
            scripts: ScriptRunner::new(
                project_dir,
                Duration::from_secs(pipeline.script_timeout_seconds),
            ),
            analyzer_script: resolve(&pipeline.analyzer_script),
            context_script: resolve(&pipeline.context_script),
            planner_script: resolve(&pipeline.planner_script),
            hints,
            prompter: None,
            model: Some(config.agent.model.clone()),
            max_retries: pipeline.max_retries.max(1),
        }
    }

    pub fn with_prompter(mut self, prompter: Arc<dyn RequirementsPrompter>) -> Self {
        self.prompter = Some(prompter);
        self.interactive = true;
        self
    }

    pub fn with_hint_provider(mut self, provider: Option<Arc<dyn HintProvider>>) -> Self {
        self.hints = provider;
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        if model.is_some() {
            self.model = model;
        }
        self
    }

    pub fn spec_dir(&self) -> &Path {
        &self.spec_dir
    }

    /// Point subsequent phases at a renamed spec directory.
    pub fn set_spec_dir(&mut self, spec_dir: &Path) {
        self.spec_dir = spec_dir.to_path_buf();
    }

    pub fn task_description(&self) -> Option<&str> {
        self.task_description.as_deref()
    }

    pub fn set_task_description(&mut self, task: impl Into<String>) {
        self.task_description = Some(task.into());
    }

    pub fn logger(&self) -> &SharedLogger {
        &self.logger
    }

    pub async fn run(&mut self, phase: Phase) -> PhaseResult {
        match phase {
            Phase::Discovery => self.discovery().await,
            Phase::HistoricalContext => self.historical_context().await,
            Phase::Requirements => self.requirements().await,
            Phase::Research => self.research().await,
            Phase::Context => self.context().await,
            Phase::QuickSpec => self.quick_spec().await,
            Phase::SpecWriting => self.spec_writing().await,
            Phase::SelfCritique => self.self_critique().await,
            Phase::Planning => self.planning().await,
            Phase::Validation => self.validation().await,
        }
    }

    fn artifact(&self, name: &str) -> PathBuf {
        self.spec_dir.join(name)
    }

    fn log(&self, kind: LogEntryKind, message: &str) {
        self.logger.log(LogPhase::Planning, kind, message);
    }

    /// Run a prompt through the agent. Session errors are already in the
    /// task log; callers only need to know whether it finished.
    pub async fn run_agent(&self, prompt: &str, additional_context: &str) -> bool {
        let text = match self.prompts.compose(
            prompt,
            &self.spec_dir,
            &self.project_dir,
            additional_context,
        ) {
            Ok(t) => t,
            Err(e) => {
                self.log(LogEntryKind::Error, &e.to_string());
                return false;
            }
        };
        let request = AgentRequest::new(text, &self.project_dir, &self.spec_dir)
            .with_model(self.model.clone());
        run_session(self.agent.as_ref(), request, self.logger.as_ref(), LogPhase::Planning)
            .await
            .is_ok()
    }

    fn task_or_requirements(&self) -> String {
        Requirements::load(&self.spec_dir)
            .map(|r| r.task_description)
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.task_description.clone())
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Phases
    // -----------------------------------------------------------------------

    pub async fn discovery(&self) -> PhaseResult {
        let index = self.artifact(paths::PROJECT_INDEX_JSON);
        if index.exists() {
            return PhaseResult::ok(Phase::Discovery, vec![index], 0);
        }

        let shared = paths::auto_claude_dir(&self.project_dir).join(paths::PROJECT_INDEX_JSON);
        if shared.is_file() {
            match std::fs::copy(&shared, &index) {
                Ok(_) => {
                    self.log(LogEntryKind::Success, "Reused existing project index");
                    return PhaseResult::ok(Phase::Discovery, vec![index], 0);
                }
                Err(e) => tracing::warn!(error = %e, "could not copy project index"),
            }
        }

        let args = vec![
            "--project-dir".to_string(),
            self.project_dir.display().to_string(),
            "--output".to_string(),
            index.display().to_string(),
        ];
        let mut errors = Vec::new();
        for attempt in 0..self.max_retries {
            let result = self.scripts.run(&self.analyzer_script, &args).await;
            if result.success && index.exists() {
                if let Some(count) = artifacts::project_file_count(&self.spec_dir) {
                    self.log(
                        LogEntryKind::Success,
                        &format!("Discovered {count} files in project"),
                    );
                }
                return PhaseResult::ok(Phase::Discovery, vec![index], attempt);
            }
            let output = if result.success {
                "Analyzer did not create project_index.json".to_string()
            } else {
                result.output.trim().to_string()
            };
            errors.push(format!("Attempt {}: {output}", attempt + 1));
            self.log(
                LogEntryKind::Error,
                &format!("Discovery attempt {} failed", attempt + 1),
            );
        }
        PhaseResult::failed(Phase::Discovery, errors, self.max_retries)
    }

    pub async fn historical_context(&self) -> PhaseResult {
        let hints_file = self.artifact(paths::GRAPH_HINTS_JSON);
        let phase = Phase::HistoricalContext;
        if hints_file.exists() {
            self.log(LogEntryKind::Success, "Historical context already available");
            return PhaseResult::ok(phase, vec![hints_file], 0);
        }

        let Some(provider) = self.hints.as_ref() else {
            self.log(LogEntryKind::Info, "Knowledge graph not configured, skipping");
            return self.sentinel(
                phase,
                artifacts::create_empty_hints(&self.spec_dir, false, "Knowledge graph not configured"),
                Vec::new(),
            );
        };

        let query = self.task_or_requirements();
        if query.trim().is_empty() {
            return self.sentinel(
                phase,
                artifacts::create_empty_hints(&self.spec_dir, true, "No task description available"),
                Vec::new(),
            );
        }

        self.log(LogEntryKind::Info, "Searching knowledge graph for relevant context...");
        match gather_hints(provider.as_ref(), &query, HINT_KINDS).await {
            Ok(hints) => {
                if !hints.is_empty() {
                    self.log(
                        LogEntryKind::Success,
                        &format!("Found {} relevant insights from past sessions", hints.len()),
                    );
                }
                self.sentinel(phase, artifacts::write_hints(&self.spec_dir, &query, &hints), Vec::new())
            }
            Err(e) => {
                tracing::warn!(error = %e, "knowledge graph query failed");
                self.sentinel(
                    phase,
                    artifacts::create_empty_hints(&self.spec_dir, true, &format!("Error: {e}")),
                    vec![e.to_string()],
                )
            }
        }
    }

    /// Result of a soft phase whose outcome is a written artifact.
    fn sentinel(&self, phase: Phase, written: Result<PathBuf>, errors: Vec<String>) -> PhaseResult {
        match written {
            Ok(path) => PhaseResult::degraded(phase, vec![path], errors, 0),
            Err(e) => PhaseResult::failed(phase, vec![e.to_string()], 0),
        }
    }

    pub async fn requirements(&mut self) -> PhaseResult {
        let phase = Phase::Requirements;
        let file = self.artifact(paths::REQUIREMENTS_JSON);
        if file.exists() {
            return PhaseResult::ok(phase, vec![file], 0);
        }

        let req = match (&self.task_description, self.interactive, &self.prompter) {
            (Some(task), false, _) if !task.trim().is_empty() => {
                let preview: String = if task.chars().count() > 100 {
                    format!("{}...", task.chars().take(100).collect::<String>())
                } else {
                    task.clone()
                };
                self.log(LogEntryKind::Success, &format!("Task: {preview}"));
                Requirements::from_task(task)
            }
            (_, true, Some(prompter)) => {
                self.log(LogEntryKind::Info, "Gathering requirements interactively...");
                match prompter.gather() {
                    Ok(Some(req)) => req,
                    Ok(None) => {
                        return PhaseResult::failed(phase, vec!["User cancelled".into()], 0)
                    }
                    Err(e) => return PhaseResult::failed(phase, vec![e.to_string()], 0),
                }
            }
            _ => Requirements::from_task(
                self.task_description
                    .as_deref()
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or("Unknown task"),
            ),
        };

        self.task_description = Some(req.task_description.clone());
        match req.save(&self.spec_dir) {
            Ok(()) => PhaseResult::ok(phase, vec![file], 0),
            Err(e) => PhaseResult::failed(phase, vec![e.to_string()], 0),
        }
    }

    pub async fn quick_spec(&self) -> PhaseResult {
        let phase = Phase::QuickSpec;
        let spec = self.artifact(paths::SPEC_MD);
        let plan = self.artifact(paths::PLAN_JSON);
        if spec.exists() && plan.exists() {
            return PhaseResult::ok(phase, vec![spec, plan], 0);
        }

        let task = self.task_or_requirements();
        let context = format!(
            "**Task**: {task}\n**Spec Directory**: {}\n**Complexity**: SIMPLE (1-2 files expected)\n\n\
             This is a SIMPLE task. Create a minimal spec and implementation plan directly.\n\
             No research or extensive analysis needed.\n",
            self.spec_dir.display()
        );
        let mut errors = Vec::new();
        for attempt in 0..self.max_retries {
            let ok = self.run_agent(prompts::SPEC_QUICK, &context).await;
            if ok && spec.exists() {
                if !plan.exists() {
                    if let Err(e) = create_minimal_plan(&self.spec_dir, &task) {
                        return PhaseResult::failed(phase, vec![e.to_string()], attempt);
                    }
                }
                return PhaseResult::ok(phase, vec![spec, plan], attempt);
            }
            errors.push(format!("Attempt {}: Quick spec agent failed", attempt + 1));
        }
        PhaseResult::failed(phase, errors, self.max_retries)
    }

    pub async fn research(&self) -> PhaseResult {
        let phase = Phase::Research;
        let research = self.artifact(paths::RESEARCH_JSON);
        let requirements = self.artifact(paths::REQUIREMENTS_JSON);
        if artifacts::research_is_readable(&self.spec_dir) {
            return PhaseResult::ok(phase, vec![research], 0);
        }
        if research.exists() {
            self.log(LogEntryKind::Info, "research.json is unreadable, regenerating");
        }
        if !requirements.exists() {
            return self.sentinel(
                phase,
                artifacts::create_minimal_research(&self.spec_dir, "No requirements file available"),
                Vec::new(),
            );
        }

        let context = format!(
            "**Requirements File**: {}\n**Research Output**: {}\n",
            requirements.display(),
            research.display()
        );
        let mut errors = Vec::new();
        for attempt in 0..self.max_retries {
            let ok = self.run_agent(prompts::SPEC_RESEARCHER, &context).await;
            if ok && artifacts::research_is_readable(&self.spec_dir) {
                return PhaseResult::ok(phase, vec![research], attempt);
            }
            if ok {
                let written = artifacts::create_minimal_research(
                    &self.spec_dir,
                    "Agent completed but created no findings",
                );
                let mut r = self.sentinel(phase, written, Vec::new());
                r.retries = attempt;
                return r;
            }
            errors.push(format!("Attempt {}: Research agent failed", attempt + 1));
        }
        let mut r = self.sentinel(
            phase,
            artifacts::create_minimal_research(&self.spec_dir, "Research agent failed after retries"),
            errors,
        );
        r.retries = self.max_retries;
        r
    }

    pub async fn context(&self) -> PhaseResult {
        let phase = Phase::Context;
        let context_file = self.artifact(paths::CONTEXT_JSON);
        if context_file.exists() {
            return PhaseResult::ok(phase, vec![context_file], 0);
        }

        let (task, services) = match Requirements::load(&self.spec_dir) {
            Some(r) => (r.task_description, r.services_involved),
            None => (self.task_description.clone().unwrap_or_default(), Vec::new()),
        };
        let task = if task.trim().is_empty() {
            "unknown task".to_string()
        } else {
            task
        };
        let args = vec![
            "--task".to_string(),
            task.clone(),
            "--services".to_string(),
            services.join(","),
            "--output".to_string(),
            context_file.display().to_string(),
        ];

        let mut errors = Vec::new();
        for attempt in 0..self.max_retries {
            let result = self.scripts.run(&self.context_script, &args).await;
            if result.success && context_file.exists() {
                if let Some((modify, reference)) = artifacts::context_stats(&self.spec_dir) {
                    self.log(
                        LogEntryKind::Success,
                        &format!(
                            "Found {modify} files to modify, {reference} files to reference"
                        ),
                    );
                }
                return PhaseResult::ok(phase, vec![context_file], attempt);
            }
            let output = if result.success {
                "Context script did not create context.json".to_string()
            } else {
                result.output.trim().to_string()
            };
            errors.push(format!("Attempt {}: {output}", attempt + 1));
        }

        let mut r = self.sentinel(
            phase,
            artifacts::create_minimal_context(&self.spec_dir, &task, &services, "Context script failed"),
            errors,
        );
        r.retries = self.max_retries;
        r
    }

    pub async fn spec_writing(&self) -> PhaseResult {
        let phase = Phase::SpecWriting;
        let spec = self.artifact(paths::SPEC_MD);
        if spec.exists() {
            if spec_validator::validate_spec_document(&self.spec_dir).valid {
                return PhaseResult::ok(phase, vec![spec], 0);
            }
            self.log(LogEntryKind::Info, "spec.md exists but has issues, regenerating");
        }

        let mut errors = Vec::new();
        for attempt in 0..self.max_retries {
            let ok = self.run_agent(prompts::SPEC_WRITER, "").await;
            if ok && spec.exists() {
                let result = spec_validator::validate_spec_document(&self.spec_dir);
                if result.valid {
                    return PhaseResult::ok(phase, vec![spec], attempt);
                }
                errors.push(format!(
                    "Attempt {}: Spec invalid - {}",
                    attempt + 1,
                    result.errors.join("; ")
                ));
            } else {
                errors.push(format!("Attempt {}: Agent did not create spec.md", attempt + 1));
            }
        }
        PhaseResult::failed(phase, errors, self.max_retries)
    }

    pub async fn self_critique(&self) -> PhaseResult {
        let phase = Phase::SelfCritique;
        let spec = self.artifact(paths::SPEC_MD);
        let critique = self.artifact(paths::CRITIQUE_JSON);
        if !spec.exists() {
            return PhaseResult::failed(phase, vec!["spec.md does not exist".into()], 0);
        }
        if artifacts::critique_is_complete(&self.spec_dir) {
            return PhaseResult::ok(phase, vec![critique], 0);
        }

        let context = format!(
            "**Spec File**: {}\n**Research File**: {}\n**Critique Output**: {}\n",
            spec.display(),
            self.artifact(paths::RESEARCH_JSON).display(),
            critique.display()
        );
        let mut errors = Vec::new();
        for attempt in 0..self.max_retries {
            if self.run_agent(prompts::SPEC_CRITIC, &context).await {
                if !critique.exists() {
                    if let Err(e) = artifacts::create_minimal_critique(
                        &self.spec_dir,
                        "Agent completed without explicit issues",
                    ) {
                        return PhaseResult::failed(phase, vec![e.to_string()], attempt);
                    }
                }
                if spec_validator::validate_spec_document(&self.spec_dir).valid {
                    return PhaseResult::ok(phase, vec![critique], attempt);
                }
                errors.push(format!(
                    "Attempt {}: Spec still invalid after critique",
                    attempt + 1
                ));
            } else {
                errors.push(format!("Attempt {}: Critique agent failed", attempt + 1));
            }
        }
        let mut r = self.sentinel(
            phase,
            artifacts::create_minimal_critique(&self.spec_dir, "Critique failed after retries"),
            errors,
        );
        r.retries = self.max_retries;
        r
    }

    /// Validate the plan, auto-fixing once when it is invalid.
    fn check_plan(&self) -> ValidationResult {
        let result = spec_validator::validate_implementation_plan(&self.spec_dir);
        if result.valid {
            return result;
        }
        match auto_fix_plan(&self.spec_dir) {
            Ok(true) => {
                let fixed = spec_validator::validate_implementation_plan(&self.spec_dir);
                if fixed.valid {
                    self.log(LogEntryKind::Info, "Auto-fixed implementation_plan.json");
                }
                fixed
            }
            Ok(false) => result,
            Err(e) => {
                tracing::warn!(error = %e, "plan auto-fix failed");
                result
            }
        }
    }

    fn log_plan_stats(&self) {
        if let Some(plan) = ImplementationPlan::load(&self.spec_dir) {
            let (_, total) = plan.chunk_counts();
            self.log(
                LogEntryKind::Success,
                &format!("Implementation plan created with {total} chunks"),
            );
        }
    }

    pub async fn planning(&self) -> PhaseResult {
        let phase = Phase::Planning;
        let plan = self.artifact(paths::PLAN_JSON);
        if plan.exists() {
            if spec_validator::validate_implementation_plan(&self.spec_dir).valid {
                return PhaseResult::ok(phase, vec![plan], 0);
            }
            self.log(LogEntryKind::Info, "Plan exists but invalid, regenerating");
        }

        let mut errors = Vec::new();
        let args = vec!["--spec-dir".to_string(), self.spec_dir.display().to_string()];
        let script = self.scripts.run(&self.planner_script, &args).await;
        if script.success && plan.exists() {
            let result = self.check_plan();
            if result.valid {
                self.log_plan_stats();
                return PhaseResult::ok(phase, vec![plan], 0);
            }
            errors.push(format!("Script output invalid: {}", result.errors.join("; ")));
        }

        for attempt in 0..self.max_retries {
            if self.run_agent(prompts::PLANNER, "").await && plan.exists() {
                let result = self.check_plan();
                if result.valid {
                    self.log_plan_stats();
                    return PhaseResult::ok(phase, vec![plan], attempt);
                }
                errors.push(format!(
                    "Agent attempt {}: {}",
                    attempt + 1,
                    result.errors.join("; ")
                ));
            } else {
                errors.push(format!("Agent attempt {}: Did not create plan file", attempt + 1));
            }
        }
        PhaseResult::failed(phase, errors, self.max_retries)
    }

    pub async fn validation(&self) -> PhaseResult {
        let phase = Phase::Validation;
        let mut results = Vec::new();
        for attempt in 0..self.max_retries {
            results = spec_validator::validate_all(&self.spec_dir);
            for r in &results {
                let status = if r.valid { "PASS" } else { "FAIL" };
                tracing::info!(checkpoint = %r.checkpoint, status, "validation");
            }
            if results.iter().all(|r| r.valid) {
                self.log(LogEntryKind::Success, "All validation checks passed");
                return PhaseResult::ok(phase, Vec::new(), attempt);
            }
            if attempt + 1 < self.max_retries {
                let context = fixer_context(&self.spec_dir, &results);
                if !self.run_agent(prompts::VALIDATION_FIXER, &context).await {
                    self.log(LogEntryKind::Error, "Auto-fix agent failed");
                }
            }
        }
        let errors = results
            .iter()
            .flat_map(|r| r.errors.iter().map(move |e| format!("{}: {e}", r.checkpoint)))
            .collect();
        PhaseResult::failed(phase, errors, self.max_retries)
    }
}

fn hint_provider(project_dir: &Path, config: &Config) -> Option<Arc<dyn HintProvider>> {
    let kg = &config.pipeline.knowledge_graph;
    if !kg.enabled {
        return None;
    }
    let command = kg.command.as_deref()?;
    match CommandHintProvider::new(command, project_dir) {
        Ok(p) => Some(Arc::new(p)),
        Err(e) => {
            tracing::warn!(error = %e, "knowledge graph command unusable");
            None
        }
    }
}

/// Error listing handed to the validation fixer agent.
pub fn fixer_context(spec_dir: &Path, results: &[ValidationResult]) -> String {
    let mut lines = Vec::new();
    for r in results.iter().filter(|r| !r.valid) {
        lines.push(format!("**{}** validation failed:", r.checkpoint));
        lines.extend(r.errors.iter().map(|e| format!("  - {e}")));
        if !r.fixes.is_empty() {
            lines.push("  Suggested fixes:".to_string());
            lines.extend(r.fixes.iter().map(|f| format!("    - {f}")));
        }
    }
    format!(
        "**Spec Directory**: {}\n\n## Validation Errors to Fix\n\n{}\n\n\
         Read the failed files, understand the errors, and fix them.\n",
        spec_dir.display(),
        lines.join("\n")
    )
}
