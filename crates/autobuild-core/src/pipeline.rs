//! Spec creation orchestrator.
//!
//! Lifecycle of a spec directory: `NNN-pending` placeholder → renamed after
//! requirements → phases chosen by the complexity assessment → review
//! checkpoint. A failed required phase stops the run; every artifact
//! written so far stays on disk so the next run resumes from it.

use crate::agent::SharedAgent;
use crate::complexity::{Complexity, ComplexityAnalyzer, ComplexityAssessment};
use crate::config::Config;
use crate::error::Result;
use crate::logger::{JsonTaskLogger, LogEntryKind, LogPhase, SharedLogger};
use crate::phases::{Phase, PhaseExecutor, PhaseResult};
use crate::requirements::Requirements;
use crate::review::{review_checkpoint, ReviewCheckpoint};
use crate::{io, paths, prompts, specs};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub const COMPLEXITY_PHASE: &str = "complexity_assessment";

#[derive(Debug, Clone, Default)]
pub struct SpecOptions {
    pub task_description: Option<String>,
    /// Continue an existing spec directory instead of creating one.
    pub spec_name: Option<String>,
    pub complexity_override: Option<Complexity>,
    pub model: Option<String>,
    pub auto_approve: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpecOutcome {
    /// Ready to build: approved now or earlier.
    Approved { auto: bool },
    AwaitingReview { stale: bool },
    Failed { phase: String, errors: Vec<String> },
}

#[derive(Debug, Clone)]
pub struct SpecRun {
    pub spec_dir: PathBuf,
    pub complexity: Option<Complexity>,
    pub results: Vec<PhaseResult>,
    pub outcome: SpecOutcome,
}

impl SpecRun {
    pub fn files_created(&self) -> Vec<String> {
        self.results
            .iter()
            .flat_map(|r| r.output_files.iter())
            .filter_map(|f| f.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect()
    }
}

pub struct SpecOrchestrator {
    project_dir: PathBuf,
    spec_dir: PathBuf,
    options: SpecOptions,
    config: Config,
    agent: SharedAgent,
    logger: SharedLogger,
}

impl SpecOrchestrator {
    /// Prepare the specs directory (cleaning orphaned placeholders) and pick
    /// or create the spec directory this run works in.
    pub fn new(
        project_dir: &Path,
        options: SpecOptions,
        config: Config,
        agent: SharedAgent,
    ) -> Result<Self> {
        let specs_dir = specs::init_specs_dir(project_dir)?;
        specs::cleanup_orphaned_pending(&specs_dir, SystemTime::now());

        let spec_dir = match &options.spec_name {
            Some(name) => {
                paths::validate_spec_name(name)?;
                let dir = specs_dir.join(name);
                std::fs::create_dir_all(&dir)?;
                dir
            }
            None => specs::create_pending_spec_dir(&specs_dir)?,
        };
        tracing::info!(spec = %spec_dir.display(), "spec directory ready");

        Ok(Self {
            project_dir: project_dir.to_path_buf(),
            logger: JsonTaskLogger::shared(&spec_dir),
            spec_dir,
            options,
            config,
            agent,
        })
    }

    pub fn spec_dir(&self) -> &Path {
        &self.spec_dir
    }

    pub fn logger(&self) -> SharedLogger {
        self.logger.clone()
    }

    pub async fn run(&mut self) -> Result<SpecRun> {
        self.logger
            .start_phase(LogPhase::Planning, "Starting spec creation process");

        let mut exec = PhaseExecutor::new(
            &self.project_dir,
            &self.spec_dir,
            self.options.task_description.clone(),
            self.agent.clone(),
            self.logger.clone(),
            &self.config,
        )
        .with_model(self.options.model.clone());

        let mut results = Vec::new();
        let mut number = 0;

        for phase in [Phase::Discovery, Phase::Requirements] {
            number += 1;
            let result = self.run_phase(&mut exec, phase, number).await;
            let failed = !result.success;
            results.push(result);
            if failed {
                return Ok(self.fail(results, phase.as_str(), None));
            }
        }

        let renamed = specs::rename_from_requirements(&self.spec_dir)?;
        if renamed != self.spec_dir {
            self.logger.relocate(&renamed);
            exec.set_spec_dir(&renamed);
            self.spec_dir = renamed;
        }
        if let Some(req) = Requirements::load(&self.spec_dir) {
            exec.set_task_description(req.task_description);
        }

        number += 1;
        self.logger.log(
            LogPhase::Planning,
            LogEntryKind::Info,
            &format!("Starting phase {number}: COMPLEXITY ASSESSMENT"),
        );
        let (assessment, result) = self.assess_complexity(&exec).await;
        results.push(result);
        let complexity = assessment.complexity;
        tracing::info!(spec = %self.spec_dir.display(), %complexity, "running workflow");

        for name in assessment.phases_to_run() {
            let phase: Phase = match name.parse() {
                Ok(Phase::Discovery) | Ok(Phase::Requirements) => continue,
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unknown phase");
                    continue;
                }
            };
            number += 1;
            let result = self.run_phase(&mut exec, phase, number).await;
            let failed = !result.success;
            results.push(result);
            if failed {
                return Ok(self.fail(results, phase.as_str(), Some(complexity)));
            }
        }

        self.logger
            .end_phase(LogPhase::Planning, true, "Spec creation complete");

        let outcome = match review_checkpoint(&self.spec_dir, self.options.auto_approve)? {
            ReviewCheckpoint::Approved => SpecOutcome::Approved { auto: false },
            ReviewCheckpoint::AutoApproved => SpecOutcome::Approved { auto: true },
            ReviewCheckpoint::AwaitingReview { stale } => SpecOutcome::AwaitingReview { stale },
        };
        Ok(SpecRun {
            spec_dir: self.spec_dir.clone(),
            complexity: Some(complexity),
            results,
            outcome,
        })
    }

    async fn run_phase(&self, exec: &mut PhaseExecutor, phase: Phase, number: usize) -> PhaseResult {
        self.logger.log(
            LogPhase::Planning,
            LogEntryKind::Info,
            &format!("Starting phase {number}: {}", phase.display_name()),
        );
        let result = exec.run(phase).await;
        if result.success {
            tracing::info!(%phase, retries = result.retries, "phase complete");
        } else {
            tracing::warn!(%phase, retries = result.retries, "phase failed");
        }
        result
    }

    fn fail(
        &self,
        results: Vec<PhaseResult>,
        phase: &str,
        complexity: Option<Complexity>,
    ) -> SpecRun {
        // Soft phases that degraded earlier keep their errors alongside the failure.
        let errors: Vec<String> = results.iter().flat_map(|r| r.errors.iter().cloned()).collect();
        self.logger.log(
            LogPhase::Planning,
            LogEntryKind::Error,
            &format!("Phase '{phase}' failed: {}", errors.join("; ")),
        );
        self.logger
            .end_phase(LogPhase::Planning, false, &format!("Phase {phase} failed"));
        SpecRun {
            spec_dir: self.spec_dir.clone(),
            complexity,
            results,
            outcome: SpecOutcome::Failed {
                phase: phase.to_string(),
                errors,
            },
        }
    }

    /// Override, then a previous assessment, then the assessor agent, then
    /// the heuristic.
    async fn assess_complexity(&self, exec: &PhaseExecutor) -> (ComplexityAssessment, PhaseResult) {
        let file = self.spec_dir.join(paths::COMPLEXITY_JSON);
        let task = exec.task_description().unwrap_or_default().to_string();

        let assessment = if let Some(c) = self.options.complexity_override {
            ComplexityAssessment::new(c, 1.0, format!("Manual override: {c}"))
        } else if let Some(existing) = ComplexityAssessment::load(&self.spec_dir) {
            existing
        } else if self.config.pipeline.ai_complexity_assessment {
            self.logger.log(
                LogPhase::Planning,
                LogEntryKind::Info,
                "Analyzing task complexity with AI...",
            );
            let context = requirements_context(&self.spec_dir);
            let from_agent = if exec.run_agent(prompts::COMPLEXITY_ASSESSOR, &context).await {
                ComplexityAssessment::load(&self.spec_dir)
            } else {
                None
            };
            from_agent.unwrap_or_else(|| {
                tracing::warn!("AI assessment failed, falling back to heuristics");
                self.heuristic(&task)
            })
        } else {
            self.heuristic(&task)
        };

        if !file.exists() {
            if let Err(e) = assessment.save(&self.spec_dir) {
                tracing::warn!(error = %e, "could not save complexity assessment");
            }
        }
        self.logger.log(
            LogPhase::Planning,
            LogEntryKind::Success,
            &format!(
                "Complexity: {} ({:.0}% confidence)",
                assessment.complexity,
                assessment.confidence * 100.0
            ),
        );
        (
            assessment,
            PhaseResult::new(COMPLEXITY_PHASE, true, vec![file]),
        )
    }

    fn heuristic(&self, task: &str) -> ComplexityAssessment {
        let index: Option<serde_json::Value> =
            io::read_json_lenient(&self.spec_dir.join(paths::PROJECT_INDEX_JSON));
        ComplexityAnalyzer::new(index.as_ref()).analyze(task)
    }
}

fn bullet_list(value: Option<&serde_json::Value>) -> String {
    value
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.as_str())
                .map(|s| format!("- {s}"))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

/// Requirements summary handed to the complexity assessor.
fn requirements_context(spec_dir: &Path) -> String {
    let Some(req) = io::read_json_lenient::<serde_json::Value>(&spec_dir.join(paths::REQUIREMENTS_JSON))
    else {
        return String::new();
    };
    let text = |key: &str, fallback: &str| {
        req.get(key)
            .and_then(|v| v.as_str())
            .unwrap_or(fallback)
            .to_string()
    };
    let services = req
        .get("services_involved")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|s| s.as_str()).collect::<Vec<_>>().join(", "))
        .unwrap_or_default();
    format!(
        "**Task Description**: {}\n**Workflow Type**: {}\n**Services Involved**: {services}\n\
         **User Requirements**:\n{}\n**Acceptance Criteria**:\n{}\n**Constraints**:\n{}\n",
        text("task_description", "Not provided"),
        text("workflow_type", "Not specified"),
        bullet_list(req.get("user_requirements")),
        bullet_list(req.get("acceptance_criteria")),
        bullet_list(req.get("constraints")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::fake::{FakeAgent, Script};
    use crate::agent::AgentRequest;
    use crate::phases::tests::{VALID_PLAN, VALID_SPEC};
    use crate::review::ReviewState;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(paths::auto_claude_dir(dir.path())).unwrap();
        std::fs::write(
            paths::auto_claude_dir(dir.path()).join(paths::PROJECT_INDEX_JSON),
            r#"{"file_count": 3}"#,
        )
        .unwrap();
        dir
    }

    fn options(task: &str, complexity: Complexity) -> SpecOptions {
        SpecOptions {
            task_description: Some(task.into()),
            complexity_override: Some(complexity),
            auto_approve: true,
            ..SpecOptions::default()
        }
    }

    #[tokio::test]
    async fn simple_path_creates_approved_spec() {
        let dir = project();
        let agent = FakeAgent::new();
        agent.push_ok(|req: &AgentRequest| {
            std::fs::write(req.spec_dir.join(paths::SPEC_MD), VALID_SPEC).unwrap();
            std::fs::write(req.spec_dir.join(paths::PLAN_JSON), VALID_PLAN).unwrap();
        });
        let mut orch = SpecOrchestrator::new(
            dir.path(),
            options("Export orders as CSV", Complexity::Simple),
            Config::default(),
            agent.clone(),
        )
        .unwrap();
        let run = orch.run().await.unwrap();

        assert_eq!(run.outcome, SpecOutcome::Approved { auto: true });
        assert!(run.spec_dir.ends_with("001-export-orders-csv"));
        assert_eq!(agent.calls(), 1);
        assert!(ReviewState::load(&run.spec_dir).is_approval_valid(&run.spec_dir));
        assert!(run.spec_dir.join(paths::TASK_LOGS_JSON).exists());
        assert!(run.files_created().contains(&paths::SPEC_MD.to_string()));
        // Placeholder is gone after the rename.
        assert!(!paths::spec_dir(dir.path(), "001-pending").exists());
    }

    #[tokio::test]
    async fn required_phase_failure_stops_the_run() {
        let dir = project();
        let agent = FakeAgent::new();
        for _ in 0..3 {
            agent.push(Script::Fail("rate limited".into()), None);
        }
        let mut orch = SpecOrchestrator::new(
            dir.path(),
            SpecOptions {
                auto_approve: false,
                ..options("Add CSV export", Complexity::Standard)
            },
            Config::default(),
            agent,
        )
        .unwrap();
        let run = orch.run().await.unwrap();
        match &run.outcome {
            SpecOutcome::Failed { phase, errors } => {
                assert_eq!(phase, "spec_writing");
                // Three degraded context attempts, then three spec writer attempts.
                assert_eq!(errors.len(), 6);
                assert!(errors[0].starts_with("Attempt 1:"));
                assert_eq!(errors[5], "Attempt 3: Agent did not create spec.md");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        // Soft phases left their artifacts for the next run.
        assert!(run.spec_dir.join(paths::CONTEXT_JSON).exists());
        assert!(run.spec_dir.join(paths::REQUIREMENTS_JSON).exists());
    }

    #[tokio::test]
    async fn rerun_resumes_without_agent_calls() {
        let dir = project();
        let agent = FakeAgent::new();
        agent.push_ok(|req: &AgentRequest| {
            std::fs::write(req.spec_dir.join(paths::SPEC_MD), VALID_SPEC).unwrap();
            std::fs::write(req.spec_dir.join(paths::PLAN_JSON), VALID_PLAN).unwrap();
        });
        let first = SpecOrchestrator::new(
            dir.path(),
            SpecOptions {
                auto_approve: false,
                ..options("Export orders", Complexity::Simple)
            },
            Config::default(),
            agent.clone(),
        )
        .unwrap()
        .run()
        .await
        .unwrap();
        assert_eq!(first.outcome, SpecOutcome::AwaitingReview { stale: false });

        let name = first.spec_dir.file_name().unwrap().to_string_lossy().into_owned();
        let second = SpecOrchestrator::new(
            dir.path(),
            SpecOptions {
                spec_name: Some(name),
                auto_approve: true,
                ..SpecOptions::default()
            },
            Config::default(),
            agent.clone(),
        )
        .unwrap()
        .run()
        .await
        .unwrap();
        assert_eq!(second.outcome, SpecOutcome::Approved { auto: true });
        assert_eq!(second.complexity, Some(Complexity::Simple));
        assert_eq!(agent.calls(), 1);
    }

    #[test]
    fn requirements_context_lists_fields() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(paths::REQUIREMENTS_JSON),
            r#"{"task_description": "Add export", "services_involved": ["api", "web"],
                "acceptance_criteria": ["CSV downloads"]}"#,
        )
        .unwrap();
        let ctx = requirements_context(dir.path());
        assert!(ctx.contains("**Task Description**: Add export"));
        assert!(ctx.contains("**Workflow Type**: Not specified"));
        assert!(ctx.contains("**Services Involved**: api, web"));
        assert!(ctx.contains("- CSV downloads"));
    }
}
