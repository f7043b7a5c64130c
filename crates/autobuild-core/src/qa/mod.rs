//! Post-build QA loop.
//!
//! A reviewer agent judges the build and records its verdict in
//! `qa_signoff`; on rejection a fixer agent works through
//! `QA_FIX_REQUEST.md` and the reviewer runs again. Every iteration is
//! appended to `qa_iteration_history` before the loop decides anything, and
//! issues that keep coming back hand the spec over to a human.

pub mod report;
pub mod testing;

pub use report::{
    escalate_to_human, has_recurring_issues, issue_similarity, iteration_history,
    normalize_issue_key, record_iteration, recurring_issue_summary, similarity_ratio,
    CommonIssue, IssueSummary, RecurringIssue, ISSUE_SIMILARITY_THRESHOLD,
    RECURRING_ISSUE_THRESHOLD,
};
pub use testing::{check_test_discovery, create_manual_test_plan, is_no_test_project};

use crate::agent::{run_session, AgentRequest, SharedAgent};
use crate::config::{Config, QaConfig};
use crate::error::{AutobuildError, Result};
use crate::logger::{LogEntryKind, LogPhase, SharedLogger};
use crate::plan::{ImplementationPlan, IterationStatus, QaIssue, QaSignoff};
use crate::prompts::{self, PromptLibrary};
use crate::{io, paths};
use std::path::{Path, PathBuf};
use std::time::Instant;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QaState {
    Reviewing,
    Fixing,
    Approved,
    Escalated,
    Exhausted,
}

impl QaState {
    pub fn as_str(self) -> &'static str {
        match self {
            QaState::Reviewing => "reviewing",
            QaState::Fixing => "fixing",
            QaState::Approved => "approved",
            QaState::Escalated => "escalated",
            QaState::Exhausted => "exhausted",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, QaState::Approved | QaState::Escalated | QaState::Exhausted)
    }
}

impl std::fmt::Display for QaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct QaOutcome {
    /// Always terminal.
    pub state: QaState,
    /// Last iteration number reached.
    pub iterations: u32,
    pub recurring: Vec<RecurringIssue>,
    pub manual_test_plan: Option<PathBuf>,
    pub escalation: Option<PathBuf>,
}

impl QaOutcome {
    fn new(state: QaState, iterations: u32) -> Self {
        Self {
            state,
            iterations,
            recurring: Vec::new(),
            manual_test_plan: None,
            escalation: None,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.state == QaState::Approved
    }
}

#[derive(Debug)]
enum Verdict {
    Approved,
    Rejected(Vec<QaIssue>),
    Error(String),
}

// ---------------------------------------------------------------------------
// QaLoop
// ---------------------------------------------------------------------------

pub struct QaLoop {
    /// Where the agents work: the project root or the build worktree.
    work_dir: PathBuf,
    spec_dir: PathBuf,
    agent: SharedAgent,
    logger: SharedLogger,
    prompts: PromptLibrary,
    model: Option<String>,
    config: QaConfig,
}

impl QaLoop {
    pub fn new(
        work_dir: &Path,
        spec_dir: &Path,
        agent: SharedAgent,
        logger: SharedLogger,
        config: &Config,
    ) -> Self {
        Self {
            work_dir: work_dir.to_path_buf(),
            spec_dir: spec_dir.to_path_buf(),
            agent,
            logger,
            prompts: PromptLibrary::new(Config::resolve(work_dir, &config.pipeline.prompts_dir)),
            model: Some(config.agent.model.clone()),
            config: config.qa.clone(),
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        if model.is_some() {
            self.model = model;
        }
        self
    }

    pub fn with_prompts(mut self, prompts: PromptLibrary) -> Self {
        self.prompts = prompts;
        self
    }

    /// Run until approval, escalation or the iteration cap. Errors only
    /// when QA cannot start (no plan, build incomplete) or a history write
    /// fails.
    pub async fn run(&self) -> Result<QaOutcome> {
        let plan = ImplementationPlan::load(&self.spec_dir)
            .ok_or_else(|| AutobuildError::PlanNotFound(self.spec_dir.join(paths::PLAN_JSON)))?;
        if !plan.is_build_complete() {
            let (completed, total) = plan.chunk_counts();
            return Err(AutobuildError::BuildIncomplete { completed, total });
        }

        let mut iteration = plan
            .qa_iteration_history
            .iter()
            .map(|r| r.iteration)
            .max()
            .unwrap_or(0);
        if plan.is_qa_approved() {
            tracing::info!(spec = %self.spec_dir.display(), "build already approved by QA");
            return Ok(QaOutcome::new(QaState::Approved, iteration));
        }

        // A worktree is a full checkout, so the work dir is the project.
        let mut manual_test_plan = None;
        if is_no_test_project(&self.spec_dir, &self.work_dir) {
            tracing::warn!("no test framework detected, creating manual test plan");
            manual_test_plan = Some(create_manual_test_plan(&self.spec_dir, &self.spec_name())?);
        }

        self.logger
            .start_phase(LogPhase::Validation, "Starting QA validation...");
        let max = self.config.max_iterations.max(1);

        while iteration < max {
            iteration += 1;
            tracing::info!(iteration, max, state = %QaState::Reviewing, "QA iteration");
            let started = Instant::now();
            let verdict = self.review(iteration).await;
            let duration = Some(started.elapsed().as_secs_f64());

            match verdict {
                Verdict::Approved => {
                    record_iteration(&self.spec_dir, iteration, IterationStatus::Approved, &[], duration)?;
                    self.logger.end_phase(
                        LogPhase::Validation,
                        true,
                        "QA validation passed - all criteria met",
                    );
                    let mut outcome = QaOutcome::new(QaState::Approved, iteration);
                    outcome.manual_test_plan = manual_test_plan;
                    return Ok(outcome);
                }
                Verdict::Rejected(issues) => {
                    let prior = iteration_history(&self.spec_dir);
                    record_iteration(&self.spec_dir, iteration, IterationStatus::Rejected, &issues, duration)?;
                    self.logger.log(
                        LogPhase::Validation,
                        LogEntryKind::Info,
                        &format!("QA found {} issue(s) in iteration {iteration}", issues.len()),
                    );

                    let recurring = has_recurring_issues(
                        &issues,
                        &prior,
                        self.config.recurrence_threshold,
                        self.config.similarity_threshold,
                    );
                    if !recurring.is_empty() {
                        let path = escalate_to_human(
                            &self.spec_dir,
                            &recurring,
                            iteration,
                            self.config.similarity_threshold,
                        )?;
                        self.logger.end_phase(
                            LogPhase::Validation,
                            false,
                            &format!(
                                "QA escalated to human after {iteration} iterations due to recurring issues"
                            ),
                        );
                        let mut outcome = QaOutcome::new(QaState::Escalated, iteration);
                        outcome.recurring = recurring;
                        outcome.escalation = Some(path);
                        outcome.manual_test_plan = manual_test_plan;
                        return Ok(outcome);
                    }
                    if iteration >= max {
                        break;
                    }

                    tracing::info!(iteration, state = %QaState::Fixing, "running QA fixer");
                    if let Err(e) = self.fix(iteration, &issues).await {
                        record_iteration(
                            &self.spec_dir,
                            iteration,
                            IterationStatus::Error,
                            &[QaIssue::new("Fixer error").with_description(e)],
                            None,
                        )?;
                    }
                }
                Verdict::Error(message) => {
                    tracing::warn!(iteration, error = %message, "QA reviewer error, retrying");
                    record_iteration(
                        &self.spec_dir,
                        iteration,
                        IterationStatus::Error,
                        &[QaIssue::new("QA error").with_description(message)],
                        duration,
                    )?;
                }
            }
        }

        let path = escalate_to_human(&self.spec_dir, &[], iteration, self.config.similarity_threshold)?;
        self.logger.end_phase(
            LogPhase::Validation,
            false,
            &format!("QA validation incomplete after {iteration} iterations"),
        );
        let mut outcome = QaOutcome::new(QaState::Exhausted, iteration);
        outcome.escalation = Some(path);
        outcome.manual_test_plan = manual_test_plan;
        Ok(outcome)
    }

    fn spec_name(&self) -> String {
        self.spec_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Clear the previous verdict so a reviewer that never writes one is
    /// not mistaken for a repeat of the last iteration.
    fn mark_pending(&self, iteration: u32) -> Result<()> {
        let Some(mut plan) = ImplementationPlan::load(&self.spec_dir) else {
            return Ok(());
        };
        plan.qa_signoff = Some(QaSignoff {
            status: "pending".to_string(),
            qa_session: iteration,
            ..QaSignoff::default()
        });
        plan.save(&self.spec_dir)
    }

    async fn session(&self, prompt: &str, context: &str) -> Result<String> {
        let text = self
            .prompts
            .compose(prompt, &self.spec_dir, &self.work_dir, context)?;
        let request =
            AgentRequest::new(text, &self.work_dir, &self.spec_dir).with_model(self.model.clone());
        run_session(
            self.agent.as_ref(),
            request,
            self.logger.as_ref(),
            LogPhase::Validation,
        )
        .await
    }

    async fn review(&self, iteration: u32) -> Verdict {
        if let Err(e) = self.mark_pending(iteration) {
            return Verdict::Error(e.to_string());
        }
        let context = format!(
            "**QA Session**: {iteration}\n**Spec Name**: {}\n**Max Iterations**: {}\n\n\
             All spec files (spec.md, implementation_plan.json, etc.) are located in: `{}/`\n",
            self.spec_name(),
            self.config.max_iterations,
            self.spec_dir.display()
        );
        if let Err(e) = self.session(prompts::QA_REVIEWER, &context).await {
            self.logger.log(
                LogPhase::Validation,
                LogEntryKind::Error,
                &format!("QA session error: {e}"),
            );
            return Verdict::Error(e.to_string());
        }

        let signoff = ImplementationPlan::load(&self.spec_dir).and_then(|p| p.qa_signoff);
        match signoff {
            Some(s) if s.status == "approved" => Verdict::Approved,
            Some(s) if s.status == "rejected" => Verdict::Rejected(s.issues_found),
            _ => Verdict::Error("QA agent did not update implementation_plan.json".to_string()),
        }
    }

    async fn fix(&self, iteration: u32, issues: &[QaIssue]) -> std::result::Result<(), String> {
        let request_file = self.spec_dir.join(paths::QA_FIX_REQUEST_MD);
        if !request_file.exists() {
            write_fix_request(&request_file, iteration, issues).map_err(|e| e.to_string())?;
        }
        let context = format!(
            "**Fix Session**: {iteration}\n**Spec Name**: {}\n\nThe fix request file is at: `{}`\n",
            self.spec_name(),
            request_file.display()
        );
        match self.session(prompts::QA_FIXER, &context).await {
            Ok(_) => {
                // The next review writes a fresh request when it rejects again.
                if let Err(e) = std::fs::remove_file(&request_file) {
                    tracing::debug!(error = %e, "fix request already removed");
                }
                Ok(())
            }
            Err(e) => {
                self.logger.log(
                    LogPhase::Validation,
                    LogEntryKind::Error,
                    &format!("QA fixer error: {e}"),
                );
                Err(e.to_string())
            }
        }
    }
}

/// `QA_FIX_REQUEST.md` built from the reviewer's issue list, for reviewers
/// that rejected without writing one.
fn write_fix_request(path: &Path, iteration: u32, issues: &[QaIssue]) -> Result<()> {
    let mut out = format!("# QA Fix Request\n\n**QA Session**: {iteration}\n\n## Issues\n\n");
    if issues.is_empty() {
        out.push_str("The reviewer rejected the build without listing issues. See `qa_report.md`.\n");
    }
    for (n, issue) in issues.iter().enumerate() {
        out.push_str(&format!("### {}. {}\n\n", n + 1, issue.title));
        if let Some(file) = &issue.file {
            let line = issue.line.as_ref().map(|l| format!(":{l}")).unwrap_or_default();
            out.push_str(&format!("- **Location**: {file}{line}\n"));
        }
        if let Some(kind) = &issue.issue_type {
            out.push_str(&format!("- **Severity**: {kind}\n"));
        }
        if let Some(desc) = &issue.description {
            out.push_str(&format!("\n{desc}\n"));
        }
        out.push('\n');
    }
    io::atomic_write(path, out.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::fake::{FakeAgent, Script};
    use crate::logger::MemoryLogger;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    const COMPLETE_PLAN: &str = r#"{"feature": "Export", "workflow_type": "feature", "phases": [
        {"phase": 1, "name": "Backend", "chunks": [
            {"id": "1.1", "description": "Add endpoint", "status": "completed"}]}]}"#;

    struct Fixture {
        dir: TempDir,
        spec_dir: PathBuf,
        agent: Arc<FakeAgent>,
        logger: Arc<MemoryLogger>,
    }

    impl Fixture {
        fn new(plan: &str) -> Self {
            let dir = TempDir::new().unwrap();
            let spec_dir = paths::spec_dir(dir.path(), "001-export");
            std::fs::create_dir_all(&spec_dir).unwrap();
            std::fs::write(spec_dir.join(paths::PLAN_JSON), plan).unwrap();
            std::fs::write(dir.path().join("pytest.ini"), "").unwrap();
            Self {
                dir,
                spec_dir,
                agent: FakeAgent::new(),
                logger: MemoryLogger::shared(),
            }
        }

        fn qa(&self, max_iterations: u32) -> QaLoop {
            let mut config = Config::default();
            config.qa.max_iterations = max_iterations;
            QaLoop::new(
                self.dir.path(),
                &self.spec_dir,
                self.agent.clone(),
                self.logger.clone(),
                &config,
            )
        }

        /// Next reviewer session writes this verdict.
        fn review(&self, status: &'static str, issues: serde_json::Value) {
            self.agent.push_ok(move |req: &AgentRequest| {
                let path = req.spec_dir.join(paths::PLAN_JSON);
                let mut plan: serde_json::Value =
                    serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
                plan["qa_signoff"] = json!({"status": status, "issues_found": issues.clone()});
                std::fs::write(&path, plan.to_string()).unwrap();
            });
        }

        fn fixer(&self) {
            self.agent.push_ok(|_| {});
        }
    }

    #[tokio::test]
    async fn refuses_incomplete_build() {
        let fx = Fixture::new(
            r#"{"phases": [{"phase": 1, "name": "A", "chunks": [
                {"id": "1", "description": "x", "status": "completed"},
                {"id": "2", "description": "y", "status": "pending"}]}]}"#,
        );
        let err = fx.qa(5).run().await.unwrap_err();
        assert!(matches!(
            err,
            AutobuildError::BuildIncomplete { completed: 1, total: 2 }
        ));
        assert_eq!(fx.agent.calls(), 0);
    }

    #[tokio::test]
    async fn already_approved_is_a_no_op() {
        let fx = Fixture::new(
            r#"{"phases": [{"phase": 1, "name": "A", "chunks": [
                {"id": "1", "description": "x", "status": "completed"}]}],
               "qa_signoff": {"status": "approved", "qa_session": 2}}"#,
        );
        let outcome = fx.qa(5).run().await.unwrap();
        assert!(outcome.is_approved());
        assert_eq!(fx.agent.calls(), 0);
    }

    #[tokio::test]
    async fn reject_fix_then_approve() {
        let fx = Fixture::new(COMPLETE_PLAN);
        fx.review("rejected", json!([{"title": "Missing null check", "file": "api.rs"}]));
        fx.fixer();
        fx.review("approved", json!([]));

        let outcome = fx.qa(5).run().await.unwrap();
        assert_eq!(outcome.state, QaState::Approved);
        assert_eq!(outcome.iterations, 2);
        assert!(outcome.manual_test_plan.is_none());

        let history = iteration_history(&fx.spec_dir);
        let statuses: Vec<_> = history.iter().map(|r| r.status).collect();
        assert_eq!(statuses, [IterationStatus::Rejected, IterationStatus::Approved]);
        assert_eq!(history[0].issues[0].title, "Missing null check");
        // The fixer saw the generated fix request.
        let prompts = fx.agent.prompts.lock().unwrap();
        assert!(prompts[1].contains("**Fix Session**: 1"));
        assert!(prompts[1].contains(paths::QA_FIX_REQUEST_MD));
        assert!(fx.logger.contains("QA validation passed"));
    }

    #[tokio::test]
    async fn recurring_issue_escalates() {
        let fx = Fixture::new(COMPLETE_PLAN);
        let same = json!([{"title": "Error: Login fails", "file": "auth.rs"}]);
        fx.review("rejected", same.clone());
        fx.fixer();
        fx.review("rejected", same.clone());
        fx.fixer();
        fx.review("rejected", same);

        let outcome = fx.qa(50).run().await.unwrap();
        assert_eq!(outcome.state, QaState::Escalated);
        assert_eq!(outcome.iterations, 3);
        assert_eq!(outcome.recurring[0].occurrence_count, 3);
        assert!(fx.spec_dir.join(paths::QA_ESCALATION_MD).exists());
        assert_eq!(iteration_history(&fx.spec_dir).len(), 3);
        // The plan itself is left in place.
        assert!(ImplementationPlan::load(&fx.spec_dir).unwrap().is_build_complete());
    }

    #[tokio::test]
    async fn agent_errors_become_error_iterations() {
        let fx = Fixture::new(COMPLETE_PLAN);
        fx.agent.push(Script::Fail("connection reset".into()), None);
        fx.agent.push_ok(|_| {}); // reviewer never writes a verdict
        fx.review("approved", json!([]));

        let outcome = fx.qa(5).run().await.unwrap();
        assert!(outcome.is_approved());
        let history = iteration_history(&fx.spec_dir);
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].status, IterationStatus::Error);
        assert_eq!(history[0].issues[0].title, "QA error");
        assert_eq!(
            history[1].issues[0].description.as_deref(),
            Some("QA agent did not update implementation_plan.json")
        );
    }

    #[tokio::test]
    async fn cap_exhausts_and_escalates() {
        let fx = Fixture::new(COMPLETE_PLAN);
        fx.review("rejected", json!([{"title": "Slow query", "file": "db.rs"}]));
        fx.fixer();
        fx.review("rejected", json!([{"title": "Broken layout", "file": "ui.tsx"}]));

        let outcome = fx.qa(2).run().await.unwrap();
        assert_eq!(outcome.state, QaState::Exhausted);
        assert_eq!(outcome.iterations, 2);
        let text = std::fs::read_to_string(outcome.escalation.unwrap()).unwrap();
        assert!(text.contains("iteration limit"));
        assert_eq!(fx.agent.calls(), 3);
    }

    #[tokio::test]
    async fn history_resumes_iteration_numbering() {
        let fx = Fixture::new(COMPLETE_PLAN);
        record_iteration(&fx.spec_dir, 4, IterationStatus::Error, &[], None).unwrap();
        fx.review("approved", json!([]));
        let outcome = fx.qa(10).run().await.unwrap();
        assert_eq!(outcome.iterations, 5);
    }

    #[tokio::test]
    async fn manual_plan_for_projects_without_tests() {
        let fx = Fixture::new(COMPLETE_PLAN);
        std::fs::remove_file(fx.dir.path().join("pytest.ini")).unwrap();
        fx.review("approved", json!([]));
        let outcome = fx.qa(3).run().await.unwrap();
        assert!(outcome.is_approved());
        assert!(outcome.manual_test_plan.unwrap().exists());
    }

    #[test]
    fn terminal_states() {
        assert!(!QaState::Reviewing.is_terminal());
        assert!(!QaState::Fixing.is_terminal());
        assert!(QaState::Escalated.is_terminal());
        assert_eq!(QaState::Exhausted.to_string(), "exhausted");
    }
}
