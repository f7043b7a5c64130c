//! Build execution: approval gate, workspace setup, coder sessions, QA.

use crate::agent::{run_session, AgentRequest, SharedAgent};
use crate::config::Config;
use crate::error::{AutobuildError, Result};
use crate::logger::{JsonTaskLogger, LogEntryKind, LogPhase, SharedLogger};
use crate::plan::ImplementationPlan;
use crate::prompts::{self, PromptLibrary};
use crate::qa::{QaLoop, QaOutcome};
use crate::review::{compute_file_hash, ReviewState};
use crate::status::{BuildState, StatusFile};
use crate::worktree::{sync_spec_back, WorktreeManager};
use crate::{io, paths};
use std::path::{Path, PathBuf};

/// Coder sessions in a row that complete no chunk before the build stops.
pub const MAX_STALLED_SESSIONS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkspaceMode {
    /// Build in a dedicated git worktree.
    #[default]
    Isolated,
    /// Build in the project checkout itself.
    Direct,
}

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub workspace: WorkspaceMode,
    /// Cap on coder sessions; `None` runs until the plan is complete.
    pub max_iterations: Option<u32>,
    pub skip_qa: bool,
    /// Build without a valid approval.
    pub force: bool,
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalCheck {
    Valid,
    Bypassed,
    /// `stale` when the spec changed after it was approved.
    Blocked { stale: bool },
}

pub fn check_approval(spec_dir: &Path, force: bool) -> ApprovalCheck {
    let state = ReviewState::load(spec_dir);
    if state.is_approval_valid(spec_dir) {
        ApprovalCheck::Valid
    } else if force {
        tracing::warn!(spec = %spec_dir.display(), "bypassing approval check");
        ApprovalCheck::Bypassed
    } else {
        ApprovalCheck::Blocked {
            stale: state.is_approved(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum BuildOutcome {
    ReviewRequired { stale: bool },
    /// Stopped with chunks left (session cap, stalled agent).
    Incomplete { completed: usize, total: usize },
    /// Every chunk done; `qa` is `None` when QA was skipped.
    Complete { qa: Option<QaOutcome> },
}

#[derive(Debug, Clone)]
pub struct BuildRun {
    pub outcome: BuildOutcome,
    pub work_dir: PathBuf,
    /// Set when the build ran in a worktree.
    pub worktree: Option<PathBuf>,
    pub sessions: u32,
}

// ---------------------------------------------------------------------------
// Human input
// ---------------------------------------------------------------------------

pub fn write_human_input(spec_dir: &Path, text: &str) -> Result<PathBuf> {
    let path = spec_dir.join(paths::HUMAN_INPUT_MD);
    io::atomic_write(&path, text.trim().as_bytes())?;
    Ok(path)
}

/// Read and remove `HUMAN_INPUT.md`; each note is delivered once.
pub fn take_human_input(spec_dir: &Path) -> Result<Option<String>> {
    let path = spec_dir.join(paths::HUMAN_INPUT_MD);
    let Ok(text) = std::fs::read_to_string(&path) else {
        return Ok(None);
    };
    std::fs::remove_file(&path)?;
    let text = text.trim().to_string();
    Ok((!text.is_empty()).then_some(text))
}

// ---------------------------------------------------------------------------
// BuildRunner
// ---------------------------------------------------------------------------

pub struct BuildRunner {
    project_dir: PathBuf,
    spec_dir: PathBuf,
    agent: SharedAgent,
    config: Config,
    options: BuildOptions,
    status: StatusFile,
}

impl BuildRunner {
    pub fn new(
        project_dir: &Path,
        spec_dir: &Path,
        agent: SharedAgent,
        config: Config,
        options: BuildOptions,
    ) -> Self {
        Self {
            project_dir: project_dir.to_path_buf(),
            spec_dir: spec_dir.to_path_buf(),
            agent,
            config,
            options,
            status: StatusFile::new(project_dir),
        }
    }

    pub fn spec_name(&self) -> String {
        self.spec_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Mark the build paused in the status file (Ctrl-C).
    pub fn pause(&self) -> Result<()> {
        let progress = ImplementationPlan::load(&self.spec_dir)
            .map(|p| p.chunk_counts())
            .unwrap_or((0, 0));
        self.status.update(&self.spec_name(), BuildState::Paused, progress)
    }

    pub async fn run(&self) -> Result<BuildRun> {
        let approval = check_approval(&self.spec_dir, self.options.force);
        if let ApprovalCheck::Blocked { stale } = approval {
            return Ok(BuildRun {
                outcome: BuildOutcome::ReviewRequired { stale },
                work_dir: self.project_dir.clone(),
                worktree: None,
                sessions: 0,
            });
        }
        if ImplementationPlan::load(&self.spec_dir).is_none() {
            return Err(AutobuildError::PlanNotFound(self.spec_dir.join(paths::PLAN_JSON)));
        }
        let reviewed_spec = compute_file_hash(&self.spec_dir.join(paths::SPEC_MD));

        let spec_name = self.spec_name();
        let (work_dir, spec_dir, worktree) = match self.options.workspace {
            WorkspaceMode::Direct => (self.project_dir.clone(), self.spec_dir.clone(), None),
            WorkspaceMode::Isolated => {
                let manager = WorktreeManager::new(&self.project_dir);
                if !manager.is_available() {
                    return Err(AutobuildError::Git {
                        command: "worktree add".to_string(),
                        stderr: format!(
                            "{} is not a git repository; build with --direct instead",
                            self.project_dir.display()
                        ),
                    });
                }
                let info = manager.ensure(&spec_name)?;
                let local = manager.localize_spec(&spec_name, &self.spec_dir)?;
                (info.path.clone(), local, Some(info.path))
            }
        };
        tracing::info!(spec = %spec_name, work_dir = %work_dir.display(), "starting build");

        let logger = JsonTaskLogger::shared(&spec_dir);
        let sessions = self.run_coder(&work_dir, &spec_dir, &logger).await?;
        self.keep_approval(&approval, &spec_dir, &reviewed_spec)?;

        let plan = ImplementationPlan::load(&spec_dir)
            .ok_or_else(|| AutobuildError::PlanNotFound(spec_dir.join(paths::PLAN_JSON)))?;
        let (completed, total) = plan.chunk_counts();
        if !plan.is_build_complete() {
            self.status.update(&spec_name, BuildState::Paused, (completed, total))?;
            return Ok(BuildRun {
                outcome: BuildOutcome::Incomplete { completed, total },
                work_dir,
                worktree,
                sessions,
            });
        }

        let qa = if self.options.skip_qa {
            None
        } else {
            self.status.update(&spec_name, BuildState::Qa, (completed, total))?;
            let outcome = QaLoop::new(&work_dir, &spec_dir, self.agent.clone(), logger, &self.config)
                .with_prompts(self.prompts())
                .with_model(self.options.model.clone())
                .run()
                .await?;
            sync_spec_back(&spec_dir, &self.spec_dir)?;
            self.keep_approval(&approval, &spec_dir, &reviewed_spec)?;
            Some(outcome)
        };

        let approved = qa.as_ref().map_or(true, QaOutcome::is_approved);
        let state = if approved { BuildState::Complete } else { BuildState::Paused };
        self.status.update(&spec_name, state, (completed, total))?;
        Ok(BuildRun {
            outcome: BuildOutcome::Complete { qa },
            work_dir,
            worktree,
            sessions,
        })
    }

    /// Chunk statuses and QA sign-off live in the plan, which is part of the
    /// approval hash. Plan progress made by the build is folded into a valid
    /// approval only while `spec.md` still matches what was reviewed; an
    /// edited spec withdraws the approval. A bypassed one stays unapproved.
    fn keep_approval(
        &self,
        approval: &ApprovalCheck,
        work_spec_dir: &Path,
        reviewed_spec: &str,
    ) -> Result<()> {
        if *approval != ApprovalCheck::Valid {
            return Ok(());
        }
        let mut state = ReviewState::load(&self.spec_dir);
        let unchanged = [self.spec_dir.as_path(), work_spec_dir]
            .iter()
            .all(|dir| compute_file_hash(&dir.join(paths::SPEC_MD)) == reviewed_spec);
        if unchanged {
            state.restamp(&self.spec_dir, true)
        } else {
            tracing::warn!(
                spec = %self.spec_name(),
                "spec.md changed during the build; approval withdrawn"
            );
            state.invalidate(&self.spec_dir, true)
        }
    }

    /// Prompts come from the project, not the worktree copy.
    fn prompts(&self) -> PromptLibrary {
        PromptLibrary::new(Config::resolve(&self.project_dir, &self.config.pipeline.prompts_dir))
    }

    /// Coder sessions until the plan is complete, the session cap is hit or
    /// the agent stalls. Progress is synced back after every session.
    async fn run_coder(&self, work_dir: &Path, spec_dir: &Path, logger: &SharedLogger) -> Result<u32> {
        let spec_name = self.spec_name();
        let prompts = self.prompts();
        let model = self
            .options
            .model
            .clone()
            .or_else(|| Some(self.config.agent.model.clone()));

        let mut sessions = 0;
        let mut stalled = 0;
        logger.start_phase(LogPhase::Coding, "Starting implementation");
        loop {
            let plan = ImplementationPlan::load(spec_dir)
                .ok_or_else(|| AutobuildError::PlanNotFound(spec_dir.join(paths::PLAN_JSON)))?;
            let (completed, total) = plan.chunk_counts();
            if plan.is_build_complete() {
                logger.end_phase(LogPhase::Coding, true, "All chunks completed");
                break;
            }
            if self.options.max_iterations.is_some_and(|max| sessions >= max) {
                logger.end_phase(
                    LogPhase::Coding,
                    false,
                    &format!("Stopped after {sessions} sessions ({completed}/{total} chunks)"),
                );
                break;
            }
            if stalled >= MAX_STALLED_SESSIONS {
                logger.end_phase(
                    LogPhase::Coding,
                    false,
                    &format!("No progress in {stalled} sessions ({completed}/{total} chunks)"),
                );
                break;
            }

            sessions += 1;
            self.status.update(&spec_name, BuildState::Building, (completed, total))?;
            let mut context = format!(
                "**Session**: {sessions}\n**Progress**: {completed}/{total} chunks completed\n"
            );
            if let Some(chunk) = plan.next_chunk() {
                context.push_str(&format!(
                    "**Next Chunk**: {} - {}\n",
                    chunk.id, chunk.description
                ));
            }
            // The CLI writes guidance into the project's spec dir, not the worktree copy.
            let note = match take_human_input(&self.spec_dir)? {
                Some(note) => Some(note),
                None => take_human_input(spec_dir)?,
            };
            if let Some(note) = note {
                logger.log(LogPhase::Coding, LogEntryKind::Info, "Including human guidance");
                context.push_str(&format!("\n## Human Guidance\n\n{note}\n"));
            }

            let prompt = prompts.compose(prompts::CODER, spec_dir, work_dir, &context)?;
            let request = AgentRequest::new(prompt, work_dir, spec_dir).with_model(model.clone());
            if let Err(e) =
                run_session(self.agent.as_ref(), request, logger.as_ref(), LogPhase::Coding).await
            {
                tracing::warn!(session = sessions, error = %e, "coder session failed");
            }
            sync_spec_back(spec_dir, &self.spec_dir)?;

            let after = ImplementationPlan::load(spec_dir)
                .map(|p| p.chunk_counts().0)
                .unwrap_or(completed);
            if after > completed {
                stalled = 0;
            } else {
                stalled += 1;
            }
        }
        Ok(sessions)
    }
}
