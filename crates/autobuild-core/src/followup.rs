//! Follow-up planning: extend a finished build with new chunks.

use crate::agent::{run_session, AgentRequest, SharedAgent};
use crate::config::Config;
use crate::error::{AutobuildError, Result};
use crate::logger::{LogEntryKind, LogPhase, SharedLogger};
use crate::plan::ImplementationPlan;
use crate::prompts::{self, PromptLibrary};
use crate::{io, paths};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowupResult {
    /// The planner added chunks and left completed work alone.
    pub planned: bool,
    pub new_chunks: usize,
    /// 1 for the first follow-up on this spec.
    pub followup_number: usize,
}

/// The plan, provided the build it describes is finished.
pub fn check_ready(spec_dir: &Path) -> Result<ImplementationPlan> {
    let plan = ImplementationPlan::load(spec_dir)
        .ok_or_else(|| AutobuildError::PlanNotFound(spec_dir.join(paths::PLAN_JSON)))?;
    if !plan.is_build_complete() {
        let (completed, total) = plan.chunk_counts();
        return Err(AutobuildError::BuildIncomplete { completed, total });
    }
    Ok(plan)
}

/// Phases an earlier follow-up appended, recognised by name.
pub fn prior_followups(plan: &ImplementationPlan) -> usize {
    plan.phases
        .iter()
        .filter(|p| p.name.to_lowercase().contains("follow"))
        .count()
}

pub fn write_followup_request(spec_dir: &Path, text: &str) -> Result<PathBuf> {
    let path = spec_dir.join(paths::FOLLOWUP_REQUEST_MD);
    io::atomic_write(&path, format!("{}\n", text.trim()).as_bytes())?;
    Ok(path)
}

/// Run the follow-up planner against `FOLLOWUP_REQUEST.md`. On success the
/// QA verdict is cleared so the next build re-validates everything.
pub async fn run_followup_planner(
    project_dir: &Path,
    spec_dir: &Path,
    agent: SharedAgent,
    logger: SharedLogger,
    config: &Config,
    model: Option<String>,
) -> Result<FollowupResult> {
    let before = check_ready(spec_dir)?;
    let (completed_before, total_before) = before.chunk_counts();
    let followup_number = prior_followups(&before) + 1;

    let request_path = spec_dir.join(paths::FOLLOWUP_REQUEST_MD);
    let request = std::fs::read_to_string(&request_path)
        .map_err(|_| AutobuildError::MissingArtifact {
            artifact: paths::FOLLOWUP_REQUEST_MD.to_string(),
            phase: "followup".to_string(),
        })?;

    logger.start_phase(LogPhase::Planning, &format!("Planning follow-up {followup_number}"));
    let library = PromptLibrary::new(Config::resolve(project_dir, &config.pipeline.prompts_dir));
    let context = format!(
        "**Follow-up Number**: {followup_number}\n**Completed Chunks**: {completed_before}/{total_before}\n**Next Phase Number**: {}\n\n## Follow-up Request\n\n{}\n",
        before.max_phase_number() + 1,
        request.trim()
    );
    let prompt = library.compose(prompts::FOLLOWUP_PLANNER, spec_dir, project_dir, &context)?;
    let model = model.or_else(|| Some(config.agent.model.clone()));
    let request = AgentRequest::new(prompt, project_dir, spec_dir).with_model(model);
    if let Err(e) = run_session(agent.as_ref(), request, logger.as_ref(), LogPhase::Planning).await {
        tracing::warn!(error = %e, "follow-up planner failed");
    }

    let Some(mut after) = ImplementationPlan::load(spec_dir) else {
        logger.end_phase(LogPhase::Planning, false, "Follow-up planner left no readable plan");
        return Ok(FollowupResult {
            planned: false,
            new_chunks: 0,
            followup_number,
        });
    };
    let (completed_after, total_after) = after.chunk_counts();
    let new_chunks = total_after.saturating_sub(total_before);
    if completed_after < completed_before {
        logger.log(
            LogPhase::Planning,
            LogEntryKind::Error,
            &format!("Completed chunks dropped from {completed_before} to {completed_after}"),
        );
    }
    let planned = new_chunks > 0 && completed_after >= completed_before;
    if !planned {
        logger.end_phase(LogPhase::Planning, false, "Follow-up planner added no chunks");
        return Ok(FollowupResult {
            planned,
            new_chunks,
            followup_number,
        });
    }

    after.reset_qa();
    after.save(spec_dir)?;
    logger.end_phase(
        LogPhase::Planning,
        true,
        &format!("Follow-up {followup_number} planned with {new_chunks} new chunks"),
    );
    tracing::info!(spec = %spec_dir.display(), new_chunks, "follow-up planned");
    Ok(FollowupResult {
        planned,
        new_chunks,
        followup_number,
    })
}
