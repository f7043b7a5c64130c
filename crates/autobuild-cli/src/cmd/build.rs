use crate::agent::ClaudeRunner;
use crate::cmd::{block_on, spec_name};
use crate::exit::{self, BuildExit};
use crate::output::{print_json, progress, read_block};
use anyhow::Context;
use autobuild_core::build::{
    write_human_input, BuildOptions, BuildOutcome, BuildRun, BuildRunner, WorkspaceMode,
};
use autobuild_core::config::Config;
use autobuild_core::paths;
use autobuild_core::qa::QaOutcome;
use clap::Args;
use std::path::Path;

#[derive(Args)]
pub struct BuildArgs {
    /// Spec name, number or path
    pub spec: String,

    /// Build in the project checkout instead of an isolated worktree
    #[arg(long)]
    pub direct: bool,

    /// Stop after this many coder sessions
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Skip the QA loop after the last chunk
    #[arg(long)]
    pub skip_qa: bool,

    /// Build even if the spec is not approved
    #[arg(long)]
    pub force: bool,

    /// Model override
    #[arg(long)]
    pub model: Option<String>,
}

pub fn run(root: &Path, args: BuildArgs, json: bool) -> anyhow::Result<()> {
    let spec_dir = paths::resolve_spec(root, &args.spec)?;
    let name = spec_name(&spec_dir);
    let config = Config::load(root).context("failed to load config")?;
    let options = BuildOptions {
        workspace: if args.direct {
            WorkspaceMode::Direct
        } else {
            WorkspaceMode::Isolated
        },
        max_iterations: args.max_iterations,
        skip_qa: args.skip_qa,
        force: args.force,
        model: args.model,
    };
    let agent = ClaudeRunner::shared(&config.agent);
    let runner = BuildRunner::new(root, &spec_dir, agent, config, options);

    let run = block_on(async {
        tokio::select! {
            run = runner.run() => Some(run),
            _ = tokio::signal::ctrl_c() => None,
        }
    })?;
    let Some(run) = run else {
        runner.pause().context("failed to record paused state")?;
        let guidance = read_block(
            "\nBuild paused. Type guidance for the next session (empty line to skip):",
        )?;
        if !guidance.trim().is_empty() {
            let path = write_human_input(&spec_dir, &guidance)?;
            eprintln!("Saved to {}", path.display());
        }
        return Err(BuildExit::new(
            exit::PAUSED,
            format!("Paused. Resume with: autobuild build {name}"),
        )
        .into());
    };
    let run = run.context("build failed")?;

    if json {
        print_json(&run_json(&name, &run))?;
    }
    report(&name, run, json)
}

fn report(name: &str, run: BuildRun, json: bool) -> anyhow::Result<()> {
    match run.outcome {
        BuildOutcome::ReviewRequired { stale } => {
            let why = if stale {
                "the spec changed after it was approved"
            } else {
                "the spec is not approved"
            };
            Err(BuildExit::new(
                exit::REVIEW_REQUIRED,
                format!(
                    "Build blocked: {why}.\n  autobuild review {name}\n  autobuild review {name} approve\nor pass --force to build anyway"
                ),
            )
            .into())
        }
        BuildOutcome::Incomplete { completed, total } => Err(BuildExit::new(
            exit::PAUSED,
            format!(
                "Stopped with {} chunks done after {} sessions. Resume with: autobuild build {name}",
                progress(completed, total),
                run.sessions
            ),
        )
        .into()),
        BuildOutcome::Complete { qa: Some(qa) } if !qa.is_approved() => {
            let mut message = format!("QA {} after {} iterations.", qa.state, qa.iterations);
            if let Some(path) = &qa.escalation {
                message.push_str(&format!("\n  See {}", path.display()));
            }
            if let Some(path) = &qa.manual_test_plan {
                message.push_str(&format!("\n  Manual test plan: {}", path.display()));
            }
            message.push_str(&format!("\n  Re-run QA with: autobuild qa run {name}"));
            Err(BuildExit::new(exit::QA_INCOMPLETE, message).into())
        }
        BuildOutcome::Complete { qa } => {
            if json {
                return Ok(());
            }
            match &qa {
                Some(qa) => println!("Build complete. QA approved after {} iterations.", qa.iterations),
                None => println!("Build complete. QA skipped."),
            }
            if let Some(path) = qa.as_ref().and_then(|q| q.manual_test_plan.as_ref()) {
                println!("Manual test plan: {}", path.display());
            }
            if run.worktree.is_some() {
                println!("\nNext:");
                println!("  autobuild workspace review {name}");
                println!("  autobuild workspace merge {name}");
                println!("  autobuild workspace discard {name}");
            }
            Ok(())
        }
    }
}

fn run_json(name: &str, run: &BuildRun) -> serde_json::Value {
    let outcome = match &run.outcome {
        BuildOutcome::ReviewRequired { stale } => {
            serde_json::json!({ "status": "review_required", "stale": stale })
        }
        BuildOutcome::Incomplete { completed, total } => {
            serde_json::json!({ "status": "incomplete", "completed": completed, "total": total })
        }
        BuildOutcome::Complete { qa } => {
            serde_json::json!({ "status": "complete", "qa": qa.as_ref().map(qa_json) })
        }
    };
    serde_json::json!({
        "spec": name,
        "work_dir": run.work_dir,
        "worktree": run.worktree,
        "sessions": run.sessions,
        "outcome": outcome,
    })
}

pub(crate) fn qa_json(qa: &QaOutcome) -> serde_json::Value {
    serde_json::json!({
        "state": qa.state.as_str(),
        "iterations": qa.iterations,
        "recurring": qa.recurring,
        "manual_test_plan": qa.manual_test_plan,
        "escalation": qa.escalation,
    })
}
