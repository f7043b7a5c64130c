use crate::agent::ClaudeRunner;
use crate::cmd::build::qa_json;
use crate::cmd::{block_on, spec_name};
use crate::exit::{self, BuildExit};
use crate::output::{print_json, print_table};
use anyhow::Context;
use autobuild_core::build::{check_approval, ApprovalCheck};
use autobuild_core::config::Config;
use autobuild_core::logger::JsonTaskLogger;
use autobuild_core::paths;
use autobuild_core::plan::ImplementationPlan;
use autobuild_core::prompts::PromptLibrary;
use autobuild_core::qa::{iteration_history, recurring_issue_summary, QaLoop};
use autobuild_core::review::ReviewState;
use autobuild_core::worktree::{sync_spec_back, WorktreeManager};
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum QaSubcommand {
    /// Run the QA review/fix loop on a completed build
    Run {
        /// Spec name, number or path
        spec: String,

        /// Model override
        #[arg(long)]
        model: Option<String>,
    },

    /// Show the QA verdict and iteration history
    Status {
        /// Spec name, number or path
        spec: String,
    },
}

pub fn run(root: &Path, subcmd: QaSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        QaSubcommand::Run { spec, model } => run_qa(root, &spec, model, json),
        QaSubcommand::Status { spec } => status(root, &spec, json),
    }
}

fn run_qa(root: &Path, reference: &str, model: Option<String>, json: bool) -> anyhow::Result<()> {
    let spec_dir = paths::resolve_spec(root, reference)?;
    let name = spec_name(&spec_dir);
    let config = Config::load(root).context("failed to load config")?;
    let approved = check_approval(&spec_dir, false) == ApprovalCheck::Valid;

    // QA runs where the build ran: the worktree when one exists.
    let manager = WorktreeManager::new(root);
    let (work_dir, local_spec_dir) = match manager.get(&name) {
        Some(info) => {
            let local = manager.localize_spec(&name, &spec_dir)?;
            (info.path, local)
        }
        None => (root.to_path_buf(), spec_dir.clone()),
    };

    let agent = ClaudeRunner::shared(&config.agent);
    let logger = JsonTaskLogger::shared(&local_spec_dir);
    let prompts = PromptLibrary::new(Config::resolve(root, &config.pipeline.prompts_dir));
    let qa = QaLoop::new(&work_dir, &local_spec_dir, agent, logger, &config)
        .with_prompts(prompts)
        .with_model(model);

    let outcome = block_on(async {
        tokio::select! {
            outcome = qa.run() => Some(outcome),
            _ = tokio::signal::ctrl_c() => None,
        }
    })?;
    sync_spec_back(&local_spec_dir, &spec_dir)?;
    let Some(outcome) = outcome else {
        return Err(BuildExit::new(
            exit::PAUSED,
            format!("Interrupted. Re-run with: autobuild qa run {name}"),
        )
        .into());
    };
    let outcome = outcome.context("QA failed")?;
    if approved {
        ReviewState::load(&spec_dir).restamp(&spec_dir, true)?;
    }

    if json {
        print_json(&qa_json(&outcome))?;
    }
    if outcome.is_approved() {
        if !json {
            println!("QA approved after {} iterations.", outcome.iterations);
        }
        return Ok(());
    }

    let mut message = format!("QA {} after {} iterations.", outcome.state, outcome.iterations);
    for recurring in &outcome.recurring {
        message.push_str(&format!(
            "\n  recurring ({}x): {}",
            recurring.occurrence_count, recurring.issue.title
        ));
    }
    if let Some(path) = &outcome.escalation {
        message.push_str(&format!("\n  See {}", path.display()));
    }
    Err(BuildExit::new(exit::QA_INCOMPLETE, message).into())
}

fn status(root: &Path, reference: &str, json: bool) -> anyhow::Result<()> {
    let spec_dir = paths::resolve_spec(root, reference)?;
    let config = Config::load(root).context("failed to load config")?;
    let plan = ImplementationPlan::load(&spec_dir);
    let history = iteration_history(&spec_dir);
    let summary = recurring_issue_summary(&history, config.qa.similarity_threshold);
    let signoff = plan.as_ref().and_then(|p| p.qa_signoff.clone());

    if json {
        return print_json(&serde_json::json!({
            "spec": spec_name(&spec_dir),
            "qa_signoff": signoff,
            "history": history,
            "summary": summary,
        }));
    }

    match &signoff {
        Some(s) if !s.status.is_empty() => {
            println!("QA: {} (session {})", s.status, s.qa_session);
            for issue in &s.issues_found {
                match &issue.file {
                    Some(file) => println!("  - {} ({file})", issue.title),
                    None => println!("  - {}", issue.title),
                }
            }
        }
        _ => println!("QA: not run"),
    }
    if history.is_empty() {
        return Ok(());
    }

    println!();
    let rows = history
        .iter()
        .map(|r| {
            vec![
                r.iteration.to_string(),
                r.status.to_string(),
                r.issues.len().to_string(),
                r.duration_seconds.map(|d| format!("{d:.1}s")).unwrap_or_default(),
                r.timestamp.clone(),
            ]
        })
        .collect();
    print_table(&["ITER", "STATUS", "ISSUES", "DURATION", "TIMESTAMP"], rows);

    println!(
        "\nIssues: {} total, {} unique. Fix success rate: {:.0}%",
        summary.total_issues,
        summary.unique_issues,
        summary.fix_success_rate * 100.0
    );
    for common in &summary.most_common {
        println!("  {}x {}", common.occurrences, common.title);
    }
    Ok(())
}
