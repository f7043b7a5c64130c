use crate::cmd::spec_name;
use crate::output::{print_json, progress};
use anyhow::Context;
use autobuild_core::paths;
use autobuild_core::plan::ImplementationPlan;
use autobuild_core::review::{
    extract_section, review_status_summary, truncate_text, ReviewChoice, ReviewState,
    ReviewSummary,
};
use clap::Subcommand;
use std::path::Path;

const PREVIEW_LINES: usize = 30;
const PREVIEW_CHARS: usize = 2000;

#[derive(Subcommand)]
pub enum ReviewAction {
    /// Show the spec summary, plan and review status (default)
    Show,

    /// Approve the spec and plan as they are now
    Approve {
        /// Reviewer name (default: $USER)
        #[arg(long)]
        by: Option<String>,
    },

    /// Reject the spec; the build stays blocked
    Reject,

    /// Record feedback without changing approval
    Feedback { text: String },

    /// Print the review status only
    Status,
}

pub fn run(root: &Path, reference: &str, action: Option<ReviewAction>, json: bool) -> anyhow::Result<()> {
    let spec_dir = paths::resolve_spec(root, reference)?;
    let name = spec_name(&spec_dir);
    let mut state = ReviewState::load(&spec_dir);

    match action.unwrap_or(ReviewAction::Show) {
        ReviewAction::Show => show(&spec_dir, &name, json),
        ReviewAction::Status => status(&spec_dir, json),
        ReviewAction::Approve { by } => {
            if !spec_dir.join(paths::SPEC_MD).exists() {
                anyhow::bail!("{name} has no spec.md yet; finish `autobuild spec create --spec {name}` first");
            }
            let by = by
                .or_else(|| std::env::var("USER").ok())
                .unwrap_or_else(|| "user".to_string());
            state.approve(&spec_dir, &by, true).context("failed to save review state")?;
            tracing::info!(spec = %name, approved_by = %by, "spec approved");
            if json {
                return status(&spec_dir, true);
            }
            println!("Approved {name}. Next: autobuild build {name}");
            Ok(())
        }
        ReviewAction::Reject => {
            state.reject(&spec_dir, true).context("failed to save review state")?;
            if json {
                return status(&spec_dir, true);
            }
            println!("Rejected {name}. Edit the spec and review again.");
            Ok(())
        }
        ReviewAction::Feedback { text } => {
            state
                .add_feedback(&text, &spec_dir, true)
                .context("failed to save review state")?;
            if json {
                return status(&spec_dir, true);
            }
            println!("Feedback recorded ({} total).", state.feedback.len());
            Ok(())
        }
    }
}

fn status(spec_dir: &Path, json: bool) -> anyhow::Result<()> {
    let summary = review_status_summary(spec_dir);
    if json {
        return print_json(&summary);
    }
    print_status(&summary);
    Ok(())
}

fn print_status(s: &ReviewSummary) {
    let label = match (s.approved, s.valid) {
        (true, true) => "approved",
        (true, false) => "approved, but the spec changed since (re-approval required)",
        _ => "not approved",
    };
    println!("Status: {label}");
    if s.approved {
        println!("Approved by: {} at {}", s.approved_by, s.approved_at);
    }
    println!("Reviews: {}  Feedback: {}", s.review_count, s.feedback_count);
}

fn show(spec_dir: &Path, name: &str, json: bool) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(spec_dir.join(paths::SPEC_MD)).unwrap_or_default();
    let plan = ImplementationPlan::load(spec_dir);

    if json {
        return print_json(&serde_json::json!({
            "spec": name,
            "overview": extract_section(&content, "## Overview"),
            "plan": plan,
            "review": review_status_summary(spec_dir),
            "choices": ReviewChoice::ALL.iter().map(|c| c.as_str()).collect::<Vec<_>>(),
        }));
    }

    println!("# {name}\n");
    if content.is_empty() {
        println!("(no spec.md yet)");
    } else {
        let overview = extract_section(&content, "## Overview");
        let preview = if overview.is_empty() { content.as_str() } else { overview.as_str() };
        println!("{}\n", truncate_text(preview, PREVIEW_LINES, PREVIEW_CHARS));
    }

    if let Some(plan) = &plan {
        let (completed, total) = plan.chunk_counts();
        println!("## Plan ({} chunks done)", progress(completed, total));
        for phase in &plan.phases {
            println!("- {} ({} chunks)", phase.name, phase.chunks.len());
            for chunk in &phase.chunks {
                println!("    [{}] {} {}", chunk.status, chunk.id, chunk.description);
            }
        }
        println!();
    }

    print_status(&review_status_summary(spec_dir));
    println!();
    for choice in ReviewChoice::ALL {
        println!("  {:<26} {}", choice.label(), hint(choice, name));
    }
    Ok(())
}

fn hint(choice: ReviewChoice, name: &str) -> String {
    match choice {
        ReviewChoice::Approve => format!("autobuild review {name} approve"),
        ReviewChoice::EditSpec => format!("$EDITOR .auto-claude/specs/{name}/{}", paths::SPEC_MD),
        ReviewChoice::EditPlan => format!("$EDITOR .auto-claude/specs/{name}/{}", paths::PLAN_JSON),
        ReviewChoice::Feedback => format!("autobuild review {name} feedback \"...\""),
        ReviewChoice::Reject => format!("autobuild review {name} reject"),
    }
}
