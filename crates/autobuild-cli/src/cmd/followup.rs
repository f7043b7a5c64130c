use crate::agent::ClaudeRunner;
use crate::cmd::{block_on, spec_name};
use crate::output::{print_json, read_block};
use anyhow::Context;
use autobuild_core::config::Config;
use autobuild_core::followup::{check_ready, run_followup_planner, write_followup_request};
use autobuild_core::logger::JsonTaskLogger;
use autobuild_core::paths;
use clap::Args;
use std::path::{Path, PathBuf};

#[derive(Args)]
pub struct FollowupArgs {
    /// Spec name, number or path
    pub spec: String,

    /// What to add (omit to type it on stdin)
    pub text: Option<String>,

    /// Read the request from a file
    #[arg(long, conflicts_with = "text")]
    pub file: Option<PathBuf>,

    /// Model override
    #[arg(long)]
    pub model: Option<String>,
}

pub fn run(root: &Path, args: FollowupArgs, json: bool) -> anyhow::Result<()> {
    let spec_dir = paths::resolve_spec(root, &args.spec)?;
    let name = spec_name(&spec_dir);
    check_ready(&spec_dir).context("follow-up needs a completed build")?;

    let text = match (args.text, args.file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        (None, None) => read_block("Describe the follow-up work (empty line to finish):")?,
    };
    if text.trim().is_empty() {
        anyhow::bail!("follow-up request is empty");
    }
    write_followup_request(&spec_dir, &text)?;

    let config = Config::load(root).context("failed to load config")?;
    let agent = ClaudeRunner::shared(&config.agent);
    let logger = JsonTaskLogger::shared(&spec_dir);
    let result = block_on(run_followup_planner(
        root,
        &spec_dir,
        agent,
        logger,
        &config,
        args.model,
    ))?
    .context("follow-up planning failed")?;

    if json {
        print_json(&serde_json::json!({
            "spec": name,
            "planned": result.planned,
            "new_chunks": result.new_chunks,
            "followup_number": result.followup_number,
        }))?;
    }
    if !result.planned {
        anyhow::bail!("follow-up {} added no chunks to the plan", result.followup_number);
    }
    if !json {
        println!(
            "Follow-up {} planned with {} new chunks.",
            result.followup_number, result.new_chunks
        );
        println!("\nReview the new chunks, then build:");
        println!("  autobuild review {name}");
        println!("  autobuild review {name} approve");
        println!("  autobuild build {name}");
    }
    Ok(())
}
