use crate::agent::ClaudeRunner;
use crate::cmd::{block_on, spec_name};
use crate::exit::{self, BuildExit};
use crate::output::{print_json, print_table, progress};
use crate::prompter::StdinPrompter;
use anyhow::Context;
use autobuild_core::complexity::Complexity;
use autobuild_core::config::Config;
use autobuild_core::pipeline::{SpecOptions, SpecOrchestrator, SpecOutcome};
use autobuild_core::requirements::RequirementsPrompter;
use autobuild_core::specs;
use clap::Subcommand;
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum SpecSubcommand {
    /// Run the spec pipeline: requirements, complexity, spec, plan, validation
    Create {
        /// What to build (omit to answer questions interactively)
        task: Option<String>,

        /// Read the task description from a file
        #[arg(long, conflicts_with = "task")]
        task_file: Option<PathBuf>,

        /// Continue an existing spec directory instead of starting a new one
        #[arg(long)]
        spec: Option<String>,

        /// Skip assessment: simple, standard or complex
        #[arg(long)]
        complexity: Option<String>,

        /// Model override
        #[arg(long)]
        model: Option<String>,

        /// Approve the spec without human review
        #[arg(long)]
        auto_approve: bool,
    },

    /// List specs with review, build and QA status
    List,
}

pub fn run(root: &Path, subcmd: SpecSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        SpecSubcommand::Create {
            task,
            task_file,
            spec,
            complexity,
            model,
            auto_approve,
        } => {
            let task = match task_file {
                Some(path) => Some(
                    std::fs::read_to_string(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?,
                ),
                None => task,
            };
            let complexity_override = complexity
                .map(|c| c.parse::<Complexity>())
                .transpose()
                .context("invalid --complexity")?;
            let options = SpecOptions {
                task_description: task,
                spec_name: spec,
                complexity_override,
                model,
                auto_approve,
            };
            create(root, options, json)
        }
        SpecSubcommand::List => list(root, json),
    }
}

fn create(root: &Path, options: SpecOptions, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let interactive = options.task_description.is_none() && options.spec_name.is_none();
    let agent = ClaudeRunner::shared(&config.agent);

    let mut orchestrator = SpecOrchestrator::new(root, options, config, agent)
        .context("failed to prepare spec directory")?;
    if interactive {
        // Asked before the interrupt handler below exists, so Ctrl-C here ends
        // the process at once. The requirements phase then reuses the file.
        let Some(requirements) = StdinPrompter.gather().context("failed to read requirements")?
        else {
            anyhow::bail!("User cancelled");
        };
        requirements
            .save(orchestrator.spec_dir())
            .context("failed to save requirements")?;
    }
    let started_in = orchestrator.spec_dir().to_path_buf();

    let run = block_on(async {
        tokio::select! {
            run = orchestrator.run() => Some(run),
            _ = tokio::signal::ctrl_c() => None,
        }
    })?;
    let Some(run) = run else {
        return Err(BuildExit::new(
            exit::PAUSED,
            format!(
                "Interrupted. Resume with: autobuild spec create --spec {}",
                spec_name(&started_in)
            ),
        )
        .into());
    };
    let run = run.context("spec pipeline failed")?;
    let name = spec_name(&run.spec_dir);

    if json {
        print_json(&serde_json::json!({
            "spec": name,
            "path": run.spec_dir,
            "complexity": run.complexity.map(|c| c.as_str()),
            "files": run.files_created(),
            "outcome": match &run.outcome {
                SpecOutcome::Approved { .. } => "approved",
                SpecOutcome::AwaitingReview { .. } => "awaiting_review",
                SpecOutcome::Failed { .. } => "failed",
            },
        }))?;
    } else {
        println!("Spec: {name}");
        if let Some(c) = run.complexity {
            println!("Complexity: {c}");
        }
        for file in run.files_created() {
            println!("  {file}");
        }
    }

    match run.outcome {
        SpecOutcome::Approved { auto } => {
            if !json {
                let how = if auto { " (auto)" } else { "" };
                println!("\nApproved{how}. Next: autobuild build {name}");
            }
            Ok(())
        }
        SpecOutcome::AwaitingReview { stale } => {
            if !json {
                if stale {
                    println!("\nThe spec changed after it was approved; approval was reset.");
                }
                println!("\nReview the spec before building:");
                println!("  autobuild review {name}");
                println!("  autobuild review {name} approve");
            }
            Ok(())
        }
        SpecOutcome::Failed { phase, errors } => {
            anyhow::bail!(
                "phase '{phase}' failed: {}\nResume with: autobuild spec create --spec {name}",
                errors.join("; ")
            )
        }
    }
}

fn list(root: &Path, json: bool) -> anyhow::Result<()> {
    let specs = specs::list_specs(root).context("failed to list specs")?;
    if json {
        return print_json(&specs);
    }
    if specs.is_empty() {
        println!("No specs. Create one with: autobuild spec create \"<task>\"");
        return Ok(());
    }
    let rows = specs
        .iter()
        .map(|s| {
            vec![
                s.name.clone(),
                s.review_label().to_string(),
                progress(s.chunks_completed, s.chunks_total),
                s.qa_status.clone().unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();
    print_table(&["SPEC", "REVIEW", "CHUNKS", "QA"], rows);
    Ok(())
}
