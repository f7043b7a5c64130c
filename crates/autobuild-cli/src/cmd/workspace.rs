use crate::cmd::spec_name;
use crate::output::{print_json, print_table};
use anyhow::Context;
use autobuild_core::paths;
use autobuild_core::worktree::WorktreeManager;
use clap::Subcommand;
use std::io::Write;
use std::path::Path;

#[derive(Subcommand)]
pub enum WorkspaceSubcommand {
    /// Merge a spec's build branch into the current branch
    Merge {
        /// Spec name, number or path
        spec: String,

        /// Stage the merge without committing; the branch is kept
        #[arg(long)]
        no_commit: bool,
    },

    /// Show what a spec's build changed
    Review {
        /// Spec name, number or path
        spec: String,
    },

    /// Delete a spec's worktree and branch without merging
    Discard {
        /// Spec name, number or path
        spec: String,

        /// Do not ask for confirmation
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// List build worktrees
    List,

    /// Discard every build worktree
    Cleanup {
        /// Do not ask for confirmation
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

pub fn run(root: &Path, subcmd: WorkspaceSubcommand, json: bool) -> anyhow::Result<()> {
    let manager = WorktreeManager::new(root);
    match subcmd {
        WorkspaceSubcommand::List => list(&manager, json),
        WorkspaceSubcommand::Review { spec } => {
            let name = worktree_name(root, &spec);
            let review = manager.review(&name)?;
            if json {
                return print_json(&review);
            }
            println!("Branch: {} (from {})", review.info.branch, review.info.base_branch);
            println!("Path:   {}", review.info.path.display());
            println!("Commits: {}", review.info.commit_count);
            println!("\nChanged files ({}):", review.changed_files.len());
            for file in &review.changed_files {
                println!("  {file}");
            }
            if !review.diff_stat.trim().is_empty() {
                println!("\n{}", review.diff_stat.trim_end());
            }
            Ok(())
        }
        WorkspaceSubcommand::Merge { spec, no_commit } => {
            let name = worktree_name(root, &spec);
            let info = manager
                .merge(&name, no_commit)
                .with_context(|| format!("failed to merge '{name}'"))?;
            if json {
                return print_json(&serde_json::json!({
                    "spec": name,
                    "branch": info.branch,
                    "merged_into": info.base_branch,
                    "committed": !no_commit,
                }));
            }
            if no_commit {
                println!("Merged {} into {} (staged, not committed).", info.branch, info.base_branch);
                println!("Review with `git diff --cached`, then commit.");
            } else {
                println!("Merged {} into {}.", info.branch, info.base_branch);
            }
            Ok(())
        }
        WorkspaceSubcommand::Discard { spec, yes } => {
            let name = worktree_name(root, &spec);
            if !yes && !confirm(&format!("Discard all build changes for '{name}'?"))? {
                println!("Cancelled.");
                return Ok(());
            }
            manager.discard(&name)?;
            if json {
                return print_json(&serde_json::json!({ "spec": name, "discarded": true }));
            }
            println!("Discarded the worktree for {name}.");
            Ok(())
        }
        WorkspaceSubcommand::Cleanup { yes } => {
            if manager.list().is_empty() {
                if json {
                    return print_json(&serde_json::json!({ "removed": [] }));
                }
                println!("No worktrees.");
                return Ok(());
            }
            if !yes && !confirm("Discard every build worktree?")? {
                println!("Cancelled.");
                return Ok(());
            }
            let removed = manager.cleanup_all()?;
            if json {
                return print_json(&serde_json::json!({ "removed": removed }));
            }
            for name in &removed {
                println!("Removed {name}");
            }
            Ok(())
        }
    }
}

fn list(manager: &WorktreeManager, json: bool) -> anyhow::Result<()> {
    let worktrees = manager.list();
    if json {
        return print_json(&worktrees);
    }
    if worktrees.is_empty() {
        println!("No worktrees.");
        return Ok(());
    }
    let rows = worktrees
        .iter()
        .map(|w| {
            vec![
                w.spec_name.clone(),
                w.branch.clone(),
                w.commit_count.to_string(),
                w.files_changed.to_string(),
            ]
        })
        .collect();
    print_table(&["SPEC", "BRANCH", "COMMITS", "FILES"], rows);
    Ok(())
}

/// Worktrees are named after the spec; the raw reference is used when the
/// spec directory itself is gone.
fn worktree_name(root: &Path, reference: &str) -> String {
    paths::resolve_spec(root, reference)
        .map(|dir| spec_name(&dir))
        .unwrap_or_else(|_| reference.to_string())
}

fn confirm(question: &str) -> anyhow::Result<bool> {
    eprint!("{question} [y/N] ");
    std::io::stderr().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
