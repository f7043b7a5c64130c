mod agent;
mod cmd;
mod exit;
mod output;
mod prompter;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    build::BuildArgs, config::ConfigSubcommand, followup::FollowupArgs, qa::QaSubcommand,
    review::ReviewAction, spec::SpecSubcommand, workspace::WorkspaceSubcommand,
};
use exit::BuildExit;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "autobuild",
    about = "Turn a task description into a reviewed spec, build it with an AI agent, and QA the result",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .auto-claude/ or .git/)
    #[arg(long, global = true, env = "AUTOBUILD_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Debug logging
    #[arg(long, global = true, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create and list specs
    Spec {
        #[command(subcommand)]
        subcommand: SpecSubcommand,
    },

    /// Review, approve or reject a spec before it is built
    Review {
        /// Spec name, number or unique prefix
        spec: String,

        #[command(subcommand)]
        action: Option<ReviewAction>,
    },

    /// Build an approved spec, then run QA
    Build(BuildArgs),

    /// Run or inspect the QA loop
    Qa {
        #[command(subcommand)]
        subcommand: QaSubcommand,
    },

    /// Plan follow-up work on a finished build
    Followup(FollowupArgs),

    /// Manage isolated build worktrees
    Workspace {
        #[command(subcommand)]
        subcommand: WorkspaceSubcommand,
    },

    /// Check whether a shell command is allowed for agents
    Check {
        /// Command line to check
        command: Option<String>,

        /// Read a pre-tool-use hook payload from stdin
        #[arg(long, conflicts_with = "command")]
        hook: bool,
    },

    /// Show or validate `.auto-claude/config.yaml`
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        match &cli.command {
            Commands::Spec { .. } | Commands::Build(_) | Commands::Qa { .. } | Commands::Followup(_) => {
                tracing::Level::INFO
            }
            _ => tracing::Level::WARN,
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Spec { subcommand } => cmd::spec::run(&root, subcommand, cli.json),
        Commands::Review { spec, action } => cmd::review::run(&root, &spec, action, cli.json),
        Commands::Build(args) => cmd::build::run(&root, args, cli.json),
        Commands::Qa { subcommand } => cmd::qa::run(&root, subcommand, cli.json),
        Commands::Followup(args) => cmd::followup::run(&root, args, cli.json),
        Commands::Workspace { subcommand } => cmd::workspace::run(&root, subcommand, cli.json),
        Commands::Check { command, hook } => cmd::check::run(&root, command, hook, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        if let Some(exit) = e.downcast_ref::<BuildExit>() {
            if !exit.message.is_empty() {
                eprintln!("{}", exit.message);
            }
            std::process::exit(exit.code);
        }
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
