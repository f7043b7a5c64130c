pub mod agent;
pub mod artifacts;
pub mod build;
pub mod complexity;
pub mod config;
pub mod error;
pub mod followup;
pub mod git;
pub mod io;
pub mod knowledge;
pub mod logger;
pub mod paths;
pub mod phases;
pub mod pipeline;
pub mod plan;
pub mod prompts;
pub mod qa;
pub mod requirements;
pub mod review;
pub mod script;
pub mod secret_scan;
pub mod spec_validator;
pub mod specs;
pub mod status;
pub mod validator;
pub mod worktree;

pub use error::{AutobuildError, Result};
