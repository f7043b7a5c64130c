pub mod build;
pub mod check;
pub mod config;
pub mod followup;
pub mod qa;
pub mod review;
pub mod spec;
pub mod workspace;

use anyhow::Context;
use std::future::Future;

/// Drive an async engine call from a synchronous command.
pub(crate) fn block_on<F: Future>(future: F) -> anyhow::Result<F::Output> {
    let rt = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    Ok(rt.block_on(future))
}

pub(crate) fn spec_name(spec_dir: &std::path::Path) -> String {
    spec_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
