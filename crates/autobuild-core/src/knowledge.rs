//! Historical hints from an external knowledge graph.
//!
//! The graph itself is out of process. A [`HintProvider`] answers one
//! query for one hint kind; [`gather_hints`] fans out over every kind
//! concurrently and merges the answers in kind order.

use crate::error::{AutobuildError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

pub const HINT_KINDS: &[&str] = &["patterns", "gotchas", "outcomes"];

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(60);

#[async_trait]
pub trait HintProvider: Send + Sync {
    async fn hints(&self, query: &str, kind: &str) -> Result<Vec<Value>>;
}

/// Query every kind concurrently. Results keep `kinds` order and each hint
/// is tagged with its kind. The first failure fails the whole gather.
pub async fn gather_hints(
    provider: &dyn HintProvider,
    query: &str,
    kinds: &[&str],
) -> Result<Vec<Value>> {
    let results =
        futures::future::join_all(kinds.iter().map(|kind| provider.hints(query, kind))).await;
    let mut merged = Vec::new();
    for (kind, result) in kinds.iter().zip(results) {
        for mut hint in result? {
            if let Some(obj) = hint.as_object_mut() {
                obj.entry("kind").or_insert_with(|| Value::from(*kind));
            }
            merged.push(hint);
        }
    }
    Ok(merged)
}

/// Runs a configured command (`<cmd> --query <q> --kind <k>`) that prints a
/// JSON array of hints on stdout.
pub struct CommandHintProvider {
    program: String,
    args: Vec<String>,
    cwd: PathBuf,
}

impl CommandHintProvider {
    pub fn new(command_line: &str, cwd: impl Into<PathBuf>) -> Result<Self> {
        let mut parts = shlex::split(command_line)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                AutobuildError::ScriptSpawnFailed(format!("invalid hint command: {command_line}"))
            })?;
        let program = parts.remove(0);
        Ok(Self {
            program,
            args: parts,
            cwd: cwd.into(),
        })
    }
}

#[async_trait]
impl HintProvider for CommandHintProvider {
    async fn hints(&self, query: &str, kind: &str) -> Result<Vec<Value>> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .args(["--query", query, "--kind", kind])
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AutobuildError::ScriptSpawnFailed(format!("{}: {e}", self.program)))?;
        let out = tokio::time::timeout(PROVIDER_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| AutobuildError::ScriptSpawnFailed(format!("{} timed out", self.program)))??;
        if !out.status.success() {
            return Err(AutobuildError::ScriptSpawnFailed(
                String::from_utf8_lossy(&out.stderr).trim().to_string(),
            ));
        }
        let stdout = String::from_utf8_lossy(&out.stdout);
        if stdout.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str::<Value>(&stdout)? {
            Value::Array(items) => Ok(items),
            other => Ok(vec![other]),
        }
    }
}
