//! Agent runtime seam.
//!
//! The engine never talks to a concrete LLM client. It sends an
//! [`AgentRequest`] to an [`AgentRunner`] and consumes a stream of
//! [`AgentEvent`]s; the CLI supplies the runner backed by the `claude`
//! subprocess and tests supply scripted fakes.

use crate::error::Result;
use crate::logger::{summarize_tool_input, LogEntryKind, LogPhase, TaskLogger};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;

/// One observable step of an agent session.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    Text(String),
    ToolCall {
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        ok: bool,
        content: String,
    },
}

#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub prompt: String,
    /// Working directory the agent operates in (project root or worktree).
    pub cwd: PathBuf,
    pub spec_dir: PathBuf,
    pub model: Option<String>,
    pub max_turns: Option<u32>,
}

impl AgentRequest {
    pub fn new(prompt: impl Into<String>, cwd: impl Into<PathBuf>, spec_dir: impl Into<PathBuf>) -> Self {
        Self {
            prompt: prompt.into(),
            cwd: cwd.into(),
            spec_dir: spec_dir.into(),
            model: None,
            max_turns: None,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }
}

pub type EventStream = BoxStream<'static, Result<AgentEvent>>;

#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Start a session. Errors here mean the session never started; errors
    /// inside the stream mean it broke midway.
    async fn query(&self, request: AgentRequest) -> Result<EventStream>;
}

pub type SharedAgent = Arc<dyn AgentRunner>;

/// Tools whose result content is worth keeping in the task log.
const DETAILED_TOOLS: &[&str] = &["Read", "Grep", "Bash", "Edit", "Write"];
const MAX_DETAIL_LEN: usize = 50_000;

/// Drive one agent session to completion, mirroring every event into the
/// task log. Returns the concatenated response text.
pub async fn run_session(
    agent: &dyn AgentRunner,
    request: AgentRequest,
    logger: &dyn TaskLogger,
    phase: LogPhase,
) -> Result<String> {
    let mut stream = match agent.query(request).await {
        Ok(s) => s,
        Err(e) => {
            logger.log(phase, LogEntryKind::Error, &format!("Agent error: {e}"));
            return Err(e);
        }
    };

    let mut response = String::new();
    let mut current_tool: Option<String> = None;
    while let Some(event) = stream.next().await {
        match event {
            Ok(AgentEvent::Text(text)) => {
                if !text.trim().is_empty() {
                    logger.log(phase, LogEntryKind::Text, &text);
                }
                response.push_str(&text);
            }
            Ok(AgentEvent::ToolCall { name, input }) => {
                let summary = summarize_tool_input(&input);
                logger.tool_start(phase, &name, summary.as_deref());
                current_tool = Some(name);
            }
            Ok(AgentEvent::ToolResult { ok, content }) => {
                if let Some(tool) = current_tool.take() {
                    let detail = (DETAILED_TOOLS.contains(&tool.as_str())
                        && content.len() < MAX_DETAIL_LEN)
                        .then_some(content.as_str());
                    logger.tool_end(phase, &tool, ok, detail);
                }
            }
            Err(e) => {
                logger.log(phase, LogEntryKind::Error, &format!("Agent error: {e}"));
                return Err(e);
            }
        }
    }
    Ok(response)
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------

/// Scripted agent for engine tests. Each query pops the next script; the
/// optional side effect runs first so a fake can write artifacts the way a
/// real agent would.
#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use crate::error::AutobuildError;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    pub type SideEffect = Box<dyn Fn(&AgentRequest) + Send + Sync>;

    pub enum Script {
        Events(Vec<AgentEvent>),
        Fail(String),
    }

    #[derive(Default)]
    pub struct FakeAgent {
        scripts: Mutex<VecDeque<(Script, Option<SideEffect>)>>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl FakeAgent {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn push(&self, script: Script, effect: Option<SideEffect>) {
            self.scripts.lock().unwrap().push_back((script, effect));
        }

        pub fn push_ok(&self, effect: impl Fn(&AgentRequest) + Send + Sync + 'static) {
            self.push(Script::Events(vec![AgentEvent::Text("done".into())]), Some(Box::new(effect)));
        }

        pub fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl AgentRunner for FakeAgent {
        async fn query(&self, request: AgentRequest) -> Result<EventStream> {
            self.prompts.lock().unwrap().push(request.prompt.clone());
            let next = self.scripts.lock().unwrap().pop_front();
            match next {
                Some((script, effect)) => {
                    if let Some(effect) = effect {
                        effect(&request);
                    }
                    match script {
                        Script::Events(events) => {
                            Ok(futures::stream::iter(events.into_iter().map(Ok)).boxed())
                        }
                        Script::Fail(msg) => Err(AutobuildError::Agent(msg)),
                    }
                }
                None => Ok(futures::stream::iter(Vec::<Result<AgentEvent>>::new()).boxed()),
            }
        }
    }
}
