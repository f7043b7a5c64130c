//! `AgentRunner` backed by the `claude` subprocess.

use async_trait::async_trait;
use autobuild_core::agent::{AgentEvent, AgentRequest, AgentRunner, EventStream, SharedAgent};
use autobuild_core::config::AgentConfig;
use autobuild_core::AutobuildError;
use claude_agent::{
    AgentOptions, ContentBlock, HookSettings, Message, PermissionMode, UserContentBlock,
};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;

pub struct ClaudeRunner {
    config: AgentConfig,
    /// Shell command installed as the Bash pre-tool-use hook.
    hook_command: Option<String>,
}

impl ClaudeRunner {
    pub fn new(config: &AgentConfig) -> Self {
        let hook_command = config.command_hook.then(hook_command).flatten();
        if config.command_hook && hook_command.is_none() {
            tracing::warn!("could not locate the autobuild binary; command hook disabled");
        }
        Self {
            config: config.clone(),
            hook_command,
        }
    }

    pub fn shared(config: &AgentConfig) -> SharedAgent {
        Arc::new(Self::new(config))
    }

    fn options(&self, request: &AgentRequest) -> AgentOptions {
        let permission_mode = self
            .config
            .permission_mode
            .parse::<PermissionMode>()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "falling back to default permission mode");
                PermissionMode::Default
            });
        AgentOptions {
            model: request.model.clone().or_else(|| Some(self.config.model.clone())),
            max_turns: request.max_turns.or(self.config.max_turns),
            allowed_tools: self.config.allowed_tools.clone(),
            permission_mode,
            cwd: Some(request.cwd.clone()),
            additional_directories: vec![request.spec_dir.clone()],
            path_to_executable: self.config.executable.as_deref().map(expand_home),
            settings: self
                .hook_command
                .as_ref()
                .map(|cmd| HookSettings::default().pre_tool_use("Bash", cmd.clone())),
            ..Default::default()
        }
    }
}

#[async_trait]
impl AgentRunner for ClaudeRunner {
    async fn query(&self, request: AgentRequest) -> autobuild_core::Result<EventStream> {
        let opts = self.options(&request);
        tracing::debug!(cwd = %request.cwd.display(), model = ?opts.model, "starting claude session");
        let stream = claude_agent::query(request.prompt, opts)
            .flat_map(|msg| futures::stream::iter(to_events(msg)));
        Ok(stream.boxed())
    }
}

/// Flatten one protocol message into engine events. System and result
/// messages carry nothing the engine logs.
fn to_events(msg: claude_agent::Result<Message>) -> Vec<autobuild_core::Result<AgentEvent>> {
    let msg = match msg {
        Ok(m) => m,
        Err(e) => return vec![Err(AutobuildError::Agent(e.to_string()))],
    };
    match msg {
        Message::Assistant(a) => a
            .message
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(Ok(AgentEvent::Text(text))),
                ContentBlock::ToolUse { name, input, .. } => {
                    Some(Ok(AgentEvent::ToolCall { name, input }))
                }
                ContentBlock::Thinking { .. } | ContentBlock::Other => None,
            })
            .collect(),
        Message::User(u) => u
            .message
            .content
            .into_iter()
            .filter_map(|block| match block {
                UserContentBlock::ToolResult {
                    content, is_error, ..
                } => Some(Ok(AgentEvent::ToolResult {
                    ok: !is_error.unwrap_or(false),
                    content: content.map(|c| c.text()).unwrap_or_default(),
                })),
                UserContentBlock::Other => None,
            })
            .collect(),
        Message::System(_) | Message::Result(_) => Vec::new(),
    }
}

fn hook_command() -> Option<String> {
    let exe = std::env::current_exe().ok()?;
    let exe = exe.to_str()?;
    let quoted = shlex::try_quote(exe).ok()?;
    Some(format!("{quoted} check --hook"))
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), home::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> claude_agent::Result<Message> {
        Ok(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn assistant_and_user_blocks_become_events() {
        let events = to_events(parse(
            r#"{"type": "assistant", "session_id": "s", "message": {"content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "Running tests"},
                {"type": "tool_use", "id": "t1", "name": "Bash", "input": {"command": "pytest"}}]}}"#,
        ));
        let events: Vec<AgentEvent> = events.into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(
            events,
            [
                AgentEvent::Text("Running tests".into()),
                AgentEvent::ToolCall {
                    name: "Bash".into(),
                    input: serde_json::json!({"command": "pytest"})
                }
            ]
        );

        let events = to_events(parse(
            r#"{"type": "user", "session_id": "s", "message": {"content": [
                {"type": "tool_result", "tool_use_id": "t1", "is_error": true, "content": "2 failed"}]}}"#,
        ));
        assert_eq!(
            events.into_iter().next().unwrap().unwrap(),
            AgentEvent::ToolResult {
                ok: false,
                content: "2 failed".into()
            }
        );
    }

    #[test]
    fn protocol_errors_become_agent_errors() {
        let events = to_events(Err(claude_agent::ClaudeAgentError::Process("gone".into())));
        assert!(matches!(&events[0], Err(AutobuildError::Agent(m)) if m.contains("gone")));
        assert!(to_events(parse(r#"{"type": "result", "subtype": "success", "session_id": "s"}"#)).is_empty());
    }

    #[test]
    fn options_follow_config_and_request() {
        let mut config = AgentConfig::default();
        config.command_hook = false;
        config.max_turns = Some(30);
        let runner = ClaudeRunner::new(&config);
        let request = AgentRequest::new("p", "/work", "/work/.auto-claude/specs/001-x")
            .with_model(Some("claude-sonnet-4-5".into()));
        let opts = runner.options(&request);
        assert_eq!(opts.model.as_deref(), Some("claude-sonnet-4-5"));
        assert_eq!(opts.max_turns, Some(30));
        assert_eq!(opts.permission_mode, PermissionMode::AcceptEdits);
        assert_eq!(opts.cwd, Some(PathBuf::from("/work")));
        assert!(opts.settings.is_none());

        config.command_hook = true;
        let opts = ClaudeRunner::new(&config).options(&AgentRequest::new("p", "/work", "/s"));
        assert_eq!(opts.model.as_deref(), Some(config.model.as_str()));
        let settings = opts.settings.unwrap().to_json();
        assert!(settings.contains("check --hook"));
        assert!(settings.contains("PreToolUse"));
    }
}
