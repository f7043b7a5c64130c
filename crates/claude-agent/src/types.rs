use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

// ─── Messages ─────────────────────────────────────────────────────────────

/// The subset of `claude --output-format stream-json` messages a build
/// session reacts to. Other message types are skipped by the reader.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    System(SystemMessage),
    Assistant(AssistantMessage),
    User(UserMessage),
    Result(ResultMessage),
}

impl Message {
    pub fn session_id(&self) -> &str {
        match self {
            Message::System(m) => &m.session_id,
            Message::Assistant(m) => &m.session_id,
            Message::User(m) => &m.session_id,
            Message::Result(m) => &m.session_id,
        }
    }

    pub fn as_result(&self) -> Option<&ResultMessage> {
        match self {
            Message::Result(r) => Some(r),
            _ => None,
        }
    }
}

/// `type = "system"`. Only `init` carries fields we read; everything else
/// (status, compaction, subtask notices) is kept as a bare subtype.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SystemMessage {
    pub subtype: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default)]
    pub tools: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssistantMessage {
    pub message: AssistantContent,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_tool_use_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssistantContent {
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        /// Shape depends on the tool.
        input: serde_json::Value,
    },
    Thinking {
        thinking: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// `type = "user"`: tool results fed back to the model.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserMessage {
    pub message: UserContent,
    pub session_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserContent {
    #[serde(default)]
    pub content: Vec<UserContentBlock>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserContentBlock {
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Option<ToolResultBody>,
        #[serde(default)]
        is_error: Option<bool>,
    },
    #[serde(other)]
    Other,
}

/// Tool output arrives either as a plain string or as text blocks.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ToolResultBody {
    Text(String),
    Blocks(Vec<ToolResultBlock>),
}

impl ToolResultBody {
    pub fn text(&self) -> String {
        match self {
            ToolResultBody::Text(s) => s.clone(),
            ToolResultBody::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| b.text.as_deref())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolResultBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// `type = "result"`: the last message of every session. `subtype` is
/// `success` or one of the `error_*` stop reasons.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResultMessage {
    pub subtype: String,
    pub session_id: String,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default)]
    pub num_turns: u32,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub total_cost_usd: f64,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ResultMessage {
    pub fn is_success(&self) -> bool {
        self.subtype == "success" && !self.is_error
    }
}

// ─── AgentOptions ─────────────────────────────────────────────────────────

/// How to launch one `claude` session.
#[derive(Debug, Clone, Default)]
pub struct AgentOptions {
    pub model: Option<String>,
    pub max_turns: Option<u32>,
    /// Tools auto-approved without prompting.
    pub allowed_tools: Vec<String>,
    pub disallowed_tools: Vec<String>,
    pub permission_mode: PermissionMode,
    pub append_system_prompt: Option<String>,
    /// Working directory for the subprocess (project root or worktree).
    pub cwd: Option<PathBuf>,
    pub env: HashMap<String, String>,
    /// Extra directories the agent may touch (`--add-dir`).
    pub additional_directories: Vec<PathBuf>,
    /// Defaults to `claude` on `PATH`.
    pub path_to_executable: Option<PathBuf>,
    /// Settings JSON passed through `--settings`.
    pub settings: Option<HookSettings>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PermissionMode {
    #[default]
    Default,
    AcceptEdits,
    BypassPermissions,
    Plan,
}

impl PermissionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionMode::Default => "default",
            PermissionMode::AcceptEdits => "acceptEdits",
            PermissionMode::BypassPermissions => "bypassPermissions",
            PermissionMode::Plan => "plan",
        }
    }
}

impl std::str::FromStr for PermissionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(PermissionMode::Default),
            "acceptEdits" | "accept_edits" => Ok(PermissionMode::AcceptEdits),
            "bypassPermissions" | "bypass_permissions" => Ok(PermissionMode::BypassPermissions),
            "plan" => Ok(PermissionMode::Plan),
            other => Err(format!("unknown permission mode '{other}'")),
        }
    }
}

// ─── Hooks ────────────────────────────────────────────────────────────────

/// Pre-tool-use hooks installed for the session. Each hook is a shell
/// command that receives the tool call as JSON on stdin; exit code 2
/// blocks the call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookSettings {
    pre_tool_use: Vec<(String, String)>,
}

impl HookSettings {
    /// Run `command` before every call to a tool matching `matcher`.
    pub fn pre_tool_use(mut self, matcher: impl Into<String>, command: impl Into<String>) -> Self {
        self.pre_tool_use.push((matcher.into(), command.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.pre_tool_use.is_empty()
    }

    pub fn to_json(&self) -> String {
        let entries: Vec<serde_json::Value> = self
            .pre_tool_use
            .iter()
            .map(|(matcher, command)| {
                serde_json::json!({
                    "matcher": matcher,
                    "hooks": [{"type": "command", "command": command}],
                })
            })
            .collect();
        serde_json::json!({ "hooks": { "PreToolUse": entries } }).to_string()
    }
}
