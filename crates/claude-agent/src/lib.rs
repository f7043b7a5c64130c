//! `claude-agent`: drive the `claude` CLI as a subprocess.
//!
//! Speaks the `--output-format stream-json` protocol: the prompt goes in as
//! one user message on stdin, and typed [`Message`]s come back from stdout
//! until the terminal `result`.
//!
//! ```text
//! AgentOptions
//!     │
//!     ▼
//! ClaudeProcess   spawns `claude --print --output-format stream-json …`
//!     │
//!     ▼
//! QueryStream     futures::Stream<Item = Result<Message>>
//! ```
//!
//! ```rust,ignore
//! use claude_agent::{query, AgentOptions, Message};
//! use futures::StreamExt;
//!
//! let mut stream = query("Implement chunk 1.1", AgentOptions::default());
//! while let Some(msg) = stream.next().await {
//!     if let Message::Result(r) = msg? {
//!         println!("{} turns", r.num_turns);
//!     }
//! }
//! ```

pub mod error;
pub mod stream;
pub mod types;

pub(crate) mod process;

#[cfg(test)]
mod tests;

pub use error::ClaudeAgentError;
pub use stream::QueryStream;
pub use types::{
    AgentOptions, AssistantContent, AssistantMessage, ContentBlock, HookSettings, Message,
    PermissionMode, ResultMessage, SystemMessage, ToolResultBody, UserContentBlock, UserMessage,
};

pub type Result<T> = std::result::Result<T, ClaudeAgentError>;

/// Start one `claude` session. The stream ends after the `result` message
/// or when the process exits.
pub fn query(prompt: impl Into<String>, opts: AgentOptions) -> QueryStream {
    QueryStream::new(prompt.into(), opts)
}
