use std::process::Stdio;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};

use crate::types::{AgentOptions, Message, PermissionMode};
use crate::{ClaudeAgentError, Result};

// ─── ClaudeProcess ────────────────────────────────────────────────────────

/// A running `claude` session speaking stream-json on stdin and stdout.
/// Stderr is drained in the background and attached to exit errors.
pub(crate) struct ClaudeProcess {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    stderr_buf: Arc<Mutex<String>>,
}

impl ClaudeProcess {
    /// Launch `claude`, send the prompt as the single user turn, and close
    /// stdin.
    pub(crate) async fn spawn(prompt: &str, opts: &AgentOptions) -> Result<Self> {
        let mut cmd = build_command(opts);
        // A nested session would otherwise refuse to start.
        cmd.env_remove("CLAUDECODE");
        cmd.envs(&opts.env);

        let mut process = Self::from_command(cmd)?;
        let user_msg = serde_json::json!({
            "type": "user",
            "message": {
                "role": "user",
                "content": [{"type": "text", "text": prompt}]
            }
        });
        let mut line = serde_json::to_vec(&user_msg)
            .map_err(|e| ClaudeAgentError::Process(format!("failed to encode prompt: {e}")))?;
        line.push(b'\n');
        if let Some(mut stdin) = process.child.stdin.take() {
            stdin.write_all(&line).await?;
            stdin.flush().await?;
        }
        Ok(process)
    }

    fn from_command(mut cmd: Command) -> Result<Self> {
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            ClaudeAgentError::Process(format!("failed to start claude: {e}"))
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ClaudeAgentError::Process("stdout not captured".into()))?;

        let stderr_buf = Arc::new(Mutex::new(String::new()));
        if let Some(stderr) = child.stderr.take() {
            let buf = Arc::clone(&stderr_buf);
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    if let Ok(mut b) = buf.lock() {
                        if !b.is_empty() {
                            b.push('\n');
                        }
                        b.push_str(&line);
                    }
                }
            });
        }

        Ok(Self {
            child,
            lines: BufReader::new(stdout).lines(),
            stderr_buf,
        })
    }

    /// Next message from stdout; `Ok(None)` at EOF. Blank lines and message
    /// types outside [`Message`] are skipped.
    pub(crate) async fn next_message(&mut self) -> Result<Option<Message>> {
        while let Some(line) = self.lines.next_line().await? {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<Message>(trimmed) {
                Ok(msg) => return Ok(Some(msg)),
                Err(_) if has_type_field(trimmed) => {
                    tracing::trace!(line = trimmed, "skipping unhandled message");
                }
                Err(e) => {
                    return Err(ClaudeAgentError::Parse {
                        line: trimmed.to_owned(),
                        source: e,
                    })
                }
            }
        }
        Ok(None)
    }

    /// Reap the child; an error describes a non-zero exit with its stderr.
    pub(crate) async fn exit_error(&mut self) -> Option<ClaudeAgentError> {
        let status = match self.child.wait().await {
            Ok(s) => s,
            Err(e) => return Some(ClaudeAgentError::Io(e)),
        };
        if status.success() {
            return None;
        }
        let stderr = self
            .stderr_buf
            .lock()
            .map(|b| b.clone())
            .unwrap_or_default();
        let reason = match status.code() {
            Some(code) => format!("claude exited with code {code}"),
            None => "claude terminated by signal".to_string(),
        };
        Some(ClaudeAgentError::Process(if stderr.is_empty() {
            reason
        } else {
            format!("{reason}\nstderr: {stderr}")
        }))
    }

    pub(crate) async fn kill(&mut self) {
        let _ = self.child.kill().await;
    }
}

/// Valid JSON with a `type` we don't model, as opposed to garbage.
fn has_type_field(line: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(line)
        .map(|v| v.get("type").is_some())
        .unwrap_or(false)
}

// ─── Command builder ──────────────────────────────────────────────────────

pub(crate) fn build_command(opts: &AgentOptions) -> Command {
    let mut cmd = match &opts.path_to_executable {
        Some(path) => Command::new(path),
        None => Command::new("claude"),
    };
    cmd.args([
        "--print",
        "--output-format",
        "stream-json",
        "--verbose",
        "--input-format",
        "stream-json",
    ]);

    if let Some(model) = &opts.model {
        cmd.arg("--model").arg(model);
    }
    if let Some(max_turns) = opts.max_turns {
        cmd.arg("--max-turns").arg(max_turns.to_string());
    }
    if !opts.allowed_tools.is_empty() {
        cmd.arg("--allowed-tools").arg(opts.allowed_tools.join(","));
    }
    if !opts.disallowed_tools.is_empty() {
        cmd.arg("--disallowed-tools").arg(opts.disallowed_tools.join(","));
    }
    if opts.permission_mode != PermissionMode::Default {
        cmd.arg("--permission-mode").arg(opts.permission_mode.as_str());
    }
    if let Some(append) = &opts.append_system_prompt {
        cmd.arg("--append-system-prompt").arg(append);
    }
    for dir in &opts.additional_directories {
        cmd.arg("--add-dir").arg(dir);
    }
    if let Some(settings) = opts.settings.as_ref().filter(|s| !s.is_empty()) {
        cmd.arg("--settings").arg(settings.to_json());
    }
    if let Some(cwd) = &opts.cwd {
        cmd.current_dir(cwd);
    }
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HookSettings;

    fn args(opts: &AgentOptions) -> Vec<String> {
        build_command(opts)
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn defaults_only_set_protocol_flags() {
        let a = args(&AgentOptions::default());
        assert_eq!(a[0], "--print");
        assert!(a.contains(&"stream-json".to_string()));
        assert!(!a.contains(&"--permission-mode".to_string()));
        assert!(!a.contains(&"--settings".to_string()));
    }

    #[test]
    fn options_map_to_flags() {
        let opts = AgentOptions {
            model: Some("claude-sonnet-4-5".into()),
            max_turns: Some(40),
            allowed_tools: vec!["Read".into(), "Bash".into()],
            permission_mode: PermissionMode::AcceptEdits,
            additional_directories: vec!["/tmp/spec".into()],
            settings: Some(HookSettings::default().pre_tool_use("Bash", "autobuild check --hook")),
            ..Default::default()
        };
        let a = args(&opts);
        let after = |flag: &str| {
            let i = a.iter().position(|x| x == flag).unwrap();
            a[i + 1].clone()
        };
        assert_eq!(after("--model"), "claude-sonnet-4-5");
        assert_eq!(after("--max-turns"), "40");
        assert_eq!(after("--allowed-tools"), "Read,Bash");
        assert_eq!(after("--permission-mode"), "acceptEdits");
        assert_eq!(after("--add-dir"), "/tmp/spec");
        assert!(after("--settings").contains("autobuild check --hook"));
    }
}
