use crate::exit::{self, BuildExit};
use crate::output::print_json;
use anyhow::Context;
use autobuild_core::validator::{CommandGate, Decision};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;

/// Tools whose input is a shell command.
const SHELL_TOOLS: &[&str] = &["Bash"];

/// Payload the agent runtime sends to a pre-tool-use hook.
#[derive(Debug, Deserialize)]
struct HookPayload {
    #[serde(default)]
    tool_name: String,
    #[serde(default)]
    tool_input: serde_json::Value,
    #[serde(default)]
    cwd: Option<std::path::PathBuf>,
}

pub fn run(root: &Path, command: Option<String>, hook: bool, json: bool) -> anyhow::Result<()> {
    if hook {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("failed to read hook payload")?;
        return run_hook(root, &raw);
    }

    let command = command.context("a command is required unless --hook is given")?;
    let decision = CommandGate::new(root).validate(&command);
    if json {
        print_json(&decision)?;
    } else if decision.allowed {
        println!("allowed");
    }
    if decision.allowed {
        Ok(())
    } else {
        Err(BuildExit::new(exit::DENIED, format!("blocked: {}", decision.reason)).into())
    }
}

fn run_hook(root: &Path, raw: &str) -> anyhow::Result<()> {
    let payload: HookPayload =
        serde_json::from_str(raw).context("hook payload is not valid JSON")?;
    if !SHELL_TOOLS.contains(&payload.tool_name.as_str()) {
        return Ok(());
    }
    let Some(command) = payload.tool_input.get("command").and_then(|c| c.as_str()) else {
        return Ok(());
    };
    let scan_root = payload.cwd.as_deref().unwrap_or(root);
    let decision = CommandGate::new(scan_root).validate(command);
    if decision.allowed {
        return Ok(());
    }
    print_json(&deny_output(&decision))?;
    Err(BuildExit::new(exit::REVIEW_REQUIRED, decision.reason).into())
}

fn deny_output(decision: &Decision) -> serde_json::Value {
    serde_json::json!({
        "hookSpecificOutput": {
            "hookEventName": "PreToolUse",
            "permissionDecision": "deny",
            "permissionDecisionReason": decision.reason,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_shell_tools_pass() {
        let root = Path::new(".");
        assert!(run_hook(root, r#"{"tool_name": "Write", "tool_input": {"file_path": "x"}}"#).is_ok());
        assert!(run_hook(root, r#"{"tool_name": "Bash", "tool_input": {}}"#).is_ok());
        assert!(run_hook(root, "not json").is_err());
    }

    #[test]
    fn rejected_command_exits_with_hook_code() {
        let err = run_hook(
            Path::new("."),
            r#"{"tool_name": "Bash", "tool_input": {"command": "dropdb production"}}"#,
        )
        .unwrap_err();
        let exit = err.downcast_ref::<BuildExit>().unwrap();
        assert_eq!(exit.code, exit::REVIEW_REQUIRED);
        assert!(!exit.message.is_empty());
    }

    #[test]
    fn deny_output_shape() {
        let out = deny_output(&Decision::deny("nope"));
        assert_eq!(out["hookSpecificOutput"]["permissionDecision"], "deny");
        assert_eq!(out["hookSpecificOutput"]["permissionDecisionReason"], "nope");
    }
}
