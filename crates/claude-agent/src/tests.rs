/// Parsing of stream-json payloads as the `claude` CLI emits them.
#[cfg(test)]
mod unit {
    use crate::types::{ContentBlock, Message, UserContentBlock};

    fn parse(json: &str) -> Message {
        serde_json::from_str(json).expect("failed to parse message")
    }

    #[test]
    fn system_init_and_other_subtypes() {
        let Message::System(init) = parse(
            r#"{"type": "system", "subtype": "init", "session_id": "abc",
                "model": "claude-sonnet-4-5", "cwd": "/work", "tools": ["Read", "Bash"],
                "permissionMode": "acceptEdits", "mcp_servers": []}"#,
        ) else {
            panic!("expected System")
        };
        assert_eq!(init.subtype, "init");
        assert_eq!(init.model.as_deref(), Some("claude-sonnet-4-5"));
        assert_eq!(init.tools.len(), 2);

        let Message::System(compact) = parse(
            r#"{"type": "system", "subtype": "compact_boundary", "session_id": "abc",
                "compact_metadata": {"trigger": "auto", "pre_tokens": 1000}}"#,
        ) else {
            panic!("expected System")
        };
        assert_eq!(compact.subtype, "compact_boundary");
        assert!(compact.model.is_none());
    }

    #[test]
    fn assistant_blocks() {
        let Message::Assistant(msg) = parse(
            r#"{"type": "assistant", "session_id": "abc", "parent_tool_use_id": null,
                "message": {"id": "msg_1", "role": "assistant", "model": "m",
                  "content": [
                    {"type": "thinking", "thinking": "plan", "signature": "x"},
                    {"type": "text", "text": "Reading the plan."},
                    {"type": "tool_use", "id": "tu_1", "name": "Read",
                     "input": {"file_path": "implementation_plan.json"}},
                    {"type": "server_tool_use", "id": "st_1"}
                  ],
                  "usage": {"input_tokens": 10, "output_tokens": 5}}}"#,
        ) else {
            panic!("expected Assistant")
        };
        let blocks = &msg.message.content;
        assert_eq!(blocks.len(), 4);
        assert!(matches!(&blocks[1], ContentBlock::Text { text } if text == "Reading the plan."));
        assert!(matches!(&blocks[2], ContentBlock::ToolUse { name, .. } if name == "Read"));
        assert!(matches!(blocks[3], ContentBlock::Other));
    }

    #[test]
    fn tool_results_as_string_or_blocks() {
        let Message::User(msg) = parse(
            r#"{"type": "user", "session_id": "abc",
                "message": {"role": "user", "content": [
                  {"type": "tool_result", "tool_use_id": "tu_1", "content": "plain output"},
                  {"type": "tool_result", "tool_use_id": "tu_2", "is_error": true,
                   "content": [{"type": "text", "text": "line one"}, {"type": "text", "text": "line two"}]}
                ]}}"#,
        ) else {
            panic!("expected User")
        };
        let texts: Vec<(String, bool)> = msg
            .message
            .content
            .iter()
            .filter_map(|b| match b {
                UserContentBlock::ToolResult { content, is_error, .. } => Some((
                    content.as_ref().map(|c| c.text()).unwrap_or_default(),
                    is_error.unwrap_or(false),
                )),
                UserContentBlock::Other => None,
            })
            .collect();
        assert_eq!(
            texts,
            [
                ("plain output".to_string(), false),
                ("line one\nline two".to_string(), true)
            ]
        );
    }

    #[test]
    fn result_success_and_error() {
        let ok = parse(
            r#"{"type": "result", "subtype": "success", "session_id": "abc",
                "result": "Done.", "duration_ms": 5000, "duration_api_ms": 4800,
                "is_error": false, "num_turns": 3, "stop_reason": "end_turn",
                "total_cost_usd": 0.0042, "usage": {"input_tokens": 1, "output_tokens": 1}}"#,
        );
        let r = ok.as_result().unwrap();
        assert!(r.is_success());
        assert_eq!(r.num_turns, 3);
        assert_eq!(r.result.as_deref(), Some("Done."));

        let failed = parse(
            r#"{"type": "result", "subtype": "error_during_execution", "session_id": "abc",
                "is_error": true, "num_turns": 10, "errors": ["tool crashed"]}"#,
        );
        let r = failed.as_result().unwrap();
        assert!(!r.is_success());
        assert_eq!(r.errors, ["tool crashed"]);
        assert!(r.result.is_none());
    }

    #[test]
    fn unknown_message_type_does_not_parse() {
        assert!(serde_json::from_str::<Message>(r#"{"type": "tool_progress", "session_id": "a"}"#).is_err());
    }
}
