//! Wire contract for the agent-side hooks (`UserPromptSubmit`, `PreToolUse`,
//! `PostToolUse`, `Stop`/turn-end) that every supported coding agent invokes
//! with a JSON payload on stdin.
//!
//! The shape here is a superset of any one agent's hook payload: fields an
//! agent doesn't populate for a given event are simply absent. Decoders
//! translate an agent's native hook invocation into this common shape
//! before it reaches `entire-core`.

use serde::{Deserialize, Serialize};

/// Which lifecycle event triggered this hook invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum HookEventName {
    UserPromptSubmit,
    PreToolUse,
    PostToolUse,
    Stop,
    SubagentStop,
}

/// The JSON payload delivered on stdin to an agent-native hook script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookInput {
    pub session_id: String,
    pub transcript_path: String,
    pub hook_event_name: HookEventName,
    pub cwd: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_input: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_response: Option<serde_json::Value>,

    /// Present on `PostToolUse` for `TodoWrite`-shaped tools; `None` for
    /// every other tool and event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub todos: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_minimal_prompt_start_payload() {
        let json = r#"{
            "session_id": "abc-123",
            "transcript_path": "/tmp/t.jsonl",
            "hook_event_name": "UserPromptSubmit",
            "cwd": "/repo"
        }"#;
        let input: HookInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.hook_event_name, HookEventName::UserPromptSubmit);
        assert!(input.tool_name.is_none());
    }

    #[test]
    fn deserializes_post_tool_use_with_tool_fields() {
        let json = r#"{
            "session_id": "abc-123",
            "transcript_path": "/tmp/t.jsonl",
            "hook_event_name": "PostToolUse",
            "cwd": "/repo",
            "tool_name": "Edit",
            "tool_use_id": "toolu_1",
            "tool_input": {"file_path": "a.rs"},
            "tool_response": {"success": true}
        }"#;
        let input: HookInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.tool_name.as_deref(), Some("Edit"));
        assert_eq!(input.tool_use_id.as_deref(), Some("toolu_1"));
    }
}
