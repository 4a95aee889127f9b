//! Synthetic event payloads for `--event`, so the engine can be driven from a
//! terminal without a host process on the other end of stdin.

use serde_json::Value;
use serde_json::json;

/// Build a minimal event payload of the named kind.
pub fn sample_event(kind: &str) -> Option<Value> {
    let cwd = std::env::current_dir()
        .unwrap_or_else(|_| std::env::temp_dir())
        .display()
        .to_string();
    let mut payload = json!({
        "hook_event_name": kind,
        "session_id": "test-session",
        "transcript_path": std::env::temp_dir().join("transcript.jsonl").display().to_string(),
        "cwd": cwd,
    });
    let obj = payload.as_object_mut().expect("payload is an object");

    match kind {
        "PreToolUse" => {
            obj.insert("tool_name".to_string(), json!("Bash"));
            obj.insert("tool_input".to_string(), json!({ "command": "echo test" }));
        }
        "PostToolUse" => {
            obj.insert("tool_name".to_string(), json!("Bash"));
            obj.insert("tool_input".to_string(), json!({ "command": "echo test" }));
            obj.insert("tool_response".to_string(), json!("test"));
        }
        "UserPromptSubmit" => {
            obj.insert("prompt".to_string(), json!("sample prompt"));
        }
        "Notification" => {
            obj.insert("message".to_string(), json!("sample notification"));
        }
        "PreCompact" => {
            obj.insert("trigger".to_string(), json!("manual"));
            obj.insert("custom_instructions".to_string(), json!(""));
        }
        "SessionStart" => {
            obj.insert("source".to_string(), json!("startup"));
        }
        "Stop" | "SubagentStop" => {
            obj.insert("stop_hook_active".to_string(), json!(false));
        }
        _ => return None,
    }
    Some(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cchooks_core::HookEvent;

    #[test]
    fn every_kind_has_a_valid_fixture() {
        for kind in [
            "PreToolUse",
            "PostToolUse",
            "Stop",
            "UserPromptSubmit",
            "Notification",
            "SubagentStop",
            "PreCompact",
            "SessionStart",
        ] {
            let payload = sample_event(kind).expect("fixture exists");
            let event = HookEvent::from_value(payload).expect("fixture is valid");
            assert_eq!(event.kind.as_str(), kind);
        }
    }

    #[test]
    fn unknown_kind_has_no_fixture() {
        assert!(sample_event("NotAKind").is_none());
    }
}
