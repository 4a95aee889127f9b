//! Hook eligibility and ordering.

use tracing::debug;

use crate::config::HookDefinition;
use crate::error::HookError;
use crate::error::Result;
use crate::event::EventKind;
use crate::event::HookEvent;
use crate::matcher;

/// Select the hooks eligible for `event`, ordered by ascending priority with
/// ties broken by merged-configuration insertion order.
///
/// A concrete (non-wildcard) matcher needs the event's match value; if the
/// host omitted that field the event is malformed for this configuration and
/// the invocation fails as an input error.
pub fn select_hooks<'a>(
    hooks: &'a [HookDefinition],
    event: &HookEvent,
) -> Result<Vec<&'a HookDefinition>> {
    let match_value = event.match_value();

    let mut selected = Vec::new();
    for hook in hooks {
        if !hook.handles_event(event.kind) {
            continue;
        }
        if matcher_passes(hook, event.kind, match_value)? {
            selected.push(hook);
        }
    }

    selected.sort_by_key(|hook| hook.priority);
    debug!(
        event = %event.kind,
        selected = selected.len(),
        total = hooks.len(),
        "hook selection complete"
    );
    Ok(selected)
}

fn matcher_passes(
    hook: &HookDefinition,
    kind: EventKind,
    match_value: Option<&str>,
) -> Result<bool> {
    let Some(pattern) = hook.matcher.as_deref() else {
        return Ok(true);
    };
    let pattern = pattern.trim();
    if pattern.is_empty() || pattern == "*" {
        return Ok(true);
    }

    let Some(field) = kind.match_field() else {
        // The other four kinds carry no match value; matchers are vacuous.
        return Ok(true);
    };
    let Some(value) = match_value else {
        return Err(HookError::input(format!(
            "{kind} event is missing `{field}`, required by the matcher of hook `{}`",
            hook.name
        )));
    };

    let passes = match kind {
        EventKind::PreToolUse | EventKind::PostToolUse => matcher::tool_matches(pattern, value),
        _ => matcher::literal_matches(pattern, value),
    };
    Ok(passes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputContract;

    fn hook(name: &str, events: Vec<EventKind>, matcher: Option<&str>, priority: u64) -> HookDefinition {
        HookDefinition {
            name: name.to_string(),
            command: vec!["true".to_string()],
            events,
            matcher: matcher.map(str::to_string),
            priority,
            timeout_ms: 1000,
            description: None,
            contract: OutputContract::Structured,
        }
    }

    fn tool_event(tool_name: &str) -> HookEvent {
        HookEvent::from_value(serde_json::json!({
            "hook_event_name": "PreToolUse",
            "session_id": "s",
            "transcript_path": "t",
            "cwd": "/",
            "tool_name": tool_name
        }))
        .unwrap()
    }

    #[test]
    fn filters_by_event_kind() {
        let hooks = vec![
            hook("a", vec![EventKind::PreToolUse], None, 100),
            hook("b", vec![EventKind::Stop], None, 100),
        ];
        let selected = select_hooks(&hooks, &tool_event("Bash")).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name, "a");
    }

    #[test]
    fn filters_by_matcher() {
        let hooks = vec![
            hook("mcp", vec![EventKind::PreToolUse], Some("mcp__.*"), 100),
            hook("all", vec![EventKind::PreToolUse], Some("*"), 100),
        ];
        let selected = select_hooks(&hooks, &tool_event("mcp__github_search")).unwrap();
        assert_eq!(selected.len(), 2);

        let selected = select_hooks(&hooks, &tool_event("WebSearch")).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name, "all");
    }

    #[test]
    fn orders_by_priority_then_insertion() {
        let hooks = vec![
            hook("late", vec![EventKind::PreToolUse], None, 200),
            hook("tie-one", vec![EventKind::PreToolUse], None, 50),
            hook("tie-two", vec![EventKind::PreToolUse], None, 50),
            hook("first", vec![EventKind::PreToolUse], None, 10),
        ];
        let selected = select_hooks(&hooks, &tool_event("Bash")).unwrap();
        let names: Vec<&str> = selected.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["first", "tie-one", "tie-two", "late"]);
    }

    #[test]
    fn concrete_matcher_without_match_field_is_input_error() {
        let hooks = vec![hook("m", vec![EventKind::PreToolUse], Some("Bash"), 100)];
        let event = HookEvent::from_value(serde_json::json!({
            "hook_event_name": "PreToolUse",
            "session_id": "s",
            "transcript_path": "t",
            "cwd": "/"
        }))
        .unwrap();
        let err = select_hooks(&hooks, &event).unwrap_err();
        assert!(err.to_string().contains("tool_name"));
    }

    #[test]
    fn wildcard_matcher_does_not_require_match_field() {
        let hooks = vec![hook("m", vec![EventKind::PreToolUse], Some("*"), 100)];
        let event = HookEvent::from_value(serde_json::json!({
            "hook_event_name": "PreToolUse",
            "session_id": "s",
            "transcript_path": "t",
            "cwd": "/"
        }))
        .unwrap();
        assert_eq!(select_hooks(&hooks, &event).unwrap().len(), 1);
    }

    #[test]
    fn matcher_on_matchless_kind_is_vacuous() {
        let hooks = vec![hook("m", vec![EventKind::Stop], Some("whatever"), 100)];
        let event = HookEvent::from_value(serde_json::json!({
            "hook_event_name": "Stop",
            "session_id": "s",
            "transcript_path": "t",
            "cwd": "/",
            "stop_hook_active": false
        }))
        .unwrap();
        assert_eq!(select_hooks(&hooks, &event).unwrap().len(), 1);
    }

    #[test]
    fn trigger_matcher_is_literal() {
        let hooks = vec![hook("m", vec![EventKind::PreCompact], Some("auto|manual"), 100)];
        let event = HookEvent::from_value(serde_json::json!({
            "hook_event_name": "PreCompact",
            "session_id": "s",
            "transcript_path": "t",
            "cwd": "/",
            "trigger": "auto"
        }))
        .unwrap();
        assert!(select_hooks(&hooks, &event).unwrap().is_empty());
    }
}
