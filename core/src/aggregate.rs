//! Verdict aggregation and the host-facing response.
//!
//! All hooks run to completion; the winner is then chosen deterministically by
//! worst verdict first, then ascending priority, then selection order. The
//! response is pure data (exit code plus stream contents) so the whole path
//! from completions to emission is testable without touching real stdio.

use serde_json::Value;

use crate::config::HookDefinition;
use crate::config::OutputContract;
use crate::event::EventKind;
use crate::mapper::MappedResult;
use crate::runner::HookRunOutcome;
use crate::verdict::Verdict;

/// A finished hook run, ready for aggregation.
#[derive(Debug, Clone)]
pub struct CompletedRun {
    pub hook: HookDefinition,
    /// Position in the selection order; the final tie-breaker.
    pub order: usize,
    pub outcome: HookRunOutcome,
    pub mapped: MappedResult,
}

/// What the orchestrator relays back to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct HostResponse {
    pub exit_code: i32,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

impl HostResponse {
    /// The silent success used by every short-circuit path.
    pub fn empty_success() -> Self {
        Self {
            exit_code: 0,
            stdout: None,
            stderr: None,
        }
    }
}

/// Pick the run that drives the invocation's outcome.
pub fn select_winner(runs: &[CompletedRun]) -> Option<&CompletedRun> {
    runs.iter()
        .min_by_key(|run| (run.mapped.verdict, run.hook.priority, run.order))
}

/// Combine all completed runs into the host-facing response.
pub fn emit(event_kind: EventKind, runs: &[CompletedRun]) -> HostResponse {
    let Some(winner) = select_winner(runs) else {
        return HostResponse::empty_success();
    };

    match winner.mapped.verdict {
        Verdict::BlockingError => HostResponse {
            exit_code: 2,
            stdout: None,
            stderr: Some(blocking_stderr(winner)),
        },
        Verdict::NonBlockingError => HostResponse {
            exit_code: 0,
            stdout: None,
            stderr: winner.mapped.message.clone(),
        },
        Verdict::Success => HostResponse {
            exit_code: 0,
            stdout: success_stdout(event_kind, winner),
            stderr: None,
        },
    }
}

fn blocking_stderr(winner: &CompletedRun) -> String {
    let mut message = winner.mapped.message.clone().unwrap_or_default();
    if let OutputContract::Text {
        fix_instructions: Some(fix),
        ..
    } = &winner.hook.contract
    {
        if !message.is_empty() {
            message.push('\n');
        }
        message.push_str(fix);
    }
    message
}

fn success_stdout(event_kind: EventKind, winner: &CompletedRun) -> Option<String> {
    if winner.hook.contract == OutputContract::Structured {
        if let Some(obj) = winner.mapped.parsed.as_ref().and_then(Value::as_object) {
            if let Some(wrapped) = wrap_structured(event_kind, obj) {
                return serde_json::to_string(&wrapped).ok();
            }
        }
    }

    // Text hooks and unwrapped structured payloads surface raw stdout
    // verbatim; for UserPromptSubmit and SessionStart the host treats it as
    // additional context.
    if winner.mapped.stdout.is_empty() {
        None
    } else {
        Some(winner.mapped.stdout.clone())
    }
}

/// Re-wrap event-specific success fields into the host's
/// `hookSpecificOutput` envelope.
fn wrap_structured(
    event_kind: EventKind,
    payload: &serde_json::Map<String, Value>,
) -> Option<Value> {
    let consumed: &[&str] = match event_kind {
        EventKind::PreToolUse if payload.contains_key("permissionDecision") => {
            &["permissionDecision", "permissionDecisionReason"]
        }
        EventKind::UserPromptSubmit | EventKind::SessionStart
            if payload.contains_key("additionalContext") =>
        {
            &["additionalContext"]
        }
        _ => return None,
    };

    let mut specific = serde_json::Map::new();
    specific.insert(
        "hookEventName".to_string(),
        Value::String(event_kind.as_str().to_string()),
    );
    for field in consumed {
        if let Some(value) = payload.get(*field) {
            specific.insert((*field).to_string(), value.clone());
        }
    }

    let mut out = serde_json::Map::new();
    out.insert("hookSpecificOutput".to_string(), Value::Object(specific));
    for (key, value) in payload {
        if consumed.contains(&key.as_str()) || key == "decision" || key == "reason" {
            continue;
        }
        out.insert(key.clone(), value.clone());
    }
    Some(Value::Object(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn hook(name: &str, priority: u64, contract: OutputContract) -> HookDefinition {
        HookDefinition {
            name: name.to_string(),
            command: vec!["true".to_string()],
            events: vec![EventKind::Stop],
            matcher: None,
            priority,
            timeout_ms: 1000,
            description: None,
            contract,
        }
    }

    fn text_contract(fix: Option<&str>) -> OutputContract {
        OutputContract::Text {
            exit_code_map: Default::default(),
            message: String::new(),
            fix_instructions: fix.map(str::to_string),
        }
    }

    fn run(
        name: &str,
        priority: u64,
        order: usize,
        verdict: Verdict,
        message: Option<&str>,
    ) -> CompletedRun {
        CompletedRun {
            hook: hook(name, priority, text_contract(None)),
            order,
            outcome: HookRunOutcome {
                exit_code: Some(0),
                signal: None,
                stdout: String::new(),
                stderr: String::new(),
                duration_ms: 1,
                timed_out: false,
                truncated: false,
            },
            mapped: MappedResult {
                verdict,
                message: message.map(str::to_string),
                stdout: String::new(),
                stderr: String::new(),
                parsed: None,
                diagnostics: None,
            },
        }
    }

    #[test]
    fn worst_verdict_wins() {
        let runs = vec![
            run("ok", 10, 0, Verdict::Success, None),
            run("block", 200, 1, Verdict::BlockingError, Some("stop")),
            run("warn", 1, 2, Verdict::NonBlockingError, Some("eh")),
        ];
        let response = emit(EventKind::Stop, &runs);
        assert_eq!(response.exit_code, 2);
        assert_eq!(response.stderr.as_deref(), Some("stop"));
        assert_eq!(response.stdout, None);
    }

    #[test]
    fn priority_breaks_verdict_ties() {
        let runs = vec![
            run("second", 50, 0, Verdict::NonBlockingError, Some("from second")),
            run("first", 10, 1, Verdict::NonBlockingError, Some("from first")),
        ];
        let response = emit(EventKind::Stop, &runs);
        assert_eq!(response.exit_code, 0);
        assert_eq!(response.stderr.as_deref(), Some("from first"));
    }

    #[test]
    fn selection_order_breaks_full_ties() {
        let runs = vec![
            run("a", 100, 0, Verdict::NonBlockingError, Some("a wins")),
            run("b", 100, 1, Verdict::NonBlockingError, Some("b loses")),
        ];
        assert_eq!(select_winner(&runs).unwrap().hook.name, "a");
    }

    #[test]
    fn deterministic_for_same_multiset() {
        let runs = vec![
            run("x", 10, 0, Verdict::Success, None),
            run("y", 20, 1, Verdict::BlockingError, Some("blocked")),
        ];
        let first = emit(EventKind::Stop, &runs);
        let second = emit(EventKind::Stop, &runs);
        assert_eq!(first, second);
    }

    #[test]
    fn blocking_text_hook_appends_fix_instructions() {
        let mut blocking = run("fix", 10, 0, Verdict::BlockingError, Some("broken"));
        blocking.hook = hook("fix", 10, text_contract(Some("run make fix")));
        let response = emit(EventKind::Stop, &[blocking]);
        assert_eq!(response.exit_code, 2);
        assert_eq!(response.stderr.as_deref(), Some("broken\nrun make fix"));
    }

    #[test]
    fn success_surfaces_raw_stdout() {
        let mut ok = run("ok", 10, 0, Verdict::Success, None);
        ok.mapped.stdout = "extra context\n".to_string();
        let response = emit(EventKind::UserPromptSubmit, &[ok]);
        assert_eq!(response.exit_code, 0);
        assert_eq!(response.stdout.as_deref(), Some("extra context\n"));
        assert_eq!(response.stderr, None);
    }

    #[test]
    fn pre_tool_use_permission_decision_is_wrapped() {
        let mut ok = run("ok", 10, 0, Verdict::Success, None);
        ok.hook = hook("ok", 10, OutputContract::Structured);
        ok.mapped.parsed = Some(serde_json::json!({
            "permissionDecision": "allow",
            "permissionDecisionReason": "trusted",
            "decision": "approve",
            "reason": "legacy",
            "note": "kept"
        }));
        ok.mapped.stdout = "raw".to_string();

        let response = emit(EventKind::PreToolUse, &[ok]);
        let value: Value = serde_json::from_str(response.stdout.as_deref().unwrap()).unwrap();
        assert_eq!(
            value["hookSpecificOutput"]["hookEventName"],
            Value::String("PreToolUse".to_string())
        );
        assert_eq!(
            value["hookSpecificOutput"]["permissionDecision"],
            Value::String("allow".to_string())
        );
        assert_eq!(
            value["hookSpecificOutput"]["permissionDecisionReason"],
            Value::String("trusted".to_string())
        );
        // Unconsumed fields ride along; the deprecated pair does not.
        assert_eq!(value["note"], Value::String("kept".to_string()));
        assert!(value.get("decision").is_none());
        assert!(value.get("reason").is_none());
        assert!(value.get("permissionDecision").is_none());
    }

    #[test]
    fn session_start_additional_context_is_wrapped() {
        let mut ok = run("ok", 10, 0, Verdict::Success, None);
        ok.hook = hook("ok", 10, OutputContract::Structured);
        ok.mapped.parsed = Some(serde_json::json!({ "additionalContext": "remember X" }));

        let response = emit(EventKind::SessionStart, &[ok]);
        let value: Value = serde_json::from_str(response.stdout.as_deref().unwrap()).unwrap();
        assert_eq!(
            value["hookSpecificOutput"]["additionalContext"],
            Value::String("remember X".to_string())
        );
    }

    #[test]
    fn structured_without_wrapper_fields_stays_raw() {
        let mut ok = run("ok", 10, 0, Verdict::Success, None);
        ok.hook = hook("ok", 10, OutputContract::Structured);
        ok.mapped.parsed = Some(serde_json::json!({ "anything": 1 }));
        ok.mapped.stdout = "{\"anything\": 1}".to_string();

        let response = emit(EventKind::PreToolUse, &[ok]);
        assert_eq!(response.stdout.as_deref(), Some("{\"anything\": 1}"));
    }

    #[test]
    fn no_runs_is_silent_success() {
        assert_eq!(emit(EventKind::Stop, &[]), HostResponse::empty_success());
    }
}
