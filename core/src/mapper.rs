//! Turning raw hook completions into flow-control verdicts.
//!
//! Two contracts exist. Text hooks map their exit code through an explicit
//! table; structured hooks speak JSON on stdout. The structured rules overlap
//! (`decision`, `continue`, `controlFlow`) and are applied in a fixed order
//! where a later rule may strengthen the verdict toward blocking but never
//! relax it.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::HookDefinition;
use crate::config::OutputContract;
use crate::runner::HookRunOutcome;
use crate::verdict::Verdict;

/// One file/line finding inside a diagnostic report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticFinding {
    pub file: String,
    pub line: u64,
    pub message: String,
    pub severity: FindingSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingSeverity {
    Error,
    Warning,
}

/// Flow-control block a diagnostic report may carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticControlFlow {
    #[serde(rename = "continue", skip_serializing_if = "Option::is_none")]
    pub should_continue: Option<bool>,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
}

/// A structured payload shaped like a linter/checker report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub success: bool,
    pub findings: Vec<DiagnosticFinding>,
    #[serde(rename = "controlFlow", skip_serializing_if = "Option::is_none")]
    pub control_flow: Option<DiagnosticControlFlow>,
}

/// The mapped view of one hook run.
#[derive(Debug, Clone)]
pub struct MappedResult {
    pub verdict: Verdict,
    /// Human message surfaced on failure; `None` for success.
    pub message: Option<String>,
    pub stdout: String,
    pub stderr: String,
    /// Parsed stdout body, structured hooks only.
    pub parsed: Option<Value>,
    pub diagnostics: Option<DiagnosticReport>,
}

/// Map a raw outcome under the hook's declared contract.
pub fn map_outcome(hook: &HookDefinition, outcome: &HookRunOutcome) -> MappedResult {
    let mut result = match &hook.contract {
        OutputContract::Text {
            exit_code_map,
            message,
            ..
        } => {
            let verdict = text_verdict(exit_code_map, outcome.exit_code);
            let message = match verdict {
                Verdict::Success => None,
                _ => Some(text_message(message, outcome)),
            };
            MappedResult {
                verdict,
                message,
                stdout: outcome.stdout.clone(),
                stderr: outcome.stderr.clone(),
                parsed: None,
                diagnostics: None,
            }
        }
        OutputContract::Structured => map_structured(outcome),
    };

    if result.verdict != Verdict::Success {
        let message = result
            .message
            .take()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| fallback_message(&hook.name, outcome));
        result.message = Some(message);
    } else {
        result.message = None;
    }
    result
}

fn text_verdict(
    exit_code_map: &std::collections::HashMap<String, Verdict>,
    exit_code: Option<i32>,
) -> Verdict {
    if let Some(code) = exit_code {
        if let Some(verdict) = exit_code_map.get(&code.to_string()) {
            return *verdict;
        }
    }
    if let Some(verdict) = exit_code_map.get("default") {
        return *verdict;
    }
    convention(exit_code)
}

/// The bare exit-code convention used when no mapping applies, and as the
/// starting point of the structured contract.
fn convention(exit_code: Option<i32>) -> Verdict {
    match exit_code {
        Some(0) => Verdict::Success,
        Some(2) => Verdict::BlockingError,
        _ => Verdict::NonBlockingError,
    }
}

fn text_message(declared: &str, outcome: &HookRunOutcome) -> String {
    let mut message = declared.to_string();
    if outcome.timed_out {
        message = append_qualifier(message, "hook timed out");
    }
    if outcome.truncated {
        message = append_qualifier(message, "output truncated");
    }
    message
}

fn append_qualifier(message: String, qualifier: &str) -> String {
    if message.is_empty() {
        qualifier.to_string()
    } else {
        format!("{message} ({qualifier})")
    }
}

fn map_structured(outcome: &HookRunOutcome) -> MappedResult {
    let mut verdict = convention(outcome.exit_code);
    let mut message: Option<String> = None;

    let trimmed = outcome.stdout.trim();
    let parsed: Option<Value> = if trimmed.is_empty() {
        None
    } else {
        match serde_json::from_str(trimmed) {
            Ok(value) => Some(value),
            Err(e) => {
                // Garbage on stdout is not an error: the exit-code verdict
                // stands and the raw bytes stay available to the emitter.
                debug!(error = %e, "structured hook stdout is not JSON");
                None
            }
        }
    };

    let mut diagnostics = None;
    if let Some(obj) = parsed.as_ref().and_then(Value::as_object) {
        match obj.get("decision").and_then(Value::as_str) {
            Some("block") => strengthen(
                &mut verdict,
                &mut message,
                Verdict::BlockingError,
                reason_or_message(obj),
            ),
            Some("non-blocking-error") => strengthen(
                &mut verdict,
                &mut message,
                Verdict::NonBlockingError,
                reason_or_message(obj),
            ),
            _ => {}
        }

        if obj.get("continue") == Some(&Value::Bool(false)) {
            let stop_reason = obj
                .get("stopReason")
                .and_then(Value::as_str)
                .map(str::to_string);
            strengthen(&mut verdict, &mut message, Verdict::BlockingError, stop_reason);
        }

        if let Ok(report) =
            serde_json::from_value::<DiagnosticReport>(Value::Object(obj.clone()))
        {
            let (report_verdict, report_message) = diagnostic_verdict(&report);
            strengthen(&mut verdict, &mut message, report_verdict, report_message);
            diagnostics = Some(report);
        }
    }

    MappedResult {
        verdict,
        message,
        stdout: outcome.stdout.clone(),
        stderr: outcome.stderr.clone(),
        parsed,
        diagnostics,
    }
}

fn diagnostic_verdict(report: &DiagnosticReport) -> (Verdict, Option<String>) {
    if let Some(flow) = &report.control_flow {
        if flow.decision.as_deref() == Some("block") {
            return (Verdict::BlockingError, Some(flow.reason.clone()));
        }
    }
    if !report.success {
        let message = report
            .control_flow
            .as_ref()
            .map(|flow| flow.reason.clone())
            .or_else(|| report.findings.first().map(|f| f.message.clone()));
        return (Verdict::NonBlockingError, message);
    }
    (Verdict::Success, None)
}

fn reason_or_message(obj: &serde_json::Map<String, Value>) -> Option<String> {
    obj.get("reason")
        .or_else(|| obj.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Apply a rule outcome: verdicts only ever move toward blocking.
fn strengthen(
    verdict: &mut Verdict,
    message: &mut Option<String>,
    candidate: Verdict,
    candidate_message: Option<String>,
) {
    if candidate.is_more_severe_than(*verdict) {
        *verdict = candidate;
        if candidate_message.is_some() {
            *message = candidate_message;
        }
    } else if candidate == *verdict && message.is_none() {
        *message = candidate_message;
    }
}

fn fallback_message(hook_name: &str, outcome: &HookRunOutcome) -> String {
    let stderr = outcome.stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    if outcome.timed_out {
        return format!("hook `{hook_name}` timed out");
    }
    match outcome.exit_code {
        Some(code) => format!("hook `{hook_name}` exited with code {code}"),
        None => format!("hook `{hook_name}` was terminated"),
    }
}
