//! Host event parsing.
//!
//! The host writes exactly one JSON object to stdin. The reader drains stdin
//! to EOF under a hard deadline, validates the shared fields, and keeps the
//! full payload around so child hooks receive everything the host sent,
//! including fields the orchestrator itself never looks at.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;

use crate::error::HookError;
use crate::error::Result;

/// Default deadline for draining the event payload from stdin.
pub const DEFAULT_INPUT_DEADLINE: Duration = Duration::from_secs(5);

/// The eight lifecycle moments at which the host invokes the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    PreToolUse,
    PostToolUse,
    Stop,
    UserPromptSubmit,
    Notification,
    SubagentStop,
    PreCompact,
    SessionStart,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::PreToolUse,
        EventKind::PostToolUse,
        EventKind::Stop,
        EventKind::UserPromptSubmit,
        EventKind::Notification,
        EventKind::SubagentStop,
        EventKind::PreCompact,
        EventKind::SessionStart,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PreToolUse => "PreToolUse",
            EventKind::PostToolUse => "PostToolUse",
            EventKind::Stop => "Stop",
            EventKind::UserPromptSubmit => "UserPromptSubmit",
            EventKind::Notification => "Notification",
            EventKind::SubagentStop => "SubagentStop",
            EventKind::PreCompact => "PreCompact",
            EventKind::SessionStart => "SessionStart",
        }
    }

    /// True for the two stop events covered by the loop guard.
    pub fn is_stop(&self) -> bool {
        matches!(self, EventKind::Stop | EventKind::SubagentStop)
    }

    /// Name of the per-event match field, if this kind has one.
    pub fn match_field(&self) -> Option<&'static str> {
        match self {
            EventKind::PreToolUse | EventKind::PostToolUse => Some("tool_name"),
            EventKind::PreCompact => Some("trigger"),
            EventKind::SessionStart => Some("source"),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated host event.
///
/// `payload` is the full object as received; it is what gets serialized onto
/// each child's stdin. The typed fields are projections used by the selector
/// and the loop guard.
#[derive(Debug, Clone)]
pub struct HookEvent {
    pub kind: EventKind,
    pub session_id: String,
    pub transcript_path: String,
    pub cwd: PathBuf,
    pub tool_name: Option<String>,
    pub trigger: Option<String>,
    pub source: Option<String>,
    pub stop_hook_active: bool,
    pub payload: serde_json::Value,
}

impl HookEvent {
    /// Validate a raw JSON payload into a `HookEvent`.
    pub fn from_value(payload: serde_json::Value) -> Result<Self> {
        let obj = payload
            .as_object()
            .ok_or_else(|| HookError::input("event payload must be a JSON object"))?;

        let kind_name = require_str(obj, "hook_event_name")?;
        let kind = EventKind::ALL
            .into_iter()
            .find(|k| k.as_str() == kind_name)
            .ok_or_else(|| {
                HookError::input(format!("unknown hook_event_name `{kind_name}`"))
            })?;

        let session_id = require_str(obj, "session_id")?.to_string();
        if session_id.is_empty() {
            return Err(HookError::input("session_id must not be empty"));
        }
        let transcript_path = require_str(obj, "transcript_path")?.to_string();
        let cwd = PathBuf::from(require_str(obj, "cwd")?);

        let get = |key: &str| obj.get(key).and_then(|v| v.as_str()).map(str::to_string);

        Ok(Self {
            kind,
            session_id,
            transcript_path,
            cwd,
            tool_name: get("tool_name"),
            trigger: get("trigger"),
            source: get("source"),
            stop_hook_active: obj
                .get("stop_hook_active")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            payload,
        })
    }

    /// The value hook matchers are applied to, determined by event kind.
    pub fn match_value(&self) -> Option<&str> {
        match self.kind {
            EventKind::PreToolUse | EventKind::PostToolUse => self.tool_name.as_deref(),
            EventKind::PreCompact => self.trigger.as_deref(),
            EventKind::SessionStart => self.source.as_deref(),
            _ => None,
        }
    }
}

fn require_str<'a>(
    obj: &'a serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Result<&'a str> {
    obj.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| HookError::input(format!("missing required field `{key}`")))
}

/// Drain `reader` to EOF under `deadline` and parse the payload as one event.
pub async fn read_event<R>(reader: &mut R, deadline: Duration) -> Result<HookEvent>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    match tokio::time::timeout(deadline, reader.read_to_end(&mut buf)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => return Err(HookError::input(format!("failed to read stdin: {e}"))),
        Err(_) => {
            return Err(HookError::input(format!(
                "timed out after {} ms waiting for event on stdin",
                deadline.as_millis()
            )));
        }
    }

    let payload: serde_json::Value = serde_json::from_slice(&buf)
        .map_err(|e| HookError::input(format!("event payload is not valid JSON: {e}")))?;
    HookEvent::from_value(payload)
}

/// Read the event from the orchestrator's own stdin.
pub async fn read_event_from_stdin(deadline: Duration) -> Result<HookEvent> {
    let mut stdin = tokio::io::stdin();
    read_event(&mut stdin, deadline).await
}
