//! Configuration file model and validation.
//!
//! A configuration file is a JSON object:
//!
//! ```json
//! {
//!   "logging": { "level": "verbose", "path": "/optional/log/root" },
//!   "hooks": [
//!     {
//!       "name": "fmt-check",
//!       "command": ["cargo", "fmt", "--check"],
//!       "events": ["PreToolUse"],
//!       "matcher": "Bash",
//!       "priority": 10,
//!       "timeout_seconds": 30,
//!       "output_format": "text",
//!       "exit_code_map": { "0": "success", "default": "non-blocking-error" },
//!       "message": "formatting check failed"
//!     }
//!   ]
//! }
//! ```
//!
//! Validation is total per file: any violated invariant rejects the whole
//! file, and the error names the file and the offending path (for example
//! `hooks[2].timeout_seconds`). No hook from a malformed file may run.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use serde_json::Value;

use crate::error::HookError;
use crate::error::Result;
use crate::event::EventKind;
use crate::verdict::Verdict;

/// Default ordering priority when a hook does not declare one.
pub const DEFAULT_PRIORITY: u64 = 100;

/// Default per-hook timeout when a hook does not declare one.
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// How much of each run is recorded in the session log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Write nothing.
    Off,
    /// Record only runs that went wrong (non-success, timed out, truncated).
    Errors,
    /// Record every run.
    #[default]
    Verbose,
}

impl LogLevel {
    fn from_str(value: &str) -> Option<Self> {
        match value {
            "off" => Some(LogLevel::Off),
            "errors" => Some(LogLevel::Errors),
            "verbose" => Some(LogLevel::Verbose),
            _ => None,
        }
    }
}

/// Session-log settings, last-defined-wins across layers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoggingSettings {
    pub level: LogLevel,
    /// Overrides the default log root (`<home>/.claude/logs/cc-hooks`).
    pub path: Option<PathBuf>,
}

/// Output contract of a hook: how its completion becomes a verdict.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputContract {
    /// Verdict derived from the exit code through an explicit mapping.
    Text {
        /// Exit code (stringified) or `"default"` to verdict.
        exit_code_map: HashMap<String, Verdict>,
        /// Human message shown on failure.
        message: String,
        fix_instructions: Option<String>,
    },
    /// Verdict and side output come from JSON on stdout.
    Structured,
}

impl OutputContract {
    pub fn is_text(&self) -> bool {
        matches!(self, OutputContract::Text { .. })
    }
}

/// A validated hook definition.
#[derive(Debug, Clone, PartialEq)]
pub struct HookDefinition {
    pub name: String,
    /// Argv: element 0 is the executable. Never re-parsed as a shell string.
    pub command: Vec<String>,
    pub events: Vec<EventKind>,
    pub matcher: Option<String>,
    /// Lower runs (and wins ties) earlier. Default 100.
    pub priority: u64,
    /// Stored in milliseconds; the on-disk field is `timeout_seconds`.
    pub timeout_ms: u64,
    pub description: Option<String>,
    pub contract: OutputContract,
}

impl HookDefinition {
    pub fn handles_event(&self, kind: EventKind) -> bool {
        self.events.contains(&kind)
    }
}

/// One parsed configuration file.
#[derive(Debug, Clone, Default)]
pub struct FileConfig {
    pub logging: Option<LoggingSettings>,
    pub hooks: Vec<HookDefinition>,
}

/// Parse and validate one configuration file's contents.
pub fn parse_file_config(path: &Path, contents: &str) -> Result<FileConfig> {
    let root: Value = serde_json::from_str(contents)
        .map_err(|e| HookError::config(path, format!("invalid JSON: {e}")))?;
    let root = root
        .as_object()
        .ok_or_else(|| HookError::config(path, "top level must be a JSON object"))?;

    let logging = match root.get("logging") {
        Some(value) => Some(parse_logging(path, value)?),
        None => None,
    };

    let mut hooks = Vec::new();
    if let Some(value) = root.get("hooks") {
        let entries = value
            .as_array()
            .ok_or_else(|| HookError::config(path, "hooks: must be an array"))?;
        for (index, entry) in entries.iter().enumerate() {
            hooks.push(parse_hook(path, index, entry)?);
        }
    }

    Ok(FileConfig { logging, hooks })
}

fn parse_logging(path: &Path, value: &Value) -> Result<LoggingSettings> {
    let obj = value
        .as_object()
        .ok_or_else(|| HookError::config(path, "logging: must be an object"))?;

    let level = match obj.get("level") {
        Some(v) => {
            let s = v.as_str().ok_or_else(|| {
                HookError::config(path, "logging.level: must be a string")
            })?;
            LogLevel::from_str(s).ok_or_else(|| {
                HookError::config(
                    path,
                    format!("logging.level: `{s}` is not one of off, errors, verbose"),
                )
            })?
        }
        None => LogLevel::default(),
    };

    let log_path = match obj.get("path") {
        Some(v) => Some(PathBuf::from(v.as_str().ok_or_else(|| {
            HookError::config(path, "logging.path: must be a string")
        })?)),
        None => None,
    };

    Ok(LoggingSettings {
        level,
        path: log_path,
    })
}

fn parse_hook(path: &Path, index: usize, value: &Value) -> Result<HookDefinition> {
    let at = |field: &str| format!("hooks[{index}].{field}");
    let err = |detail: String| HookError::config(path, detail);

    let obj = value
        .as_object()
        .ok_or_else(|| err(format!("hooks[{index}]: must be an object")))?;

    let name = obj
        .get("name")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(format!("{}: must be a non-empty string", at("name"))))?
        .to_string();

    let command = obj
        .get("command")
        .and_then(|v| v.as_array())
        .ok_or_else(|| err(format!("{}: must be an array", at("command"))))?;
    if command.is_empty() {
        return Err(err(format!("{}: must not be empty", at("command"))));
    }
    let command = command
        .iter()
        .map(|v| {
            v.as_str().map(str::to_string).ok_or_else(|| {
                err(format!("{}: every element must be a string", at("command")))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let events = obj
        .get("events")
        .and_then(|v| v.as_array())
        .ok_or_else(|| err(format!("{}: must be an array", at("events"))))?;
    if events.is_empty() {
        return Err(err(format!("{}: must not be empty", at("events"))));
    }
    let events = events
        .iter()
        .map(|v| {
            let s = v
                .as_str()
                .ok_or_else(|| err(format!("{}: every element must be a string", at("events"))))?;
            EventKind::ALL
                .into_iter()
                .find(|k| k.as_str() == s)
                .ok_or_else(|| err(format!("{}: `{s}` is not a known event kind", at("events"))))
        })
        .collect::<Result<Vec<_>>>()?;

    let matcher = match obj.get("matcher") {
        Some(v) => Some(
            v.as_str()
                .ok_or_else(|| err(format!("{}: must be a string", at("matcher"))))?
                .to_string(),
        ),
        None => None,
    };

    let priority = match obj.get("priority") {
        Some(v) => v
            .as_u64()
            .ok_or_else(|| err(format!("{}: must be a non-negative integer", at("priority"))))?,
        None => DEFAULT_PRIORITY,
    };

    let timeout_ms = match obj.get("timeout_seconds") {
        Some(v) => {
            let secs = v.as_f64().filter(|s| *s > 0.0).ok_or_else(|| {
                err(format!("{}: must be a positive number", at("timeout_seconds")))
            })?;
            (secs * 1000.0) as u64
        }
        None => DEFAULT_TIMEOUT_MS,
    };

    let description = match obj.get("description") {
        Some(v) => Some(
            v.as_str()
                .ok_or_else(|| err(format!("{}: must be a string", at("description"))))?
                .to_string(),
        ),
        None => None,
    };

    let contract = match obj.get("output_format").and_then(|v| v.as_str()) {
        Some("text") => OutputContract::Text {
            exit_code_map: parse_exit_code_map(path, index, obj)?,
            message: obj
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            fix_instructions: obj
                .get("fix_instructions")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        },
        Some("structured") => OutputContract::Structured,
        Some(other) => {
            return Err(err(format!(
                "{}: `{other}` is not one of text, structured",
                at("output_format")
            )));
        }
        None => {
            return Err(err(format!(
                "{}: must be `text` or `structured`",
                at("output_format")
            )));
        }
    };

    Ok(HookDefinition {
        name,
        command,
        events,
        matcher,
        priority,
        timeout_ms,
        description,
        contract,
    })
}

fn parse_exit_code_map(
    path: &Path,
    index: usize,
    obj: &serde_json::Map<String, Value>,
) -> Result<HashMap<String, Verdict>> {
    let Some(value) = obj.get("exit_code_map") else {
        return Ok(HashMap::new());
    };
    let entries = value.as_object().ok_or_else(|| {
        HookError::config(path, format!("hooks[{index}].exit_code_map: must be an object"))
    })?;

    let mut map = HashMap::with_capacity(entries.len());
    for (key, value) in entries {
        if key != "default" && key.parse::<i64>().is_err() {
            return Err(HookError::config(
                path,
                format!(
                    "hooks[{index}].exit_code_map.{key}: keys must be exit-code strings or `default`"
                ),
            ));
        }
        let verdict = value
            .as_str()
            .and_then(Verdict::from_str)
            .ok_or_else(|| {
                HookError::config(
                    path,
                    format!(
                        "hooks[{index}].exit_code_map.{key}: must be one of success, \
                         non-blocking-error, blocking-error"
                    ),
                )
            })?;
        map.insert(key.clone(), verdict);
    }
    Ok(map)
}
