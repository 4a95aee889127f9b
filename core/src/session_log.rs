//! Per-session JSONL logging and opportunistic retention.
//!
//! One record is appended per hook run. Writes are best effort: a full disk or
//! a bad permission must never change an invocation's outcome. Retention runs
//! when it can grab the advisory lock and silently steps aside when it
//! cannot.

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use std::time::SystemTime;

use chrono::SecondsFormat;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use tracing::warn;

use crate::config::LogLevel;
use crate::config::LoggingSettings;
use crate::event::EventKind;
use crate::verdict::Verdict;

pub const SESSIONS_DIR: &str = "sessions";
pub const CLEANUP_LOCK_FILENAME: &str = ".cleanup.lock";

/// A lock older than this is presumed abandoned.
const LOCK_MAX_AGE: Duration = Duration::from_secs(60 * 60);

/// Session files older than this are deleted outright.
const MAX_SESSION_FILE_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Above this total, deletion continues oldest-first.
const MAX_TOTAL_BYTES: u64 = 500 * 1024 * 1024;

/// One line in a session log file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionLogEntry {
    pub timestamp: String,
    pub session_id: String,
    pub hook_name: String,
    pub event_kind: EventKind,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub truncated: bool,
    pub timed_out: bool,
    pub flow_control: Verdict,
}

impl SessionLogEntry {
    pub fn now(
        session_id: &str,
        hook_name: &str,
        event_kind: EventKind,
        outcome: &crate::runner::HookRunOutcome,
        flow_control: Verdict,
    ) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            session_id: session_id.to_string(),
            hook_name: hook_name.to_string(),
            event_kind,
            exit_code: outcome.exit_code,
            duration_ms: outcome.duration_ms,
            truncated: outcome.truncated,
            timed_out: outcome.timed_out,
            flow_control,
        }
    }
}

/// The default log root: `<home>/.claude/logs/cc-hooks`.
pub fn default_log_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".claude")
        .join("logs")
        .join("cc-hooks")
}

/// Appends session records and runs retention under its root.
#[derive(Debug, Clone)]
pub struct SessionLogger {
    root: PathBuf,
    level: LogLevel,
}

impl SessionLogger {
    pub fn new(settings: &LoggingSettings) -> Self {
        Self {
            root: settings.path.clone().unwrap_or_else(default_log_root),
            level: settings.level,
        }
    }

    pub fn with_root(root: PathBuf, level: LogLevel) -> Self {
        Self { root, level }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_file(&self, session_id: &str) -> PathBuf {
        let safe: String = session_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        self.root
            .join(SESSIONS_DIR)
            .join(format!("session-{safe}.jsonl"))
    }

    fn should_record(&self, entry: &SessionLogEntry) -> bool {
        match self.level {
            LogLevel::Off => false,
            LogLevel::Verbose => true,
            LogLevel::Errors => {
                entry.flow_control != Verdict::Success || entry.timed_out || entry.truncated
            }
        }
    }

    /// Append one record. Best effort by contract.
    pub async fn append(&self, entry: &SessionLogEntry) {
        if !self.should_record(entry) {
            return;
        }
        if let Err(e) = self.try_append(entry).await {
            warn!(error = %e, "failed to append session log entry");
        }
    }

    async fn try_append(&self, entry: &SessionLogEntry) -> std::io::Result<()> {
        let path = self.session_file(&entry.session_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_string(entry).map_err(std::io::Error::other)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }

    /// Opportunistic cleanup of old session files. Every failure is silent;
    /// losing the lock race just means some other invocation is doing it.
    pub async fn run_retention(&self) {
        let root = self.root.clone();
        let result = tokio::task::spawn_blocking(move || {
            retention_pass(&root, MAX_SESSION_FILE_AGE, MAX_TOTAL_BYTES)
        })
        .await;
        if let Err(e) = result {
            warn!(error = %e, "retention task failed");
        }
    }
}

fn retention_pass(root: &Path, max_age: Duration, max_total: u64) {
    let Some(_lock) = CleanupLock::acquire(root) else {
        debug!("retention lock unavailable, skipping cleanup");
        return;
    };

    let Ok(dir) = std::fs::read_dir(root.join(SESSIONS_DIR)) else {
        return;
    };

    let now = SystemTime::now();
    let mut files: Vec<(PathBuf, u64, SystemTime)> = Vec::new();
    for entry in dir.flatten() {
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified().unwrap_or(now);
        files.push((entry.path(), metadata.len(), modified));
    }
    files.sort_by_key(|(_, _, modified)| *modified);

    let mut total: u64 = files.iter().map(|(_, size, _)| size).sum();
    let mut remaining = Vec::with_capacity(files.len());
    for (path, size, modified) in files {
        let age = now.duration_since(modified).unwrap_or_default();
        if age > max_age {
            debug!(path = %path.display(), "retention: deleting expired session file");
            if std::fs::remove_file(&path).is_ok() {
                total -= size;
            }
        } else {
            remaining.push((path, size));
        }
    }

    let mut oldest_first = remaining.into_iter();
    while total > max_total {
        let Some((path, size)) = oldest_first.next() else {
            break;
        };
        debug!(path = %path.display(), "retention: deleting to get under the size cap");
        if std::fs::remove_file(&path).is_ok() {
            total -= size;
        }
    }
}

/// Advisory exclusive-create lock file. Stale locks are broken after an hour.
struct CleanupLock {
    path: PathBuf,
}

impl CleanupLock {
    fn acquire(root: &Path) -> Option<Self> {
        if std::fs::create_dir_all(root).is_err() {
            return None;
        }
        let path = root.join(CLEANUP_LOCK_FILENAME);
        if Self::try_create(&path) {
            return Some(Self { path });
        }

        let age = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())?;
        if age <= LOCK_MAX_AGE {
            return None;
        }

        // Stale: break it and retry once. Losing that race is fine too.
        let _ = std::fs::remove_file(&path);
        if Self::try_create(&path) {
            Some(Self { path })
        } else {
            None
        }
    }

    fn try_create(path: &Path) -> bool {
        std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .is_ok()
    }
}

impl Drop for CleanupLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
