//! Per-hook execution: spawn, feed stdin, drain capped output, enforce the
//! two-phase timeout, and produce a raw outcome.
//!
//! A run never fails the invocation. Spawn failures, stdin trouble, and
//! internal errors all collapse into a synthetic outcome that the mapper turns
//! into a non-blocking error, leaving sibling hooks untouched.

use std::time::Duration;
use std::time::Instant;

use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::config::HookDefinition;
use crate::event::HookEvent;
use crate::limiter::StreamLimiter;
use crate::supervisor::KILL_GRACE;
use crate::supervisor::KillSignal;
use crate::supervisor::ProcessSupervisor;

const READ_CHUNK_SIZE: usize = 8192;

/// Raw completion record of one hook run.
#[derive(Debug, Clone)]
pub struct HookRunOutcome {
    /// Exit code, or `None` when the child died to a signal (or never ran).
    pub exit_code: Option<i32>,
    /// Terminating signal, when there was one.
    pub signal: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub timed_out: bool,
    /// True when either stream hit the byte cap.
    pub truncated: bool,
}

/// Run a single hook to completion.
pub async fn run_hook(
    supervisor: &ProcessSupervisor,
    hook: &HookDefinition,
    event: &HookEvent,
    project_dir: &std::path::Path,
    max_output_bytes: usize,
    cancel: &CancellationToken,
) -> HookRunOutcome {
    let started = Instant::now();
    let id = hook.name.as_str();

    let extra_env = vec![(
        crate::project_dir::PROJECT_DIR_ENV.to_string(),
        project_dir.display().to_string(),
    )];
    let spawned = match supervisor.spawn(id, &hook.command, &event.cwd, &extra_env) {
        Ok(spawned) => spawned,
        Err(e) => {
            warn!(hook = id, error = %e, "failed to spawn hook");
            return synthetic_failure(format!("failed to spawn hook `{id}`: {e}"), started);
        }
    };

    // Feed the event concurrently with draining so a child that fills its
    // output pipes before reading stdin cannot deadlock the run.
    if let Some(mut stdin) = spawned.stdin {
        let payload = event.payload.to_string();
        let hook_name = hook.name.clone();
        tokio::spawn(async move {
            let result = async {
                stdin.write_all(payload.as_bytes()).await?;
                stdin.shutdown().await
            }
            .await;
            if let Err(e) = result {
                match e.kind() {
                    std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::ConnectionReset => {}
                    _ => warn!(hook = %hook_name, error = %e, "failed to write event to hook stdin"),
                }
            }
        });
    }

    let mut stdout_reader = spawned.stdout;
    let mut stderr_reader = spawned.stderr;
    let mut stdout_open = stdout_reader.is_some();
    let mut stderr_open = stderr_reader.is_some();

    let mut out_limiter = StreamLimiter::new(max_output_bytes);
    let mut err_limiter = StreamLimiter::new(max_output_bytes);
    let mut tmp_stdout = [0u8; READ_CHUNK_SIZE];
    let mut tmp_stderr = [0u8; READ_CHUNK_SIZE];

    let timeout = Duration::from_millis(hook.timeout_ms);
    let far_future = tokio::time::Instant::now() + Duration::from_secs(86_400);
    let timeout_fut = tokio::time::sleep(timeout);
    tokio::pin!(timeout_fut);
    let grace_fut = tokio::time::sleep_until(far_future);
    tokio::pin!(grace_fut);

    let wait_fut = supervisor.wait(id);
    tokio::pin!(wait_fut);

    let mut exit_status: Option<std::process::ExitStatus> = None;
    let mut child_done = false;
    let mut timed_out = false;
    let mut force_killed = false;
    let mut cancel_seen = false;

    while stdout_open || stderr_open || !child_done {
        tokio::select! {
            read = async { stdout_reader.as_mut().unwrap().read(&mut tmp_stdout).await }, if stdout_open => {
                match read {
                    Ok(0) => stdout_open = false,
                    Ok(n) => {
                        if out_limiter.push(&tmp_stdout[..n]) {
                            debug!(hook = id, "stdout exceeded byte cap, killing hook");
                            force_killed = true;
                            supervisor.kill(id, KillSignal::Force);
                        }
                    }
                    Err(_) => stdout_open = false,
                }
            }
            read = async { stderr_reader.as_mut().unwrap().read(&mut tmp_stderr).await }, if stderr_open => {
                match read {
                    Ok(0) => stderr_open = false,
                    Ok(n) => {
                        if err_limiter.push(&tmp_stderr[..n]) {
                            debug!(hook = id, "stderr exceeded byte cap, killing hook");
                            force_killed = true;
                            supervisor.kill(id, KillSignal::Force);
                        }
                    }
                    Err(_) => stderr_open = false,
                }
            }
            status = &mut wait_fut, if !child_done => {
                child_done = true;
                match status {
                    Ok(status) => exit_status = Some(status),
                    Err(e) => warn!(hook = id, error = %e, "failed to await hook exit"),
                }
            }
            _ = &mut timeout_fut, if !timed_out => {
                timed_out = true;
                debug!(hook = id, timeout_ms = hook.timeout_ms, "hook timed out, sending polite kill");
                supervisor.kill(id, KillSignal::Polite);
                grace_fut.as_mut().reset(tokio::time::Instant::now() + KILL_GRACE);
            }
            _ = &mut grace_fut, if timed_out && !force_killed => {
                debug!(hook = id, "grace expired, force-killing hook");
                force_killed = true;
                supervisor.kill(id, KillSignal::Force);
            }
            _ = cancel.cancelled(), if !cancel_seen => {
                cancel_seen = true;
                supervisor.kill(id, KillSignal::Polite);
            }
        }
    }

    let truncated = out_limiter.overflowed() || err_limiter.overflowed();
    let (exit_code, signal) = split_status(exit_status);
    HookRunOutcome {
        exit_code,
        signal,
        stdout: out_limiter.into_string_lossy(),
        stderr: err_limiter.into_string_lossy(),
        duration_ms: started.elapsed().as_millis() as u64,
        timed_out,
        truncated,
    }
}

fn synthetic_failure(message: String, started: Instant) -> HookRunOutcome {
    HookRunOutcome {
        exit_code: None,
        signal: None,
        stdout: String::new(),
        stderr: message,
        duration_ms: started.elapsed().as_millis() as u64,
        timed_out: false,
        truncated: false,
    }
}

#[cfg(unix)]
fn split_status(status: Option<std::process::ExitStatus>) -> (Option<i32>, Option<i32>) {
    use std::os::unix::process::ExitStatusExt;
    match status {
        Some(status) => (status.code(), status.signal()),
        None => (None, None),
    }
}

#[cfg(not(unix))]
fn split_status(status: Option<std::process::ExitStatus>) -> (Option<i32>, Option<i32>) {
    match status {
        Some(status) => (status.code(), None),
        None => (None, None),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::OutputContract;
    use crate::event::EventKind;
    use crate::limiter::DEFAULT_MAX_OUTPUT_BYTES;

    fn sh_hook(name: &str, script: &str, timeout_ms: u64) -> HookDefinition {
        HookDefinition {
            name: name.to_string(),
            command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            events: vec![EventKind::Stop],
            matcher: None,
            priority: 100,
            timeout_ms,
            description: None,
            contract: OutputContract::Structured,
        }
    }

    fn stop_event() -> HookEvent {
        HookEvent::from_value(serde_json::json!({
            "hook_event_name": "Stop",
            "session_id": "runner-test",
            "transcript_path": "/tmp/transcript.jsonl",
            "cwd": std::env::temp_dir(),
            "stop_hook_active": false
        }))
        .unwrap()
    }

    async fn run(hook: &HookDefinition, cap: usize) -> HookRunOutcome {
        let supervisor = ProcessSupervisor::new();
        let event = stop_event();
        let project_dir = std::env::temp_dir();
        run_hook(
            &supervisor,
            hook,
            &event,
            &project_dir,
            cap,
            &CancellationToken::new(),
        )
        .await
    }

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let hook = sh_hook("echo", "printf hello; exit 0", 5_000);
        let outcome = run(&hook, DEFAULT_MAX_OUTPUT_BYTES).await;
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.stdout, "hello");
        assert!(!outcome.timed_out);
        assert!(!outcome.truncated);
    }

    #[tokio::test]
    async fn child_receives_event_on_stdin() {
        let hook = sh_hook("cat", "cat", 5_000);
        let outcome = run(&hook, DEFAULT_MAX_OUTPUT_BYTES).await;
        assert_eq!(outcome.exit_code, Some(0));
        assert!(outcome.stdout.contains("\"hook_event_name\":\"Stop\""));
        assert!(outcome.stdout.contains("runner-test"));
    }

    #[tokio::test]
    async fn child_that_ignores_stdin_is_fine() {
        let hook = sh_hook("no-stdin", "exec 0<&-; exit 3", 5_000);
        let outcome = run(&hook, DEFAULT_MAX_OUTPUT_BYTES).await;
        assert_eq!(outcome.exit_code, Some(3));
    }

    #[tokio::test]
    async fn child_sees_project_dir_env() {
        let hook = sh_hook("env", "printf '%s' \"$CLAUDE_PROJECT_DIR\"", 5_000);
        let outcome = run(&hook, DEFAULT_MAX_OUTPUT_BYTES).await;
        assert_eq!(outcome.stdout, std::env::temp_dir().display().to_string());
    }

    #[tokio::test]
    async fn timeout_politely_kills_sleeper() {
        let hook = sh_hook("slow", "sleep 10", 200);
        let started = Instant::now();
        let outcome = run(&hook, DEFAULT_MAX_OUTPUT_BYTES).await;
        assert!(outcome.timed_out);
        assert_eq!(outcome.exit_code, None);
        assert!(started.elapsed() < Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn stubborn_child_is_force_killed_after_grace() {
        let hook = sh_hook("stubborn", "trap '' TERM; while :; do sleep 0.2; done", 200);
        let started = Instant::now();
        let outcome = run(&hook, DEFAULT_MAX_OUTPUT_BYTES).await;
        assert!(outcome.timed_out);
        assert_eq!(outcome.signal, Some(libc::SIGKILL));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(200) + KILL_GRACE - Duration::from_millis(50));
        assert!(elapsed < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn overflow_truncates_and_kills_immediately() {
        let hook = sh_hook("chatty", "head -c 200000 /dev/zero; sleep 10", 2_000);
        let started = Instant::now();
        let outcome = run(&hook, 4096).await;
        assert!(outcome.truncated);
        assert!(outcome.stdout.len() <= 4096);
        // Killed on overflow, well before the sleep or the timeout.
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn spawn_failure_is_a_synthetic_outcome() {
        let mut hook = sh_hook("ghost", "true", 1_000);
        hook.command = vec!["/nonexistent/cchooks-test-binary".to_string()];
        let outcome = run(&hook, DEFAULT_MAX_OUTPUT_BYTES).await;
        assert_eq!(outcome.exit_code, None);
        assert!(outcome.stderr.contains("failed to spawn hook `ghost`"));
    }
}

