//! The single-invocation pipeline.
//!
//! Event Reader → Loop Guard → Config Resolver → Hook Selector → parallel
//! Hook Runners → Result Mapper → Aggregator → host response, with the
//! session logger fed as runs complete and the shutdown coordinator enlisted
//! up front.

use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::aggregate::CompletedRun;
use crate::aggregate::HostResponse;
use crate::aggregate::emit;
use crate::event::DEFAULT_INPUT_DEADLINE;
use crate::event::HookEvent;
use crate::event::read_event_from_stdin;
use crate::limiter::DEFAULT_MAX_OUTPUT_BYTES;
use crate::loader::ResolvedConfig;
use crate::loader::load_config;
use crate::mapper::MappedResult;
use crate::mapper::map_outcome;
use crate::project_dir::resolve_project_dir;
use crate::runner::HookRunOutcome;
use crate::runner::run_hook;
use crate::selector::select_hooks;
use crate::session_log::SessionLogEntry;
use crate::session_log::SessionLogger;
use crate::shutdown;
use crate::supervisor::ProcessSupervisor;
use crate::verdict::Verdict;

/// Resource bounds for one invocation.
#[derive(Debug, Clone)]
pub struct InvocationLimits {
    pub max_output_bytes: usize,
    pub input_deadline: Duration,
}

impl Default for InvocationLimits {
    fn default() -> Self {
        Self {
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            input_deadline: DEFAULT_INPUT_DEADLINE,
        }
    }
}

/// Options for a full `run` invocation.
#[derive(Debug, Default)]
pub struct RunOptions {
    /// Replaces the layered config search entirely.
    pub config_path: Option<PathBuf>,
    /// A pre-synthesized event; stdin is read when absent.
    pub event: Option<HookEvent>,
    pub limits: InvocationLimits,
}

/// Run one complete invocation: read the event, resolve configuration, and
/// drive the engine. This is what the `run` subcommand calls.
pub async fn run(opts: RunOptions) -> crate::error::Result<HostResponse> {
    let event = match opts.event {
        Some(event) => event,
        None => read_event_from_stdin(opts.limits.input_deadline).await?,
    };

    if stop_loop_guard(&event) {
        return Ok(HostResponse::empty_success());
    }

    let Some(config) = load_config(opts.config_path.as_deref(), &event.cwd)? else {
        debug!("no configuration, nothing to do");
        return Ok(HostResponse::empty_success());
    };

    let logger = SessionLogger::new(&config.logging);
    let supervisor = ProcessSupervisor::new();
    let cancel = shutdown::install(supervisor.clone());
    execute(&event, &config, &opts.limits, &logger, &supervisor, &cancel).await
}

/// The engine proper, with every collaborator injected. Used by `run` and by
/// the integration tests, which bring their own logger root and supervisor.
pub async fn execute(
    event: &HookEvent,
    config: &ResolvedConfig,
    limits: &InvocationLimits,
    logger: &SessionLogger,
    supervisor: &ProcessSupervisor,
    cancel: &CancellationToken,
) -> crate::error::Result<HostResponse> {
    if stop_loop_guard(event) {
        return Ok(HostResponse::empty_success());
    }

    let selected = select_hooks(&config.hooks, event)?;
    if selected.is_empty() {
        debug!(event = %event.kind, "no hooks selected");
        return Ok(HostResponse::empty_success());
    }

    // Retention is opportunistic and unrelated to the run outcome; let it
    // overlap with the hook runs.
    let retention = {
        let logger = logger.clone();
        tokio::spawn(async move { logger.run_retention().await })
    };

    let project_dir = resolve_project_dir(&event.cwd);
    debug!(
        event = %event.kind,
        hooks = selected.len(),
        project_dir = %project_dir.display(),
        "running hooks"
    );

    let mut handles = Vec::with_capacity(selected.len());
    for (order, hook) in selected.into_iter().enumerate() {
        let hook = (*hook).clone();
        let task = {
            let hook = hook.clone();
            let event = event.clone();
            let supervisor = supervisor.clone();
            let project_dir = project_dir.clone();
            let cancel = cancel.clone();
            let logger = logger.clone();
            let max_output_bytes = limits.max_output_bytes;
            tokio::spawn(async move {
                let outcome = run_hook(
                    &supervisor,
                    &hook,
                    &event,
                    &project_dir,
                    max_output_bytes,
                    &cancel,
                )
                .await;
                let mapped = map_outcome(&hook, &outcome);
                logger
                    .append(&SessionLogEntry::now(
                        &event.session_id,
                        &hook.name,
                        event.kind,
                        &outcome,
                        mapped.verdict,
                    ))
                    .await;
                CompletedRun {
                    hook,
                    order,
                    outcome,
                    mapped,
                }
            })
        };
        handles.push((order, hook, task));
    }

    let mut runs = Vec::with_capacity(handles.len());
    for (order, hook, task) in handles {
        match task.await {
            Ok(run) => runs.push(run),
            Err(e) => {
                // A panicked run is contained like any other hook failure.
                warn!(hook = %hook.name, error = %e, "hook task failed");
                runs.push(internal_failure_run(hook, order));
            }
        }
    }

    let response = emit(event.kind, &runs);

    let _ = retention.await;
    supervisor.cleanup().await;
    Ok(response)
}

/// Stop-hook loop prevention: a stop event raised while a stop hook is
/// already active runs nothing at all.
fn stop_loop_guard(event: &HookEvent) -> bool {
    if event.kind.is_stop() && event.stop_hook_active {
        debug!(event = %event.kind, "stop hook already active, skipping all hooks");
        return true;
    }
    false
}

fn internal_failure_run(hook: crate::config::HookDefinition, order: usize) -> CompletedRun {
    let outcome = HookRunOutcome {
        exit_code: None,
        signal: None,
        stdout: String::new(),
        stderr: String::new(),
        duration_ms: 0,
        timed_out: false,
        truncated: false,
    };
    let mapped = MappedResult {
        verdict: Verdict::NonBlockingError,
        message: Some(format!("hook `{}` failed internally", hook.name)),
        stdout: String::new(),
        stderr: String::new(),
        parsed: None,
        diagnostics: None,
    };
    CompletedRun {
        hook,
        order,
        outcome,
        mapped,
    }
}
