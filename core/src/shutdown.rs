//! Shutdown coordination.
//!
//! Registered once at startup. Whatever path the process leaves by (signal,
//! fatal error, or normal return), every spawned child has either exited, been
//! polite-killed, or been force-killed first.

use std::sync::Once;

use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::warn;

use crate::supervisor::ProcessSupervisor;

const EXIT_INTERRUPTED: i32 = 130;
#[cfg(unix)]
const EXIT_TERMINATED: i32 = 143;

static PANIC_HOOK: Once = Once::new();

/// Install signal handlers and the panic hook.
///
/// Returns the token runners watch; it is cancelled the moment a termination
/// signal arrives, before the supervisor sweeps the arena.
pub fn install(supervisor: ProcessSupervisor) -> CancellationToken {
    let cancel = CancellationToken::new();
    install_panic_hook(supervisor.clone());

    let token = cancel.clone();
    tokio::spawn(async move {
        let code = wait_for_termination_signal().await;
        warn!("termination signal received, cleaning up children");
        token.cancel();
        supervisor.cleanup().await;
        std::process::exit(code);
    });

    cancel
}

#[cfg(unix)]
async fn wait_for_termination_signal() -> i32 {
    use tokio::signal::unix::SignalKind;
    use tokio::signal::unix::signal;

    let mut sigterm = signal(SignalKind::terminate()).ok();
    let sigterm_recv = async {
        match sigterm.as_mut() {
            Some(sigterm) => {
                sigterm.recv().await;
            }
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => EXIT_INTERRUPTED,
        _ = sigterm_recv => EXIT_TERMINATED,
    }
}

#[cfg(not(unix))]
async fn wait_for_termination_signal() -> i32 {
    let _ = tokio::signal::ctrl_c().await;
    EXIT_INTERRUPTED
}

/// On a fatal error the async cleanup path is unavailable, so the hook falls
/// back to a synchronous sweep of tracked process groups before the default
/// handler reports the cause and the process dies non-zero.
fn install_panic_hook(supervisor: ProcessSupervisor) {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            supervisor.force_kill_all_blocking();
            error!("fatal error, children killed: {info}");
            previous(info);
        }));
    });
}
