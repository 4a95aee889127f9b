use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use cchooks_core::HookEvent;
use cchooks_core::RunOptions;
use tracing_subscriber::EnvFilter;

mod fixtures;

/// cc-hooks orchestrator.
///
/// A single-shot executable the host agent invokes at lifecycle events. It
/// reads one JSON event from stdin, runs the matching configured hooks in
/// parallel, and relays the combined verdict through its exit code and
/// standard streams.
#[derive(Debug, Parser)]
#[clap(name = "cchooks", version, bin_name = "cchooks")]
struct Cli {
    #[clap(subcommand)]
    subcommand: Subcommand,
}

#[derive(Debug, clap::Subcommand)]
enum Subcommand {
    /// Run the hooks matching one host event.
    Run(RunCommand),
}

#[derive(Debug, Parser)]
struct RunCommand {
    /// Use this configuration file instead of the layered search.
    #[clap(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Verbose diagnostics on stderr.
    #[clap(long)]
    debug: bool,

    /// Synthesize a minimal event of this kind instead of reading stdin
    /// (testing only).
    #[clap(long, value_name = "NAME")]
    event: Option<String>,

    /// Read the event payload from a file instead of stdin (testing only).
    #[clap(long, value_name = "FILE")]
    mock_data: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    match cli.subcommand {
        Subcommand::Run(cmd) => run_main(cmd).await,
    }
}

async fn run_main(cmd: RunCommand) -> ! {
    init_tracing(cmd.debug);

    let event = match synthesize_event(&cmd) {
        Ok(event) => event,
        Err(e) => {
            eprintln!("cchooks: {e:#}");
            std::process::exit(1);
        }
    };

    let opts = RunOptions {
        config_path: cmd.config,
        event,
        limits: Default::default(),
    };

    match cchooks_core::run(opts).await {
        Ok(response) => {
            if let Some(stdout) = &response.stdout {
                let mut out = std::io::stdout();
                let _ = out.write_all(stdout.as_bytes());
                let _ = out.flush();
            }
            if let Some(stderr) = &response.stderr {
                eprintln!("{stderr}");
            }
            std::process::exit(response.exit_code);
        }
        Err(e) => {
            eprintln!("cchooks: {e}");
            std::process::exit(1);
        }
    }
}

/// Build the event override for the test-only flags; `None` means stdin.
fn synthesize_event(cmd: &RunCommand) -> Result<Option<HookEvent>> {
    if let Some(path) = &cmd.mock_data {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let payload = serde_json::from_str(&contents)
            .with_context(|| format!("{} is not valid JSON", path.display()))?;
        let event = HookEvent::from_value(payload)?;
        return Ok(Some(event));
    }

    if let Some(kind) = &cmd.event {
        let payload = fixtures::sample_event(kind)
            .with_context(|| format!("`{kind}` is not a known event kind"))?;
        let event = HookEvent::from_value(payload)?;
        return Ok(Some(event));
    }

    Ok(None)
}

fn init_tracing(debug: bool) {
    let default_directives = if debug {
        "cchooks=debug,cchooks_core=debug"
    } else {
        "error"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives));
    // stdout belongs to the host; diagnostics go to stderr only.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
