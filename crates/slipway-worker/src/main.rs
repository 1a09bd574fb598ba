//! slipway-worker - runs one slipway job per process.
//!
//! Started by the scheduler with `SLIPWAY_WORKER=1`, reads one command from
//! stdin and writes one response to stdout. Logs go to stderr.

use anyhow::Context;
use clap::Parser;

#[derive(Parser)]
#[command(name = "slipway-worker")]
#[command(about = "Worker process for slipway jobs")]
#[command(version)]
struct Cli {
    /// Print the names of the hosted tasks and exit
    #[arg(long)]
    list_tasks: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let registry = slipway_worker::registry();

    if cli.list_tasks {
        for name in registry.names() {
            println!("{}", name);
        }
        return Ok(());
    }

    slipway_core::ipc::serve(&registry).context("worker failed to serve its job")?;
    Ok(())
}
