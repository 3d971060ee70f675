use anyhow::Result;
use clap::Parser;

mod cli;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let opts = cli.into_dispatch_options()?;

    let report = rexec_engine::dispatch(opts).await;

    if let Some(timing) = &report.timing {
        tracing::debug!(
            connect_min_ms = timing.connect_min_ms,
            connect_avg_ms = timing.connect_avg_ms,
            connect_max_ms = timing.connect_max_ms,
            command_min_ms = timing.command_min_ms,
            command_avg_ms = timing.command_avg_ms,
            command_max_ms = timing.command_max_ms,
            failed_count = timing.failed_count,
            "dispatch timing summary"
        );
    }

    std::process::exit(report.exit_status);
}
