use clap::Parser;
use tracing_subscriber::EnvFilter;

use px_domain::config::Config;
use px_gateway::cli::{run, Cli};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = Config::from_env();
    run(cli, &config)
}

/// Structured logging to stderr; quiet by default, opt in via RUST_LOG.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}
