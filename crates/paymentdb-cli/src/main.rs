use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("paymentdb=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = paymentdb_cli::Cli::parse();
    paymentdb_cli::run_cli(cli)
}
