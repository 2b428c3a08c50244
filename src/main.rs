use clap::Parser;

use arbiter::cli::{self, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arbiter=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    cli::run(Cli::parse()).await
}
