//! callflow CLI entrypoint

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use callflow::cli::{log_filter, Cli, ENV_LOG};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so `config --json` output stays parseable
    let directives = std::env::var(ENV_LOG).ok();
    tracing_subscriber::registry()
        .with(log_filter(directives.as_deref()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    Cli::parse().execute().await
}
