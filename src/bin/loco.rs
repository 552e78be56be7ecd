use anyhow::Result;
use clap::Parser;
use loco::cli::{self, Cli};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing system based on CLI flags
fn init_tracing(cli: &Cli) -> Result<()> {
    let filter = if cli.debug {
        EnvFilter::new("warn,loco=debug")
    } else if cli.verbose {
        EnvFilter::new("warn,loco=info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(cli.debug)
                .compact(),
        )
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    // Ctrl-C trips the cancellation token; in-flight LM calls abandon at
    // their next suspension point.
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_token.cancel();
        }
    });

    cli::run(cli, cancel).await
}
