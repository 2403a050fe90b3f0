use fdc_attestor::Config;

use anyhow::{
    Context,
    Result,
};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize a tracing subscriber
    let _guard = rust_tracing::trace();

    let config = Config::parse();
    let cancellation_token = CancellationToken::new();

    let poller = config
        .build(cancellation_token.clone())
        .context("failed to build gas attestor")?;

    let mut poller_handle = tokio::spawn(poller.run(cancellation_token.clone()));

    tokio::select! {
        result = &mut poller_handle => {
            result.context("poller task panicked")?;
            return Ok(());
        }
        result = shutdown_signal() => {
            result?;
            info!("Initiating graceful shutdown");
            cancellation_token.cancel();
        }
    }

    poller_handle.await.context("poller task panicked")?;
    info!("Gas attestor shut down gracefully");
    Ok(())
}

async fn shutdown_signal() -> Result<()> {
    use tokio::signal;

    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("failed to install SIGTERM handler")?;
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
            .context("failed to install SIGINT handler")?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c()
            .await
            .context("failed to listen for ctrl-c")?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
