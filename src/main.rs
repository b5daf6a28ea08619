use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use a3s_recall::{Cli, Config, HttpTransmitter, Pipeline, PipelineConfig, Result};

/// Fallback filter variable when `RUST_LOG` is unset
const ENV_LOG: &str = "RECALL_LOG";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // stdout belongs to the proxied protocol; diagnostics go to stderr only
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_from_env(ENV_LOG))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!("{e}");
            e.exit_code()
        }
    };

    // Don't wait on detached deliveries or the blocking stdin reader
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<()> {
    let lookup = |key: &str| std::env::var(key).ok();

    let config = Config::from_cli(cli, lookup)?;
    let env_secrets = config.env_secrets(lookup)?;
    tracing::info!(
        source = ?config.source.kind(),
        server = %config.server_url,
        env_secrets = env_secrets.len(),
        "Starting recall"
    );

    let transmitter = HttpTransmitter::new(config.server_url.clone(), config.timeout)?;
    let pipeline = Pipeline::new(
        Arc::new(transmitter),
        PipelineConfig {
            env_secrets,
            ..PipelineConfig::default()
        },
    )?;

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received");
        signal_cancel.cancel();
    });

    pipeline.run(cancel, config.source.build()).await
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Cannot listen for SIGTERM");
            ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    ctrl_c().await;
}
