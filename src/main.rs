// src/main.rs

use anyhow::{Context, Result};
use clap::Parser;
use datashelf::{
    config::Config,
    fetch::{Credentials, KaggleClient},
    server::{self, AppState},
};
use std::{fs, sync::Arc};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::parse();

    // ─── 1) init logging ─────────────────────────────────────────────
    let env =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    std::panic::set_hook(Box::new(|info| {
        error!("panic: {}", info);
    }));

    // ─── 2) configure dirs ───────────────────────────────────────────
    fs::create_dir_all(&cfg.data_dir)
        .with_context(|| format!("creating data directory {}", cfg.data_dir.display()))?;
    if !cfg.registry.is_file() {
        warn!(registry = %cfg.registry.display(), "dataset registry not found; lookups will fail");
    }

    // ─── 3) provider ─────────────────────────────────────────────────
    let credentials = Credentials::discover();
    if credentials.is_none() {
        warn!("no Kaggle credentials found; downloads will fail");
    }
    let provider = KaggleClient::new(&cfg.kaggle_api, credentials)
        .context("configuring Kaggle client")?;

    // ─── 4) serve until ctrl-c / SIGTERM ─────────────────────────────
    let address = cfg.address();
    info!(
        registry = %cfg.registry.display(),
        data_dir = %cfg.data_dir.display(),
        "configuration"
    );
    let state = AppState::new(cfg, Arc::new(provider));
    let (bound, serving) = warp::serve(server::routes(state))
        .try_bind_with_graceful_shutdown(address, shutdown_signal())
        .with_context(|| format!("binding {address}"))?;

    info!("Server listening on http://{}", bound);
    info!("Health check: http://{}/health", bound);
    serving.await;

    info!("all done");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
