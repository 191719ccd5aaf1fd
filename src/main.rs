use std::net::SocketAddr;
use std::process::ExitCode;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use marquee::{AppState, Config, Mailer, Storage, build_router, lifecycle, metrics, store};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("starting marquee v{}", env!("CARGO_PKG_VERSION"));

    match run().await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

/// Run the application, returning an exit code on error.
async fn run() -> Result<(), exitcode::ExitCode> {
    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("configuration error: {e}");
        exitcode::CONFIG
    })?;
    info!(
        host = %config.host,
        port = %config.port,
        env = %config.env,
        "configuration loaded"
    );

    // Prometheus exporter (optional)
    if let Some(addr) = config.metrics_addr() {
        metrics::try_init_metrics(addr);
    }

    // Database pool
    let pool = store::connect(&config).await.map_err(|e| {
        error!("database error: {e}");
        exitcode::UNAVAILABLE
    })?;
    let storage = Storage::new(pool);

    // Outbound mail
    let mailer = Mailer::new(
        &config.smtp_host,
        config.smtp_port,
        &config.smtp_username,
        &config.smtp_password,
        &config.smtp_sender,
    )
    .map_err(|e| {
        error!("mailer error: {e}");
        exitcode::CONFIG
    })?;

    // Application state and router
    let state = AppState::new(storage, mailer, config.clone());
    let app = build_router(state.clone());

    // Bind the listener
    let addr: SocketAddr = config.server_addr().parse().map_err(|e| {
        error!("invalid server address: {e}");
        exitcode::CONFIG
    })?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })?;

    info!("server listening on http://{addr}");

    // Serve until a termination signal, then drain background tasks and
    // connections within the grace period.
    lifecycle::serve(listener, app, state.tasks.clone())
        .await
        .map_err(|e| {
            error!("server error: {e}");
            exitcode::SOFTWARE
        })?;

    info!("server shutdown complete");
    Ok(())
}
