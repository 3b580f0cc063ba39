use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use loyalty_backend::{bootstrap, config::Config};

// Initialize logging and tracing
fn init_tracing(default_level: &str) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
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
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenv::dotenv().ok();
    let config = Config::load().context("failed to load configuration")?;

    // Initialize tracing
    init_tracing(&config.log_level);

    info!("🚀 Starting loyalty accrual reconciliation service");

    let state = bootstrap::initialize_app_state(&config)
        .await
        .context("failed to initialize application")?;

    let shutdown = CancellationToken::new();
    let scheduler = state.scheduler.start(shutdown.clone());

    shutdown_signal().await;
    info!("🛑 Shutdown signal received, draining settlement workers...");

    scheduler.shutdown().await?;

    info!("👋 Service stopped");
    Ok(())
}
