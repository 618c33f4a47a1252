//! Axum API server binary.

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vedit_api::{create_router, metrics, ApiConfig, AppState};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("API server failed: {:#}", e);
        eprintln!("vedit-api: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("vedit=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    info!("Starting vedit-api");

    let config = ApiConfig::from_env();
    info!("API config: host={}, port={}", config.host, config.port);

    let state = AppState::from_env(config.clone()).context("failed to connect to Redis")?;

    let metrics_handle = match metrics::init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Prometheus metrics disabled: {}", e);
            None
        }
    };

    let app = create_router(state, metrics_handle);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        warn!("Ctrl-C handler unavailable, running until killed");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
