//! Edit worker binary.

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vedit_media::{check_ffmpeg, check_ffprobe};
use vedit_queue::JobQueue;
use vedit_worker::{metrics, EditContext, JobExecutor, WorkerConfig};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Worker failed: {:#}", e);
        eprintln!("vedit-worker: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("vedit=info".parse()?)
        .add_directive("ort=warn".parse()?);

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
    // S3 over HTTPS needs a process-wide crypto provider
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();
    init_tracing()?;

    info!("Starting vedit-worker");

    check_ffmpeg().context("ffmpeg is required")?;
    check_ffprobe().context("ffprobe is required")?;

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    metrics::init_metrics(config.metrics_port).context("failed to start metrics exporter")?;

    let queue = JobQueue::from_env().context("failed to create job queue")?;
    let ctx = EditContext::from_env(config.clone()).context("failed to build pipeline")?;
    let executor = JobExecutor::new(config, queue, ctx);

    let shutdown = executor.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            let _ = shutdown.send(true);
        }
    });

    executor.run().await.context("executor stopped with an error")?;

    info!("Worker shutdown complete");
    Ok(())
}
