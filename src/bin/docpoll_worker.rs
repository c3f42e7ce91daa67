//! Extraction worker entrypoint.
//!
//! Consumes job ids from the Redis queue shared with the HTTP server and writes extracted text
//! back to the job store. Run as many worker processes as needed; each one starts its own pool
//! of consumers. `--once <file_id>` processes a single job synchronously and prints the task
//! report, which is handy for re-running a stuck job by hand.
use anyhow::{Context, Result};
use clap::Parser;
use docpoll::{
    blob::FsBlobStore,
    config, logging,
    extract::PdfTextExtractor,
    jobs::{JobId, RedisJobStore},
    metrics::JobMetrics,
    queue::RedisQueue,
    worker::{self, ExtractionWorker, PoolConfig},
};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Parser)]
#[command(
    name = "docpoll-worker",
    about = "Background PDF text extraction worker"
)]
struct Cli {
    /// Number of concurrent consumers (overrides WORKER_CONCURRENCY).
    #[arg(long)]
    concurrency: Option<usize>,
    /// Process a single job id and exit instead of consuming the queue.
    #[arg(long, value_name = "FILE_ID")]
    once: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::init_config().context("failed to load configuration")?;
    logging::init_tracing("docpoll-worker");

    let store = Arc::new(
        RedisJobStore::connect(&config.redis_url, config.job_ttl())
            .await
            .context("failed to connect job store to Redis")?,
    );
    let blobs = Arc::new(
        FsBlobStore::open(&config.upload_dir)
            .await
            .context("failed to prepare upload directory")?,
    );
    let metrics = Arc::new(JobMetrics::new());
    let worker = Arc::new(ExtractionWorker::new(
        store,
        blobs,
        Arc::new(PdfTextExtractor),
        metrics.clone(),
    ));

    if let Some(file_id) = cli.once {
        let outcome = worker.process(&JobId::from(file_id)).await;
        println!("{}", outcome.report());
        return Ok(());
    }

    let queue = Arc::new(
        RedisQueue::connect(&config.redis_url, &config.queue_name)
            .await
            .context("failed to connect job queue to Redis")?,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received; finishing in-flight jobs"),
            Err(err) => {
                tracing::error!(error = %err, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        }
        let _ = shutdown_tx.send(true);
    });

    worker::run_pool(
        worker,
        queue,
        PoolConfig {
            concurrency: cli.concurrency.unwrap_or(config.worker_concurrency),
            poll_interval: config.worker_poll_interval(),
        },
        shutdown_rx,
    )
    .await;

    tracing::info!(metrics = ?metrics.snapshot(), "Worker stopped");
    Ok(())
}
