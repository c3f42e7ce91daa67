use anyhow::{Context, Result};
use docpoll::{
    api,
    blob::FsBlobStore,
    config::{self, Config},
    extract::PdfTextExtractor,
    jobs::RedisJobStore,
    logging,
    metrics::JobMetrics,
    queue::RedisQueue,
    service::JobService,
    worker::{self, ExtractionWorker, PoolConfig},
};
use std::sync::Arc;
use tokio::{net::TcpListener, sync::watch};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::init_config().context("failed to load configuration")?;
    logging::init_tracing("docpoll");

    let store = Arc::new(
        RedisJobStore::connect(&config.redis_url, config.job_ttl())
            .await
            .context("failed to connect job store to Redis")?,
    );
    let queue = Arc::new(
        RedisQueue::connect(&config.redis_url, &config.queue_name)
            .await
            .context("failed to connect job queue to Redis")?,
    );
    let blobs = Arc::new(
        FsBlobStore::open(&config.upload_dir)
            .await
            .context("failed to prepare upload directory")?,
    );
    let metrics = Arc::new(JobMetrics::new());

    let service = Arc::new(JobService::new(
        store.clone(),
        blobs.clone(),
        queue.clone(),
        metrics.clone(),
        config.max_upload_bytes,
    ));
    let app = api::create_router(service, config.api_key.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pool = (config.embedded_workers > 0).then(|| {
        let worker = Arc::new(ExtractionWorker::new(
            store.clone(),
            blobs.clone(),
            Arc::new(PdfTextExtractor),
            metrics.clone(),
        ));
        tokio::spawn(worker::run_pool(
            worker,
            queue.clone(),
            PoolConfig {
                concurrency: config.embedded_workers,
                poll_interval: config.worker_poll_interval(),
            },
            shutdown_rx,
        ))
    });

    let (listener, port) = bind_listener(config).await.context("failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server terminated unexpectedly")?;

    let _ = shutdown_tx.send(true);
    if let Some(pool) = pool {
        pool.await.context("embedded worker pool panicked")?;
    }
    tracing::info!(metrics = ?metrics.snapshot(), "Server stopped");
    Ok(())
}

async fn bind_listener(config: &Config) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    if let Some(port) = config.server_port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 8000..=8099;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 8000-8099",
    ))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
